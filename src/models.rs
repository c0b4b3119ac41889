//! Core data models used throughout the index.
//!
//! These types represent the media files, faces, persons, documents and scan
//! reports that flow between the scanner, the stores and the query service.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Which feature pipeline a scan feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pipeline {
    /// Photos: normalized, face-extracted, stored in the Index Store.
    Images,
    /// Documents: text-extracted, embedded, stored in the Vector Store.
    Documents,
}

impl fmt::Display for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pipeline::Images => f.write_str("images"),
            Pipeline::Documents => f.write_str("documents"),
        }
    }
}

impl std::str::FromStr for Pipeline {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "images" | "image" => Ok(Pipeline::Images),
            "documents" | "document" | "docs" => Ok(Pipeline::Documents),
            other => Err(format!(
                "unknown pipeline '{}': expected images or documents",
                other
            )),
        }
    }
}

/// Pixel rectangle of a detected face in the normalized image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// A single face returned by a face extractor.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectedFace {
    pub region: BoundingRegion,
    pub embedding: Vec<f32>,
    pub confidence: f32,
}

/// Who a face belongs to. Faces start out unresolved; linking is an explicit
/// external decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "person_id", rename_all = "lowercase")]
pub enum FaceAssignment {
    Unresolved,
    Linked(i64),
}

impl FaceAssignment {
    pub fn from_column(person_id: Option<i64>) -> Self {
        match person_id {
            Some(id) => FaceAssignment::Linked(id),
            None => FaceAssignment::Unresolved,
        }
    }

    pub fn person_id(&self) -> Option<i64> {
        match self {
            FaceAssignment::Linked(id) => Some(*id),
            FaceAssignment::Unresolved => None,
        }
    }
}

/// A media file row as stored in `media_files`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MediaFile {
    pub id: i64,
    pub path: String,
    pub content_hash: String,
    pub last_modified: i64,
    pub metadata: serde_json::Value,
}

/// The fields the scanner writes when (re)indexing a media file. The row id
/// is assigned by the store and kept stable across rescans of the same path.
#[derive(Debug, Clone)]
pub struct NewMediaFile {
    pub path: String,
    pub content_hash: String,
    pub last_modified: i64,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Person {
    pub id: i64,
    pub name: String,
}

/// A face row joined with the path of the media file that owns it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FaceRecord {
    pub id: i64,
    pub media_file_id: i64,
    pub path: String,
    pub assignment: FaceAssignment,
    pub region: BoundingRegion,
    pub confidence: f32,
}

/// One hit of a person lookup.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PersonMatch {
    pub path: String,
    pub region: BoundingRegion,
}

/// A stored document as held by a vector store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub id: String,
    pub text: String,
    pub metadata: serde_json::Value,
    pub vector: Vec<f32>,
}

impl StoredDocument {
    /// The content hash recorded when the document was last indexed.
    pub fn content_hash(&self) -> Option<&str> {
        self.metadata.get("content_hash").and_then(|v| v.as_str())
    }
}

/// What the scanner needs to decide whether a stored document is current,
/// without loading its text or vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentVersion {
    pub content_hash: Option<String>,
    pub dims: usize,
}

/// One nearest-neighbour result from a vector store, closest first.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorHit {
    pub id: String,
    pub text: String,
    pub metadata: serde_json::Value,
    pub distance: f32,
}

/// One semantic search result as returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SemanticHit {
    pub id: String,
    pub text: String,
    pub score: f32,
}

/// Why a file was not indexed during a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Unreadable,
    Extraction,
    Upstream,
    StorageIntegrity,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanFailure {
    pub path: PathBuf,
    pub kind: FailureKind,
    pub message: String,
}

/// Result of a scan request.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScanReport {
    /// Files (re)processed and committed.
    pub indexed_count: u64,
    /// Files whose stored hash matched and were left untouched.
    pub skipped_count: u64,
    /// Eligible files encountered.
    pub seen_count: u64,
    pub failures: Vec<ScanFailure>,
    pub cancelled: bool,
}

impl ScanReport {
    pub fn merge(&mut self, other: ScanReport) {
        self.indexed_count += other.indexed_count;
        self.skipped_count += other.skipped_count;
        self.seen_count += other.seen_count;
        self.failures.extend(other.failures);
        self.cancelled |= other.cancelled;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_parses_aliases() {
        assert_eq!("images".parse::<Pipeline>().unwrap(), Pipeline::Images);
        assert_eq!("docs".parse::<Pipeline>().unwrap(), Pipeline::Documents);
        assert!("videos".parse::<Pipeline>().is_err());
    }

    #[test]
    fn assignment_maps_nullable_column() {
        assert_eq!(FaceAssignment::from_column(None), FaceAssignment::Unresolved);
        assert_eq!(FaceAssignment::from_column(Some(7)).person_id(), Some(7));
    }

    #[test]
    fn assignment_serializes_tagged() {
        let json = serde_json::to_value(FaceAssignment::Linked(3)).unwrap();
        assert_eq!(json, serde_json::json!({"state": "linked", "person_id": 3}));
        let json = serde_json::to_value(FaceAssignment::Unresolved).unwrap();
        assert_eq!(json, serde_json::json!({"state": "unresolved"}));
    }

    #[test]
    fn reports_merge_counts_and_failures() {
        let mut total = ScanReport {
            indexed_count: 1,
            seen_count: 2,
            skipped_count: 1,
            ..Default::default()
        };
        total.merge(ScanReport {
            indexed_count: 2,
            seen_count: 3,
            failures: vec![ScanFailure {
                path: PathBuf::from("x.jpg"),
                kind: FailureKind::Extraction,
                message: "bad".into(),
            }],
            ..Default::default()
        });
        assert_eq!(total.indexed_count, 3);
        assert_eq!(total.seen_count, 5);
        assert_eq!(total.failures.len(), 1);
        assert!(!total.cancelled);
    }
}
