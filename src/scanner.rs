//! Incremental scanning.
//!
//! A scan walks each root, fingerprints every eligible file and compares the
//! digest with what the store already holds for that path:
//!
//! ```text
//!  walk ──▶ fingerprint ──▶ stored hash equal? ──yes──▶ skip
//!                                  │ no
//!                                  ▼
//!                         extract (faces / embedding)
//!                                  │
//!                                  ▼
//!                     persist (one transaction per file)
//! ```
//!
//! Per-file problems (unreadable file, undecodable image, face or embedding service
//! down, constraint violation) are recorded in the [`ScanReport`] and the scan
//! moves on. Only request-level problems (missing root, disabled embedder, a
//! broken database) fail the call.
//!
//! Orphans are never removed implicitly; [`Scanner::prune`] is the explicit
//! reconciliation pass.

use globset::{Glob, GlobSet, GlobSetBuilder};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

use crate::config::Config;
use crate::embedding::{embed_one, EmbeddingProvider};
use crate::error::{IndexError, Result};
use crate::extract::{extension_of, extract_document_text};
use crate::face::FaceExtractor;
use crate::fingerprint::{fingerprint, fingerprint_file};
use crate::index_store::{IndexStore, ReplaceOutcome};
use crate::models::{FailureKind, NewMediaFile, Pipeline, ScanFailure, ScanReport};
use crate::normalize::normalize_image;
use crate::vector_store::VectorStore;

const DEFAULT_EXCLUDES: [&str; 3] = ["**/.git/**", "**/node_modules/**", "**/target/**"];

/// Scanner knobs, lifted out of [`Config`] once at construction.
#[derive(Debug, Clone)]
pub struct ScanSettings {
    pub image_extensions: Vec<String>,
    pub document_extensions: Vec<String>,
    pub exclude_globs: Vec<String>,
    pub follow_symlinks: bool,
    pub min_face_confidence: f32,
    pub max_input_chars: usize,
}

impl ScanSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            image_extensions: config.scan.image_extensions.clone(),
            document_extensions: config.scan.document_extensions.clone(),
            exclude_globs: config.scan.exclude_globs.clone(),
            follow_symlinks: config.scan.follow_symlinks,
            min_face_confidence: config.faces.min_confidence,
            max_input_chars: config.embedding.max_input_chars,
        }
    }
}

enum FileOutcome {
    Indexed,
    Unchanged,
}

pub struct Scanner {
    index: IndexStore,
    vectors: Arc<dyn VectorStore>,
    faces: Arc<dyn FaceExtractor>,
    embedder: Arc<dyn EmbeddingProvider>,
    settings: ScanSettings,
}

impl Scanner {
    pub fn new(
        index: IndexStore,
        vectors: Arc<dyn VectorStore>,
        faces: Arc<dyn FaceExtractor>,
        embedder: Arc<dyn EmbeddingProvider>,
        settings: ScanSettings,
    ) -> Self {
        Self {
            index,
            vectors,
            faces,
            embedder,
            settings,
        }
    }

    /// Scan `roots` for `pipeline`, (re)indexing new and changed files.
    ///
    /// Every root is checked before any file is touched, so a typo in one root
    /// fails the request without a partial scan of the others.
    pub async fn scan(
        &self,
        roots: &[PathBuf],
        pipeline: Pipeline,
        cancel: &CancellationToken,
    ) -> Result<ScanReport> {
        let roots = self.resolve_roots(roots).await?;

        if pipeline == Pipeline::Documents && !self.embedder.is_enabled() {
            return Err(IndexError::unavailable(
                "embedding provider is disabled; documents cannot be indexed",
            ));
        }

        let filter = self.filter_for(pipeline)?;
        let mut report = ScanReport::default();

        for root in &roots {
            let root_report = self.scan_root(root, pipeline, &filter, cancel).await?;
            tracing::info!(
                root = %root.display(),
                %pipeline,
                indexed = root_report.indexed_count,
                skipped = root_report.skipped_count,
                failed = root_report.failures.len(),
                "root scanned"
            );
            report.merge(root_report);
            if report.cancelled {
                tracing::warn!(%pipeline, "scan cancelled; remaining roots not visited");
                break;
            }
        }

        Ok(report)
    }

    /// Remove stored records under `roots` whose file no longer exists.
    /// Returns the number of records removed.
    pub async fn prune(&self, roots: &[PathBuf], pipeline: Pipeline) -> Result<u64> {
        let roots = self.resolve_roots(roots).await?;
        let mut removed = 0u64;

        for root in &roots {
            let stored = match pipeline {
                Pipeline::Images => self.index.media_paths_under(root).await?,
                Pipeline::Documents => self.vectors.ids_under(root).await?,
            };

            for path in stored {
                if tokio::fs::try_exists(&path).await.unwrap_or(true) {
                    continue;
                }
                let deleted = match pipeline {
                    Pipeline::Images => self.index.delete_media(&path).await?,
                    Pipeline::Documents => self.vectors.delete(&path).await?,
                };
                if deleted {
                    tracing::info!(%path, %pipeline, "pruned orphaned record");
                    removed += 1;
                }
            }
        }

        Ok(removed)
    }

    async fn resolve_roots(&self, roots: &[PathBuf]) -> Result<Vec<PathBuf>> {
        if roots.is_empty() {
            return Err(IndexError::InvalidRequest("no roots to scan".to_string()));
        }

        let mut resolved = Vec::with_capacity(roots.len());
        for root in roots {
            let canonical = tokio::fs::canonicalize(root)
                .await
                .map_err(|_| IndexError::not_found(format!("root directory {}", root.display())))?;
            if !canonical.is_dir() {
                return Err(IndexError::not_found(format!(
                    "root directory {}",
                    root.display()
                )));
            }
            resolved.push(canonical);
        }
        Ok(resolved)
    }

    fn filter_for(&self, pipeline: Pipeline) -> Result<FileFilter> {
        let extensions = match pipeline {
            Pipeline::Images => &self.settings.image_extensions,
            Pipeline::Documents => &self.settings.document_extensions,
        };
        FileFilter::new(extensions, &self.settings.exclude_globs)
    }

    async fn scan_root(
        &self,
        root: &Path,
        pipeline: Pipeline,
        filter: &FileFilter,
        cancel: &CancellationToken,
    ) -> Result<ScanReport> {
        let mut report = ScanReport::default();

        let walk_root = root.to_path_buf();
        let walk_filter = filter.clone();
        let follow = self.settings.follow_symlinks;
        let (files, walk_failures) =
            tokio::task::spawn_blocking(move || enumerate_files(&walk_root, &walk_filter, follow))
                .await
                .map_err(|e| IndexError::Io(std::io::Error::other(e)))?;
        report.failures.extend(walk_failures);

        for path in files {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            report.seen_count += 1;

            let outcome = match pipeline {
                Pipeline::Images => self.index_image(&path).await,
                Pipeline::Documents => self.index_document(&path).await,
            };

            match outcome {
                Ok(FileOutcome::Indexed) => report.indexed_count += 1,
                Ok(FileOutcome::Unchanged) => {
                    tracing::debug!(path = %path.display(), "unchanged; skipped");
                    report.skipped_count += 1;
                }
                Err(err) => {
                    let failure = classify_failure(&path, err)?;
                    if failure.kind == FailureKind::StorageIntegrity {
                        tracing::error!(path = %path.display(), error = %failure.message, "file rolled back");
                    } else {
                        tracing::warn!(path = %path.display(), kind = ?failure.kind, error = %failure.message, "file not indexed");
                    }
                    report.failures.push(failure);
                }
            }
        }

        Ok(report)
    }

    async fn index_image(&self, path: &Path) -> Result<FileOutcome> {
        let key = path_key(path);
        let stored_hash = self
            .index
            .find_media_by_path(&key)
            .await?
            .map(|media| media.content_hash);

        if let Some(stored) = stored_hash.as_deref() {
            if hash_file(path).await? == stored {
                return Ok(FileOutcome::Unchanged);
            }
        }

        let (bytes, last_modified) = read_file(path).await?;
        // The file may have changed since it was hashed; record the digest of
        // the bytes that are actually extracted.
        let content_hash = fingerprint(&bytes);
        if stored_hash.as_deref() == Some(content_hash.as_str()) {
            return Ok(FileOutcome::Unchanged);
        }

        let size_bytes = bytes.len() as u64;
        let normalized = tokio::task::spawn_blocking(move || normalize_image(&bytes))
            .await
            .map_err(|e| IndexError::Io(std::io::Error::other(e)))?
            .map_err(|source| IndexError::Extraction {
                path: path.to_path_buf(),
                source,
            })?;

        let min_confidence = self.settings.min_face_confidence;
        let faces: Vec<_> = self
            .faces
            .extract_faces(&normalized.jpeg)
            .await?
            .into_iter()
            .filter(|face| face.confidence >= min_confidence)
            .collect();

        let media = NewMediaFile {
            path: key,
            content_hash,
            last_modified,
            metadata: normalized.metadata(size_bytes),
        };

        match self.index.replace_media(&media, &faces).await? {
            ReplaceOutcome::Written { media_file_id } => {
                tracing::debug!(path = %path.display(), media_file_id, faces = faces.len(), "image indexed");
                Ok(FileOutcome::Indexed)
            }
            ReplaceOutcome::AlreadyCurrent { .. } => Ok(FileOutcome::Unchanged),
        }
    }

    async fn index_document(&self, path: &Path) -> Result<FileOutcome> {
        let key = path_key(path);
        // A dimensionality change means the embedding model changed.
        let current_hash = self
            .vectors
            .version(&key)
            .await?
            .filter(|version| version.dims == self.embedder.dims())
            .and_then(|version| version.content_hash);

        if let Some(current) = current_hash.as_deref() {
            if hash_file(path).await? == current {
                return Ok(FileOutcome::Unchanged);
            }
        }

        let (bytes, last_modified) = read_file(path).await?;
        let content_hash = fingerprint(&bytes);
        if current_hash.as_deref() == Some(content_hash.as_str()) {
            return Ok(FileOutcome::Unchanged);
        }

        let size_bytes = bytes.len() as u64;
        let owned_path = path.to_path_buf();
        let text = tokio::task::spawn_blocking(move || extract_document_text(&owned_path, &bytes))
            .await
            .map_err(|e| IndexError::Io(std::io::Error::other(e)))?
            .map_err(|source| IndexError::Extraction {
                path: path.to_path_buf(),
                source,
            })?;

        let input = truncate_chars(&text, self.settings.max_input_chars);
        let vector = embed_one(self.embedder.as_ref(), input)
            .await
            .map_err(IndexError::unavailable)?;

        let metadata = serde_json::json!({
            "source_path": key,
            "content_hash": content_hash,
            "last_modified": last_modified,
            "size_bytes": size_bytes,
            "extension": extension_of(path),
        });

        self.vectors.upsert(&key, &vector, &text, &metadata).await?;
        tracing::debug!(path = %path.display(), dims = vector.len(), "document indexed");
        Ok(FileOutcome::Indexed)
    }
}

/// Extension allow-list plus exclude globs, matched against root-relative paths.
#[derive(Clone)]
struct FileFilter {
    extensions: HashSet<String>,
    excludes: GlobSet,
}

impl FileFilter {
    fn new(extensions: &[String], exclude_globs: &[String]) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        for pattern in DEFAULT_EXCLUDES
            .iter()
            .map(|s| s.to_string())
            .chain(exclude_globs.iter().cloned())
        {
            let glob = Glob::new(&pattern)
                .map_err(|e| IndexError::Config(format!("bad exclude glob '{}': {}", pattern, e)))?;
            builder.add(glob);
        }
        let excludes = builder
            .build()
            .map_err(|e| IndexError::Config(e.to_string()))?;

        Ok(Self {
            extensions: extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            excludes,
        })
    }

    fn accepts(&self, relative: &Path) -> bool {
        let eligible = extension_of(relative)
            .map(|ext| self.extensions.contains(&ext))
            .unwrap_or(false);
        eligible && !self.excludes.is_match(relative)
    }
}

/// Walk `root`, returning eligible files and any entries that could not be read.
fn enumerate_files(
    root: &Path,
    filter: &FileFilter,
    follow_symlinks: bool,
) -> (Vec<PathBuf>, Vec<ScanFailure>) {
    let mut files = Vec::new();
    let mut failures = Vec::new();

    for entry in WalkDir::new(root).follow_links(follow_symlinks) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                failures.push(ScanFailure {
                    path: e.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf()),
                    kind: FailureKind::Unreadable,
                    message: e.to_string(),
                });
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
        if filter.accepts(relative) {
            files.push(entry.into_path());
        }
    }

    (files, failures)
}

fn classify_failure(path: &Path, err: IndexError) -> Result<ScanFailure> {
    let kind = match &err {
        IndexError::Io(_) => FailureKind::Unreadable,
        IndexError::Extraction { .. } => FailureKind::Extraction,
        IndexError::ServiceUnavailable(_) => FailureKind::Upstream,
        IndexError::StorageIntegrity(_) => FailureKind::StorageIntegrity,
        _ => return Err(err),
    };
    Ok(ScanFailure {
        path: path.to_path_buf(),
        kind,
        message: err.to_string(),
    })
}

/// Streamed SHA-256 of the file, so unchanged files are never loaded whole.
/// Only a skip decision rests on this digest; what gets stored is the
/// fingerprint of the bytes actually read.
async fn hash_file(path: &Path) -> Result<String> {
    let owned = path.to_path_buf();
    let digest = tokio::task::spawn_blocking(move || fingerprint_file(&owned))
        .await
        .map_err(|e| IndexError::Io(std::io::Error::other(e)))??;
    Ok(digest)
}

async fn read_file(path: &Path) -> Result<(Vec<u8>, i64)> {
    let metadata = tokio::fs::metadata(path).await?;
    let last_modified = metadata
        .modified()
        .ok()
        .and_then(|m| m.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);
    let bytes = tokio::fs::read(path).await?;
    Ok((bytes, last_modified))
}

fn path_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
