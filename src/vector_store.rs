//! Vector storage for the document pipeline.
//!
//! The [`VectorStore`] trait is the only way documents are written or read:
//! there is no relational document row, so a store's entries are the source
//! of truth for which documents are indexed and at which content hash.
//!
//! Two implementations:
//! - [`SqliteVectorStore`]: the `document_vectors` table, searched by brute-force
//!   cosine distance in Rust (adequate for a personal corpus).
//! - [`MemoryVectorStore`]: a `HashMap` behind an `RwLock`, for tests and
//!   ephemeral use.

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::Path;
use tokio::sync::RwLock;

use crate::embedding::{blob_to_vec, cosine_distance, vec_to_blob};
use crate::error::{IndexError, Result};
use crate::models::{DocumentVersion, StoredDocument, VectorHit};

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or overwrite the entry for `id`.
    async fn upsert(
        &self,
        id: &str,
        vector: &[f32],
        text: &str,
        metadata: &serde_json::Value,
    ) -> Result<()>;

    /// Up to `k` entries closest to `vector`, ascending by cosine distance.
    /// Entries whose dimensionality differs from `vector` are never returned.
    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<VectorHit>>;

    async fn get(&self, id: &str) -> Result<Option<StoredDocument>>;

    /// Content hash and dimensionality of `id`, if stored.
    async fn version(&self, id: &str) -> Result<Option<DocumentVersion>>;

    /// Remove `id`; returns whether it existed.
    async fn delete(&self, id: &str) -> Result<bool>;

    /// Ids of all entries whose id is a path under `root`.
    async fn ids_under(&self, root: &Path) -> Result<Vec<String>>;

    async fn count(&self) -> Result<u64>;
}

/// Rank `(id, distance)` candidates: ascending distance, ties by id.
fn rank<T>(mut scored: Vec<(f32, String, T)>, k: usize) -> Vec<(f32, String, T)> {
    scored.sort_by(|a, b| {
        a.0.partial_cmp(&b.0)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.1.cmp(&b.1))
    });
    scored.truncate(k);
    scored
}

fn check_vector(vector: &[f32]) -> Result<()> {
    if vector.is_empty() {
        return Err(IndexError::InvalidRequest("vector must not be empty".to_string()));
    }
    if vector.iter().any(|v| !v.is_finite()) {
        return Err(IndexError::InvalidRequest(
            "vector contains non-finite values".to_string(),
        ));
    }
    Ok(())
}

// ============ SQLite ============

#[derive(Clone, Debug)]
pub struct SqliteVectorStore {
    pool: SqlitePool,
}

impl SqliteVectorStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn upsert(
        &self,
        id: &str,
        vector: &[f32],
        text: &str,
        metadata: &serde_json::Value,
    ) -> Result<()> {
        check_vector(vector)?;
        sqlx::query(
            r#"
            INSERT INTO document_vectors (id, text, metadata_json, dims, embedding, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                text = excluded.text,
                metadata_json = excluded.metadata_json,
                dims = excluded.dims,
                embedding = excluded.embedding,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(id)
        .bind(text)
        .bind(metadata.to_string())
        .bind(vector.len() as i64)
        .bind(vec_to_blob(vector))
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<VectorHit>> {
        check_vector(vector)?;
        if k == 0 {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            "SELECT id, text, metadata_json, embedding FROM document_vectors WHERE dims = ?",
        )
        .bind(vector.len() as i64)
        .fetch_all(&self.pool)
        .await?;

        let scored = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let distance = cosine_distance(vector, &blob_to_vec(&blob));
                (distance, row.get::<String, _>("id"), row)
            })
            .collect();

        Ok(rank(scored, k)
            .into_iter()
            .map(|(distance, id, row)| {
                let metadata_json: String = row.get("metadata_json");
                VectorHit {
                    id,
                    text: row.get("text"),
                    metadata: serde_json::from_str(&metadata_json)
                        .unwrap_or(serde_json::json!({})),
                    distance,
                }
            })
            .collect())
    }

    async fn get(&self, id: &str) -> Result<Option<StoredDocument>> {
        let row = sqlx::query(
            "SELECT id, text, metadata_json, embedding FROM document_vectors WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| {
            let metadata_json: String = row.get("metadata_json");
            let blob: Vec<u8> = row.get("embedding");
            StoredDocument {
                id: row.get("id"),
                text: row.get("text"),
                metadata: serde_json::from_str(&metadata_json).unwrap_or(serde_json::json!({})),
                vector: blob_to_vec(&blob),
            }
        }))
    }

    async fn version(&self, id: &str) -> Result<Option<DocumentVersion>> {
        let row: Option<(Option<String>, i64)> = sqlx::query_as(
            "SELECT json_extract(metadata_json, '$.content_hash'), dims FROM document_vectors WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(content_hash, dims)| DocumentVersion {
            content_hash,
            dims: dims as usize,
        }))
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM document_vectors WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn ids_under(&self, root: &Path) -> Result<Vec<String>> {
        let ids: Vec<String> = sqlx::query_scalar("SELECT id FROM document_vectors ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(ids
            .into_iter()
            .filter(|id| Path::new(id).starts_with(root))
            .collect())
    }

    async fn count(&self) -> Result<u64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM document_vectors")
            .fetch_one(&self.pool)
            .await?;
        Ok(n as u64)
    }
}

// ============ In-memory ============

#[derive(Default)]
pub struct MemoryVectorStore {
    entries: RwLock<HashMap<String, StoredDocument>>,
}

impl MemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn upsert(
        &self,
        id: &str,
        vector: &[f32],
        text: &str,
        metadata: &serde_json::Value,
    ) -> Result<()> {
        check_vector(vector)?;
        self.entries.write().await.insert(
            id.to_string(),
            StoredDocument {
                id: id.to_string(),
                text: text.to_string(),
                metadata: metadata.clone(),
                vector: vector.to_vec(),
            },
        );
        Ok(())
    }

    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<VectorHit>> {
        check_vector(vector)?;
        let entries = self.entries.read().await;
        let scored = entries
            .values()
            .filter(|doc| doc.vector.len() == vector.len())
            .map(|doc| (cosine_distance(vector, &doc.vector), doc.id.clone(), doc))
            .collect();

        Ok(rank(scored, k)
            .into_iter()
            .map(|(distance, id, doc)| VectorHit {
                id,
                text: doc.text.clone(),
                metadata: doc.metadata.clone(),
                distance,
            })
            .collect())
    }

    async fn get(&self, id: &str) -> Result<Option<StoredDocument>> {
        Ok(self.entries.read().await.get(id).cloned())
    }

    async fn version(&self, id: &str) -> Result<Option<DocumentVersion>> {
        Ok(self.entries.read().await.get(id).map(|doc| DocumentVersion {
            content_hash: doc.content_hash().map(str::to_string),
            dims: doc.vector.len(),
        }))
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        Ok(self.entries.write().await.remove(id).is_some())
    }

    async fn ids_under(&self, root: &Path) -> Result<Vec<String>> {
        let mut ids: Vec<String> = self
            .entries
            .read()
            .await
            .keys()
            .filter(|id| Path::new(id.as_str()).starts_with(root))
            .cloned()
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.entries.read().await.len() as u64)
    }
}
