//! Read-side queries over both stores.
//!
//! - [`QueryService::find_by_person`]: every stored face linked to a named
//!   person, with its media path and region.
//! - [`QueryService::semantic_search`]: the `k` documents whose embeddings are
//!   closest to the query text's embedding.
//!
//! Queries never write. A person lookup touches only the Index Store; a
//! semantic search needs the embedding provider to be reachable and fails
//! with [`IndexError::ServiceUnavailable`] (retryable) when it is not.

use std::sync::Arc;

use crate::config::RetrievalConfig;
use crate::embedding::{embed_one, EmbeddingProvider};
use crate::error::{IndexError, Result};
use crate::index_store::IndexStore;
use crate::models::{PersonMatch, SemanticHit};
use crate::vector_store::VectorStore;

pub struct QueryService {
    index: IndexStore,
    vectors: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    retrieval: RetrievalConfig,
}

impl QueryService {
    pub fn new(
        index: IndexStore,
        vectors: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        retrieval: RetrievalConfig,
    ) -> Self {
        Self {
            index,
            vectors,
            embedder,
            retrieval,
        }
    }

    /// All faces linked to the person called `name`.
    ///
    /// An unknown name is `NotFound`; a known person with no linked faces is
    /// an empty list. Order is unspecified.
    pub async fn find_by_person(&self, name: &str) -> Result<Vec<PersonMatch>> {
        let person = self
            .index
            .find_person_by_name(name)
            .await?
            .ok_or_else(|| IndexError::not_found(format!("person '{}'", name.trim())))?;

        self.index.find_faces_by_person(person.id).await
    }

    /// Up to `k` documents, most similar first. `k` defaults to
    /// `retrieval.default_k` and may not exceed `retrieval.max_k`.
    pub async fn semantic_search(&self, query: &str, k: Option<usize>) -> Result<Vec<SemanticHit>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(IndexError::InvalidRequest(
                "query must not be empty".to_string(),
            ));
        }

        let k = k.unwrap_or(self.retrieval.default_k);
        if k == 0 || k > self.retrieval.max_k {
            return Err(IndexError::InvalidRequest(format!(
                "k must be between 1 and {}",
                self.retrieval.max_k
            )));
        }

        if !self.embedder.is_enabled() {
            return Err(IndexError::unavailable(
                "embedding provider is disabled; semantic search is not available",
            ));
        }

        let vector = embed_one(self.embedder.as_ref(), query)
            .await
            .map_err(IndexError::unavailable)?;

        let hits = self.vectors.query(&vector, k).await?;
        tracing::debug!(k, returned = hits.len(), "semantic search");

        Ok(hits
            .into_iter()
            .map(|hit| SemanticHit {
                id: hit.id,
                text: hit.text,
                score: 1.0 - hit.distance,
            })
            .collect())
    }
}
