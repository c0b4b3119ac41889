//! Wiring: one place that turns a [`Config`] into ready-to-use components.
//!
//! The CLI and the HTTP server both start from [`Services::from_config`].
//! Tests build a [`Services`] with [`Services::from_parts`] to swap in fake
//! extractors and an in-memory vector store.

use sqlx::SqlitePool;
use std::sync::Arc;

use crate::config::Config;
use crate::db;
use crate::embedding::{create_provider, EmbeddingProvider};
use crate::error::{IndexError, Result};
use crate::face::{create_face_extractor, FaceExtractor};
use crate::index_store::IndexStore;
use crate::migrate::apply_schema;
use crate::query::QueryService;
use crate::scanner::{ScanSettings, Scanner};
use crate::vector_store::{SqliteVectorStore, VectorStore};

#[derive(Clone)]
pub struct Services {
    pub config: Arc<Config>,
    pub index: IndexStore,
    pub vectors: Arc<dyn VectorStore>,
    pub scanner: Arc<Scanner>,
    pub query: Arc<QueryService>,
}

impl Services {
    /// Open the database (creating the schema if needed) and build the
    /// configured extractors.
    pub async fn from_config(config: Config) -> Result<Self> {
        let pool = db::connect(&config).await?;
        apply_schema(&pool).await?;

        if !config.faces.is_enabled() {
            tracing::info!("face detection disabled; images are indexed without faces");
        }
        let faces: Arc<dyn FaceExtractor> = create_face_extractor(&config.faces)
            .map_err(|e| IndexError::Config(e.to_string()))?
            .into();
        let embedder: Arc<dyn EmbeddingProvider> = create_provider(&config.embedding)
            .map_err(|e| IndexError::Config(e.to_string()))?
            .into();
        let vectors: Arc<dyn VectorStore> = Arc::new(SqliteVectorStore::new(pool.clone()));

        tracing::debug!(
            db = %config.db.path.display(),
            faces = faces.name(),
            embedder = embedder.model_name(),
            "services ready"
        );

        Ok(Self::from_parts(config, pool, vectors, faces, embedder))
    }

    pub fn from_parts(
        config: Config,
        pool: SqlitePool,
        vectors: Arc<dyn VectorStore>,
        faces: Arc<dyn FaceExtractor>,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        let index = IndexStore::new(pool);
        let scanner = Scanner::new(
            index.clone(),
            vectors.clone(),
            faces,
            embedder.clone(),
            ScanSettings::from_config(&config),
        );
        let query = QueryService::new(
            index.clone(),
            vectors.clone(),
            embedder,
            config.retrieval.clone(),
        );

        Self {
            config: Arc::new(config),
            index,
            vectors,
            scanner: Arc::new(scanner),
            query: Arc::new(query),
        }
    }

    pub async fn close(&self) {
        self.index.pool().close().await;
    }
}
