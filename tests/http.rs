//! HTTP API tests: the router served on an ephemeral port, driven with reqwest.

use async_trait::async_trait;
use image::{Rgb, RgbImage};
use serde_json::{json, Value};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use homebase_index::config::Config;
use homebase_index::db;
use homebase_index::embedding::EmbeddingProvider;
use homebase_index::face::{DetectError, FaceExtractor};
use homebase_index::migrate::apply_schema;
use homebase_index::models::{BoundingRegion, DetectedFace};
use homebase_index::server;
use homebase_index::services::Services;
use homebase_index::vector_store::MemoryVectorStore;

/// Always finds exactly one face in the top-left corner.
struct OneFace;

#[async_trait]
impl FaceExtractor for OneFace {
    fn name(&self) -> &str {
        "one"
    }

    async fn detect(&self, _image: &[u8]) -> Result<Vec<DetectedFace>, DetectError> {
        Ok(vec![DetectedFace {
            region: BoundingRegion { x: 0, y: 0, width: 4, height: 4 },
            embedding: vec![1.0, 0.0],
            confidence: 0.99,
        }])
    }
}

/// `[has "boat", has "tree"]`; anything mentioning neither is an outage.
struct TwoWordEmbedder;

#[async_trait]
impl EmbeddingProvider for TwoWordEmbedder {
    fn model_name(&self) -> &str {
        "two-word"
    }

    fn dims(&self) -> usize {
        2
    }

    async fn embed_texts(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        texts
            .iter()
            .map(|t| {
                let v = vec![
                    t.contains("boat") as u8 as f32,
                    t.contains("tree") as u8 as f32,
                ];
                if v.iter().all(|x| *x == 0.0) {
                    anyhow::bail!("embedding service timed out");
                }
                Ok(v)
            })
            .collect()
    }
}

struct TestServer {
    _tmp: TempDir,
    base: String,
    photos: PathBuf,
    docs: PathBuf,
    shutdown: CancellationToken,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn start() -> TestServer {
    let tmp = TempDir::new().unwrap();
    let photos = tmp.path().join("photos");
    let docs = tmp.path().join("docs");
    fs::create_dir_all(&photos).unwrap();
    fs::create_dir_all(&docs).unwrap();
    RgbImage::from_pixel(8, 8, Rgb([1, 2, 3]))
        .save(photos.join("harbour.png"))
        .unwrap();
    fs::write(docs.join("sailing.txt"), "a boat in the harbour").unwrap();
    fs::write(docs.join("forest.txt"), "a tree in the forest").unwrap();

    let mut config = Config::with_db_path(tmp.path().join("hbi.sqlite"));
    config.scan.image_roots = vec![photos.clone()];
    let pool = db::connect(&config).await.unwrap();
    apply_schema(&pool).await.unwrap();
    let services = Services::from_parts(
        config,
        pool,
        Arc::new(MemoryVectorStore::new()),
        Arc::new(OneFace),
        Arc::new(TwoWordEmbedder),
    );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let shutdown = CancellationToken::new();
    tokio::spawn(server::serve(listener, services, shutdown.clone()));

    TestServer {
        _tmp: tmp,
        base,
        photos,
        docs,
        shutdown,
    }
}

#[tokio::test]
async fn health_reports_version() {
    let srv = start().await;
    let body: Value = reqwest::get(format!("{}/health", srv.base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn scan_link_and_find_person() {
    let srv = start().await;
    let client = reqwest::Client::new();

    // Roots omitted: the configured image roots are used.
    let report: Value = client
        .post(format!("{}/scan", srv.base))
        .json(&json!({ "pipeline": "images" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(report["indexed_count"], 1);
    assert_eq!(report["cancelled"], false);

    let resp = client
        .post(format!("{}/persons", srv.base))
        .json(&json!({ "name": "Alice" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);

    let dup = client
        .post(format!("{}/persons", srv.base))
        .json(&json!({ "name": "Alice" }))
        .send()
        .await
        .unwrap();
    assert_eq!(dup.status(), 409);

    let faces: Value = client
        .get(format!("{}/faces?unresolved=true", srv.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let face_id = faces[0]["id"].as_i64().unwrap();
    assert_eq!(faces[0]["assignment"]["state"], "unresolved");

    let linked = client
        .post(format!("{}/faces/{}/link", srv.base, face_id))
        .json(&json!({ "person": "Alice" }))
        .send()
        .await
        .unwrap();
    assert_eq!(linked.status(), 204);

    let matches: Value = client
        .get(format!("{}/search/person", srv.base))
        .query(&[("name", "Alice")])
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(matches.as_array().unwrap().len(), 1);
    assert!(matches[0]["path"].as_str().unwrap().ends_with("harbour.png"));
    assert_eq!(matches[0]["region"]["width"], 4);

    let unknown = client
        .get(format!("{}/search/person", srv.base))
        .query(&[("name", "Bob")])
        .send()
        .await
        .unwrap();
    assert_eq!(unknown.status(), 404);
    let body: Value = unknown.json().await.unwrap();
    assert_eq!(body["error"]["code"], "not_found");

    let unlinked = client
        .post(format!("{}/faces/{}/unlink", srv.base, face_id))
        .send()
        .await
        .unwrap();
    assert_eq!(unlinked.status(), 204);

    let stats: Value = client
        .get(format!("{}/stats", srv.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stats["media_files"], 1);
    assert_eq!(stats["unresolved_faces"], 1);
    assert_eq!(stats["persons"], 1);
}

#[tokio::test]
async fn document_search_and_error_mapping() {
    let srv = start().await;
    let client = reqwest::Client::new();

    let report: Value = client
        .post(format!("{}/scan", srv.base))
        .json(&json!({ "pipeline": "documents", "roots": [srv.docs] }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(report["indexed_count"], 2);

    let hits: Value = client
        .get(format!("{}/search/documents", srv.base))
        .query(&[("query", "boat"), ("k", "1")])
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(hits.as_array().unwrap().len(), 1);
    assert!(hits[0]["id"].as_str().unwrap().ends_with("sailing.txt"));

    let empty = client
        .get(format!("{}/search/documents", srv.base))
        .query(&[("query", "  ")])
        .send()
        .await
        .unwrap();
    assert_eq!(empty.status(), 400);

    let outage = client
        .get(format!("{}/search/documents", srv.base))
        .query(&[("query", "weather")])
        .send()
        .await
        .unwrap();
    assert_eq!(outage.status(), 503);
    let body: Value = outage.json().await.unwrap();
    assert_eq!(body["error"]["retryable"], true);

    let missing = client
        .post(format!("{}/scan", srv.base))
        .json(&json!({ "pipeline": "images", "roots": [srv.photos.join("gone")] }))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), 404);

    fs::remove_file(srv.docs.join("forest.txt")).unwrap();
    let pruned: Value = client
        .post(format!("{}/prune", srv.base))
        .json(&json!({ "pipeline": "documents", "roots": [srv.docs] }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(pruned["removed_count"], 1);
}
