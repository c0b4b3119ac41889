//! HTTP server.
//!
//! Exposes scanning, person management and both queries as a JSON API for
//! local tools and front-ends.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/scan` | Scan roots for one pipeline; returns the scan report |
//! | `POST` | `/prune` | Remove records whose files are gone |
//! | `GET`  | `/search/person?name=` | Faces linked to a named person |
//! | `GET`  | `/search/documents?query=&k=` | Semantic document search |
//! | `GET`  | `/persons` | List persons |
//! | `POST` | `/persons` | Create a person |
//! | `GET`  | `/faces?unresolved=` | List faces |
//! | `POST` | `/faces/{id}/link` | Link a face to a person |
//! | `POST` | `/faces/{id}/unlink` | Return a face to unresolved |
//! | `GET`  | `/stats` | Index counts |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "not_found", "message": "person 'Bob' not found", "retryable": false } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `conflict` (409),
//! `unavailable` (503, retryable), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so browser front-ends on
//! other local ports can call the API.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};

use crate::error::IndexError;
use crate::models::{FaceRecord, Person, PersonMatch, Pipeline, ScanReport, SemanticHit};
use crate::services::Services;
use crate::stats::{collect_stats, IndexStats};

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
struct AppState {
    services: Services,
    /// Cancelled on shutdown; running scans stop between files.
    shutdown: CancellationToken,
}

/// Build the router. Exposed separately from [`run_server`] so tests can
/// serve it on an ephemeral port.
pub fn router(services: Services, shutdown: CancellationToken) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/scan", post(handle_scan))
        .route("/prune", post(handle_prune))
        .route("/search/person", get(handle_find_by_person))
        .route("/search/documents", get(handle_semantic_search))
        .route("/persons", get(handle_list_persons).post(handle_create_person))
        .route("/faces", get(handle_list_faces))
        .route("/faces/{id}/link", post(handle_link_face))
        .route("/faces/{id}/unlink", post(handle_unlink_face))
        .route("/stats", get(handle_stats))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(AppState { services, shutdown })
}

/// Serve on an already-bound listener until `shutdown` is cancelled.
pub async fn serve(
    listener: TcpListener,
    services: Services,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let app = router(services, shutdown.clone());
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}

/// Starts the HTTP server on `[server].bind` and runs until Ctrl-C.
pub async fn run_server(services: Services) -> anyhow::Result<()> {
    let bind_addr = services.config.server.bind.clone();
    let listener = TcpListener::bind(&bind_addr).await?;
    tracing::info!("listening on http://{}", bind_addr);

    let shutdown = CancellationToken::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutting down");
            trigger.cancel();
        }
    });

    serve(listener, services, shutdown).await
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    /// Machine-readable error code (e.g., `"bad_request"`, `"not_found"`).
    code: String,
    message: String,
    retryable: bool,
}

/// Internal error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
    retryable: bool,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
                retryable: self.retryable,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<IndexError> for AppError {
    fn from(err: IndexError) -> Self {
        let (status, code) = match &err {
            IndexError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            IndexError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            IndexError::AlreadyExists(_) | IndexError::StorageIntegrity(_) => {
                (StatusCode::CONFLICT, "conflict")
            }
            IndexError::ServiceUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "unavailable"),
            IndexError::Extraction { .. }
            | IndexError::Storage(_)
            | IndexError::Io(_)
            | IndexError::Config(_) => {
                tracing::error!(error = %err, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal")
            }
        };
        AppError {
            status,
            code,
            retryable: err.is_retryable(),
            message: err.to_string(),
        }
    }
}

type ApiResult<T> = Result<Json<T>, AppError>;

// ============ Scanning ============

#[derive(Deserialize)]
struct ScanRequest {
    pipeline: Pipeline,
    /// Roots to scan; the configured roots for the pipeline when omitted.
    #[serde(default)]
    roots: Vec<PathBuf>,
}

impl ScanRequest {
    fn roots(&self, services: &Services) -> Vec<PathBuf> {
        if !self.roots.is_empty() {
            return self.roots.clone();
        }
        match self.pipeline {
            Pipeline::Images => services.config.scan.image_roots.clone(),
            Pipeline::Documents => services.config.scan.document_roots.clone(),
        }
    }
}

async fn handle_scan(
    State(state): State<AppState>,
    Json(req): Json<ScanRequest>,
) -> ApiResult<ScanReport> {
    let roots = req.roots(&state.services);
    let cancel = state.shutdown.child_token();
    let report = state
        .services
        .scanner
        .scan(&roots, req.pipeline, &cancel)
        .await?;
    Ok(Json(report))
}

#[derive(Serialize)]
struct PruneResponse {
    removed_count: u64,
}

async fn handle_prune(
    State(state): State<AppState>,
    Json(req): Json<ScanRequest>,
) -> ApiResult<PruneResponse> {
    let roots = req.roots(&state.services);
    let removed = state.services.scanner.prune(&roots, req.pipeline).await?;
    Ok(Json(PruneResponse {
        removed_count: removed,
    }))
}

// ============ Queries ============

#[derive(Deserialize)]
struct PersonQuery {
    name: String,
}

async fn handle_find_by_person(
    State(state): State<AppState>,
    Query(q): Query<PersonQuery>,
) -> ApiResult<Vec<PersonMatch>> {
    Ok(Json(state.services.query.find_by_person(&q.name).await?))
}

#[derive(Deserialize)]
struct DocumentQuery {
    query: String,
    k: Option<usize>,
}

async fn handle_semantic_search(
    State(state): State<AppState>,
    Query(q): Query<DocumentQuery>,
) -> ApiResult<Vec<SemanticHit>> {
    Ok(Json(
        state.services.query.semantic_search(&q.query, q.k).await?,
    ))
}

// ============ Persons & faces ============

#[derive(Deserialize)]
struct CreatePerson {
    name: String,
}

async fn handle_create_person(
    State(state): State<AppState>,
    Json(req): Json<CreatePerson>,
) -> Result<(StatusCode, Json<Person>), AppError> {
    let person = state.services.index.create_person(&req.name).await?;
    Ok((StatusCode::CREATED, Json(person)))
}

async fn handle_list_persons(State(state): State<AppState>) -> ApiResult<Vec<Person>> {
    Ok(Json(state.services.index.list_persons().await?))
}

#[derive(Deserialize)]
struct FaceFilter {
    #[serde(default)]
    unresolved: bool,
}

async fn handle_list_faces(
    State(state): State<AppState>,
    Query(filter): Query<FaceFilter>,
) -> ApiResult<Vec<FaceRecord>> {
    Ok(Json(state.services.index.list_faces(filter.unresolved).await?))
}

#[derive(Deserialize)]
struct LinkRequest {
    person: String,
}

async fn handle_link_face(
    State(state): State<AppState>,
    Path(face_id): Path<i64>,
    Json(req): Json<LinkRequest>,
) -> Result<StatusCode, AppError> {
    let index = &state.services.index;
    let person = index
        .find_person_by_name(&req.person)
        .await?
        .ok_or_else(|| IndexError::not_found(format!("person '{}'", req.person.trim())))?;
    index.link_face(face_id, person.id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn handle_unlink_face(
    State(state): State<AppState>,
    Path(face_id): Path<i64>,
) -> Result<StatusCode, AppError> {
    state.services.index.unlink_face(face_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============ Stats & health ============

async fn handle_stats(State(state): State<AppState>) -> ApiResult<IndexStats> {
    Ok(Json(collect_stats(&state.services).await?))
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
