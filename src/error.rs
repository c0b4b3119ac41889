//! Error taxonomy for the indexing core.
//!
//! [`IndexError`] is what the scanner, stores, and query service return.
//! The variants map one-to-one onto how a caller must react:
//!
//! | Variant | Reaction |
//! |---------|----------|
//! | `NotFound` | 404; request aborts cleanly |
//! | `AlreadyExists` / `InvalidRequest` | 409 / 400 |
//! | `Extraction` | recovered per file by the scanner |
//! | `ServiceUnavailable` | recovered per file while scanning; surfaced (503, retryable) by queries |
//! | `StorageIntegrity` | the file's transaction is rolled back and the failure reported |
//! | `Storage` / `Io` / `Config` | the request fails |
//!
//! [`ExtractError`] is the lower-level error produced while turning bytes into
//! something an extractor can consume (decoded images, document text).

use std::path::PathBuf;

/// Errors surfaced by the indexing core.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("{0} already exists")]
    AlreadyExists(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("extraction failed for {path}: {source}")]
    Extraction {
        path: PathBuf,
        #[source]
        source: ExtractError,
    },

    /// A remote extractor could not be reached, timed out, or answered with
    /// something unusable. Always retryable.
    #[error("upstream service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("storage integrity violation: {0}")]
    StorageIntegrity(String),

    #[error("storage error: {0}")]
    Storage(sqlx::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

impl IndexError {
    pub fn not_found(what: impl Into<String>) -> Self {
        IndexError::NotFound(what.into())
    }

    pub fn unavailable(reason: impl std::fmt::Display) -> Self {
        IndexError::ServiceUnavailable(reason.to_string())
    }

    /// Whether retrying the same request later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, IndexError::ServiceUnavailable(_))
    }
}

impl From<sqlx::Error> for IndexError {
    fn from(err: sqlx::Error) -> Self {
        if let Some(db_err) = err.as_database_error() {
            if db_err.is_unique_violation()
                || db_err.is_foreign_key_violation()
                || db_err.is_check_violation()
            {
                return IndexError::StorageIntegrity(db_err.message().to_string());
            }
        }
        IndexError::Storage(err)
    }
}

/// Errors raised while decoding inputs for feature extraction.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("unsupported file type: {0}")]
    Unsupported(String),

    #[error("image decode failed: {0}")]
    Decode(String),

    #[error("PDF extraction failed: {0}")]
    Pdf(String),

    #[error("DOCX extraction failed: {0}")]
    Docx(String),

    #[error("no text content")]
    Empty,
}

/// Failure of a call to a remote model service (embedding or face detection).
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    /// The service answered with a non-retryable 4xx: it understood the
    /// request and refused this input.
    #[error("{label} rejected the request ({status}): {body}")]
    Rejected {
        label: String,
        status: u16,
        body: String,
    },

    /// Unreachable, timed out, 429/5xx after all retries, or an unreadable body.
    #[error("{0}")]
    Unavailable(String),
}

pub type Result<T, E = IndexError> = std::result::Result<T, E>;
