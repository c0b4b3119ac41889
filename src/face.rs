//! Face extractor abstraction and implementations.
//!
//! - **[`DisabledFaceExtractor`]**: finds no faces; used when no detector is configured.
//! - **[`HttpFaceExtractor`]**: posts normalized JPEG bytes to a detection
//!   service and parses `{ "faces": [{ "box", "embedding", "confidence" }] }`.
//!
//! Implementors provide [`FaceExtractor::detect`], which reports failures as a
//! [`DetectError`]. Callers use [`FaceExtractor::extract_faces`]: a detector
//! that cannot handle one image yields zero faces and a warning, while an
//! unavailable detector is an [`IndexError::ServiceUnavailable`] so nothing is
//! recorded for the image and the next scan tries again.

use anyhow::bail;
use async_trait::async_trait;
use base64::Engine;
use std::time::Duration;

use crate::config::FaceConfig;
use crate::embedding::post_with_retry;
use crate::error::{IndexError, RemoteError};
use crate::models::{BoundingRegion, DetectedFace};

/// Why detection produced no result.
#[derive(Debug, thiserror::Error)]
pub enum DetectError {
    /// The detector refused or could not process this particular image.
    #[error("detector rejected image: {0}")]
    BadImage(String),

    /// The detector itself is down, timed out or answered with garbage.
    #[error("face detector unavailable: {0}")]
    Unavailable(String),
}

impl From<RemoteError> for DetectError {
    fn from(err: RemoteError) -> Self {
        match &err {
            RemoteError::Rejected { .. } => DetectError::BadImage(err.to_string()),
            RemoteError::Unavailable(_) => DetectError::Unavailable(err.to_string()),
        }
    }
}

#[async_trait]
pub trait FaceExtractor: Send + Sync {
    /// Short identifier used in logs (e.g. `"http"`).
    fn name(&self) -> &str;

    /// Run detection on normalized image bytes.
    async fn detect(&self, image: &[u8]) -> Result<Vec<DetectedFace>, DetectError>;

    /// Detect faces. A per-image failure becomes an empty result plus a
    /// warning; an unavailable detector is returned as an error.
    async fn extract_faces(&self, image: &[u8]) -> crate::error::Result<Vec<DetectedFace>> {
        match self.detect(image).await {
            Ok(faces) => Ok(faces),
            Err(DetectError::BadImage(reason)) => {
                tracing::warn!(extractor = self.name(), %reason, "face detection failed; recording zero faces");
                Ok(Vec::new())
            }
            Err(err @ DetectError::Unavailable(_)) => Err(IndexError::unavailable(err)),
        }
    }
}

/// Build the configured face extractor.
pub fn create_face_extractor(config: &FaceConfig) -> anyhow::Result<Box<dyn FaceExtractor>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledFaceExtractor)),
        "http" => Ok(Box::new(HttpFaceExtractor::new(config)?)),
        other => bail!("Unknown face provider: {}", other),
    }
}

// ============ Disabled ============

pub struct DisabledFaceExtractor;

#[async_trait]
impl FaceExtractor for DisabledFaceExtractor {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn detect(&self, _image: &[u8]) -> Result<Vec<DetectedFace>, DetectError> {
        Ok(Vec::new())
    }
}

// ============ HTTP detection service ============

/// Face detector backed by a remote service.
///
/// Calls `POST {url}/detect` with `{"image": "<base64 jpeg>"}` using the same
/// retry policy as the embedding clients. A non-retryable 4xx means the service
/// refused this image; everything else that goes wrong means it is unavailable.
pub struct HttpFaceExtractor {
    client: reqwest::Client,
    endpoint: String,
    max_retries: u32,
}

impl HttpFaceExtractor {
    pub fn new(config: &FaceConfig) -> anyhow::Result<Self> {
        let url = config
            .url
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("faces.url required for http provider"))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/detect", url.trim_end_matches('/')),
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl FaceExtractor for HttpFaceExtractor {
    fn name(&self) -> &str {
        "http"
    }

    async fn detect(&self, image: &[u8]) -> Result<Vec<DetectedFace>, DetectError> {
        let body = serde_json::json!({
            "image": base64::engine::general_purpose::STANDARD.encode(image),
        });
        let json = post_with_retry(self.max_retries, "face service", || {
            self.client.post(&self.endpoint).json(&body)
        })
        .await?;
        parse_detect_response(&json).map_err(|e| DetectError::Unavailable(e.to_string()))
    }
}

/// Parse the detection service's response body.
fn parse_detect_response(json: &serde_json::Value) -> anyhow::Result<Vec<DetectedFace>> {
    let faces = json
        .get("faces")
        .and_then(|f| f.as_array())
        .ok_or_else(|| anyhow::anyhow!("invalid face response: missing faces array"))?;

    faces
        .iter()
        .map(|face| {
            let bbox = face
                .get("box")
                .ok_or_else(|| anyhow::anyhow!("invalid face response: missing box"))?;
            let coord = |key: &str| -> anyhow::Result<u32> {
                bbox.get(key)
                    .and_then(|v| v.as_f64())
                    .filter(|v| *v >= 0.0)
                    .map(|v| v.round() as u32)
                    .ok_or_else(|| anyhow::anyhow!("invalid face response: bad box.{}", key))
            };
            let region = BoundingRegion {
                x: coord("x")?,
                y: coord("y")?,
                width: coord("width")?,
                height: coord("height")?,
            };

            let embedding = face
                .get("embedding")
                .and_then(|e| e.as_array())
                .ok_or_else(|| anyhow::anyhow!("invalid face response: missing embedding"))?
                .iter()
                .map(|v| {
                    v.as_f64()
                        .map(|f| f as f32)
                        .ok_or_else(|| anyhow::anyhow!("invalid face response: non-numeric embedding"))
                })
                .collect::<anyhow::Result<Vec<f32>>>()?;

            let confidence = face
                .get("confidence")
                .and_then(|c| c.as_f64())
                .unwrap_or(1.0) as f32;

            Ok(DetectedFace {
                region,
                embedding,
                confidence,
            })
        })
        .collect()
}
