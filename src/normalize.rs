//! Image normalization.
//!
//! Face extractors only ever see canonical RGB JPEG bytes. Anything the
//! `image` crate cannot decode (corrupt files, HEIC/HEIF containers) is an
//! [`ExtractError::Decode`] and the scanner skips the file.

use image::{DynamicImage, ImageFormat};
use std::io::Cursor;

use crate::error::ExtractError;

const JPEG_FORMAT: &str = "jpeg";

/// Decoded, re-encoded image plus the facts recorded as media metadata.
#[derive(Debug, Clone)]
pub struct NormalizedImage {
    pub jpeg: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Format the source bytes were in (lowercase, e.g. `"png"`).
    pub source_format: String,
}

impl NormalizedImage {
    pub fn metadata(&self, size_bytes: u64) -> serde_json::Value {
        serde_json::json!({
            "format": self.source_format,
            "width": self.width,
            "height": self.height,
            "size_bytes": size_bytes,
        })
    }
}

/// Decode arbitrary image bytes and re-encode them as RGB JPEG.
///
/// Alpha channels are flattened by dropping them; the face extractor does not
/// care about transparency.
pub fn normalize_image(bytes: &[u8]) -> Result<NormalizedImage, ExtractError> {
    let format = image::guess_format(bytes).map_err(|e| ExtractError::Decode(e.to_string()))?;
    let decoded =
        image::load_from_memory_with_format(bytes, format).map_err(|e| ExtractError::Decode(e.to_string()))?;

    let rgb = DynamicImage::ImageRgb8(decoded.to_rgb8());
    let mut jpeg = Vec::new();
    rgb.write_to(&mut Cursor::new(&mut jpeg), ImageFormat::Jpeg)
        .map_err(|e| ExtractError::Decode(e.to_string()))?;

    Ok(NormalizedImage {
        jpeg,
        width: rgb.width(),
        height: rgb.height(),
        source_format: format_name(format),
    })
}

fn format_name(format: ImageFormat) -> String {
    match format {
        ImageFormat::Jpeg => JPEG_FORMAT.to_string(),
        other => other
            .extensions_str()
            .first()
            .map(|ext| ext.to_string())
            .unwrap_or_else(|| format!("{:?}", other).to_lowercase()),
    }
}
