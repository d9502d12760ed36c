//! Image envelope handling for entity add-or-edit requests.
//!
//! Transcoding is CPU-heavy and runs on a blocking worker thread; the
//! tenant is resolved before dispatch so the worker never needs the
//! task-local binding.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::Utc;
use image::codecs::webp::WebPEncoder;
use image::ColorType;
use serde::Deserialize;

use crate::error::AppError;
use crate::storage::BlobStore;

/// Renditions larger than this on either axis are rejected outright.
pub const MAX_DIMENSION: u32 = 5000;

const NAMESPACE: &str = "curtaindb";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageStatus {
    Unchanged,
    Update,
    Remove,
}

impl ImageStatus {
    pub fn parse(value: &str) -> Result<Self, AppError> {
        match value {
            "unchanged" => Ok(ImageStatus::Unchanged),
            "update" => Ok(ImageStatus::Update),
            "remove" => Ok(ImageStatus::Remove),
            other => Err(AppError::BadRequest(format!(
                "invalid image status: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageOutcome {
    Unchanged,
    /// New public URL to persist.
    Stored(String),
    /// Blob deleted; persist NULL.
    Removed,
}

pub fn object_key(tenant: &str, kind: &str, code: &str) -> String {
    format!("{}/{}/{}/pardaaf-{}.webp", NAMESPACE, tenant, kind, code)
}

/// Decode, bounds-check, and re-encode an uploaded raster as WebP.
pub fn transcode_to_webp(bytes: &[u8]) -> Result<Vec<u8>, AppError> {
    let img = image::load_from_memory(bytes)
        .map_err(|e| AppError::BadRequest(format!("unreadable image: {}", e)))?;

    if img.width() > MAX_DIMENSION || img.height() > MAX_DIMENSION {
        return Err(AppError::BadRequest(format!(
            "image exceeds {}x{} pixels",
            MAX_DIMENSION, MAX_DIMENSION
        )));
    }

    let rgba = img.to_rgba8();
    let (width, height) = rgba.dimensions();
    let mut out = Vec::new();
    WebPEncoder::new_lossless(&mut out)
        .encode(rgba.as_raw(), width, height, ColorType::Rgba8)
        .map_err(|e| AppError::Internal(format!("webp encode failed: {}", e)))?;
    Ok(out)
}

#[derive(Clone)]
pub struct ImageService {
    blobs: BlobStore,
}

impl ImageService {
    pub fn new(blobs: BlobStore) -> Self {
        Self { blobs }
    }

    /// Apply an image envelope for `kind`/`code` under `tenant`.
    pub async fn apply(
        &self,
        tenant: &str,
        kind: &str,
        code: &str,
        status: ImageStatus,
        data: Option<String>,
    ) -> Result<ImageOutcome, AppError> {
        match status {
            ImageStatus::Unchanged => Ok(ImageOutcome::Unchanged),
            ImageStatus::Update => {
                let encoded = data.ok_or_else(|| {
                    AppError::BadRequest("image update without image data".to_string())
                })?;
                let bytes = BASE64
                    .decode(encoded.as_bytes())
                    .map_err(|e| AppError::BadRequest(format!("invalid image data: {}", e)))?;

                let webp = tokio::task::spawn_blocking(move || transcode_to_webp(&bytes))
                    .await
                    .map_err(|e| AppError::Internal(format!("image worker failed: {}", e)))??;

                let key = object_key(tenant, kind, code);
                self.blobs
                    .put(&key, webp, "image/webp")
                    .await
                    .map_err(|e| AppError::Internal(e.to_string()))?;

                let url = self.blobs.public_url(&key, Utc::now().timestamp());
                Ok(ImageOutcome::Stored(url))
            }
            ImageStatus::Remove => {
                let key = object_key(tenant, kind, code);
                self.blobs
                    .delete(&key)
                    .await
                    .map_err(|e| AppError::Internal(e.to_string()))?;
                Ok(ImageOutcome::Removed)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbaImage::from_pixel(width, height, image::Rgba([10, 20, 30, 255]));
        let mut out = std::io::Cursor::new(Vec::new());
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut out, image::ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    #[test]
    fn object_key_shape() {
        assert_eq!(
            object_key("gallerya", "product", "p17"),
            "curtaindb/gallerya/product/pardaaf-p17.webp"
        );
    }

    #[test]
    fn status_parses() {
        assert_eq!(ImageStatus::parse("update").unwrap(), ImageStatus::Update);
        assert_eq!(ImageStatus::parse("remove").unwrap(), ImageStatus::Remove);
        assert_eq!(
            ImageStatus::parse("unchanged").unwrap(),
            ImageStatus::Unchanged
        );
        assert!(ImageStatus::parse("delete").is_err());
    }

    #[test]
    fn transcodes_small_png_to_webp() {
        let webp = transcode_to_webp(&png_bytes(32, 16)).unwrap();
        // RIFF....WEBP container header.
        assert_eq!(&webp[0..4], b"RIFF");
        assert_eq!(&webp[8..12], b"WEBP");
    }

    #[test]
    fn oversized_image_is_rejected() {
        let bytes = png_bytes(MAX_DIMENSION + 1, 10);
        let err = transcode_to_webp(&bytes).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[test]
    fn garbage_bytes_are_rejected() {
        assert!(matches!(
            transcode_to_webp(b"not an image"),
            Err(AppError::BadRequest(_))
        ));
    }
}
