use crate::error::{Result, VectorStoreError};
use image::{DynamicImage, ImageFormat};
use std::path::{Path, PathBuf};
use tokio::task::spawn_blocking;

/// Raster formats accepted in a reference collection, matched case-insensitively.
pub const SUPPORTED_IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "gif"];

#[must_use]
pub fn has_supported_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            SUPPORTED_IMAGE_EXTENSIONS
                .iter()
                .any(|candidate| ext.eq_ignore_ascii_case(candidate))
        })
}

/// Decode an image file off the async runtime. The format is sniffed from the
/// content, so a mislabelled extension still decodes.
pub async fn decode_image(path: &Path) -> Result<DynamicImage> {
    let owned: PathBuf = path.to_path_buf();
    spawn_blocking(move || decode_image_blocking(&owned))
        .await
        .map_err(|e| VectorStoreError::EncoderError(format!("Join error: {e}")))?
}

pub fn decode_image_blocking(path: &Path) -> Result<DynamicImage> {
    let bytes = std::fs::read(path).map_err(|e| VectorStoreError::ImageDecode {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    decode_image_bytes(&bytes, path)
}

/// Decode an in-memory image; `origin` only labels the error.
pub fn decode_image_bytes(bytes: &[u8], origin: &Path) -> Result<DynamicImage> {
    image::load_from_memory(bytes).map_err(|e| VectorStoreError::ImageDecode {
        path: origin.to_path_buf(),
        reason: e.to_string(),
    })
}

/// MIME type of the sniffed image format, if the bytes look like an image.
#[must_use]
pub fn sniff_mime_type(bytes: &[u8]) -> Option<&'static str> {
    let format = image::guess_format(bytes).ok()?;
    Some(mime_for_format(format))
}

fn mime_for_format(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::Png => "image/png",
        ImageFormat::Jpeg => "image/jpeg",
        ImageFormat::Gif => "image/gif",
        ImageFormat::Bmp => "image/bmp",
        ImageFormat::WebP => "image/webp",
        ImageFormat::Tiff => "image/tiff",
        ImageFormat::Ico => "image/x-icon",
        _ => "application/octet-stream",
    }
}
