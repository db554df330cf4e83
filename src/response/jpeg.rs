//! In-memory JPEG encoding for generated images

use image::{DynamicImage, ImageFormat};
use std::io::Cursor;
use tracing::debug;

use crate::error::{AppError, Result};

pub const CONTENT_TYPE: &str = "image/jpeg";

/// Detect image format from binary data using magic bytes
pub fn detect_image_format(data: &[u8]) -> Option<&'static str> {
    if data.len() < 8 {
        return None;
    }

    // PNG: 89 50 4E 47 0D 0A 1A 0A
    if data.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]) {
        return Some("png");
    }

    // JPEG: FF D8 FF
    if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Some("jpg");
    }

    // WebP: RIFF....WEBP
    if data.len() >= 12 && data.starts_with(b"RIFF") && &data[8..12] == b"WEBP" {
        return Some("webp");
    }

    None
}

/// Produce JPEG bytes for an encoded image.
///
/// JPEG input is returned as-is; anything else is decoded and re-encoded
/// without its alpha channel on the blocking pool.
pub async fn to_jpeg(data: Vec<u8>) -> Result<Vec<u8>> {
    if detect_image_format(&data) == Some("jpg") {
        return Ok(data);
    }

    tokio::task::spawn_blocking(move || reencode(&data))
        .await
        .map_err(|e| AppError::Internal(format!("JPEG encoding task failed: {}", e)))?
}

fn reencode(data: &[u8]) -> Result<Vec<u8>> {
    let decoded = image::load_from_memory(data)
        .map_err(|e| AppError::InvalidRequest(format!("Undecodable image data: {}", e)))?;
    let rgb = DynamicImage::ImageRgb8(decoded.to_rgb8());

    let mut out = Cursor::new(Vec::with_capacity(data.len()));
    rgb.write_to(&mut out, ImageFormat::Jpeg)
        .map_err(|e| AppError::Internal(format!("JPEG encoding failed: {}", e)))?;

    let out = out.into_inner();
    debug!(input = data.len(), output = out.len(), "Re-encoded image as JPEG");
    Ok(out)
}
