//! Image encoding: `DynamicImage` → JPEG bytes, plus base64/data-URL helpers.
//!
//! Rendered PDF pages are encoded as JPEG rather than PNG. A 2× render of a
//! large drawing sheet is several thousand pixels on each side; PNG encoding
//! of that is slow and yields payloads far beyond what a vision API accepts
//! comfortably. At quality 85 thin piping lines and tag text stay legible.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;
use tracing::debug;

/// Media type produced by [`encode_jpeg`].
pub const JPEG_MIME: &str = "image/jpeg";

/// Encode a rendered page as JPEG at the given quality (1–100).
///
/// Alpha is dropped first: JPEG has no alpha channel and pdfium renders onto
/// an opaque white page anyway.
pub fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Vec<u8>, image::ImageError> {
    let rgb = img.to_rgb8();
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100)).encode_image(&rgb)?;
    debug!(
        "Encoded {}x{} page → {} bytes JPEG (q={})",
        rgb.width(),
        rgb.height(),
        buf.len(),
        quality
    );
    Ok(buf)
}

/// Standard base64 of raw bytes.
pub fn to_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// `data:<mime>;base64,<payload>` URL for inline previews.
pub fn data_url(mime_type: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mime_type, to_base64(bytes))
}
