//! Document normalization: any accepted input → one encoded raster image.
//!
//! ```text
//! PDF   ──▶ render page 1 (2.0×) ──▶ JPEG q85 ──▶ image/jpeg
//! image ──────────────────────────────────────▶ unchanged bytes + declared type
//! ```
//!
//! The preview data URL is built from exactly the bytes sent to the model,
//! so for raster input it equals the original file's data URL.

use crate::config::AnalysisConfig;
use crate::error::DigitizerError;
use crate::pipeline::encode::{self, JPEG_MIME};
use crate::pipeline::input::SourceDocument;
use crate::pipeline::render::{PageRenderer, PdfiumRenderer};
use std::sync::Arc;
use tracing::{debug, info};

/// The model-ready form of a source document.
#[derive(Clone)]
pub struct NormalizedImage {
    pub bytes: Vec<u8>,
    /// Media type of `bytes`; always `image/jpeg` for PDF input.
    pub mime_type: String,
    pub preview_data_url: String,
}

impl std::fmt::Debug for NormalizedImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NormalizedImage")
            .field("bytes", &self.bytes.len())
            .field("mime_type", &self.mime_type)
            .finish()
    }
}

/// Converts source documents into [`NormalizedImage`]s.
#[derive(Clone)]
pub struct DocumentNormalizer {
    renderer: Arc<dyn PageRenderer>,
    scale: f32,
    jpeg_quality: u8,
}

impl DocumentNormalizer {
    pub fn new(renderer: Arc<dyn PageRenderer>, config: &AnalysisConfig) -> Self {
        Self {
            renderer,
            scale: config.pdf_scale,
            jpeg_quality: config.jpeg_quality,
        }
    }

    /// Normalizer backed by the system pdfium library.
    pub fn pdfium(config: &AnalysisConfig) -> Self {
        Self::new(Arc::new(PdfiumRenderer::default()), config)
    }

    /// Produce `(bytes, mime, preview)` for `doc`.
    ///
    /// # Errors
    /// [`DigitizerError::DocumentConversion`] when a PDF cannot be parsed,
    /// rendered or encoded.
    pub async fn normalize(&self, doc: &SourceDocument) -> Result<NormalizedImage, DigitizerError> {
        if !doc.is_pdf() {
            debug!("{}: raster input ({}) passed through", doc.file_name, doc.media_type);
            return Ok(NormalizedImage {
                preview_data_url: encode::data_url(&doc.media_type, &doc.bytes),
                bytes: doc.bytes.clone(),
                mime_type: doc.media_type.clone(),
            });
        }

        let renderer = Arc::clone(&self.renderer);
        let pdf = doc.bytes.clone();
        let scale = self.scale;
        let quality = self.jpeg_quality;

        // pdfium is CPU-bound and not async-safe.
        let encoded = tokio::task::spawn_blocking(move || {
            let image = renderer
                .render_first_page(&pdf, scale)
                .map_err(|e| e.to_string())?;
            encode::encode_jpeg(&image, quality).map_err(|e| format!("JPEG encoding failed: {e}"))
        })
        .await
        .map_err(|e| DigitizerError::Internal(format!("Render task panicked: {e}")))?
        .map_err(|detail| DigitizerError::DocumentConversion {
            file_name: doc.file_name.clone(),
            detail,
        })?;

        info!(
            "{}: rendered page 1 → {} bytes {}",
            doc.file_name,
            encoded.len(),
            JPEG_MIME
        );

        Ok(NormalizedImage {
            preview_data_url: encode::data_url(JPEG_MIME, &encoded),
            bytes: encoded,
            mime_type: JPEG_MIME.to_string(),
        })
    }
}
