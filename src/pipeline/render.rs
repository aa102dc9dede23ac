//! PDF rasterisation: render the first page to a `DynamicImage` via pdfium.
//!
//! Only page 1 of a multi-page document is ever processed; P&ID packages put
//! the sheet of interest first and the model takes a single image.
//!
//! ## Why a trait?
//!
//! The pdfium shared library is an external binary that is often absent on
//! CI machines. [`PageRenderer`] lets the normalizer and the session be
//! exercised with an in-process renderer while production uses
//! [`PdfiumRenderer`].

use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::PathBuf;
use thiserror::Error;
use tracing::debug;

/// Why a page could not be rasterised.
#[derive(Debug, Error)]
pub enum RenderError {
    /// No pdfium library could be loaded (the rendering surface is missing).
    #[error("pdfium library unavailable: {0}\nSet PDFIUM_LIB_PATH=/path/to/libpdfium or install pdfium system-wide.")]
    Binding(String),

    /// The document header/xref could not be parsed, or it is encrypted.
    #[error("cannot open PDF: {0}")]
    Load(String),

    /// The document contains no pages.
    #[error("PDF has no pages")]
    NoPages,

    /// pdfium failed while drawing the page.
    #[error("rasterisation failed: {0}")]
    Render(String),
}

/// Renders the first page of a PDF into a pixel surface.
pub trait PageRenderer: Send + Sync {
    /// Render page 1 of `pdf_bytes`, upscaled by `scale`.
    fn render_first_page(&self, pdf_bytes: &[u8], scale: f32) -> Result<DynamicImage, RenderError>;
}

/// Production renderer backed by the pdfium C++ library.
///
/// Binds on every call: pdfium uses thread-local state and renders run on
/// the blocking pool, so a long-lived binding would have to be shared across
/// threads anyway.
#[derive(Debug, Default, Clone)]
pub struct PdfiumRenderer {
    /// Explicit library location; falls back to `PDFIUM_LIB_PATH`, then the
    /// system library search path.
    pub library_path: Option<PathBuf>,
}

impl PdfiumRenderer {
    pub fn with_library(path: impl Into<PathBuf>) -> Self {
        Self {
            library_path: Some(path.into()),
        }
    }

    fn bind(&self) -> Result<Pdfium, RenderError> {
        let explicit = self
            .library_path
            .clone()
            .or_else(|| std::env::var_os("PDFIUM_LIB_PATH").map(PathBuf::from));

        let bindings = match explicit {
            Some(path) => {
                let lib = if path.is_dir() {
                    PathBuf::from(Pdfium::pdfium_platform_library_name_at_path(
                        path.to_string_lossy().as_ref(),
                    ))
                } else {
                    path
                };
                debug!("Binding pdfium from {}", lib.display());
                Pdfium::bind_to_library(&lib)
            }
            None => Pdfium::bind_to_system_library(),
        }
        .map_err(|e| RenderError::Binding(format!("{e:?}")))?;

        Ok(Pdfium::new(bindings))
    }
}

impl PageRenderer for PdfiumRenderer {
    fn render_first_page(&self, pdf_bytes: &[u8], scale: f32) -> Result<DynamicImage, RenderError> {
        let pdfium = self.bind()?;

        let document = pdfium
            .load_pdf_from_byte_slice(pdf_bytes, None)
            .map_err(|e| RenderError::Load(format!("{e:?}")))?;

        let pages = document.pages();
        if pages.len() == 0 {
            return Err(RenderError::NoPages);
        }
        debug!("PDF loaded: {} pages, rendering page 1", pages.len());

        let page = pages.get(0).map_err(|e| RenderError::Render(format!("{e:?}")))?;

        let render_config = PdfRenderConfig::new().scale_page_by_factor(scale);
        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| RenderError::Render(format!("{e:?}")))?;

        let image = bitmap.as_image();
        debug!(
            "Rendered page 1 at {scale}× → {}x{} px",
            image.width(),
            image.height()
        );
        Ok(image)
    }
}
