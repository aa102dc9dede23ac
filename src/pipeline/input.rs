//! Input resolution: load a diagram file and determine its media type.
//!
//! The declared type matters downstream: PDFs go through rendering, every
//! other image passes through untouched. Sniffing magic bytes, rather than
//! trusting the extension, means a mislabeled `.png` that is really a PDF
//! still takes the right path.

use crate::error::DigitizerError;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Media type of PDF documents.
pub const PDF_MIME: &str = "application/pdf";

/// A diagram file as selected by the user: name, bytes, declared media type.
#[derive(Clone)]
pub struct SourceDocument {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub media_type: String,
}

impl std::fmt::Debug for SourceDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceDocument")
            .field("file_name", &self.file_name)
            .field("bytes", &self.bytes.len())
            .field("media_type", &self.media_type)
            .finish()
    }
}

impl SourceDocument {
    /// Wrap in-memory bytes with an explicitly declared media type.
    ///
    /// Fails if the type is neither `application/pdf` nor `image/*`.
    pub fn new(
        file_name: impl Into<String>,
        bytes: Vec<u8>,
        media_type: impl Into<String>,
    ) -> Result<Self, DigitizerError> {
        let file_name = file_name.into();
        let media_type = media_type.into().trim().to_lowercase();
        if media_type != PDF_MIME && !media_type.starts_with("image/") {
            return Err(DigitizerError::UnsupportedMediaType {
                file_name,
                media_type,
            });
        }
        Ok(Self {
            file_name,
            bytes,
            media_type,
        })
    }

    /// Wrap in-memory bytes, sniffing the media type from their content.
    pub fn from_bytes(
        file_name: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Result<Self, DigitizerError> {
        let file_name = file_name.into();
        match sniff_media_type(&bytes) {
            Some(mime) => Self::new(file_name, bytes, mime),
            None => Err(DigitizerError::UnsupportedMediaType {
                file_name,
                media_type: "application/octet-stream".into(),
            }),
        }
    }

    /// Read a local file. The file name (not the full path) identifies the
    /// diagram for versioning.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, DigitizerError> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await.map_err(|e| read_error(path, e))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        debug!("Read {} ({} bytes)", path.display(), bytes.len());
        Self::from_bytes(file_name, bytes)
    }

    pub fn is_pdf(&self) -> bool {
        self.media_type == PDF_MIME
    }
}

fn read_error(path: &Path, e: std::io::Error) -> DigitizerError {
    let path = PathBuf::from(path);
    match e.kind() {
        std::io::ErrorKind::PermissionDenied => DigitizerError::PermissionDenied { path },
        std::io::ErrorKind::NotFound => DigitizerError::FileNotFound { path },
        _ => DigitizerError::Internal(format!("Failed to read '{}': {e}", path.display())),
    }
}

/// Determine the media type from magic bytes.
pub fn sniff_media_type(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(b"%PDF") {
        return Some(PDF_MIME);
    }
    image::guess_format(bytes).ok().map(|f| f.to_mime_type())
}
