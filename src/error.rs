//! Error types for the pid-digitizer library.
//!
//! Two distinct error types reflect two distinct failure scopes:
//!
//! * [`DigitizerError`] — **Run-fatal**: the current analysis run cannot
//!   complete (unreadable document, both model tiers exhausted, unparseable
//!   model output, store failure). Returned as `Err(DigitizerError)` from
//!   [`crate::session::Session::process`]; nothing is committed to history.
//!
//! * [`ModelError`] — **Per call**: one request to one model failed. The
//!   retry executor in [`crate::pipeline::retry`] inspects it to decide
//!   between retrying, falling back to the secondary model, or giving up.
//!   Transient model errors never surface individually.
//!
//! At the user boundary the fine-grained taxonomy is collapsed into three
//! coarse [`FailureKind`] messages.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// All run-fatal errors returned by the pid-digitizer library.
#[derive(Debug, Error)]
pub enum DigitizerError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Diagram file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file is neither a raster image nor a PDF.
    #[error("Unsupported media type for '{file_name}': {media_type}\nSupported: PNG, JPEG, WebP, GIF, BMP, TIFF images or PDF documents.")]
    UnsupportedMediaType {
        file_name: String,
        media_type: String,
    },

    // ── Pipeline errors ───────────────────────────────────────────────────
    /// The source document could not be parsed or rendered.
    #[error("Document conversion failed for '{file_name}': {detail}")]
    DocumentConversion { file_name: String, detail: String },

    /// Both model tiers were exhausted, or a model returned a non-transient error.
    #[error("Model invocation failed on '{model}': {source}")]
    ModelInvocation {
        model: String,
        #[source]
        source: ModelError,
    },

    /// The configured model backend could not be constructed.
    #[error("Vision model '{model}' is not configured.\n{hint}")]
    ModelNotConfigured { model: String, hint: String },

    /// The model output could not be interpreted as a component array.
    #[error("Failed to parse model response: {detail}")]
    ResponseParse { detail: String },

    /// The persistence acknowledgment failed.
    #[error("Failed to store analysis for '{file_name}': {detail}")]
    Storage { file_name: String, detail: String },

    // ── Session errors ────────────────────────────────────────────────────
    /// An operation that needs a signed-in user was attempted anonymously.
    #[error("No user is signed in")]
    NotAuthenticated,

    /// The credential boundary rejected the identifier/secret pair.
    #[error("Invalid credentials")]
    AuthenticationFailed,

    /// A run is already in flight; concurrent submissions are rejected.
    #[error("A diagram is already being processed (step: {step})")]
    SessionBusy { step: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DigitizerError {
    /// Collapse this error into the coarse category shown to users.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            DigitizerError::DocumentConversion { .. } => FailureKind::Conversion,
            DigitizerError::ResponseParse { .. } => FailureKind::Analysis,
            _ => FailureKind::Generic,
        }
    }

    /// The user-facing message for this error.
    pub fn user_message(&self) -> &'static str {
        self.failure_kind().message()
    }
}

/// Coarse failure category surfaced at the user boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum FailureKind {
    /// The document could not be converted into an image.
    Conversion,
    /// The model answered but its output was unusable.
    Analysis,
    /// Anything else: model exhaustion, storage, configuration.
    Generic,
}

impl FailureKind {
    pub fn message(self) -> &'static str {
        match self {
            FailureKind::Conversion => "Could not read PDF file. Please try a different file.",
            FailureKind::Analysis => {
                "Failed to parse AI response. The P&ID might be too complex or the result was malformed."
            }
            FailureKind::Generic => "Failed to process P&ID. Please try again or check your API Key.",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// A failure of one request to one vision model.
///
/// Cloneable so the retry executor can keep the last cause while the caller
/// logs it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ModelError {
    /// Rate limit or quota exhausted (HTTP 429). Transient; triggers fallback
    /// once the retry budget runs out.
    #[error("'{model}' rate limited or quota exhausted: {detail}")]
    QuotaExhausted { model: String, detail: String },

    /// Service unavailable (HTTP 503). Transient; never triggers fallback.
    #[error("'{model}' unavailable: {detail}")]
    Unavailable { model: String, detail: String },

    /// Any other failure. Not retried.
    #[error("'{model}' request failed: {detail}")]
    Request { model: String, detail: String },
}

impl ModelError {
    /// Classify an HTTP status + body into the matching error kind.
    pub fn from_status(model: &str, status: u16, detail: impl Into<String>) -> Self {
        let detail = detail.into();
        let model = model.to_string();
        match status {
            429 => ModelError::QuotaExhausted { model, detail },
            503 => ModelError::Unavailable { model, detail },
            _ => {
                // Some gateways wrap the upstream 429 in a different status.
                if detail.contains("429") || detail.contains("RESOURCE_EXHAUSTED") {
                    ModelError::QuotaExhausted { model, detail }
                } else {
                    ModelError::Request {
                        model,
                        detail: format!("HTTP {status}: {detail}"),
                    }
                }
            }
        }
    }

    /// Classify a free-text provider error message.
    pub fn from_message(model: &str, message: impl Into<String>) -> Self {
        let detail = message.into();
        let lower = detail.to_lowercase();
        let model = model.to_string();
        if lower.contains("429") || lower.contains("rate limit") || lower.contains("quota") {
            ModelError::QuotaExhausted { model, detail }
        } else if lower.contains("503")
            || lower.contains("unavailable")
            || lower.contains("overloaded")
        {
            ModelError::Unavailable { model, detail }
        } else {
            ModelError::Request { model, detail }
        }
    }

    pub fn model(&self) -> &str {
        match self {
            ModelError::QuotaExhausted { model, .. }
            | ModelError::Unavailable { model, .. }
            | ModelError::Request { model, .. } => model,
        }
    }

    /// Rate-limit or service-unavailable signal, eligible for retry.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ModelError::QuotaExhausted { .. } | ModelError::Unavailable { .. }
        )
    }

    /// Quota signal, eligible for fallback to the secondary model.
    pub fn is_quota(&self) -> bool {
        matches!(self, ModelError::QuotaExhausted { .. })
    }
}
