//! Progress-callback trait for session lifecycle events.
//!
//! Inject an [`Arc<dyn SessionProgressCallback>`] via
//! [`crate::session::Session::with_progress`] to observe a run as it moves
//! through `CONVERTING_DOCUMENT → ANALYZING → SAVING`, including every model
//! attempt, scheduled retry and tier fallback.
//!
//! Callers can forward these events to a terminal spinner, a log sink or a
//! UI channel without the library knowing how the host communicates.
//!
//! # Example
//!
//! ```rust
//! use pid_digitizer::{ProcessingStep, SessionProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     attempts: Arc<AtomicUsize>,
//! }
//!
//! impl SessionProgressCallback for CountingCallback {
//!     fn on_model_attempt(&self, model: &str, attempt: u32, max: u32) {
//!         self.attempts.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{model}: attempt {attempt}/{max}");
//!     }
//! }
//!
//! let cb = CountingCallback { attempts: Arc::new(AtomicUsize::new(0)) };
//! cb.on_step_change(ProcessingStep::Analyzing);
//! cb.on_model_attempt("gemini-3-pro-preview", 1, 3);
//! assert_eq!(cb.attempts.load(Ordering::SeqCst), 1);
//! ```

use crate::error::FailureKind;
use crate::state::ProcessingStep;
use std::sync::Arc;
use std::time::Duration;

/// Called by the session and the model invoker as a run progresses.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Implementations must be `Send + Sync`: model calls
/// run on the tokio runtime and may hop threads between awaits.
pub trait SessionProgressCallback: Send + Sync {
    /// The processing step changed (including the return to `IDLE`).
    fn on_step_change(&self, step: ProcessingStep) {
        let _ = step;
    }

    /// A request is about to be sent.
    ///
    /// # Arguments
    /// * `model`   — model identifier
    /// * `attempt` — 1-indexed attempt within this tier
    /// * `max`     — attempt budget of this tier
    fn on_model_attempt(&self, model: &str, attempt: u32, max: u32) {
        let _ = (model, attempt, max);
    }

    /// A transient failure occurred and the executor will wait `wait`
    /// before the next attempt.
    fn on_retry_scheduled(&self, model: &str, attempt: u32, wait: Duration) {
        let _ = (model, attempt, wait);
    }

    /// The primary tier hit its quota and the secondary tier takes over.
    fn on_fallback(&self, from: &str, to: &str) {
        let _ = (from, to);
    }

    /// A run finished and its record was appended to history.
    ///
    /// # Arguments
    /// * `file_name`       — diagram name
    /// * `version`         — assigned version number
    /// * `component_count` — number of validated components
    fn on_run_complete(&self, file_name: &str, version: u32, component_count: usize) {
        let _ = (file_name, version, component_count);
    }

    /// A run failed; nothing was appended.
    fn on_run_failed(&self, file_name: &str, kind: FailureKind, error: &str) {
        let _ = (file_name, kind, error);
    }
}

/// A no-op implementation for callers that don't need progress events.
///
/// This is the default when no callback is configured.
pub struct NoopProgressCallback;

impl SessionProgressCallback for NoopProgressCallback {}

/// Convenience alias for the type held by [`crate::session::Session`].
pub type ProgressCallback = Arc<dyn SessionProgressCallback>;
