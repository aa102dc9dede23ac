//! Session controller: drives one document at a time through the pipeline.
//!
//! [`Session`] owns the [`SessionState`] and the stage backends. Every state
//! change goes through [`crate::state::reduce`]; this module only performs the
//! I/O between events.
//!
//! ## Run sequence
//!
//! ```text
//! process(doc)
//!  ├─ guard      signed in, not busy
//!  ├─ FileSelected       → CONVERTING_DOCUMENT (PDF) or ANALYZING (image)
//!  ├─ normalize          pdf → jpeg, image passes through
//!  ├─ DocumentConverted  → ANALYZING
//!  ├─ invoke + validate  primary/secondary model, hydrate components
//!  ├─ version            1 + same-name records already in history
//!  ├─ AnalysisCompleted  → SAVING
//!  ├─ store.save         acknowledgment
//!  └─ RecordSaved        → IDLE, record appended, view = dashboard
//! ```
//!
//! Any failure emits `RunFailed` instead: the step returns to `IDLE`, the
//! coarse message is stored in `state.error` and nothing is appended.

use crate::auth::{CredentialVerifier, StaticCredentials};
use crate::config::AnalysisConfig;
use crate::error::DigitizerError;
use crate::history::HistoryStore;
use crate::model::{AnalysisResult, ComponentStatus, UploadRecord, User};
use crate::pipeline::input::SourceDocument;
use crate::pipeline::llm::ModelInvoker;
use crate::pipeline::normalize::DocumentNormalizer;
use crate::pipeline::validate;
use crate::progress::{NoopProgressCallback, ProgressCallback};
use crate::state::{reduce, SessionEvent, SessionState, View};
use crate::storage::{RecordStore, SimulatedStore};
use chrono::Utc;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};
use uuid::Uuid;

/// One user's digitizing session.
pub struct Session {
    state: SessionState,
    normalizer: DocumentNormalizer,
    invoker: ModelInvoker,
    store: Arc<dyn RecordStore>,
    auth: Arc<dyn CredentialVerifier>,
    progress: ProgressCallback,
}

impl Session {
    pub fn new(
        normalizer: DocumentNormalizer,
        invoker: ModelInvoker,
        store: Arc<dyn RecordStore>,
        auth: Arc<dyn CredentialVerifier>,
    ) -> Self {
        Self {
            state: SessionState::default(),
            normalizer,
            invoker,
            store,
            auth,
            progress: Arc::new(NoopProgressCallback),
        }
    }

    /// Production wiring: pdfium renderer, configured model tiers, simulated
    /// store with the configured latency, built-in credentials.
    pub fn from_config(config: &AnalysisConfig) -> Result<Self, DigitizerError> {
        Ok(Self::new(
            DocumentNormalizer::pdfium(config),
            ModelInvoker::from_config(config)?,
            Arc::new(SimulatedStore::new(Duration::from_millis(config.store_latency_ms))),
            Arc::new(StaticCredentials::default()),
        ))
    }

    /// Observe step changes, model attempts and run outcomes.
    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.invoker = self.invoker.with_progress(Arc::clone(&progress));
        self.progress = progress;
        self
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn history(&self) -> &HistoryStore {
        &self.state.history
    }

    pub fn user(&self) -> Option<&User> {
        self.state.user.as_ref()
    }

    pub fn current_record(&self) -> Option<&UploadRecord> {
        self.state.current_record()
    }

    // ── Authentication ───────────────────────────────────────────────────

    pub async fn login(&mut self, identifier: &str, secret: &str) -> Result<&User, DigitizerError> {
        let user = self.auth.login(identifier, secret).await?;
        self.dispatch(SessionEvent::LoggedIn(user));
        self.state.user.as_ref().ok_or(DigitizerError::NotAuthenticated)
    }

    /// Sign out and drop the session's history.
    pub async fn logout(&mut self) {
        self.auth.logout().await;
        self.dispatch(SessionEvent::LoggedOut);
        info!("signed out, history cleared");
    }

    // ── Runs ─────────────────────────────────────────────────────────────

    /// Read `path` and process it.
    pub async fn process_path(
        &mut self,
        path: impl AsRef<Path>,
    ) -> Result<&UploadRecord, DigitizerError> {
        let doc = SourceDocument::from_path(path).await?;
        self.process(doc).await
    }

    /// Run one document through the whole pipeline.
    ///
    /// On success the new record is at the head of history and is the
    /// current record.
    ///
    /// # Errors
    /// * [`DigitizerError::NotAuthenticated`] / [`DigitizerError::SessionBusy`]
    ///   before anything starts; state is untouched.
    /// * Any stage error; state returns to idle with the coarse message and
    ///   history is unchanged.
    pub async fn process(&mut self, doc: SourceDocument) -> Result<&UploadRecord, DigitizerError> {
        if self.state.user.is_none() {
            return Err(DigitizerError::NotAuthenticated);
        }
        if self.state.is_busy() {
            return Err(DigitizerError::SessionBusy {
                step: self.state.step.to_string(),
            });
        }

        info!("{}: processing ({})", doc.file_name, doc.media_type);
        self.dispatch(SessionEvent::FileSelected { is_pdf: doc.is_pdf() });

        match self.run(&doc).await {
            Ok(record) => {
                let id = record.id;
                let (version, count) = (record.version, record.components.len());
                self.dispatch(SessionEvent::RecordSaved(record));
                info!("{}: v{} saved with {} components", doc.file_name, version, count);
                self.progress.on_run_complete(&doc.file_name, version, count);
                self.state
                    .history
                    .select(id)
                    .ok_or_else(|| {
                        DigitizerError::Internal("saved record missing from history".into())
                    })
            }
            Err(e) => {
                let kind = e.failure_kind();
                error!("{}: run failed: {e}", doc.file_name);
                self.dispatch(SessionEvent::RunFailed(kind));
                self.progress.on_run_failed(&doc.file_name, kind, &e.to_string());
                Err(e)
            }
        }
    }

    async fn run(&mut self, doc: &SourceDocument) -> Result<UploadRecord, DigitizerError> {
        let image = self.normalizer.normalize(doc).await?;
        if doc.is_pdf() {
            self.dispatch(SessionEvent::DocumentConverted);
        }

        let raw = self.invoker.invoke(&image.bytes, &image.mime_type).await?;
        let components = validate::normalize(&raw)?;

        let version = self.state.history.next_version(&doc.file_name);
        self.dispatch(SessionEvent::AnalysisCompleted);

        let result = AnalysisResult {
            file_name: doc.file_name.clone(),
            timestamp: Utc::now(),
            summary: AnalysisResult::summarize(components.len()),
            components,
            version,
        };
        let user_id = self.state.user.as_ref().map(|u| u.id.as_str());
        let ack = self.store.save(&result, user_id).await?;
        debug!("{}: store ack {}", doc.file_name, ack.id);

        Ok(UploadRecord::from_ack(ack, image.preview_data_url))
    }

    /// Abandon a run whose future was dropped before it finished.
    ///
    /// Returns `false` when no run was in flight.
    pub fn reset_interrupted_run(&mut self) -> bool {
        if !self.state.is_busy() {
            return false;
        }
        self.dispatch(SessionEvent::RunFailed(crate::error::FailureKind::Generic));
        true
    }

    // ── Edits and navigation ─────────────────────────────────────────────

    /// Set a component's current status inside one record.
    ///
    /// Returns how many components changed; 0 when either id is unknown.
    pub fn update_status(
        &mut self,
        record_id: Uuid,
        component_id: &str,
        status: ComponentStatus,
    ) -> usize {
        let matches = self
            .state
            .history
            .select(record_id)
            .map(|r| r.components.iter().filter(|c| c.id == component_id).count())
            .unwrap_or(0);
        self.dispatch(SessionEvent::StatusChanged {
            record_id,
            component_id: component_id.to_string(),
            status,
        });
        matches
    }

    /// [`Session::update_status`] on the current record.
    pub fn update_current_status(&mut self, component_id: &str, status: ComponentStatus) -> usize {
        match self.state.current_record_id {
            Some(record_id) => self.update_status(record_id, component_id, status),
            None => 0,
        }
    }

    /// Make `record_id` the current record. `false` if it is not in history.
    pub fn select_record(&mut self, record_id: Uuid) -> bool {
        self.dispatch(SessionEvent::SelectRecord(record_id));
        self.state.current_record_id == Some(record_id)
    }

    pub fn select_component(&mut self, component_id: Option<String>) {
        self.dispatch(SessionEvent::SelectComponent(component_id));
    }

    /// Returns the view actually shown afterwards.
    pub fn navigate(&mut self, view: View) -> View {
        self.dispatch(SessionEvent::Navigate(view));
        self.state.view
    }

    pub fn dismiss_error(&mut self) {
        self.dispatch(SessionEvent::DismissError);
    }

    fn dispatch(&mut self, event: SessionEvent) {
        let before = self.state.step;
        self.state = reduce(std::mem::take(&mut self.state), event);
        if self.state.step != before {
            info!(from = %before, to = %self.state.step, "step");
            self.progress.on_step_change(self.state.step);
        }
    }
}
