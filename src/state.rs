//! Session state and its pure transition function.
//!
//! All mutable session data (signed-in user, view, in-flight step, history,
//! selection, last error) lives in one [`SessionState`] value. It changes only
//! through [`reduce`], a pure `(state, event) → state` function, so the run
//! state machine can be unit tested without models, renderers or I/O.
//!
//! ```text
//!            FileSelected{pdf}          DocumentConverted
//!   IDLE ───────────────────▶ CONVERTING_DOCUMENT ─────────▶ ANALYZING
//!     │                                                        ▲   │
//!     └──────────── FileSelected{image} ───────────────────────┘   │ AnalysisCompleted
//!     ▲                                                            ▼
//!     └──────────────── RecordSaved / RunFailed ◀────────────── SAVING
//! ```
//!
//! `RunFailed` leads back to `IDLE` from any active step. Events that do not
//! fit the current step are ignored with a warning.

use crate::error::FailureKind;
use crate::history::HistoryStore;
use crate::model::{ComponentStatus, InventoryStats, UploadRecord, User};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;
use uuid::Uuid;

/// Where a run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessingStep {
    #[default]
    Idle,
    ConvertingDocument,
    Analyzing,
    Saving,
}

impl ProcessingStep {
    pub fn as_str(self) -> &'static str {
        match self {
            ProcessingStep::Idle => "IDLE",
            ProcessingStep::ConvertingDocument => "CONVERTING_DOCUMENT",
            ProcessingStep::Analyzing => "ANALYZING",
            ProcessingStep::Saving => "SAVING",
        }
    }

    pub fn is_active(self) -> bool {
        self != ProcessingStep::Idle
    }
}

impl fmt::Display for ProcessingStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which screen the session is showing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum View {
    #[default]
    Login,
    Upload,
    Loading,
    Dashboard,
}

/// Everything that can happen to a session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    LoggedIn(User),
    LoggedOut,
    FileSelected { is_pdf: bool },
    DocumentConverted,
    AnalysisCompleted,
    RecordSaved(UploadRecord),
    RunFailed(FailureKind),
    Navigate(View),
    SelectRecord(Uuid),
    SelectComponent(Option<String>),
    StatusChanged {
        record_id: Uuid,
        component_id: String,
        status: ComponentStatus,
    },
    DismissError,
}

/// The whole application state of one session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    pub user: Option<User>,
    pub view: View,
    pub step: ProcessingStep,
    pub history: HistoryStore,
    pub current_record_id: Option<Uuid>,
    pub selected_component_id: Option<String>,
    /// Coarse user-facing message of the last failed run.
    pub error: Option<String>,
}

impl SessionState {
    pub fn current_record(&self) -> Option<&UploadRecord> {
        self.current_record_id.and_then(|id| self.history.select(id))
    }

    /// Stats over the current record; all zero when none is selected.
    pub fn stats(&self) -> InventoryStats {
        self.current_record()
            .map(UploadRecord::stats)
            .unwrap_or_default()
    }

    pub fn is_busy(&self) -> bool {
        self.step.is_active()
    }
}

/// Apply one event. Pure: no I/O, no clock, no randomness.
pub fn reduce(mut state: SessionState, event: SessionEvent) -> SessionState {
    use ProcessingStep::*;
    use SessionEvent::*;

    match event {
        LoggedIn(user) => {
            state.user = Some(user);
            state.view = View::Upload;
            state.error = None;
        }
        LoggedOut => {
            state = SessionState::default();
        }
        FileSelected { is_pdf } => {
            if state.user.is_none() || state.step.is_active() {
                warn!("file selection ignored (step {})", state.step);
                return state;
            }
            state.error = None;
            state.view = View::Loading;
            state.step = if is_pdf { ConvertingDocument } else { Analyzing };
        }
        DocumentConverted => advance(&mut state, ConvertingDocument, Analyzing),
        AnalysisCompleted => advance(&mut state, Analyzing, Saving),
        RecordSaved(record) => {
            if state.step != Saving {
                warn!(
                    "record for {} arrived outside SAVING (step {}), ignored",
                    record.file_name, state.step
                );
                return state;
            }
            state.current_record_id = Some(record.id);
            state.selected_component_id = None;
            state.history.append(record);
            state.step = Idle;
            state.view = View::Dashboard;
        }
        RunFailed(kind) => {
            if !state.step.is_active() {
                warn!("failure reported while idle, ignored");
                return state;
            }
            state.step = Idle;
            state.view = View::Upload;
            state.error = Some(kind.message().to_string());
        }
        Navigate(view) => {
            let allowed = match view {
                View::Dashboard => !state.history.is_empty(),
                View::Upload => true,
                View::Login | View::Loading => false,
            };
            if allowed && state.user.is_some() && !state.step.is_active() {
                state.view = view;
            }
        }
        SelectRecord(id) => {
            if state.history.select(id).is_some() {
                state.current_record_id = Some(id);
                state.selected_component_id = None;
                if !state.step.is_active() {
                    state.view = View::Dashboard;
                }
            }
        }
        SelectComponent(id) => {
            state.selected_component_id = id;
        }
        StatusChanged {
            record_id,
            component_id,
            status,
        } => {
            state
                .history
                .update_component_status(record_id, &component_id, status);
        }
        DismissError => {
            state.error = None;
        }
    }
    state
}

fn advance(state: &mut SessionState, from: ProcessingStep, to: ProcessingStep) {
    if state.step == from {
        state.step = to;
    } else {
        warn!("transition {from} → {to} ignored (step {})", state.step);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Component, Coordinates};
    use chrono::Utc;

    fn admin() -> User {
        User {
            id: "usr_admin_001".into(),
            name: "System Administrator".into(),
            email: "admin@uae-piping.ae".into(),
            role: "Super Admin".into(),
            avatar_url: None,
        }
    }

    fn record(file_name: &str, version: u32) -> UploadRecord {
        UploadRecord {
            id: Uuid::new_v4(),
            file_name: file_name.into(),
            version,
            timestamp: Utc::now(),
            components: vec![Component {
                id: "HV-1".into(),
                kind: "Gate Valve".into(),
                label: String::new(),
                description: String::new(),
                coordinates: Coordinates::CENTER,
                initial_status: ComponentStatus::Operational,
                current_status: ComponentStatus::Operational,
                uae_standard_note: String::new(),
                last_inspected: None,
            }],
            image_preview: String::new(),
            summary: String::new(),
            storage_id: Uuid::new_v4(),
        }
    }

    fn signed_in() -> SessionState {
        reduce(SessionState::default(), SessionEvent::LoggedIn(admin()))
    }

    fn run(state: SessionState, events: Vec<SessionEvent>) -> SessionState {
        events.into_iter().fold(state, reduce)
    }

    #[test]
    fn pdf_run_walks_every_step() {
        let mut s = signed_in();
        s = reduce(s, SessionEvent::FileSelected { is_pdf: true });
        assert_eq!(s.step, ProcessingStep::ConvertingDocument);
        assert_eq!(s.view, View::Loading);
        s = reduce(s, SessionEvent::DocumentConverted);
        assert_eq!(s.step, ProcessingStep::Analyzing);
        s = reduce(s, SessionEvent::AnalysisCompleted);
        assert_eq!(s.step, ProcessingStep::Saving);

        let r = record("a.pdf", 1);
        let id = r.id;
        s = reduce(s, SessionEvent::RecordSaved(r));
        assert_eq!(s.step, ProcessingStep::Idle);
        assert_eq!(s.view, View::Dashboard);
        assert_eq!(s.current_record_id, Some(id));
        assert_eq!(s.history.len(), 1);
    }

    #[test]
    fn image_skips_conversion() {
        let s = reduce(signed_in(), SessionEvent::FileSelected { is_pdf: false });
        assert_eq!(s.step, ProcessingStep::Analyzing);
        let s = reduce(s, SessionEvent::DocumentConverted);
        assert_eq!(s.step, ProcessingStep::Analyzing);
    }

    #[test]
    fn failure_returns_to_idle_without_record() {
        let s = run(
            signed_in(),
            vec![
                SessionEvent::FileSelected { is_pdf: true },
                SessionEvent::RunFailed(FailureKind::Conversion),
            ],
        );
        assert_eq!(s.step, ProcessingStep::Idle);
        assert_eq!(s.view, View::Upload);
        assert_eq!(s.error.as_deref(), Some(FailureKind::Conversion.message()));
        assert!(s.history.is_empty());
    }

    #[test]
    fn new_selection_clears_previous_error() {
        let s = run(
            signed_in(),
            vec![
                SessionEvent::FileSelected { is_pdf: false },
                SessionEvent::RunFailed(FailureKind::Analysis),
                SessionEvent::FileSelected { is_pdf: false },
            ],
        );
        assert!(s.error.is_none());
    }

    #[test]
    fn selection_while_busy_is_ignored() {
        let s = run(
            signed_in(),
            vec![
                SessionEvent::FileSelected { is_pdf: true },
                SessionEvent::DocumentConverted,
                SessionEvent::FileSelected { is_pdf: true },
            ],
        );
        assert_eq!(s.step, ProcessingStep::Analyzing);
    }

    #[test]
    fn selection_requires_user() {
        let s = reduce(SessionState::default(), SessionEvent::FileSelected { is_pdf: false });
        assert_eq!(s.step, ProcessingStep::Idle);
    }

    #[test]
    fn record_outside_saving_is_ignored() {
        let s = reduce(signed_in(), SessionEvent::RecordSaved(record("x.png", 1)));
        assert!(s.history.is_empty());
    }

    #[test]
    fn dashboard_needs_history() {
        let s = reduce(signed_in(), SessionEvent::Navigate(View::Dashboard));
        assert_eq!(s.view, View::Upload);

        let s = run(
            s,
            vec![
                SessionEvent::FileSelected { is_pdf: false },
                SessionEvent::AnalysisCompleted,
                SessionEvent::RecordSaved(record("x.png", 1)),
                SessionEvent::Navigate(View::Upload),
            ],
        );
        assert_eq!(s.view, View::Upload);
        let s = reduce(s, SessionEvent::Navigate(View::Dashboard));
        assert_eq!(s.view, View::Dashboard);
    }

    #[test]
    fn logout_clears_everything() {
        let s = run(
            signed_in(),
            vec![
                SessionEvent::FileSelected { is_pdf: false },
                SessionEvent::AnalysisCompleted,
                SessionEvent::RecordSaved(record("x.png", 1)),
                SessionEvent::SelectComponent(Some("HV-1".into())),
                SessionEvent::LoggedOut,
            ],
        );
        assert_eq!(s, SessionState::default());
        assert_eq!(s.view, View::Login);
    }

    #[test]
    fn status_change_and_stats() {
        let r = record("x.png", 1);
        let id = r.id;
        let s = run(
            signed_in(),
            vec![
                SessionEvent::FileSelected { is_pdf: false },
                SessionEvent::AnalysisCompleted,
                SessionEvent::RecordSaved(r),
            ],
        );
        assert_eq!(s.stats().operational, 1);

        let s = reduce(
            s,
            SessionEvent::StatusChanged {
                record_id: id,
                component_id: "HV-1".into(),
                status: ComponentStatus::MaintenanceRequired,
            },
        );
        let stats = s.stats();
        assert_eq!((stats.total, stats.operational, stats.maintenance), (1, 0, 1));
    }

    #[test]
    fn select_record_switches_current() {
        let first = record("a.pdf", 1);
        let first_id = first.id;
        let s = run(
            signed_in(),
            vec![
                SessionEvent::FileSelected { is_pdf: false },
                SessionEvent::AnalysisCompleted,
                SessionEvent::RecordSaved(first),
                SessionEvent::FileSelected { is_pdf: false },
                SessionEvent::AnalysisCompleted,
                SessionEvent::RecordSaved(record("a.pdf", 2)),
            ],
        );
        assert_ne!(s.current_record_id, Some(first_id));
        let s = reduce(s, SessionEvent::SelectRecord(first_id));
        assert_eq!(s.current_record().unwrap().version, 1);
        let s = reduce(s, SessionEvent::SelectRecord(Uuid::new_v4()));
        assert_eq!(s.current_record_id, Some(first_id));
    }

    #[test]
    fn step_names() {
        assert_eq!(ProcessingStep::ConvertingDocument.to_string(), "CONVERTING_DOCUMENT");
        assert_eq!(
            serde_json::to_string(&ProcessingStep::Saving).unwrap(),
            "\"SAVING\""
        );
    }
}
