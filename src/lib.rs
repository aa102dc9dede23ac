//! # pid-digitizer
//!
//! Digitize P&ID (piping and instrumentation) diagrams into a typed,
//! versioned component inventory using Vision Language Models.
//!
//! ## Why this crate?
//!
//! Drawing sheets carry hundreds of tagged valves, instruments and equipment
//! items that are normally re-keyed by hand into maintenance systems. This
//! crate sends the sheet to a vision model with a strict output schema, then
//! treats the answer as untrusted input: it repairs framing, fills defaults,
//! clamps coordinates, and only then commits a versioned record.
//!
//! ## Pipeline Overview
//!
//! ```text
//! image / PDF
//!  │
//!  ├─ 1. Input      read the file, sniff its media type
//!  ├─ 2. Normalize  PDF page 1 → 2.0× render → JPEG q85 (images pass through)
//!  ├─ 3. Invoke     primary model, 3 attempts with backoff; quota → secondary
//!  ├─ 4. Validate   strip fences, parse, hydrate defaults, clamp to [0,100]
//!  ├─ 5. Version    1 + same-name records in this session
//!  └─ 6. Save       store acknowledgment → record appended to history
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pid_digitizer::{AnalysisConfig, ComponentStatus, Session};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // API key from GEMINI_API_KEY
//!     let config = AnalysisConfig::default();
//!     let mut session = Session::from_config(&config)?;
//!     session.login("admin", "password123").await?;
//!
//!     let record = session.process_path("P-101.pdf").await?;
//!     println!("v{}: {}", record.version, record.summary);
//!     let record_id = record.id;
//!
//!     session.update_status(record_id, "HV-101", ComponentStatus::MaintenanceRequired);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pidscan` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! pid-digitizer = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod auth;
pub mod config;
pub mod error;
pub mod history;
pub mod model;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod session;
pub mod state;
pub mod storage;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use auth::{CredentialVerifier, StaticCredentials};
pub use config::{AnalysisConfig, AnalysisConfigBuilder, ModelBackend};
pub use error::{DigitizerError, FailureKind, ModelError};
pub use history::HistoryStore;
pub use model::{
    AnalysisResult, Component, ComponentStatus, Coordinates, InventoryStats, StorageAck,
    UploadRecord, User,
};
pub use pipeline::input::SourceDocument;
pub use pipeline::llm::{GeminiModel, ModelInvoker, ModelRequest, ProviderModel, VisionModel};
pub use pipeline::normalize::{DocumentNormalizer, NormalizedImage};
pub use pipeline::render::{PageRenderer, PdfiumRenderer, RenderError};
pub use pipeline::retry::RetryPolicy;
pub use progress::{NoopProgressCallback, ProgressCallback, SessionProgressCallback};
pub use session::Session;
pub use state::{reduce, ProcessingStep, SessionEvent, SessionState, View};
pub use storage::{RecordStore, SimulatedStore};
