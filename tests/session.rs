//! Whole-run integration tests for pid-digitizer.
//!
//! Every backend is replaced by an in-process double: a renderer that paints
//! a blank page, scripted vision models, an instant store and instant
//! credentials. No network and no pdfium library are needed.
//!
//! Run with:
//!   cargo test --test session

use async_trait::async_trait;
use image::{DynamicImage, Rgba, RgbaImage};
use pid_digitizer::{
    AnalysisConfig, AnalysisResult, ComponentStatus, DigitizerError, DocumentNormalizer,
    FailureKind, ModelError, ModelInvoker, ModelRequest, PageRenderer, ProcessingStep,
    RecordStore, RenderError, RetryPolicy, Session, SessionProgressCallback, SimulatedStore,
    SourceDocument, StaticCredentials, StorageAck, View, VisionModel,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

// ── Test doubles ─────────────────────────────────────────────────────────────

struct BlankPage;

impl PageRenderer for BlankPage {
    fn render_first_page(&self, _pdf: &[u8], _scale: f32) -> Result<DynamicImage, RenderError> {
        Ok(DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            40,
            30,
            Rgba([255, 255, 255, 255]),
        )))
    }
}

struct CorruptPdf;

impl PageRenderer for CorruptPdf {
    fn render_first_page(&self, _pdf: &[u8], _scale: f32) -> Result<DynamicImage, RenderError> {
        Err(RenderError::Load("trailer not found".into()))
    }
}

/// Replays a script of outcomes; the last entry repeats forever.
struct ScriptedModel {
    name: &'static str,
    script: Mutex<VecDeque<Result<String, ModelError>>>,
    calls: AtomicUsize,
    mime_types: Mutex<Vec<String>>,
}

impl ScriptedModel {
    fn new(name: &'static str, script: Vec<Result<String, ModelError>>) -> Arc<Self> {
        Arc::new(Self {
            name,
            script: Mutex::new(script.into()),
            calls: AtomicUsize::new(0),
            mime_types: Mutex::new(Vec::new()),
        })
    }

    fn replying(name: &'static str, text: &str) -> Arc<Self> {
        Self::new(name, vec![Ok(text.to_string())])
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VisionModel for ScriptedModel {
    fn name(&self) -> &str {
        self.name
    }

    async fn generate(&self, request: &ModelRequest) -> Result<String, ModelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.mime_types.lock().unwrap().push(request.mime_type.clone());
        let mut script = self.script.lock().unwrap();
        if script.len() > 1 {
            script.pop_front().unwrap()
        } else {
            script.front().cloned().unwrap()
        }
    }
}

struct FailingStore;

#[async_trait]
impl RecordStore for FailingStore {
    async fn save(
        &self,
        result: &AnalysisResult,
        _user_id: Option<&str>,
    ) -> Result<StorageAck, DigitizerError> {
        Err(DigitizerError::Storage {
            file_name: result.file_name.clone(),
            detail: "connection refused".into(),
        })
    }
}

#[derive(Default)]
struct StepRecorder {
    steps: Mutex<Vec<ProcessingStep>>,
    fallbacks: AtomicUsize,
}

impl SessionProgressCallback for StepRecorder {
    fn on_step_change(&self, step: ProcessingStep) {
        self.steps.lock().unwrap().push(step);
    }

    fn on_fallback(&self, _from: &str, _to: &str) {
        self.fallbacks.fetch_add(1, Ordering::SeqCst);
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

const INVENTORY: &str = r#"[
  {"id":"HV-101","type":"Gate Valve","label":"Inlet isolation","description":"6in",
   "coordinates":{"x":12,"y":150},"initialStatus":"OPERATIONAL","uaeStandardNote":"ADNOC OK"},
  {"id":"PT-2001","type":"Pressure Transmitter","coordinates":{"x":-4,"y":33.5},
   "initialStatus":"MAINTENANCE_REQUIRED","uaeStandardNote":"Calibrate per ADNOC"},
  {"type":"Centrifugal Pump","coordinates":{"x":"left","y":70},"initialStatus":"CRITICAL_REPAIR"}
]"#;

fn png(name: &str) -> SourceDocument {
    SourceDocument::new(
        name,
        vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A],
        "image/png",
    )
    .unwrap()
}

fn pdf(name: &str) -> SourceDocument {
    SourceDocument::new(name, b"%PDF-1.7\n%fake".to_vec(), "application/pdf").unwrap()
}

fn build(
    renderer: Arc<dyn PageRenderer>,
    primary: Arc<ScriptedModel>,
    secondary: Option<Arc<ScriptedModel>>,
    store: Arc<dyn RecordStore>,
) -> Session {
    let config = AnalysisConfig::default();
    let secondary = secondary.map(|s| s as Arc<dyn VisionModel>);
    Session::new(
        DocumentNormalizer::new(renderer, &config),
        ModelInvoker::new(primary, secondary, RetryPolicy::immediate(3), config),
        store,
        Arc::new(StaticCredentials::instant()),
    )
}

async fn signed_in(model: Arc<ScriptedModel>) -> Session {
    let mut s = build(Arc::new(BlankPage), model, None, Arc::new(SimulatedStore::instant()));
    s.login("admin@uae-piping.ae", "password123").await.unwrap();
    s
}

fn quota(model: &str) -> Result<String, ModelError> {
    Err(ModelError::from_status(model, 429, "RESOURCE_EXHAUSTED"))
}

// ── Runs ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn image_run_produces_clamped_hydrated_record() {
    let mut s = signed_in(ScriptedModel::replying("pro", INVENTORY)).await;

    let record = s.process(png("unit-100.png")).await.unwrap();
    assert_eq!(record.version, 1);
    assert_eq!(record.components.len(), 3);
    assert_eq!(record.summary, "Analyzed 3 components according to UAE standards.");
    assert!(record.image_preview.starts_with("data:image/png;base64,"));

    let hv = &record.components[0];
    assert_eq!((hv.coordinates.x, hv.coordinates.y), (12.0, 100.0));
    assert_eq!(hv.current_status, ComponentStatus::Operational);

    let pt = &record.components[1];
    assert_eq!((pt.coordinates.x, pt.coordinates.y), (0.0, 33.5));

    let pump = &record.components[2];
    assert!(pump.id.starts_with("UNK-"));
    assert_eq!(pump.coordinates.x, 50.0);
    assert_eq!(pump.uae_standard_note, "No specific note.");
    assert_eq!(pump.current_status, ComponentStatus::CriticalRepair);

    let state = s.state();
    assert_eq!(state.step, ProcessingStep::Idle);
    assert_eq!(state.view, View::Dashboard);
    assert!(state.error.is_none());
}

#[tokio::test]
async fn pdf_run_sends_jpeg_and_walks_all_steps() {
    let model = ScriptedModel::replying("pro", "[]");
    let recorder = Arc::new(StepRecorder::default());
    let mut s = build(
        Arc::new(BlankPage),
        model.clone(),
        None,
        Arc::new(SimulatedStore::instant()),
    )
    .with_progress(recorder.clone());
    s.login("admin", "password123").await.unwrap();

    let record = s.process(pdf("P-101.pdf")).await.unwrap();
    assert!(record.image_preview.starts_with("data:image/jpeg;base64,"));
    assert_eq!(model.mime_types.lock().unwrap().as_slice(), ["image/jpeg"]);
    assert_eq!(
        *recorder.steps.lock().unwrap(),
        vec![
            ProcessingStep::ConvertingDocument,
            ProcessingStep::Analyzing,
            ProcessingStep::Saving,
            ProcessingStep::Idle,
        ]
    );
}

#[tokio::test]
async fn repeated_file_names_get_increasing_versions() {
    let mut s = signed_in(ScriptedModel::replying("pro", "[]")).await;

    assert_eq!(s.process(png("A.png")).await.unwrap().version, 1);
    assert_eq!(s.process(png("B.png")).await.unwrap().version, 1);
    assert_eq!(s.process(png("A.png")).await.unwrap().version, 2);
    assert_eq!(s.process(png("A.png")).await.unwrap().version, 3);

    let history = s.history();
    assert_eq!(history.len(), 4);
    assert_eq!(history.latest().unwrap().version, 3);
    assert_eq!(history.find_version("A.png", 2).unwrap().file_name, "A.png");
    let versions: Vec<u32> = history.versions_of("A.png").map(|r| r.version).collect();
    assert_eq!(versions, vec![3, 2, 1]);
}

// ── Failures ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn conversion_failure_never_calls_the_model() {
    let model = ScriptedModel::replying("pro", "[]");
    let mut s = build(
        Arc::new(CorruptPdf),
        model.clone(),
        None,
        Arc::new(SimulatedStore::instant()),
    );
    s.login("admin", "password123").await.unwrap();

    let err = s.process(pdf("broken.pdf")).await.unwrap_err();
    assert_eq!(err.failure_kind(), FailureKind::Conversion);
    assert_eq!(model.calls(), 0);
    assert_eq!(s.state().step, ProcessingStep::Idle);
    assert_eq!(s.state().view, View::Upload);
    assert!(s.history().is_empty());
}

#[tokio::test]
async fn unparseable_response_leaves_history_unchanged() {
    let mut s = signed_in(ScriptedModel::new(
        "pro",
        vec![Ok("[]".into()), Ok("Sorry, I cannot read this drawing.".into())],
    ))
    .await;

    s.process(png("ok.png")).await.unwrap();
    let before = s.history().clone();

    let err = s.process(png("ok.png")).await.unwrap_err();
    assert!(matches!(err, DigitizerError::ResponseParse { .. }));
    assert_eq!(s.history(), &before);
    assert_eq!(
        s.state().error.as_deref(),
        Some(FailureKind::Analysis.message())
    );
}

#[tokio::test]
async fn storage_failure_is_generic_and_not_appended() {
    let mut s = build(
        Arc::new(BlankPage),
        ScriptedModel::replying("pro", "[]"),
        None,
        Arc::new(FailingStore),
    );
    s.login("admin", "password123").await.unwrap();

    let err = s.process(png("x.png")).await.unwrap_err();
    assert!(matches!(err, DigitizerError::Storage { .. }));
    assert_eq!(err.user_message(), FailureKind::Generic.message());
    assert!(s.history().is_empty());
}

// ── Retry and fallback ───────────────────────────────────────────────────────

#[tokio::test]
async fn two_transient_failures_then_success_uses_primary_only() {
    let primary = ScriptedModel::new("pro", vec![quota("pro"), quota("pro"), Ok("[]".into())]);
    let secondary = ScriptedModel::replying("flash", "[]");
    let mut s = build(
        Arc::new(BlankPage),
        primary.clone(),
        Some(secondary.clone()),
        Arc::new(SimulatedStore::instant()),
    );
    s.login("admin", "password123").await.unwrap();

    s.process(png("x.png")).await.unwrap();
    assert_eq!(primary.calls(), 3);
    assert_eq!(secondary.calls(), 0);
}

#[tokio::test]
async fn quota_exhaustion_falls_back_to_secondary() {
    let primary = ScriptedModel::new("pro", vec![quota("pro")]);
    let secondary = ScriptedModel::replying("flash", r#"[{"id":"FV-9"}]"#);
    let recorder = Arc::new(StepRecorder::default());
    let mut s = build(
        Arc::new(BlankPage),
        primary.clone(),
        Some(secondary.clone()),
        Arc::new(SimulatedStore::instant()),
    )
    .with_progress(recorder.clone());
    s.login("admin", "password123").await.unwrap();

    let record = s.process(png("x.png")).await.unwrap();
    assert_eq!(record.components[0].id, "FV-9");
    assert_eq!(primary.calls(), 3);
    assert_eq!(secondary.calls(), 1);
    assert_eq!(recorder.fallbacks.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn both_tiers_exhausted_is_model_invocation_error() {
    let primary = ScriptedModel::new("pro", vec![quota("pro")]);
    let secondary = ScriptedModel::new("flash", vec![quota("flash")]);
    let mut s = build(
        Arc::new(BlankPage),
        primary.clone(),
        Some(secondary.clone()),
        Arc::new(SimulatedStore::instant()),
    );
    s.login("admin", "password123").await.unwrap();

    let err = s.process(png("x.png")).await.unwrap_err();
    match err {
        DigitizerError::ModelInvocation { model, source } => {
            assert_eq!(model, "flash");
            assert!(source.is_quota());
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(primary.calls() + secondary.calls(), 6);
    assert!(s.history().is_empty());
}

// ── Edits, navigation, auth ──────────────────────────────────────────────────

#[tokio::test]
async fn status_edit_touches_only_the_target_component() {
    let mut s = signed_in(ScriptedModel::replying("pro", INVENTORY)).await;
    let first = s.process(png("a.png")).await.unwrap().clone();
    let second = s.process(png("a.png")).await.unwrap().clone();

    let n = s.update_status(first.id, "HV-101", ComponentStatus::CriticalRepair);
    assert_eq!(n, 1);

    let edited = s.history().select(first.id).unwrap();
    assert_eq!(edited.components[0].current_status, ComponentStatus::CriticalRepair);
    assert_eq!(edited.components[0].initial_status, ComponentStatus::Operational);
    assert_eq!(edited.components[1], first.components[1]);
    assert_eq!(edited.components[2], first.components[2]);
    assert_eq!(
        (edited.id, edited.version, &edited.summary, edited.timestamp),
        (first.id, first.version, &first.summary, first.timestamp)
    );
    assert_eq!(s.history().select(second.id).unwrap(), &second);

    assert_eq!(s.update_status(first.id, "NOPE-1", ComponentStatus::Unknown), 0);
    assert_eq!(s.update_status(uuid::Uuid::new_v4(), "HV-101", ComponentStatus::Unknown), 0);
}

#[tokio::test]
async fn current_record_edits_and_stats() {
    let mut s = signed_in(ScriptedModel::replying("pro", INVENTORY)).await;
    s.process(png("a.png")).await.unwrap();

    let stats = s.state().stats();
    assert_eq!((stats.total, stats.operational, stats.maintenance), (3, 1, 2));

    s.update_current_status("PT-2001", ComponentStatus::Operational);
    let stats = s.state().stats();
    assert_eq!((stats.operational, stats.maintenance), (2, 1));
}

#[tokio::test]
async fn unauthenticated_and_logout() {
    let mut s = build(
        Arc::new(BlankPage),
        ScriptedModel::replying("pro", "[]"),
        None,
        Arc::new(SimulatedStore::instant()),
    );
    assert!(matches!(
        s.process(png("x.png")).await,
        Err(DigitizerError::NotAuthenticated)
    ));
    assert!(matches!(
        s.login("admin", "wrong").await,
        Err(DigitizerError::AuthenticationFailed)
    ));

    s.login("admin", "password123").await.unwrap();
    assert_eq!(s.navigate(View::Dashboard), View::Upload);
    s.process(png("x.png")).await.unwrap();
    assert_eq!(s.navigate(View::Upload), View::Upload);
    assert_eq!(s.navigate(View::Dashboard), View::Dashboard);

    s.logout().await;
    assert!(s.user().is_none());
    assert!(s.history().is_empty());
    assert!(s.current_record().is_none());
    assert_eq!(s.state().view, View::Login);
}

#[test]
fn session_is_send() {
    fn assert_send<T: Send>() {}
    assert_send::<Session>();
}
