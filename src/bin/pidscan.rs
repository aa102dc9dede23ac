//! CLI binary for pid-digitizer.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `AnalysisConfig`, runs every input file through one session and prints
//! the resulting inventory.

use anyhow::{bail, Context, Result};
use clap::Parser;
use pid_digitizer::config::{DEFAULT_PRIMARY_MODEL, DEFAULT_SECONDARY_MODEL};
use pid_digitizer::{
    AnalysisConfig, ComponentStatus, DocumentNormalizer, FailureKind, ModelBackend, ModelInvoker,
    PdfiumRenderer, ProcessingStep, ProgressCallback, Session, SessionProgressCallback,
    SimulatedStore, StaticCredentials, UploadRecord,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: one spinner for the session, with a log line
/// per retry, fallback and finished run.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style =
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Ready");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl SessionProgressCallback for CliProgressCallback {
    fn on_step_change(&self, step: ProcessingStep) {
        let (prefix, msg) = match step {
            ProcessingStep::ConvertingDocument => ("Converting", "rendering PDF page 1…"),
            ProcessingStep::Analyzing => ("Analyzing", "scanning diagram…"),
            ProcessingStep::Saving => ("Saving", "committing record…"),
            ProcessingStep::Idle => ("Ready", ""),
        };
        self.bar.set_prefix(prefix);
        self.bar.set_message(msg);
    }

    fn on_model_attempt(&self, model: &str, attempt: u32, max: u32) {
        self.bar.set_message(format!("{model}  attempt {attempt}/{max}"));
    }

    fn on_retry_scheduled(&self, model: &str, attempt: u32, wait: Duration) {
        self.bar.println(format!(
            "  {} {model} attempt {attempt} hit a transient error, retrying in {:.1}s",
            yellow("↻"),
            wait.as_secs_f64()
        ));
    }

    fn on_fallback(&self, from: &str, to: &str) {
        self.bar.println(format!(
            "  {} {from} quota exhausted, falling back to {}",
            yellow("⚠"),
            bold(to)
        ));
    }

    fn on_run_complete(&self, file_name: &str, version: u32, component_count: usize) {
        self.bar.println(format!(
            "{} {}  v{version}  {}",
            green("✔"),
            bold(file_name),
            dim(&format!("{component_count} components"))
        ));
    }

    fn on_run_failed(&self, file_name: &str, kind: FailureKind, error: &str) {
        // Keep long provider errors to one line.
        let detail: String = error.lines().next().unwrap_or_default().chars().take(100).collect();
        self.bar.println(format!(
            "{} {}  {}\n  {}",
            red("✘"),
            bold(file_name),
            red(kind.message()),
            dim(&detail)
        ));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Digitize one drawing
  pidscan P-101.pdf

  # Same file twice → versions 1 and 2
  pidscan P-101.pdf P-101.pdf

  # Mark two components after analysis, print JSON history
  pidscan --mark HV-101=MAINTENANCE_REQUIRED --mark PSV-2001=CRITICAL_REPAIR \
          --json sheet.png > inventory.json

  # Any edgequake-llm provider instead of Gemini
  pidscan --backend openai --model gpt-4.1 --no-fallback sheet.jpg

STATUSES:
  OPERATIONAL, MAINTENANCE_REQUIRED, CRITICAL_REPAIR, UNKNOWN

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY          Google Gemini API key (API_KEY also accepted)
  OPENAI_API_KEY, ...     Keys for --backend providers
  PIDSCAN_USER            Sign-in identifier
  PIDSCAN_PASSWORD        Sign-in secret
  PDFIUM_LIB_PATH         Path to libpdfium (file or directory)
  RUST_LOG                Overrides the log filter
"#;

/// Digitize P&ID diagrams into a versioned component inventory.
#[derive(Parser, Debug)]
#[command(
    name = "pidscan",
    version,
    about = "Digitize P&ID diagrams into a versioned component inventory",
    long_about = "Send P&ID drawings (PNG/JPEG images or PDFs, first page) to a vision model, \
validate the extracted valves, instruments and equipment, and keep every run as a versioned \
record. Files are processed in order within one session.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Diagram files (PDF or image), processed in order.
    #[arg(required = true, num_args = 1..)]
    files: Vec<PathBuf>,

    /// Sign-in identifier.
    #[arg(long, env = "PIDSCAN_USER", default_value = "admin")]
    user: String,

    /// Sign-in secret.
    #[arg(long, env = "PIDSCAN_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Gemini API key.
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Model service: gemini, or an edgequake-llm provider (openai, anthropic, ollama, …).
    #[arg(long, env = "PIDSCAN_BACKEND", default_value = "gemini")]
    backend: String,

    /// Primary model.
    #[arg(long, env = "PIDSCAN_MODEL", default_value = DEFAULT_PRIMARY_MODEL)]
    model: String,

    /// Model used after the primary's quota is exhausted.
    #[arg(long, env = "PIDSCAN_FALLBACK_MODEL", default_value = DEFAULT_SECONDARY_MODEL)]
    fallback_model: String,

    /// Never fall back to a second model.
    #[arg(long, env = "PIDSCAN_NO_FALLBACK")]
    no_fallback: bool,

    /// Sampling temperature (0.0–2.0).
    #[arg(long, env = "PIDSCAN_TEMPERATURE", default_value_t = 0.0)]
    temperature: f32,

    /// Generation seed.
    #[arg(long, env = "PIDSCAN_SEED", default_value_t = 42)]
    seed: i64,

    /// Gemini thinking budget in tokens; 0 disables thinking config.
    #[arg(long, env = "PIDSCAN_THINKING_BUDGET", default_value_t = 512)]
    thinking_budget: u32,

    /// Attempts per model tier.
    #[arg(long, env = "PIDSCAN_MAX_ATTEMPTS", default_value_t = 3,
          value_parser = clap::value_parser!(u32).range(1..=10))]
    max_attempts: u32,

    /// PDF render scale factor.
    #[arg(long, env = "PIDSCAN_SCALE", default_value_t = 2.0)]
    scale: f32,

    /// JPEG quality for rendered PDF pages (1–100).
    #[arg(long, env = "PIDSCAN_JPEG_QUALITY", default_value_t = 85,
          value_parser = clap::value_parser!(u8).range(1..=100))]
    jpeg_quality: u8,

    /// Simulated store acknowledgment delay.
    #[arg(long, env = "PIDSCAN_STORE_LATENCY_MS", default_value_t = 1500)]
    store_latency_ms: u64,

    /// Per-request model timeout in seconds.
    #[arg(long, env = "PIDSCAN_API_TIMEOUT", default_value_t = 300)]
    api_timeout: u64,

    /// Path to a text file replacing the built-in system instruction.
    #[arg(long, env = "PIDSCAN_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// libpdfium file or directory (default: PDFIUM_LIB_PATH, then system).
    #[arg(long)]
    pdfium_lib: Option<PathBuf>,

    /// Set a component status on the newest record: ID=STATUS (repeatable).
    #[arg(long = "mark", value_name = "ID=STATUS", value_parser = parse_mark)]
    marks: Vec<(String, ComponentStatus)>,

    /// Print the whole session history as JSON instead of tables.
    #[arg(long, env = "PIDSCAN_JSON")]
    json: bool,

    /// Keep the inline image preview in JSON output.
    #[arg(long)]
    with_preview: bool,

    /// Disable the progress spinner.
    #[arg(long, env = "PIDSCAN_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PIDSCAN_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PIDSCAN_QUIET")]
    quiet: bool,
}

fn parse_mark(raw: &str) -> Result<(String, ComponentStatus), String> {
    let (id, status) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected ID=STATUS, got '{raw}'"))?;
    let id = id.trim();
    if id.is_empty() {
        return Err("component id must not be empty".into());
    }
    Ok((id.to_string(), status.parse()?))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Library INFO logs are suppressed while the spinner is active; the
    // callback prints everything the user needs.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let Some(password) = cli.password.clone() else {
        bail!("No password given. Pass --password or set PIDSCAN_PASSWORD.");
    };

    // ── Build session ────────────────────────────────────────────────────
    let config = build_config(&cli).await?;
    let renderer = match &cli.pdfium_lib {
        Some(path) => PdfiumRenderer::with_library(path),
        None => PdfiumRenderer::default(),
    };
    let invoker = ModelInvoker::from_config(&config).context("Model setup failed")?;
    if !cli.quiet && !cli.json {
        let fallback = match invoker.secondary_name() {
            Some(name) => format!("(fallback {name})"),
            None => "(no fallback)".to_string(),
        };
        eprintln!("{} models: {} {}", cyan("◆"), bold(invoker.primary_name()), dim(&fallback));
    }
    let mut session = Session::new(
        DocumentNormalizer::new(Arc::new(renderer), &config),
        invoker,
        Arc::new(SimulatedStore::new(Duration::from_millis(config.store_latency_ms))),
        Arc::new(StaticCredentials::default()),
    );

    let spinner = show_progress.then(CliProgressCallback::new);
    if let Some(ref cb) = spinner {
        session = session.with_progress(Arc::clone(cb) as ProgressCallback);
    }

    let user = session
        .login(&cli.user, &password)
        .await
        .context("Sign-in failed")?;
    if !cli.quiet && !cli.json {
        eprintln!("{} signed in as {} ({})", cyan("◆"), bold(&user.name), user.role);
    }

    // ── Process files ────────────────────────────────────────────────────
    let mut failed = 0usize;
    for path in &cli.files {
        match session.process_path(path).await {
            Ok(record) => {
                if !cli.json && !cli.quiet {
                    if let Some(ref cb) = spinner {
                        cb.bar.suspend(|| print_record(record));
                    } else {
                        print_record(record);
                    }
                }
            }
            Err(e) => {
                failed += 1;
                if spinner.is_none() {
                    eprintln!("{} {}: {}", red("✘"), path.display(), e.user_message());
                    eprintln!("  {}", dim(&e.to_string()));
                }
            }
        }
    }
    if let Some(ref cb) = spinner {
        cb.finish();
    }

    // ── Status edits ─────────────────────────────────────────────────────
    if !cli.marks.is_empty() {
        let Some(latest) = session.history().latest().map(|r| r.id) else {
            bail!("--mark given but no diagram was processed successfully");
        };
        for (component_id, status) in &cli.marks {
            let n = session.update_status(latest, component_id, *status);
            if cli.quiet {
                continue;
            }
            if n == 0 {
                eprintln!("{} {component_id}: not in the newest record, skipped", yellow("⚠"));
            } else {
                eprintln!("{} {component_id} → {status}", green("✓"));
            }
        }
    }

    // ── Output ───────────────────────────────────────────────────────────
    if cli.json {
        let records: Vec<UploadRecord> = session
            .history()
            .iter()
            .cloned()
            .map(|mut r| {
                if !cli.with_preview {
                    r.image_preview.clear();
                }
                r
            })
            .collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&records).context("Failed to serialise history")?
        );
    } else if !cli.quiet && !cli.marks.is_empty() {
        if let Some(record) = session.history().latest() {
            print_record(record);
        }
    }

    if failed > 0 {
        bail!("{failed} of {} file(s) failed", cli.files.len());
    }
    Ok(())
}

/// Map CLI args to `AnalysisConfig`.
async fn build_config(cli: &Cli) -> Result<AnalysisConfig> {
    let mut builder = AnalysisConfig::builder()
        .backend(ModelBackend::parse(&cli.backend))
        .primary_model(cli.model.clone())
        .secondary_model((!cli.no_fallback).then(|| cli.fallback_model.clone()))
        .temperature(cli.temperature)
        .seed(cli.seed)
        .thinking_budget((cli.thinking_budget > 0).then_some(cli.thinking_budget))
        .max_attempts(cli.max_attempts)
        .pdf_scale(cli.scale)
        .jpeg_quality(cli.jpeg_quality)
        .store_latency_ms(cli.store_latency_ms)
        .api_timeout_secs(cli.api_timeout);

    if let Some(ref key) = cli.api_key {
        builder = builder.api_key(key.clone());
    }
    if let Some(ref path) = cli.system_prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read system prompt from {:?}", path))?;
        builder = builder.system_prompt(prompt);
    }

    builder.build().context("Invalid configuration")
}

fn print_record(record: &UploadRecord) {
    let stats = record.stats();
    println!(
        "\n{} {}  v{}  {}",
        cyan("◆"),
        bold(&record.file_name),
        record.version,
        dim(&record.timestamp.format("%Y-%m-%d %H:%M:%S UTC").to_string())
    );
    println!(
        "  {}  {} operational, {} need attention",
        record.summary,
        green(&stats.operational.to_string()),
        yellow(&stats.maintenance.to_string())
    );
    if record.components.is_empty() {
        return;
    }
    println!(
        "  {}",
        dim(&format!(
            "{:<14} {:<24} {:<21} {:>5} {:>5}  {}",
            "ID", "TYPE", "STATUS", "X", "Y", "NOTE"
        ))
    );
    for c in &record.components {
        let status = format!("{:<21}", c.current_status.as_str());
        let status = match c.current_status {
            ComponentStatus::Operational => green(&status),
            ComponentStatus::MaintenanceRequired => yellow(&status),
            ComponentStatus::CriticalRepair => red(&status),
            ComponentStatus::Unknown => dim(&status),
        };
        let kind: String = c.kind.chars().take(24).collect();
        let note: String = c.uae_standard_note.chars().take(60).collect();
        println!(
            "  {:<14} {:<24} {} {:>5.1} {:>5.1}  {}",
            c.id, kind, status, c.coordinates.x, c.coordinates.y, note
        );
    }
}
