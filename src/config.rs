//! Configuration types for diagram analysis.
//!
//! All analysis behaviour is controlled through [`AnalysisConfig`], built via
//! its [`AnalysisConfigBuilder`]. Every knob lives in one struct so a config
//! can be logged, cloned into a session, and diffed between runs.

use crate::error::DigitizerError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default primary extraction model.
pub const DEFAULT_PRIMARY_MODEL: &str = "gemini-3-pro-preview";
/// Default fallback model, used after the primary's quota is exhausted.
pub const DEFAULT_SECONDARY_MODEL: &str = "gemini-3-flash-preview";

/// Configuration for a digitizing session.
///
/// # Example
/// ```rust
/// use pid_digitizer::AnalysisConfig;
///
/// let config = AnalysisConfig::builder()
///     .primary_model("gemini-3-pro-preview")
///     .max_attempts(3)
///     .build()
///     .unwrap();
/// assert_eq!(config.seed, 42);
/// ```
#[derive(Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Which service answers model requests. Default: [`ModelBackend::Gemini`].
    pub backend: ModelBackend,

    /// API key for the Gemini backend. Default: `GEMINI_API_KEY`, else `API_KEY`.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,

    /// Model tried first. Default: `gemini-3-pro-preview`.
    pub primary_model: String,

    /// Model tried once the primary's quota is exhausted. `None` disables
    /// fallback. Default: `gemini-3-flash-preview`.
    pub secondary_model: Option<String>,

    /// Sampling temperature. Default: 0.0.
    ///
    /// Extraction must be reproducible: the same diagram should yield the
    /// same inventory on every upload so versions can be compared.
    pub temperature: f32,

    /// Generation seed. Default: 42.
    pub seed: i64,

    /// Gemini thinking budget in tokens. Default: 512.
    pub thinking_budget: Option<u32>,

    /// Attempts per model tier, first call included. Default: 3.
    pub max_attempts: u32,

    /// Base backoff delay in milliseconds; doubles per attempt. Default: 1500.
    pub retry_base_delay_ms: u64,

    /// Upper bound of the random jitter added to each backoff. Default: 1000.
    pub retry_jitter_ms: u64,

    /// Upscale factor applied when rendering the first PDF page. Default: 2.0.
    pub pdf_scale: f32,

    /// JPEG quality (1–100) for rendered PDF pages. Default: 85.
    ///
    /// PNG of a 2× render of an A1 sheet is tens of megabytes and slow to
    /// produce; 85 keeps line art legible at a fraction of the size.
    pub jpeg_quality: u8,

    /// Simulated persistence latency in milliseconds. Default: 1500.
    pub store_latency_ms: u64,

    /// Per-request HTTP timeout in seconds. Default: 300.
    pub api_timeout_secs: u64,

    /// Custom system instruction. If None, uses the built-in P&ID instruction.
    pub system_prompt: Option<String>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            backend: ModelBackend::default(),
            api_key: api_key_from_env(),
            primary_model: DEFAULT_PRIMARY_MODEL.to_string(),
            secondary_model: Some(DEFAULT_SECONDARY_MODEL.to_string()),
            temperature: 0.0,
            seed: 42,
            thinking_budget: Some(512),
            max_attempts: 3,
            retry_base_delay_ms: 1500,
            retry_jitter_ms: 1000,
            pdf_scale: 2.0,
            jpeg_quality: 85,
            store_latency_ms: 1500,
            api_timeout_secs: 300,
            system_prompt: None,
        }
    }
}

fn api_key_from_env() -> Option<String> {
    ["GEMINI_API_KEY", "API_KEY"]
        .iter()
        .filter_map(|k| std::env::var(k).ok())
        .find(|v| !v.is_empty())
}

impl fmt::Debug for AnalysisConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisConfig")
            .field("backend", &self.backend)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("primary_model", &self.primary_model)
            .field("secondary_model", &self.secondary_model)
            .field("temperature", &self.temperature)
            .field("seed", &self.seed)
            .field("thinking_budget", &self.thinking_budget)
            .field("max_attempts", &self.max_attempts)
            .field("retry_base_delay_ms", &self.retry_base_delay_ms)
            .field("retry_jitter_ms", &self.retry_jitter_ms)
            .field("pdf_scale", &self.pdf_scale)
            .field("jpeg_quality", &self.jpeg_quality)
            .field("store_latency_ms", &self.store_latency_ms)
            .finish()
    }
}

impl AnalysisConfig {
    /// Create a new builder for `AnalysisConfig`.
    pub fn builder() -> AnalysisConfigBuilder {
        AnalysisConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`AnalysisConfig`].
#[derive(Debug)]
pub struct AnalysisConfigBuilder {
    config: AnalysisConfig,
}

impl AnalysisConfigBuilder {
    pub fn backend(mut self, backend: ModelBackend) -> Self {
        self.config.backend = backend;
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn primary_model(mut self, model: impl Into<String>) -> Self {
        self.config.primary_model = model.into();
        self
    }

    pub fn secondary_model(mut self, model: Option<String>) -> Self {
        self.config.secondary_model = model.filter(|m| !m.trim().is_empty());
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn seed(mut self, seed: i64) -> Self {
        self.config.seed = seed;
        self
    }

    pub fn thinking_budget(mut self, budget: Option<u32>) -> Self {
        self.config.thinking_budget = budget;
        self
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.config.max_attempts = n;
        self
    }

    pub fn retry_base_delay_ms(mut self, ms: u64) -> Self {
        self.config.retry_base_delay_ms = ms;
        self
    }

    pub fn retry_jitter_ms(mut self, ms: u64) -> Self {
        self.config.retry_jitter_ms = ms;
        self
    }

    pub fn pdf_scale(mut self, scale: f32) -> Self {
        self.config.pdf_scale = scale.clamp(0.5, 6.0);
        self
    }

    pub fn jpeg_quality(mut self, q: u8) -> Self {
        self.config.jpeg_quality = q.clamp(1, 100);
        self
    }

    pub fn store_latency_ms(mut self, ms: u64) -> Self {
        self.config.store_latency_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<AnalysisConfig, DigitizerError> {
        let c = &self.config;
        if c.max_attempts == 0 {
            return Err(DigitizerError::InvalidConfig(
                "max_attempts must be ≥ 1".into(),
            ));
        }
        if c.primary_model.trim().is_empty() {
            return Err(DigitizerError::InvalidConfig(
                "primary model name must not be empty".into(),
            ));
        }
        if c.api_timeout_secs == 0 {
            return Err(DigitizerError::InvalidConfig(
                "api_timeout_secs must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// The service that answers extraction requests.
///
/// Gemini is called directly so the request can carry a response schema,
/// a seed and a thinking budget. Any other vision provider goes through
/// `edgequake-llm`, with the schema embedded in the system prompt instead.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ModelBackend {
    /// Google Gemini `generateContent` REST API. (default)
    #[default]
    Gemini,
    /// A named `edgequake-llm` provider, e.g. "openai", "anthropic", "ollama".
    Provider(String),
}

impl ModelBackend {
    /// Parse a backend name as given on the command line.
    pub fn parse(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "" | "gemini" | "google" => ModelBackend::Gemini,
            other => ModelBackend::Provider(other.to_string()),
        }
    }
}

impl fmt::Display for ModelBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelBackend::Gemini => f.write_str("gemini"),
            ModelBackend::Provider(name) => f.write_str(name),
        }
    }
}
