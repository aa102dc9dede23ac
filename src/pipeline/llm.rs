//! Model invocation: send the normalized diagram to a vision model.
//!
//! This module turns one encoded image into the raw text the model returned.
//! It is intentionally thin: all prompt engineering lives in
//! [`crate::prompts`] and all retry timing in [`crate::pipeline::retry`].
//!
//! ## Backends
//!
//! [`VisionModel`] is the seam. Two implementations ship:
//!
//! * [`GeminiModel`] calls `generateContent` directly so the request can
//!   carry a response schema, a seed and a thinking budget.
//! * [`ProviderModel`] goes through `edgequake-llm` for every other vision
//!   provider; the schema travels inside the system prompt.
//!
//! ## Tiering
//!
//! [`ModelInvoker`] runs the primary model under the retry policy. Only when
//! that budget is exhausted by a quota signal does it hand the same request
//! to the secondary model, which gets a fresh, independent budget.

use crate::config::{AnalysisConfig, ModelBackend};
use crate::error::{DigitizerError, ModelError};
use crate::pipeline::encode;
use crate::pipeline::retry::RetryPolicy;
use crate::progress::{NoopProgressCallback, ProgressCallback};
use crate::prompts::{
    response_schema, system_instruction_with_schema, EXTRACTION_PROMPT, SYSTEM_INSTRUCTION,
};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, ProviderFactory};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Base URL of the Gemini REST API.
pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Everything one extraction call sends, independent of backend.
#[derive(Clone)]
pub struct ModelRequest {
    pub image_base64: String,
    pub mime_type: String,
    pub system_instruction: String,
    pub prompt: String,
    pub temperature: f32,
    pub seed: i64,
    pub response_schema: Value,
    pub thinking_budget: Option<u32>,
}

impl std::fmt::Debug for ModelRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelRequest")
            .field("image_base64", &self.image_base64.len())
            .field("mime_type", &self.mime_type)
            .field("temperature", &self.temperature)
            .field("seed", &self.seed)
            .field("thinking_budget", &self.thinking_budget)
            .finish_non_exhaustive()
    }
}

impl ModelRequest {
    /// The fixed extraction request for one image.
    pub fn extraction(image: &[u8], mime_type: &str, config: &AnalysisConfig) -> Self {
        Self {
            image_base64: encode::to_base64(image),
            mime_type: mime_type.to_string(),
            system_instruction: config
                .system_prompt
                .clone()
                .unwrap_or_else(|| SYSTEM_INSTRUCTION.to_string()),
            prompt: EXTRACTION_PROMPT.to_string(),
            temperature: config.temperature,
            seed: config.seed,
            response_schema: response_schema(),
            thinking_budget: config.thinking_budget,
        }
    }
}

/// A vision model that answers one extraction request with raw text.
#[async_trait]
pub trait VisionModel: Send + Sync {
    /// Model identifier, used in logs and errors.
    fn name(&self) -> &str;

    /// Send `request` once. No retrying here.
    async fn generate(&self, request: &ModelRequest) -> Result<String, ModelError>;
}

// ── Gemini REST backend ──────────────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    system_instruction: Content<'a>,
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig<'a>,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Part<'a> {
    Text {
        text: &'a str,
    },
    #[serde(rename_all = "camelCase")]
    InlineData {
        inline_data: InlineData<'a>,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData<'a> {
    mime_type: &'a str,
    data: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig<'a> {
    temperature: f32,
    seed: i64,
    response_mime_type: &'static str,
    response_schema: &'a Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    thinking_config: Option<ThinkingConfig>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ThinkingConfig {
    thinking_budget: u32,
}

#[derive(Deserialize, Default)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<ResponseContent>,
}

#[derive(Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
    #[serde(default)]
    thought: bool,
}

fn request_body(request: &ModelRequest) -> GenerateContentRequest<'_> {
    GenerateContentRequest {
        system_instruction: Content {
            parts: vec![Part::Text {
                text: &request.system_instruction,
            }],
        },
        contents: vec![Content {
            parts: vec![
                Part::InlineData {
                    inline_data: InlineData {
                        mime_type: &request.mime_type,
                        data: &request.image_base64,
                    },
                },
                Part::Text {
                    text: &request.prompt,
                },
            ],
        }],
        generation_config: GenerationConfig {
            temperature: request.temperature,
            seed: request.seed,
            response_mime_type: "application/json",
            response_schema: &request.response_schema,
            thinking_config: request
                .thinking_budget
                .map(|thinking_budget| ThinkingConfig { thinking_budget }),
        },
    }
}

/// Concatenate the answer text of the first candidate, skipping thoughts.
///
/// An empty candidate list yields an empty string, which the validator reads
/// as an empty inventory.
fn response_text(response: GenerateContentResponse) -> String {
    response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter(|p| !p.thought)
                .filter_map(|p| p.text)
                .collect()
        })
        .unwrap_or_default()
}

/// Google Gemini over its REST API.
pub struct GeminiModel {
    client: reqwest::Client,
    model: String,
    api_key: String,
    base_url: String,
}

impl GeminiModel {
    pub fn new(
        model: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, DigitizerError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DigitizerError::Internal(format!("HTTP client setup failed: {e}")))?;
        Ok(Self {
            client,
            model: model.into(),
            api_key: api_key.into(),
            base_url: GEMINI_API_BASE.to_string(),
        })
    }

    /// Point at a different API root (proxies, regional endpoints).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/{}:generateContent", self.base_url, self.model)
    }
}

#[async_trait]
impl VisionModel for GeminiModel {
    fn name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, request: &ModelRequest) -> Result<String, ModelError> {
        let start = Instant::now();
        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&request_body(request))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() || e.is_connect() {
                    ModelError::Unavailable {
                        model: self.model.clone(),
                        detail: e.to_string(),
                    }
                } else {
                    ModelError::from_message(&self.model, e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::from_status(&self.model, status.as_u16(), body));
        }

        let parsed: GenerateContentResponse =
            response.json().await.map_err(|e| ModelError::Request {
                model: self.model.clone(),
                detail: format!("malformed response envelope: {e}"),
            })?;

        let text = response_text(parsed);

        debug!(
            "{}: {} chars in {:?}",
            self.model,
            text.len(),
            start.elapsed()
        );
        Ok(text)
    }
}

// ── edgequake-llm backend ────────────────────────────────────────────────

/// Any `edgequake-llm` vision provider (OpenAI, Anthropic, Ollama, ...).
pub struct ProviderModel {
    provider: Arc<dyn LLMProvider>,
    model: String,
}

impl ProviderModel {
    pub fn new(provider: Arc<dyn LLMProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }

    /// Create through [`ProviderFactory`]; the provider reads its own API key
    /// (`OPENAI_API_KEY`, `ANTHROPIC_API_KEY`, ...) from the environment.
    pub fn create(provider_name: &str, model: &str) -> Result<Self, DigitizerError> {
        let provider = ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
            DigitizerError::ModelNotConfigured {
                model: format!("{provider_name}/{model}"),
                hint: format!("{e}"),
            }
        })?;
        Ok(Self::new(provider, model))
    }
}

#[async_trait]
impl VisionModel for ProviderModel {
    fn name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, request: &ModelRequest) -> Result<String, ModelError> {
        let messages = vec![
            ChatMessage::system(system_instruction_with_schema(&request.system_instruction)),
            ChatMessage::user_with_images(
                request.prompt.as_str(),
                vec![
                    ImageData::new(request.image_base64.clone(), request.mime_type.clone())
                        .with_detail("high"),
                ],
            ),
        ];
        let options = CompletionOptions {
            temperature: Some(request.temperature),
            ..Default::default()
        };

        let response = self
            .provider
            .chat(&messages, Some(&options))
            .await
            .map_err(|e| ModelError::from_message(&self.model, e.to_string()))?;

        debug!(
            "{}: {} input tokens, {} output tokens",
            self.model, response.prompt_tokens, response.completion_tokens
        );
        Ok(response.content)
    }
}

// ── Tiered invoker ───────────────────────────────────────────────────────

/// Primary model, optional secondary model, one retry policy.
pub struct ModelInvoker {
    primary: Arc<dyn VisionModel>,
    secondary: Option<Arc<dyn VisionModel>>,
    policy: RetryPolicy,
    config: AnalysisConfig,
    progress: ProgressCallback,
}

impl ModelInvoker {
    pub fn new(
        primary: Arc<dyn VisionModel>,
        secondary: Option<Arc<dyn VisionModel>>,
        policy: RetryPolicy,
        config: AnalysisConfig,
    ) -> Self {
        Self {
            primary,
            secondary,
            policy,
            config,
            progress: Arc::new(NoopProgressCallback),
        }
    }

    /// Build both tiers from `config.backend`.
    ///
    /// # Errors
    /// [`DigitizerError::ModelNotConfigured`] when the Gemini backend has no
    /// API key or a provider cannot be created.
    pub fn from_config(config: &AnalysisConfig) -> Result<Self, DigitizerError> {
        let build = |model: &str| -> Result<Arc<dyn VisionModel>, DigitizerError> {
            match &config.backend {
                ModelBackend::Gemini => {
                    let key = config.api_key.clone().ok_or_else(|| {
                        DigitizerError::ModelNotConfigured {
                            model: model.to_string(),
                            hint: "Set GEMINI_API_KEY (or API_KEY), or pass --api-key.".into(),
                        }
                    })?;
                    let timeout = Duration::from_secs(config.api_timeout_secs);
                    Ok(Arc::new(GeminiModel::new(model, key, timeout)?))
                }
                ModelBackend::Provider(name) => Ok(Arc::new(ProviderModel::create(name, model)?)),
            }
        };

        let primary = build(&config.primary_model)?;
        let secondary = match config.secondary_model.as_deref() {
            Some(name) if name != config.primary_model => Some(build(name)?),
            _ => None,
        };
        info!(
            "Model tiers: primary={} secondary={} backend={}",
            config.primary_model,
            config.secondary_model.as_deref().unwrap_or("-"),
            config.backend
        );
        Ok(Self::new(
            primary,
            secondary,
            RetryPolicy::from_config(config),
            config.clone(),
        ))
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = progress;
        self
    }

    pub fn primary_name(&self) -> &str {
        self.primary.name()
    }

    pub fn secondary_name(&self) -> Option<&str> {
        self.secondary.as_deref().map(|m| m.name())
    }

    /// Extract raw component text from one encoded image.
    ///
    /// # Errors
    /// [`DigitizerError::ModelInvocation`] when the primary fails permanently,
    /// or when every tier that ran exhausted its budget.
    pub async fn invoke(&self, image: &[u8], mime_type: &str) -> Result<String, DigitizerError> {
        let request = ModelRequest::extraction(image, mime_type, &self.config);

        let err = match self.run_tier(self.primary.as_ref(), &request).await {
            Ok(text) => return Ok(text),
            Err(e) => e,
        };

        let secondary = match &self.secondary {
            Some(s) if self.policy.should_fall_back(&err) => s,
            _ => return Err(invocation_error(err)),
        };

        warn!(
            "{} quota exhausted, falling back to {}",
            self.primary.name(),
            secondary.name()
        );
        self.progress.on_fallback(self.primary.name(), secondary.name());

        self.run_tier(secondary.as_ref(), &request)
            .await
            .map_err(invocation_error)
    }

    async fn run_tier(
        &self,
        model: &dyn VisionModel,
        request: &ModelRequest,
    ) -> Result<String, ModelError> {
        self.policy
            .execute(model.name(), self.progress.as_ref(), |_| model.generate(request))
            .await
    }
}

fn invocation_error(source: ModelError) -> DigitizerError {
    DigitizerError::ModelInvocation {
        model: source.model().to_string(),
        source,
    }
}
