//! Provider adapters — the only place that talks to external generation backends.
//!
//! ARCHITECTURAL RULE: business code never calls a backend directly. It goes through
//! `Orchestrator::generate`, which builds a fresh adapter per call via `AdapterFactory`.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::models::provider::ProviderType;
use crate::orchestration::vault::CredentialSecret;

pub mod anthropic;
pub mod gemini;
pub mod openai;
pub mod tokens;

#[cfg(test)]
pub mod fake;

use self::tokens::{CharRatioEstimator, TokenEstimator};

pub const GEMINI_DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const OPENAI_DEFAULT_BASE_URL: &str = "https://api.openai.com";
pub const ANTHROPIC_DEFAULT_BASE_URL: &str = "https://api.anthropic.com";

/// Output cap used when the caller does not set one.
pub const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 4096;

const MAX_ERROR_BODY_CHARS: usize = 300;

const SUPPORTED_IMAGE_MIME_TYPES: [&str; 5] = [
    "image/png",
    "image/jpeg",
    "image/jpg",
    "image/webp",
    "image/gif",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProviderErrorKind {
    Auth,
    RateLimit,
    Timeout,
    MalformedResponse,
    UnsupportedModality,
    Unknown,
}

impl ProviderErrorKind {
    /// Rate limits and timeouts are worth retrying later; the caller owns that policy.
    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderErrorKind::RateLimit | ProviderErrorKind::Timeout)
    }
}

impl fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProviderErrorKind::Auth => "AUTH",
            ProviderErrorKind::RateLimit => "RATE_LIMIT",
            ProviderErrorKind::Timeout => "TIMEOUT",
            ProviderErrorKind::MalformedResponse => "MALFORMED_RESPONSE",
            ProviderErrorKind::UnsupportedModality => "UNSUPPORTED_MODALITY",
            ProviderErrorKind::Unknown => "UNKNOWN",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    pub message: String,
}

impl ProviderError {
    pub fn new(kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::MalformedResponse, message)
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::UnsupportedModality, message)
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ProviderError::new(ProviderErrorKind::Timeout, format!("request timed out: {e}"))
        } else if e.is_decode() {
            ProviderError::malformed(format!("could not decode response: {e}"))
        } else {
            ProviderError::new(ProviderErrorKind::Unknown, format!("request failed: {e}"))
        }
    }
}

/// Text generation parameters shared by every backend.
#[derive(Debug, Clone, Copy)]
pub struct TextRequest<'a> {
    pub prompt: &'a str,
    pub system_prompt: Option<&'a str>,
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
}

impl<'a> TextRequest<'a> {
    pub fn new(prompt: &'a str) -> Self {
        Self {
            prompt,
            system_prompt: None,
            temperature: None,
            max_output_tokens: None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ImageInput<'a> {
    pub bytes: &'a [u8],
    pub mime_type: &'a str,
}

/// Normalized result of one backend call. Token counts are always defined.
#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    pub text: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    /// True when counts came from the estimator rather than the backend.
    pub tokens_estimated: bool,
}

/// Outcome of a credential probe. Never an error: failures are data for the admin "test" action.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CredentialCheck {
    pub success: bool,
    pub message: String,
}

impl CredentialCheck {
    pub fn ok() -> Self {
        Self {
            success: true,
            message: "Credentials are valid".to_string(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// Uniform interface to one external generation backend.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    async fn generate_text(&self, request: &TextRequest<'_>) -> Result<Generation, ProviderError>;

    /// Fails with `UNSUPPORTED_MODALITY` before any network I/O when the bound
    /// model cannot take images.
    async fn generate_multimodal(
        &self,
        request: &TextRequest<'_>,
        image: &ImageInput<'_>,
    ) -> Result<Generation, ProviderError>;

    async fn validate_credentials(&self) -> CredentialCheck;
}

/// The concrete (provider, model, credential) binding an adapter is built for.
#[derive(Debug, Clone)]
pub struct AdapterTarget {
    pub provider_type: ProviderType,
    pub model: String,
    pub api_key: CredentialSecret,
}

/// Builds adapters per call. Implementations must not cache adapters across calls.
pub trait AdapterFactory: Send + Sync {
    fn build(&self, target: AdapterTarget) -> Box<dyn ProviderAdapter>;
}

/// Base URLs per backend family. Overridable for proxies and OpenAI-compatible hosts.
#[derive(Debug, Clone)]
pub struct ProviderEndpoints {
    pub gemini: String,
    pub openai: String,
    pub anthropic: String,
}

impl Default for ProviderEndpoints {
    fn default() -> Self {
        Self {
            gemini: GEMINI_DEFAULT_BASE_URL.to_string(),
            openai: OPENAI_DEFAULT_BASE_URL.to_string(),
            anthropic: ANTHROPIC_DEFAULT_BASE_URL.to_string(),
        }
    }
}

/// Production factory. Shares one connection pool; credentials live only in the adapters.
pub struct HttpAdapterFactory {
    client: Client,
    endpoints: ProviderEndpoints,
    estimator: Arc<dyn TokenEstimator>,
}

impl HttpAdapterFactory {
    pub fn new(timeout: Duration, endpoints: ProviderEndpoints) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoints,
            estimator: Arc::new(CharRatioEstimator::default()),
        })
    }
}

impl AdapterFactory for HttpAdapterFactory {
    fn build(&self, target: AdapterTarget) -> Box<dyn ProviderAdapter> {
        let AdapterTarget {
            provider_type,
            model,
            api_key,
        } = target;
        let client = self.client.clone();
        let estimator = Arc::clone(&self.estimator);

        match provider_type {
            ProviderType::Gemini => Box::new(gemini::GeminiAdapter::new(
                client,
                &self.endpoints.gemini,
                api_key,
                model,
                estimator,
            )),
            ProviderType::OpenAi => Box::new(openai::OpenAiAdapter::new(
                client,
                &self.endpoints.openai,
                api_key,
                model,
                estimator,
            )),
            ProviderType::Anthropic => Box::new(anthropic::AnthropicAdapter::new(
                client,
                &self.endpoints.anthropic,
                api_key,
                model,
                estimator,
            )),
        }
    }
}

/// Whether `model` accepts image input. Only legacy text-only families are excluded.
pub fn model_supports_images(provider: ProviderType, model: &str) -> bool {
    let model = model.to_ascii_lowercase();
    let text_only: &[&str] = match provider {
        ProviderType::Gemini => &["gemini-1.0-pro", "gemini-pro"],
        ProviderType::OpenAi => &["gpt-3.5", "o1-mini", "o3-mini", "text-"],
        ProviderType::Anthropic => &["claude-2", "claude-instant"],
    };
    // "gemini-pro-vision" is the one legacy Gemini model that did take images.
    if model.starts_with("gemini-pro-vision") {
        return true;
    }
    !text_only.iter().any(|prefix| model.starts_with(prefix))
}

/// Rejects images the bound model cannot accept.
pub(crate) fn check_image(
    provider: ProviderType,
    model: &str,
    image: &ImageInput<'_>,
) -> Result<(), ProviderError> {
    if !model_supports_images(provider, model) {
        return Err(ProviderError::unsupported(format!(
            "model '{model}' on {provider} does not accept image input"
        )));
    }
    if image.bytes.is_empty() {
        return Err(ProviderError::unsupported("image payload is empty"));
    }
    let mime = image.mime_type.to_ascii_lowercase();
    if !SUPPORTED_IMAGE_MIME_TYPES.contains(&mime.as_str()) {
        return Err(ProviderError::unsupported(format!(
            "image type '{}' is not supported",
            image.mime_type
        )));
    }
    Ok(())
}

/// Uses backend-reported counts when present, otherwise the estimator.
pub(crate) fn account(
    estimator: &dyn TokenEstimator,
    request: &TextRequest<'_>,
    text: String,
    reported: Option<(u32, u32)>,
) -> Generation {
    match reported {
        Some((input_tokens, output_tokens)) => Generation {
            text,
            input_tokens,
            output_tokens,
            tokens_estimated: false,
        },
        None => {
            let input_tokens = estimator
                .estimate(request.prompt)
                .saturating_add(request.system_prompt.map_or(0, |s| estimator.estimate(s)));
            let output_tokens = estimator.estimate(&text);
            debug!("Backend reported no usage; estimated {input_tokens}/{output_tokens} tokens");
            Generation {
                text,
                input_tokens,
                output_tokens,
                tokens_estimated: true,
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

/// Maps a non-success HTTP response to the provider error taxonomy.
pub(crate) fn classify_failure(status: StatusCode, body: &str) -> ProviderError {
    let message = serde_json::from_str::<ApiErrorEnvelope>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| body.chars().take(MAX_ERROR_BODY_CHARS).collect());
    let message = format!("backend returned {}: {}", status.as_u16(), message);

    let lowered = body.to_ascii_lowercase();
    let names_bad_key = lowered.contains("api_key_invalid")
        || lowered.contains("api key not valid")
        || lowered.contains("invalid_api_key")
        || lowered.contains("invalid x-api-key")
        || lowered.contains("authentication_error");

    let kind = match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ProviderErrorKind::Auth,
        _ if names_bad_key => ProviderErrorKind::Auth,
        StatusCode::TOO_MANY_REQUESTS => ProviderErrorKind::RateLimit,
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => ProviderErrorKind::Timeout,
        _ => ProviderErrorKind::Unknown,
    };
    ProviderError::new(kind, message)
}

/// Sends a request and returns the body of a 2xx response.
pub(crate) async fn send(request: RequestBuilder) -> Result<String, ProviderError> {
    let response = request.send().await?;
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        return Err(classify_failure(status, &body));
    }
    Ok(body)
}

/// Low-cost probe used by `validate_credentials`. Never fails.
pub(crate) async fn probe(request: RequestBuilder) -> CredentialCheck {
    match send(request).await {
        Ok(_) => CredentialCheck::ok(),
        Err(e) if e.kind == ProviderErrorKind::Auth => {
            CredentialCheck::failed(format!("Credentials rejected: {}", e.message))
        }
        Err(e) => CredentialCheck::failed(format!("Probe failed ({}): {}", e.kind, e.message)),
    }
}

/// Decodes a 2xx body, mapping decode failures to `MALFORMED_RESPONSE`.
pub(crate) fn decode<T: serde::de::DeserializeOwned>(body: &str) -> Result<T, ProviderError> {
    serde_json::from_str(body)
        .map_err(|e| ProviderError::malformed(format!("unexpected response shape: {e}")))
}

pub(crate) fn trim_base(base: &str) -> String {
    base.trim_end_matches('/').to_string()
}
