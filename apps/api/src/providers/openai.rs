//! OpenAI Chat Completions adapter. Also serves OpenAI-compatible hosts via `OPENAI_BASE_URL`.

use std::sync::Arc;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use super::tokens::TokenEstimator;
use super::{
    account, check_image, decode, probe, send, trim_base, CredentialCheck, Generation,
    ImageInput, ProviderAdapter, ProviderError, TextRequest,
};
use crate::models::provider::ProviderType;
use crate::orchestration::vault::CredentialSecret;

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    /// Either a plain string or an array of typed parts.
    content: Value,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// OpenAI-compatible hosts may send a partial object (only `total_tokens`).
#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: Option<u32>,
    completion_tokens: Option<u32>,
}

impl ChatResponse {
    fn usage(&self) -> Option<(u32, u32)> {
        let usage = self.usage.as_ref()?;
        Some((usage.prompt_tokens?, usage.completion_tokens?))
    }
}

pub struct OpenAiAdapter {
    client: Client,
    base_url: String,
    api_key: CredentialSecret,
    model: String,
    estimator: Arc<dyn TokenEstimator>,
}

impl OpenAiAdapter {
    pub fn new(
        client: Client,
        base_url: &str,
        api_key: CredentialSecret,
        model: String,
        estimator: Arc<dyn TokenEstimator>,
    ) -> Self {
        Self {
            client,
            base_url: trim_base(base_url),
            api_key,
            model,
            estimator,
        }
    }

    async fn call(
        &self,
        request: &TextRequest<'_>,
        user_content: Value,
    ) -> Result<Generation, ProviderError> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = request.system_prompt {
            messages.push(ChatMessage {
                role: "system",
                content: Value::String(system.to_string()),
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: user_content,
        });

        let body = ChatRequest {
            model: &self.model,
            messages,
            temperature: request.temperature,
            max_tokens: request.max_output_tokens,
        };

        let raw = send(
            self.client
                .post(format!("{}/v1/chat/completions", self.base_url))
                .bearer_auth(self.api_key.expose_secret())
                .json(&body),
        )
        .await?;

        let response: ChatResponse = decode(&raw)?;
        let reported = response.usage();
        let text = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ProviderError::malformed("response contained no message content"))?;

        debug!("OpenAI call succeeded: model={}", self.model);
        Ok(account(self.estimator.as_ref(), request, text, reported))
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiAdapter {
    async fn generate_text(&self, request: &TextRequest<'_>) -> Result<Generation, ProviderError> {
        self.call(request, Value::String(request.prompt.to_string()))
            .await
    }

    async fn generate_multimodal(
        &self,
        request: &TextRequest<'_>,
        image: &ImageInput<'_>,
    ) -> Result<Generation, ProviderError> {
        check_image(ProviderType::OpenAi, &self.model, image)?;
        let data_uri = format!(
            "data:{};base64,{}",
            image.mime_type,
            STANDARD.encode(image.bytes)
        );
        let content = json!([
            { "type": "text", "text": request.prompt },
            { "type": "image_url", "image_url": { "url": data_uri } },
        ]);
        self.call(request, content).await
    }

    async fn validate_credentials(&self) -> CredentialCheck {
        probe(
            self.client
                .get(format!("{}/v1/models", self.base_url))
                .bearer_auth(self.api_key.expose_secret()),
        )
        .await
    }
}
