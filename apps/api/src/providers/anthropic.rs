//! Anthropic Messages API adapter.

use std::sync::Arc;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::tokens::TokenEstimator;
use super::{
    account, check_image, decode, probe, send, trim_base, CredentialCheck, Generation,
    ImageInput, ProviderAdapter, ProviderError, TextRequest, DEFAULT_MAX_OUTPUT_TOKENS,
};
use crate::models::provider::ProviderType;
use crate::orchestration::vault::CredentialSecret;

const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    messages: Vec<Message<'a>>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: Vec<ContentPart<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart<'a> {
    Text { text: &'a str },
    Image { source: ImageSource<'a> },
}

#[derive(Debug, Serialize)]
struct ImageSource<'a> {
    #[serde(rename = "type")]
    source_type: &'a str,
    media_type: &'a str,
    data: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: Option<u32>,
    output_tokens: Option<u32>,
}

impl MessagesResponse {
    fn usage(&self) -> Option<(u32, u32)> {
        let usage = self.usage.as_ref()?;
        Some((usage.input_tokens?, usage.output_tokens?))
    }

    /// Concatenates every text block.
    fn text(&self) -> Option<String> {
        let parts: Vec<&str> = self
            .content
            .iter()
            .filter(|b| b.block_type == "text")
            .filter_map(|b| b.text.as_deref())
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.concat())
        }
    }
}

pub struct AnthropicAdapter {
    client: Client,
    base_url: String,
    api_key: CredentialSecret,
    model: String,
    estimator: Arc<dyn TokenEstimator>,
}

impl AnthropicAdapter {
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
        content: Vec<ContentPart<'_>>,
    ) -> Result<Generation, ProviderError> {
        let body = MessagesRequest {
            model: &self.model,
            max_tokens: request.max_output_tokens.unwrap_or(DEFAULT_MAX_OUTPUT_TOKENS),
            system: request.system_prompt,
            temperature: request.temperature,
            messages: vec![Message {
                role: "user",
                content,
            }],
        };

        let raw = send(
            self.client
                .post(format!("{}/v1/messages", self.base_url))
                .header("x-api-key", self.api_key.expose_secret())
                .header("anthropic-version", ANTHROPIC_VERSION)
                .json(&body),
        )
        .await?;

        let response: MessagesResponse = decode(&raw)?;
        let text = response
            .text()
            .ok_or_else(|| ProviderError::malformed("response contained no text block"))?;
        let reported = response.usage();

        debug!("Anthropic call succeeded: model={}", self.model);
        Ok(account(self.estimator.as_ref(), request, text, reported))
    }
}

#[async_trait]
impl ProviderAdapter for AnthropicAdapter {
    async fn generate_text(&self, request: &TextRequest<'_>) -> Result<Generation, ProviderError> {
        self.call(
            request,
            vec![ContentPart::Text {
                text: request.prompt,
            }],
        )
        .await
    }

    async fn generate_multimodal(
        &self,
        request: &TextRequest<'_>,
        image: &ImageInput<'_>,
    ) -> Result<Generation, ProviderError> {
        check_image(ProviderType::Anthropic, &self.model, image)?;
        let content = vec![
            ContentPart::Image {
                source: ImageSource {
                    source_type: "base64",
                    media_type: image.mime_type,
                    data: STANDARD.encode(image.bytes),
                },
            },
            ContentPart::Text {
                text: request.prompt,
            },
        ];
        self.call(request, content).await
    }

    async fn validate_credentials(&self) -> CredentialCheck {
        probe(
            self.client
                .get(format!("{}/v1/models", self.base_url))
                .header("x-api-key", self.api_key.expose_secret())
                .header("anthropic-version", ANTHROPIC_VERSION),
        )
        .await
    }
}
