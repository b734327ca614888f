//! Google Gemini `generateContent` adapter.

use std::sync::Arc;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::tokens::TokenEstimator;
use super::{
    account, check_image, decode, probe, send, trim_base, CredentialCheck, Generation,
    ImageInput, ProviderAdapter, ProviderError, TextRequest,
};
use crate::models::provider::ProviderType;
use crate::orchestration::vault::CredentialSecret;

const API_KEY_HEADER: &str = "x-goog-api-key";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part<'a> {
    Text { text: &'a str },
    InlineData { inline_data: InlineData<'a> },
}

#[derive(Debug, Serialize)]
struct InlineData<'a> {
    mime_type: &'a str,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    prompt_token_count: Option<u32>,
    candidates_token_count: Option<u32>,
}

impl GenerateContentResponse {
    fn text(&self) -> Option<String> {
        let text: String = self
            .candidates
            .first()?
            .content
            .as_ref()?
            .parts
            .iter()
            .filter_map(|p| p.text.as_deref())
            .collect();
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }

    /// Both counts must be present to trust them.
    fn usage(&self) -> Option<(u32, u32)> {
        let usage = self.usage_metadata.as_ref()?;
        Some((usage.prompt_token_count?, usage.candidates_token_count?))
    }
}

pub struct GeminiAdapter {
    client: Client,
    base_url: String,
    api_key: CredentialSecret,
    model: String,
    estimator: Arc<dyn TokenEstimator>,
}

impl GeminiAdapter {
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
        parts: Vec<Part<'_>>,
    ) -> Result<Generation, ProviderError> {
        let generation_config =
            if request.temperature.is_some() || request.max_output_tokens.is_some() {
                Some(GenerationConfig {
                    temperature: request.temperature,
                    max_output_tokens: request.max_output_tokens,
                })
            } else {
                None
            };

        let body = GenerateContentRequest {
            contents: vec![Content {
                role: Some("user"),
                parts,
            }],
            system_instruction: request.system_prompt.map(|text| Content {
                role: None,
                parts: vec![Part::Text { text }],
            }),
            generation_config,
        };

        let raw = send(
            self.client
                .post(format!(
                    "{}/v1beta/models/{}:generateContent",
                    self.base_url, self.model
                ))
                .header(API_KEY_HEADER, self.api_key.expose_secret())
                .json(&body),
        )
        .await?;

        let response: GenerateContentResponse = decode(&raw)?;
        let text = response.text().ok_or_else(|| {
            ProviderError::malformed("response contained no candidate text (possibly blocked)")
        })?;
        let reported = response.usage();

        debug!("Gemini call succeeded: model={}", self.model);
        Ok(account(self.estimator.as_ref(), request, text, reported))
    }
}

#[async_trait]
impl ProviderAdapter for GeminiAdapter {
    async fn generate_text(&self, request: &TextRequest<'_>) -> Result<Generation, ProviderError> {
        self.call(
            request,
            vec![Part::Text {
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
        check_image(ProviderType::Gemini, &self.model, image)?;
        let parts = vec![
            Part::Text {
                text: request.prompt,
            },
            Part::InlineData {
                inline_data: InlineData {
                    mime_type: image.mime_type,
                    data: STANDARD.encode(image.bytes),
                },
            },
        ];
        self.call(request, parts).await
    }

    async fn validate_credentials(&self) -> CredentialCheck {
        probe(
            self.client
                .get(format!("{}/v1beta/models", self.base_url))
                .header(API_KEY_HEADER, self.api_key.expose_secret()),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::tokens::CharRatioEstimator;
    use crate::providers::ProviderErrorKind;
    use mockito::Matcher;
    use serde_json::json;

    fn adapter(base_url: &str, model: &str) -> GeminiAdapter {
        GeminiAdapter::new(
            Client::new(),
            base_url,
            CredentialSecret::new("AIzaSyTestKey0123456789"),
            model.to_string(),
            Arc::new(CharRatioEstimator::default()),
        )
    }

    #[tokio::test]
    async fn test_generate_text_parses_candidates_and_usage() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1beta/models/gemini-2.0-flash:generateContent")
            .match_header(API_KEY_HEADER, "AIzaSyTestKey0123456789")
            .match_body(Matcher::PartialJson(json!({
                "systemInstruction": { "parts": [{ "text": "Return JSON." }] },
                "generationConfig": { "temperature": 0.5 }
            })))
            .with_status(200)
            .with_body(
                r#"{"candidates":[{"content":{"parts":[{"text":"{\"skills\":"},{"text":"[]}"}]}}],
                    "usageMetadata":{"promptTokenCount":20,"candidatesTokenCount":4,"totalTokenCount":24}}"#,
            )
            .create_async()
            .await;

        let request = TextRequest {
            system_prompt: Some("Return JSON."),
            temperature: Some(0.5),
            ..TextRequest::new("Extract skills")
        };
        let generation = adapter(&server.url(), "gemini-2.0-flash")
            .generate_text(&request)
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(generation.text, r#"{"skills":[]}"#);
        assert_eq!((generation.input_tokens, generation.output_tokens), (20, 4));
        assert!(!generation.tokens_estimated);
    }

    #[tokio::test]
    async fn test_invalid_key_400_maps_to_auth() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1beta/models/gemini-2.0-flash:generateContent")
            .with_status(400)
            .with_body(
                r#"{"error":{"code":400,"message":"API key not valid. Please pass a valid API key.",
                    "status":"INVALID_ARGUMENT","details":[{"reason":"API_KEY_INVALID"}]}}"#,
            )
            .create_async()
            .await;

        let err = adapter(&server.url(), "gemini-2.0-flash")
            .generate_text(&TextRequest::new("hi"))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ProviderErrorKind::Auth);
    }

    #[tokio::test]
    async fn test_blocked_response_is_malformed() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1beta/models/gemini-2.0-flash:generateContent")
            .with_status(200)
            .with_body(r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#)
            .create_async()
            .await;

        let err = adapter(&server.url(), "gemini-2.0-flash")
            .generate_text(&TextRequest::new("hi"))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ProviderErrorKind::MalformedResponse);
    }

    #[tokio::test]
    async fn test_multimodal_sends_inline_data() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1beta/models/gemini-2.0-flash:generateContent")
            .match_body(Matcher::PartialJson(json!({
                "contents": [{
                    "role": "user",
                    "parts": [
                        { "text": "Is this relevant?" },
                        { "inline_data": { "mime_type": "image/jpeg", "data": "AQID" } }
                    ]
                }]
            })))
            .with_status(200)
            .with_body(r#"{"candidates":[{"content":{"parts":[{"text":"yes"}]}}]}"#)
            .create_async()
            .await;

        let image = ImageInput {
            bytes: &[1, 2, 3],
            mime_type: "image/jpeg",
        };
        let generation = adapter(&server.url(), "gemini-2.0-flash")
            .generate_multimodal(&TextRequest::new("Is this relevant?"), &image)
            .await
            .unwrap();
        mock.assert_async().await;
        assert_eq!(generation.text, "yes");
        assert!(generation.tokens_estimated);
    }

    #[tokio::test]
    async fn test_text_only_model_rejects_image() {
        let server = mockito::Server::new_async().await;
        let image = ImageInput {
            bytes: &[1, 2, 3],
            mime_type: "image/jpeg",
        };
        let err = adapter(&server.url(), "gemini-1.0-pro")
            .generate_multimodal(&TextRequest::new("Is this relevant?"), &image)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ProviderErrorKind::UnsupportedModality);
    }
}
