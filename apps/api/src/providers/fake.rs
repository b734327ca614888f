//! Scripted adapters for orchestrator, admin and router tests.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::{
    AdapterFactory, AdapterTarget, CredentialCheck, Generation, ImageInput, ProviderAdapter,
    ProviderError, ProviderErrorKind, TextRequest,
};
use crate::models::provider::ProviderType;

#[derive(Debug, Clone)]
pub enum Script {
    Reply(&'static str, u32, u32),
    /// Fails with the bound API key embedded in the message.
    FailLeakingKey(ProviderErrorKind),
    Hang,
}

/// What the factory was asked to build.
#[derive(Debug, Clone, PartialEq)]
pub struct Built {
    pub provider: ProviderType,
    pub model: String,
    pub key: String,
}

pub struct FakeFactory {
    script: Script,
    built: Mutex<Vec<Built>>,
}

impl FakeFactory {
    pub fn new(script: Script) -> std::sync::Arc<Self> {
        std::sync::Arc::new(Self {
            script,
            built: Mutex::new(Vec::new()),
        })
    }

    pub fn built(&self) -> Vec<Built> {
        self.built.lock().unwrap().clone()
    }
}

struct FakeAdapter {
    target: AdapterTarget,
    script: Script,
}

#[async_trait]
impl ProviderAdapter for FakeAdapter {
    async fn generate_text(&self, _request: &TextRequest<'_>) -> Result<Generation, ProviderError> {
        match &self.script {
            Script::Reply(text, input_tokens, output_tokens) => Ok(Generation {
                text: text.to_string(),
                input_tokens: *input_tokens,
                output_tokens: *output_tokens,
                tokens_estimated: false,
            }),
            Script::FailLeakingKey(kind) => Err(ProviderError::new(
                *kind,
                format!(
                    "backend said: key {} is invalid",
                    self.target.api_key.expose_secret()
                ),
            )),
            Script::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(ProviderError::new(ProviderErrorKind::Unknown, "woke up"))
            }
        }
    }

    async fn generate_multimodal(
        &self,
        request: &TextRequest<'_>,
        _image: &ImageInput<'_>,
    ) -> Result<Generation, ProviderError> {
        self.generate_text(request).await
    }

    async fn validate_credentials(&self) -> CredentialCheck {
        match &self.script {
            Script::FailLeakingKey(kind) => CredentialCheck::failed(format!(
                "Credentials rejected ({kind}) for key {}",
                self.target.api_key.expose_secret()
            )),
            _ => CredentialCheck::ok(),
        }
    }
}

impl AdapterFactory for FakeFactory {
    fn build(&self, target: AdapterTarget) -> Box<dyn ProviderAdapter> {
        self.built.lock().unwrap().push(Built {
            provider: target.provider_type,
            model: target.model.clone(),
            key: target.api_key.expose_secret().to_string(),
        });
        Box::new(FakeAdapter {
            target,
            script: self.script.clone(),
        })
    }
}
