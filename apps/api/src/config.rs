use std::time::Duration;

use anyhow::{Context, Result};
use tracing::warn;

use crate::models::provider::ProviderType;
use crate::orchestration::resolver::StaticFallback;
use crate::orchestration::vault::{CredentialSecret, CredentialVault};
use crate::providers::{
    ProviderEndpoints, ANTHROPIC_DEFAULT_BASE_URL, GEMINI_DEFAULT_BASE_URL,
    OPENAI_DEFAULT_BASE_URL,
};

const DEFAULT_PROVIDER_TIMEOUT_SECS: u64 = 60;

/// Application configuration loaded from environment variables.
/// Fails at startup if required variables are missing or malformed.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub rust_log: String,
    /// Base64 AES-256 key. Absent means stored credentials cannot be decrypted.
    pub credential_master_key: Option<CredentialSecret>,
    pub fallback: Option<StaticFallback>,
    pub provider_timeout: Duration,
    pub endpoints: ProviderEndpoints,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            credential_master_key: optional_env("CREDENTIAL_MASTER_KEY").map(CredentialSecret::new),
            fallback: static_fallback(
                optional_env("AI_FALLBACK_PROVIDER"),
                optional_env("AI_FALLBACK_API_KEY"),
                optional_env("AI_FALLBACK_MODEL"),
            )?,
            provider_timeout: Duration::from_secs(
                optional_env("AI_PROVIDER_TIMEOUT_SECS")
                    .map(|v| v.parse::<u64>())
                    .transpose()
                    .context("AI_PROVIDER_TIMEOUT_SECS must be a whole number of seconds")?
                    .unwrap_or(DEFAULT_PROVIDER_TIMEOUT_SECS),
            ),
            endpoints: ProviderEndpoints {
                gemini: optional_env("GEMINI_BASE_URL")
                    .unwrap_or_else(|| GEMINI_DEFAULT_BASE_URL.to_string()),
                openai: optional_env("OPENAI_BASE_URL")
                    .unwrap_or_else(|| OPENAI_DEFAULT_BASE_URL.to_string()),
                anthropic: optional_env("ANTHROPIC_BASE_URL")
                    .unwrap_or_else(|| ANTHROPIC_DEFAULT_BASE_URL.to_string()),
            },
        })
    }

    /// Builds the credential vault. A malformed key is a startup error; a missing
    /// key boots a vault that refuses every encrypt/decrypt.
    pub fn credential_vault(&self) -> Result<CredentialVault> {
        match &self.credential_master_key {
            Some(key) => CredentialVault::from_base64(key.expose_secret())
                .context("CREDENTIAL_MASTER_KEY must be 32 bytes of base64"),
            None => {
                warn!(
                    "CREDENTIAL_MASTER_KEY is not set; stored provider credentials cannot be used. \
                     Generate one with `ai-orchestrator generate-master-key`"
                );
                Ok(CredentialVault::without_key())
            }
        }
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// The env-sourced fallback needs both a provider and a key; a model is optional.
fn static_fallback(
    provider: Option<String>,
    api_key: Option<String>,
    model: Option<String>,
) -> Result<Option<StaticFallback>> {
    match (provider, api_key) {
        (Some(provider), Some(api_key)) => {
            let provider_type = provider
                .parse::<ProviderType>()
                .map_err(anyhow::Error::msg)
                .context("AI_FALLBACK_PROVIDER must be one of gemini, openai, anthropic")?;
            Ok(Some(StaticFallback {
                provider_type,
                api_key: CredentialSecret::new(api_key),
                model_name: model,
            }))
        }
        (Some(_), None) => {
            warn!("AI_FALLBACK_PROVIDER is set without AI_FALLBACK_API_KEY; no static fallback");
            Ok(None)
        }
        (None, Some(_)) => {
            warn!("AI_FALLBACK_API_KEY is set without AI_FALLBACK_PROVIDER; no static fallback");
            Ok(None)
        }
        (None, None) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_needs_provider_and_key() {
        assert!(static_fallback(None, None, None).unwrap().is_none());
        assert!(static_fallback(Some("gemini".into()), None, None).unwrap().is_none());
        assert!(static_fallback(None, Some("k".into()), None).unwrap().is_none());

        let fallback = static_fallback(Some("Claude".into()), Some("sk-ant-1".into()), None)
            .unwrap()
            .unwrap();
        assert_eq!(fallback.provider_type, ProviderType::Anthropic);
        assert!(fallback.api_key.matches("sk-ant-1"));
        assert_eq!(fallback.model_name, None);
    }

    #[test]
    fn test_fallback_model_pin_is_kept() {
        let fallback = static_fallback(
            Some("openai".into()),
            Some("sk-1".into()),
            Some("gpt-4.1".into()),
        )
        .unwrap()
        .unwrap();
        assert_eq!(fallback.model_name.as_deref(), Some("gpt-4.1"));
    }

    #[test]
    fn test_unknown_fallback_provider_is_an_error() {
        assert!(static_fallback(Some("mistral".into()), Some("k".into()), None).is_err());
    }

    #[test]
    fn test_debug_never_prints_secrets() {
        let config = Config {
            database_url: "postgres://localhost/ai".to_string(),
            port: 8080,
            rust_log: "info".to_string(),
            credential_master_key: Some(CredentialSecret::new("bWFzdGVyLWtleQ==")),
            fallback: static_fallback(Some("gemini".into()), Some("AIzaSecretValue".into()), None)
                .unwrap(),
            provider_timeout: Duration::from_secs(60),
            endpoints: ProviderEndpoints::default(),
        };
        let printed = format!("{config:?}");
        assert!(!printed.contains("bWFzdGVyLWtleQ=="));
        assert!(!printed.contains("AIzaSecretValue"));
    }

    #[test]
    fn test_missing_master_key_boots_keyless_vault() {
        let config = Config {
            database_url: String::new(),
            port: 8080,
            rust_log: "info".to_string(),
            credential_master_key: None,
            fallback: None,
            provider_timeout: Duration::from_secs(60),
            endpoints: ProviderEndpoints::default(),
        };
        assert!(!config.credential_vault().unwrap().has_master_key());

        let bad = Config {
            credential_master_key: Some(CredentialSecret::new("too-short")),
            ..config
        };
        assert!(bad.credential_vault().is_err());
    }
}
