use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::orchestration::orchestrator::OrchestratorError;
use crate::orchestration::vault::VaultError;
use crate::providers::ProviderErrorKind;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Credential vault error: {0}")]
    Vault(#[from] VaultError),

    #[error("Generation error: {0}")]
    Generation(#[from] OrchestratorError),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::Vault(VaultError::MissingMasterKey) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "VAULT_UNAVAILABLE",
                "Credential storage is not configured on this server".to_string(),
            ),
            AppError::Vault(e) => {
                tracing::error!("Vault error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "VAULT_ERROR",
                    "A credential storage error occurred".to_string(),
                )
            }
            AppError::Generation(e) => {
                let (status, code) = generation_status(e);
                (status, code, e.user_message())
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}

fn generation_status(e: &OrchestratorError) -> (StatusCode, &'static str) {
    match e {
        OrchestratorError::Configuration(_) => (StatusCode::SERVICE_UNAVAILABLE, "AI_UNAVAILABLE"),
        OrchestratorError::Credential(_) => {
            (StatusCode::SERVICE_UNAVAILABLE, "AI_CREDENTIAL_ERROR")
        }
        OrchestratorError::QuotaExceeded(_) => (StatusCode::TOO_MANY_REQUESTS, "QUOTA_EXCEEDED"),
        OrchestratorError::PlanLookup(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        OrchestratorError::Provider(p) => match p.kind {
            ProviderErrorKind::Auth => (StatusCode::BAD_GATEWAY, "AI_PROVIDER_AUTH"),
            ProviderErrorKind::RateLimit => (StatusCode::TOO_MANY_REQUESTS, "AI_RATE_LIMITED"),
            ProviderErrorKind::Timeout => (StatusCode::GATEWAY_TIMEOUT, "AI_TIMEOUT"),
            ProviderErrorKind::UnsupportedModality => {
                (StatusCode::UNPROCESSABLE_ENTITY, "AI_UNSUPPORTED_MODALITY")
            }
            ProviderErrorKind::MalformedResponse | ProviderErrorKind::Unknown => {
                (StatusCode::BAD_GATEWAY, "AI_PROVIDER_ERROR")
            }
        },
    }
}
