use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::provider::{
    NewProviderConfiguration, ProviderConfigurationRow, ProviderType, TaskType,
};
use crate::models::user::SubscriptionPlan;
use crate::orchestration::router::ModelTier;
use crate::orchestration::sanitize::sanitize_error_message;
use crate::providers::{model_supports_images, AdapterTarget, CredentialCheck};
use crate::state::AppState;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

/// Client-facing projection of a configuration. The credential never leaves the server.
#[derive(Debug, Serialize)]
pub struct ProviderConfigurationView {
    pub id: Uuid,
    pub provider_type: String,
    pub model_name: String,
    pub display_name: String,
    pub is_active: bool,
    pub is_default: bool,
    pub task_defaults: Vec<String>,
    pub daily_token_limit: Option<i64>,
    pub monthly_token_limit: Option<i64>,
    pub has_credential: bool,
    pub last_tested_at: Option<DateTime<Utc>>,
    pub last_test_success: Option<bool>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ProviderConfigurationRow> for ProviderConfigurationView {
    fn from(row: ProviderConfigurationRow) -> Self {
        Self {
            has_credential: !row.encrypted_credential.is_empty(),
            id: row.id,
            provider_type: row.provider_type,
            model_name: row.model_name,
            display_name: row.display_name,
            is_active: row.is_active,
            is_default: row.is_default,
            task_defaults: row.task_defaults,
            daily_token_limit: row.daily_token_limit,
            monthly_token_limit: row.monthly_token_limit,
            last_tested_at: row.last_tested_at,
            last_test_success: row.last_test_success,
            created_by: row.created_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateProviderRequest {
    pub provider_type: String,
    pub api_key: String,
    pub model_name: String,
    pub display_name: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default)]
    pub task_defaults: Vec<String>,
    #[serde(default)]
    pub daily_token_limit: Option<i64>,
    #[serde(default)]
    pub monthly_token_limit: Option<i64>,
    #[serde(default)]
    pub created_by: Option<Uuid>,
}

/// Partial update. Token limits distinguish "absent" from explicit `null` (clear).
#[derive(Debug, Default, Deserialize)]
pub struct UpdateProviderRequest {
    pub provider_type: Option<String>,
    pub api_key: Option<String>,
    pub model_name: Option<String>,
    pub display_name: Option<String>,
    pub is_active: Option<bool>,
    pub is_default: Option<bool>,
    pub task_defaults: Option<Vec<String>>,
    #[serde(default, deserialize_with = "present")]
    pub daily_token_limit: Option<Option<i64>>,
    #[serde(default, deserialize_with = "present")]
    pub monthly_token_limit: Option<Option<i64>>,
}

#[derive(Debug, Serialize)]
pub struct TestProviderResponse {
    pub success: bool,
    pub message: String,
    pub tested_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct CatalogEntry {
    pub provider_type: ProviderType,
    pub fast_model: &'static str,
    pub quality_model: &'static str,
    pub supports_images: bool,
}

#[derive(Debug, Serialize)]
pub struct CatalogResponse {
    pub providers: Vec<CatalogEntry>,
    pub task_types: Vec<TaskType>,
    pub plans: Vec<SubscriptionPlan>,
    pub static_fallback_configured: bool,
    pub credential_vault_configured: bool,
}

fn default_true() -> bool {
    true
}

fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

// ────────────────────────────────────────────────────────────────────────────
// Validation
// ────────────────────────────────────────────────────────────────────────────

fn parse_provider_type(value: &str) -> Result<ProviderType, AppError> {
    value.parse::<ProviderType>().map_err(AppError::Validation)
}

/// Parses and de-duplicates task names, keeping first-seen order.
fn parse_task_defaults(values: &[String]) -> Result<Vec<TaskType>, AppError> {
    let mut tasks = Vec::with_capacity(values.len());
    for value in values {
        let task = value.parse::<TaskType>().map_err(AppError::Validation)?;
        if !tasks.contains(&task) {
            tasks.push(task);
        }
    }
    Ok(tasks)
}

fn require_text(field: &str, value: &str) -> Result<String, AppError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::Validation(format!("{field} cannot be empty")));
    }
    Ok(value.to_string())
}

fn check_limit(field: &str, value: Option<i64>) -> Result<Option<i64>, AppError> {
    match value {
        Some(v) if v < 0 => Err(AppError::Validation(format!(
            "{field} cannot be negative"
        ))),
        other => Ok(other),
    }
}

async fn load(state: &AppState, id: Uuid) -> Result<ProviderConfigurationRow, AppError> {
    state
        .configs
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Provider configuration {id} not found")))
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// GET /api/v1/admin/ai/providers
pub async fn handle_list_providers(
    State(state): State<AppState>,
) -> Result<Json<Vec<ProviderConfigurationView>>, AppError> {
    let rows = state.configs.list_all().await?;
    Ok(Json(rows.into_iter().map(Into::into).collect()))
}

/// GET /api/v1/admin/ai/providers/:id
pub async fn handle_get_provider(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ProviderConfigurationView>, AppError> {
    Ok(Json(load(&state, id).await?.into()))
}

/// POST /api/v1/admin/ai/providers
///
/// Encrypts the API key before anything is persisted.
pub async fn handle_create_provider(
    State(state): State<AppState>,
    Json(req): Json<CreateProviderRequest>,
) -> Result<(StatusCode, Json<ProviderConfigurationView>), AppError> {
    let provider_type = parse_provider_type(&req.provider_type)?;
    let api_key = require_text("api_key", &req.api_key)?;
    let model_name = require_text("model_name", &req.model_name)?;
    let display_name = require_text("display_name", &req.display_name)?;
    let task_defaults = parse_task_defaults(&req.task_defaults)?;
    let daily_token_limit = check_limit("daily_token_limit", req.daily_token_limit)?;
    let monthly_token_limit = check_limit("monthly_token_limit", req.monthly_token_limit)?;

    let new = NewProviderConfiguration {
        provider_type,
        encrypted_credential: state.vault.encrypt(&api_key)?,
        model_name,
        display_name,
        is_active: req.is_active,
        is_default: req.is_default,
        task_defaults,
        daily_token_limit,
        monthly_token_limit,
        created_by: req.created_by,
    };

    let row = state.configs.insert(new).await?;
    info!(
        "Admin created provider configuration {} ({}/{})",
        row.id, row.provider_type, row.model_name
    );
    Ok((StatusCode::CREATED, Json(row.into())))
}

/// PATCH /api/v1/admin/ai/providers/:id
///
/// A changed API key is re-encrypted and clears the last test result.
pub async fn handle_update_provider(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateProviderRequest>,
) -> Result<Json<ProviderConfigurationView>, AppError> {
    let mut row = load(&state, id).await?;

    if let Some(provider_type) = &req.provider_type {
        row.provider_type = parse_provider_type(provider_type)?.as_str().to_string();
    }
    if let Some(model_name) = &req.model_name {
        row.model_name = require_text("model_name", model_name)?;
    }
    if let Some(display_name) = &req.display_name {
        row.display_name = require_text("display_name", display_name)?;
    }
    if let Some(is_active) = req.is_active {
        row.is_active = is_active;
    }
    if let Some(is_default) = req.is_default {
        row.is_default = is_default;
    }
    if let Some(task_defaults) = &req.task_defaults {
        row.task_defaults = parse_task_defaults(task_defaults)?
            .iter()
            .map(|t| t.as_str().to_string())
            .collect();
    }
    if let Some(limit) = req.daily_token_limit {
        row.daily_token_limit = check_limit("daily_token_limit", limit)?;
    }
    if let Some(limit) = req.monthly_token_limit {
        row.monthly_token_limit = check_limit("monthly_token_limit", limit)?;
    }

    if let Some(api_key) = &req.api_key {
        let api_key = require_text("api_key", api_key)?;
        // Unreadable ciphertext (rotated master key) counts as changed.
        let unchanged = state
            .vault
            .decrypt(&row.encrypted_credential)
            .map(|current| current.matches(&api_key))
            .unwrap_or(false);
        if !unchanged {
            row.encrypted_credential = state.vault.encrypt(&api_key)?;
            row.last_tested_at = None;
            row.last_test_success = None;
            info!("Admin rotated credential for provider configuration {id}");
        }
    }

    let row = state.configs.update(&row).await?;
    Ok(Json(row.into()))
}

/// DELETE /api/v1/admin/ai/providers/:id
pub async fn handle_delete_provider(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    if !state.configs.delete(id).await? {
        return Err(AppError::NotFound(format!(
            "Provider configuration {id} not found"
        )));
    }
    info!("Admin deleted provider configuration {id}");
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/admin/ai/providers/:id/test
///
/// Probes the backend with the stored credential and persists the outcome.
/// Every failure, including an undecryptable credential, is reported as `success=false`.
pub async fn handle_test_provider(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<TestProviderResponse>, AppError> {
    let row = load(&state, id).await?;

    let check = match (
        row.provider_type.parse::<ProviderType>(),
        state.vault.decrypt(&row.encrypted_credential),
    ) {
        (Err(e), _) => CredentialCheck::failed(e),
        (_, Err(e)) => CredentialCheck::failed(format!("Stored credential cannot be used: {e}")),
        (Ok(provider_type), Ok(api_key)) => {
            let model = match row.model_name.trim() {
                "" => ModelTier::Fast.model_for(provider_type).to_string(),
                pinned => pinned.to_string(),
            };
            let secret = api_key.clone();
            let adapter = state.adapters.build(AdapterTarget {
                provider_type,
                model,
                api_key,
            });
            let check = adapter.validate_credentials().await;
            CredentialCheck {
                message: sanitize_error_message(&check.message, secret.expose_secret()),
                ..check
            }
        }
    };

    let tested_at = Utc::now();
    state.configs.record_test(id, tested_at, check.success).await?;
    if check.success {
        info!("Credential test passed for provider configuration {id}");
    } else {
        warn!(
            "Credential test failed for provider configuration {id}: {}",
            check.message
        );
    }

    Ok(Json(TestProviderResponse {
        success: check.success,
        message: check.message,
        tested_at,
    }))
}

/// GET /api/v1/admin/ai/catalog
pub async fn handle_catalog(State(state): State<AppState>) -> Json<CatalogResponse> {
    let providers = ProviderType::ALL
        .into_iter()
        .map(|provider_type| {
            let fast_model = ModelTier::Fast.model_for(provider_type);
            CatalogEntry {
                provider_type,
                fast_model,
                quality_model: ModelTier::Quality.model_for(provider_type),
                supports_images: model_supports_images(provider_type, fast_model),
            }
        })
        .collect();

    Json(CatalogResponse {
        providers,
        task_types: TaskType::ALL.to_vec(),
        plans: SubscriptionPlan::ALL.to_vec(),
        static_fallback_configured: state.orchestrator.has_static_fallback(),
        credential_vault_configured: state.vault.has_master_key(),
    })
}
