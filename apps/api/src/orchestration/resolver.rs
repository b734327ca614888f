//! Config resolution — which provider, model and credential serve a task.
//!
//! Precedence:
//! 1. active rows whose `task_defaults` contain the task,
//! 2. any active row with `is_default = true`,
//! 3. the static fallback from process configuration,
//! 4. otherwise `NoProviderConfigured`.
//!
//! Within steps 1 and 2 the tie-break is `is_default` desc, `created_at` asc, `id` asc.

use std::cmp::Ordering;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::provider::{ProviderConfigurationRow, ProviderType, TaskType};
use crate::orchestration::vault::{CredentialSecret, CredentialVault, VaultError};
use crate::store::ProviderConfigStore;

/// Single provider binding sourced from the environment.
#[derive(Debug, Clone)]
pub struct StaticFallback {
    pub provider_type: ProviderType,
    pub api_key: CredentialSecret,
    /// When set, pins the model and bypasses `ModelRouter`.
    pub model_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionSource {
    TaskRouted,
    GenericDefault,
    StaticFallback,
}

/// The concrete (provider, model, credential) chosen for one call.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub provider_type: ProviderType,
    pub api_key: CredentialSecret,
    /// `None` means no model is pinned and the router decides.
    pub model_name: Option<String>,
    /// `None` on the static-fallback path.
    pub provider_configuration_id: Option<Uuid>,
    pub source: ResolutionSource,
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("no AI provider is configured")]
    NoProviderConfigured,

    #[error("credential for provider configuration {configuration_id} is unusable: {source}")]
    Credential {
        configuration_id: Uuid,
        #[source]
        source: VaultError,
    },
}

pub struct ConfigResolver {
    store: Arc<dyn ProviderConfigStore>,
    vault: Arc<CredentialVault>,
    fallback: Option<StaticFallback>,
}

impl ConfigResolver {
    pub fn new(
        store: Arc<dyn ProviderConfigStore>,
        vault: Arc<CredentialVault>,
        fallback: Option<StaticFallback>,
    ) -> Self {
        Self {
            store,
            vault,
            fallback,
        }
    }

    pub fn has_fallback(&self) -> bool {
        self.fallback.is_some()
    }

    pub async fn resolve(&self, task: TaskType) -> Result<ResolvedConfig, ResolveError> {
        // A failing store degrades to the static fallback rather than taking the service down.
        let rows = match self.store.list_active().await {
            Ok(rows) => rows,
            Err(e) => {
                warn!("Provider configuration lookup failed, trying static fallback: {e:#}");
                Vec::new()
            }
        };

        if let Some((row, provider_type, source)) = select_configuration(&rows, task) {
            let api_key = self
                .vault
                .decrypt(&row.encrypted_credential)
                .map_err(|source| ResolveError::Credential {
                    configuration_id: row.id,
                    source,
                })?;
            debug!(
                "Resolved {task} to configuration {} ({provider_type}/{}) via {source:?}",
                row.id, row.model_name
            );
            return Ok(ResolvedConfig {
                provider_type,
                api_key,
                model_name: Some(row.model_name.trim().to_string()).filter(|m| !m.is_empty()),
                provider_configuration_id: Some(row.id),
                source,
            });
        }

        match &self.fallback {
            Some(fallback) => {
                debug!(
                    "Resolved {task} to static fallback ({})",
                    fallback.provider_type
                );
                Ok(ResolvedConfig {
                    provider_type: fallback.provider_type,
                    api_key: fallback.api_key.clone(),
                    model_name: fallback.model_name.clone(),
                    provider_configuration_id: None,
                    source: ResolutionSource::StaticFallback,
                })
            }
            None => Err(ResolveError::NoProviderConfigured),
        }
    }
}

fn precedence(a: &ProviderConfigurationRow, b: &ProviderConfigurationRow) -> Ordering {
    b.is_default
        .cmp(&a.is_default)
        .then(a.created_at.cmp(&b.created_at))
        .then(a.id.cmp(&b.id))
}

/// Pure selection over a snapshot of rows. Inactive rows and rows with an
/// unknown provider type are never chosen.
pub fn select_configuration(
    rows: &[ProviderConfigurationRow],
    task: TaskType,
) -> Option<(&ProviderConfigurationRow, ProviderType, ResolutionSource)> {
    let mut candidates: Vec<(&ProviderConfigurationRow, ProviderType)> = rows
        .iter()
        .filter(|row| row.is_active)
        .filter_map(|row| match row.provider_type.parse::<ProviderType>() {
            Ok(provider) => Some((row, provider)),
            Err(e) => {
                warn!("Skipping provider configuration {}: {e}", row.id);
                None
            }
        })
        .collect();
    candidates.sort_by(|(a, _), (b, _)| precedence(a, b));

    if let Some((row, provider)) = candidates.iter().find(|(row, _)| row.serves(task)) {
        return Some((*row, *provider, ResolutionSource::TaskRouted));
    }
    candidates
        .iter()
        .find(|(row, _)| row.is_default)
        .map(|(row, provider)| (*row, *provider, ResolutionSource::GenericDefault))
}
