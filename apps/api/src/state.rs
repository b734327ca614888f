use std::sync::Arc;

use crate::orchestration::orchestrator::Orchestrator;
use crate::orchestration::vault::CredentialVault;
use crate::providers::AdapterFactory;
use crate::store::{ProviderConfigStore, UsageStore};

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    /// Admin CRUD goes straight to the store; the orchestrator only reads it.
    pub configs: Arc<dyn ProviderConfigStore>,
    pub usage: Arc<dyn UsageStore>,
    pub vault: Arc<CredentialVault>,
    /// Used by the admin "test credentials" action.
    pub adapters: Arc<dyn AdapterFactory>,
}
