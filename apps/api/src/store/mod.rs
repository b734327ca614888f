//! Persistence seams consumed by the orchestrator and the admin surface.
//!
//! `AppState` carries these as `Arc<dyn …>`. Production uses `postgres::PgStore`;
//! tests use `memory::MemoryStore`.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::provider::{NewProviderConfiguration, ProviderConfigurationRow};
use crate::models::usage::{UsageAggregateRow, UsageLogEntry};
use crate::models::user::SubscriptionPlan;

#[cfg(test)]
pub mod memory;
pub mod postgres;

#[async_trait]
pub trait ProviderConfigStore: Send + Sync {
    /// Active rows only. Ordering is not relied upon; `ConfigResolver` sorts.
    async fn list_active(&self) -> Result<Vec<ProviderConfigurationRow>>;

    /// All rows, newest first.
    async fn list_all(&self) -> Result<Vec<ProviderConfigurationRow>>;

    async fn get(&self, id: Uuid) -> Result<Option<ProviderConfigurationRow>>;

    async fn insert(&self, new: NewProviderConfiguration) -> Result<ProviderConfigurationRow>;

    /// Writes every mutable column of `row` and bumps `updated_at`.
    async fn update(&self, row: &ProviderConfigurationRow) -> Result<ProviderConfigurationRow>;

    /// Returns false when no row had this id.
    async fn delete(&self, id: Uuid) -> Result<bool>;

    async fn record_test(&self, id: Uuid, tested_at: DateTime<Utc>, success: bool) -> Result<()>;
}

#[async_trait]
pub trait UsageStore: Send + Sync {
    /// Append-only. There is no update or delete.
    async fn append(&self, entry: &UsageLogEntry) -> Result<()>;

    async fn aggregate_since(&self, since: DateTime<Utc>) -> Result<Vec<UsageAggregateRow>>;
}

/// Read-only view of a caller's subscription tier.
#[async_trait]
pub trait PlanLookup: Send + Sync {
    async fn plan_for(&self, user_id: Uuid) -> Result<SubscriptionPlan>;
}
