//! In-memory store used by orchestrator, admin and router tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{PlanLookup, ProviderConfigStore, UsageStore};
use crate::models::provider::{NewProviderConfiguration, ProviderConfigurationRow};
use crate::models::usage::{UsageAggregateRow, UsageLogEntry, UsageStatus};
use crate::models::user::SubscriptionPlan;

#[derive(Default)]
pub struct MemoryStore {
    configs: Mutex<Vec<ProviderConfigurationRow>>,
    usage: Mutex<Vec<UsageLogEntry>>,
    plans: Mutex<HashMap<Uuid, SubscriptionPlan>>,
    pub fail_usage_writes: AtomicBool,
    pub fail_config_reads: AtomicBool,
    pub fail_plan_lookup: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a fully specified row, bypassing `insert` so tests can pin timestamps.
    pub fn push_config(&self, row: ProviderConfigurationRow) {
        self.configs.lock().unwrap().push(row);
    }

    pub fn set_plan(&self, user_id: Uuid, plan: SubscriptionPlan) {
        self.plans.lock().unwrap().insert(user_id, plan);
    }

    pub fn usage_entries(&self) -> Vec<UsageLogEntry> {
        self.usage.lock().unwrap().clone()
    }

    pub fn config(&self, id: Uuid) -> Option<ProviderConfigurationRow> {
        self.configs
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.id == id)
            .cloned()
    }
}

#[async_trait]
impl ProviderConfigStore for MemoryStore {
    async fn list_active(&self) -> Result<Vec<ProviderConfigurationRow>> {
        if self.fail_config_reads.load(Ordering::SeqCst) {
            return Err(anyhow!("connection refused"));
        }
        Ok(self
            .configs
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.is_active)
            .cloned()
            .collect())
    }

    async fn list_all(&self) -> Result<Vec<ProviderConfigurationRow>> {
        let mut rows = self.configs.lock().unwrap().clone();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn get(&self, id: Uuid) -> Result<Option<ProviderConfigurationRow>> {
        Ok(self.config(id))
    }

    async fn insert(&self, new: NewProviderConfiguration) -> Result<ProviderConfigurationRow> {
        let now = Utc::now();
        let row = ProviderConfigurationRow {
            id: Uuid::new_v4(),
            provider_type: new.provider_type.as_str().to_string(),
            encrypted_credential: new.encrypted_credential,
            model_name: new.model_name,
            display_name: new.display_name,
            is_active: new.is_active,
            is_default: new.is_default,
            task_defaults: new
                .task_defaults
                .iter()
                .map(|t| t.as_str().to_string())
                .collect(),
            daily_token_limit: new.daily_token_limit,
            monthly_token_limit: new.monthly_token_limit,
            last_tested_at: None,
            last_test_success: None,
            created_by: new.created_by,
            created_at: now,
            updated_at: now,
        };
        self.configs.lock().unwrap().push(row.clone());
        Ok(row)
    }

    async fn update(&self, row: &ProviderConfigurationRow) -> Result<ProviderConfigurationRow> {
        let mut configs = self.configs.lock().unwrap();
        let existing = configs
            .iter_mut()
            .find(|c| c.id == row.id)
            .ok_or_else(|| anyhow!("no row {}", row.id))?;
        *existing = ProviderConfigurationRow {
            updated_at: Utc::now(),
            ..row.clone()
        };
        Ok(existing.clone())
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let mut configs = self.configs.lock().unwrap();
        let before = configs.len();
        configs.retain(|c| c.id != id);
        Ok(configs.len() != before)
    }

    async fn record_test(&self, id: Uuid, tested_at: DateTime<Utc>, success: bool) -> Result<()> {
        if let Some(row) = self
            .configs
            .lock()
            .unwrap()
            .iter_mut()
            .find(|c| c.id == id)
        {
            row.last_tested_at = Some(tested_at);
            row.last_test_success = Some(success);
        }
        Ok(())
    }
}

#[async_trait]
impl UsageStore for MemoryStore {
    async fn append(&self, entry: &UsageLogEntry) -> Result<()> {
        if self.fail_usage_writes.load(Ordering::SeqCst) {
            return Err(anyhow!("disk full"));
        }
        self.usage.lock().unwrap().push(entry.clone());
        Ok(())
    }

    async fn aggregate_since(&self, since: DateTime<Utc>) -> Result<Vec<UsageAggregateRow>> {
        let configs = self.configs.lock().unwrap().clone();
        let mut groups: Vec<UsageAggregateRow> = Vec::new();

        for entry in self.usage.lock().unwrap().iter() {
            if entry.created_at < since {
                continue;
            }
            let position = groups.iter().position(|g| {
                g.provider_configuration_id == entry.provider_configuration_id
                    && g.provider_type == entry.provider_type
                    && g.model_name == entry.model_name
            });
            let group = match position {
                Some(i) => &mut groups[i],
                None => {
                    groups.push(UsageAggregateRow {
                        provider_configuration_id: entry.provider_configuration_id,
                        display_name: entry.provider_configuration_id.and_then(|id| {
                            configs
                                .iter()
                                .find(|c| c.id == id)
                                .map(|c| c.display_name.clone())
                        }),
                        provider_type: entry.provider_type.clone(),
                        model_name: entry.model_name.clone(),
                        call_count: 0,
                        success_count: 0,
                        input_tokens: 0,
                        output_tokens: 0,
                        total_cost: 0.0,
                        avg_latency_ms: 0.0,
                    });
                    groups.last_mut().unwrap()
                }
            };
            // running mean
            let n = group.call_count as f64;
            group.avg_latency_ms = (group.avg_latency_ms * n + entry.latency_ms as f64) / (n + 1.0);
            group.call_count += 1;
            if entry.status == UsageStatus::Success {
                group.success_count += 1;
            }
            group.input_tokens += entry.input_tokens;
            group.output_tokens += entry.output_tokens;
            group.total_cost += entry.estimated_cost;
        }

        groups.sort_by(|a, b| b.call_count.cmp(&a.call_count));
        Ok(groups)
    }
}

#[async_trait]
impl PlanLookup for MemoryStore {
    async fn plan_for(&self, user_id: Uuid) -> Result<SubscriptionPlan> {
        if self.fail_plan_lookup.load(Ordering::SeqCst) {
            return Err(anyhow!("plan service unavailable"));
        }
        Ok(self
            .plans
            .lock()
            .unwrap()
            .get(&user_id)
            .copied()
            .unwrap_or_default())
    }
}
