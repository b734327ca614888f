//! Append-only usage accounting that never fails its caller.
//!
//! Business failures propagate from `generate()`; telemetry failures stop here and
//! go to the `ai_usage_fault` log target only.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error};
use uuid::Uuid;

use crate::models::provider::TaskType;
use crate::models::usage::{UsageLogEntry, UsageStatus};
use crate::store::UsageStore;

/// Everything known about one attempt at the moment it finished.
#[derive(Debug, Clone)]
pub struct UsageRecord {
    pub user_id: Uuid,
    pub provider_configuration_id: Option<Uuid>,
    pub provider_type: Option<String>,
    pub model_name: Option<String>,
    pub task_type: TaskType,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub estimated_cost: f64,
    pub latency_ms: u64,
    pub status: UsageStatus,
    pub error_message: Option<String>,
}

pub struct UsageRecorder {
    store: Arc<dyn UsageStore>,
}

impl UsageRecorder {
    pub fn new(store: Arc<dyn UsageStore>) -> Self {
        Self { store }
    }

    /// Builds the immutable entry, enforcing the accounting invariants.
    pub fn entry(record: UsageRecord) -> UsageLogEntry {
        let input_tokens = i64::from(record.input_tokens);
        let output_tokens = i64::from(record.output_tokens);
        let estimated_cost = if record.estimated_cost.is_finite() {
            record.estimated_cost.max(0.0)
        } else {
            0.0
        };

        UsageLogEntry {
            id: Uuid::new_v4(),
            user_id: record.user_id,
            provider_configuration_id: record.provider_configuration_id,
            provider_type: record.provider_type,
            model_name: record.model_name,
            task_type: record.task_type,
            input_tokens,
            output_tokens,
            total_tokens: input_tokens + output_tokens,
            estimated_cost,
            status: record.status,
            error_message: record.error_message,
            latency_ms: i64::try_from(record.latency_ms).unwrap_or(i64::MAX),
            created_at: Utc::now(),
        }
    }

    /// Appends one entry. Never returns an error.
    pub async fn record(&self, record: UsageRecord) {
        let entry = Self::entry(record);
        match self.store.append(&entry).await {
            Ok(()) => debug!(
                "Recorded usage {}: task={} status={} tokens={} cost={:.6}",
                entry.id,
                entry.task_type,
                entry.status.as_str(),
                entry.total_tokens,
                entry.estimated_cost
            ),
            Err(e) => error!(
                target: "ai_usage_fault",
                usage_id = %entry.id,
                user_id = %entry.user_id,
                task_type = %entry.task_type,
                status = entry.status.as_str(),
                "Failed to persist usage entry: {e:#}"
            ),
        }
    }
}
