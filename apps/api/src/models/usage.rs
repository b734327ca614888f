use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::models::provider::TaskType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageStatus {
    Success,
    Error,
}

impl UsageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UsageStatus::Success => "success",
            UsageStatus::Error => "error",
        }
    }
}

/// One generation attempt, ready to be appended to `ai_usage_logs`.
///
/// Built only through `UsageRecorder`, which guarantees
/// `total_tokens == input_tokens + output_tokens` and `estimated_cost >= 0`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageLogEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub provider_configuration_id: Option<Uuid>,
    pub provider_type: Option<String>,
    pub model_name: Option<String>,
    pub task_type: TaskType,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub total_tokens: i64,
    pub estimated_cost: f64,
    pub status: UsageStatus,
    pub error_message: Option<String>,
    pub latency_ms: i64,
    pub created_at: DateTime<Utc>,
}

/// Raw per-(provider, model, configuration) sums over a time window.
#[derive(Debug, Clone, FromRow)]
pub struct UsageAggregateRow {
    pub provider_configuration_id: Option<Uuid>,
    pub display_name: Option<String>,
    pub provider_type: Option<String>,
    pub model_name: Option<String>,
    pub call_count: i64,
    pub success_count: i64,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub total_cost: f64,
    pub avg_latency_ms: f64,
}
