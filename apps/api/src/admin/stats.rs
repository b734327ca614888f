//! Usage statistics over a trailing day window, grouped by configuration, provider and model.

use axum::{
    extract::{Query, State},
    Json,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::usage::UsageAggregateRow;
use crate::state::AppState;

pub const DEFAULT_WINDOW_DAYS: i64 = 30;
pub const MAX_WINDOW_DAYS: i64 = 365;

#[derive(Debug, Deserialize)]
pub struct UsageQuery {
    pub days: Option<i64>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct UsageStatRow {
    pub provider_configuration_id: Option<Uuid>,
    pub display_name: Option<String>,
    pub provider_type: Option<String>,
    pub model_name: Option<String>,
    pub call_count: i64,
    pub success_count: i64,
    pub success_rate: f64,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub total_tokens: i64,
    pub total_cost: f64,
    pub avg_latency_ms: f64,
}

#[derive(Debug, Default, Serialize, PartialEq)]
pub struct UsageTotals {
    pub call_count: i64,
    pub success_count: i64,
    pub success_rate: f64,
    pub total_tokens: i64,
    pub total_cost: f64,
}

#[derive(Debug, Serialize)]
pub struct UsageStatsResponse {
    pub days: i64,
    pub since: DateTime<Utc>,
    pub rows: Vec<UsageStatRow>,
    pub totals: UsageTotals,
}

pub fn clamp_days(days: Option<i64>) -> i64 {
    days.unwrap_or(DEFAULT_WINDOW_DAYS).clamp(1, MAX_WINDOW_DAYS)
}

fn success_rate(successes: i64, calls: i64) -> f64 {
    if calls == 0 {
        0.0
    } else {
        successes as f64 / calls as f64
    }
}

pub fn summarize(rows: Vec<UsageAggregateRow>) -> (Vec<UsageStatRow>, UsageTotals) {
    let mut totals = UsageTotals::default();
    let rows: Vec<UsageStatRow> = rows
        .into_iter()
        .map(|r| {
            let total_tokens = r.input_tokens + r.output_tokens;
            totals.call_count += r.call_count;
            totals.success_count += r.success_count;
            totals.total_tokens += total_tokens;
            totals.total_cost += r.total_cost;
            UsageStatRow {
                success_rate: success_rate(r.success_count, r.call_count),
                provider_configuration_id: r.provider_configuration_id,
                display_name: r.display_name,
                provider_type: r.provider_type,
                model_name: r.model_name,
                call_count: r.call_count,
                success_count: r.success_count,
                input_tokens: r.input_tokens,
                output_tokens: r.output_tokens,
                total_tokens,
                total_cost: r.total_cost,
                avg_latency_ms: r.avg_latency_ms,
            }
        })
        .collect();
    totals.success_rate = success_rate(totals.success_count, totals.call_count);
    (rows, totals)
}

/// GET /api/v1/admin/ai/usage?days=N
pub async fn handle_usage_stats(
    State(state): State<AppState>,
    Query(query): Query<UsageQuery>,
) -> Result<Json<UsageStatsResponse>, AppError> {
    let days = clamp_days(query.days);
    let since = Utc::now() - Duration::days(days);
    let (rows, totals) = summarize(state.usage.aggregate_since(since).await?);

    Ok(Json(UsageStatsResponse {
        days,
        since,
        rows,
        totals,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::provider::TaskType;
    use crate::models::usage::{UsageLogEntry, UsageStatus};
    use crate::providers::fake::{FakeFactory, Script};
    use crate::routes::tests::{empty_request, read_json, test_app};
    use crate::store::memory::MemoryStore;
    use crate::store::UsageStore;
    use axum::http::StatusCode;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn entry(
        model: &str,
        status: UsageStatus,
        tokens: (i64, i64),
        cost: f64,
        latency_ms: i64,
        age_days: i64,
    ) -> UsageLogEntry {
        UsageLogEntry {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            provider_configuration_id: None,
            provider_type: Some("gemini".to_string()),
            model_name: Some(model.to_string()),
            task_type: TaskType::Extraction,
            input_tokens: tokens.0,
            output_tokens: tokens.1,
            total_tokens: tokens.0 + tokens.1,
            estimated_cost: cost,
            status,
            error_message: None,
            latency_ms,
            created_at: Utc::now() - Duration::days(age_days),
        }
    }

    #[test]
    fn test_days_are_clamped() {
        assert_eq!(clamp_days(None), 30);
        assert_eq!(clamp_days(Some(0)), 1);
        assert_eq!(clamp_days(Some(-5)), 1);
        assert_eq!(clamp_days(Some(7)), 7);
        assert_eq!(clamp_days(Some(10_000)), 365);
    }

    #[test]
    fn test_empty_window_has_zero_rates() {
        let (rows, totals) = summarize(Vec::new());
        assert!(rows.is_empty());
        assert_eq!(totals, UsageTotals::default());
        assert_eq!(totals.success_rate, 0.0);
    }

    #[tokio::test]
    async fn test_usage_endpoint_groups_by_model_within_window() {
        let store = Arc::new(MemoryStore::new());
        for e in [
            entry("gemini-2.0-flash", UsageStatus::Success, (100, 50), 0.25, 100, 1),
            entry("gemini-2.0-flash", UsageStatus::Error, (0, 0), 0.0, 300, 2),
            entry("gemini-2.5-pro", UsageStatus::Success, (10, 10), 0.5, 50, 3),
            entry("gemini-2.5-pro", UsageStatus::Success, (999, 999), 9.0, 50, 40),
        ] {
            store.append(&e).await.unwrap();
        }

        let response = test_app(&store, FakeFactory::new(Script::Reply("", 0, 0)), false)
            .oneshot(empty_request("GET", "/api/v1/admin/ai/usage?days=7"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let value = read_json(response).await;

        assert_eq!(value["days"], 7);
        let rows = value["rows"].as_array().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["model_name"], "gemini-2.0-flash");
        assert_eq!(rows[0]["call_count"], 2);
        assert_eq!(rows[0]["success_rate"], 0.5);
        assert_eq!(rows[0]["total_tokens"], 150);
        assert_eq!(rows[0]["avg_latency_ms"], 200.0);
        assert_eq!(rows[1]["total_cost"], 0.5);

        assert_eq!(value["totals"]["call_count"], 3);
        assert_eq!(value["totals"]["total_tokens"], 170);
        assert_eq!(value["totals"]["total_cost"], 0.75);
    }
}
