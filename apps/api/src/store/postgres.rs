use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use super::{PlanLookup, ProviderConfigStore, UsageStore};
use crate::models::provider::{NewProviderConfiguration, ProviderConfigurationRow};
use crate::models::usage::{UsageAggregateRow, UsageLogEntry};
use crate::models::user::SubscriptionPlan;

/// Postgres-backed implementation of every store seam.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProviderConfigStore for PgStore {
    async fn list_active(&self) -> Result<Vec<ProviderConfigurationRow>> {
        Ok(sqlx::query_as::<_, ProviderConfigurationRow>(
            r#"
            SELECT * FROM ai_provider_configurations
            WHERE is_active = TRUE
            ORDER BY is_default DESC, created_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?)
    }

    async fn list_all(&self) -> Result<Vec<ProviderConfigurationRow>> {
        Ok(sqlx::query_as::<_, ProviderConfigurationRow>(
            "SELECT * FROM ai_provider_configurations ORDER BY created_at DESC",
        )
        .fetch_all(&self.pool)
        .await?)
    }

    async fn get(&self, id: Uuid) -> Result<Option<ProviderConfigurationRow>> {
        Ok(sqlx::query_as::<_, ProviderConfigurationRow>(
            "SELECT * FROM ai_provider_configurations WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn insert(&self, new: NewProviderConfiguration) -> Result<ProviderConfigurationRow> {
        let task_defaults: Vec<String> = new
            .task_defaults
            .iter()
            .map(|t| t.as_str().to_string())
            .collect();

        let row = sqlx::query_as::<_, ProviderConfigurationRow>(
            r#"
            INSERT INTO ai_provider_configurations
                (id, provider_type, encrypted_credential, model_name, display_name,
                 is_active, is_default, task_defaults, daily_token_limit,
                 monthly_token_limit, created_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(new.provider_type.as_str())
        .bind(&new.encrypted_credential)
        .bind(&new.model_name)
        .bind(&new.display_name)
        .bind(new.is_active)
        .bind(new.is_default)
        .bind(&task_defaults)
        .bind(new.daily_token_limit)
        .bind(new.monthly_token_limit)
        .bind(new.created_by)
        .fetch_one(&self.pool)
        .await?;

        info!(
            "Created provider configuration {} ({} / {})",
            row.id, row.provider_type, row.model_name
        );
        Ok(row)
    }

    async fn update(&self, row: &ProviderConfigurationRow) -> Result<ProviderConfigurationRow> {
        let updated = sqlx::query_as::<_, ProviderConfigurationRow>(
            r#"
            UPDATE ai_provider_configurations SET
                provider_type = $2,
                encrypted_credential = $3,
                model_name = $4,
                display_name = $5,
                is_active = $6,
                is_default = $7,
                task_defaults = $8,
                daily_token_limit = $9,
                monthly_token_limit = $10,
                last_tested_at = $11,
                last_test_success = $12,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(row.id)
        .bind(&row.provider_type)
        .bind(&row.encrypted_credential)
        .bind(&row.model_name)
        .bind(&row.display_name)
        .bind(row.is_active)
        .bind(row.is_default)
        .bind(&row.task_defaults)
        .bind(row.daily_token_limit)
        .bind(row.monthly_token_limit)
        .bind(row.last_tested_at)
        .bind(row.last_test_success)
        .fetch_one(&self.pool)
        .await?;
        Ok(updated)
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM ai_provider_configurations WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn record_test(&self, id: Uuid, tested_at: DateTime<Utc>, success: bool) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE ai_provider_configurations
            SET last_tested_at = $2, last_test_success = $3, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(tested_at)
        .bind(success)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl UsageStore for PgStore {
    async fn append(&self, entry: &UsageLogEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO ai_usage_logs
                (id, user_id, provider_configuration_id, provider_type, model_name,
                 task_type, input_tokens, output_tokens, total_tokens, estimated_cost,
                 status, error_message, latency_ms, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(entry.id)
        .bind(entry.user_id)
        .bind(entry.provider_configuration_id)
        .bind(&entry.provider_type)
        .bind(&entry.model_name)
        .bind(entry.task_type.as_str())
        .bind(entry.input_tokens)
        .bind(entry.output_tokens)
        .bind(entry.total_tokens)
        .bind(entry.estimated_cost)
        .bind(entry.status.as_str())
        .bind(&entry.error_message)
        .bind(entry.latency_ms)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn aggregate_since(&self, since: DateTime<Utc>) -> Result<Vec<UsageAggregateRow>> {
        Ok(sqlx::query_as::<_, UsageAggregateRow>(
            r#"
            SELECT
                l.provider_configuration_id,
                c.display_name,
                l.provider_type,
                l.model_name,
                COUNT(*) AS call_count,
                COUNT(*) FILTER (WHERE l.status = 'success') AS success_count,
                COALESCE(SUM(l.input_tokens), 0)::BIGINT AS input_tokens,
                COALESCE(SUM(l.output_tokens), 0)::BIGINT AS output_tokens,
                COALESCE(SUM(l.estimated_cost), 0)::DOUBLE PRECISION AS total_cost,
                COALESCE(AVG(l.latency_ms), 0)::DOUBLE PRECISION AS avg_latency_ms
            FROM ai_usage_logs l
            LEFT JOIN ai_provider_configurations c ON c.id = l.provider_configuration_id
            WHERE l.created_at >= $1
            GROUP BY l.provider_configuration_id, c.display_name, l.provider_type, l.model_name
            ORDER BY call_count DESC
            "#,
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await?)
    }
}

#[async_trait]
impl PlanLookup for PgStore {
    async fn plan_for(&self, user_id: Uuid) -> Result<SubscriptionPlan> {
        let tier: Option<String> = sqlx::query_scalar("SELECT tier FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(match tier {
            Some(tier) => SubscriptionPlan::from_tier(&tier),
            None => {
                warn!("No user row for {user_id}; routing as free plan");
                SubscriptionPlan::Free
            }
        })
    }
}
