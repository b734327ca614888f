use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Backend family a provider configuration talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderType {
    Gemini,
    #[serde(rename = "openai")]
    OpenAi,
    Anthropic,
}

impl ProviderType {
    pub const ALL: [ProviderType; 3] = [
        ProviderType::Gemini,
        ProviderType::OpenAi,
        ProviderType::Anthropic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderType::Gemini => "gemini",
            ProviderType::OpenAi => "openai",
            ProviderType::Anthropic => "anthropic",
        }
    }
}

impl fmt::Display for ProviderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gemini" | "google" => Ok(ProviderType::Gemini),
            "openai" => Ok(ProviderType::OpenAi),
            "anthropic" | "claude" => Ok(ProviderType::Anthropic),
            other => Err(format!("unknown provider type '{other}'")),
        }
    }
}

/// Functional purpose of one generation call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Extraction,
    CvDraft,
    CoverLetter,
    Validation,
}

impl TaskType {
    pub const ALL: [TaskType; 4] = [
        TaskType::Extraction,
        TaskType::CvDraft,
        TaskType::CoverLetter,
        TaskType::Validation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Extraction => "extraction",
            TaskType::CvDraft => "cv_draft",
            TaskType::CoverLetter => "cover_letter",
            TaskType::Validation => "validation",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "extraction" => Ok(TaskType::Extraction),
            "cv_draft" => Ok(TaskType::CvDraft),
            "cover_letter" => Ok(TaskType::CoverLetter),
            "validation" => Ok(TaskType::Validation),
            other => Err(format!("unknown task type '{other}'")),
        }
    }
}

/// One administrator-managed backend binding, as stored in `ai_provider_configurations`.
///
/// `encrypted_credential` is vault ciphertext. It is never serialized to API clients;
/// see `admin::handlers::ProviderConfigurationView`.
#[derive(Debug, Clone, FromRow)]
pub struct ProviderConfigurationRow {
    pub id: Uuid,
    pub provider_type: String,
    pub encrypted_credential: String,
    pub model_name: String,
    pub display_name: String,
    pub is_active: bool,
    pub is_default: bool,
    pub task_defaults: Vec<String>,
    pub daily_token_limit: Option<i64>,
    pub monthly_token_limit: Option<i64>,
    pub last_tested_at: Option<DateTime<Utc>>,
    pub last_test_success: Option<bool>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProviderConfigurationRow {
    /// True when `task` is listed in this row's task defaults.
    /// Unparseable entries are ignored rather than matched.
    pub fn serves(&self, task: TaskType) -> bool {
        self.task_defaults
            .iter()
            .any(|t| t.parse::<TaskType>().ok() == Some(task))
    }
}

/// Fields required to insert a new provider configuration.
#[derive(Debug, Clone)]
pub struct NewProviderConfiguration {
    pub provider_type: ProviderType,
    pub encrypted_credential: String,
    pub model_name: String,
    pub display_name: String,
    pub is_active: bool,
    pub is_default: bool,
    pub task_defaults: Vec<TaskType>,
    pub daily_token_limit: Option<i64>,
    pub monthly_token_limit: Option<i64>,
    pub created_by: Option<Uuid>,
}
