//! Axum route handler exposing `Orchestrator::generate` to business flows.

use axum::{extract::State, Json};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::provider::TaskType;
use crate::orchestration::orchestrator::{GenerateRequest, ImageData};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ImagePayload {
    /// Base64 (standard alphabet) image bytes.
    pub data: String,
    pub mime_type: String,
}

#[derive(Debug, Deserialize)]
pub struct GenerateBody {
    pub user_id: Uuid,
    pub task_type: TaskType,
    pub prompt: String,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub image: Option<ImagePayload>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub text: String,
}

impl TryFrom<GenerateBody> for GenerateRequest {
    type Error = AppError;

    fn try_from(body: GenerateBody) -> Result<Self, Self::Error> {
        if body.prompt.trim().is_empty() {
            return Err(AppError::Validation("prompt cannot be empty".to_string()));
        }
        if let Some(t) = body.temperature {
            if !(0.0..=2.0).contains(&t) {
                return Err(AppError::Validation(
                    "temperature must be between 0 and 2".to_string(),
                ));
            }
        }
        if body.max_tokens == Some(0) {
            return Err(AppError::Validation(
                "max_tokens must be greater than 0".to_string(),
            ));
        }

        let image = body
            .image
            .map(|image| -> Result<ImageData, AppError> {
                let bytes = STANDARD
                    .decode(image.data.trim())
                    .map_err(|e| {
                        AppError::Validation(format!("image.data is not valid base64: {e}"))
                    })?;
                Ok(ImageData {
                    bytes,
                    mime_type: image.mime_type,
                })
            })
            .transpose()?;

        Ok(GenerateRequest {
            user_id: body.user_id,
            task_type: body.task_type,
            prompt: body.prompt,
            system_prompt: body.system_prompt.filter(|s| !s.trim().is_empty()),
            image,
            temperature: body.temperature,
            max_tokens: body.max_tokens,
        })
    }
}

/// POST /api/v1/ai/generate
pub async fn handle_generate(
    State(state): State<AppState>,
    Json(body): Json<GenerateBody>,
) -> Result<Json<GenerateResponse>, AppError> {
    let request = GenerateRequest::try_from(body)?;
    let text = state.orchestrator.generate(request).await?;
    Ok(Json(GenerateResponse { text }))
}
