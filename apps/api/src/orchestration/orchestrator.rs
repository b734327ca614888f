//! Orchestrator — the single `generate()` entrypoint used by every business flow.
//!
//! Flow: plan lookup → resolve config → route model (if not pinned) → quota check →
//!       build adapter → backend call → price → record usage → return text.
//!
//! Exactly one usage entry is written per call, on every path out of `generate()`.
//! There is no retry and no cross-provider failover: one backend failure fails the call.

use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::provider::{ProviderType, TaskType};
use crate::models::usage::UsageStatus;
use crate::orchestration::pricing::estimate_cost;
use crate::orchestration::quota::{AllowAll, QuotaDecision, QuotaGuard};
use crate::orchestration::resolver::{ConfigResolver, ResolveError};
use crate::orchestration::router::ModelRouter;
use crate::orchestration::sanitize::sanitize_error_message;
use crate::orchestration::usage::{UsageRecord, UsageRecorder};
use crate::orchestration::vault::CredentialSecret;
use crate::providers::tokens::{CharRatioEstimator, TokenEstimator};
use crate::providers::{
    AdapterFactory, AdapterTarget, Generation, ImageInput, ProviderError, ProviderErrorKind,
    TextRequest, DEFAULT_MAX_OUTPUT_TOKENS,
};
use crate::store::PlanLookup;

/// Raw image attached to a generation request.
#[derive(Debug, Clone)]
pub struct ImageData {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub user_id: Uuid,
    pub task_type: TaskType,
    pub prompt: String,
    pub system_prompt: Option<String>,
    pub image: Option<ImageData>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl GenerateRequest {
    pub fn text(user_id: Uuid, task_type: TaskType, prompt: impl Into<String>) -> Self {
        Self {
            user_id,
            task_type,
            prompt: prompt.into(),
            system_prompt: None,
            image: None,
            temperature: None,
            max_tokens: None,
        }
    }
}

/// Failure of one `generate()` call. Every message is already sanitized.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("no usable AI provider: {0}")]
    Configuration(String),

    #[error("provider credential unusable: {0}")]
    Credential(String),

    #[error("provider call failed: {0}")]
    Provider(ProviderError),

    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("plan lookup failed: {0}")]
    PlanLookup(String),
}

impl OrchestratorError {
    pub fn provider_kind(&self) -> Option<ProviderErrorKind> {
        match self {
            OrchestratorError::Provider(e) => Some(e.kind),
            _ => None,
        }
    }

    /// Classified message safe to show to the calling business flow's user.
    pub fn user_message(&self) -> String {
        match self {
            OrchestratorError::Configuration(_) | OrchestratorError::Credential(_) => {
                "AI service unavailable. Please contact support.".to_string()
            }
            OrchestratorError::Provider(e) if e.kind.is_transient() => {
                "AI service is busy, please retry later.".to_string()
            }
            OrchestratorError::Provider(e) => match e.kind {
                ProviderErrorKind::Auth => {
                    "AI service is misconfigured. An administrator has to update the provider credentials."
                        .to_string()
                }
                ProviderErrorKind::UnsupportedModality => {
                    "The configured AI model cannot process this image.".to_string()
                }
                _ => "AI generation failed. Please try again.".to_string(),
            },
            OrchestratorError::QuotaExceeded(reason) => {
                format!("AI usage limit reached: {reason}")
            }
            OrchestratorError::PlanLookup(_) => {
                "AI generation failed. Please try again.".to_string()
            }
        }
    }

    fn sanitized(self, secret: &str) -> Self {
        match self {
            OrchestratorError::Configuration(m) => {
                OrchestratorError::Configuration(sanitize_error_message(&m, secret))
            }
            OrchestratorError::Credential(m) => {
                OrchestratorError::Credential(sanitize_error_message(&m, secret))
            }
            OrchestratorError::Provider(e) => OrchestratorError::Provider(ProviderError::new(
                e.kind,
                sanitize_error_message(&e.message, secret),
            )),
            OrchestratorError::QuotaExceeded(m) => {
                OrchestratorError::QuotaExceeded(sanitize_error_message(&m, secret))
            }
            OrchestratorError::PlanLookup(m) => {
                OrchestratorError::PlanLookup(sanitize_error_message(&m, secret))
            }
        }
    }
}

/// What is known about the attempt so far; feeds the usage entry on every path.
#[derive(Default)]
struct Attempt {
    provider_configuration_id: Option<Uuid>,
    provider_type: Option<ProviderType>,
    model_name: Option<String>,
    secret: Option<CredentialSecret>,
    started: Option<Instant>,
}

impl Attempt {
    fn latency_ms(&self) -> u64 {
        self.started
            .map(|s| u64::try_from(s.elapsed().as_millis()).unwrap_or(u64::MAX))
            .unwrap_or(0)
    }
}

pub struct Orchestrator {
    plans: Arc<dyn PlanLookup>,
    resolver: ConfigResolver,
    router: ModelRouter,
    quota: Arc<dyn QuotaGuard>,
    adapters: Arc<dyn AdapterFactory>,
    recorder: UsageRecorder,
    estimator: CharRatioEstimator,
    call_timeout: Duration,
}

impl Orchestrator {
    pub fn new(
        plans: Arc<dyn PlanLookup>,
        resolver: ConfigResolver,
        adapters: Arc<dyn AdapterFactory>,
        recorder: UsageRecorder,
        call_timeout: Duration,
    ) -> Self {
        Self {
            plans,
            resolver,
            router: ModelRouter,
            quota: Arc::new(AllowAll),
            adapters,
            recorder,
            estimator: CharRatioEstimator::default(),
            call_timeout,
        }
    }

    pub fn with_quota_guard(mut self, quota: Arc<dyn QuotaGuard>) -> Self {
        self.quota = quota;
        self
    }

    pub fn has_static_fallback(&self) -> bool {
        self.resolver.has_fallback()
    }

    /// Runs one generation and returns the model's text.
    pub async fn generate(&self, request: GenerateRequest) -> Result<String, OrchestratorError> {
        let mut attempt = Attempt::default();
        let outcome = self.run(&request, &mut attempt).await;
        let latency_ms = attempt.latency_ms();
        let provider_type = attempt.provider_type.map(|p| p.as_str().to_string());

        match outcome {
            Ok(generation) => {
                let model = attempt.model_name.clone().unwrap_or_default();
                let cost = attempt
                    .provider_type
                    .map(|p| {
                        estimate_cost(p, &model, generation.input_tokens, generation.output_tokens)
                    })
                    .unwrap_or(0.0);

                info!(
                    "Generated {} for user {}: {}/{} in={} out={}{} cost=${:.6} latency={}ms",
                    request.task_type,
                    request.user_id,
                    provider_type.as_deref().unwrap_or("?"),
                    model,
                    generation.input_tokens,
                    generation.output_tokens,
                    if generation.tokens_estimated { " (estimated)" } else { "" },
                    cost,
                    latency_ms
                );

                self.recorder
                    .record(UsageRecord {
                        user_id: request.user_id,
                        provider_configuration_id: attempt.provider_configuration_id,
                        provider_type,
                        model_name: attempt.model_name,
                        task_type: request.task_type,
                        input_tokens: generation.input_tokens,
                        output_tokens: generation.output_tokens,
                        estimated_cost: cost,
                        latency_ms,
                        status: UsageStatus::Success,
                        error_message: None,
                    })
                    .await;
                Ok(generation.text)
            }
            Err(err) => {
                let secret = attempt
                    .secret
                    .as_ref()
                    .map(|s| s.expose_secret())
                    .unwrap_or_default();
                let err = err.sanitized(secret);

                warn!(
                    "Generation failed for user {} task {}: {err}",
                    request.user_id, request.task_type
                );

                self.recorder
                    .record(UsageRecord {
                        user_id: request.user_id,
                        provider_configuration_id: attempt.provider_configuration_id,
                        provider_type,
                        model_name: attempt.model_name,
                        task_type: request.task_type,
                        input_tokens: 0,
                        output_tokens: 0,
                        estimated_cost: 0.0,
                        latency_ms,
                        status: UsageStatus::Error,
                        error_message: Some(err.to_string()),
                    })
                    .await;
                Err(err)
            }
        }
    }

    async fn run(
        &self,
        request: &GenerateRequest,
        attempt: &mut Attempt,
    ) -> Result<Generation, OrchestratorError> {
        // Step 1: caller's plan
        let plan = self
            .plans
            .plan_for(request.user_id)
            .await
            .map_err(|e| OrchestratorError::PlanLookup(format!("{e:#}")))?;

        // Step 2: resolve provider configuration
        let resolved = self
            .resolver
            .resolve(request.task_type)
            .await
            .map_err(|e| match e {
                ResolveError::NoProviderConfigured => {
                    OrchestratorError::Configuration(e.to_string())
                }
                ResolveError::Credential {
                    configuration_id, ..
                } => {
                    attempt.provider_configuration_id = Some(configuration_id);
                    OrchestratorError::Credential(e.to_string())
                }
            })?;
        attempt.provider_configuration_id = resolved.provider_configuration_id;
        attempt.provider_type = Some(resolved.provider_type);
        attempt.secret = Some(resolved.api_key.clone());

        // Step 3: route model unless pinned
        let model = match resolved.model_name {
            Some(model) => model,
            None => self
                .router
                .route_model(resolved.provider_type, plan, request.task_type)
                .to_string(),
        };
        debug!(
            "Routing {} ({plan}) via {:?} to {}/{model}",
            request.task_type, resolved.source, resolved.provider_type
        );
        attempt.model_name = Some(model.clone());

        // Step 4: quota admission
        let estimated_tokens = self
            .estimator
            .estimate(&request.prompt)
            .saturating_add(
                request
                    .system_prompt
                    .as_deref()
                    .map_or(0, |s| self.estimator.estimate(s)),
            )
            .saturating_add(request.max_tokens.unwrap_or(DEFAULT_MAX_OUTPUT_TOKENS));
        if let QuotaDecision::Deny { reason } = self
            .quota
            .check(
                request.user_id,
                resolved.provider_configuration_id,
                estimated_tokens,
            )
            .await
        {
            return Err(OrchestratorError::QuotaExceeded(reason));
        }

        // Step 5: fresh adapter for this call only
        let adapter = self.adapters.build(AdapterTarget {
            provider_type: resolved.provider_type,
            model,
            api_key: resolved.api_key,
        });

        // Step 6: backend call under a bounded timeout
        let text_request = TextRequest {
            prompt: &request.prompt,
            system_prompt: request.system_prompt.as_deref(),
            temperature: request.temperature,
            max_output_tokens: request.max_tokens,
        };
        attempt.started = Some(Instant::now());
        let call = async {
            match &request.image {
                Some(image) => {
                    let image = ImageInput {
                        bytes: &image.bytes,
                        mime_type: &image.mime_type,
                    };
                    adapter.generate_multimodal(&text_request, &image).await
                }
                None => adapter.generate_text(&text_request).await,
            }
        };

        match tokio::time::timeout(self.call_timeout, call).await {
            Ok(result) => result.map_err(OrchestratorError::Provider),
            Err(_) => Err(OrchestratorError::Provider(ProviderError::new(
                ProviderErrorKind::Timeout,
                format!(
                    "no response from {} within {}s",
                    resolved.provider_type,
                    self.call_timeout.as_secs()
                ),
            ))),
        }
    }
}
