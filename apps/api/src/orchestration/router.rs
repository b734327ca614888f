//! Model routing policy: (plan, task) → model tier. Pure, no I/O.
//!
//! Consulted only when the resolved configuration does not pin a model,
//! i.e. on the static-fallback path without `AI_FALLBACK_MODEL`.

use crate::models::provider::{ProviderType, TaskType};
use crate::models::user::SubscriptionPlan;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelTier {
    Fast,
    Quality,
}

impl ModelTier {
    /// Concrete model name for this tier on a given backend family.
    pub fn model_for(&self, provider: ProviderType) -> &'static str {
        match (provider, self) {
            (ProviderType::Gemini, ModelTier::Fast) => "gemini-2.0-flash",
            (ProviderType::Gemini, ModelTier::Quality) => "gemini-2.5-pro",
            (ProviderType::OpenAi, ModelTier::Fast) => "gpt-4o-mini",
            (ProviderType::OpenAi, ModelTier::Quality) => "gpt-4o",
            (ProviderType::Anthropic, ModelTier::Fast) => "claude-haiku-4-5",
            (ProviderType::Anthropic, ModelTier::Quality) => "claude-sonnet-4-5",
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ModelRouter;

impl ModelRouter {
    /// Extraction and validation always run on the fast tier. Drafting tasks get the
    /// quality tier only on paid recurring plans.
    pub fn route(&self, plan: SubscriptionPlan, task: TaskType) -> ModelTier {
        match task {
            TaskType::Extraction | TaskType::Validation => ModelTier::Fast,
            TaskType::CvDraft | TaskType::CoverLetter => {
                if plan.is_recurring() {
                    ModelTier::Quality
                } else {
                    ModelTier::Fast
                }
            }
        }
    }

    pub fn route_model(
        &self,
        provider: ProviderType,
        plan: SubscriptionPlan,
        task: TaskType,
    ) -> &'static str {
        self.route(plan, task).model_for(provider)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extraction_and_validation_are_always_fast() {
        let router = ModelRouter;
        for plan in SubscriptionPlan::ALL {
            assert_eq!(router.route(plan, TaskType::Extraction), ModelTier::Fast);
            assert_eq!(router.route(plan, TaskType::Validation), ModelTier::Fast);
        }
    }

    #[test]
    fn test_drafting_tier_follows_plan() {
        let router = ModelRouter;
        for task in [TaskType::CvDraft, TaskType::CoverLetter] {
            assert_eq!(router.route(SubscriptionPlan::Free, task), ModelTier::Fast);
            assert_eq!(
                router.route(SubscriptionPlan::PayAsYouGo, task),
                ModelTier::Fast
            );
            assert_eq!(router.route(SubscriptionPlan::Pro, task), ModelTier::Quality);
            assert_eq!(
                router.route(SubscriptionPlan::Premium, task),
                ModelTier::Quality
            );
        }
    }

    #[test]
    fn test_every_pair_is_mapped_and_stable() {
        let router = ModelRouter;
        for plan in SubscriptionPlan::ALL {
            for task in TaskType::ALL {
                for provider in ProviderType::ALL {
                    let first = router.route_model(provider, plan, task);
                    assert!(!first.is_empty());
                    assert_eq!(first, router.route_model(provider, plan, task));
                }
            }
        }
    }

    #[test]
    fn test_tiers_differ_per_provider() {
        for provider in ProviderType::ALL {
            assert_ne!(
                ModelTier::Fast.model_for(provider),
                ModelTier::Quality.model_for(provider)
            );
        }
    }
}
