//! Pre-flight admission check consulted before every backend call.
//!
//! `AllowAll` is the only implementation today. Token ceilings are stored on each
//! provider configuration but are not enforced yet.

use async_trait::async_trait;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuotaDecision {
    Allow,
    Deny { reason: String },
}

#[async_trait]
pub trait QuotaGuard: Send + Sync {
    async fn check(
        &self,
        user_id: Uuid,
        provider_configuration_id: Option<Uuid>,
        estimated_tokens: u32,
    ) -> QuotaDecision;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

#[async_trait]
impl QuotaGuard for AllowAll {
    async fn check(
        &self,
        _user_id: Uuid,
        _provider_configuration_id: Option<Uuid>,
        _estimated_tokens: u32,
    ) -> QuotaDecision {
        QuotaDecision::Allow
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_allow_all_allows_everything() {
        let decision = AllowAll
            .check(Uuid::new_v4(), None, u32::MAX)
            .await;
        assert_eq!(decision, QuotaDecision::Allow);
    }
}
