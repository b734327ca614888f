use std::fmt;

use serde::{Deserialize, Serialize};

/// Subscription tier of a caller. Read from `users.tier`; never written here.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionPlan {
    #[default]
    Free,
    PayAsYouGo,
    Pro,
    Premium,
}

impl SubscriptionPlan {
    pub const ALL: [SubscriptionPlan; 4] = [
        SubscriptionPlan::Free,
        SubscriptionPlan::PayAsYouGo,
        SubscriptionPlan::Pro,
        SubscriptionPlan::Premium,
    ];

    /// Parses the stored tier string. Unknown tiers read as `Free`.
    pub fn from_tier(tier: &str) -> Self {
        match tier.trim().to_ascii_lowercase().as_str() {
            "pay_as_you_go" | "payg" | "pay-as-you-go" => SubscriptionPlan::PayAsYouGo,
            "pro" => SubscriptionPlan::Pro,
            "premium" => SubscriptionPlan::Premium,
            "free" => SubscriptionPlan::Free,
            other => {
                tracing::warn!("Unknown subscription tier '{other}', treating as free");
                SubscriptionPlan::Free
            }
        }
    }

    /// Paid recurring tiers get the quality model for drafting tasks.
    pub fn is_recurring(&self) -> bool {
        matches!(self, SubscriptionPlan::Pro | SubscriptionPlan::Premium)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionPlan::Free => "free",
            SubscriptionPlan::PayAsYouGo => "pay_as_you_go",
            SubscriptionPlan::Pro => "pro",
            SubscriptionPlan::Premium => "premium",
        }
    }
}

impl fmt::Display for SubscriptionPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
