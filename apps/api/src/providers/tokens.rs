//! Token estimation used when a backend does not report usage.
//!
//! Adapters receive an `Arc<dyn TokenEstimator>` from the factory, so an exact
//! tokenizer can replace `CharRatioEstimator` without touching routing or accounting.

/// Characters per token for the heuristic estimator.
pub const DEFAULT_CHARS_PER_TOKEN: u32 = 4;

pub trait TokenEstimator: Send + Sync {
    fn estimate(&self, text: &str) -> u32;
}

/// `ceil(chars / ratio)`. Counts Unicode scalar values, not bytes.
#[derive(Debug, Clone, Copy)]
pub struct CharRatioEstimator {
    pub chars_per_token: u32,
}

impl Default for CharRatioEstimator {
    fn default() -> Self {
        Self {
            chars_per_token: DEFAULT_CHARS_PER_TOKEN,
        }
    }
}

impl TokenEstimator for CharRatioEstimator {
    fn estimate(&self, text: &str) -> u32 {
        let chars = text.chars().count() as u64;
        let ratio = u64::from(self.chars_per_token.max(1));
        u32::try_from(chars.div_ceil(ratio)).unwrap_or(u32::MAX)
    }
}
