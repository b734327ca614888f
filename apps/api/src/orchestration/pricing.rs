//! Linear price table for `estimated_cost`. USD per million tokens.
//!
//! Entries are matched by longest model-name prefix so dated snapshots
//! (`gpt-4o-2024-08-06`) price like their family.

use crate::models::provider::ProviderType;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelPrice {
    pub input_per_million: f64,
    pub output_per_million: f64,
}

const fn price(input_per_million: f64, output_per_million: f64) -> ModelPrice {
    ModelPrice {
        input_per_million,
        output_per_million,
    }
}

const GEMINI_PRICES: &[(&str, ModelPrice)] = &[
    ("gemini-2.5-pro", price(1.25, 10.0)),
    ("gemini-2.5-flash", price(0.30, 2.50)),
    ("gemini-2.0-flash", price(0.10, 0.40)),
    ("gemini-1.5-pro", price(1.25, 5.0)),
    ("gemini-1.5-flash", price(0.075, 0.30)),
];

const OPENAI_PRICES: &[(&str, ModelPrice)] = &[
    ("gpt-4o-mini", price(0.15, 0.60)),
    ("gpt-4o", price(2.50, 10.0)),
    ("gpt-4.1-mini", price(0.40, 1.60)),
    ("gpt-4.1", price(2.0, 8.0)),
    ("gpt-3.5-turbo", price(0.50, 1.50)),
];

const ANTHROPIC_PRICES: &[(&str, ModelPrice)] = &[
    ("claude-haiku-4-5", price(1.0, 5.0)),
    ("claude-sonnet-4-5", price(3.0, 15.0)),
    ("claude-3-5-haiku", price(0.80, 4.0)),
    ("claude-3-5-sonnet", price(3.0, 15.0)),
    ("claude-opus-4", price(15.0, 75.0)),
];

/// Price for `model`, or the provider's fast-tier price when the model is unknown.
pub fn price_for(provider: ProviderType, model: &str) -> ModelPrice {
    let (table, fallback) = match provider {
        ProviderType::Gemini => (GEMINI_PRICES, price(0.10, 0.40)),
        ProviderType::OpenAi => (OPENAI_PRICES, price(0.15, 0.60)),
        ProviderType::Anthropic => (ANTHROPIC_PRICES, price(1.0, 5.0)),
    };
    let model = model.to_ascii_lowercase();
    table
        .iter()
        .filter(|(prefix, _)| model.starts_with(prefix))
        .max_by_key(|(prefix, _)| prefix.len())
        .map(|(_, p)| *p)
        .unwrap_or(fallback)
}

/// Never negative.
pub fn estimate_cost(
    provider: ProviderType,
    model: &str,
    input_tokens: u32,
    output_tokens: u32,
) -> f64 {
    let p = price_for(provider, model);
    let cost = f64::from(input_tokens) * p.input_per_million / 1_000_000.0
        + f64::from(output_tokens) * p.output_per_million / 1_000_000.0;
    cost.max(0.0)
}
