//! Static per-model pricing table.
//!
//! Prices are USD per 1 000 tokens, split into input (prompt) and output
//! (completion) rates. Unknown models resolve to a deliberately conservative
//! default entry instead of failing the request.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Price for a single model: USD per 1 000 input / output tokens.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    /// USD per 1 000 prompt tokens.
    pub input_per_1k: f64,
    /// USD per 1 000 completion tokens.
    pub output_per_1k: f64,
}

impl ModelPricing {
    pub const fn new(input_per_1k: f64, output_per_1k: f64) -> Self {
        Self {
            input_per_1k,
            output_per_1k,
        }
    }
}

/// Conservative fallback pricing for models not in the table.
pub const DEFAULT_PRICING: ModelPricing = ModelPricing::new(0.0100, 0.0300);

/// Lookup table from model identifier to pricing entry.
///
/// Immutable after construction; shared read-only across requests.
#[derive(Debug, Clone)]
pub struct PricingTable {
    entries: HashMap<String, ModelPricing>,
    default: ModelPricing,
}

impl PricingTable {
    /// Build the built-in table covering the commonly proxied models.
    pub fn builtin() -> Self {
        let mut entries = HashMap::new();
        for (model, input, output) in [
            // OpenAI
            ("gpt-4o", 0.0025, 0.0100),
            ("gpt-4o-mini", 0.000_150, 0.000_600),
            ("gpt-4-turbo", 0.0100, 0.0300),
            ("gpt-4", 0.0300, 0.0600),
            ("gpt-3.5-turbo", 0.0005, 0.0015),
            // Anthropic
            ("claude-3-5-sonnet-20241022", 0.0030, 0.0150),
            ("claude-3-5-haiku-20241022", 0.0008, 0.0040),
            ("claude-3-opus-20240229", 0.0150, 0.0750),
            // OpenRouter prefixed
            ("openai/gpt-4o", 0.0025, 0.0100),
            ("openai/gpt-4o-mini", 0.000_150, 0.000_600),
            ("anthropic/claude-3.5-sonnet", 0.0030, 0.0150),
            ("anthropic/claude-3.5-haiku", 0.0008, 0.0040),
            ("anthropic/claude-3-opus", 0.0150, 0.0750),
        ] {
            entries.insert(model.to_string(), ModelPricing::new(input, output));
        }

        Self {
            entries,
            default: DEFAULT_PRICING,
        }
    }

    /// Build an empty table with a custom default entry (used in tests).
    pub fn with_default(default: ModelPricing) -> Self {
        Self {
            entries: HashMap::new(),
            default,
        }
    }

    /// Add or replace a pricing entry.
    pub fn insert(&mut self, model: impl Into<String>, pricing: ModelPricing) {
        self.entries.insert(model.into(), pricing);
    }

    /// Resolve pricing for a model, falling back to the default entry.
    pub fn get(&self, model: &str) -> ModelPricing {
        self.entries.get(model).copied().unwrap_or(self.default)
    }

    /// Whether the model has an explicit (non-default) entry.
    pub fn contains(&self, model: &str) -> bool {
        self.entries.contains_key(model)
    }

    /// Compute the total cost in USD for a request.
    pub fn cost(&self, model: &str, input_tokens: usize, output_tokens: usize) -> f64 {
        let pricing = self.get(model);
        (input_tokens as f64 / 1000.0) * pricing.input_per_1k
            + (output_tokens as f64 / 1000.0) * pricing.output_per_1k
    }

    /// Cost of the input tokens alone, used for pre-flight estimates.
    pub fn input_cost(&self, model: &str, input_tokens: usize) -> f64 {
        (input_tokens as f64 / 1000.0) * self.get(model).input_per_1k
    }

    /// Cost of a number of output tokens, used for reserved-output estimates.
    pub fn output_cost(&self, model: &str, output_tokens: usize) -> f64 {
        (output_tokens as f64 / 1000.0) * self.get(model).output_per_1k
    }
}

impl Default for PricingTable {
    fn default() -> Self {
        Self::builtin()
    }
}
