// src/core/cost.rs — Per-model pricing and cost estimation

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// USD per million tokens.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    pub input: f64,
    pub output: f64,
}

impl ModelPricing {
    pub const fn new(input: f64, output: f64) -> Self {
        Self { input, output }
    }
}

const BUILTIN_PRICING: &[(&str, ModelPricing)] = &[
    ("gpt-3.5-turbo", ModelPricing::new(0.50, 1.50)),
    ("gpt-4o", ModelPricing::new(2.50, 10.00)),
];

/// Exact-name pricing lookup. Models without a row cost nothing.
#[derive(Debug, Clone, PartialEq)]
pub struct PricingTable {
    rows: BTreeMap<String, ModelPricing>,
}

impl PricingTable {
    pub fn builtin() -> Self {
        Self {
            rows: BUILTIN_PRICING
                .iter()
                .map(|(name, p)| (name.to_string(), *p))
                .collect(),
        }
    }

    pub fn empty() -> Self {
        Self {
            rows: BTreeMap::new(),
        }
    }

    pub fn with_overrides(mut self, overrides: &BTreeMap<String, ModelPricing>) -> Self {
        for (name, p) in overrides {
            self.rows.insert(name.clone(), *p);
        }
        self
    }

    pub fn get(&self, model: &str) -> Option<&ModelPricing> {
        self.rows.get(model)
    }

    pub fn models(&self) -> impl Iterator<Item = (&str, &ModelPricing)> {
        self.rows.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// `rate_in * input/1e6 + rate_out * output/1e6`, rounded to 6 decimal places.
    pub fn estimate_cost(&self, model: &str, input_tokens: u64, output_tokens: u64) -> f64 {
        let Some(p) = self.get(model) else {
            return 0.0;
        };
        let cost = (input_tokens as f64 / 1_000_000.0) * p.input
            + (output_tokens as f64 / 1_000_000.0) * p.output;
        round6(cost)
    }
}

impl Default for PricingTable {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Estimate cost against the built-in table.
pub fn estimate_cost(model: &str, input_tokens: u64, output_tokens: u64) -> f64 {
    PricingTable::builtin().estimate_cost(model, input_tokens, output_tokens)
}

pub(crate) fn round6(v: f64) -> f64 {
    (v * 1_000_000.0).round() / 1_000_000.0
}
