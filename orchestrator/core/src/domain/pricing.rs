// Copyright (c) 2026 Vanguard Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Model pricing used to turn token usage into USD.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::LazyLock;

use crate::domain::agent::TokenUsage;

/// USD per 1M tokens.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    pub input_per_million: f64,
    pub output_per_million: f64,
}

impl ModelPricing {
    pub const fn new(input_per_million: f64, output_per_million: f64) -> Self {
        Self {
            input_per_million,
            output_per_million,
        }
    }

    pub fn cost(&self, usage: TokenUsage) -> f64 {
        (usage.input_tokens as f64 / 1_000_000.0) * self.input_per_million
            + (usage.output_tokens as f64 / 1_000_000.0) * self.output_per_million
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingTable {
    /// Pricing applied to models missing from `models`.
    #[serde(default = "default_model")]
    pub default_model: String,
    #[serde(default = "default_models")]
    pub models: BTreeMap<String, ModelPricing>,
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_models() -> BTreeMap<String, ModelPricing> {
    [
        ("gpt-4o-mini", ModelPricing::new(0.15, 0.60)),
        ("gpt-4o", ModelPricing::new(5.0, 15.0)),
        ("gpt-4", ModelPricing::new(30.0, 60.0)),
        ("claude-3-5-sonnet", ModelPricing::new(3.0, 15.0)),
        ("claude-3-opus", ModelPricing::new(15.0, 75.0)),
        ("claude-3-haiku", ModelPricing::new(0.25, 1.25)),
    ]
    .into_iter()
    .map(|(name, pricing)| (name.to_string(), pricing))
    .collect()
}

impl Default for PricingTable {
    fn default() -> Self {
        Self {
            default_model: default_model(),
            models: default_models(),
        }
    }
}

static DATE_SUFFIX_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"-\d{4}-?\d{2}-?\d{2}$").ok());

/// Lower-cases and strips date suffixes such as `-20240620` or `-2024-08-06`.
pub fn normalize_model_name(model: &str) -> String {
    let model = model.trim().to_lowercase();
    match DATE_SUFFIX_RE.as_ref() {
        Some(re) => re.replace(&model, "").into_owned(),
        None => model,
    }
}

impl PricingTable {
    /// Pricing for `model`, falling back to the default model, then to zero.
    pub fn pricing_for(&self, model: &str) -> ModelPricing {
        let normalized = normalize_model_name(model);
        self.models
            .get(&normalized)
            .or_else(|| self.models.get(&self.default_model))
            .copied()
            .unwrap_or(ModelPricing::new(0.0, 0.0))
    }

    pub fn is_known(&self, model: &str) -> bool {
        self.models.contains_key(&normalize_model_name(model))
    }

    pub fn cost(&self, model: &str, usage: TokenUsage) -> f64 {
        self.pricing_for(model).cost(usage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usage(input: u64, output: u64) -> TokenUsage {
        TokenUsage {
            input_tokens: input,
            output_tokens: output,
        }
    }

    #[test]
    fn test_normalize_model_name() {
        assert_eq!(normalize_model_name("gpt-4o-2024-08-06"), "gpt-4o");
        assert_eq!(
            normalize_model_name("Claude-3-5-Sonnet-20240620"),
            "claude-3-5-sonnet"
        );
        assert_eq!(normalize_model_name("gpt-4o-mini"), "gpt-4o-mini");
    }

    #[test]
    fn test_cost_for_known_model() {
        let table = PricingTable::default();
        let cost = table.cost("claude-3-5-sonnet-20240620", usage(1_000_000, 1_000_000));
        assert!((cost - 18.0).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_model_falls_back_to_default() {
        let table = PricingTable::default();
        assert!(!table.is_known("mystery-model"));
        let cost = table.cost("mystery-model", usage(1000, 500));
        let expected = 1000.0 / 1_000_000.0 * 0.15 + 500.0 / 1_000_000.0 * 0.60;
        assert!((cost - expected).abs() < 1e-12);
    }
}
