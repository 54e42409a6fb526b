// Copyright (c) 2026 Vanguard Contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Risk Classification Policy
//!
//! Maps tool identity and argument patterns to a [`RiskTier`]. The table is
//! configuration (`spec.risk_policy` in the swarm manifest); [`RiskPolicy::default`]
//! only provides a conservative starting point.
//!
//! Effective tier = max(rule tier, every matching escalation, declared tier).
//! The first rule whose tool pattern matches wins; no match yields
//! `default_tier`.

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::tool::{RiskTier, ToolCallRequest};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskPolicy {
    #[serde(default = "default_tier")]
    pub default_tier: RiskTier,
    #[serde(default)]
    pub rules: Vec<RiskRule>,
}

fn default_tier() -> RiskTier {
    RiskTier::High
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskRule {
    /// Exact name, `*`, `prefix*` or `*suffix`.
    pub tool: String,
    pub tier: RiskTier,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub escalations: Vec<Escalation>,
}

/// Raises the tier when an argument matches a regex.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Escalation {
    /// Argument name, or `*` for every argument.
    pub argument: String,
    pub pattern: String,
    pub tier: RiskTier,
}

impl RiskRule {
    fn new(tool: &str, tier: RiskTier) -> Self {
        Self {
            tool: tool.to_string(),
            tier,
            escalations: Vec::new(),
        }
    }

    fn escalate(mut self, argument: &str, pattern: &str, tier: RiskTier) -> Self {
        self.escalations.push(Escalation {
            argument: argument.to_string(),
            pattern: pattern.to_string(),
            tier,
        });
        self
    }
}

impl Default for RiskPolicy {
    fn default() -> Self {
        Self {
            default_tier: RiskTier::High,
            rules: vec![
                RiskRule::new("nmap", RiskTier::Low).escalate(
                    "script",
                    "(?i)(exploit|brute|dos|vuln)",
                    RiskTier::Medium,
                ),
                RiskRule::new("whois", RiskTier::Low),
                RiskRule::new("dig", RiskTier::Low),
                RiskRule::new("nuclei", RiskTier::Medium),
                RiskRule::new("sqlmap", RiskTier::Medium).escalate(
                    "*",
                    "(?i)--os-(shell|pwn|cmd)",
                    RiskTier::High,
                ),
                RiskRule::new("hydra", RiskTier::High),
                RiskRule::new("msfconsole", RiskTier::High),
                RiskRule::new("exploit_*", RiskTier::High),
            ],
        }
    }
}

/// Outcome of classifying one request, with the reasons that raised it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub tier: RiskTier,
    pub matched_rule: Option<String>,
    pub reasons: Vec<String>,
}

struct CompiledEscalation {
    argument: String,
    pattern: Regex,
    tier: RiskTier,
}

struct CompiledRule {
    tool: String,
    tier: RiskTier,
    escalations: Vec<CompiledEscalation>,
}

/// A [`RiskPolicy`] with its regexes compiled.
pub struct RiskClassifier {
    default_tier: RiskTier,
    rules: Vec<CompiledRule>,
}

impl RiskClassifier {
    pub fn new(policy: &RiskPolicy) -> Result<Self> {
        let mut rules = Vec::with_capacity(policy.rules.len());
        for rule in &policy.rules {
            let mut escalations = Vec::with_capacity(rule.escalations.len());
            for escalation in &rule.escalations {
                let pattern = Regex::new(&escalation.pattern).with_context(|| {
                    format!(
                        "invalid escalation pattern '{}' for tool '{}'",
                        escalation.pattern, rule.tool
                    )
                })?;
                escalations.push(CompiledEscalation {
                    argument: escalation.argument.clone(),
                    pattern,
                    tier: escalation.tier,
                });
            }
            rules.push(CompiledRule {
                tool: rule.tool.clone(),
                tier: rule.tier,
                escalations,
            });
        }
        Ok(Self {
            default_tier: policy.default_tier,
            rules,
        })
    }

    pub fn classify(&self, request: &ToolCallRequest) -> Classification {
        let mut reasons = Vec::new();
        let rule = self
            .rules
            .iter()
            .find(|rule| matches_pattern(&rule.tool, &request.tool));

        let mut tier = match rule {
            Some(rule) => {
                reasons.push(format!("rule '{}' assigns {}", rule.tool, rule.tier));
                let mut tier = rule.tier;
                for escalation in &rule.escalations {
                    if escalation_matches(escalation, request) {
                        reasons.push(format!(
                            "argument '{}' matches /{}/ -> {}",
                            escalation.argument, escalation.pattern, escalation.tier
                        ));
                        tier = tier.max(escalation.tier);
                    }
                }
                tier
            }
            None => {
                reasons.push(format!("no rule for '{}', default {}", request.tool, self.default_tier));
                self.default_tier
            }
        };

        if request.declared_risk > tier {
            reasons.push(format!("declared {} by requesting agent", request.declared_risk));
            tier = request.declared_risk;
        }

        Classification {
            tier,
            matched_rule: rule.map(|r| r.tool.clone()),
            reasons,
        }
    }
}

fn escalation_matches(escalation: &CompiledEscalation, request: &ToolCallRequest) -> bool {
    if escalation.argument == "*" {
        request
            .arguments
            .values()
            .any(|value| escalation.pattern.is_match(&render(value)))
    } else {
        request
            .arguments
            .get(&escalation.argument)
            .is_some_and(|value| escalation.pattern.is_match(&render(value)))
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Exact, `*`, `prefix*` and `*suffix` matching on tool names.
pub fn matches_pattern(pattern: &str, value: &str) -> bool {
    if pattern == "*" || pattern == value {
        return true;
    }
    if let Some(prefix) = pattern.strip_suffix('*') {
        return value.starts_with(prefix);
    }
    if let Some(suffix) = pattern.strip_prefix('*') {
        return value.ends_with(suffix);
    }
    false
}
