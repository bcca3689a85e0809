//! Configuration types for the routing module

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use super::decision::{RoutingContext, Tier};
use super::error::{RoutingError, RoutingResult};

/// Feature names a rule condition may test besides the special keys
const FEATURE_KEYS: &[&str] = &[
    "token_count",
    "prompt_length",
    "task",
    "constraint_density",
    "context_length",
    "risk_flag",
];

/// Configuration for a single model tier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub model_name: String,
    pub max_context_tokens: u64,
    pub cost_per_token: f64,
}

impl ModelConfig {
    fn validate(&self, tier: Tier) -> RoutingResult<()> {
        let key = format!("models.{}", tier);
        if self.model_name.trim().is_empty() {
            return Err(RoutingError::config(key, "model_name must not be empty"));
        }
        if self.max_context_tokens == 0 {
            return Err(RoutingError::config(key, "max_context_tokens must be greater than 0"));
        }
        if !self.cost_per_token.is_finite() || self.cost_per_token < 0.0 {
            return Err(RoutingError::config(
                key,
                format!("cost_per_token must be >= 0, got {}", self.cost_per_token),
            ));
        }
        Ok(())
    }
}

/// One model per tier; all three are always present
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TierModels {
    pub small: ModelConfig,
    pub medium: ModelConfig,
    pub api: ModelConfig,
}

impl TierModels {
    /// Build from a tier-keyed map, requiring every tier
    pub fn from_map(mut models: HashMap<Tier, ModelConfig>) -> RoutingResult<Self> {
        let missing: Vec<&str> = Tier::ALL
            .iter()
            .filter(|tier| !models.contains_key(tier))
            .map(|tier| tier.as_str())
            .collect();
        if !missing.is_empty() {
            return Err(RoutingError::config(
                "models",
                format!("Missing required model tiers: {}", missing.join(", ")),
            ));
        }

        let mut take = |tier: Tier| {
            models
                .remove(&tier)
                .ok_or_else(|| RoutingError::config("models", format!("Missing tier {}", tier)))
        };
        let tiers = Self {
            small: take(Tier::Small)?,
            medium: take(Tier::Medium)?,
            api: take(Tier::Api)?,
        };

        for tier in Tier::ALL {
            tiers.get(tier).validate(tier)?;
        }
        Ok(tiers)
    }

    pub fn get(&self, tier: Tier) -> &ModelConfig {
        match tier {
            Tier::Small => &self.small,
            Tier::Medium => &self.medium,
            Tier::Api => &self.api,
        }
    }

    /// Context-window limit of a tier
    pub fn max_context_tokens(&self, tier: Tier) -> u64 {
        self.get(tier).max_context_tokens
    }
}

/// Threshold values for routing decisions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingThresholds {
    pub small_max_tokens: u64,
    pub medium_context_tokens: u64,
    /// Minimum confidence for a prediction to be accepted
    pub classifier_confidence_min: f64,
}

impl RoutingThresholds {
    fn validate(&self) -> RoutingResult<()> {
        if self.small_max_tokens == 0 {
            return Err(RoutingError::config(
                "thresholds.small_max_tokens",
                "must be greater than 0",
            ));
        }
        if self.medium_context_tokens == 0 {
            return Err(RoutingError::config(
                "thresholds.medium_context_tokens",
                "must be greater than 0",
            ));
        }
        let min = self.classifier_confidence_min;
        if !(0.0..=1.0).contains(&min) {
            return Err(RoutingError::config(
                "thresholds.classifier_confidence_min",
                format!("must be within 0.0..=1.0, got {}", min),
            ));
        }
        Ok(())
    }
}

/// Individual routing rule
///
/// A rule matches when every entry of its condition holds. Rules are
/// evaluated in declaration order and the first match wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingRule {
    pub name: String,
    #[serde(default)]
    pub condition: BTreeMap<String, serde_json::Value>,
    pub route_to: Tier,
}

impl RoutingRule {
    /// Check if this rule matches the given context
    pub fn matches(&self, context: &RoutingContext<'_>) -> bool {
        self.condition
            .iter()
            .all(|(key, expected)| condition_holds(key, expected, context))
    }

    fn validate(&self, index: usize) -> RoutingResult<()> {
        let key = format!("rules[{}]", index);
        if self.name.trim().is_empty() {
            return Err(RoutingError::config(key, "rule name must not be empty"));
        }

        for (cond_key, value) in &self.condition {
            match cond_key.as_str() {
                "risk_level" => {
                    let valid = value
                        .as_str()
                        .map(|level| matches!(level, "low" | "medium" | "high"))
                        .unwrap_or(false);
                    if !valid {
                        return Err(RoutingError::config(
                            format!("{}.condition.risk_level", key),
                            format!("expected one of low, medium, high, got {}", value),
                        ));
                    }
                }
                "min_context_tokens" | "max_tokens" => {
                    let valid = value.as_f64().map(|n| n >= 0.0).unwrap_or(false);
                    if !valid {
                        return Err(RoutingError::config(
                            format!("{}.condition.{}", key, cond_key),
                            format!("expected a non-negative number, got {}", value),
                        ));
                    }
                }
                other if !FEATURE_KEYS.contains(&other) => {
                    tracing::warn!(
                        "Routing rule '{}' tests unknown feature '{}' and will never match",
                        self.name,
                        other
                    );
                }
                _ => {}
            }
        }
        Ok(())
    }
}

fn condition_holds(key: &str, expected: &serde_json::Value, context: &RoutingContext<'_>) -> bool {
    match key {
        "risk_level" => expected.as_str() == Some(context.risk_level.as_str()),
        "min_context_tokens" => expected
            .as_f64()
            .map(|min| context.features.context_length as f64 >= min)
            .unwrap_or(false),
        "max_tokens" => expected
            .as_f64()
            .map(|max| context.features.token_count as f64 <= max)
            .unwrap_or(false),
        feature => context.features.get(feature).as_ref() == Some(expected),
    }
}

/// Core routing policy configuration, as loaded from `routing.yaml`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingPolicyConfig {
    pub thresholds: RoutingThresholds,
    /// Ordered list of routing rules
    #[serde(default)]
    pub rules: Vec<RoutingRule>,
}

impl RoutingPolicyConfig {
    pub fn validate(&self) -> RoutingResult<()> {
        self.thresholds.validate()?;
        for (index, rule) in self.rules.iter().enumerate() {
            rule.validate(index)?;
        }
        Ok(())
    }

    /// First rule whose condition fully matches
    pub fn first_match(&self, context: &RoutingContext<'_>) -> Option<&RoutingRule> {
        self.rules.iter().find(|rule| rule.matches(context))
    }
}

/// Complete, validated router configuration
///
/// Constructed once at start-up and shared behind an `Arc`; never mutated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouterConfig {
    pub models: TierModels,
    pub policy: RoutingPolicyConfig,
}

impl RouterConfig {
    pub fn new(models: TierModels, policy: RoutingPolicyConfig) -> RoutingResult<Self> {
        policy.validate()?;
        Ok(Self { models, policy })
    }

    pub fn thresholds(&self) -> &RoutingThresholds {
        &self.policy.thresholds
    }

    pub fn rules(&self) -> &[RoutingRule] {
        &self.policy.rules
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::RiskLevel;
    use crate::features::{FeatureVector, TaskType};
    use serde_json::json;

    fn model(name: &str, max: u64) -> ModelConfig {
        ModelConfig {
            model_name: name.to_string(),
            max_context_tokens: max,
            cost_per_token: 0.0,
        }
    }

    fn features(token_count: u64, context_length: u64) -> FeatureVector {
        FeatureVector {
            token_count,
            prompt_length: 40,
            task: TaskType::Classification,
            constraint_density: 0.0,
            context_length,
            risk_flag: false,
        }
    }

    fn rule(condition: serde_json::Value, route_to: Tier) -> RoutingRule {
        RoutingRule {
            name: "test".to_string(),
            condition: serde_json::from_value(condition).unwrap(),
            route_to,
        }
    }

    #[test]
    fn test_tier_models_require_every_tier() {
        let mut map = HashMap::new();
        map.insert(Tier::Small, model("tiny", 2048));
        map.insert(Tier::Medium, model("mid", 8192));

        let err = TierModels::from_map(map).unwrap_err();
        assert!(err.to_string().contains("Missing required model tiers: api"));
    }

    #[test]
    fn test_tier_models_reject_zero_context() {
        let mut map = HashMap::new();
        map.insert(Tier::Small, model("tiny", 0));
        map.insert(Tier::Medium, model("mid", 8192));
        map.insert(Tier::Api, model("big", 128000));

        assert!(TierModels::from_map(map).is_err());
    }

    #[test]
    fn test_invalid_route_target_fails_to_parse() {
        let yaml = "name: bad\ncondition: {}\nroute_to: large\n";
        assert!(serde_yaml::from_str::<RoutingRule>(yaml).is_err());
    }

    #[test]
    fn test_threshold_range_is_validated() {
        let policy = RoutingPolicyConfig {
            thresholds: RoutingThresholds {
                small_max_tokens: 500,
                medium_context_tokens: 2000,
                classifier_confidence_min: 1.5,
            },
            rules: vec![],
        };
        assert!(policy.validate().is_err());
    }

    #[test]
    fn test_malformed_condition_value_is_rejected() {
        let policy = RoutingPolicyConfig {
            thresholds: RoutingThresholds {
                small_max_tokens: 500,
                medium_context_tokens: 2000,
                classifier_confidence_min: 0.6,
            },
            rules: vec![rule(json!({"max_tokens": "lots"}), Tier::Small)],
        };
        assert!(policy.validate().is_err());
    }

    #[test]
    fn test_rule_condition_keys() {
        let fv = features(100, 60);
        let ctx = RoutingContext::new(&fv, "Classify this", &[]).with_risk_level(RiskLevel::High);

        assert!(rule(json!({"risk_level": "high"}), Tier::Api).matches(&ctx));
        assert!(!rule(json!({"risk_level": "low"}), Tier::Api).matches(&ctx));
        assert!(rule(json!({"min_context_tokens": 60}), Tier::Api).matches(&ctx));
        assert!(!rule(json!({"min_context_tokens": 61}), Tier::Api).matches(&ctx));
        assert!(rule(json!({"max_tokens": 100}), Tier::Small).matches(&ctx));
        assert!(!rule(json!({"max_tokens": 99}), Tier::Small).matches(&ctx));
        assert!(rule(json!({"task": "classification"}), Tier::Small).matches(&ctx));
        assert!(!rule(json!({"mystery": 1}), Tier::Small).matches(&ctx));
        assert!(rule(json!({}), Tier::Small).matches(&ctx));
    }

    #[test]
    fn test_all_conditions_must_hold() {
        let fv = features(100, 60);
        let ctx = RoutingContext::new(&fv, "Classify this", &[]);
        let r = rule(json!({"task": "classification", "max_tokens": 50}), Tier::Small);
        assert!(!r.matches(&ctx));
    }
}
