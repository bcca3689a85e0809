//! Routing decision types and structures

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use super::confidence::{ConfidenceBand, ConfidenceDecision};
use crate::contracts::RiskLevel;
use crate::features::{FeatureVector, TaskType};

/// Inference tier, ordered by capability and cost
///
/// Escalation only ever moves towards [`Tier::Api`], which is the ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Small,
    Medium,
    Api,
}

impl Tier {
    /// Every tier, cheapest first
    pub const ALL: [Tier; 3] = [Tier::Small, Tier::Medium, Tier::Api];

    /// The next tier up the ladder, `None` at the ceiling
    pub fn next(self) -> Option<Tier> {
        match self {
            Tier::Small => Some(Tier::Medium),
            Tier::Medium => Some(Tier::Api),
            Tier::Api => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Small => "small",
            Tier::Medium => "medium",
            Tier::Api => "api",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "small" => Ok(Tier::Small),
            "medium" => Ok(Tier::Medium),
            "api" => Ok(Tier::Api),
            other => Err(format!(
                "invalid tier '{}', must be one of: small, medium, api",
                other
            )),
        }
    }
}

/// Context for routing decisions
#[derive(Debug, Clone, Copy)]
pub struct RoutingContext<'a> {
    pub features: &'a FeatureVector,
    pub prompt: &'a str,
    pub context: &'a [String],
    pub risk_level: RiskLevel,
    /// Latency budget, consulted only by the fallback policy
    pub max_latency_ms: u64,
}

impl<'a> RoutingContext<'a> {
    pub fn new(features: &'a FeatureVector, prompt: &'a str, context: &'a [String]) -> Self {
        Self {
            features,
            prompt,
            context,
            risk_level: RiskLevel::Low,
            max_latency_ms: 2000,
        }
    }

    pub fn with_risk_level(mut self, risk_level: RiskLevel) -> Self {
        self.risk_level = risk_level;
        self
    }

    pub fn with_max_latency_ms(mut self, max_latency_ms: u64) -> Self {
        self.max_latency_ms = max_latency_ms;
        self
    }
}

/// Stage of the pipeline that proposed the tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionStage {
    StaticRule,
    Heuristic,
    Classifier,
    Fallback,
}

impl DecisionStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionStage::StaticRule => "static_rule",
            DecisionStage::Heuristic => "heuristic",
            DecisionStage::Classifier => "classifier",
            DecisionStage::Fallback => "fallback",
        }
    }
}

/// Static rule that matched the request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticRuleMatch {
    pub rule_name: String,
    pub matched_condition: BTreeMap<String, serde_json::Value>,
    pub route_to: Tier,
}

/// Expected output volume inferred from prompt wording
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationWeight {
    Light,
    Medium,
    Heavy,
}

/// Heuristic that replaced the classifier path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeuristicOverride {
    ContextTooLarge,
    HeavyContextGeneration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeuristicsReport {
    /// Context share of the input, rounded to two decimals
    pub context_ratio: f64,
    pub generation_weight: GenerationWeight,
    #[serde(rename = "override", default, skip_serializing_if = "Option::is_none")]
    pub override_reason: Option<HeuristicOverride>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierReport {
    pub predicted_task: TaskType,
    /// Rounded to two decimals
    pub confidence: f64,
    pub confidence_band: ConfidenceBand,
    pub threshold_decision: ConfidenceDecision,
}

/// Legacy policy applied when the classifier could not produce a prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackReport {
    pub reason: String,
    pub risk_level: RiskLevel,
    pub max_latency_ms: u64,
    pub route_to: Tier,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextWarning {
    ApiContextLimitExceeded,
}

/// Context-window audit, present on every decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextWindowReport {
    pub total_tokens: u64,
    pub max_allowed: u64,
    pub overflow: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalated_from: Option<Tier>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<ContextWarning>,
    pub estimated_output_tokens: u64,
}

/// Structured record of how a tier was chosen
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionExplanation {
    pub static_rule: Option<StaticRuleMatch>,
    pub heuristics: Option<HeuristicsReport>,
    pub classifier: Option<ClassifierReport>,
    pub fallback: Option<FallbackReport>,
    pub context_window: ContextWindowReport,
}

/// Final routing outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingOutcome {
    pub tier: Tier,
    /// Tier proposed before context-window safety ran
    pub proposed_tier: Tier,
    pub stage: DecisionStage,
    pub explanation: DecisionExplanation,
}

impl RoutingOutcome {
    /// Whether context-window safety moved the request up the ladder
    pub fn was_escalated(&self) -> bool {
        self.tier != self.proposed_tier
    }
}

/// Round to two decimals for reporting
pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
