//! Request and response contracts for the generation pipeline
//!
//! These types describe the payload a transport layer hands to
//! [`GenerationService`](crate::service::GenerationService) and the payload it
//! gets back. Defaults match the documented inbound contract.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::routing::{DecisionExplanation, Tier};

/// Declared risk of a request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    #[default]
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(RiskLevel::Low),
            "medium" => Ok(RiskLevel::Medium),
            "high" => Ok(RiskLevel::High),
            other => Err(format!(
                "unknown risk level '{}', expected one of: low, medium, high",
                other
            )),
        }
    }
}

/// Routing and inference constraints declared by the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constraints {
    /// Latency budget in milliseconds, consumed as routing input only
    #[serde(default = "default_max_latency_ms")]
    pub max_latency_ms: u64,
    /// Cost ceiling in USD
    #[serde(default = "default_max_cost_usd")]
    pub max_cost_usd: f64,
    #[serde(default)]
    pub risk_level: RiskLevel,
}

fn default_max_latency_ms() -> u64 {
    2000
}

fn default_max_cost_usd() -> f64 {
    0.01
}

impl Default for Constraints {
    fn default() -> Self {
        Self {
            max_latency_ms: default_max_latency_ms(),
            max_cost_usd: default_max_cost_usd(),
            risk_level: RiskLevel::Low,
        }
    }
}

impl Constraints {
    pub fn with_risk_level(mut self, risk_level: RiskLevel) -> Self {
        self.risk_level = risk_level;
        self
    }

    pub fn with_max_latency_ms(mut self, max_latency_ms: u64) -> Self {
        self.max_latency_ms = max_latency_ms;
        self
    }

    pub fn with_max_cost_usd(mut self, max_cost_usd: f64) -> Self {
        self.max_cost_usd = max_cost_usd;
        self
    }
}

/// A request field that violates the inbound contract
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid request field {field}: {reason}")]
pub struct ValidationError {
    pub field: String,
    pub reason: String,
}

impl ValidationError {
    fn new(field: &str, reason: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

/// Inbound generation request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub prompt: String,
    /// Ordered context entries; order is significant
    #[serde(default)]
    pub context: Vec<String>,
    #[serde(default)]
    pub constraints: Constraints,
    /// Attach the routing explanation to the response
    #[serde(default)]
    pub debug: bool,
}

impl GenerateRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            context: Vec::new(),
            constraints: Constraints::default(),
            debug: false,
        }
    }

    pub fn with_context(mut self, context: Vec<String>) -> Self {
        self.context = context;
        self
    }

    pub fn with_constraints(mut self, constraints: Constraints) -> Self {
        self.constraints = constraints;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Check the request against the inbound contract
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.prompt.trim().is_empty() {
            return Err(ValidationError::new("prompt", "must not be empty"));
        }
        let cost = self.constraints.max_cost_usd;
        if !cost.is_finite() || cost < 0.0 {
            return Err(ValidationError::new(
                "constraints.max_cost_usd",
                format!("must be a non-negative number, got {}", cost),
            ));
        }
        Ok(())
    }
}

/// Token usage reported for a response
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input: u64,
    pub output: u64,
}

/// Outbound generation response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub response: String,
    pub model_used: Tier,
    pub tokens_used: TokenUsage,
    pub estimated_cost_usd: f64,
    pub cache_hit: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug: Option<DecisionExplanation>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_defaults_from_minimal_json() {
        let request: GenerateRequest =
            serde_json::from_str(r#"{"prompt": "Classify this email as spam"}"#).unwrap();

        assert!(request.context.is_empty());
        assert!(!request.debug);
        assert_eq!(request.constraints.max_latency_ms, 2000);
        assert_eq!(request.constraints.max_cost_usd, 0.01);
        assert_eq!(request.constraints.risk_level, RiskLevel::Low);
    }

    #[test]
    fn test_risk_level_parsing() {
        assert_eq!("HIGH".parse::<RiskLevel>().unwrap(), RiskLevel::High);
        assert_eq!(" medium ".parse::<RiskLevel>().unwrap(), RiskLevel::Medium);
        assert!("critical".parse::<RiskLevel>().is_err());
    }

    #[test]
    fn test_validate_rejects_blank_prompt() {
        let err = GenerateRequest::new("   ").validate().unwrap_err();
        assert_eq!(err.field, "prompt");
    }

    #[test]
    fn test_validate_rejects_negative_cost() {
        let request = GenerateRequest::new("hello")
            .with_constraints(Constraints::default().with_max_cost_usd(-1.0));
        let err = request.validate().unwrap_err();
        assert_eq!(err.field, "constraints.max_cost_usd");
    }

    #[test]
    fn test_response_omits_debug_when_absent() {
        let response = GenerateResponse {
            response: "ok".to_string(),
            model_used: Tier::Small,
            tokens_used: TokenUsage { input: 3, output: 5 },
            estimated_cost_usd: 0.0,
            cache_hit: false,
            debug: None,
        };
        let json = serde_json::to_value(&response).unwrap();
        assert!(json.get("debug").is_none());
        assert_eq!(json["model_used"], "small");
    }
}
