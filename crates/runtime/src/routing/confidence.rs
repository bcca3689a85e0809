//! Confidence bands and threshold evaluation for classifier predictions

use serde::{Deserialize, Serialize};

use super::classifier::Prediction;
use super::config::RoutingThresholds;
use super::decision::Tier;
use crate::contracts::RiskLevel;
use crate::features::TaskType;

/// Lower bound of the high-confidence band
pub const HIGH_CONFIDENCE: f64 = 0.70;
/// Lower bound of the medium-confidence band
pub const MEDIUM_CONFIDENCE: f64 = 0.45;

/// Band a prediction's confidence falls into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceBand {
    HighConfidence,
    MediumUncertainty,
    LowUncertainty,
}

impl ConfidenceBand {
    pub fn from_confidence(confidence: f64) -> Self {
        if confidence >= HIGH_CONFIDENCE {
            ConfidenceBand::HighConfidence
        } else if confidence >= MEDIUM_CONFIDENCE {
            ConfidenceBand::MediumUncertainty
        } else {
            ConfidenceBand::LowUncertainty
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceBand::HighConfidence => "high_confidence",
            ConfidenceBand::MediumUncertainty => "medium_uncertainty",
            ConfidenceBand::LowUncertainty => "low_uncertainty",
        }
    }
}

/// Whether a prediction clears the configured minimum confidence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceDecision {
    Accept,
    Escalate,
}

/// Compare a prediction against `classifier_confidence_min`
pub fn evaluate_confidence(
    prediction: &Prediction,
    thresholds: &RoutingThresholds,
) -> ConfidenceDecision {
    if prediction.confidence() >= thresholds.classifier_confidence_min {
        ConfidenceDecision::Accept
    } else {
        ConfidenceDecision::Escalate
    }
}

/// Tier implied by a prediction's band.
///
/// In the high band a high-risk request always goes to the API tier;
/// otherwise the predicted task picks the tier.
pub fn tier_for_prediction(prediction: &Prediction, risk_level: RiskLevel) -> Tier {
    match ConfidenceBand::from_confidence(prediction.confidence()) {
        ConfidenceBand::HighConfidence => {
            if risk_level == RiskLevel::High {
                return Tier::Api;
            }
            match prediction.predicted_task() {
                TaskType::Classification => Tier::Small,
                TaskType::Reasoning => Tier::Medium,
                TaskType::Generation => Tier::Small,
            }
        }
        ConfidenceBand::MediumUncertainty => Tier::Medium,
        ConfidenceBand::LowUncertainty => Tier::Api,
    }
}
