//! Heuristic overrides and the legacy fallback policy

use super::decision::{GenerationWeight, HeuristicOverride, Tier};
use crate::contracts::RiskLevel;

/// Context share above which the request goes straight to the API tier
pub const CONTEXT_TOO_LARGE_RATIO: f64 = 0.8;
/// Context share above which heavy generation is sent to the medium tier
pub const HEAVY_CONTEXT_RATIO: f64 = 0.6;
/// Latency budget below which the fallback prefers the medium tier
pub const FALLBACK_LATENCY_MS: u64 = 1000;

const HEAVY_GENERATION_KEYWORDS: &[&str] = &["step by step", "in detail", "explain", "derive"];
const MEDIUM_GENERATION_KEYWORDS: &[&str] = &["summarize", "list", "compare"];

/// Fraction of the input made up by context, 0 for an empty request
pub fn context_dominance_ratio(context_tokens: u64, total_tokens: u64) -> f64 {
    if total_tokens == 0 {
        return 0.0;
    }
    context_tokens as f64 / total_tokens as f64
}

/// Guess how much output the prompt asks for from its wording
pub fn estimated_generation_weight(prompt: &str) -> GenerationWeight {
    let lowered = prompt.to_lowercase();
    if HEAVY_GENERATION_KEYWORDS.iter().any(|k| lowered.contains(k)) {
        GenerationWeight::Heavy
    } else if MEDIUM_GENERATION_KEYWORDS.iter().any(|k| lowered.contains(k)) {
        GenerationWeight::Medium
    } else {
        GenerationWeight::Light
    }
}

/// Heuristic override for the given context ratio and weight, if any
pub fn heuristic_override(
    context_ratio: f64,
    weight: GenerationWeight,
) -> Option<(HeuristicOverride, Tier)> {
    if context_ratio > CONTEXT_TOO_LARGE_RATIO {
        Some((HeuristicOverride::ContextTooLarge, Tier::Api))
    } else if context_ratio > HEAVY_CONTEXT_RATIO && weight == GenerationWeight::Heavy {
        Some((HeuristicOverride::HeavyContextGeneration, Tier::Medium))
    } else {
        None
    }
}

/// Tier chosen when no classifier prediction is available
pub fn apply_fallback(risk_level: RiskLevel, max_latency_ms: u64) -> Tier {
    if risk_level == RiskLevel::High {
        Tier::Api
    } else if max_latency_ms < FALLBACK_LATENCY_MS {
        Tier::Medium
    } else {
        Tier::Api
    }
}
