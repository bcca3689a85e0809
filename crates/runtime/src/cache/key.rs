//! Canonical cache keys
//!
//! Two requests share a key exactly when they target the same tier and have
//! the same prompt, context and constraints after normalization. The debug
//! flag and any other request field never influence the key.

use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use crate::contracts::Constraints;
use crate::routing::Tier;

/// Lower-case, trim and collapse runs of whitespace into one space
pub fn normalize_text(text: &str) -> String {
    text.to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Normalize every context entry and join them in order
pub fn normalize_context(context: &[String]) -> String {
    context
        .iter()
        .map(|entry| normalize_text(entry))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Constraints as JSON with sorted keys
pub fn canonical_constraints(constraints: &Constraints) -> String {
    let mut fields = BTreeMap::new();
    fields.insert("max_cost_usd", serde_json::json!(constraints.max_cost_usd));
    fields.insert("max_latency_ms", serde_json::json!(constraints.max_latency_ms));
    fields.insert("risk_level", serde_json::json!(constraints.risk_level.as_str()));
    serde_json::Value::Object(
        fields
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect(),
    )
    .to_string()
}

/// SHA-256 of `{tier}:{prompt}:{context}:{constraints}`, lower hex
pub fn cache_key(tier: Tier, prompt: &str, context: &[String], constraints: &Constraints) -> String {
    let material = format!(
        "{}:{}:{}:{}",
        tier,
        normalize_text(prompt),
        normalize_context(context),
        canonical_constraints(constraints)
    );
    hex::encode(Sha256::digest(material.as_bytes()))
}
