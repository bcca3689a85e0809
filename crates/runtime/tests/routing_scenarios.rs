//! End-to-end routing decisions against a realistic configuration directory

use std::fs;

use tiergate_runtime::config::AppConfig;
use tiergate_runtime::features::{extract_features, FeatureVector};
use tiergate_runtime::routing::{
    Classifier, ContextWarning, DecisionStage, HeuristicOverride, Prediction, RoutingContext,
    RoutingEngine, RoutingError, RoutingOutcome, RoutingResult, StubClassifier, Tier,
};
use tiergate_runtime::{Constraints, RiskLevel, TaskType};

const MODELS: &str = r#"
models:
  small:
    model_name: phi-3-mini-4k-instruct
    max_context_tokens: 4096
    cost_per_token: 0.0
  medium:
    model_name: llama-3.1-8b-instruct
    max_context_tokens: 8192
    cost_per_token: 0.0000002
  api:
    model_name: gpt-4o-mini
    max_context_tokens: 128000
    cost_per_token: 0.000002
"#;

const ROUTING: &str = r#"
thresholds:
  small_max_tokens: 500
  medium_context_tokens: 2000
  classifier_confidence_min: 0.6
rules:
  - name: high_risk_to_api
    condition:
      risk_level: high
    route_to: api
  - name: large_context_to_medium
    condition:
      min_context_tokens: 2000
    route_to: medium
  - name: short_classification_to_small
    condition:
      task: classification
      max_tokens: 200
    route_to: small
"#;

struct FailingClassifier;

impl Classifier for FailingClassifier {
    fn name(&self) -> &str {
        "failing"
    }

    fn predict(&self, _features: &FeatureVector, _prompt: &str) -> RoutingResult<Prediction> {
        Err(RoutingError::ClassifierUnavailable {
            reason: "weights not loaded".to_string(),
        })
    }
}

struct FixedClassifier(TaskType, f64);

impl Classifier for FixedClassifier {
    fn name(&self) -> &str {
        "fixed"
    }

    fn predict(&self, _features: &FeatureVector, _prompt: &str) -> RoutingResult<Prediction> {
        Prediction::new(self.0, self.1)
    }
}

fn engine() -> RoutingEngine {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("models.yaml"), MODELS).unwrap();
    fs::write(dir.path().join("routing.yaml"), ROUTING).unwrap();
    let config = AppConfig::load_dir(dir.path()).unwrap();
    RoutingEngine::new(config.router)
}

fn route(
    prompt: &str,
    context: &[String],
    risk: RiskLevel,
    max_latency_ms: u64,
    classifier: &dyn Classifier,
) -> RoutingOutcome {
    let constraints = Constraints::default()
        .with_risk_level(risk)
        .with_max_latency_ms(max_latency_ms);
    let features = extract_features(prompt, context, &constraints);
    let ctx = RoutingContext::new(&features, prompt, context)
        .with_risk_level(risk)
        .with_max_latency_ms(max_latency_ms);
    engine().decide(&ctx, classifier)
}

fn transcript(words: usize) -> Vec<String> {
    vec!["word ".repeat(words)]
}

#[test]
fn short_classification_hits_small_rule() {
    let outcome = route(
        "Classify sentiment: I am feeling great today!",
        &[],
        RiskLevel::Low,
        2000,
        &StubClassifier,
    );

    assert_eq!(outcome.tier, Tier::Small);
    assert_eq!(outcome.stage, DecisionStage::StaticRule);
    assert_eq!(
        outcome.explanation.static_rule.as_ref().unwrap().rule_name,
        "short_classification_to_small"
    );

    let window = &outcome.explanation.context_window;
    assert_eq!(window.estimated_output_tokens, 58);
    assert_eq!(window.total_tokens, 65);
    assert_eq!(window.max_allowed, 4096);
    assert!(!window.overflow);
    assert!(window.escalated_from.is_none());
}

#[test]
fn high_risk_goes_to_api_before_any_other_stage() {
    let outcome = route(
        "Classify sentiment: fine",
        &[],
        RiskLevel::High,
        2000,
        &FailingClassifier,
    );

    assert_eq!(outcome.tier, Tier::Api);
    assert_eq!(outcome.stage, DecisionStage::StaticRule);
    assert!(outcome.explanation.heuristics.is_none());
    assert!(outcome.explanation.classifier.is_none());
    assert!(outcome.explanation.fallback.is_none());
}

#[test]
fn unconfident_classifier_escalates_to_api() {
    let outcome = route(
        "Write a haiku about autumn",
        &[],
        RiskLevel::Low,
        2000,
        &StubClassifier,
    );

    assert_eq!(outcome.tier, Tier::Api);
    assert_eq!(outcome.stage, DecisionStage::Classifier);
    let heuristics = outcome.explanation.heuristics.as_ref().unwrap();
    assert_eq!(heuristics.context_ratio, 0.0);
    assert!(heuristics.override_reason.is_none());
    assert_eq!(outcome.explanation.context_window.total_tokens, 117);
}

#[test]
fn confident_reasoning_goes_to_medium() {
    let outcome = route(
        "Why does ice float on water",
        &[],
        RiskLevel::Low,
        2000,
        &FixedClassifier(TaskType::Reasoning, 0.81),
    );

    assert_eq!(outcome.tier, Tier::Medium);
    assert_eq!(outcome.stage, DecisionStage::Classifier);
}

#[test]
fn large_context_fits_medium_window() {
    let context = transcript(2500);
    let outcome = route("Summarize the discussion", &context, RiskLevel::Low, 2000, &StubClassifier);

    assert_eq!(outcome.tier, Tier::Medium);
    assert_eq!(outcome.stage, DecisionStage::StaticRule);
    let window = &outcome.explanation.context_window;
    assert_eq!(window.total_tokens, 2503 + 2500 + 357);
    assert!(!window.overflow);
}

#[test]
fn oversized_context_escalates_from_medium_to_api() {
    let context = transcript(5000);
    let outcome = route("Summarize the discussion", &context, RiskLevel::Low, 2000, &StubClassifier);

    assert_eq!(outcome.proposed_tier, Tier::Medium);
    assert_eq!(outcome.tier, Tier::Api);
    assert!(outcome.was_escalated());

    let window = &outcome.explanation.context_window;
    assert_eq!(window.total_tokens, 10610);
    assert_eq!(window.max_allowed, 128000);
    assert!(window.overflow);
    assert_eq!(window.escalated_from, Some(Tier::Medium));
    assert!(window.warning.is_none());
}

#[test]
fn request_beyond_api_window_stays_on_api_with_warning() {
    let context = transcript(70000);
    let outcome = route("Summarize the discussion", &context, RiskLevel::Low, 2000, &StubClassifier);

    assert_eq!(outcome.tier, Tier::Api);
    let window = &outcome.explanation.context_window;
    assert_eq!(window.total_tokens, 147110);
    assert_eq!(window.max_allowed, 128000);
    assert_eq!(window.escalated_from, Some(Tier::Medium));
    assert_eq!(window.warning, Some(ContextWarning::ApiContextLimitExceeded));
}

#[test]
fn heavy_generation_over_context_prefers_medium() {
    // 7 prompt words against 13 context words
    let context = vec!["a b c d e f g h i j k l m".to_string()];
    let outcome = route(
        "Explain in detail what this code does",
        &context,
        RiskLevel::Low,
        2000,
        &StubClassifier,
    );

    assert_eq!(outcome.tier, Tier::Medium);
    assert_eq!(outcome.stage, DecisionStage::Heuristic);
    assert_eq!(
        outcome.explanation.heuristics.unwrap().override_reason,
        Some(HeuristicOverride::HeavyContextGeneration)
    );
}

#[test]
fn classifier_failure_uses_latency_budget() {
    let fast = route("Write a haiku", &[], RiskLevel::Low, 500, &FailingClassifier);
    assert_eq!(fast.tier, Tier::Medium);
    assert_eq!(fast.stage, DecisionStage::Fallback);
    let fallback = fast.explanation.fallback.as_ref().unwrap();
    assert!(fallback.reason.contains("weights not loaded"));

    let relaxed = route("Write a haiku", &[], RiskLevel::Low, 2000, &FailingClassifier);
    assert_eq!(relaxed.tier, Tier::Api);
    assert_eq!(relaxed.stage, DecisionStage::Fallback);
}

#[test]
fn decisions_are_repeatable() {
    let context = transcript(300);
    let first = route("Draft a reply to this thread", &context, RiskLevel::Medium, 1500, &StubClassifier);
    let second = route("Draft a reply to this thread", &context, RiskLevel::Medium, 1500, &StubClassifier);
    assert_eq!(first, second);
}

#[test]
fn explanation_json_marks_skipped_stages_null() {
    let outcome = route(
        "Write a haiku about autumn",
        &[],
        RiskLevel::Low,
        2000,
        &StubClassifier,
    );
    let json = serde_json::to_value(&outcome.explanation).unwrap();

    assert!(json["static_rule"].is_null());
    assert!(json["fallback"].is_null());
    assert!(json["heuristics"].get("override").is_none());
    assert_eq!(json["classifier"]["confidence_band"], "low_uncertainty");
    assert_eq!(json["classifier"]["predicted_task"], "generation");
    assert!(json["context_window"].get("warning").is_none());
}
