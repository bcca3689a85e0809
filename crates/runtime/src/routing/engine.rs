//! Core routing engine implementation
//!
//! A decision runs up to three proposal stages (static rules, heuristic
//! overrides, then the classifier or the fallback policy when the classifier
//! fails) and always finishes with context-window safety, which may move the
//! proposed tier up the ladder.

use std::sync::Arc;

use super::classifier::Classifier;
use super::confidence::{evaluate_confidence, tier_for_prediction, ConfidenceBand};
use super::config::RouterConfig;
use super::decision::{
    round2, ClassifierReport, ContextWarning, ContextWindowReport, DecisionExplanation,
    DecisionStage, FallbackReport, HeuristicsReport, RoutingContext, RoutingOutcome,
    StaticRuleMatch, Tier,
};
use super::policy::{
    apply_fallback, context_dominance_ratio, estimated_generation_weight, heuristic_override,
};
use crate::features::estimate_output_tokens;

/// Tier proposed by one of the stages, with everything recorded on the way
#[derive(Debug, Default)]
struct Proposal {
    tier: Option<(Tier, DecisionStage)>,
    static_rule: Option<StaticRuleMatch>,
    heuristics: Option<HeuristicsReport>,
    classifier: Option<ClassifierReport>,
    fallback: Option<FallbackReport>,
}

/// Routing decision engine
///
/// Stateless apart from its shared configuration; a single instance can
/// serve concurrent requests.
#[derive(Debug, Clone)]
pub struct RoutingEngine {
    config: Arc<RouterConfig>,
}

impl RoutingEngine {
    pub fn new(config: Arc<RouterConfig>) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Decide the tier for a request. Never fails.
    pub fn decide(&self, context: &RoutingContext<'_>, classifier: &dyn Classifier) -> RoutingOutcome {
        let proposal = self.propose(context, classifier);

        // The classifier or fallback path always sets a tier
        let (proposed_tier, stage) = proposal
            .tier
            .unwrap_or((Tier::Api, DecisionStage::Fallback));
        let (tier, context_window) = self.enforce_context_window(proposed_tier, context);

        tracing::debug!(
            "Routed request to {} via {} (proposed {}, total_tokens={})",
            tier,
            stage.as_str(),
            proposed_tier,
            context_window.total_tokens
        );

        RoutingOutcome {
            tier,
            proposed_tier,
            stage,
            explanation: DecisionExplanation {
                static_rule: proposal.static_rule,
                heuristics: proposal.heuristics,
                classifier: proposal.classifier,
                fallback: proposal.fallback,
                context_window,
            },
        }
    }

    fn propose(&self, context: &RoutingContext<'_>, classifier: &dyn Classifier) -> Proposal {
        let mut proposal = Proposal::default();

        if let Some(rule) = self.config.policy.first_match(context) {
            proposal.static_rule = Some(StaticRuleMatch {
                rule_name: rule.name.clone(),
                matched_condition: rule.condition.clone(),
                route_to: rule.route_to,
            });
            proposal.tier = Some((rule.route_to, DecisionStage::StaticRule));
            return proposal;
        }

        let features = context.features;
        let ratio = context_dominance_ratio(features.context_length, features.token_count);
        let weight = estimated_generation_weight(context.prompt);
        let override_tier = heuristic_override(ratio, weight);
        proposal.heuristics = Some(HeuristicsReport {
            context_ratio: round2(ratio),
            generation_weight: weight,
            override_reason: override_tier.map(|(reason, _)| reason),
        });
        if let Some((_, tier)) = override_tier {
            proposal.tier = Some((tier, DecisionStage::Heuristic));
            return proposal;
        }

        match classifier.predict(features, context.prompt) {
            Ok(prediction) => {
                let tier = tier_for_prediction(&prediction, context.risk_level);
                proposal.classifier = Some(ClassifierReport {
                    predicted_task: prediction.predicted_task(),
                    confidence: round2(prediction.confidence()),
                    confidence_band: ConfidenceBand::from_confidence(prediction.confidence()),
                    threshold_decision: evaluate_confidence(&prediction, self.config.thresholds()),
                });
                proposal.tier = Some((tier, DecisionStage::Classifier));
            }
            Err(e) => {
                e.report(&format!(
                    "Classifier '{}' failed, applying fallback policy",
                    classifier.name()
                ));
                let tier = apply_fallback(context.risk_level, context.max_latency_ms);
                proposal.fallback = Some(FallbackReport {
                    reason: e.to_string(),
                    risk_level: context.risk_level,
                    max_latency_ms: context.max_latency_ms,
                    route_to: tier,
                });
                proposal.tier = Some((tier, DecisionStage::Fallback));
            }
        }

        proposal
    }

    /// Escalate until the request fits the tier's context window.
    ///
    /// Walks at most the length of the ladder; a request that does not fit
    /// the API tier stays there with a warning.
    fn enforce_context_window(
        &self,
        proposed: Tier,
        context: &RoutingContext<'_>,
    ) -> (Tier, ContextWindowReport) {
        let features = context.features;
        // Keyword-detected task, whichever stage proposed the tier
        let estimated_output_tokens =
            estimate_output_tokens(context.prompt, context.context, features.task);
        let total_tokens = features.token_count + features.context_length + estimated_output_tokens;

        let mut tier = proposed;
        let mut overflow = false;
        loop {
            let max_allowed = self.config.models.max_context_tokens(tier);
            if total_tokens <= max_allowed {
                let report = ContextWindowReport {
                    total_tokens,
                    max_allowed,
                    overflow,
                    escalated_from: overflow.then_some(proposed),
                    warning: None,
                    estimated_output_tokens,
                };
                return (tier, report);
            }

            overflow = true;
            match tier.next() {
                Some(next) => tier = next,
                None => {
                    tracing::warn!(
                        "Request needs {} tokens, above the API tier limit of {}",
                        total_tokens,
                        max_allowed
                    );
                    let report = ContextWindowReport {
                        total_tokens,
                        max_allowed,
                        overflow,
                        escalated_from: Some(proposed),
                        warning: Some(ContextWarning::ApiContextLimitExceeded),
                        estimated_output_tokens,
                    };
                    return (Tier::Api, report);
                }
            }
        }
    }
}
