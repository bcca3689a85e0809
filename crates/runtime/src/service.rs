//! Request pipeline: validate, route, consult the cache, run inference
//!
//! Cache failures never fail a request; they are logged, counted and treated
//! as a miss (on lookup) or dropped (on store).

use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

use crate::cache::{CacheEntry, ResponseCache};
use crate::config::AppConfig;
use crate::contracts::{GenerateRequest, GenerateResponse, TokenUsage, ValidationError};
use crate::features::extract_features;
use crate::inference::{ExecutorSet, InferenceError};
use crate::metrics::RouterMetrics;
use crate::routing::{load_classifier, Classifier, ContextWarning, RoutingContext, RoutingEngine, RoutingOutcome};

/// Errors returned to the caller of the pipeline
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    InvalidRequest(#[from] ValidationError),

    #[error(transparent)]
    Inference(#[from] InferenceError),
}

/// Generation pipeline shared by all requests
pub struct GenerationService {
    engine: RoutingEngine,
    classifier: Arc<dyn Classifier>,
    cache: ResponseCache,
    executors: ExecutorSet,
    metrics: Arc<RouterMetrics>,
}

impl GenerationService {
    pub fn new(
        engine: RoutingEngine,
        classifier: Arc<dyn Classifier>,
        cache: ResponseCache,
        executors: ExecutorSet,
    ) -> Self {
        Self {
            engine,
            classifier,
            cache,
            executors,
            metrics: Arc::new(RouterMetrics::new()),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<RouterMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Assemble the service described by a loaded configuration
    pub async fn from_config(config: &AppConfig) -> Result<Self, ServiceError> {
        let engine = RoutingEngine::new(config.router.clone());
        let classifier = load_classifier(config.service.classifier.model_path.as_deref());
        let cache = ResponseCache::from_config(&config.service.cache).await;
        let executors = ExecutorSet::from_config(&config.service.executors, &config.router.models);

        tracing::info!(
            "Generation service ready: classifier={} cache={}",
            classifier.name(),
            cache.backend_name()
        );
        Ok(Self::new(engine, classifier, cache, executors))
    }

    pub fn metrics(&self) -> &Arc<RouterMetrics> {
        &self.metrics
    }

    pub fn engine(&self) -> &RoutingEngine {
        &self.engine
    }

    /// Validate a request and decide its tier without running inference
    pub fn route(&self, request: &GenerateRequest) -> Result<RoutingOutcome, ServiceError> {
        request.validate()?;
        Ok(self.decide(request))
    }

    fn decide(&self, request: &GenerateRequest) -> RoutingOutcome {
        let features = extract_features(&request.prompt, &request.context, &request.constraints);
        let ctx = RoutingContext::new(&features, &request.prompt, &request.context)
            .with_risk_level(request.constraints.risk_level)
            .with_max_latency_ms(request.constraints.max_latency_ms);
        let outcome = self.engine.decide(&ctx, self.classifier.as_ref());

        let limit_exceeded = outcome.explanation.context_window.warning
            == Some(ContextWarning::ApiContextLimitExceeded);
        self.metrics
            .record_decision(outcome.tier, outcome.stage, outcome.was_escalated(), limit_exceeded);
        outcome
    }

    /// Serve a generation request end to end
    pub async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse, ServiceError> {
        request.validate()?;
        let outcome = self.decide(&request);
        let tier = outcome.tier;
        let debug = request.debug.then(|| outcome.explanation.clone());

        let cached = match self
            .cache
            .lookup(tier, &request.prompt, &request.context, &request.constraints)
            .await
        {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("Cache lookup failed, treating as miss: {}", e);
                self.metrics.record_cache_error();
                None
            }
        };

        if let Some(entry) = cached {
            self.metrics.record_cache_hit(tier);
            return Ok(GenerateResponse {
                response: entry.response,
                model_used: tier,
                tokens_used: TokenUsage {
                    input: entry.input_tokens,
                    output: entry.output_tokens,
                },
                estimated_cost_usd: entry.cost,
                cache_hit: true,
                debug,
            });
        }
        self.metrics.record_cache_miss();

        let executor = self.executors.get(tier)?;
        let start = Instant::now();
        let output = match executor.execute(&request.prompt, &request.context).await {
            Ok(output) => output,
            Err(e) => {
                tracing::warn!("Inference on tier {} failed: {}", tier, e);
                self.metrics.record_inference_failure(tier);
                return Err(e.into());
            }
        };
        self.metrics.record_inference(tier, start.elapsed());
        self.metrics
            .record_usage(tier, output.input_tokens, output.output_tokens, output.cost_usd);

        let entry = CacheEntry::new(
            output.text,
            output.input_tokens,
            output.output_tokens,
            output.cost_usd,
        );
        if let Err(e) = self
            .cache
            .store(tier, &request.prompt, &request.context, &request.constraints, &entry)
            .await
        {
            tracing::warn!("Cache write failed: {}", e);
            self.metrics.record_cache_error();
        }

        Ok(GenerateResponse {
            response: entry.response,
            model_used: tier,
            tokens_used: TokenUsage {
                input: entry.input_tokens,
                output: entry.output_tokens,
            },
            estimated_cost_usd: entry.cost,
            cache_hit: false,
            debug,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::{
        ModelConfig, RouterConfig, RoutingPolicyConfig, RoutingThresholds, StubClassifier, Tier,
        TierModels,
    };
    use std::collections::HashMap;

    fn engine() -> RoutingEngine {
        let models: HashMap<Tier, ModelConfig> = Tier::ALL
            .into_iter()
            .map(|tier| {
                (
                    tier,
                    ModelConfig {
                        model_name: tier.to_string(),
                        max_context_tokens: 4096,
                        cost_per_token: 0.0,
                    },
                )
            })
            .collect();
        let policy = RoutingPolicyConfig {
            thresholds: RoutingThresholds {
                small_max_tokens: 500,
                medium_context_tokens: 2000,
                classifier_confidence_min: 0.6,
            },
            rules: vec![],
        };
        let config = RouterConfig::new(TierModels::from_map(models).unwrap(), policy).unwrap();
        RoutingEngine::new(Arc::new(config))
    }

    fn service(executors: ExecutorSet) -> GenerationService {
        GenerationService::new(
            engine(),
            Arc::new(StubClassifier),
            ResponseCache::memory(100),
            executors,
        )
    }

    #[tokio::test]
    async fn test_blank_prompt_is_rejected() {
        let err = service(ExecutorSet::stubs())
            .generate(GenerateRequest::new("  "))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_missing_executor_propagates() {
        let err = service(ExecutorSet::new())
            .generate(GenerateRequest::new("Write a haiku"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Inference(InferenceError::MissingExecutor { tier: Tier::Api })
        ));
    }

    #[tokio::test]
    async fn test_debug_flag_controls_explanation() {
        let svc = service(ExecutorSet::stubs());
        let plain = svc.generate(GenerateRequest::new("Write a haiku")).await.unwrap();
        assert!(plain.debug.is_none());

        let debug = svc
            .generate(GenerateRequest::new("Write a haiku").with_debug(true))
            .await
            .unwrap();
        assert!(debug.debug.is_some());
        assert!(debug.cache_hit);
    }

    #[test]
    fn test_route_records_decision() {
        let svc = service(ExecutorSet::stubs());
        let outcome = svc.route(&GenerateRequest::new("Write a haiku")).unwrap();
        assert_eq!(outcome.tier, Tier::Api);
        assert_eq!(svc.metrics().snapshot().tiers[&Tier::Api].requests, 1);
    }
}
