//! tiergate runtime
//!
//! Routes natural-language generation requests to one of three inference
//! tiers (`small`, `medium`, `api`) and memoizes responses in a tier-aware
//! cache. The [`routing`] engine is a pure decision function; the
//! [`service`] module wires it to the [`cache`], the [`inference`]
//! executors and [`metrics`].

pub mod cache;
pub mod config;
pub mod contracts;
pub mod features;
pub mod inference;
pub mod metrics;
pub mod routing;
pub mod service;

// Re-export commonly used types
pub use cache::{CacheEntry, CacheError, ResponseCache};
pub use config::{AppConfig, ConfigError};
pub use contracts::{Constraints, GenerateRequest, GenerateResponse, RiskLevel, TokenUsage};
pub use features::{extract_features, FeatureVector, TaskType};
pub use inference::{ExecutorSet, InferenceError, InferenceExecutor, InferenceOutput};
pub use metrics::{MetricsSnapshot, RouterMetrics};
pub use routing::{
    Classifier, DecisionExplanation, RouterConfig, RoutingContext, RoutingEngine, RoutingError,
    RoutingOutcome, Tier,
};
pub use service::{GenerationService, ServiceError};
