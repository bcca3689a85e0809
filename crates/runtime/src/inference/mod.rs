//! Inference executors, one per tier
//!
//! Executors are only invoked on a cache miss. They do not retry and enforce
//! their own timeouts.

pub mod local;
pub mod remote;
pub mod stub;

pub use local::LocalProcessExecutor;
pub use remote::RemoteApiExecutor;
pub use stub::StubExecutor;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

use crate::config::{ExecutorConfig, ExecutorsConfig};
use crate::routing::{Tier, TierModels};

/// Errors raised while running inference
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("Inference timed out after {seconds} seconds")]
    Timeout { seconds: u64 },

    #[error("Inference execution failed: {reason}")]
    ExecutionFailed { reason: String },

    #[error("Inference backend returned {status}: {message}")]
    BackendError { status: u16, message: String },

    #[error("Malformed inference response: {reason}")]
    MalformedResponse { reason: String },

    #[error("Executor not configured: {reason}")]
    NotConfigured { reason: String },

    #[error("No executor registered for tier {tier}")]
    MissingExecutor { tier: Tier },
}

/// Result of one inference call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceOutput {
    pub text: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost_usd: f64,
}

/// Runs a prompt against one model
#[async_trait]
pub trait InferenceExecutor: Send + Sync {
    fn name(&self) -> &str;

    async fn execute(&self, prompt: &str, context: &[String]) -> Result<InferenceOutput, InferenceError>;
}

/// Whitespace word count, used where the backend reports no usage
pub(crate) fn word_count(text: &str) -> u64 {
    text.split_whitespace().count() as u64
}

/// Stands in for an executor that could not be built
#[derive(Debug, Clone)]
pub struct UnconfiguredExecutor {
    reason: String,
}

impl UnconfiguredExecutor {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl InferenceExecutor for UnconfiguredExecutor {
    fn name(&self) -> &str {
        "unconfigured"
    }

    async fn execute(&self, _prompt: &str, _context: &[String]) -> Result<InferenceOutput, InferenceError> {
        Err(InferenceError::NotConfigured {
            reason: self.reason.clone(),
        })
    }
}

/// Executors for every tier
#[derive(Clone, Default)]
pub struct ExecutorSet {
    small: Option<Arc<dyn InferenceExecutor>>,
    medium: Option<Arc<dyn InferenceExecutor>>,
    api: Option<Arc<dyn InferenceExecutor>>,
}

impl std::fmt::Debug for ExecutorSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = |slot: &Option<Arc<dyn InferenceExecutor>>| {
            slot.as_ref().map(|e| e.name().to_string())
        };
        f.debug_struct("ExecutorSet")
            .field("small", &name(&self.small))
            .field("medium", &name(&self.medium))
            .field("api", &name(&self.api))
            .finish()
    }
}

impl ExecutorSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stub executors on every tier
    pub fn stubs() -> Self {
        Tier::ALL.into_iter().fold(Self::new(), |set, tier| {
            set.with_executor(tier, Arc::new(StubExecutor::for_tier(tier)))
        })
    }

    pub fn with_executor(mut self, tier: Tier, executor: Arc<dyn InferenceExecutor>) -> Self {
        *self.slot_mut(tier) = Some(executor);
        self
    }

    /// Build executors from configuration, pricing each tier from its model.
    ///
    /// A remote tier whose API key is missing still gets an executor; it
    /// answers every call with `NotConfigured` so the other tiers keep serving.
    pub fn from_config(config: &ExecutorsConfig, models: &TierModels) -> Self {
        let mut set = Self::new();
        for tier in Tier::ALL {
            let model = models.get(tier);
            let executor: Arc<dyn InferenceExecutor> = match config.get(tier) {
                ExecutorConfig::Stub { response } => Arc::new(match response {
                    Some(text) => StubExecutor::new(text.clone()),
                    None => StubExecutor::for_tier(tier),
                }),
                ExecutorConfig::LocalProcess {
                    binary,
                    model_path,
                    max_output_tokens,
                    timeout,
                } => Arc::new(LocalProcessExecutor::new(
                    binary.clone(),
                    model_path.clone(),
                    *max_output_tokens,
                    *timeout,
                    model.cost_per_token,
                )),
                ExecutorConfig::RemoteApi {
                    base_url,
                    api_key_env,
                    max_output_tokens,
                    timeout,
                } => match RemoteApiExecutor::from_env(
                    base_url,
                    &model.model_name,
                    api_key_env,
                    *max_output_tokens,
                    *timeout,
                    model.cost_per_token,
                ) {
                    Ok(executor) => Arc::new(executor),
                    Err(e) => {
                        tracing::warn!("Tier {} executor unavailable: {}", tier, e);
                        Arc::new(UnconfiguredExecutor::new(e.to_string()))
                    }
                },
            };
            tracing::debug!("Executor for tier {}: {}", tier, executor.name());
            set = set.with_executor(tier, executor);
        }
        set
    }

    pub fn get(&self, tier: Tier) -> Result<&Arc<dyn InferenceExecutor>, InferenceError> {
        self.slot(tier)
            .as_ref()
            .ok_or(InferenceError::MissingExecutor { tier })
    }

    fn slot(&self, tier: Tier) -> &Option<Arc<dyn InferenceExecutor>> {
        match tier {
            Tier::Small => &self.small,
            Tier::Medium => &self.medium,
            Tier::Api => &self.api,
        }
    }

    fn slot_mut(&mut self, tier: Tier) -> &mut Option<Arc<dyn InferenceExecutor>> {
        match tier {
            Tier::Small => &mut self.small,
            Tier::Medium => &mut self.medium,
            Tier::Api => &mut self.api,
        }
    }
}
