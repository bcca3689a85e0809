//! Canned-response executor

use async_trait::async_trait;

use super::{InferenceError, InferenceExecutor, InferenceOutput};
use crate::routing::Tier;

/// Returns a fixed response with zero usage and cost
#[derive(Debug, Clone)]
pub struct StubExecutor {
    response: String,
}

impl StubExecutor {
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
        }
    }

    /// Placeholder response naming the tier
    pub fn for_tier(tier: Tier) -> Self {
        Self::new(format!(
            "[{} MODEL STUB RESPONSE]",
            tier.as_str().to_uppercase()
        ))
    }
}

#[async_trait]
impl InferenceExecutor for StubExecutor {
    fn name(&self) -> &str {
        "stub"
    }

    async fn execute(&self, _prompt: &str, _context: &[String]) -> Result<InferenceOutput, InferenceError> {
        Ok(InferenceOutput {
            text: self.response.clone(),
            input_tokens: 0,
            output_tokens: 0,
            cost_usd: 0.0,
        })
    }
}
