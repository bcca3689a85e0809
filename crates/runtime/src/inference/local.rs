//! Local model executor
//!
//! Runs a llama.cpp-style command line binary once per request. The binary
//! receives `--model`, `--prompt`, `--n-predict` and `--no-display-prompt`
//! and its trimmed stdout is the response.

use async_trait::async_trait;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tokio::time::timeout;

use super::{word_count, InferenceError, InferenceExecutor, InferenceOutput};

#[derive(Debug, Clone)]
pub struct LocalProcessExecutor {
    binary: PathBuf,
    model_path: PathBuf,
    max_output_tokens: u32,
    timeout: Duration,
    cost_per_token: f64,
}

impl LocalProcessExecutor {
    pub fn new(
        binary: PathBuf,
        model_path: PathBuf,
        max_output_tokens: u32,
        timeout: Duration,
        cost_per_token: f64,
    ) -> Self {
        Self {
            binary,
            model_path,
            max_output_tokens,
            timeout,
            cost_per_token,
        }
    }

    /// Context entries first, then the prompt, separated by blank lines
    fn full_prompt(prompt: &str, context: &[String]) -> String {
        let mut parts: Vec<&str> = context.iter().map(String::as_str).collect();
        parts.push(prompt);
        parts.join("\n\n")
    }

    fn build_command_args(&self, full_prompt: &str) -> Vec<String> {
        vec![
            "--model".to_string(),
            self.model_path.display().to_string(),
            "--prompt".to_string(),
            full_prompt.to_string(),
            "--n-predict".to_string(),
            self.max_output_tokens.to_string(),
            "--no-display-prompt".to_string(),
        ]
    }
}

#[async_trait]
impl InferenceExecutor for LocalProcessExecutor {
    fn name(&self) -> &str {
        "local_process"
    }

    async fn execute(&self, prompt: &str, context: &[String]) -> Result<InferenceOutput, InferenceError> {
        let full_prompt = Self::full_prompt(prompt, context);
        let mut command = Command::new(&self.binary);
        command.args(self.build_command_args(&full_prompt)).kill_on_drop(true);

        let start = Instant::now();
        let output = timeout(self.timeout, command.output())
            .await
            .map_err(|_| InferenceError::Timeout {
                seconds: self.timeout.as_secs(),
            })?
            .map_err(|e| InferenceError::ExecutionFailed {
                reason: format!("failed to run {}: {}", self.binary.display(), e),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(InferenceError::ExecutionFailed {
                reason: format!("{} exited with {}: {}", self.binary.display(), output.status, stderr.trim()),
            });
        }

        let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let input_tokens = word_count(&full_prompt);
        let output_tokens = word_count(&text);
        tracing::debug!(
            "Local inference finished in {:?} ({} in / {} out)",
            start.elapsed(),
            input_tokens,
            output_tokens
        );

        Ok(InferenceOutput {
            text,
            input_tokens,
            output_tokens,
            cost_usd: (input_tokens + output_tokens) as f64 * self.cost_per_token,
        })
    }
}
