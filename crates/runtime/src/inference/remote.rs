//! OpenAI-compatible chat completions executor

use async_trait::async_trait;
use std::time::{Duration, Instant};

use super::{word_count, InferenceError, InferenceExecutor, InferenceOutput};

pub struct RemoteApiExecutor {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
    max_output_tokens: u32,
    timeout: Duration,
    cost_per_token: f64,
}

impl std::fmt::Debug for RemoteApiExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteApiExecutor")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

impl RemoteApiExecutor {
    pub fn new(
        base_url: &str,
        model: &str,
        api_key: String,
        max_output_tokens: u32,
        timeout: Duration,
        cost_per_token: f64,
    ) -> Result<Self, InferenceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| InferenceError::NotConfigured {
                reason: format!("cannot build HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key,
            max_output_tokens,
            timeout,
            cost_per_token,
        })
    }

    /// Build an executor whose API key is read from `api_key_env`
    pub fn from_env(
        base_url: &str,
        model: &str,
        api_key_env: &str,
        max_output_tokens: u32,
        timeout: Duration,
        cost_per_token: f64,
    ) -> Result<Self, InferenceError> {
        let api_key = std::env::var(api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| InferenceError::NotConfigured {
                reason: format!("environment variable {} is not set", api_key_env),
            })?;
        tracing::info!("Remote executor initialized: model={} base_url={}", model, base_url);
        Self::new(base_url, model, api_key, max_output_tokens, timeout, cost_per_token)
    }

    fn request_body(&self, prompt: &str, context: &[String]) -> serde_json::Value {
        let mut messages: Vec<serde_json::Value> = context
            .iter()
            .map(|entry| serde_json::json!({ "role": "system", "content": entry }))
            .collect();
        messages.push(serde_json::json!({ "role": "user", "content": prompt }));

        serde_json::json!({
            "model": self.model,
            "messages": messages,
            "max_tokens": self.max_output_tokens,
        })
    }

    async fn send(&self, body: &serde_json::Value) -> Result<serde_json::Value, InferenceError> {
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(body)
            .send()
            .await
            .map_err(|e| self.request_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(InferenceError::BackendError {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json()
            .await
            .map_err(|e| InferenceError::MalformedResponse {
                reason: e.to_string(),
            })
    }

    fn request_error(&self, err: reqwest::Error) -> InferenceError {
        if err.is_timeout() {
            InferenceError::Timeout {
                seconds: self.timeout.as_secs(),
            }
        } else {
            InferenceError::ExecutionFailed {
                reason: format!("request to {} failed: {}", self.base_url, err),
            }
        }
    }
}

/// Completion text and `(prompt_tokens, completion_tokens)` when reported
pub(crate) fn parse_completion(
    body: &serde_json::Value,
) -> Result<(String, Option<(u64, u64)>), InferenceError> {
    let text = body
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .ok_or_else(|| InferenceError::MalformedResponse {
            reason: "no content in response choices".to_string(),
        })?;

    let usage = body.get("usage").and_then(|usage| {
        let prompt = usage.get("prompt_tokens")?.as_u64()?;
        let completion = usage.get("completion_tokens")?.as_u64()?;
        Some((prompt, completion))
    });

    Ok((text.to_string(), usage))
}

#[async_trait]
impl InferenceExecutor for RemoteApiExecutor {
    fn name(&self) -> &str {
        "remote_api"
    }

    async fn execute(&self, prompt: &str, context: &[String]) -> Result<InferenceOutput, InferenceError> {
        let body = self.request_body(prompt, context);
        let start = Instant::now();

        let json = tokio::time::timeout(self.timeout, self.send(&body))
            .await
            .map_err(|_| InferenceError::Timeout {
                seconds: self.timeout.as_secs(),
            })??;

        let (text, usage) = parse_completion(&json)?;
        let (input_tokens, output_tokens) = usage.unwrap_or_else(|| {
            let input = word_count(prompt) + context.iter().map(|c| word_count(c)).sum::<u64>();
            (input, word_count(&text))
        });

        tracing::info!(
            "Remote usage: model={} prompt_tokens={} completion_tokens={} latency={:?}",
            self.model,
            input_tokens,
            output_tokens,
            start.elapsed()
        );

        Ok(InferenceOutput {
            text,
            input_tokens,
            output_tokens,
            cost_usd: (input_tokens + output_tokens) as f64 * self.cost_per_token,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn executor() -> RemoteApiExecutor {
        RemoteApiExecutor::new(
            "https://api.example.com/v1/",
            "gpt-4o-mini",
            "sk-test".to_string(),
            256,
            Duration::from_secs(5),
            0.000002,
        )
        .unwrap()
    }

    #[test]
    fn test_request_body_sends_context_as_system_messages() {
        let body = executor().request_body("Summarize", &["doc".to_string()]);
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["max_tokens"], 256);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][0]["content"], "doc");
        assert_eq!(body["messages"][1]["role"], "user");
    }

    #[test]
    fn test_base_url_is_trimmed() {
        assert_eq!(executor().base_url, "https://api.example.com/v1");
    }

    #[test]
    fn test_parse_completion_with_usage() {
        let body = serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": "spam"}}],
            "usage": {"prompt_tokens": 12, "completion_tokens": 1, "total_tokens": 13}
        });
        let (text, usage) = parse_completion(&body).unwrap();
        assert_eq!(text, "spam");
        assert_eq!(usage, Some((12, 1)));
    }

    #[test]
    fn test_parse_completion_without_choices() {
        let body = serde_json::json!({"error": "overloaded"});
        assert!(matches!(
            parse_completion(&body),
            Err(InferenceError::MalformedResponse { .. })
        ));
    }

    #[test]
    #[serial]
    fn test_missing_api_key_is_not_configured() {
        std::env::remove_var("TIERGATE_TEST_MISSING_KEY");
        let result = RemoteApiExecutor::from_env(
            "https://api.example.com/v1",
            "gpt-4o-mini",
            "TIERGATE_TEST_MISSING_KEY",
            256,
            Duration::from_secs(5),
            0.0,
        );
        assert!(matches!(result, Err(InferenceError::NotConfigured { .. })));
    }
}
