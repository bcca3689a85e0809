//! Deterministic prompt feature extraction
//!
//! Produces the [`FeatureVector`] consumed by the routing engine and the
//! output-token estimate used by context-window safety. Everything here is a
//! pure function of its inputs.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::contracts::{Constraints, RiskLevel};

/// Keywords that mark a prompt as a classification task
const CLASSIFICATION_KEYWORDS: &[&str] = &[
    "classify",
    "categorize",
    "categorise",
    "label",
    "sentiment",
    "spam",
    "is this",
];

/// Keywords that mark a prompt as a reasoning task
const REASONING_KEYWORDS: &[&str] = &["why", "prove", "derive", "solve", "calculate", "reason"];

/// Keywords that ask the model to elaborate, quadrupling generation output
const ELABORATION_KEYWORDS: &[&str] = &[
    "step by step",
    "in detail",
    "explain",
    "elaborate",
    "with examples",
];

/// Words that signal explicit constraints on the output
const CONSTRAINT_KEYWORDS: &[&str] = &[
    "must", "should", "exactly", "only", "never", "always", "without", "format", "json",
    "limit", "maximum", "minimum", "at least", "at most",
];

// Output estimate weights, in tenths of a token so the arithmetic stays exact
const BASE_OUTPUT_TENTHS: u64 = 500;
const PROMPT_WORD_TENTHS: u64 = 12;
const CONTEXT_WORD_TENTHS: u64 = 5;
const CLASSIFICATION_CAP_TENTHS: u64 = 1000;

/// Task category of a prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    Classification,
    Reasoning,
    Generation,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Classification => "classification",
            TaskType::Reasoning => "reasoning",
            TaskType::Generation => "generation",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "classification" => Ok(TaskType::Classification),
            "reasoning" => Ok(TaskType::Reasoning),
            "generation" => Ok(TaskType::Generation),
            other => Err(format!("unknown task type '{}'", other)),
        }
    }
}

/// Snapshot of prompt and context characteristics
///
/// Built once per request by [`extract_features`] and only ever read after
/// that; the routing engine takes it by shared reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    /// Prompt tokens plus context tokens
    pub token_count: u64,
    /// Prompt length in characters
    pub prompt_length: u64,
    /// Task detected from prompt keywords
    pub task: TaskType,
    /// Share of prompt words that express constraints, in [0, 1]
    pub constraint_density: f64,
    /// Tokens across all context entries
    pub context_length: u64,
    /// Set when the request declares high risk
    pub risk_flag: bool,
}

impl FeatureVector {
    /// Look up a feature by its serialized name.
    ///
    /// Used by static routing rules; unknown keys yield `None`.
    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        match key {
            "token_count" => Some(self.token_count.into()),
            "prompt_length" => Some(self.prompt_length.into()),
            "task" => Some(self.task.as_str().into()),
            "constraint_density" => Some(self.constraint_density.into()),
            "context_length" => Some(self.context_length.into()),
            "risk_flag" => Some(self.risk_flag.into()),
            _ => None,
        }
    }
}

/// Whitespace-delimited word count
pub fn simple_token_count(text: &str) -> u64 {
    text.split_whitespace().count() as u64
}

/// Keyword-based task detection
pub fn detect_task_type(prompt: &str) -> TaskType {
    let lowered = prompt.to_lowercase();
    if CLASSIFICATION_KEYWORDS.iter().any(|k| lowered.contains(k)) {
        TaskType::Classification
    } else if lowered
        .split(|c: char| !c.is_alphanumeric())
        .any(|word| REASONING_KEYWORDS.contains(&word))
    {
        TaskType::Reasoning
    } else {
        TaskType::Generation
    }
}

fn constraint_density(prompt: &str) -> f64 {
    let words = simple_token_count(prompt);
    if words == 0 {
        return 0.0;
    }
    let lowered = prompt.to_lowercase();
    let hits = CONSTRAINT_KEYWORDS
        .iter()
        .map(|k| lowered.matches(k).count())
        .sum::<usize>();
    (hits as f64 / words as f64).clamp(0.0, 1.0)
}

/// Build the feature vector for a request
pub fn extract_features(prompt: &str, context: &[String], constraints: &Constraints) -> FeatureVector {
    let prompt_tokens = simple_token_count(prompt);
    let context_tokens: u64 = context.iter().map(|c| simple_token_count(c)).sum();

    FeatureVector {
        token_count: prompt_tokens + context_tokens,
        prompt_length: prompt.chars().count() as u64,
        task: detect_task_type(prompt),
        constraint_density: constraint_density(prompt),
        context_length: context_tokens,
        risk_flag: constraints.risk_level == RiskLevel::High,
    }
}

/// Whether the prompt asks for an elaborated answer
pub fn has_elaboration_keyword(prompt: &str) -> bool {
    let lowered = prompt.to_lowercase();
    ELABORATION_KEYWORDS.iter().any(|k| lowered.contains(k))
}

/// Estimate how many tokens the model will generate.
///
/// Starts from `50 + 1.2 * prompt words + 0.5 * context words`, then applies
/// the task policy: classification is capped at 100, reasoning doubles, and
/// generation doubles (quadruples when the prompt asks for elaboration).
pub fn estimate_output_tokens(prompt: &str, context: &[String], task: TaskType) -> u64 {
    let prompt_words = simple_token_count(prompt);
    let context_words: u64 = context.iter().map(|c| simple_token_count(c)).sum();

    let base = BASE_OUTPUT_TENTHS
        + PROMPT_WORD_TENTHS * prompt_words
        + CONTEXT_WORD_TENTHS * context_words;

    let estimate = match task {
        TaskType::Classification => base.min(CLASSIFICATION_CAP_TENTHS),
        TaskType::Reasoning => base * 2,
        TaskType::Generation => {
            if has_elaboration_keyword(prompt) {
                base * 4
            } else {
                base * 2
            }
        }
    };

    estimate / 10
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_features_counts_prompt_and_context() {
        let context = vec!["one two three".to_string(), "four five".to_string()];
        let features = extract_features("Summarize the notes", &context, &Constraints::default());

        assert_eq!(features.context_length, 5);
        assert_eq!(features.token_count, 8);
        assert_eq!(features.prompt_length, 19);
        assert!(!features.risk_flag);
    }

    #[test]
    fn test_risk_flag_follows_constraints() {
        let constraints = Constraints::default().with_risk_level(RiskLevel::High);
        let features = extract_features("hello", &[], &constraints);
        assert!(features.risk_flag);
    }

    #[test]
    fn test_detect_task_type() {
        assert_eq!(
            detect_task_type("Classify this email as spam"),
            TaskType::Classification
        );
        assert_eq!(
            detect_task_type("Why is quicksort faster than bubble sort?"),
            TaskType::Reasoning
        );
        assert_eq!(
            detect_task_type("Explain step by step how gradient descent works"),
            TaskType::Generation
        );
        // "reasonable" must not count as the keyword "reason"
        assert_eq!(
            detect_task_type("Write a reasonable cover letter"),
            TaskType::Generation
        );
    }

    #[test]
    fn test_constraint_density_is_bounded() {
        let features = extract_features("must only json", &[], &Constraints::default());
        assert!(features.constraint_density <= 1.0);
        assert!(features.constraint_density > 0.0);

        let empty = extract_features("", &[], &Constraints::default());
        assert_eq!(empty.constraint_density, 0.0);
    }

    #[test]
    fn test_feature_lookup_by_name() {
        let features = extract_features("Classify this", &[], &Constraints::default());
        assert_eq!(features.get("task"), Some(serde_json::json!("classification")));
        assert_eq!(features.get("token_count"), Some(serde_json::json!(2)));
        assert_eq!(features.get("nonexistent"), None);
    }

    #[test]
    fn test_estimate_output_tokens_task_policy() {
        // 5 prompt words: base = 50 + 6 = 56
        let prompt = "Classify this email as spam";
        assert_eq!(estimate_output_tokens(prompt, &[], TaskType::Classification), 56);
        assert_eq!(estimate_output_tokens(prompt, &[], TaskType::Reasoning), 112);
        assert_eq!(estimate_output_tokens(prompt, &[], TaskType::Generation), 112);
    }

    #[test]
    fn test_estimate_caps_classification() {
        let context = vec!["word ".repeat(400)];
        assert_eq!(
            estimate_output_tokens("label it", &context, TaskType::Classification),
            100
        );
    }

    #[test]
    fn test_estimate_quadruples_elaborated_generation() {
        // 8 words: base = 50 + 9.6 = 59.6, x4 = 238.4
        let prompt = "Explain step by step how gradient descent works";
        assert_eq!(estimate_output_tokens(prompt, &[], TaskType::Generation), 238);
        assert_eq!(estimate_output_tokens(prompt, &[], TaskType::Reasoning), 119);
    }
}
