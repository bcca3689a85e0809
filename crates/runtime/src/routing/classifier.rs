//! Task classifiers consulted by the routing engine
//!
//! The engine only sees the [`Classifier`] trait. Two implementations exist:
//! a deterministic [`StubClassifier`] and a [`LinearClassifier`] that replays
//! a trained TF-IDF + multinomial logistic regression pipeline from a JSON
//! weight bundle.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use super::error::{RoutingError, RoutingResult};
use crate::features::{FeatureVector, TaskType};

/// Token pattern used when the model was trained
const TOKEN_PATTERN: &str = r"(?u)\b\w\w+\b";

/// Number of numeric features appended after the text features
const NUMERIC_FEATURES: usize = 2;

/// A task prediction with its confidence
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    predicted_task: TaskType,
    confidence: f64,
}

impl Prediction {
    /// Create a prediction, rejecting confidence outside `[0, 1]`
    pub fn new(predicted_task: TaskType, confidence: f64) -> RoutingResult<Self> {
        if !confidence.is_finite() || !(0.0..=1.0).contains(&confidence) {
            return Err(RoutingError::InvalidConfidence { value: confidence });
        }
        Ok(Self {
            predicted_task,
            confidence,
        })
    }

    pub fn predicted_task(&self) -> TaskType {
        self.predicted_task
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }
}

/// Predicts the task of a prompt
///
/// Implementations must be side-effect free; the engine calls `predict` at
/// most once per decision.
pub trait Classifier: Send + Sync {
    fn name(&self) -> &str;

    fn predict(&self, features: &FeatureVector, prompt: &str) -> RoutingResult<Prediction>;
}

/// Deterministic classifier used when no trained model is available
#[derive(Debug, Clone, Copy, Default)]
pub struct StubClassifier;

impl Classifier for StubClassifier {
    fn name(&self) -> &str {
        "stub"
    }

    fn predict(&self, _features: &FeatureVector, _prompt: &str) -> RoutingResult<Prediction> {
        Prediction::new(TaskType::Generation, 0.0)
    }
}

/// Serialized weights of a trained linear classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelBundle {
    /// Class labels in coefficient row order
    pub classes: Vec<String>,
    /// Term to column index
    pub vocabulary: HashMap<String, usize>,
    /// Inverse document frequency per column
    pub idf: Vec<f64>,
    #[serde(default = "default_ngram_range")]
    pub ngram_range: (usize, usize),
    #[serde(default)]
    pub stop_words: Vec<String>,
    /// One row per class (a single row for binary models), each of length
    /// `vocabulary size + 2`
    pub coefficients: Vec<Vec<f64>>,
    pub intercepts: Vec<f64>,
}

fn default_ngram_range() -> (usize, usize) {
    (1, 1)
}

/// TF-IDF + logistic regression classifier
#[derive(Debug, Clone)]
pub struct LinearClassifier {
    classes: Vec<TaskType>,
    vocabulary: HashMap<String, usize>,
    idf: Vec<f64>,
    ngram_range: (usize, usize),
    stop_words: HashSet<String>,
    coefficients: Vec<Vec<f64>>,
    intercepts: Vec<f64>,
    token_pattern: Regex,
}

impl LinearClassifier {
    /// Load a classifier from a JSON weight bundle on disk
    pub fn from_file(path: &Path) -> RoutingResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| RoutingError::ClassifierUnavailable {
            reason: format!("cannot read {}: {}", path.display(), e),
        })?;
        let bundle: ModelBundle =
            serde_json::from_str(&raw).map_err(|e| RoutingError::SerializationError {
                context: format!("classifier bundle {}", path.display()),
                source: e,
            })?;
        Self::from_bundle(bundle)
    }

    /// Validate a bundle's dimensions and build the classifier
    pub fn from_bundle(bundle: ModelBundle) -> RoutingResult<Self> {
        let unavailable = |reason: String| RoutingError::ClassifierUnavailable { reason };

        let classes = bundle
            .classes
            .iter()
            .map(|label| label.parse::<TaskType>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(unavailable)?;
        if classes.len() < 2 {
            return Err(unavailable(format!(
                "expected at least 2 classes, got {}",
                classes.len()
            )));
        }

        let vocab_size = bundle.idf.len();
        if let Some((term, index)) = bundle.vocabulary.iter().find(|(_, i)| **i >= vocab_size) {
            return Err(unavailable(format!(
                "vocabulary term '{}' has index {} beyond idf length {}",
                term, index, vocab_size
            )));
        }

        let (min_n, max_n) = bundle.ngram_range;
        if min_n == 0 || min_n > max_n {
            return Err(unavailable(format!(
                "invalid ngram_range ({}, {})",
                min_n, max_n
            )));
        }

        let expected_rows = if classes.len() == 2 { 1 } else { classes.len() };
        let rows = bundle.coefficients.len();
        if rows != classes.len() && rows != expected_rows {
            return Err(unavailable(format!(
                "expected {} coefficient rows, got {}",
                expected_rows, rows
            )));
        }
        if bundle.intercepts.len() != rows {
            return Err(unavailable(format!(
                "expected {} intercepts, got {}",
                rows,
                bundle.intercepts.len()
            )));
        }
        let width = vocab_size + NUMERIC_FEATURES;
        if let Some(row) = bundle.coefficients.iter().find(|row| row.len() != width) {
            return Err(unavailable(format!(
                "coefficient row has {} columns, expected {}",
                row.len(),
                width
            )));
        }

        let token_pattern =
            Regex::new(TOKEN_PATTERN).map_err(|e| unavailable(format!("token pattern: {}", e)))?;

        Ok(Self {
            classes,
            vocabulary: bundle.vocabulary,
            idf: bundle.idf,
            ngram_range: bundle.ngram_range,
            stop_words: bundle.stop_words.into_iter().collect(),
            coefficients: bundle.coefficients,
            intercepts: bundle.intercepts,
            token_pattern,
        })
    }

    /// Sparse L2-normalized TF-IDF vector, keyed by column
    fn text_features(&self, prompt: &str) -> HashMap<usize, f64> {
        let lowered = prompt.to_lowercase();
        let tokens: Vec<&str> = self
            .token_pattern
            .find_iter(&lowered)
            .map(|m| m.as_str())
            .filter(|t| !self.stop_words.contains(*t))
            .collect();

        let mut counts: HashMap<usize, f64> = HashMap::new();
        let (min_n, max_n) = self.ngram_range;
        for n in min_n..=max_n {
            for window in tokens.windows(n) {
                let term = window.join(" ");
                if let Some(&column) = self.vocabulary.get(&term) {
                    *counts.entry(column).or_insert(0.0) += 1.0;
                }
            }
        }

        for (column, value) in counts.iter_mut() {
            *value *= self.idf[*column];
        }

        let norm = counts.values().map(|v| v * v).sum::<f64>().sqrt();
        if norm > 0.0 {
            for value in counts.values_mut() {
                *value /= norm;
            }
        }
        counts
    }

    /// Class probabilities, aligned with `self.classes`
    fn probabilities(&self, features: &FeatureVector, prompt: &str) -> Vec<f64> {
        let text = self.text_features(prompt);
        let vocab_size = self.idf.len();
        let numeric = [features.context_length as f64, features.token_count as f64];

        let logits: Vec<f64> = self
            .coefficients
            .iter()
            .zip(&self.intercepts)
            .map(|(row, intercept)| {
                let text_part: f64 = text.iter().map(|(col, v)| row[*col] * v).sum();
                let numeric_part: f64 = numeric
                    .iter()
                    .enumerate()
                    .map(|(i, v)| row[vocab_size + i] * v)
                    .sum();
                intercept + text_part + numeric_part
            })
            .collect();

        if logits.len() == 1 {
            let positive = 1.0 / (1.0 + (-logits[0]).exp());
            return vec![1.0 - positive, positive];
        }

        let max = logits.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let exps: Vec<f64> = logits.iter().map(|z| (z - max).exp()).collect();
        let total: f64 = exps.iter().sum();
        exps.into_iter().map(|e| e / total).collect()
    }
}

impl Classifier for LinearClassifier {
    fn name(&self) -> &str {
        "linear"
    }

    fn predict(&self, features: &FeatureVector, prompt: &str) -> RoutingResult<Prediction> {
        let probs = self.probabilities(features, prompt);

        let (index, confidence) = probs
            .iter()
            .cloned()
            .enumerate()
            .fold((0, f64::NEG_INFINITY), |best, (i, p)| {
                if p > best.1 {
                    (i, p)
                } else {
                    best
                }
            });

        if !confidence.is_finite() {
            return Err(RoutingError::ClassificationFailed {
                reason: "model produced a non-finite probability".to_string(),
            });
        }
        Prediction::new(self.classes[index], confidence)
    }
}

/// Build the classifier to use for this process.
///
/// Without a path the stub is used. A model that fails to load also yields
/// the stub, after a single warning.
pub fn load_classifier(path: Option<&Path>) -> Arc<dyn Classifier> {
    let Some(path) = path else {
        tracing::info!("No classifier model configured, using stub classifier");
        return Arc::new(StubClassifier);
    };

    match LinearClassifier::from_file(path) {
        Ok(classifier) => {
            tracing::info!(
                "Loaded linear classifier from {} ({} terms)",
                path.display(),
                classifier.vocabulary.len()
            );
            Arc::new(classifier)
        }
        Err(e) => {
            e.report("Classifier model not loaded, falling back to stub classifier");
            Arc::new(StubClassifier)
        }
    }
}
