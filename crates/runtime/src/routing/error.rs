//! Error types for the routing module

use thiserror::Error;
use tracing::Level;

/// Errors that can occur while configuring or feeding the routing engine
///
/// The engine itself never fails a decision; these errors surface at
/// start-up (configuration, classifier loading) or at the classifier port,
/// where the engine recovers by applying the fallback policy.
#[derive(Debug, Error)]
pub enum RoutingError {
    #[error("Configuration error: {key} - {reason}")]
    ConfigurationError { key: String, reason: String },

    #[error("Classifier unavailable: {reason}")]
    ClassifierUnavailable { reason: String },

    #[error("Task classification failed: {reason}")]
    ClassificationFailed { reason: String },

    #[error("Invalid confidence {value}: must be a finite value within 0.0..=1.0")]
    InvalidConfidence { value: f64 },

    #[error("Serialization error: {context} - {source}")]
    SerializationError {
        context: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Result type for routing operations
pub type RoutingResult<T> = Result<T, RoutingError>;

impl RoutingError {
    pub(crate) fn config(key: impl Into<String>, reason: impl Into<String>) -> Self {
        RoutingError::ConfigurationError {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Whether the system can keep serving after this error
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            RoutingError::ClassifierUnavailable { .. }
                | RoutingError::ClassificationFailed { .. }
                | RoutingError::InvalidConfidence { .. }
        )
    }

    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            RoutingError::ConfigurationError { .. } => ErrorSeverity::Critical,
            RoutingError::SerializationError { .. } => ErrorSeverity::High,
            RoutingError::ClassifierUnavailable { .. } => ErrorSeverity::Medium,
            RoutingError::ClassificationFailed { .. } | RoutingError::InvalidConfidence { .. } => {
                ErrorSeverity::Low
            }
        }
    }

    /// Level at which to log this error when the caller carries on without it
    pub fn log_level(&self) -> Level {
        if !self.is_recoverable() {
            return Level::ERROR;
        }
        match self.severity() {
            ErrorSeverity::Critical | ErrorSeverity::High => Level::ERROR,
            ErrorSeverity::Medium => Level::WARN,
            ErrorSeverity::Low => Level::INFO,
        }
    }

    /// Log this error at its severity-derived level
    pub(crate) fn report(&self, action: &str) {
        let level = self.log_level();
        if level == Level::ERROR {
            tracing::error!("{}: {}", action, self);
        } else if level == Level::WARN {
            tracing::warn!("{}: {}", action, self);
        } else {
            tracing::info!("{}: {}", action, self);
        }
    }
}

/// Error severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}
