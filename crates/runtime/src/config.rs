//! Configuration management module for the tiergate runtime
//!
//! Configuration lives in a directory of YAML files:
//!
//! - `models.yaml` (required): one model per tier
//! - `routing.yaml` (required): thresholds and ordered static rules
//! - `service.yaml` (optional): cache backend, classifier model, executors
//!   and metrics export
//!
//! A few values can be overridden from the environment, see
//! [`AppConfig::apply_env_overrides`].

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::routing::{ModelConfig, RouterConfig, RoutingError, RoutingPolicyConfig, Tier, TierModels};

/// Environment variable naming the configuration directory
pub const CONFIG_DIR_ENV: &str = "TIERGATE_CONFIG_DIR";
/// Environment variable overriding the Redis connection URL
pub const REDIS_URL_ENV: &str = "REDIS_URL";
/// Environment variable overriding the classifier model path
pub const CLASSIFIER_MODEL_ENV: &str = "TIERGATE_CLASSIFIER_MODEL";

const MODELS_FILE: &str = "models.yaml";
const ROUTING_FILE: &str = "routing.yaml";
const SERVICE_FILE: &str = "service.yaml";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}")]
    MissingRequired { key: String },

    #[error("Invalid configuration value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("IO error reading config file: {message}")]
    IoError { message: String },

    #[error("Configuration parsing error: {message}")]
    ParseError { message: String },
}

impl From<RoutingError> for ConfigError {
    fn from(err: RoutingError) -> Self {
        match err {
            RoutingError::ConfigurationError { key, reason } => {
                ConfigError::InvalidValue { key, reason }
            }
            other => ConfigError::InvalidValue {
                key: "routing".to_string(),
                reason: other.to_string(),
            },
        }
    }
}

/// Contents of `models.yaml`
#[derive(Debug, Clone, Deserialize)]
struct ModelsFile {
    models: HashMap<Tier, ModelConfig>,
}

/// Cache backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackendKind {
    #[default]
    Memory,
    Redis,
    Disabled,
}

/// Response cache configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub backend: CacheBackendKind,
    /// Redis connection URL, required for the redis backend
    #[serde(default, skip_serializing)]
    pub redis_url: Option<String>,
    /// Capacity of the in-memory backend
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

fn default_max_entries() -> usize {
    10_000
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackendKind::Memory,
            redis_url: None,
            max_entries: default_max_entries(),
        }
    }
}

/// Task classifier configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// JSON weight bundle; the stub classifier is used when unset
    #[serde(default)]
    pub model_path: Option<PathBuf>,
}

/// How a tier's inference is performed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExecutorConfig {
    /// Canned response, no backend
    Stub {
        #[serde(default)]
        response: Option<String>,
    },
    /// llama.cpp-style binary run as a child process
    LocalProcess {
        binary: PathBuf,
        model_path: PathBuf,
        #[serde(default = "default_max_output_tokens")]
        max_output_tokens: u32,
        #[serde(default = "default_local_timeout", with = "humantime_serde")]
        timeout: Duration,
    },
    /// OpenAI-compatible chat completions endpoint
    RemoteApi {
        base_url: String,
        /// Environment variable holding the API key
        #[serde(default = "default_api_key_env")]
        api_key_env: String,
        #[serde(default = "default_max_output_tokens")]
        max_output_tokens: u32,
        #[serde(default = "default_remote_timeout", with = "humantime_serde")]
        timeout: Duration,
    },
}

fn default_max_output_tokens() -> u32 {
    512
}

fn default_local_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_remote_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        ExecutorConfig::Stub { response: None }
    }
}

/// Executor per tier
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExecutorsConfig {
    #[serde(default)]
    pub small: ExecutorConfig,
    #[serde(default)]
    pub medium: ExecutorConfig,
    #[serde(default)]
    pub api: ExecutorConfig,
}

impl ExecutorsConfig {
    pub fn get(&self, tier: Tier) -> &ExecutorConfig {
        match tier {
            Tier::Small => &self.small,
            Tier::Medium => &self.medium,
            Tier::Api => &self.api,
        }
    }
}

/// Metrics export configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Snapshot file written after each export interval; disabled when unset
    #[serde(default)]
    pub file: Option<PathBuf>,
    #[serde(default = "default_export_interval", with = "humantime_serde")]
    pub export_interval: Duration,
}

fn default_export_interval() -> Duration {
    Duration::from_secs(60)
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            file: None,
            export_interval: default_export_interval(),
        }
    }
}

/// Contents of the optional `service.yaml`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub executors: ExecutorsConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl ServiceConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache.backend == CacheBackendKind::Redis && self.cache.redis_url.is_none() {
            return Err(ConfigError::MissingRequired {
                key: format!("cache.redis_url (or {})", REDIS_URL_ENV),
            });
        }
        if self.cache.max_entries == 0 {
            return Err(ConfigError::InvalidValue {
                key: "cache.max_entries".to_string(),
                reason: "must be greater than 0".to_string(),
            });
        }

        for tier in Tier::ALL {
            let key = format!("executors.{}", tier);
            match self.executors.get(tier) {
                ExecutorConfig::Stub { .. } => {}
                ExecutorConfig::LocalProcess { timeout, .. } if timeout.is_zero() => {
                    return Err(ConfigError::InvalidValue {
                        key,
                        reason: "timeout must be greater than 0".to_string(),
                    });
                }
                ExecutorConfig::LocalProcess { .. } => {}
                ExecutorConfig::RemoteApi {
                    base_url, timeout, ..
                } => {
                    if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
                        return Err(ConfigError::InvalidValue {
                            key,
                            reason: format!("base_url must be an http(s) URL, got '{}'", base_url),
                        });
                    }
                    if timeout.is_zero() {
                        return Err(ConfigError::InvalidValue {
                            key,
                            reason: "timeout must be greater than 0".to_string(),
                        });
                    }
                }
            }
        }

        if self.metrics.export_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                key: "metrics.export_interval".to_string(),
                reason: "must be greater than 0".to_string(),
            });
        }
        Ok(())
    }
}

/// Main application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Directory the files were loaded from
    pub config_dir: PathBuf,
    pub router: Arc<RouterConfig>,
    pub service: ServiceConfig,
}

impl AppConfig {
    /// Load and validate every configuration file in `dir`
    pub fn load_dir<P: AsRef<Path>>(dir: P) -> Result<Self, ConfigError> {
        let dir = dir.as_ref();

        let models: ModelsFile = read_yaml(&dir.join(MODELS_FILE))?;
        let policy: RoutingPolicyConfig = read_yaml(&dir.join(ROUTING_FILE))?;
        let router = RouterConfig::new(TierModels::from_map(models.models)?, policy)?;

        let service_path = dir.join(SERVICE_FILE);
        let mut service: ServiceConfig = if service_path.exists() {
            read_yaml(&service_path)?
        } else {
            tracing::debug!("No {} in {}, using defaults", SERVICE_FILE, dir.display());
            ServiceConfig::default()
        };

        // Relative model paths are relative to the configuration directory
        if let Some(model_path) = service.classifier.model_path.take() {
            service.classifier.model_path = Some(if model_path.is_relative() {
                dir.join(model_path)
            } else {
                model_path
            });
        }

        let mut config = Self {
            config_dir: dir.to_path_buf(),
            router: Arc::new(router),
            service,
        };
        config.apply_env_overrides();
        config.service.validate()?;

        tracing::info!(
            "Loaded configuration from {} ({} routing rules)",
            dir.display(),
            config.router.rules().len()
        );
        Ok(config)
    }

    /// Load from `TIERGATE_CONFIG_DIR`, defaulting to `./config`
    pub fn from_env() -> Result<Self, ConfigError> {
        let dir = env::var(CONFIG_DIR_ENV).unwrap_or_else(|_| "config".to_string());
        Self::load_dir(dir)
    }

    /// Apply `REDIS_URL` and `TIERGATE_CLASSIFIER_MODEL` when set
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = env::var(REDIS_URL_ENV) {
            if !url.trim().is_empty() {
                self.service.cache.redis_url = Some(url);
            }
        }
        if let Ok(path) = env::var(CLASSIFIER_MODEL_ENV) {
            if !path.trim().is_empty() {
                self.service.classifier.model_path = Some(PathBuf::from(path));
            }
        }
    }
}

fn read_yaml<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::MissingRequired {
            key: format!("configuration file {}", path.display()),
        });
    }

    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::IoError {
        message: format!("{}: {}", path.display(), e),
    })?;

    let value: serde_yaml::Value =
        serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError {
            message: format!("{}: {}", path.display(), e),
        })?;
    if value.is_null() {
        return Err(ConfigError::ParseError {
            message: format!("Empty or invalid YAML file: {}", path.display()),
        });
    }

    serde_yaml::from_value(value).map_err(|e| ConfigError::ParseError {
        message: format!("{}: {}", path.display(), e),
    })
}
