//! Router metrics collection and export.
//!
//! [`RouterMetrics`] is a set of lock-free counters shared by every request.
//! A [`MetricsSnapshot`] of them can be exported periodically; the only
//! backend is the [`file::FileExporter`], which writes JSON atomically.
//!
//! Recording never fails and exporting is best-effort: errors are logged by
//! the export loop and never reach a request.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::config::MetricsConfig;
use crate::routing::{DecisionStage, Tier};

pub mod file;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during metrics operations.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("metrics export failed: {0}")]
    ExportFailed(String),

    #[error("metrics configuration error: {0}")]
    ConfigError(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// Counters
// ---------------------------------------------------------------------------

/// `f64` accumulated in an `AtomicU64` through its bit pattern
#[derive(Debug, Default)]
struct AtomicF64(AtomicU64);

impl AtomicF64 {
    fn add(&self, value: f64) {
        // fetch_update only fails when the closure returns None
        let _ = self.0.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |bits| {
            Some((f64::from_bits(bits) + value).to_bits())
        });
    }

    fn get(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Relaxed))
    }
}

#[derive(Debug, Default)]
struct TierCounters {
    requests: AtomicU64,
    cache_hits: AtomicU64,
    input_tokens: AtomicU64,
    output_tokens: AtomicU64,
    cost_usd: AtomicF64,
    inference_count: AtomicU64,
    inference_latency_ms: AtomicU64,
    inference_failures: AtomicU64,
}

/// Process-wide routing, cache and inference counters
#[derive(Debug)]
pub struct RouterMetrics {
    started_at: Instant,
    tiers: [TierCounters; 3],
    decisions: [AtomicU64; 4],
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    cache_errors: AtomicU64,
    context_escalations: AtomicU64,
    context_limit_exceeded: AtomicU64,
}

impl Default for RouterMetrics {
    fn default() -> Self {
        Self::new()
    }
}

fn tier_index(tier: Tier) -> usize {
    match tier {
        Tier::Small => 0,
        Tier::Medium => 1,
        Tier::Api => 2,
    }
}

fn stage_index(stage: DecisionStage) -> usize {
    match stage {
        DecisionStage::StaticRule => 0,
        DecisionStage::Heuristic => 1,
        DecisionStage::Classifier => 2,
        DecisionStage::Fallback => 3,
    }
}

const STAGES: [DecisionStage; 4] = [
    DecisionStage::StaticRule,
    DecisionStage::Heuristic,
    DecisionStage::Classifier,
    DecisionStage::Fallback,
];

impl RouterMetrics {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            tiers: Default::default(),
            decisions: Default::default(),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            cache_errors: AtomicU64::new(0),
            context_escalations: AtomicU64::new(0),
            context_limit_exceeded: AtomicU64::new(0),
        }
    }

    fn tier(&self, tier: Tier) -> &TierCounters {
        &self.tiers[tier_index(tier)]
    }

    /// Record a routing decision
    pub fn record_decision(&self, tier: Tier, stage: DecisionStage, escalated: bool, limit_exceeded: bool) {
        self.tier(tier).requests.fetch_add(1, Ordering::Relaxed);
        self.decisions[stage_index(stage)].fetch_add(1, Ordering::Relaxed);
        if escalated {
            self.context_escalations.fetch_add(1, Ordering::Relaxed);
        }
        if limit_exceeded {
            self.context_limit_exceeded.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_cache_hit(&self, tier: Tier) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
        self.tier(tier).cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_error(&self) {
        self.cache_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Record usage and cost of a served response
    pub fn record_usage(&self, tier: Tier, input_tokens: u64, output_tokens: u64, cost_usd: f64) {
        let counters = self.tier(tier);
        counters.input_tokens.fetch_add(input_tokens, Ordering::Relaxed);
        counters.output_tokens.fetch_add(output_tokens, Ordering::Relaxed);
        counters.cost_usd.add(cost_usd);
    }

    pub fn record_inference(&self, tier: Tier, latency: Duration) {
        let counters = self.tier(tier);
        counters.inference_count.fetch_add(1, Ordering::Relaxed);
        counters
            .inference_latency_ms
            .fetch_add(latency.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn record_inference_failure(&self, tier: Tier) {
        self.tier(tier).inference_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of every counter
    pub fn snapshot(&self) -> MetricsSnapshot {
        let tiers = Tier::ALL
            .iter()
            .map(|tier| {
                let c = self.tier(*tier);
                let inference_count = c.inference_count.load(Ordering::Relaxed);
                let latency_sum = c.inference_latency_ms.load(Ordering::Relaxed);
                let average_latency_ms = if inference_count == 0 {
                    0.0
                } else {
                    latency_sum as f64 / inference_count as f64
                };
                let metrics = TierMetrics {
                    requests: c.requests.load(Ordering::Relaxed),
                    cache_hits: c.cache_hits.load(Ordering::Relaxed),
                    input_tokens: c.input_tokens.load(Ordering::Relaxed),
                    output_tokens: c.output_tokens.load(Ordering::Relaxed),
                    cost_usd: c.cost_usd.get(),
                    inference_count,
                    inference_latency_ms_sum: latency_sum,
                    average_latency_ms,
                    inference_failures: c.inference_failures.load(Ordering::Relaxed),
                };
                (*tier, metrics)
            })
            .collect();

        let decisions = STAGES
            .iter()
            .map(|stage| {
                (
                    stage.as_str().to_string(),
                    self.decisions[stage_index(*stage)].load(Ordering::Relaxed),
                )
            })
            .collect();

        MetricsSnapshot {
            timestamp: chrono::Utc::now().timestamp().max(0) as u64,
            uptime_seconds: self.started_at.elapsed().as_secs(),
            tiers,
            decisions,
            cache: CacheMetrics {
                hits: self.cache_hits.load(Ordering::Relaxed),
                misses: self.cache_misses.load(Ordering::Relaxed),
                errors: self.cache_errors.load(Ordering::Relaxed),
            },
            context_window: ContextWindowMetrics {
                escalations: self.context_escalations.load(Ordering::Relaxed),
                api_limit_exceeded: self.context_limit_exceeded.load(Ordering::Relaxed),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Snapshot types
// ---------------------------------------------------------------------------

/// Point-in-time snapshot of all router metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Unix timestamp (seconds) when snapshot was taken.
    pub timestamp: u64,
    pub uptime_seconds: u64,
    pub tiers: BTreeMap<Tier, TierMetrics>,
    /// Decisions by the stage that proposed the tier.
    pub decisions: BTreeMap<String, u64>,
    pub cache: CacheMetrics,
    pub context_window: ContextWindowMetrics,
}

/// Per-tier traffic, usage and latency.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TierMetrics {
    pub requests: u64,
    pub cache_hits: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost_usd: f64,
    pub inference_count: u64,
    pub inference_latency_ms_sum: u64,
    pub average_latency_ms: f64,
    pub inference_failures: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheMetrics {
    pub hits: u64,
    pub misses: u64,
    pub errors: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextWindowMetrics {
    pub escalations: u64,
    pub api_limit_exceeded: u64,
}

// ---------------------------------------------------------------------------
// Exporter trait
// ---------------------------------------------------------------------------

/// Trait for metrics export backends.
#[async_trait]
pub trait MetricsExporter: Send + Sync {
    /// Export a metrics snapshot to the backend.
    async fn export(&self, snapshot: &MetricsSnapshot) -> Result<(), MetricsError>;

    /// Flush pending data and release resources.
    async fn shutdown(&self) -> Result<(), MetricsError>;
}

/// File exporter settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileMetricsConfig {
    /// Path to the output JSON file.
    pub path: PathBuf,

    /// Pretty-print JSON output.
    #[serde(default = "default_pretty_print")]
    pub pretty_print: bool,
}

fn default_pretty_print() -> bool {
    true
}

/// Build the configured exporter, `None` when export is disabled.
pub fn create_exporter(
    config: &MetricsConfig,
) -> Result<Option<Arc<dyn MetricsExporter>>, MetricsError> {
    match &config.file {
        Some(path) => {
            let exporter = file::FileExporter::new(FileMetricsConfig {
                path: path.clone(),
                pretty_print: true,
            })?;
            Ok(Some(Arc::new(exporter)))
        }
        None => Ok(None),
    }
}

/// Export a snapshot every `interval` until the task is aborted.
pub fn spawn_export_loop(
    metrics: Arc<RouterMetrics>,
    exporter: Arc<dyn MetricsExporter>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if let Err(e) = exporter.export(&metrics.snapshot()).await {
                tracing::warn!("Metrics export failed: {}", e);
            }
        }
    })
}

/// Export one final snapshot and shut the exporter down, logging failures.
pub async fn flush(metrics: &RouterMetrics, exporter: &dyn MetricsExporter) {
    if let Err(e) = exporter.export(&metrics.snapshot()).await {
        tracing::warn!("Metrics export failed: {}", e);
    }
    if let Err(e) = exporter.shutdown().await {
        tracing::warn!("Metrics exporter shutdown failed: {}", e);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_counts_decisions_and_usage() {
        let metrics = RouterMetrics::new();
        metrics.record_decision(Tier::Small, DecisionStage::Classifier, false, false);
        metrics.record_decision(Tier::Api, DecisionStage::StaticRule, true, true);
        metrics.record_usage(Tier::Small, 10, 5, 0.25);
        metrics.record_usage(Tier::Small, 1, 1, 0.5);
        metrics.record_inference(Tier::Small, Duration::from_millis(30));
        metrics.record_inference(Tier::Small, Duration::from_millis(10));
        metrics.record_cache_miss();
        metrics.record_cache_hit(Tier::Api);
        metrics.record_cache_error();

        let snapshot = metrics.snapshot();
        let small = &snapshot.tiers[&Tier::Small];
        assert_eq!(small.requests, 1);
        assert_eq!(small.input_tokens, 11);
        assert_eq!(small.output_tokens, 6);
        assert_eq!(small.cost_usd, 0.75);
        assert_eq!(small.average_latency_ms, 20.0);
        assert_eq!(snapshot.tiers[&Tier::Api].cache_hits, 1);
        assert_eq!(snapshot.decisions["classifier"], 1);
        assert_eq!(snapshot.decisions["static_rule"], 1);
        assert_eq!(snapshot.decisions["fallback"], 0);
        assert_eq!(snapshot.cache, CacheMetrics { hits: 1, misses: 1, errors: 1 });
        assert_eq!(snapshot.context_window.escalations, 1);
        assert_eq!(snapshot.context_window.api_limit_exceeded, 1);
    }

    #[test]
    fn test_snapshot_serializes_tiers_by_name() {
        let json = serde_json::to_value(RouterMetrics::new().snapshot()).unwrap();
        assert!(json["tiers"].get("small").is_some());
        assert!(json["tiers"].get("api").is_some());
    }

    #[test]
    fn test_create_exporter_disabled_without_file() {
        assert!(create_exporter(&MetricsConfig::default()).unwrap().is_none());
    }

    #[test]
    fn test_create_exporter_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = MetricsConfig {
            file: Some(dir.path().join("metrics.json")),
            ..MetricsConfig::default()
        };
        assert!(create_exporter(&config).unwrap().is_some());
    }
}
