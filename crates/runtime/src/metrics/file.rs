//! Metrics snapshot file
//!
//! Each export replaces the whole file. The JSON is written to a sibling
//! temporary file and renamed over the target, so readers never observe a
//! partially written snapshot.

use super::{FileMetricsConfig, MetricsError, MetricsExporter, MetricsSnapshot};
use async_trait::async_trait;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Writes the latest [`MetricsSnapshot`] to a JSON file
pub struct FileExporter {
    path: PathBuf,
    pretty_print: bool,
}

impl FileExporter {
    pub fn new(config: FileMetricsConfig) -> Result<Self, MetricsError> {
        if let Some(dir) = config.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|e| {
                MetricsError::ConfigError(format!("cannot create {}: {}", dir.display(), e))
            })?;
        }
        Ok(Self {
            path: config.path,
            pretty_print: config.pretty_print,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn render(&self, snapshot: &MetricsSnapshot) -> Result<Vec<u8>, MetricsError> {
        let bytes = if self.pretty_print {
            serde_json::to_vec_pretty(snapshot)?
        } else {
            serde_json::to_vec(snapshot)?
        };
        Ok(bytes)
    }
}

/// Replace `path` with `bytes` through a temporary file in the same directory
fn replace_file(path: &Path, bytes: &[u8]) -> Result<(), MetricsError> {
    let dir = path
        .parent()
        .filter(|d| !d.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut staged = tempfile::NamedTempFile::new_in(dir)?;
    staged.write_all(bytes)?;
    staged.flush()?;
    staged
        .persist(path)
        .map_err(|e| MetricsError::ExportFailed(format!("rename onto {}: {}", path.display(), e)))?;
    Ok(())
}

#[async_trait]
impl MetricsExporter for FileExporter {
    async fn export(&self, snapshot: &MetricsSnapshot) -> Result<(), MetricsError> {
        let bytes = self.render(snapshot)?;
        let path = self.path.clone();

        tokio::task::spawn_blocking(move || replace_file(&path, &bytes))
            .await
            .map_err(|e| MetricsError::ExportFailed(format!("snapshot writer panicked: {}", e)))??;

        tracing::debug!(
            "Wrote metrics snapshot ({} tiers) to {}",
            snapshot.tiers.len(),
            self.path.display()
        );
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), MetricsError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::RouterMetrics;
    use crate::routing::{DecisionStage, Tier};

    fn sample_snapshot() -> MetricsSnapshot {
        let metrics = RouterMetrics::new();
        metrics.record_decision(Tier::Medium, DecisionStage::Heuristic, false, false);
        metrics.record_usage(Tier::Medium, 120, 40, 0.0032);
        metrics.snapshot()
    }

    #[tokio::test]
    async fn test_file_exporter_write_and_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.json");

        let exporter = FileExporter::new(FileMetricsConfig {
            path: path.clone(),
            pretty_print: true,
        })
        .unwrap();

        let snapshot = sample_snapshot();
        exporter.export(&snapshot).await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let loaded: MetricsSnapshot = serde_json::from_str(&content).unwrap();
        assert_eq!(loaded.tiers[&Tier::Medium].requests, 1);
        assert_eq!(loaded.tiers[&Tier::Medium].input_tokens, 120);
        assert_eq!(loaded.decisions["heuristic"], 1);
    }

    #[tokio::test]
    async fn test_file_exporter_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("deep").join("metrics.json");

        let exporter = FileExporter::new(FileMetricsConfig {
            path: path.clone(),
            pretty_print: false,
        })
        .unwrap();
        assert_eq!(exporter.path(), path.as_path());

        exporter.export(&sample_snapshot()).await.unwrap();
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_file_exporter_compact_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("compact.json");

        let exporter = FileExporter::new(FileMetricsConfig {
            path: path.clone(),
            pretty_print: false,
        })
        .unwrap();

        exporter.export(&sample_snapshot()).await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(!content.trim().contains('\n'));
    }

    #[tokio::test]
    async fn test_file_exporter_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("overwrite.json");

        let exporter = FileExporter::new(FileMetricsConfig {
            path: path.clone(),
            pretty_print: false,
        })
        .unwrap();

        let mut snapshot = sample_snapshot();
        exporter.export(&snapshot).await.unwrap();

        snapshot.cache.hits = 42;
        exporter.export(&snapshot).await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let loaded: MetricsSnapshot = serde_json::from_str(&content).unwrap();
        assert_eq!(loaded.cache.hits, 42);
    }
}
