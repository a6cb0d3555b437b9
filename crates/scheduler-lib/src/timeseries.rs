//! Per-resource time-series store
//!
//! Holds recent utilization samples in a bounded ring buffer per resource:
//! - Monotonic timestamps and percentage bounds enforced on append
//! - Count and age retention with lazy oldest-first eviction
//! - Optional JSON snapshot persistence for restarts

use crate::error::{SchedulerError, SchedulerResult};
use crate::models::Sample;
use anyhow::{Context, Result};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default per-resource sample cap (7 days at 5 minute resolution)
pub const DEFAULT_MAX_SAMPLES: usize = 2016;

/// Default retention period (7 days)
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Configuration for the time-series store
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Maximum samples kept per resource
    pub max_samples: usize,
    /// Maximum age of a sample relative to the newest one for its resource
    pub retention: Duration,
    /// Snapshot file for durability (optional)
    pub persistence_path: Option<PathBuf>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_samples: DEFAULT_MAX_SAMPLES,
            retention: DEFAULT_RETENTION,
            persistence_path: None,
        }
    }
}

/// Ring buffer for a single resource
#[derive(Debug, Default)]
struct SeriesBuffer {
    samples: VecDeque<Sample>,
}

impl SeriesBuffer {
    fn newest_timestamp(&self) -> Option<i64> {
        self.samples.back().map(|s| s.timestamp)
    }

    fn push(&mut self, sample: Sample, config: &StoreConfig) {
        while self.samples.len() >= config.max_samples.max(1) {
            self.samples.pop_front();
        }

        let cutoff = sample.timestamp.saturating_sub(secs(config.retention));
        while let Some(front) = self.samples.front() {
            if front.timestamp < cutoff {
                self.samples.pop_front();
            } else {
                break;
            }
        }

        self.samples.push_back(sample);
    }
}

/// Min/avg/max of one metric over a period
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricSummary {
    pub min: f64,
    pub avg: f64,
    pub max: f64,
}

impl MetricSummary {
    fn from_values(values: impl Iterator<Item = f64>) -> Option<Self> {
        let mut count = 0usize;
        let mut sum = 0.0;
        let mut min = f64::MAX;
        let mut max = f64::MIN;
        for v in values {
            count += 1;
            sum += v;
            min = min.min(v);
            max = max.max(v);
        }
        if count == 0 {
            return None;
        }
        Some(Self {
            min,
            avg: sum / count as f64,
            max,
        })
    }
}

/// Utilization statistics for a resource over a period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UtilizationStats {
    pub resource_id: String,
    pub period_secs: u64,
    pub sample_count: usize,
    pub cpu: MetricSummary,
    pub memory: MetricSummary,
    pub disk: MetricSummary,
}

/// Store statistics
#[derive(Debug, Clone)]
pub struct StoreStats {
    pub resources: usize,
    pub total_samples: usize,
    pub max_samples_per_resource: usize,
    pub retention_seconds: u64,
}

/// In-memory time-series store keyed by resource id
///
/// Each resource's buffer has a single writer (the ingestion path) and any
/// number of readers; the map shards its locks so resources do not contend.
pub struct TimeSeriesStore {
    series: DashMap<String, SeriesBuffer>,
    config: StoreConfig,
}

impl Default for TimeSeriesStore {
    fn default() -> Self {
        Self::new(StoreConfig::default())
    }
}

impl TimeSeriesStore {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            series: DashMap::new(),
            config,
        }
    }

    /// Create a store, restoring the snapshot at `persistence_path` if present
    pub fn with_persistence(config: StoreConfig) -> Self {
        let store = Self::new(config);
        if let Some(path) = store.config.persistence_path.clone() {
            if path.exists() {
                if let Err(e) = store.load_from_disk(&path) {
                    warn!(error = %e, "Failed to load persisted samples, starting fresh");
                }
            }
        }
        store
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Append a sample for its resource
    ///
    /// Rejects out-of-range percentages and timestamps that are not strictly
    /// newer than the newest stored sample for that resource.
    pub fn append(&self, sample: Sample) -> SchedulerResult<()> {
        validate_sample(&sample)?;

        let mut buffer = self.series.entry(sample.resource_id.clone()).or_default();
        if let Some(newest) = buffer.newest_timestamp() {
            if sample.timestamp <= newest {
                return Err(SchedulerError::InvalidSample {
                    resource_id: sample.resource_id,
                    reason: format!(
                        "timestamp {} is not newer than stored sample at {}",
                        sample.timestamp, newest
                    ),
                });
            }
        }

        buffer.push(sample, &self.config);
        Ok(())
    }

    /// Samples within `duration` of the newest sample, oldest first
    ///
    /// Returns an empty vector for unknown resources; callers treat that as
    /// insufficient history.
    pub fn window(&self, resource_id: &str, duration: Duration) -> Vec<Sample> {
        let Some(buffer) = self.series.get(resource_id) else {
            return Vec::new();
        };
        let Some(newest) = buffer.newest_timestamp() else {
            return Vec::new();
        };
        let cutoff = newest.saturating_sub(secs(duration));
        buffer
            .samples
            .iter()
            .filter(|s| s.timestamp >= cutoff)
            .cloned()
            .collect()
    }

    /// Most recent sample for a resource
    pub fn latest(&self, resource_id: &str) -> Option<Sample> {
        self.series
            .get(resource_id)
            .and_then(|b| b.samples.back().cloned())
    }

    /// Min/avg/max utilization over the trailing period
    pub fn stats(&self, resource_id: &str, period: Duration) -> Option<UtilizationStats> {
        let window = self.window(resource_id, period);
        Some(UtilizationStats {
            resource_id: resource_id.to_string(),
            period_secs: period.as_secs(),
            sample_count: window.len(),
            cpu: MetricSummary::from_values(window.iter().map(|s| s.cpu_pct))?,
            memory: MetricSummary::from_values(window.iter().map(|s| s.mem_pct))?,
            disk: MetricSummary::from_values(window.iter().map(|s| s.disk_pct))?,
        })
    }

    /// Number of samples stored for a resource
    pub fn len(&self, resource_id: &str) -> usize {
        self.series
            .get(resource_id)
            .map(|b| b.samples.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.series.iter().all(|b| b.samples.is_empty())
    }

    pub fn resource_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.series.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Drop all samples of a resource
    pub fn remove(&self, resource_id: &str) {
        self.series.remove(resource_id);
    }

    pub fn stats_summary(&self) -> StoreStats {
        StoreStats {
            resources: self.series.len(),
            total_samples: self.series.iter().map(|b| b.samples.len()).sum(),
            max_samples_per_resource: self.config.max_samples,
            retention_seconds: self.config.retention.as_secs(),
        }
    }

    /// Write the snapshot if persistence is enabled
    pub fn flush(&self) -> Result<()> {
        if let Some(ref path) = self.config.persistence_path {
            self.save_to_disk(path)?;
            debug!(path = %path.display(), resources = self.series.len(), "Samples flushed to disk");
        }
        Ok(())
    }

    fn save_to_disk(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {:?}", parent))?;
        }

        let snapshot: HashMap<String, Vec<Sample>> = self
            .series
            .iter()
            .map(|e| (e.key().clone(), e.samples.iter().cloned().collect()))
            .collect();
        let json = serde_json::to_vec(&snapshot).context("Failed to serialize samples")?;

        // Write atomically using temp file
        let temp_path = path.with_extension("tmp");
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)
            .with_context(|| format!("Failed to create temp file {:?}", temp_path))?;
        file.write_all(&json).context("Failed to write samples")?;
        file.sync_all().context("Failed to sync samples file")?;

        std::fs::rename(&temp_path, path)
            .with_context(|| format!("Failed to rename {:?} to {:?}", temp_path, path))?;
        Ok(())
    }

    fn load_from_disk(&self, path: &Path) -> Result<()> {
        let mut file =
            File::open(path).with_context(|| format!("Failed to open samples file {:?}", path))?;
        let mut data = Vec::new();
        file.read_to_end(&mut data)
            .context("Failed to read samples file")?;

        let snapshot: HashMap<String, Vec<Sample>> =
            serde_json::from_slice(&data).context("Failed to deserialize samples")?;

        let mut loaded = 0usize;
        for (_, samples) in snapshot {
            for sample in samples {
                // Re-validate; a corrupt entry is skipped rather than failing the restore
                if self.append(sample).is_ok() {
                    loaded += 1;
                }
            }
        }

        info!(path = %path.display(), samples = loaded, "Loaded samples from disk");
        Ok(())
    }
}

fn validate_sample(sample: &Sample) -> SchedulerResult<()> {
    let checks = [
        ("cpu_pct", sample.cpu_pct),
        ("mem_pct", sample.mem_pct),
        ("disk_pct", sample.disk_pct),
    ];
    for (name, value) in checks {
        if !value.is_finite() || !(0.0..=100.0).contains(&value) {
            return Err(SchedulerError::InvalidSample {
                resource_id: sample.resource_id.clone(),
                reason: format!("{} = {} is outside [0, 100]", name, value),
            });
        }
    }
    if sample.resource_id.is_empty() {
        return Err(SchedulerError::InvalidSample {
            resource_id: String::new(),
            reason: "resource_id is empty".to_string(),
        });
    }
    if sample.timestamp < 0 || chrono::DateTime::from_timestamp(sample.timestamp, 0).is_none() {
        return Err(SchedulerError::InvalidSample {
            resource_id: sample.resource_id.clone(),
            reason: format!("timestamp {} is out of range", sample.timestamp),
        });
    }
    Ok(())
}

/// Whole seconds of `d`, clamped to i64
pub(crate) fn secs(d: Duration) -> i64 {
    i64::try_from(d.as_secs()).unwrap_or(i64::MAX)
}
