//! Per-handle snapshot history
//!
//! Time-ordered, append-only history with bounded retention. Each handle
//! owns an independent series, so concurrent cycles for different handles
//! never contend on the same entry.

use crate::models::{ResourceHandle, Snapshot};
use dashmap::DashMap;
use std::collections::VecDeque;
use std::time::Duration;

/// Default retention window (30 days)
const DEFAULT_RETENTION: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Hard cap on samples kept per handle
const DEFAULT_MAX_SAMPLES: usize = 20_000;

/// Configuration for the snapshot history store
#[derive(Debug, Clone)]
pub struct HistoryConfig {
    /// Maximum age of retained snapshots
    pub retention: Duration,
    /// Maximum samples per handle regardless of age
    pub max_samples_per_handle: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            retention: DEFAULT_RETENTION,
            max_samples_per_handle: DEFAULT_MAX_SAMPLES,
        }
    }
}

/// Append-only snapshot store, partitioned by handle
pub struct SnapshotHistory {
    series: DashMap<String, VecDeque<Snapshot>>,
    config: HistoryConfig,
}

impl SnapshotHistory {
    pub fn new(config: HistoryConfig) -> Self {
        Self {
            series: DashMap::new(),
            config,
        }
    }

    /// Append a snapshot and evict entries outside the retention window
    pub fn append(&self, snapshot: Snapshot) {
        let key = snapshot.handle.key();
        let cutoff = snapshot.timestamp - self.config.retention.as_secs() as i64;

        let mut entry = self.series.entry(key).or_default();
        entry.push_back(snapshot);

        while let Some(front) = entry.front() {
            if front.timestamp < cutoff {
                entry.pop_front();
            } else {
                break;
            }
        }
        while entry.len() > self.config.max_samples_per_handle {
            entry.pop_front();
        }
    }

    /// Snapshots for a handle within `window` of `now`, oldest first
    pub fn window(&self, handle: &ResourceHandle, window: Duration, now: i64) -> Vec<Snapshot> {
        let cutoff = now - window.as_secs() as i64;
        self.series
            .get(&handle.key())
            .map(|series| {
                series
                    .iter()
                    .filter(|s| s.timestamp >= cutoff)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of retained samples for a handle
    pub fn sample_count(&self, handle: &ResourceHandle) -> usize {
        self.series
            .get(&handle.key())
            .map(|series| series.len())
            .unwrap_or(0)
    }

    /// Number of handles with at least one sample
    pub fn handle_count(&self) -> usize {
        self.series.len()
    }

    /// Drop all history for a handle
    pub fn remove(&self, handle: &ResourceHandle) {
        self.series.remove(&handle.key());
    }
}

impl Default for SnapshotHistory {
    fn default() -> Self {
        Self::new(HistoryConfig::default())
    }
}
