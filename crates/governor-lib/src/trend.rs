//! Trend analysis over snapshot history
//!
//! Computes the least-squares utilization slope, sample variance, peak and
//! spike events for one handle's windowed history. Pure functions over the
//! input window; no state is retained between cycles.

use crate::models::{Snapshot, SpikeEvent, TrendSummary};

/// Minimum samples before statistics are trusted
pub const DEFAULT_MIN_SAMPLES: usize = 7;

/// Trailing sub-window used for spike detection
pub const DEFAULT_SPIKE_WINDOW: usize = 10;

/// Standard deviations above the rolling mean that flag a spike
pub const DEFAULT_SPIKE_SIGMA: f64 = 2.0;

/// Computes a [`TrendSummary`] from ordered snapshot history
pub struct TrendAnalyzer {
    min_samples: usize,
    spike_window: usize,
    spike_sigma: f64,
}

impl TrendAnalyzer {
    pub fn new() -> Self {
        Self {
            min_samples: DEFAULT_MIN_SAMPLES,
            spike_window: DEFAULT_SPIKE_WINDOW,
            spike_sigma: DEFAULT_SPIKE_SIGMA,
        }
    }

    pub fn with_min_samples(mut self, min_samples: usize) -> Self {
        self.min_samples = min_samples;
        self
    }

    pub fn with_spike_window(mut self, spike_window: usize, spike_sigma: f64) -> Self {
        self.spike_window = spike_window;
        self.spike_sigma = spike_sigma;
        self
    }

    /// Analyze a time-ordered window of snapshots
    ///
    /// Below the minimum sample count the summary carries
    /// `insufficient_data = true` instead of fabricated statistics.
    pub fn analyze(&self, snapshots: &[Snapshot]) -> TrendSummary {
        if snapshots.len() < self.min_samples {
            return TrendSummary::insufficient(snapshots.len());
        }

        let usages: Vec<f64> = snapshots.iter().map(|s| s.current_usage).collect();
        let mean = usages.iter().sum::<f64>() / usages.len() as f64;
        let variance = sample_variance(&usages, mean);
        let peak = usages
            .iter()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max)
            .max(0.0);

        let t0 = snapshots[0].timestamp;
        let points: Vec<(f64, f64)> = snapshots
            .iter()
            .map(|s| ((s.timestamp - t0) as f64, s.current_usage))
            .collect();

        TrendSummary {
            mean,
            variance,
            slope: least_squares_slope(&points),
            peak,
            spike_events: self.detect_spikes(snapshots),
            sample_count: snapshots.len(),
            insufficient_data: false,
        }
    }

    /// Scan for points exceeding the trailing rolling baseline
    fn detect_spikes(&self, snapshots: &[Snapshot]) -> Vec<SpikeEvent> {
        let mut spikes = Vec::new();
        if snapshots.len() <= self.spike_window {
            return spikes;
        }

        for i in self.spike_window..snapshots.len() {
            let trailing = &snapshots[i - self.spike_window..i];
            let values: Vec<f64> = trailing.iter().map(|s| s.current_usage).collect();
            let baseline = values.iter().sum::<f64>() / values.len() as f64;
            let std_dev = sample_variance(&values, baseline).sqrt();

            // A flat baseline has no meaningful deviation threshold
            if std_dev < f64::EPSILON {
                continue;
            }

            let current = &snapshots[i];
            if current.current_usage > baseline + self.spike_sigma * std_dev {
                let ratio = if baseline < f64::EPSILON {
                    0.0
                } else {
                    current.current_usage / baseline
                };
                spikes.push(SpikeEvent {
                    timestamp: current.timestamp,
                    usage: current.current_usage,
                    baseline,
                    ratio,
                });
            }
        }

        spikes
    }
}

impl Default for TrendAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

/// Least-squares linear fit over (elapsed seconds, usage) points
fn least_squares_slope(points: &[(f64, f64)]) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }
    let n = points.len() as f64;
    let sum_x: f64 = points.iter().map(|(x, _)| x).sum();
    let sum_y: f64 = points.iter().map(|(_, y)| y).sum();
    let sum_xy: f64 = points.iter().map(|(x, y)| x * y).sum();
    let sum_x2: f64 = points.iter().map(|(x, _)| x * x).sum();
    let denom = n * sum_x2 - sum_x * sum_x;
    if denom.abs() < f64::EPSILON {
        return 0.0;
    }
    (n * sum_xy - sum_x * sum_y) / denom
}

/// Sample variance with Bessel's correction
fn sample_variance(values: &[f64], mean: f64) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ResourceHandle;

    fn test_handle() -> ResourceHandle {
        ResourceHandle::new("ec2", "running-instances", "us-east-1", "vcpu")
    }

    fn series(values: &[f64]) -> Vec<Snapshot> {
        values
            .iter()
            .enumerate()
            .map(|(i, &usage)| Snapshot {
                handle: test_handle(),
                timestamp: 1000 + i as i64 * 60,
                current_usage: usage,
                limit_value: 100.0,
            })
            .collect()
    }

    #[test]
    fn test_insufficient_data() {
        let analyzer = TrendAnalyzer::new();
        let summary = analyzer.analyze(&series(&[1.0, 2.0, 3.0]));

        assert!(summary.insufficient_data);
        assert_eq!(summary.sample_count, 3);
        assert_eq!(summary.slope, 0.0);
        assert!(summary.spike_events.is_empty());
    }

    #[test]
    fn test_linear_growth_slope() {
        let analyzer = TrendAnalyzer::new();
        // +1 usage unit per 60-second step
        let summary = analyzer.analyze(&series(&[10.0, 11.0, 12.0, 13.0, 14.0, 15.0, 16.0]));

        assert!(!summary.insufficient_data);
        assert!((summary.slope - 1.0 / 60.0).abs() < 1e-9);
        assert!((summary.mean - 13.0).abs() < 1e-9);
        assert_eq!(summary.peak, 16.0);
    }

    #[test]
    fn test_constant_usage_no_divide_by_zero() {
        let analyzer = TrendAnalyzer::new().with_spike_window(3, 2.0);
        let summary = analyzer.analyze(&series(&[5.0; 20]));

        assert_eq!(summary.slope, 0.0);
        assert_eq!(summary.variance, 0.0);
        assert!(summary.spike_events.is_empty());
    }

    #[test]
    fn test_spike_detection() {
        let analyzer = TrendAnalyzer::new().with_spike_window(10, 2.0);
        // Stable noisy baseline, then a jump
        let mut values: Vec<f64> = (0..20).map(|i| 10.0 + (i % 5) as f64 * 0.1).collect();
        values.push(25.0);
        let summary = analyzer.analyze(&series(&values));

        assert_eq!(summary.spike_events.len(), 1);
        let spike = &summary.spike_events[0];
        assert_eq!(spike.usage, 25.0);
        assert!(spike.baseline > 9.0 && spike.baseline < 11.0);
        assert!(spike.ratio > 2.0);
    }

    #[test]
    fn test_variance_calculation() {
        let analyzer = TrendAnalyzer::new();
        let summary = analyzer.analyze(&series(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]));
        assert!((summary.variance - 4.571).abs() < 0.01);
    }

    #[test]
    fn test_empty_window() {
        let analyzer = TrendAnalyzer::new();
        let summary = analyzer.analyze(&[]);
        assert!(summary.insufficient_data);
        assert_eq!(summary.sample_count, 0);
    }
}
