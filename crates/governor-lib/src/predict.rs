//! Demand prediction
//!
//! Projects utilization over a configurable horizon from the current
//! snapshot and trend summary. The predictor never fails: with
//! insufficient history it degrades to a fixed growth factor at low
//! confidence, so the policy evaluator always has a decision input.

use crate::models::{Prediction, Snapshot, TrendSummary};
use std::time::Duration;

/// Default projection horizon (7 days)
pub const DEFAULT_HORIZON: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Growth factor applied when trend data is insufficient
pub const FALLBACK_GROWTH_FACTOR: f64 = 1.15;

/// Confidence reported for fallback predictions
pub const FALLBACK_CONFIDENCE: f64 = 0.3;

/// Sample count at which the sample-size factor saturates
const FULL_CONFIDENCE_SAMPLES: f64 = 30.0;

/// Deterministic trend-extrapolation predictor
///
/// A model-backed predictor can be substituted behind the same
/// [`Prediction`] contract without touching the rest of the engine.
pub struct DemandPredictor {
    horizon: Duration,
    fallback_growth: f64,
}

impl DemandPredictor {
    pub fn new() -> Self {
        Self {
            horizon: DEFAULT_HORIZON,
            fallback_growth: FALLBACK_GROWTH_FACTOR,
        }
    }

    pub fn with_horizon(mut self, horizon: Duration) -> Self {
        self.horizon = horizon;
        self
    }

    /// Set the fallback growth factor, clamped to [1.1, 1.2]
    pub fn with_fallback_growth(mut self, factor: f64) -> Self {
        self.fallback_growth = factor.clamp(1.1, 1.2);
        self
    }

    /// Project usage at the horizon
    ///
    /// The projection is floored at current usage: the engine only grows
    /// provisioned headroom proactively, it never shrinks it.
    pub fn predict(&self, current: &Snapshot, trend: &TrendSummary) -> Prediction {
        let horizon_secs = self.horizon.as_secs();

        if trend.insufficient_data {
            return Prediction {
                projected_usage: current.current_usage * self.fallback_growth,
                horizon_secs,
                confidence: FALLBACK_CONFIDENCE,
            };
        }

        let projected = current.current_usage + trend.slope * horizon_secs as f64;

        Prediction {
            projected_usage: projected.max(current.current_usage),
            horizon_secs,
            confidence: confidence(trend),
        }
    }
}

impl Default for DemandPredictor {
    fn default() -> Self {
        Self::new()
    }
}

/// Confidence grows with sample count and shrinks with dispersion
fn confidence(trend: &TrendSummary) -> f64 {
    let sample_factor = (trend.sample_count as f64 / FULL_CONFIDENCE_SAMPLES).min(1.0);
    let dispersion = if trend.mean > f64::EPSILON {
        trend.variance / trend.mean
    } else {
        0.0
    };
    (sample_factor / (1.0 + dispersion)).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ResourceHandle;

    fn snapshot(usage: f64) -> Snapshot {
        Snapshot {
            handle: ResourceHandle::new("ec2", "running-instances", "us-east-1", "vcpu"),
            timestamp: 1_700_000_000,
            current_usage: usage,
            limit_value: 100.0,
        }
    }

    fn trend(slope: f64, mean: f64, variance: f64, samples: usize) -> TrendSummary {
        TrendSummary {
            mean,
            variance,
            slope,
            peak: mean,
            spike_events: Vec::new(),
            sample_count: samples,
            insufficient_data: false,
        }
    }

    #[test]
    fn test_fallback_on_insufficient_data() {
        let predictor = DemandPredictor::new();
        let prediction = predictor.predict(&snapshot(50.0), &TrendSummary::insufficient(3));

        assert!(prediction.confidence <= 0.3);
        assert!(prediction.projected_usage >= 50.0 * 1.1);
        assert!(prediction.projected_usage <= 50.0 * 1.2);
    }

    #[test]
    fn test_growth_projection() {
        let predictor = DemandPredictor::new().with_horizon(Duration::from_secs(3600));
        // 0.01 usage units per second over a 1-hour horizon
        let prediction = predictor.predict(&snapshot(50.0), &trend(0.01, 50.0, 0.5, 30));

        assert!((prediction.projected_usage - 86.0).abs() < 1e-9);
        assert_eq!(prediction.horizon_secs, 3600);
    }

    #[test]
    fn test_declining_trend_floors_at_current() {
        let predictor = DemandPredictor::new();
        let prediction = predictor.predict(&snapshot(50.0), &trend(-0.5, 50.0, 0.5, 30));

        assert_eq!(prediction.projected_usage, 50.0);
    }

    #[test]
    fn test_confidence_scales_with_samples() {
        let predictor = DemandPredictor::new();
        let few = predictor.predict(&snapshot(50.0), &trend(0.0, 50.0, 1.0, 8));
        let many = predictor.predict(&snapshot(50.0), &trend(0.0, 50.0, 1.0, 60));

        assert!(many.confidence > few.confidence);
        assert!(many.confidence <= 1.0);
    }

    #[test]
    fn test_confidence_shrinks_with_dispersion() {
        let predictor = DemandPredictor::new();
        let steady = predictor.predict(&snapshot(50.0), &trend(0.0, 50.0, 1.0, 30));
        let noisy = predictor.predict(&snapshot(50.0), &trend(0.0, 50.0, 200.0, 30));

        assert!(steady.confidence > noisy.confidence);
    }

    #[test]
    fn test_zero_mean_does_not_divide_by_zero() {
        let predictor = DemandPredictor::new();
        let prediction = predictor.predict(&snapshot(0.0), &trend(0.0, 0.0, 0.0, 30));

        assert!(prediction.confidence >= 0.0 && prediction.confidence <= 1.0);
    }

    #[test]
    fn test_fallback_growth_clamped() {
        let predictor = DemandPredictor::new().with_fallback_growth(5.0);
        let prediction = predictor.predict(&snapshot(100.0), &TrendSummary::insufficient(0));

        assert!(prediction.projected_usage <= 120.0);
    }
}
