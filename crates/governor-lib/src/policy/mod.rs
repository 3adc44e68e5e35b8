//! Policy configuration
//!
//! Policies are operator-owned, long-lived configuration read by the
//! engine each cycle. Thresholds are validated lazily so a malformed
//! policy skips its handle with a surfaced configuration error instead of
//! taking down the loop.

mod evaluator;

pub use evaluator::{EvaluationInput, PolicyEvaluator};

use crate::error::PolicyError;
use crate::models::ResourceHandle;
use chrono::{DateTime, Datelike, Timelike};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Operator-configured ceiling on how autonomously the engine may act
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutomationLevel {
    /// Observe only; never act
    Monitor,
    /// Notify only; never change capacity
    Alert,
    /// May file increase requests through the ticket path
    AutoRequest,
    /// May execute increases directly at critical severity
    AutoApprove,
    /// May also act preemptively at warning severity
    FullAuto,
}

impl std::fmt::Display for AutomationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AutomationLevel::Monitor => write!(f, "monitor"),
            AutomationLevel::Alert => write!(f, "alert"),
            AutomationLevel::AutoRequest => write!(f, "auto_request"),
            AutomationLevel::AutoApprove => write!(f, "auto_approve"),
            AutomationLevel::FullAuto => write!(f, "full_auto"),
        }
    }
}

fn default_multiplier() -> f64 {
    1.5
}

fn default_unbounded() -> f64 {
    f64::MAX
}

/// Per-handle governance policy
///
/// Thresholds are utilization percentages. All three are required; a
/// policy missing one fails validation for every cycle until fixed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    pub automation_level: AutomationLevel,
    #[serde(default)]
    pub warning_threshold: Option<f64>,
    #[serde(default)]
    pub critical_threshold: Option<f64>,
    #[serde(default)]
    pub emergency_threshold: Option<f64>,
    /// Sizing multiplier applied at critical severity
    #[serde(default = "default_multiplier")]
    pub max_increase_multiplier: f64,
    /// Absolute cap on any requested limit value
    #[serde(default = "default_unbounded")]
    pub max_absolute_increase: f64,
    /// Estimated-cost ceiling above which approval is forced
    #[serde(default = "default_unbounded")]
    pub cost_ceiling: f64,
    #[serde(default)]
    pub requires_approval: bool,
    #[serde(default)]
    pub business_hours_only: bool,
}

/// Validated threshold set
#[derive(Debug, Clone, Copy)]
pub struct Thresholds {
    pub warning: f64,
    pub critical: f64,
    pub emergency: f64,
}

impl Policy {
    /// Validate and extract the threshold set
    pub fn thresholds(&self, handle: &ResourceHandle) -> Result<Thresholds, PolicyError> {
        let warning = self.require(handle, "warning_threshold", self.warning_threshold)?;
        let critical = self.require(handle, "critical_threshold", self.critical_threshold)?;
        let emergency = self.require(handle, "emergency_threshold", self.emergency_threshold)?;

        if warning <= 0.0 || critical <= 0.0 || emergency <= 0.0 {
            return Err(PolicyError::InvalidThresholds {
                handle: handle.key(),
                reason: "thresholds must be positive percentages".to_string(),
            });
        }
        if warning >= critical || critical >= emergency {
            return Err(PolicyError::InvalidThresholds {
                handle: handle.key(),
                reason: format!(
                    "expected warning < critical < emergency, got {} / {} / {}",
                    warning, critical, emergency
                ),
            });
        }

        Ok(Thresholds {
            warning,
            critical,
            emergency,
        })
    }

    fn require(
        &self,
        handle: &ResourceHandle,
        threshold: &'static str,
        value: Option<f64>,
    ) -> Result<f64, PolicyError> {
        value.ok_or_else(|| PolicyError::MissingThreshold {
            handle: handle.key(),
            threshold,
        })
    }
}

fn default_start_hour() -> u32 {
    8
}

fn default_end_hour() -> u32 {
    18
}

/// Weekday hour window (UTC) for `business_hours_only` policies
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusinessHours {
    #[serde(default = "default_start_hour")]
    pub start_hour: u32,
    #[serde(default = "default_end_hour")]
    pub end_hour: u32,
}

impl Default for BusinessHours {
    fn default() -> Self {
        Self {
            start_hour: default_start_hour(),
            end_hour: default_end_hour(),
        }
    }
}

impl BusinessHours {
    /// True when the timestamp falls on a weekday within the window
    pub fn contains(&self, timestamp: i64) -> bool {
        let Some(dt) = DateTime::from_timestamp(timestamp, 0) else {
            return false;
        };
        let weekday = dt.weekday().num_days_from_monday();
        if weekday >= 5 {
            return false;
        }
        let hour = dt.hour();
        hour >= self.start_hour && hour < self.end_hour
    }
}

/// Read-only policy lookup, owned by the operator/config layer
pub trait PolicyStore: Send + Sync {
    fn policy_for(&self, handle: &ResourceHandle) -> Option<Policy>;
}

/// Policy store resolving exact key, then `service/*`, then `*`
#[derive(Debug, Default)]
pub struct InMemoryPolicyStore {
    exact: HashMap<String, Policy>,
    per_service: HashMap<String, Policy>,
    fallback: Option<Policy>,
}

impl InMemoryPolicyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a policy for an exact handle key or a pattern
    ///
    /// Accepted patterns: `service/limit_id/region`, `service/*`, `*`.
    pub fn insert(&mut self, pattern: impl Into<String>, policy: Policy) {
        let pattern = pattern.into();
        if pattern == "*" {
            self.fallback = Some(policy);
        } else if let Some(service) = pattern.strip_suffix("/*") {
            self.per_service.insert(service.to_string(), policy);
        } else {
            self.exact.insert(pattern, policy);
        }
    }

    pub fn len(&self) -> usize {
        self.exact.len() + self.per_service.len() + usize::from(self.fallback.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PolicyStore for InMemoryPolicyStore {
    fn policy_for(&self, handle: &ResourceHandle) -> Option<Policy> {
        self.exact
            .get(&handle.key())
            .or_else(|| self.per_service.get(&handle.service))
            .or(self.fallback.as_ref())
            .cloned()
    }
}

/// Per-kind unit cost rates, supplied by configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CostModel {
    #[serde(default)]
    pub rates: HashMap<String, f64>,
    /// Rate applied to kinds without an explicit entry
    #[serde(default)]
    pub default_rate: f64,
}

impl CostModel {
    pub fn rate_for(&self, kind: &str) -> f64 {
        self.rates.get(kind).copied().unwrap_or(self.default_rate)
    }
}

#[cfg(test)]
pub(crate) fn test_policy(level: AutomationLevel) -> Policy {
    Policy {
        automation_level: level,
        warning_threshold: Some(70.0),
        critical_threshold: Some(85.0),
        emergency_threshold: Some(95.0),
        max_increase_multiplier: 1.5,
        max_absolute_increase: f64::MAX,
        cost_ceiling: f64::MAX,
        requires_approval: false,
        business_hours_only: false,
    }
}
