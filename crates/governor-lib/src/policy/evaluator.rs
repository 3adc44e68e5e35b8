//! Policy evaluation
//!
//! Pure, deterministic decision step: given the current snapshot, the
//! prediction and the handle's policy, decide whether an action is
//! warranted and size it. The closed `(automation level, severity)`
//! mapping table replaces the string-keyed dispatch seen in operational
//! runbooks with an exhaustively checked match.

use super::{AutomationLevel, BusinessHours, CostModel, Policy, Thresholds};
use crate::error::PolicyError;
use crate::models::{
    Action, ActionKind, ActionProposal, ActionStatus, Prediction, Severity, Snapshot,
};

/// Sizing multiplier at emergency severity
const EMERGENCY_MULTIPLIER: f64 = 2.0;

/// Sizing multiplier at warning severity (preemptive increases)
const WARNING_MULTIPLIER: f64 = 1.2;

/// Default suppression window for repeated alerts (15 minutes)
const DEFAULT_ALERT_DEDUP_SECS: i64 = 15 * 60;

/// Everything the evaluator needs for one handle's cycle
pub struct EvaluationInput<'a> {
    pub snapshot: &'a Snapshot,
    pub prediction: &'a Prediction,
    pub policy: &'a Policy,
    /// Outstanding non-terminal action for the handle, if any
    pub outstanding: Option<&'a Action>,
    /// Most recently resolved action for the handle, if any
    pub last_resolved: Option<&'a Action>,
    /// Evaluation wall-clock time (unix seconds)
    pub now: i64,
}

/// Decides what action, if any, a handle's cycle warrants
pub struct PolicyEvaluator {
    cost_model: CostModel,
    business_hours: BusinessHours,
    alert_dedup_secs: i64,
}

impl PolicyEvaluator {
    pub fn new(cost_model: CostModel, business_hours: BusinessHours) -> Self {
        Self {
            cost_model,
            business_hours,
            alert_dedup_secs: DEFAULT_ALERT_DEDUP_SECS,
        }
    }

    pub fn with_alert_dedup_secs(mut self, secs: i64) -> Self {
        self.alert_dedup_secs = secs;
        self
    }

    /// Evaluate one handle's cycle
    ///
    /// `Ok(None)` means no action this cycle. The only error is a
    /// malformed policy, which the caller surfaces to the operator and
    /// skips for the cycle.
    pub fn evaluate(&self, input: EvaluationInput<'_>) -> Result<Option<ActionProposal>, PolicyError> {
        let snapshot = input.snapshot;
        let policy = input.policy;

        // Malformed policy is a configuration error at any automation level
        let thresholds = policy.thresholds(&snapshot.handle)?;

        if policy.automation_level == AutomationLevel::Monitor {
            return Ok(None);
        }

        // Coalescing: one non-terminal action per handle at a time
        if input.outstanding.is_some() {
            return Ok(None);
        }

        if snapshot.limit_value <= f64::EPSILON {
            return Ok(None);
        }

        let current_ratio = snapshot.current_usage / snapshot.limit_value;
        let predicted_ratio = input.prediction.projected_usage / snapshot.limit_value;
        let max_utilization = current_ratio.max(predicted_ratio) * 100.0;

        let Some(severity) = severity_for(max_utilization, &thresholds) else {
            return Ok(None);
        };

        // Outside business hours only emergencies get through
        if policy.business_hours_only
            && severity < Severity::Emergency
            && !self.business_hours.contains(input.now)
        {
            return Ok(None);
        }

        let Some(kind) = action_kind_for(policy.automation_level, severity) else {
            return Ok(None);
        };

        let (requested_value, estimated_cost) = if kind.is_increase() {
            let multiplier = multiplier_for(severity, policy);
            let requested = (snapshot.limit_value * multiplier)
                .min(policy.max_absolute_increase)
                .max(snapshot.limit_value);
            let rate = self.cost_model.rate_for(&snapshot.handle.kind);
            (requested, (requested - snapshot.limit_value) * rate)
        } else {
            (snapshot.limit_value, 0.0)
        };

        // A granted increase that has not propagated into the snapshot yet
        // must not be re-proposed at the same or smaller size.
        if kind.is_increase() {
            if let Some(last) = input.last_resolved {
                if last.status == ActionStatus::Succeeded
                    && last.kind.is_increase()
                    && snapshot.limit_value < last.requested_value
                    && requested_value <= last.requested_value
                {
                    return Ok(None);
                }
            }
        }

        // A just-delivered alert at the same severity is not repeated
        // until the dedup window elapses.
        if kind == ActionKind::Alert {
            if let Some(last) = input.last_resolved {
                if last.status == ActionStatus::Succeeded
                    && last.kind == ActionKind::Alert
                    && last.severity == severity
                    && input.now - last.resolved_at.unwrap_or(last.created_at)
                        < self.alert_dedup_secs
                {
                    return Ok(None);
                }
            }
        }

        // The cost gate always wins over the automation level
        let kind = if kind.is_increase()
            && policy.requires_approval
            && estimated_cost > policy.cost_ceiling
        {
            ActionKind::ApprovalPending
        } else {
            kind
        };

        Ok(Some(ActionProposal {
            handle: snapshot.handle.clone(),
            kind,
            severity,
            requested_value,
            estimated_cost,
            reason: format!(
                "max utilization {:.1}% crossed the {} threshold",
                max_utilization, severity
            ),
        }))
    }
}

/// Map utilization onto the policy's severity bands, descending
fn severity_for(max_utilization: f64, thresholds: &Thresholds) -> Option<Severity> {
    if max_utilization >= thresholds.emergency {
        Some(Severity::Emergency)
    } else if max_utilization >= thresholds.critical {
        Some(Severity::Critical)
    } else if max_utilization >= thresholds.warning {
        Some(Severity::Warning)
    } else {
        None
    }
}

/// Closed mapping from automation level and severity to an action kind
fn action_kind_for(level: AutomationLevel, severity: Severity) -> Option<ActionKind> {
    match (level, severity) {
        (AutomationLevel::Monitor, _) => None,
        (AutomationLevel::Alert, _) => Some(ActionKind::Alert),
        (AutomationLevel::AutoRequest, Severity::Warning) => Some(ActionKind::Alert),
        (AutomationLevel::AutoRequest, Severity::Critical) => Some(ActionKind::RequestIncrease),
        (AutomationLevel::AutoRequest, Severity::Emergency) => Some(ActionKind::EmergencyIncrease),
        (AutomationLevel::AutoApprove, Severity::Warning) => Some(ActionKind::Alert),
        (AutomationLevel::AutoApprove, Severity::Critical) => Some(ActionKind::AutoIncrease),
        (AutomationLevel::AutoApprove, Severity::Emergency) => Some(ActionKind::EmergencyIncrease),
        (AutomationLevel::FullAuto, Severity::Warning) => Some(ActionKind::AutoIncrease),
        (AutomationLevel::FullAuto, Severity::Critical) => Some(ActionKind::AutoIncrease),
        (AutomationLevel::FullAuto, Severity::Emergency) => Some(ActionKind::EmergencyIncrease),
    }
}

fn multiplier_for(severity: Severity, policy: &Policy) -> f64 {
    match severity {
        Severity::Warning => WARNING_MULTIPLIER,
        Severity::Critical => policy.max_increase_multiplier,
        Severity::Emergency => EMERGENCY_MULTIPLIER,
    }
}
