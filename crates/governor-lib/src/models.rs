//! Core data model for capacity governance

use serde::{Deserialize, Serialize};

/// Identifies a trackable capacity unit
///
/// Immutable; used as the stable key for snapshot history, actions and
/// audit records.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceHandle {
    /// Provider scope, e.g. the service name ("ec2", "vpc")
    pub service: String,
    /// Limit identifier within the service
    pub limit_id: String,
    /// Region the limit applies to
    pub region: String,
    /// Resource kind, keys into the cost model ("vcpu", "eip", ...)
    pub kind: String,
}

impl ResourceHandle {
    pub fn new(
        service: impl Into<String>,
        limit_id: impl Into<String>,
        region: impl Into<String>,
        kind: impl Into<String>,
    ) -> Self {
        Self {
            service: service.into(),
            limit_id: limit_id.into(),
            region: region.into(),
            kind: kind.into(),
        }
    }

    /// Stable key used to partition all downstream records
    pub fn key(&self) -> String {
        format!("{}/{}/{}", self.service, self.limit_id, self.region)
    }
}

impl std::fmt::Display for ResourceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// A timestamped usage/limit reading for one handle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub handle: ResourceHandle,
    /// Unix timestamp in seconds
    pub timestamp: i64,
    pub current_usage: f64,
    pub limit_value: f64,
}

impl Snapshot {
    /// Current utilization as a percentage of the limit
    ///
    /// A non-positive limit yields 0.0 rather than dividing by zero.
    pub fn utilization_percent(&self) -> f64 {
        if self.limit_value <= f64::EPSILON {
            return 0.0;
        }
        (self.current_usage / self.limit_value) * 100.0
    }
}

/// A usage point that exceeded the rolling baseline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpikeEvent {
    pub timestamp: i64,
    pub usage: f64,
    /// Rolling mean at the time of the spike
    pub baseline: f64,
    /// usage / baseline, 0.0 when the baseline is zero
    pub ratio: f64,
}

/// Statistics derived from a snapshot window
///
/// Recomputed every cycle; never persisted as a source of truth.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendSummary {
    pub mean: f64,
    pub variance: f64,
    /// Least-squares slope in usage units per second
    pub slope: f64,
    pub peak: f64,
    pub spike_events: Vec<SpikeEvent>,
    pub sample_count: usize,
    /// Set when fewer than the minimum sample count exist; downstream
    /// consumers must fall back to current-usage-only reasoning.
    pub insufficient_data: bool,
}

impl TrendSummary {
    /// Summary for a window below the minimum sample count
    pub fn insufficient(sample_count: usize) -> Self {
        Self {
            mean: 0.0,
            variance: 0.0,
            slope: 0.0,
            peak: 0.0,
            spike_events: Vec::new(),
            sample_count,
            insufficient_data: true,
        }
    }
}

/// Projected usage over a horizon, produced fresh per cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    pub projected_usage: f64,
    pub horizon_secs: u64,
    /// Clamped to [0, 1]
    pub confidence: f64,
}

/// Utilization severity bands, ordered ascending
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Critical,
    Emergency,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Warning => write!(f, "warning"),
            Severity::Critical => write!(f, "critical"),
            Severity::Emergency => write!(f, "emergency"),
        }
    }
}

/// What a decided action does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Notify only, no capacity change
    Alert,
    /// File a support/ticket request for a manual increase
    RequestIncrease,
    /// Call the increase API directly
    AutoIncrease,
    /// Call the increase API directly at emergency sizing
    EmergencyIncrease,
    /// Route through the approval workflow before executing
    ApprovalPending,
}

impl ActionKind {
    /// True for kinds that change the provisioned limit
    pub fn is_increase(&self) -> bool {
        !matches!(self, ActionKind::Alert)
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionKind::Alert => write!(f, "alert"),
            ActionKind::RequestIncrease => write!(f, "request_increase"),
            ActionKind::AutoIncrease => write!(f, "auto_increase"),
            ActionKind::EmergencyIncrease => write!(f, "emergency_increase"),
            ActionKind::ApprovalPending => write!(f, "approval_pending"),
        }
    }
}

/// Lifecycle status of an action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Proposed,
    PendingApproval,
    Executing,
    Succeeded,
    Failed,
    Denied,
    Expired,
}

impl ActionStatus {
    /// Terminal statuses never transition again
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ActionStatus::Succeeded
                | ActionStatus::Failed
                | ActionStatus::Denied
                | ActionStatus::Expired
        )
    }
}

impl std::fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionStatus::Proposed => write!(f, "proposed"),
            ActionStatus::PendingApproval => write!(f, "pending_approval"),
            ActionStatus::Executing => write!(f, "executing"),
            ActionStatus::Succeeded => write!(f, "succeeded"),
            ActionStatus::Failed => write!(f, "failed"),
            ActionStatus::Denied => write!(f, "denied"),
            ActionStatus::Expired => write!(f, "expired"),
        }
    }
}

/// Decision delivered by the approval callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalDecision {
    Approved,
    Denied,
}

/// Evaluator output: a unit of work not yet persisted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionProposal {
    pub handle: ResourceHandle,
    pub kind: ActionKind,
    pub severity: Severity,
    /// Target limit value; equals the current limit for alerts
    pub requested_value: f64,
    pub estimated_cost: f64,
    pub reason: String,
}

/// A decided/executed unit of capacity work with a lifecycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    pub action_id: String,
    pub handle: ResourceHandle,
    pub kind: ActionKind,
    pub severity: Severity,
    pub requested_value: f64,
    pub estimated_cost: f64,
    pub status: ActionStatus,
    pub created_at: i64,
    pub resolved_at: Option<i64>,
    /// Set when the ticket fallback path was taken
    pub ticket_id: Option<String>,
    /// Set when an approval workflow was started
    pub workflow_id: Option<String>,
    pub detail: Option<String>,
}

/// One record per action status transition, append-only
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub action_id: String,
    pub handle_key: String,
    pub previous_status: Option<ActionStatus>,
    pub new_status: ActionStatus,
    /// Component or principal that drove the transition
    pub actor: String,
    pub timestamp: i64,
    pub detail: String,
}
