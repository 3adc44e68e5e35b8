//! Observability infrastructure for the governor
//!
//! Provides:
//! - Prometheus metrics (cycle latency, fetch latency, action counters)
//! - Structured JSON logging helpers with tracing

use prometheus::{register_histogram, register_int_gauge, Histogram, IntGauge};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Default histogram buckets for latency measurements (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<GovernorMetricsInner> = OnceLock::new();

/// Inner metrics structure that holds the actual Prometheus metrics
struct GovernorMetricsInner {
    cycle_latency_seconds: Histogram,
    fetch_latency_seconds: Histogram,
    handles_tracked: IntGauge,
    actions_outstanding: IntGauge,
    actions_created: IntGauge,
    actions_coalesced: IntGauge,
    transitions_recorded: IntGauge,
    notifications_sent: IntGauge,
    tickets_created: IntGauge,
    approvals_resolved: IntGauge,
    snapshot_errors: IntGauge,
    policy_errors: IntGauge,
    cycles_abandoned: IntGauge,
}

impl GovernorMetricsInner {
    fn new() -> Self {
        Self {
            cycle_latency_seconds: register_histogram!(
                "governor_cycle_latency_seconds",
                "Wall-clock time spent running one handle's governance cycle",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register cycle_latency_seconds"),

            fetch_latency_seconds: register_histogram!(
                "governor_snapshot_fetch_latency_seconds",
                "Time spent fetching a capacity snapshot",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register fetch_latency_seconds"),

            handles_tracked: register_int_gauge!(
                "governor_handles_tracked",
                "Number of resource handles currently tracked"
            )
            .expect("Failed to register handles_tracked"),

            actions_outstanding: register_int_gauge!(
                "governor_actions_outstanding",
                "Number of actions currently in a non-terminal state"
            )
            .expect("Failed to register actions_outstanding"),

            actions_created: register_int_gauge!(
                "governor_actions_created_total",
                "Total number of actions persisted"
            )
            .expect("Failed to register actions_created"),

            actions_coalesced: register_int_gauge!(
                "governor_actions_coalesced_total",
                "Total number of proposals dropped against an outstanding action"
            )
            .expect("Failed to register actions_coalesced"),

            transitions_recorded: register_int_gauge!(
                "governor_transitions_recorded_total",
                "Total number of action status transitions audited"
            )
            .expect("Failed to register transitions_recorded"),

            notifications_sent: register_int_gauge!(
                "governor_notifications_sent_total",
                "Total number of notifications delivered"
            )
            .expect("Failed to register notifications_sent"),

            tickets_created: register_int_gauge!(
                "governor_tickets_created_total",
                "Total number of fallback support tickets created"
            )
            .expect("Failed to register tickets_created"),

            approvals_resolved: register_int_gauge!(
                "governor_approvals_resolved_total",
                "Total number of approval workflows resolved"
            )
            .expect("Failed to register approvals_resolved"),

            snapshot_errors: register_int_gauge!(
                "governor_snapshot_errors_total",
                "Total number of snapshot fetch failures"
            )
            .expect("Failed to register snapshot_errors"),

            policy_errors: register_int_gauge!(
                "governor_policy_errors_total",
                "Total number of handles skipped for malformed policies"
            )
            .expect("Failed to register policy_errors"),

            cycles_abandoned: register_int_gauge!(
                "governor_cycles_abandoned_total",
                "Total number of cycles abandoned at the wall-clock budget"
            )
            .expect("Failed to register cycles_abandoned"),
        }
    }
}

/// Governor metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct GovernorMetrics {
    _private: (),
}

impl Default for GovernorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl GovernorMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(GovernorMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &GovernorMetricsInner {
        GLOBAL_METRICS.get().expect("Metrics not initialized")
    }

    pub fn observe_cycle_latency(&self, duration_secs: f64) {
        self.inner().cycle_latency_seconds.observe(duration_secs);
    }

    pub fn observe_fetch_latency(&self, duration_secs: f64) {
        self.inner().fetch_latency_seconds.observe(duration_secs);
    }

    pub fn set_handles_tracked(&self, count: i64) {
        self.inner().handles_tracked.set(count);
    }

    pub fn set_actions_outstanding(&self, count: i64) {
        self.inner().actions_outstanding.set(count);
    }

    pub fn inc_actions_created(&self) {
        self.inner().actions_created.inc();
    }

    pub fn inc_actions_coalesced(&self) {
        self.inner().actions_coalesced.inc();
    }

    pub fn inc_transitions_recorded(&self) {
        self.inner().transitions_recorded.inc();
    }

    pub fn inc_notifications_sent(&self) {
        self.inner().notifications_sent.inc();
    }

    pub fn inc_tickets_created(&self) {
        self.inner().tickets_created.inc();
    }

    pub fn inc_approvals_resolved(&self) {
        self.inner().approvals_resolved.inc();
    }

    pub fn inc_snapshot_errors(&self) {
        self.inner().snapshot_errors.inc();
    }

    pub fn inc_policy_errors(&self) {
        self.inner().policy_errors.inc();
    }

    pub fn inc_cycles_abandoned(&self) {
        self.inner().cycles_abandoned.inc();
    }
}

/// Structured logger for significant engine events
#[derive(Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    /// Log engine startup
    pub fn log_startup(&self, version: &str, handles: usize) {
        info!(
            event = "governor_started",
            instance = %self.instance,
            version = %version,
            handles_tracked = handles,
            "Capacity governor started"
        );
    }

    /// Log engine shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "governor_shutdown",
            instance = %self.instance,
            reason = %reason,
            "Capacity governor shutting down"
        );
    }

    /// Log an action reaching a terminal state
    pub fn log_action_resolved(
        &self,
        action_id: &str,
        handle: &str,
        kind: &str,
        status: &str,
        detail: &str,
    ) {
        match status {
            "failed" | "denied" | "expired" => {
                warn!(
                    event = "action_resolved",
                    instance = %self.instance,
                    action_id = %action_id,
                    handle = %handle,
                    kind = %kind,
                    status = %status,
                    detail = %detail,
                    "Action resolved"
                );
            }
            _ => {
                info!(
                    event = "action_resolved",
                    instance = %self.instance,
                    action_id = %action_id,
                    handle = %handle,
                    kind = %kind,
                    status = %status,
                    detail = %detail,
                    "Action resolved"
                );
            }
        }
    }
}
