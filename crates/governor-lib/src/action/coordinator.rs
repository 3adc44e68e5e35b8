//! Action coordination
//!
//! Owns every Action lifecycle transition: persisting proposals through
//! the store's compare-and-set, driving execution against the external
//! collaborators, falling back to the ticket path when the direct path
//! cannot complete, resolving approvals, and expiring stale ones. Every
//! transition is audited; every terminal state produces a notification.

use super::{ActionStore, ApprovalWorkflow, AuditSink, IncreaseApi, Notifier, TicketClient};
use crate::error::GatewayError;
use crate::models::{
    Action, ActionKind, ActionProposal, ActionStatus, ApprovalDecision, AuditRecord, Severity,
};
use crate::observability::GovernorMetrics;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Actor recorded for engine-driven transitions
const ACTOR_ENGINE: &str = "governor-engine";

/// Actor recorded for transitions driven by the approval callback
const ACTOR_APPROVER: &str = "approval-callback";

/// Bounded exponential backoff settings for transient gateway failures
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
        }
    }
}

/// Configuration for the action coordinator
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub retry: RetryConfig,
    /// How long an approval may stay pending before it expires
    pub approval_timeout: Duration,
    /// Notification recipients for every emitted message
    pub recipients: Vec<String>,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            approval_timeout: Duration::from_secs(3600),
            recipients: Vec::new(),
        }
    }
}

/// Drives actions through their lifecycle
pub struct ActionCoordinator {
    store: Arc<ActionStore>,
    audit: Arc<dyn AuditSink>,
    increase_api: Arc<dyn IncreaseApi>,
    tickets: Arc<dyn TicketClient>,
    approvals: Arc<dyn ApprovalWorkflow>,
    notifier: Arc<dyn Notifier>,
    config: CoordinatorConfig,
    metrics: GovernorMetrics,
}

impl ActionCoordinator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<ActionStore>,
        audit: Arc<dyn AuditSink>,
        increase_api: Arc<dyn IncreaseApi>,
        tickets: Arc<dyn TicketClient>,
        approvals: Arc<dyn ApprovalWorkflow>,
        notifier: Arc<dyn Notifier>,
        config: CoordinatorConfig,
        metrics: GovernorMetrics,
    ) -> Self {
        Self {
            store,
            audit,
            increase_api,
            tickets,
            approvals,
            notifier,
            config,
            metrics,
        }
    }

    pub fn store(&self) -> &Arc<ActionStore> {
        &self.store
    }

    /// Persist and execute a proposal
    ///
    /// Returns `None` when the proposal was coalesced against an action
    /// that won the persistence race.
    pub async fn submit(&self, proposal: ActionProposal) -> Option<Action> {
        let now = chrono::Utc::now().timestamp();
        let action = Action {
            action_id: next_action_id(),
            handle: proposal.handle,
            kind: proposal.kind,
            severity: proposal.severity,
            requested_value: proposal.requested_value,
            estimated_cost: proposal.estimated_cost,
            status: ActionStatus::Proposed,
            created_at: now,
            resolved_at: None,
            ticket_id: None,
            workflow_id: None,
            detail: Some(proposal.reason.clone()),
        };

        if let Err(conflict) = self.store.begin(action.clone()) {
            debug!(
                handle = %action.handle,
                error = %conflict,
                "Proposal coalesced against outstanding action"
            );
            self.metrics.inc_actions_coalesced();
            return None;
        }

        self.metrics.inc_actions_created();
        self.audit_transition(&action, None, ACTOR_ENGINE, &proposal.reason);

        let action = self.execute(action).await;
        self.metrics
            .set_actions_outstanding(self.store.outstanding_count() as i64);
        Some(action)
    }

    async fn execute(&self, action: Action) -> Action {
        match action.kind {
            ActionKind::Alert => self.run_alert(action).await,
            ActionKind::AutoIncrease | ActionKind::EmergencyIncrease => {
                self.run_increase(action).await
            }
            ActionKind::RequestIncrease => self.run_request(action).await,
            ActionKind::ApprovalPending => self.run_approval(action).await,
        }
    }

    /// Alert actions succeed once the notification is delivered
    async fn run_alert(&self, mut action: Action) -> Action {
        let message = format!(
            "{} utilization alert for {}: {}",
            action.severity,
            action.handle,
            action.detail.as_deref().unwrap_or("threshold crossed"),
        );

        match self.notify(action.severity, &message).await {
            Ok(()) => {
                self.transition(
                    &mut action,
                    ActionStatus::Succeeded,
                    ACTOR_ENGINE,
                    "alert notification delivered",
                );
            }
            Err(e) => {
                self.transition(
                    &mut action,
                    ActionStatus::Failed,
                    ACTOR_ENGINE,
                    &format!("alert delivery failed: {}", e),
                );
            }
        }
        action
    }

    /// Direct increase path with ticket fallback
    async fn run_increase(&self, mut action: Action) -> Action {
        self.transition(
            &mut action,
            ActionStatus::Executing,
            ACTOR_ENGINE,
            "calling capacity increase API",
        );
        self.perform_increase(action).await
    }

    /// Request-increase actions always go through the ticket path
    async fn run_request(&self, mut action: Action) -> Action {
        self.transition(
            &mut action,
            ActionStatus::Executing,
            ACTOR_ENGINE,
            "routing increase through support ticket",
        );
        self.ticket_path(action, "policy routes this increase through support")
            .await
    }

    /// Start the approval workflow and leave the action pending
    async fn run_approval(&self, mut action: Action) -> Action {
        let approvals = Arc::clone(&self.approvals);
        let for_call = action.clone();
        let started = self
            .with_retry("approval workflow start", || {
                let approvals = Arc::clone(&approvals);
                let action = for_call.clone();
                async move { approvals.start_approval(&action).await }
            })
            .await;

        match started {
            Ok(workflow_id) => {
                action.workflow_id = Some(workflow_id.clone());
                self.transition(
                    &mut action,
                    ActionStatus::PendingApproval,
                    ACTOR_ENGINE,
                    &format!("approval workflow {} started", workflow_id),
                );
                self.notify_best_effort(
                    Severity::Warning,
                    &format!(
                        "Approval required: increase {} to {:.0} (estimated cost {:.2})",
                        action.handle, action.requested_value, action.estimated_cost
                    ),
                )
                .await;
            }
            Err(e) => {
                warn!(handle = %action.handle, error = %e, "Approval workflow unavailable");
                action = self
                    .ticket_path(action, &format!("approval workflow unavailable: {}", e))
                    .await;
            }
        }
        action
    }

    /// Call the increase API; any failure falls back to the ticket path
    /// because the capacity need still exists.
    async fn perform_increase(&self, mut action: Action) -> Action {
        let api = Arc::clone(&self.increase_api);
        let handle = action.handle.clone();
        let desired = action.requested_value;

        let result = self
            .with_retry("capacity increase", || {
                let api = Arc::clone(&api);
                let handle = handle.clone();
                async move { api.request_increase(&handle, desired).await }
            })
            .await;

        match result {
            Ok(receipt) if receipt.accepted => {
                self.transition(
                    &mut action,
                    ActionStatus::Succeeded,
                    ACTOR_ENGINE,
                    &format!("increase request {} accepted", receipt.request_id),
                );
                self.notify_best_effort(
                    action.severity,
                    &format!(
                        "Capacity increase for {} to {:.0} accepted (request {})",
                        action.handle, action.requested_value, receipt.request_id
                    ),
                )
                .await;
                action
            }
            Ok(receipt) => {
                self.ticket_path(
                    action,
                    &format!("increase request {} rejected by provider", receipt.request_id),
                )
                .await
            }
            Err(e) => {
                warn!(handle = %action.handle, error = %e, "Increase API failed");
                self.ticket_path(action, &e.to_string()).await
            }
        }
    }

    /// File a support ticket and park the action pending manual handling
    async fn ticket_path(&self, mut action: Action, cause: &str) -> Action {
        let justification = format!(
            "Limit increase to {:.0} needed for {} at {} severity: {}",
            action.requested_value, action.handle, action.severity, cause
        );

        let tickets = Arc::clone(&self.tickets);
        let handle = action.handle.clone();
        let desired = action.requested_value;
        let result = self
            .with_retry("ticket creation", || {
                let tickets = Arc::clone(&tickets);
                let handle = handle.clone();
                let justification = justification.clone();
                async move {
                    tickets
                        .create_ticket(&handle, &justification, desired)
                        .await
                }
            })
            .await;

        match result {
            Ok(ticket_id) => {
                self.metrics.inc_tickets_created();
                action.ticket_id = Some(ticket_id.clone());
                self.transition(
                    &mut action,
                    ActionStatus::PendingApproval,
                    ACTOR_ENGINE,
                    &format!("ticket {} filed: {}", ticket_id, cause),
                );
                self.notify_best_effort(
                    Severity::Warning,
                    &format!(
                        "Capacity increase for {} routed to support ticket {}",
                        action.handle, ticket_id
                    ),
                )
                .await;
            }
            Err(e) => {
                self.transition(
                    &mut action,
                    ActionStatus::Failed,
                    ACTOR_ENGINE,
                    &format!("ticket path failed after {}: {}", cause, e),
                );
                self.notify_best_effort(
                    Severity::Critical,
                    &format!(
                        "Capacity increase for {} failed on both paths: {}",
                        action.handle, e
                    ),
                )
                .await;
            }
        }
        action
    }

    /// Inbound approval callback
    ///
    /// Returns the action in its new state, or `None` when the workflow
    /// id does not match a pending action (duplicate or late callbacks
    /// are ignored).
    pub async fn resolve_approval(
        &self,
        workflow_id: &str,
        decision: ApprovalDecision,
    ) -> Option<Action> {
        let mut action = self.store.find_by_workflow(workflow_id)?;
        if action.status != ActionStatus::PendingApproval {
            return None;
        }
        self.metrics.inc_approvals_resolved();

        let action = match decision {
            ApprovalDecision::Denied => {
                self.transition(
                    &mut action,
                    ActionStatus::Denied,
                    ACTOR_APPROVER,
                    "approval denied",
                );
                self.notify_best_effort(
                    Severity::Warning,
                    &format!("Capacity increase for {} was denied", action.handle),
                )
                .await;
                action
            }
            ApprovalDecision::Approved => {
                action.kind = if action.severity == Severity::Emergency {
                    ActionKind::EmergencyIncrease
                } else {
                    ActionKind::AutoIncrease
                };
                self.transition(
                    &mut action,
                    ActionStatus::Executing,
                    ACTOR_APPROVER,
                    "approval granted, executing increase",
                );
                self.perform_increase(action).await
            }
        };

        self.metrics
            .set_actions_outstanding(self.store.outstanding_count() as i64);
        Some(action)
    }

    /// Expire pending approvals past their deadline
    ///
    /// The next cycle re-evaluates the handle and may re-propose if
    /// conditions still warrant it.
    pub async fn expire_stale(&self, now: i64) -> usize {
        let deadline = self.config.approval_timeout.as_secs() as i64;
        let mut expired = 0;

        for action in self.store.all_outstanding() {
            if action.status == ActionStatus::PendingApproval
                && now - action.created_at >= deadline
            {
                let mut action = action;
                self.transition(
                    &mut action,
                    ActionStatus::Expired,
                    ACTOR_ENGINE,
                    "approval window elapsed",
                );
                self.notify_best_effort(
                    Severity::Warning,
                    &format!(
                        "Approval for capacity increase on {} expired unresolved",
                        action.handle
                    ),
                )
                .await;
                expired += 1;
            }
        }

        if expired > 0 {
            info!(expired, "Expired stale approvals");
            self.metrics
                .set_actions_outstanding(self.store.outstanding_count() as i64);
        }
        expired
    }

    /// Apply a status transition, persist it and audit it
    fn transition(&self, action: &mut Action, status: ActionStatus, actor: &str, detail: &str) {
        let previous = action.status;
        action.status = status;
        action.detail = Some(detail.to_string());
        if status.is_terminal() {
            action.resolved_at = Some(chrono::Utc::now().timestamp());
        }
        self.store.persist(action);
        self.audit_transition(action, Some(previous), actor, detail);
    }

    fn audit_transition(
        &self,
        action: &Action,
        previous: Option<ActionStatus>,
        actor: &str,
        detail: &str,
    ) {
        self.audit.append(AuditRecord {
            action_id: action.action_id.clone(),
            handle_key: action.handle.key(),
            previous_status: previous,
            new_status: action.status,
            actor: actor.to_string(),
            timestamp: chrono::Utc::now().timestamp(),
            detail: detail.to_string(),
        });
        self.metrics.inc_transitions_recorded();
    }

    /// Deliver a notification, retrying transient failures
    async fn notify(&self, severity: Severity, message: &str) -> Result<(), GatewayError> {
        let notifier = Arc::clone(&self.notifier);
        let recipients = self.config.recipients.clone();
        let message = message.to_string();

        let result = self
            .with_retry("notification", || {
                let notifier = Arc::clone(&notifier);
                let recipients = recipients.clone();
                let message = message.clone();
                async move { notifier.notify(severity, &message, &recipients).await }
            })
            .await;

        if result.is_ok() {
            self.metrics.inc_notifications_sent();
        }
        result
    }

    async fn notify_best_effort(&self, severity: Severity, message: &str) {
        if let Err(e) = self.notify(severity, message).await {
            warn!(error = %e, "Notification delivery failed");
        }
    }

    /// Bounded exponential backoff around a gateway call
    ///
    /// Permanent errors return immediately; transient ones retry up to
    /// the configured attempt budget.
    async fn with_retry<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T, GatewayError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, GatewayError>>,
    {
        let mut delay = self.config.retry.base_delay;
        let mut attempt = 1;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.config.retry.max_attempts => {
                    warn!(
                        operation = %operation,
                        attempt,
                        error = %e,
                        "Transient gateway failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(self.config.retry.max_delay);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Generate a unique action id from the current time and a sequence
fn next_action_id() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    static SEQUENCE: AtomicU64 = AtomicU64::new(0);
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    format!(
        "act-{:x}-{:x}",
        now.as_secs(),
        SEQUENCE.fetch_add(1, Ordering::Relaxed)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{AuditLog, IncreaseReceipt};
    use crate::models::ResourceHandle;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn handle() -> ResourceHandle {
        ResourceHandle::new("ec2", "running-instances", "us-east-1", "vcpu")
    }

    fn proposal(kind: ActionKind, severity: Severity) -> ActionProposal {
        ActionProposal {
            handle: handle(),
            kind,
            severity,
            requested_value: 200.0,
            estimated_cost: 50.0,
            reason: "max utilization 96.0% crossed the emergency threshold".to_string(),
        }
    }

    /// Increase API mock: `transient_failures` calls fail transiently
    /// first; `permanent` fails every call permanently.
    struct MockIncrease {
        calls: AtomicU32,
        transient_failures: u32,
        permanent: bool,
    }

    impl MockIncrease {
        fn ok() -> Self {
            Self {
                calls: AtomicU32::new(0),
                transient_failures: 0,
                permanent: false,
            }
        }

        fn transient(failures: u32) -> Self {
            Self {
                calls: AtomicU32::new(0),
                transient_failures: failures,
                permanent: false,
            }
        }

        fn permanent() -> Self {
            Self {
                calls: AtomicU32::new(0),
                transient_failures: 0,
                permanent: true,
            }
        }

        fn call_count(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl IncreaseApi for MockIncrease {
        async fn request_increase(
            &self,
            _handle: &ResourceHandle,
            _desired_value: f64,
        ) -> Result<IncreaseReceipt, GatewayError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.permanent {
                return Err(GatewayError::Permanent("authorization denied".to_string()));
            }
            if n < self.transient_failures {
                return Err(GatewayError::Transient("rate limited".to_string()));
            }
            Ok(IncreaseReceipt {
                accepted: true,
                request_id: format!("req-{}", n),
            })
        }
    }

    struct MockTickets {
        calls: AtomicU32,
        fail: bool,
    }

    impl MockTickets {
        fn ok() -> Self {
            Self {
                calls: AtomicU32::new(0),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                calls: AtomicU32::new(0),
                fail: true,
            }
        }

        fn call_count(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TicketClient for MockTickets {
        async fn create_ticket(
            &self,
            _handle: &ResourceHandle,
            _justification: &str,
            _desired_value: f64,
        ) -> Result<String, GatewayError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(GatewayError::Permanent("ticket system rejected".to_string()));
            }
            Ok(format!("ticket-{}", n))
        }
    }

    struct MockApprovals {
        calls: AtomicU32,
    }

    impl MockApprovals {
        fn ok() -> Self {
            Self {
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl ApprovalWorkflow for MockApprovals {
        async fn start_approval(&self, _action: &Action) -> Result<String, GatewayError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!("wf-{}", n))
        }
    }

    struct MockNotifier {
        calls: AtomicU32,
    }

    impl MockNotifier {
        fn new() -> Self {
            Self {
                calls: AtomicU32::new(0),
            }
        }

        fn call_count(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Notifier for MockNotifier {
        async fn notify(
            &self,
            _severity: Severity,
            _message: &str,
            _recipients: &[String],
        ) -> Result<(), GatewayError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct TestRig {
        coordinator: Arc<ActionCoordinator>,
        store: Arc<ActionStore>,
        audit: Arc<AuditLog>,
        increase: Arc<MockIncrease>,
        tickets: Arc<MockTickets>,
        notifier: Arc<MockNotifier>,
    }

    fn rig(increase: MockIncrease, tickets: MockTickets) -> TestRig {
        let store = Arc::new(ActionStore::new());
        let audit = Arc::new(AuditLog::new());
        let increase = Arc::new(increase);
        let tickets = Arc::new(tickets);
        let notifier = Arc::new(MockNotifier::new());
        let coordinator = Arc::new(ActionCoordinator::new(
            Arc::clone(&store),
            audit.clone() as Arc<dyn AuditSink>,
            increase.clone() as Arc<dyn IncreaseApi>,
            tickets.clone() as Arc<dyn TicketClient>,
            Arc::new(MockApprovals::ok()) as Arc<dyn ApprovalWorkflow>,
            notifier.clone() as Arc<dyn Notifier>,
            CoordinatorConfig {
                retry: RetryConfig {
                    max_attempts: 3,
                    base_delay: Duration::from_millis(10),
                    max_delay: Duration::from_millis(100),
                },
                approval_timeout: Duration::from_secs(3600),
                recipients: vec!["capacity-team".to_string()],
            },
            GovernorMetrics::new(),
        ));
        TestRig {
            coordinator,
            store,
            audit,
            increase,
            tickets,
            notifier,
        }
    }

    #[tokio::test]
    async fn test_alert_succeeds_after_notification() {
        let rig = rig(MockIncrease::ok(), MockTickets::ok());
        let action = rig
            .coordinator
            .submit(proposal(ActionKind::Alert, Severity::Warning))
            .await
            .unwrap();

        assert_eq!(action.status, ActionStatus::Succeeded);
        assert!(rig.notifier.call_count() >= 1);
        assert_eq!(rig.increase.call_count(), 0);

        let trail = rig.audit.for_action(&action.action_id);
        assert_eq!(trail.first().unwrap().previous_status, None);
        assert_eq!(trail.last().unwrap().new_status, ActionStatus::Succeeded);
    }

    #[tokio::test]
    async fn test_auto_increase_success() {
        let rig = rig(MockIncrease::ok(), MockTickets::ok());
        let action = rig
            .coordinator
            .submit(proposal(ActionKind::AutoIncrease, Severity::Critical))
            .await
            .unwrap();

        assert_eq!(action.status, ActionStatus::Succeeded);
        assert_eq!(rig.increase.call_count(), 1);
        assert_eq!(rig.tickets.call_count(), 0);
        assert!(rig.store.outstanding(&handle()).is_none());
    }

    #[tokio::test]
    async fn test_permanent_error_falls_back_to_ticket() {
        // Authorization errors skip retries and go straight to the
        // ticket path; the action parks pending, never failed.
        let rig = rig(MockIncrease::permanent(), MockTickets::ok());
        let action = rig
            .coordinator
            .submit(proposal(ActionKind::AutoIncrease, Severity::Critical))
            .await
            .unwrap();

        assert_eq!(action.status, ActionStatus::PendingApproval);
        assert_eq!(action.ticket_id.as_deref(), Some("ticket-0"));
        assert_eq!(rig.increase.call_count(), 1);
        assert_eq!(rig.tickets.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_errors_retried_then_succeed() {
        let rig = rig(MockIncrease::transient(2), MockTickets::ok());
        let action = rig
            .coordinator
            .submit(proposal(ActionKind::EmergencyIncrease, Severity::Emergency))
            .await
            .unwrap();

        assert_eq!(action.status, ActionStatus::Succeeded);
        assert_eq!(rig.increase.call_count(), 3);
        assert_eq!(rig.tickets.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_exhausted_fall_back_to_ticket() {
        let rig = rig(MockIncrease::transient(10), MockTickets::ok());
        let action = rig
            .coordinator
            .submit(proposal(ActionKind::AutoIncrease, Severity::Critical))
            .await
            .unwrap();

        assert_eq!(rig.increase.call_count(), 3);
        assert_eq!(action.status, ActionStatus::PendingApproval);
        assert!(action.ticket_id.is_some());
    }

    #[tokio::test]
    async fn test_both_paths_failing_is_terminal_failure() {
        let rig = rig(MockIncrease::permanent(), MockTickets::failing());
        let action = rig
            .coordinator
            .submit(proposal(ActionKind::AutoIncrease, Severity::Critical))
            .await
            .unwrap();

        assert_eq!(action.status, ActionStatus::Failed);
        assert!(action.resolved_at.is_some());
        // Terminal failure still produced a notification
        assert!(rig.notifier.call_count() >= 1);
    }

    #[tokio::test]
    async fn test_request_increase_never_calls_increase_api() {
        let rig = rig(MockIncrease::ok(), MockTickets::ok());
        let action = rig
            .coordinator
            .submit(proposal(ActionKind::RequestIncrease, Severity::Critical))
            .await
            .unwrap();

        assert_eq!(action.status, ActionStatus::PendingApproval);
        assert_eq!(rig.increase.call_count(), 0);
        assert_eq!(rig.tickets.call_count(), 1);
    }

    #[tokio::test]
    async fn test_approval_approved_executes_increase() {
        let rig = rig(MockIncrease::ok(), MockTickets::ok());
        let pending = rig
            .coordinator
            .submit(proposal(ActionKind::ApprovalPending, Severity::Critical))
            .await
            .unwrap();

        assert_eq!(pending.status, ActionStatus::PendingApproval);
        let workflow_id = pending.workflow_id.clone().unwrap();

        let resolved = rig
            .coordinator
            .resolve_approval(&workflow_id, ApprovalDecision::Approved)
            .await
            .unwrap();

        assert_eq!(resolved.status, ActionStatus::Succeeded);
        assert_eq!(resolved.kind, ActionKind::AutoIncrease);
        assert_eq!(rig.increase.call_count(), 1);
    }

    #[tokio::test]
    async fn test_approval_denied() {
        let rig = rig(MockIncrease::ok(), MockTickets::ok());
        let pending = rig
            .coordinator
            .submit(proposal(ActionKind::ApprovalPending, Severity::Emergency))
            .await
            .unwrap();
        let workflow_id = pending.workflow_id.clone().unwrap();

        let resolved = rig
            .coordinator
            .resolve_approval(&workflow_id, ApprovalDecision::Denied)
            .await
            .unwrap();

        assert_eq!(resolved.status, ActionStatus::Denied);
        assert_eq!(rig.increase.call_count(), 0);
        assert!(rig.store.outstanding(&handle()).is_none());
    }

    #[tokio::test]
    async fn test_unknown_workflow_ignored() {
        let rig = rig(MockIncrease::ok(), MockTickets::ok());
        let resolved = rig
            .coordinator
            .resolve_approval("wf-unknown", ApprovalDecision::Approved)
            .await;

        assert!(resolved.is_none());
    }

    #[tokio::test]
    async fn test_pending_approval_expires() {
        let rig = rig(MockIncrease::ok(), MockTickets::ok());
        let pending = rig
            .coordinator
            .submit(proposal(ActionKind::ApprovalPending, Severity::Critical))
            .await
            .unwrap();

        // One hour plus a minute past creation
        let later = pending.created_at + 3660;
        let expired = rig.coordinator.expire_stale(later).await;

        assert_eq!(expired, 1);
        let resolved = rig.store.last_resolved(&handle()).unwrap();
        assert_eq!(resolved.status, ActionStatus::Expired);
        assert!(rig.store.outstanding(&handle()).is_none());
    }

    #[tokio::test]
    async fn test_expiry_leaves_fresh_approvals_alone() {
        let rig = rig(MockIncrease::ok(), MockTickets::ok());
        let pending = rig
            .coordinator
            .submit(proposal(ActionKind::ApprovalPending, Severity::Critical))
            .await
            .unwrap();

        let soon = pending.created_at + 60;
        assert_eq!(rig.coordinator.expire_stale(soon).await, 0);
        assert!(rig.store.outstanding(&handle()).is_some());
    }

    #[tokio::test]
    async fn test_concurrent_proposals_coalesce_to_one() {
        // Two cycles race the same handle; exactly one action survives.
        let rig = rig(MockIncrease::ok(), MockTickets::ok());
        let c1 = Arc::clone(&rig.coordinator);
        let c2 = Arc::clone(&rig.coordinator);

        let (first, second) = tokio::join!(
            c1.submit(proposal(ActionKind::ApprovalPending, Severity::Critical)),
            c2.submit(proposal(ActionKind::ApprovalPending, Severity::Critical)),
        );

        assert!(first.is_some() != second.is_some());
        assert_eq!(rig.store.outstanding_count(), 1);
    }

    #[tokio::test]
    async fn test_terminal_action_frees_handle_for_next_proposal() {
        let rig = rig(MockIncrease::ok(), MockTickets::ok());
        let first = rig
            .coordinator
            .submit(proposal(ActionKind::Alert, Severity::Warning))
            .await
            .unwrap();
        assert!(first.status.is_terminal());

        let second = rig
            .coordinator
            .submit(proposal(ActionKind::Alert, Severity::Warning))
            .await;
        assert!(second.is_some());
    }

    #[tokio::test]
    async fn test_every_transition_audited() {
        let rig = rig(MockIncrease::permanent(), MockTickets::ok());
        let action = rig
            .coordinator
            .submit(proposal(ActionKind::AutoIncrease, Severity::Critical))
            .await
            .unwrap();

        // proposed -> executing -> pending_approval
        let trail = rig.audit.for_action(&action.action_id);
        let statuses: Vec<ActionStatus> = trail.iter().map(|r| r.new_status).collect();
        assert_eq!(
            statuses,
            vec![
                ActionStatus::Proposed,
                ActionStatus::Executing,
                ActionStatus::PendingApproval,
            ]
        );
    }
}
