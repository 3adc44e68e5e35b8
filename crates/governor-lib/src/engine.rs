//! Governance cycle engine
//!
//! Runs the snapshot → trend → prediction → evaluation → coordination
//! pipeline once per tracked handle per cycle. Handles are independent:
//! their cycles run concurrently, each under a wall-clock budget, and a
//! failure in one never affects another.

use crate::action::ActionCoordinator;
use crate::health::{components, HealthRegistry};
use crate::models::{Action, ResourceHandle};
use crate::observability::GovernorMetrics;
use crate::policy::{BusinessHours, CostModel, EvaluationInput, PolicyEvaluator, PolicyStore};
use crate::pool::CapacityPoolRegistry;
use crate::predict::DemandPredictor;
use crate::snapshot::{fetch_with_timeout, SnapshotHistory, SnapshotProvider};
use crate::trend::TrendAnalyzer;
use anyhow::Result;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::{interval, Instant};
use tracing::{debug, error, info, warn};

/// Configuration for the governance cycle loop
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Base cycle interval (default: 5 minutes)
    pub cycle_interval: Duration,
    /// Maximum jitter added to the interval
    pub jitter: Duration,
    /// Wall-clock budget for one handle's cycle
    pub cycle_budget: Duration,
    /// Budget for one snapshot fetch
    pub fetch_timeout: Duration,
    /// Window handed to the trend analyzer
    pub trend_window: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cycle_interval: Duration::from_secs(5 * 60),
            jitter: Duration::from_secs(5),
            cycle_budget: Duration::from_secs(5 * 60),
            fetch_timeout: Duration::from_secs(10),
            trend_window: Duration::from_secs(30 * 24 * 60 * 60),
        }
    }
}

/// Registry of tracked resource handles
#[derive(Default)]
pub struct HandleRegistry {
    handles: DashMap<String, ResourceHandle>,
}

impl HandleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, handle: ResourceHandle) {
        self.handles.insert(handle.key(), handle);
    }

    pub fn deregister(&self, handle: &ResourceHandle) {
        self.handles.remove(&handle.key());
    }

    pub fn list(&self) -> Vec<ResourceHandle> {
        self.handles
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

/// What one handle's cycle did
#[derive(Debug)]
pub enum CycleOutcome {
    /// No policy resolves for the handle
    NoPolicy,
    /// The policy failed validation; surfaced to the operator
    InvalidPolicy,
    /// Snapshot fetch failed; fail-safe, no action this cycle
    SnapshotUnavailable,
    /// Thresholds not crossed or proposal suppressed
    NoAction,
    /// The proposal lost the persistence race
    Coalesced,
    /// An action was persisted and driven
    Submitted(Action),
}

/// The monitor-predict-decide-act control loop
pub struct Engine {
    provider: Arc<dyn SnapshotProvider>,
    history: Arc<SnapshotHistory>,
    analyzer: TrendAnalyzer,
    predictor: DemandPredictor,
    policies: Arc<dyn PolicyStore>,
    evaluator: PolicyEvaluator,
    coordinator: Arc<ActionCoordinator>,
    handles: Arc<HandleRegistry>,
    pools: Arc<CapacityPoolRegistry>,
    health: HealthRegistry,
    metrics: GovernorMetrics,
    config: EngineConfig,
}

impl Engine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    pub fn health(&self) -> &HealthRegistry {
        &self.health
    }

    pub fn handles(&self) -> &Arc<HandleRegistry> {
        &self.handles
    }

    pub fn coordinator(&self) -> &Arc<ActionCoordinator> {
        &self.coordinator
    }

    pub fn pools(&self) -> &Arc<CapacityPoolRegistry> {
        &self.pools
    }

    /// Run the cycle loop until shutdown
    pub async fn run(self: Arc<Self>, mut shutdown: tokio::sync::broadcast::Receiver<()>) {
        info!(
            interval_secs = self.config.cycle_interval.as_secs(),
            handles = self.handles.len(),
            "Starting governance cycle loop"
        );

        let mut ticker = interval(self.current_interval());

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let start = Instant::now();
                    self.run_cycle_all().await;
                    debug!(
                        elapsed_ms = start.elapsed().as_millis(),
                        handles = self.handles.len(),
                        "Cycle sweep complete"
                    );
                    ticker = interval(self.current_interval());
                }
                _ = shutdown.recv() => {
                    info!("Shutting down governance cycle loop");
                    break;
                }
            }
        }
    }

    /// Interval with jitter to avoid synchronized provider bursts
    fn current_interval(&self) -> Duration {
        self.config.cycle_interval + Duration::from_millis(rand_jitter(self.config.jitter.as_millis() as u64))
    }

    /// One sweep: housekeeping, then every handle's cycle concurrently
    pub async fn run_cycle_all(self: &Arc<Self>) {
        let now = chrono::Utc::now().timestamp();

        self.coordinator.expire_stale(now).await;
        let reclaimed = self.pools.reclaim_expired(now);
        if reclaimed > 0 {
            debug!(reclaimed, "Reclaimed expired pool reservations");
        }

        let mut cycles = JoinSet::new();
        for handle in self.handles.list() {
            let engine = Arc::clone(self);
            cycles.spawn(async move {
                match tokio::time::timeout(engine.config.cycle_budget, engine.run_cycle(&handle))
                    .await
                {
                    Ok(outcome) => {
                        debug!(handle = %handle, outcome = ?outcome, "Cycle finished");
                    }
                    Err(_) => {
                        // Persisted action state makes the abandoned cycle
                        // resumable on the next sweep.
                        engine.metrics.inc_cycles_abandoned();
                        warn!(handle = %handle, "Cycle abandoned at wall-clock budget");
                    }
                }
            });
        }
        while cycles.join_next().await.is_some() {}

        self.metrics.set_handles_tracked(self.handles.len() as i64);
        self.metrics
            .set_actions_outstanding(self.coordinator.store().outstanding_count() as i64);
    }

    /// One handle's cycle, strictly sequential
    pub async fn run_cycle(&self, handle: &ResourceHandle) -> CycleOutcome {
        let cycle_start = Instant::now();

        let Some(policy) = self.policies.policy_for(handle) else {
            warn!(handle = %handle, "No policy resolves for handle, skipping");
            self.metrics.inc_policy_errors();
            return CycleOutcome::NoPolicy;
        };

        let fetch_start = Instant::now();
        let snapshot = match fetch_with_timeout(
            self.provider.as_ref(),
            handle,
            self.config.fetch_timeout,
        )
        .await
        {
            Ok(snapshot) => {
                self.metrics
                    .observe_fetch_latency(fetch_start.elapsed().as_secs_f64());
                self.health
                    .set_healthy(components::SNAPSHOT_PROVIDER)
                    .await;
                snapshot
            }
            Err(e) => {
                self.metrics.inc_snapshot_errors();
                self.health
                    .set_degraded(components::SNAPSHOT_PROVIDER, e.to_string())
                    .await;
                warn!(handle = %handle, error = %e, "Snapshot unavailable, no action this cycle");
                return CycleOutcome::SnapshotUnavailable;
            }
        };

        self.history.append(snapshot.clone());
        let window = self
            .history
            .window(handle, self.config.trend_window, snapshot.timestamp);
        let trend = self.analyzer.analyze(&window);
        let prediction = self.predictor.predict(&snapshot, &trend);

        let store = self.coordinator.store();
        let outstanding = store.outstanding(handle);
        let last_resolved = store.last_resolved(handle);

        let proposal = match self.evaluator.evaluate(EvaluationInput {
            snapshot: &snapshot,
            prediction: &prediction,
            policy: &policy,
            outstanding: outstanding.as_ref(),
            last_resolved: last_resolved.as_ref(),
            now: snapshot.timestamp,
        }) {
            Ok(proposal) => proposal,
            Err(e) => {
                error!(handle = %handle, error = %e, "Malformed policy, handle skipped");
                self.metrics.inc_policy_errors();
                return CycleOutcome::InvalidPolicy;
            }
        };

        let outcome = match proposal {
            None => CycleOutcome::NoAction,
            Some(proposal) => match self.coordinator.submit(proposal).await {
                Some(action) => CycleOutcome::Submitted(action),
                None => CycleOutcome::Coalesced,
            },
        };

        self.metrics
            .observe_cycle_latency(cycle_start.elapsed().as_secs_f64());
        outcome
    }
}

/// Builder for wiring an [`Engine`]
pub struct EngineBuilder {
    provider: Option<Arc<dyn SnapshotProvider>>,
    policies: Option<Arc<dyn PolicyStore>>,
    coordinator: Option<Arc<ActionCoordinator>>,
    handles: Arc<HandleRegistry>,
    history: Arc<SnapshotHistory>,
    pools: Arc<CapacityPoolRegistry>,
    health: HealthRegistry,
    analyzer: TrendAnalyzer,
    predictor: DemandPredictor,
    evaluator: Option<PolicyEvaluator>,
    config: EngineConfig,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self {
            provider: None,
            policies: None,
            coordinator: None,
            handles: Arc::new(HandleRegistry::new()),
            history: Arc::new(SnapshotHistory::default()),
            pools: Arc::new(CapacityPoolRegistry::new()),
            health: HealthRegistry::new(),
            analyzer: TrendAnalyzer::new(),
            predictor: DemandPredictor::new(),
            evaluator: None,
            config: EngineConfig::default(),
        }
    }

    pub fn provider(mut self, provider: Arc<dyn SnapshotProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn policies(mut self, policies: Arc<dyn PolicyStore>) -> Self {
        self.policies = Some(policies);
        self
    }

    pub fn coordinator(mut self, coordinator: Arc<ActionCoordinator>) -> Self {
        self.coordinator = Some(coordinator);
        self
    }

    pub fn handles(mut self, handles: Arc<HandleRegistry>) -> Self {
        self.handles = handles;
        self
    }

    pub fn history(mut self, history: Arc<SnapshotHistory>) -> Self {
        self.history = history;
        self
    }

    pub fn pools(mut self, pools: Arc<CapacityPoolRegistry>) -> Self {
        self.pools = pools;
        self
    }

    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = health;
        self
    }

    pub fn analyzer(mut self, analyzer: TrendAnalyzer) -> Self {
        self.analyzer = analyzer;
        self
    }

    pub fn predictor(mut self, predictor: DemandPredictor) -> Self {
        self.predictor = predictor;
        self
    }

    pub fn evaluator(mut self, evaluator: PolicyEvaluator) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<Engine> {
        let provider = self
            .provider
            .ok_or_else(|| anyhow::anyhow!("Snapshot provider is required"))?;
        let policies = self
            .policies
            .ok_or_else(|| anyhow::anyhow!("Policy store is required"))?;
        let coordinator = self
            .coordinator
            .ok_or_else(|| anyhow::anyhow!("Action coordinator is required"))?;

        Ok(Engine {
            provider,
            history: self.history,
            analyzer: self.analyzer,
            predictor: self.predictor,
            policies,
            evaluator: self
                .evaluator
                .unwrap_or_else(|| PolicyEvaluator::new(CostModel::default(), BusinessHours::default())),
            coordinator,
            handles: self.handles,
            pools: self.pools,
            health: self.health,
            metrics: GovernorMetrics::new(),
            config: self.config,
        })
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Generate a random jitter value between 0 and max_ms
fn rand_jitter(max_ms: u64) -> u64 {
    if max_ms == 0 {
        return 0;
    }
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64;
    now % max_ms
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{
        ActionStore, ApprovalWorkflow, AuditLog, AuditSink, CoordinatorConfig, IncreaseApi,
        IncreaseReceipt, Notifier, TicketClient,
    };
    use crate::error::{GatewayError, SnapshotError};
    use crate::models::{ActionKind, ActionStatus, Severity, Snapshot};
    use crate::policy::{test_policy, AutomationLevel, InMemoryPolicyStore};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn handle() -> ResourceHandle {
        ResourceHandle::new("ec2", "running-instances", "us-east-1", "vcpu")
    }

    struct ScriptedProvider {
        usage: f64,
        limit: f64,
        unavailable: AtomicBool,
    }

    impl ScriptedProvider {
        fn new(usage: f64, limit: f64) -> Self {
            Self {
                usage,
                limit,
                unavailable: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl SnapshotProvider for ScriptedProvider {
        async fn fetch(&self, handle: &ResourceHandle) -> Result<Snapshot, SnapshotError> {
            if self.unavailable.load(Ordering::SeqCst) {
                return Err(SnapshotError::Unavailable("endpoint down".to_string()));
            }
            Ok(Snapshot {
                handle: handle.clone(),
                timestamp: chrono::Utc::now().timestamp(),
                current_usage: self.usage,
                limit_value: self.limit,
            })
        }
    }

    struct OkIncrease;

    #[async_trait]
    impl IncreaseApi for OkIncrease {
        async fn request_increase(
            &self,
            _handle: &ResourceHandle,
            _desired_value: f64,
        ) -> Result<IncreaseReceipt, GatewayError> {
            Ok(IncreaseReceipt {
                accepted: true,
                request_id: "req-0".to_string(),
            })
        }
    }

    struct OkTickets;

    #[async_trait]
    impl TicketClient for OkTickets {
        async fn create_ticket(
            &self,
            _handle: &ResourceHandle,
            _justification: &str,
            _desired_value: f64,
        ) -> Result<String, GatewayError> {
            Ok("ticket-0".to_string())
        }
    }

    struct OkApprovals;

    #[async_trait]
    impl ApprovalWorkflow for OkApprovals {
        async fn start_approval(
            &self,
            _action: &crate::models::Action,
        ) -> Result<String, GatewayError> {
            Ok("wf-0".to_string())
        }
    }

    struct OkNotifier;

    #[async_trait]
    impl Notifier for OkNotifier {
        async fn notify(
            &self,
            _severity: Severity,
            _message: &str,
            _recipients: &[String],
        ) -> Result<(), GatewayError> {
            Ok(())
        }
    }

    fn test_coordinator() -> Arc<ActionCoordinator> {
        Arc::new(ActionCoordinator::new(
            Arc::new(ActionStore::new()),
            Arc::new(AuditLog::new()) as Arc<dyn AuditSink>,
            Arc::new(OkIncrease) as Arc<dyn IncreaseApi>,
            Arc::new(OkTickets) as Arc<dyn TicketClient>,
            Arc::new(OkApprovals) as Arc<dyn ApprovalWorkflow>,
            Arc::new(OkNotifier) as Arc<dyn Notifier>,
            CoordinatorConfig::default(),
            GovernorMetrics::new(),
        ))
    }

    fn test_engine(
        provider: Arc<ScriptedProvider>,
        level: AutomationLevel,
    ) -> Arc<Engine> {
        let mut policies = InMemoryPolicyStore::new();
        policies.insert("*", test_policy(level));

        let handles = Arc::new(HandleRegistry::new());
        handles.register(handle());

        Arc::new(
            Engine::builder()
                .provider(provider)
                .policies(Arc::new(policies))
                .coordinator(test_coordinator())
                .handles(handles)
                .build()
                .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_cycle_submits_emergency_action() {
        let provider = Arc::new(ScriptedProvider::new(96.0, 100.0));
        let engine = test_engine(provider, AutomationLevel::FullAuto);

        let outcome = engine.run_cycle(&handle()).await;
        match outcome {
            CycleOutcome::Submitted(action) => {
                assert_eq!(action.kind, ActionKind::EmergencyIncrease);
                assert_eq!(action.requested_value, 200.0);
                assert_eq!(action.status, ActionStatus::Succeeded);
            }
            other => panic!("expected Submitted, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unavailable_provider_is_fail_safe() {
        let provider = Arc::new(ScriptedProvider::new(96.0, 100.0));
        provider.unavailable.store(true, Ordering::SeqCst);
        let engine = test_engine(Arc::clone(&provider), AutomationLevel::FullAuto);

        let outcome = engine.run_cycle(&handle()).await;
        assert!(matches!(outcome, CycleOutcome::SnapshotUnavailable));
        assert_eq!(engine.coordinator().store().outstanding_count(), 0);
    }

    #[tokio::test]
    async fn test_calm_usage_takes_no_action() {
        let provider = Arc::new(ScriptedProvider::new(30.0, 100.0));
        let engine = test_engine(provider, AutomationLevel::FullAuto);

        let outcome = engine.run_cycle(&handle()).await;
        assert!(matches!(outcome, CycleOutcome::NoAction));
    }

    #[tokio::test]
    async fn test_monitor_policy_never_acts() {
        let provider = Arc::new(ScriptedProvider::new(99.0, 100.0));
        let engine = test_engine(provider, AutomationLevel::Monitor);

        let outcome = engine.run_cycle(&handle()).await;
        assert!(matches!(outcome, CycleOutcome::NoAction));
    }

    #[tokio::test]
    async fn test_missing_policy_skips_handle() {
        let provider = Arc::new(ScriptedProvider::new(96.0, 100.0));
        let handles = Arc::new(HandleRegistry::new());
        handles.register(handle());

        let engine = Arc::new(
            Engine::builder()
                .provider(provider)
                .policies(Arc::new(InMemoryPolicyStore::new()))
                .coordinator(test_coordinator())
                .handles(handles)
                .build()
                .unwrap(),
        );

        let outcome = engine.run_cycle(&handle()).await;
        assert!(matches!(outcome, CycleOutcome::NoPolicy));
    }

    #[tokio::test]
    async fn test_invalid_policy_surfaced() {
        let provider = Arc::new(ScriptedProvider::new(96.0, 100.0));
        let mut broken = test_policy(AutomationLevel::FullAuto);
        broken.emergency_threshold = None;
        let mut policies = InMemoryPolicyStore::new();
        policies.insert("*", broken);

        let handles = Arc::new(HandleRegistry::new());
        handles.register(handle());

        let engine = Arc::new(
            Engine::builder()
                .provider(provider)
                .policies(Arc::new(policies))
                .coordinator(test_coordinator())
                .handles(handles)
                .build()
                .unwrap(),
        );

        let outcome = engine.run_cycle(&handle()).await;
        assert!(matches!(outcome, CycleOutcome::InvalidPolicy));
    }

    #[tokio::test]
    async fn test_outstanding_action_coalesces_next_cycle() {
        // Cost gate parks the first cycle's action pending approval; the
        // second cycle must not propose again.
        let provider = Arc::new(ScriptedProvider::new(96.0, 100.0));
        let mut policy = test_policy(AutomationLevel::FullAuto);
        policy.cost_ceiling = 0.0;
        policy.requires_approval = true;
        let mut policies = InMemoryPolicyStore::new();
        policies.insert("*", policy);

        let handles = Arc::new(HandleRegistry::new());
        handles.register(handle());

        let evaluator = PolicyEvaluator::new(
            CostModel {
                rates: [("vcpu".to_string(), 1.0)].into_iter().collect(),
                default_rate: 1.0,
            },
            BusinessHours::default(),
        );

        let engine = Arc::new(
            Engine::builder()
                .provider(provider)
                .policies(Arc::new(policies))
                .coordinator(test_coordinator())
                .handles(handles)
                .evaluator(evaluator)
                .build()
                .unwrap(),
        );

        let first = engine.run_cycle(&handle()).await;
        match first {
            CycleOutcome::Submitted(action) => {
                assert_eq!(action.status, ActionStatus::PendingApproval);
            }
            other => panic!("expected Submitted, got {:?}", other),
        }

        let second = engine.run_cycle(&handle()).await;
        assert!(matches!(second, CycleOutcome::NoAction));
        assert_eq!(engine.coordinator().store().outstanding_count(), 1);
    }

    #[tokio::test]
    async fn test_run_cycle_all_covers_every_handle() {
        let provider = Arc::new(ScriptedProvider::new(30.0, 100.0));
        let engine = test_engine(provider, AutomationLevel::FullAuto);
        engine
            .handles()
            .register(ResourceHandle::new("vpc", "elastic-ips", "eu-west-1", "eip"));

        engine.run_cycle_all().await;
        // Both handles were fetched and recorded
        assert_eq!(
            engine.handles().len(),
            2
        );
    }

    #[test]
    fn test_handle_registry() {
        let registry = HandleRegistry::new();
        assert!(registry.is_empty());

        registry.register(handle());
        registry.register(handle());
        assert_eq!(registry.len(), 1);

        registry.deregister(&handle());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_builder_requires_provider() {
        let result = Engine::builder()
            .policies(Arc::new(InMemoryPolicyStore::new()))
            .coordinator(test_coordinator())
            .build();
        assert!(result.is_err());
    }
}
