//! Capacity Governor - automated resource-capacity governance daemon
//!
//! Runs the monitor-predict-decide-act loop over the configured resource
//! handles and serves the health/metrics/approval API.

use anyhow::Result;
use governor_lib::action::{
    ActionCoordinator, ActionStore, ApprovalWorkflow, AuditLog, AuditSink, CoordinatorConfig,
    IncreaseApi, Notifier, TicketClient,
};
use governor_lib::engine::{Engine, EngineConfig, HandleRegistry};
use governor_lib::health::{components, HealthRegistry};
use governor_lib::policy::PolicyEvaluator;
use governor_lib::predict::DemandPredictor;
use governor_lib::snapshot::{HistoryConfig, SnapshotHistory, SnapshotProvider};
use governor_lib::trend::TrendAnalyzer;
use governor_lib::{GovernorMetrics, StructuredLogger};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod adapters;
mod api;
mod config;

const GOVERNOR_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting capacity-governor");

    // Load configuration
    let config = config::GovernorConfig::load()?;
    info!(
        instance = %config.instance_name,
        resources = config.resources.len(),
        "Governor configured"
    );

    // Initialize health registry
    let health_registry = HealthRegistry::new();
    health_registry.register(components::SNAPSHOT_PROVIDER).await;
    health_registry.register(components::EVALUATOR).await;
    health_registry.register(components::COORDINATOR).await;
    health_registry.register(components::CAPACITY_POOL).await;

    // Initialize metrics and structured logging
    let metrics = GovernorMetrics::new();
    let logger = StructuredLogger::new(&config.instance_name);

    // Wire the HTTP collaborator adapters
    let client = adapters::http_client(Duration::from_secs(config.fetch_timeout_secs))?;
    let provider = Arc::new(adapters::HttpSnapshotProvider::new(
        client.clone(),
        config.endpoints.capacity_api.clone(),
    ));
    let increase_api = Arc::new(adapters::HttpIncreaseApi::new(
        client.clone(),
        config.endpoints.capacity_api.clone(),
    ));
    let tickets = Arc::new(adapters::HttpTicketClient::new(
        client.clone(),
        config.endpoints.ticket_api.clone(),
    ));
    let approvals = Arc::new(adapters::HttpApprovalWorkflow::new(
        client.clone(),
        config.endpoints.approval_api.clone(),
    ));
    let notifier = Arc::new(adapters::WebhookNotifier::new(
        client,
        config.endpoints.notify_webhook.clone(),
    ));

    // Action store, audit log and coordinator
    let store = Arc::new(ActionStore::new());
    let audit = Arc::new(AuditLog::new());
    let coordinator = Arc::new(ActionCoordinator::new(
        store,
        Arc::clone(&audit) as Arc<dyn AuditSink>,
        increase_api as Arc<dyn IncreaseApi>,
        tickets as Arc<dyn TicketClient>,
        approvals as Arc<dyn ApprovalWorkflow>,
        notifier as Arc<dyn Notifier>,
        CoordinatorConfig {
            approval_timeout: config.approval_timeout(),
            recipients: config.recipients.clone(),
            ..Default::default()
        },
        metrics.clone(),
    ));

    // Tracked handles
    let handles = Arc::new(HandleRegistry::new());
    for resource in &config.resources {
        handles.register(resource.handle());
    }

    // Assemble the engine
    let engine = Arc::new(
        Engine::builder()
            .provider(provider as Arc<dyn SnapshotProvider>)
            .policies(Arc::new(config.policy_store()))
            .coordinator(Arc::clone(&coordinator))
            .handles(Arc::clone(&handles))
            .history(Arc::new(SnapshotHistory::new(HistoryConfig {
                retention: config.retention(),
                ..Default::default()
            })))
            .health(health_registry.clone())
            .analyzer(TrendAnalyzer::new().with_min_samples(config.min_samples))
            .predictor(DemandPredictor::new().with_horizon(config.horizon()))
            .evaluator(PolicyEvaluator::new(
                config.cost_model.clone(),
                config.business_hours.clone(),
            ))
            .config(EngineConfig {
                cycle_interval: config.cycle_interval(),
                cycle_budget: config.cycle_interval(),
                fetch_timeout: config.fetch_timeout(),
                trend_window: config.trend_window(),
                ..Default::default()
            })
            .build()?,
    );

    logger.log_startup(GOVERNOR_VERSION, handles.len());

    // Mark governor as ready after initialization
    health_registry.set_ready(true).await;

    // Start the cycle loop and the API server
    let (shutdown_tx, _) = tokio::sync::broadcast::channel(1);
    let engine_handle = tokio::spawn(Arc::clone(&engine).run(shutdown_tx.subscribe()));

    let app_state = Arc::new(api::AppState::new(
        health_registry.clone(),
        metrics.clone(),
        Arc::clone(&coordinator),
        Arc::clone(&audit),
    ));
    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    logger.log_shutdown("SIGINT received");
    info!("Shutting down");

    let _ = shutdown_tx.send(());
    let _ = engine_handle.await;
    api_handle.abort();

    Ok(())
}
