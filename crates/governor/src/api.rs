//! HTTP API for the governor daemon
//!
//! Health checks and Prometheus metrics, plus the inbound approval
//! callback and read-only action/audit queries.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use governor_lib::action::{ActionCoordinator, AuditLog};
use governor_lib::{ApprovalDecision, ComponentStatus, GovernorMetrics, HealthRegistry};
use prometheus::{Encoder, TextEncoder};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub metrics: GovernorMetrics,
    pub coordinator: Arc<ActionCoordinator>,
    pub audit: Arc<AuditLog>,
}

impl AppState {
    pub fn new(
        health_registry: HealthRegistry,
        metrics: GovernorMetrics,
        coordinator: Arc<ActionCoordinator>,
        audit: Arc<AuditLog>,
    ) -> Self {
        Self {
            health_registry,
            metrics,
            coordinator,
            audit,
        }
    }
}

/// Health check response - returns 200 if healthy, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::OK, // Still operational
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    encoder.encode(&metric_families, &mut buffer).unwrap();

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
}

/// Outstanding and recently resolved actions
async fn list_actions(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let store = state.coordinator.store();
    Json(json!({
        "outstanding": store.all_outstanding(),
        "recent": store.recent_resolved(50),
    }))
}

#[derive(Debug, Deserialize)]
struct AuditQuery {
    handle: Option<String>,
    from: Option<i64>,
    to: Option<i64>,
}

/// Audit records, filtered by handle and time range
async fn query_audit(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AuditQuery>,
) -> impl IntoResponse {
    let records = match query.handle {
        Some(handle) => state.audit.query(
            &handle,
            query.from.unwrap_or(0),
            query.to.unwrap_or(i64::MAX),
        ),
        None => state.audit.recent(100),
    };
    Json(records)
}

#[derive(Debug, Deserialize)]
struct ApprovalBody {
    decision: ApprovalDecision,
}

/// Inbound approval callback
async fn resolve_approval(
    State(state): State<Arc<AppState>>,
    Path(workflow_id): Path<String>,
    Json(body): Json<ApprovalBody>,
) -> impl IntoResponse {
    match state
        .coordinator
        .resolve_approval(&workflow_id, body.decision)
        .await
    {
        Some(action) => (StatusCode::OK, Json(json!(action))),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({
                "error": format!("no pending approval for workflow {}", workflow_id),
            })),
        ),
    }
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/v1/actions", get(list_actions))
        .route("/v1/audit", get(query_audit))
        .route("/v1/approvals/:workflow_id", post(resolve_approval))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
