//! HTTP-backed collaborator adapters
//!
//! Thin reqwest clients for the external systems the engine drives.
//! Transport failures and 429/5xx responses map to transient gateway
//! errors (retried by the coordinator); other 4xx responses are
//! permanent.

use async_trait::async_trait;
use governor_lib::action::{ApprovalWorkflow, IncreaseApi, IncreaseReceipt, Notifier, TicketClient};
use governor_lib::error::{GatewayError, SnapshotError};
use governor_lib::models::{Action, ResourceHandle, Severity, Snapshot};
use governor_lib::snapshot::SnapshotProvider;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Shared HTTP client with a request timeout
pub fn http_client(timeout: Duration) -> reqwest::Result<Client> {
    Client::builder().timeout(timeout).build()
}

fn classify_status(status: StatusCode, body: String) -> GatewayError {
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        GatewayError::Transient(format!("{}: {}", status, body))
    } else {
        GatewayError::Permanent(format!("{}: {}", status, body))
    }
}

async fn gateway_error(response: Response) -> GatewayError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    classify_status(status, body)
}

fn transport_error(e: reqwest::Error) -> GatewayError {
    // All transport-level failures are worth retrying
    GatewayError::Transient(e.to_string())
}

/// Capacity query API adapter
pub struct HttpSnapshotProvider {
    client: Client,
    base_url: String,
}

impl HttpSnapshotProvider {
    pub fn new(client: Client, base_url: String) -> Self {
        Self { client, base_url }
    }
}

#[derive(Debug, Deserialize)]
struct LimitResponse {
    usage: f64,
    limit: f64,
}

#[async_trait]
impl SnapshotProvider for HttpSnapshotProvider {
    async fn fetch(&self, handle: &ResourceHandle) -> Result<Snapshot, SnapshotError> {
        let url = format!(
            "{}/v1/limits/{}/{}",
            self.base_url, handle.service, handle.limit_id
        );
        let response = self
            .client
            .get(&url)
            .query(&[("region", handle.region.as_str())])
            .send()
            .await
            .map_err(|e| SnapshotError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(SnapshotError::Unavailable(format!(
                "capacity API returned {}",
                response.status()
            )));
        }

        let limit: LimitResponse = response
            .json()
            .await
            .map_err(|e| SnapshotError::Unavailable(e.to_string()))?;

        Ok(Snapshot {
            handle: handle.clone(),
            timestamp: chrono::Utc::now().timestamp(),
            current_usage: limit.usage,
            limit_value: limit.limit,
        })
    }
}

/// Capacity increase API adapter
pub struct HttpIncreaseApi {
    client: Client,
    base_url: String,
}

impl HttpIncreaseApi {
    pub fn new(client: Client, base_url: String) -> Self {
        Self { client, base_url }
    }
}

#[derive(Debug, Serialize)]
struct IncreaseRequest<'a> {
    region: &'a str,
    desired_value: f64,
}

#[derive(Debug, Deserialize)]
struct IncreaseResponse {
    accepted: bool,
    request_id: String,
}

#[async_trait]
impl IncreaseApi for HttpIncreaseApi {
    async fn request_increase(
        &self,
        handle: &ResourceHandle,
        desired_value: f64,
    ) -> Result<IncreaseReceipt, GatewayError> {
        let url = format!(
            "{}/v1/limits/{}/{}/increase",
            self.base_url, handle.service, handle.limit_id
        );
        let response = self
            .client
            .post(&url)
            .json(&IncreaseRequest {
                region: &handle.region,
                desired_value,
            })
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(gateway_error(response).await);
        }

        let body: IncreaseResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Permanent(format!("malformed increase response: {}", e)))?;

        Ok(IncreaseReceipt {
            accepted: body.accepted,
            request_id: body.request_id,
        })
    }
}

/// Support/ticket fallback adapter
pub struct HttpTicketClient {
    client: Client,
    base_url: String,
}

impl HttpTicketClient {
    pub fn new(client: Client, base_url: String) -> Self {
        Self { client, base_url }
    }
}

#[derive(Debug, Serialize)]
struct TicketRequest<'a> {
    service: &'a str,
    limit_id: &'a str,
    region: &'a str,
    justification: &'a str,
    desired_value: f64,
}

#[derive(Debug, Deserialize)]
struct TicketResponse {
    ticket_id: String,
}

#[async_trait]
impl TicketClient for HttpTicketClient {
    async fn create_ticket(
        &self,
        handle: &ResourceHandle,
        justification: &str,
        desired_value: f64,
    ) -> Result<String, GatewayError> {
        let url = format!("{}/v1/tickets", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&TicketRequest {
                service: &handle.service,
                limit_id: &handle.limit_id,
                region: &handle.region,
                justification,
                desired_value,
            })
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(gateway_error(response).await);
        }

        let body: TicketResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Permanent(format!("malformed ticket response: {}", e)))?;
        Ok(body.ticket_id)
    }
}

/// Approval workflow trigger adapter
pub struct HttpApprovalWorkflow {
    client: Client,
    base_url: String,
}

impl HttpApprovalWorkflow {
    pub fn new(client: Client, base_url: String) -> Self {
        Self { client, base_url }
    }
}

#[derive(Debug, Serialize)]
struct ApprovalRequest<'a> {
    action_id: &'a str,
    handle: String,
    requested_value: f64,
    estimated_cost: f64,
}

#[derive(Debug, Deserialize)]
struct ApprovalResponse {
    workflow_id: String,
}

#[async_trait]
impl ApprovalWorkflow for HttpApprovalWorkflow {
    async fn start_approval(&self, action: &Action) -> Result<String, GatewayError> {
        let url = format!("{}/v1/approvals", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&ApprovalRequest {
                action_id: &action.action_id,
                handle: action.handle.key(),
                requested_value: action.requested_value,
                estimated_cost: action.estimated_cost,
            })
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(gateway_error(response).await);
        }

        let body: ApprovalResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Permanent(format!("malformed approval response: {}", e)))?;
        Ok(body.workflow_id)
    }
}

/// Webhook notification adapter
pub struct WebhookNotifier {
    client: Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(client: Client, url: String) -> Self {
        Self { client, url }
    }
}

#[derive(Debug, Serialize)]
struct NotifyPayload<'a> {
    severity: Severity,
    message: &'a str,
    recipients: &'a [String],
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(
        &self,
        severity: Severity,
        message: &str,
        recipients: &[String],
    ) -> Result<(), GatewayError> {
        let response = self
            .client
            .post(&self.url)
            .json(&NotifyPayload {
                severity,
                message,
                recipients,
            })
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(gateway_error(response).await);
        }
        Ok(())
    }
}
