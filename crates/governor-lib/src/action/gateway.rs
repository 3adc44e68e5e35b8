//! External execution collaborators
//!
//! Narrow seams to the systems the coordinator drives: the capacity
//! increase API, the support/ticket fallback, the approval workflow and
//! the notification sender. Implementations map their transport failures
//! onto the transient/permanent [`GatewayError`] taxonomy so the
//! coordinator can decide what to retry.

use crate::error::GatewayError;
use crate::models::{Action, ResourceHandle, Severity};
use async_trait::async_trait;

/// Outcome of an accepted increase request
#[derive(Debug, Clone)]
pub struct IncreaseReceipt {
    pub accepted: bool,
    pub request_id: String,
}

/// Capacity increase API
#[async_trait]
pub trait IncreaseApi: Send + Sync {
    async fn request_increase(
        &self,
        handle: &ResourceHandle,
        desired_value: f64,
    ) -> Result<IncreaseReceipt, GatewayError>;
}

/// Support/ticket fallback for increases that cannot execute directly
#[async_trait]
pub trait TicketClient: Send + Sync {
    /// Returns the created ticket id
    async fn create_ticket(
        &self,
        handle: &ResourceHandle,
        justification: &str,
        desired_value: f64,
    ) -> Result<String, GatewayError>;
}

/// Human approval workflow trigger
#[async_trait]
pub trait ApprovalWorkflow: Send + Sync {
    /// Returns the workflow handle used by the approval callback
    async fn start_approval(&self, action: &Action) -> Result<String, GatewayError>;
}

/// Notification sender
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(
        &self,
        severity: Severity,
        message: &str,
        recipients: &[String],
    ) -> Result<(), GatewayError>;
}
