//! Error taxonomy for the governance engine
//!
//! Each component boundary returns its own error kind so callers can
//! distinguish transient conditions (retry), degraded input (fall back),
//! configuration errors (skip and surface) and permanent execution
//! failures (terminal).

use thiserror::Error;

/// Snapshot provider failures, all treated as "no action this cycle"
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// The provider did not answer within the fetch budget
    #[error("snapshot fetch timed out after {0} ms")]
    Timeout(u64),

    /// The provider answered with an error
    #[error("snapshot provider unavailable: {0}")]
    Unavailable(String),
}

/// Fatal policy configuration errors
///
/// Not retried; the affected handle is skipped for the cycle and the
/// error is surfaced to the operator.
#[derive(Debug, Error, PartialEq)]
pub enum PolicyError {
    #[error("policy for {handle} is missing required threshold `{threshold}`")]
    MissingThreshold {
        handle: String,
        threshold: &'static str,
    },

    #[error("policy for {handle} has invalid thresholds: {reason}")]
    InvalidThresholds { handle: String, reason: String },
}

/// Failures from external execution collaborators
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Network errors, timeouts, rate limits; retried with backoff
    #[error("transient gateway error: {0}")]
    Transient(String),

    /// Authorization denied, invalid request; never retried
    #[error("permanent gateway error: {0}")]
    Permanent(String),
}

impl GatewayError {
    pub fn is_transient(&self) -> bool {
        matches!(self, GatewayError::Transient(_))
    }
}

/// Action store persistence conflicts
#[derive(Debug, Error, PartialEq)]
pub enum StoreError {
    /// The handle already has a non-terminal action; the new one is
    /// coalesced away rather than duplicated
    #[error("handle {handle} already has outstanding action {existing}")]
    Outstanding { handle: String, existing: String },
}

/// Capacity pool reservation failures
#[derive(Debug, Error, PartialEq)]
pub enum PoolError {
    /// The pool record changed since it was read; re-read and retry
    #[error("pool {region}/{kind} version conflict: expected {expected}, found {found}")]
    VersionConflict {
        region: String,
        kind: String,
        expected: u64,
        found: u64,
    },

    /// Not enough unreserved headroom to satisfy the reservation
    #[error("pool {region}/{kind} has {available} unreserved, requested {requested}")]
    InsufficientHeadroom {
        region: String,
        kind: String,
        available: f64,
        requested: f64,
    },

    #[error("no pool registered for {region}/{kind}")]
    UnknownPool { region: String, kind: String },

    #[error("unknown reservation {0}")]
    UnknownReservation(String),
}
