//! Core library for automated resource-capacity governance
//!
//! This crate provides the monitor-predict-decide-act control loop:
//! - Snapshot acquisition and bounded per-handle history
//! - Trend analysis and demand prediction
//! - Policy evaluation with cost gating and approval routing
//! - Action coordination with a full audit trail
//! - Cross-region capacity pools with optimistic reservations
//! - Health checks and observability

pub mod action;
pub mod engine;
pub mod error;
pub mod health;
pub mod models;
pub mod observability;
pub mod policy;
pub mod pool;
pub mod predict;
pub mod snapshot;
pub mod trend;

pub use engine::{CycleOutcome, Engine, EngineBuilder, EngineConfig, HandleRegistry};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{GovernorMetrics, StructuredLogger};
