//! Governor configuration
//!
//! Loaded from an optional `governor.toml` plus `GOVERNOR_*` environment
//! variables; every field has a serde default so a bare environment still
//! yields a runnable configuration.

use anyhow::{Context, Result};
use governor_lib::models::ResourceHandle;
use governor_lib::policy::{BusinessHours, CostModel, InMemoryPolicyStore, Policy};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

fn default_instance_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "governor".to_string())
}

fn default_api_port() -> u16 {
    8080
}

fn default_cycle_interval() -> u64 {
    300
}

fn default_fetch_timeout() -> u64 {
    10
}

fn default_trend_window_days() -> u64 {
    30
}

fn default_retention_days() -> u64 {
    30
}

fn default_horizon_days() -> u64 {
    7
}

fn default_min_samples() -> usize {
    7
}

fn default_approval_timeout() -> u64 {
    3600
}

/// Daemon configuration
#[derive(Debug, Clone, Deserialize)]
pub struct GovernorConfig {
    #[serde(default = "default_instance_name")]
    pub instance_name: String,

    /// API server port for health/metrics/approvals
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Governance cycle interval in seconds
    #[serde(default = "default_cycle_interval")]
    pub cycle_interval_secs: u64,

    /// Snapshot fetch budget in seconds
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,

    /// Trend analysis window in days
    #[serde(default = "default_trend_window_days")]
    pub trend_window_days: u64,

    /// Snapshot history retention in days
    #[serde(default = "default_retention_days")]
    pub retention_days: u64,

    /// Demand prediction horizon in days
    #[serde(default = "default_horizon_days")]
    pub horizon_days: u64,

    /// Minimum samples before the trend is trusted
    #[serde(default = "default_min_samples")]
    pub min_samples: usize,

    /// Approval expiry window in seconds
    #[serde(default = "default_approval_timeout")]
    pub approval_timeout_secs: u64,

    #[serde(default)]
    pub business_hours: BusinessHours,

    /// Notification recipients
    #[serde(default)]
    pub recipients: Vec<String>,

    #[serde(default)]
    pub cost_model: CostModel,

    #[serde(default)]
    pub endpoints: EndpointConfig,

    /// Policies keyed by handle pattern (`service/limit/region`,
    /// `service/*` or `*`)
    #[serde(default)]
    pub policies: HashMap<String, Policy>,

    /// Resource handles to track
    #[serde(default)]
    pub resources: Vec<TrackedResource>,
}

/// Collaborator endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct EndpointConfig {
    /// Capacity query + increase API base URL
    #[serde(default = "default_capacity_api")]
    pub capacity_api: String,
    /// Support/ticket API base URL
    #[serde(default = "default_ticket_api")]
    pub ticket_api: String,
    /// Approval workflow API base URL
    #[serde(default = "default_approval_api")]
    pub approval_api: String,
    /// Notification webhook URL
    #[serde(default = "default_notify_webhook")]
    pub notify_webhook: String,
}

fn default_capacity_api() -> String {
    "http://capacity-api:9090".to_string()
}

fn default_ticket_api() -> String {
    "http://support-api:9091".to_string()
}

fn default_approval_api() -> String {
    "http://approval-api:9092".to_string()
}

fn default_notify_webhook() -> String {
    "http://notifier:9093/webhook".to_string()
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            capacity_api: default_capacity_api(),
            ticket_api: default_ticket_api(),
            approval_api: default_approval_api(),
            notify_webhook: default_notify_webhook(),
        }
    }
}

/// One tracked capacity resource
#[derive(Debug, Clone, Deserialize)]
pub struct TrackedResource {
    pub service: String,
    pub limit_id: String,
    pub region: String,
    pub kind: String,
    /// Inline policy for exactly this handle; pattern policies apply
    /// otherwise
    #[serde(default)]
    pub policy: Option<Policy>,
}

impl TrackedResource {
    pub fn handle(&self) -> ResourceHandle {
        ResourceHandle::new(
            self.service.clone(),
            self.limit_id.clone(),
            self.region.clone(),
            self.kind.clone(),
        )
    }
}

impl GovernorConfig {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("governor").required(false))
            .add_source(config::Environment::with_prefix("GOVERNOR").separator("__"))
            .build()
            .context("Failed to assemble configuration sources")?;

        config
            .try_deserialize()
            .context("Failed to deserialize governor configuration")
    }

    pub fn cycle_interval(&self) -> Duration {
        Duration::from_secs(self.cycle_interval_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn trend_window(&self) -> Duration {
        Duration::from_secs(self.trend_window_days * 24 * 60 * 60)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_days * 24 * 60 * 60)
    }

    pub fn horizon(&self) -> Duration {
        Duration::from_secs(self.horizon_days * 24 * 60 * 60)
    }

    pub fn approval_timeout(&self) -> Duration {
        Duration::from_secs(self.approval_timeout_secs)
    }

    /// Build the policy store from pattern policies and inline resource
    /// policies
    pub fn policy_store(&self) -> InMemoryPolicyStore {
        let mut store = InMemoryPolicyStore::new();
        for (pattern, policy) in &self.policies {
            store.insert(pattern.clone(), policy.clone());
        }
        for resource in &self.resources {
            if let Some(policy) = &resource.policy {
                store.insert(resource.handle().key(), policy.clone());
            }
        }
        store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use governor_lib::policy::{AutomationLevel, PolicyStore};

    #[test]
    fn test_defaults_deserialize_from_empty() {
        let config: GovernorConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.api_port, 8080);
        assert_eq!(config.cycle_interval_secs, 300);
        assert_eq!(config.min_samples, 7);
        assert!(config.resources.is_empty());
    }

    #[test]
    fn test_policy_store_from_config() {
        let raw = r#"
        {
            "policies": {
                "*": {
                    "automation_level": "monitor",
                    "warning_threshold": 70.0,
                    "critical_threshold": 85.0,
                    "emergency_threshold": 95.0
                }
            },
            "resources": [
                {
                    "service": "ec2",
                    "limit_id": "running-instances",
                    "region": "us-east-1",
                    "kind": "vcpu",
                    "policy": {
                        "automation_level": "full_auto",
                        "warning_threshold": 70.0,
                        "critical_threshold": 85.0,
                        "emergency_threshold": 95.0
                    }
                }
            ]
        }
        "#;
        let config: GovernorConfig = serde_json::from_str(raw).unwrap();
        let store = config.policy_store();

        let tracked = config.resources[0].handle();
        assert_eq!(
            store.policy_for(&tracked).unwrap().automation_level,
            AutomationLevel::FullAuto
        );

        let other = ResourceHandle::new("vpc", "elastic-ips", "eu-west-1", "eip");
        assert_eq!(
            store.policy_for(&other).unwrap().automation_level,
            AutomationLevel::Monitor
        );
    }

    #[test]
    fn test_duration_helpers() {
        let config: GovernorConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.cycle_interval(), Duration::from_secs(300));
        assert_eq!(config.horizon(), Duration::from_secs(7 * 24 * 3600));
    }
}
