//! Resource snapshot acquisition
//!
//! The snapshot provider is the engine's only view of current capacity
//! state. Fetches are bounded by a wall-clock budget; a timeout or
//! provider error means "no action this cycle" for that handle.

mod history;

pub use history::{HistoryConfig, SnapshotHistory};

use crate::error::SnapshotError;
use crate::models::{ResourceHandle, Snapshot};
use async_trait::async_trait;
use std::time::Duration;

/// Default budget for a single snapshot fetch
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Trait for capacity query implementations
#[async_trait]
pub trait SnapshotProvider: Send + Sync {
    /// Query current usage and limit for a handle
    async fn fetch(&self, handle: &ResourceHandle) -> Result<Snapshot, SnapshotError>;
}

/// Fetch a snapshot under a wall-clock budget
///
/// Maps an elapsed budget onto [`SnapshotError::Timeout`] so the caller
/// never blocks indefinitely on a slow provider.
pub async fn fetch_with_timeout(
    provider: &dyn SnapshotProvider,
    handle: &ResourceHandle,
    budget: Duration,
) -> Result<Snapshot, SnapshotError> {
    match tokio::time::timeout(budget, provider.fetch(handle)).await {
        Ok(result) => result,
        Err(_) => Err(SnapshotError::Timeout(budget.as_millis() as u64)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SlowProvider;

    #[async_trait]
    impl SnapshotProvider for SlowProvider {
        async fn fetch(&self, handle: &ResourceHandle) -> Result<Snapshot, SnapshotError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Snapshot {
                handle: handle.clone(),
                timestamp: 0,
                current_usage: 0.0,
                limit_value: 0.0,
            })
        }
    }

    struct FastProvider;

    #[async_trait]
    impl SnapshotProvider for FastProvider {
        async fn fetch(&self, handle: &ResourceHandle) -> Result<Snapshot, SnapshotError> {
            Ok(Snapshot {
                handle: handle.clone(),
                timestamp: 1_700_000_000,
                current_usage: 42.0,
                limit_value: 100.0,
            })
        }
    }

    fn test_handle() -> ResourceHandle {
        ResourceHandle::new("ec2", "running-instances", "us-east-1", "vcpu")
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_timeout() {
        let provider = SlowProvider;
        let result =
            fetch_with_timeout(&provider, &test_handle(), Duration::from_millis(100)).await;
        assert!(matches!(result, Err(SnapshotError::Timeout(100))));
    }

    #[tokio::test]
    async fn test_fetch_within_budget() {
        let provider = FastProvider;
        let snapshot = fetch_with_timeout(&provider, &test_handle(), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(snapshot.current_usage, 42.0);
        assert_eq!(snapshot.limit_value, 100.0);
    }
}
