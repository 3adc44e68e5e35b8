//! Audit trail
//!
//! One record per action status transition, append-only. Records are
//! never mutated; retention is enforced only by explicit pruning against
//! the configured audit window.

use crate::models::AuditRecord;
use std::sync::RwLock;

/// Write-only stream of audit records
///
/// Implementations must preserve insertion order and never drop records
/// inside the retention window.
pub trait AuditSink: Send + Sync {
    fn append(&self, record: AuditRecord);
}

/// In-process audit log, queryable by handle and time range
#[derive(Default)]
pub struct AuditLog {
    records: RwLock<Vec<AuditRecord>>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records for one handle within [from, to], oldest first
    pub fn query(&self, handle_key: &str, from: i64, to: i64) -> Vec<AuditRecord> {
        let records = self.records.read().unwrap();
        records
            .iter()
            .filter(|r| r.handle_key == handle_key && r.timestamp >= from && r.timestamp <= to)
            .cloned()
            .collect()
    }

    /// Full transition history for one action, oldest first
    pub fn for_action(&self, action_id: &str) -> Vec<AuditRecord> {
        let records = self.records.read().unwrap();
        records
            .iter()
            .filter(|r| r.action_id == action_id)
            .cloned()
            .collect()
    }

    /// Most recent records across all handles, newest first
    pub fn recent(&self, limit: usize) -> Vec<AuditRecord> {
        let records = self.records.read().unwrap();
        records.iter().rev().take(limit).cloned().collect()
    }

    /// Drop records older than the retention cutoff
    pub fn prune_before(&self, cutoff: i64) -> usize {
        let mut records = self.records.write().unwrap();
        let before = records.len();
        records.retain(|r| r.timestamp >= cutoff);
        before - records.len()
    }

    pub fn len(&self) -> usize {
        self.records.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AuditSink for AuditLog {
    fn append(&self, record: AuditRecord) {
        self.records.write().unwrap().push(record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ActionStatus;

    fn record(action_id: &str, handle_key: &str, timestamp: i64) -> AuditRecord {
        AuditRecord {
            action_id: action_id.to_string(),
            handle_key: handle_key.to_string(),
            previous_status: Some(ActionStatus::Proposed),
            new_status: ActionStatus::Executing,
            actor: "governor-engine".to_string(),
            timestamp,
            detail: String::new(),
        }
    }

    #[test]
    fn test_query_by_handle_and_range() {
        let log = AuditLog::new();
        log.append(record("a-1", "ec2/vcpu/us-east-1", 100));
        log.append(record("a-2", "ec2/vcpu/us-east-1", 200));
        log.append(record("a-3", "vpc/eip/us-east-1", 150));

        let hits = log.query("ec2/vcpu/us-east-1", 50, 150);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].action_id, "a-1");
    }

    #[test]
    fn test_for_action_preserves_order() {
        let log = AuditLog::new();
        log.append(record("a-1", "k", 100));
        log.append(record("a-1", "k", 200));
        log.append(record("a-2", "k", 150));

        let trail = log.for_action("a-1");
        assert_eq!(trail.len(), 2);
        assert!(trail[0].timestamp < trail[1].timestamp);
    }

    #[test]
    fn test_prune_before() {
        let log = AuditLog::new();
        for ts in [100, 200, 300] {
            log.append(record("a-1", "k", ts));
        }

        assert_eq!(log.prune_before(250), 2);
        assert_eq!(log.len(), 1);
    }
}
