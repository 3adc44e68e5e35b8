//! Action persistence and lifecycle
//!
//! The store enforces the coalescing invariant at persistence time:
//! inserting through the per-shard entry lock closes the race between two
//! cycles that both evaluated "no outstanding action" for the same handle.

mod audit;
mod coordinator;
mod gateway;

pub use audit::{AuditLog, AuditSink};
pub use coordinator::{ActionCoordinator, CoordinatorConfig, RetryConfig};
pub use gateway::{ApprovalWorkflow, IncreaseApi, IncreaseReceipt, Notifier, TicketClient};

use crate::error::StoreError;
use crate::models::{Action, ResourceHandle};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::VecDeque;

/// Terminal actions retained per handle
const DEFAULT_RESOLVED_RETAINED: usize = 50;

/// In-process action store, partitioned by handle
///
/// At most one non-terminal action exists per handle at any instant.
pub struct ActionStore {
    outstanding: DashMap<String, Action>,
    resolved: DashMap<String, VecDeque<Action>>,
    resolved_retained: usize,
}

impl ActionStore {
    pub fn new() -> Self {
        Self {
            outstanding: DashMap::new(),
            resolved: DashMap::new(),
            resolved_retained: DEFAULT_RESOLVED_RETAINED,
        }
    }

    pub fn with_resolved_retained(mut self, retained: usize) -> Self {
        self.resolved_retained = retained;
        self
    }

    /// Persist a newly proposed action
    ///
    /// Compare-and-set against the outstanding slot for the handle; a
    /// conflict means another cycle won the race and this proposal is
    /// dropped by the caller.
    pub fn begin(&self, action: Action) -> Result<(), StoreError> {
        let key = action.handle.key();
        match self.outstanding.entry(key.clone()) {
            Entry::Occupied(existing) => Err(StoreError::Outstanding {
                handle: key,
                existing: existing.get().action_id.clone(),
            }),
            Entry::Vacant(slot) => {
                slot.insert(action);
                Ok(())
            }
        }
    }

    /// Persist an action's current state
    ///
    /// Non-terminal updates overwrite the outstanding slot; terminal
    /// states retire the action into the bounded resolved history,
    /// freeing the slot for the next proposal.
    pub fn persist(&self, action: &Action) {
        let key = action.handle.key();
        if action.status.is_terminal() {
            self.outstanding
                .remove_if(&key, |_, current| current.action_id == action.action_id);
            let mut history = self.resolved.entry(key).or_default();
            history.push_back(action.clone());
            while history.len() > self.resolved_retained {
                history.pop_front();
            }
        } else {
            self.outstanding.insert(key, action.clone());
        }
    }

    /// The handle's non-terminal action, if any
    pub fn outstanding(&self, handle: &ResourceHandle) -> Option<Action> {
        self.outstanding.get(&handle.key()).map(|a| a.clone())
    }

    /// The handle's most recently resolved action, if any
    pub fn last_resolved(&self, handle: &ResourceHandle) -> Option<Action> {
        self.resolved
            .get(&handle.key())
            .and_then(|history| history.back().cloned())
    }

    /// Locate a pending action by its approval workflow id
    pub fn find_by_workflow(&self, workflow_id: &str) -> Option<Action> {
        self.outstanding
            .iter()
            .find(|entry| entry.value().workflow_id.as_deref() == Some(workflow_id))
            .map(|entry| entry.value().clone())
    }

    /// Look up any action, outstanding or resolved, by id
    pub fn find(&self, action_id: &str) -> Option<Action> {
        self.outstanding
            .iter()
            .find(|entry| entry.value().action_id == action_id)
            .map(|entry| entry.value().clone())
            .or_else(|| {
                self.resolved.iter().find_map(|entry| {
                    entry
                        .value()
                        .iter()
                        .find(|a| a.action_id == action_id)
                        .cloned()
                })
            })
    }

    /// All non-terminal actions
    pub fn all_outstanding(&self) -> Vec<Action> {
        self.outstanding
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Recently resolved actions across all handles, newest first
    pub fn recent_resolved(&self, limit: usize) -> Vec<Action> {
        let mut actions: Vec<Action> = self
            .resolved
            .iter()
            .flat_map(|entry| entry.value().iter().cloned().collect::<Vec<_>>())
            .collect();
        actions.sort_by_key(|a| std::cmp::Reverse(a.resolved_at.unwrap_or(a.created_at)));
        actions.truncate(limit);
        actions
    }

    pub fn outstanding_count(&self) -> usize {
        self.outstanding.len()
    }
}

impl Default for ActionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ActionKind, ActionStatus, Severity};

    fn handle() -> ResourceHandle {
        ResourceHandle::new("ec2", "running-instances", "us-east-1", "vcpu")
    }

    fn action(id: &str, status: ActionStatus) -> Action {
        Action {
            action_id: id.to_string(),
            handle: handle(),
            kind: ActionKind::AutoIncrease,
            severity: Severity::Critical,
            requested_value: 150.0,
            estimated_cost: 10.0,
            status,
            created_at: 1000,
            resolved_at: None,
            ticket_id: None,
            workflow_id: None,
            detail: None,
        }
    }

    #[test]
    fn test_begin_rejects_second_outstanding() {
        let store = ActionStore::new();
        store.begin(action("a-1", ActionStatus::Proposed)).unwrap();

        let err = store
            .begin(action("a-2", ActionStatus::Proposed))
            .unwrap_err();
        assert_eq!(
            err,
            StoreError::Outstanding {
                handle: handle().key(),
                existing: "a-1".to_string(),
            }
        );
        assert_eq!(store.outstanding_count(), 1);
    }

    #[test]
    fn test_terminal_persist_frees_slot() {
        let store = ActionStore::new();
        store.begin(action("a-1", ActionStatus::Proposed)).unwrap();

        let mut done = action("a-1", ActionStatus::Succeeded);
        done.resolved_at = Some(2000);
        store.persist(&done);

        assert!(store.outstanding(&handle()).is_none());
        assert_eq!(
            store.last_resolved(&handle()).unwrap().status,
            ActionStatus::Succeeded
        );
        assert!(store.begin(action("a-2", ActionStatus::Proposed)).is_ok());
    }

    #[test]
    fn test_find_by_workflow() {
        let store = ActionStore::new();
        let mut pending = action("a-1", ActionStatus::PendingApproval);
        pending.workflow_id = Some("wf-42".to_string());
        store.begin(pending).unwrap();

        assert_eq!(
            store.find_by_workflow("wf-42").unwrap().action_id,
            "a-1".to_string()
        );
        assert!(store.find_by_workflow("wf-99").is_none());
    }

    #[test]
    fn test_resolved_history_bounded() {
        let store = ActionStore::new().with_resolved_retained(3);
        for i in 0..10 {
            let mut done = action(&format!("a-{}", i), ActionStatus::Succeeded);
            done.resolved_at = Some(1000 + i);
            store.persist(&done);
        }

        assert_eq!(store.recent_resolved(100).len(), 3);
        assert_eq!(store.last_resolved(&handle()).unwrap().action_id, "a-9");
    }

    #[test]
    fn test_find_in_either_partition() {
        let store = ActionStore::new();
        store.begin(action("live", ActionStatus::Executing)).unwrap();
        let mut done = action("done", ActionStatus::Failed);
        done.resolved_at = Some(2000);
        store.persist(&done);

        assert!(store.find("live").is_some());
        assert!(store.find("done").is_some());
        assert!(store.find("missing").is_none());
    }
}
