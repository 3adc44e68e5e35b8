//! Cross-region capacity pools
//!
//! The one genuinely shared mutable resource in the engine: regional
//! headroom earmarked for failover scenarios. Pool records are
//! version-stamped and every mutation is an optimistic-concurrency
//! update, so two coordination runs can never double-allocate the same
//! headroom. Reservations carry an expiry and are reclaimed when the
//! associated failover event never consumes them.

use crate::error::PoolError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

/// Versioned snapshot of one regional pool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolState {
    pub region: String,
    pub kind: String,
    pub total_capacity: f64,
    pub reserved: f64,
    /// Bumped on every successful mutation; callers pass the version they
    /// read back into [`CapacityPoolRegistry::reserve`].
    pub version: u64,
}

impl PoolState {
    /// Headroom not yet claimed by any reservation
    pub fn available(&self) -> f64 {
        self.total_capacity - self.reserved
    }
}

/// A claim against a regional pool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reservation {
    pub reservation_id: String,
    pub region: String,
    pub kind: String,
    pub amount: f64,
    /// Unix timestamp after which the reservation is reclaimable
    pub expires_at: i64,
}

struct PoolEntry {
    state: PoolState,
    reservations: HashMap<String, Reservation>,
}

/// Registry of regional capacity pools indexed by (region, kind)
#[derive(Default)]
pub struct CapacityPoolRegistry {
    pools: RwLock<HashMap<(String, String), PoolEntry>>,
}

impl CapacityPoolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pool, replacing any prior record for the index
    pub fn register(&self, region: impl Into<String>, kind: impl Into<String>, total: f64) {
        let region = region.into();
        let kind = kind.into();
        let mut pools = self.pools.write().unwrap();
        pools.insert(
            (region.clone(), kind.clone()),
            PoolEntry {
                state: PoolState {
                    region,
                    kind,
                    total_capacity: total,
                    reserved: 0.0,
                    version: 0,
                },
                reservations: HashMap::new(),
            },
        );
    }

    /// Read the current pool state, including its version stamp
    pub fn state(&self, region: &str, kind: &str) -> Option<PoolState> {
        let pools = self.pools.read().unwrap();
        pools
            .get(&(region.to_string(), kind.to_string()))
            .map(|entry| entry.state.clone())
    }

    /// Reserve headroom against the version the caller read
    ///
    /// Fails with [`PoolError::VersionConflict`] when the pool changed
    /// underneath the caller, who must re-read and retry.
    pub fn reserve(
        &self,
        region: &str,
        kind: &str,
        amount: f64,
        ttl_secs: i64,
        now: i64,
        expected_version: u64,
    ) -> Result<Reservation, PoolError> {
        let mut pools = self.pools.write().unwrap();
        let entry = pools
            .get_mut(&(region.to_string(), kind.to_string()))
            .ok_or_else(|| PoolError::UnknownPool {
                region: region.to_string(),
                kind: kind.to_string(),
            })?;

        if entry.state.version != expected_version {
            return Err(PoolError::VersionConflict {
                region: region.to_string(),
                kind: kind.to_string(),
                expected: expected_version,
                found: entry.state.version,
            });
        }

        if entry.state.available() < amount {
            return Err(PoolError::InsufficientHeadroom {
                region: region.to_string(),
                kind: kind.to_string(),
                available: entry.state.available(),
                requested: amount,
            });
        }

        let reservation = Reservation {
            reservation_id: next_reservation_id(),
            region: region.to_string(),
            kind: kind.to_string(),
            amount,
            expires_at: now + ttl_secs,
        };
        entry.state.reserved += amount;
        entry.state.version += 1;
        entry
            .reservations
            .insert(reservation.reservation_id.clone(), reservation.clone());

        Ok(reservation)
    }

    /// Consume a reservation: the failover event claimed the headroom
    pub fn consume(&self, reservation_id: &str) -> Result<(), PoolError> {
        let mut pools = self.pools.write().unwrap();
        for entry in pools.values_mut() {
            if let Some(reservation) = entry.reservations.remove(reservation_id) {
                entry.state.reserved -= reservation.amount;
                entry.state.total_capacity -= reservation.amount;
                entry.state.version += 1;
                return Ok(());
            }
        }
        Err(PoolError::UnknownReservation(reservation_id.to_string()))
    }

    /// Release a reservation back to the pool unconsumed
    pub fn release(&self, reservation_id: &str) -> Result<(), PoolError> {
        let mut pools = self.pools.write().unwrap();
        for entry in pools.values_mut() {
            if let Some(reservation) = entry.reservations.remove(reservation_id) {
                entry.state.reserved -= reservation.amount;
                entry.state.version += 1;
                return Ok(());
            }
        }
        Err(PoolError::UnknownReservation(reservation_id.to_string()))
    }

    /// Reclaim reservations whose expiry has passed
    pub fn reclaim_expired(&self, now: i64) -> usize {
        let mut pools = self.pools.write().unwrap();
        let mut reclaimed = 0;
        for entry in pools.values_mut() {
            let expired: Vec<String> = entry
                .reservations
                .values()
                .filter(|r| r.expires_at <= now)
                .map(|r| r.reservation_id.clone())
                .collect();
            for id in expired {
                if let Some(reservation) = entry.reservations.remove(&id) {
                    entry.state.reserved -= reservation.amount;
                    entry.state.version += 1;
                    reclaimed += 1;
                }
            }
        }
        reclaimed
    }

    /// Outstanding reservations across all pools
    pub fn reservation_count(&self) -> usize {
        let pools = self.pools.read().unwrap();
        pools.values().map(|entry| entry.reservations.len()).sum()
    }
}

fn next_reservation_id() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    static SEQUENCE: AtomicU64 = AtomicU64::new(0);
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    format!(
        "rsv-{:x}-{:x}",
        now.as_secs(),
        SEQUENCE.fetch_add(1, Ordering::Relaxed)
    )
}
