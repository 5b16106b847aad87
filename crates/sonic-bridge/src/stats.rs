//! Bridge-wide forwarding counters.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters updated from the data path with relaxed atomics.
#[derive(Debug, Default)]
pub struct BridgeStats {
    /// Frames handed to the transmit collaborator and accepted.
    pub delivered: AtomicU64,
    /// Frames dropped because a copy could not be made.
    pub tx_dropped: AtomicU64,
    /// Frames the transmit collaborator refused, or dropped on egress
    /// (oversize, VLAN).
    pub egress_dropped: AtomicU64,
    /// Frames that reached no eligible port.
    pub filtered: AtomicU64,
    /// Floods started (broadcast, unknown unicast, unknown multicast).
    pub flooded: AtomicU64,
    pub mcast_known: AtomicU64,
    pub mcast_unknown: AtomicU64,
    pub limiter_blocked: AtomicU64,
    /// Multicast frames whose delivery was taken over by hardware.
    pub hw_forwarded: AtomicU64,
    pub offload_failures: AtomicU64,
    /// Source addresses not learned because the forwarding database was full.
    pub fdb_full: AtomicU64,
}

/// Point-in-time copy of [`BridgeStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub delivered: u64,
    pub tx_dropped: u64,
    pub egress_dropped: u64,
    pub filtered: u64,
    pub flooded: u64,
    pub mcast_known: u64,
    pub mcast_unknown: u64,
    pub limiter_blocked: u64,
    pub hw_forwarded: u64,
    pub offload_failures: u64,
    pub fdb_full: u64,
}

impl BridgeStats {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            delivered: self.delivered.load(Ordering::Relaxed),
            tx_dropped: self.tx_dropped.load(Ordering::Relaxed),
            egress_dropped: self.egress_dropped.load(Ordering::Relaxed),
            filtered: self.filtered.load(Ordering::Relaxed),
            flooded: self.flooded.load(Ordering::Relaxed),
            mcast_known: self.mcast_known.load(Ordering::Relaxed),
            mcast_unknown: self.mcast_unknown.load(Ordering::Relaxed),
            limiter_blocked: self.limiter_blocked.load(Ordering::Relaxed),
            hw_forwarded: self.hw_forwarded.load(Ordering::Relaxed),
            offload_failures: self.offload_failures.load(Ordering::Relaxed),
            fdb_full: self.fdb_full.load(Ordering::Relaxed),
        }
    }
}
