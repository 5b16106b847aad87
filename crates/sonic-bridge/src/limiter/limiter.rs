use super::types::{LimiterKey, UnknownFlowRecord, Verdict};
use crate::clock::Clock;
use crate::config::{ExhaustionPolicy, LimiterConfig};
use crate::debug_log;
use parking_lot::Mutex;
use sonic_bridge_types::{FlowKey, GroupAddress};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Per-flow packet ceiling for multicast flows with no snooped membership.
///
/// The table has a fixed number of slots. A frame for an untracked flow
/// takes, in order: the first free slot, then the first slot whose window
/// has run out (or lies in the future because the clock moved back). When
/// neither exists the configured [`ExhaustionPolicy`] decides.
pub struct UnknownMulticastLimiter {
    enabled: bool,
    ceiling: u64,
    window: Duration,
    policy: ExhaustionPolicy,
    track_source: bool,
    extra_reserved: Vec<GroupAddress>,
    clock: Arc<dyn Clock>,
    table: Mutex<Vec<UnknownFlowRecord>>,
}

impl std::fmt::Debug for UnknownMulticastLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnknownMulticastLimiter")
            .field("enabled", &self.enabled)
            .field("ceiling", &self.ceiling)
            .field("window", &self.window)
            .field("policy", &self.policy)
            .field("capacity", &self.capacity())
            .finish_non_exhaustive()
    }
}

impl UnknownMulticastLimiter {
    pub fn new(config: &LimiterConfig, clock: Arc<dyn Clock>) -> Self {
        let now = clock.now();
        Self {
            enabled: config.enabled,
            ceiling: config.max_packets_per_window,
            window: config.window(),
            policy: config.exhaustion_policy,
            track_source: config.track_source,
            extra_reserved: config.extra_reserved_groups.clone(),
            clock,
            table: Mutex::new(vec![UnknownFlowRecord::empty(now); config.capacity]),
        }
    }

    pub fn capacity(&self) -> usize {
        self.table.lock().len()
    }

    /// Returns true for groups the limiter never blocks.
    pub fn is_exempt(&self, group: &GroupAddress) -> bool {
        group.is_reserved() || self.extra_reserved.contains(group)
    }

    /// Accounts one frame of `key` and decides whether it may be flooded.
    pub fn admit(&self, key: &FlowKey) -> Verdict {
        if !self.enabled || self.is_exempt(&key.group) {
            return Verdict::Admit;
        }

        let key = LimiterKey::from_flow(key, self.track_source);
        let now = self.clock.now();
        let mut table = self.table.lock();

        let slot = table
            .iter()
            .position(|r| r.key == Some(key))
            .or_else(|| table.iter().position(|r| !r.is_valid()))
            .or_else(|| table.iter().position(|r| self.expired(r, now)));

        let Some(slot) = slot else {
            drop(table);
            debug_log!(
                "UnknownMulticastLimiter",
                flow = %key,
                policy = ?self.policy,
                "unknown multicast table exhausted"
            );
            return match self.policy {
                ExhaustionPolicy::FailOpen => Verdict::Admit,
                ExhaustionPolicy::FailClosed => Verdict::Block,
            };
        };

        let record = &mut table[slot];
        let fresh = record.key != Some(key);
        if fresh || self.expired(record, now) {
            *record = UnknownFlowRecord {
                key: Some(key),
                window_start: now,
                packets: 1,
            };
            return Verdict::Admit;
        }

        record.packets += 1;
        if record.packets > self.ceiling {
            Verdict::Block
        } else {
            Verdict::Admit
        }
    }

    /// Outside the window in either direction.
    fn expired(&self, record: &UnknownFlowRecord, now: Instant) -> bool {
        match now.checked_duration_since(record.window_start) {
            Some(elapsed) => elapsed >= self.window,
            None => true,
        }
    }

    /// Frees every slot.
    pub fn clear(&self) {
        let now = self.clock.now();
        self.table
            .lock()
            .iter_mut()
            .for_each(|r| *r = UnknownFlowRecord::empty(now));
    }

    /// Number of flows currently tracked.
    pub fn tracked(&self) -> usize {
        self.table.lock().iter().filter(|r| r.is_valid()).count()
    }

    /// Copy of the table, for diagnostics.
    pub fn records(&self) -> Vec<UnknownFlowRecord> {
        self.table.lock().clone()
    }
}
