use serde::Serialize;
use sonic_bridge_types::{FlowKey, GroupAddress};
use std::fmt;
use std::net::IpAddr;
use std::time::Instant;

/// Limiter decision for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Admit,
    Block,
}

/// Flow identity as tracked by the limiter: the group, plus the source when
/// source tracking is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LimiterKey {
    pub group: GroupAddress,
    pub source: Option<IpAddr>,
}

impl LimiterKey {
    pub fn from_flow(key: &FlowKey, track_source: bool) -> Self {
        Self {
            group: key.group,
            source: if track_source { key.source } else { None },
        }
    }
}

impl fmt::Display for LimiterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.source {
            Some(src) => write!(f, "({}, {})", src, self.group),
            None => write!(f, "(*, {})", self.group),
        }
    }
}

/// One slot of the unknown-flow table. A slot with no key is free.
#[derive(Debug, Clone, Copy)]
pub struct UnknownFlowRecord {
    pub key: Option<LimiterKey>,
    pub window_start: Instant,
    pub packets: u64,
}

impl UnknownFlowRecord {
    pub fn empty(now: Instant) -> Self {
        Self {
            key: None,
            window_start: now,
            packets: 0,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.key.is_some()
    }
}
