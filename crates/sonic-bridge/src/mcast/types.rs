//! Multicast membership types.

use crate::ports::PortMask;
use serde::Serialize;
use sonic_bridge_types::FlowKey;

/// Snooped state for one (source, group, VLAN).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupEntry {
    #[serde(serialize_with = "serialize_key")]
    pub key: FlowKey,
    /// Ports with listeners.
    pub members: PortMask,
    /// Ports receiving this group regardless of listeners.
    pub router_ports: PortMask,
}

fn serialize_key<S: serde::Serializer>(key: &FlowKey, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(key)
}

impl GroupEntry {
    pub fn new(key: FlowKey) -> Self {
        Self {
            key,
            members: PortMask::EMPTY,
            router_ports: PortMask::EMPTY,
        }
    }
}

/// A membership change reported by the snooping collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipUpdate {
    pub key: FlowKey,
    /// Replaces the entry's member set, or its router-port set when
    /// `is_router_port` is true.
    pub ports: PortMask,
    pub is_router_port: bool,
}

impl MembershipUpdate {
    pub fn members(key: FlowKey, ports: PortMask) -> Self {
        Self {
            key,
            ports,
            is_router_port: false,
        }
    }

    pub fn router_ports(key: FlowKey, ports: PortMask) -> Self {
        Self {
            key,
            ports,
            is_router_port: true,
        }
    }
}

/// Ports a known flow is delivered to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MembershipView {
    pub members: PortMask,
    /// Per-group router ports plus the bridge-wide router ports.
    pub router_ports: PortMask,
    /// Index generation the view was read at. A hardware entry built from
    /// this view is only recorded if the generation is still current.
    pub generation: u64,
}

impl MembershipView {
    /// Every port that should receive the flow.
    pub fn ports(&self) -> PortMask {
        self.members.union(self.router_ports)
    }
}

/// Effect of a membership mutation on the hardware table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexChange {
    /// Entry removed by an expiry.
    pub removed: Option<GroupEntry>,
    /// Programmed flows built from the old membership. The caller
    /// invalidates them in hardware.
    pub released: Vec<FlowKey>,
}

/// Result of a group lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Membership {
    Known(MembershipView),
    /// No entry for the flow; it takes the unknown-multicast path.
    Unknown,
}

impl Membership {
    pub fn is_known(&self) -> bool {
        matches!(self, Membership::Known(_))
    }
}
