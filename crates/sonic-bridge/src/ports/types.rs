//! Bridge port types.

use crate::frame::IngressStamp;
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use sonic_bridge_types::{VlanId, VlanSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Maximum number of ports on one bridge; port ids index a 64-bit mask.
pub const MAX_PORTS: usize = 64;

/// Default Ethernet MTU.
pub const DEFAULT_MTU: u32 = 1500;

/// Stable bit index of a bridge port.
///
/// Assigned when the port joins and never reused while it stays attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PortId(u8);

impl PortId {
    /// Returns `None` if `id` does not fit the port mask.
    pub const fn new(id: u8) -> Option<Self> {
        if (id as usize) < MAX_PORTS {
            Some(PortId(id))
        } else {
            None
        }
    }

    pub const fn index(&self) -> u8 {
        self.0
    }

    pub const fn bit(&self) -> u64 {
        1u64 << self.0
    }
}

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Set of ports as a bitmask over [`PortId`]s.
///
/// Intersection and union are single machine operations, which is what
/// keeps multicast membership checks O(1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct PortMask(u64);

impl PortMask {
    pub const EMPTY: PortMask = PortMask(0);

    pub const fn from_bits(bits: u64) -> Self {
        PortMask(bits)
    }

    pub const fn bits(&self) -> u64 {
        self.0
    }

    pub fn of(ids: &[PortId]) -> Self {
        ids.iter().fold(PortMask::EMPTY, |mask, id| mask.with(*id))
    }

    pub const fn contains(&self, id: PortId) -> bool {
        self.0 & id.bit() != 0
    }

    pub fn insert(&mut self, id: PortId) {
        self.0 |= id.bit();
    }

    pub fn remove(&mut self, id: PortId) {
        self.0 &= !id.bit();
    }

    #[must_use]
    pub const fn with(self, id: PortId) -> Self {
        PortMask(self.0 | id.bit())
    }

    #[must_use]
    pub const fn without(self, id: PortId) -> Self {
        PortMask(self.0 & !id.bit())
    }

    #[must_use]
    pub const fn union(self, other: PortMask) -> Self {
        PortMask(self.0 | other.0)
    }

    #[must_use]
    pub const fn intersect(self, other: PortMask) -> Self {
        PortMask(self.0 & other.0)
    }

    /// Ports in `self` that are not in `other`.
    #[must_use]
    pub const fn difference(self, other: PortMask) -> Self {
        PortMask(self.0 & !other.0)
    }

    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub const fn is_subset_of(&self, other: PortMask) -> bool {
        self.0 & !other.0 == 0
    }

    pub const fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    /// Lowest id not in the mask.
    pub fn first_free(&self) -> Option<PortId> {
        let free = !self.0;
        if free == 0 {
            None
        } else {
            PortId::new(free.trailing_zeros() as u8)
        }
    }

    /// Member ids in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = PortId> {
        let bits = self.0;
        (0..MAX_PORTS as u8)
            .filter(move |i| bits & (1u64 << i) != 0)
            .filter_map(PortId::new)
    }
}

impl FromIterator<PortId> for PortMask {
    fn from_iter<T: IntoIterator<Item = PortId>>(iter: T) -> Self {
        iter.into_iter().fold(PortMask::EMPTY, |mask, id| mask.with(id))
    }
}

/// Opaque handle of the network device behind a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceHandle(pub u32);

impl fmt::Display for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dev{}", self.0)
    }
}

/// Spanning-tree port state, as set by the STP collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortState {
    Disabled,
    Listening,
    Learning,
    Forwarding,
    Blocking,
}

impl PortState {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "0" | "disabled" => Some(Self::Disabled),
            "1" | "listening" => Some(Self::Listening),
            "2" | "learning" => Some(Self::Learning),
            "3" | "forwarding" => Some(Self::Forwarding),
            "4" | "blocking" => Some(Self::Blocking),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::Listening => "listening",
            Self::Learning => "learning",
            Self::Forwarding => "forwarding",
            Self::Blocking => "blocking",
        }
    }

    /// Source addresses are learned in Learning and Forwarding.
    pub fn learns(&self) -> bool {
        matches!(self, Self::Learning | Self::Forwarding)
    }
}

impl fmt::Display for PortState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

bitflags! {
    /// Per-port delivery attributes.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct PortFlags: u32 {
        /// Frames may be sent back out of the device they arrived on.
        const HAIRPIN = 1 << 0;
        /// Port receives unknown-unicast floods.
        const FLOOD = 1 << 1;
        /// Port answers ARP on behalf of its hosts; never flooded.
        const PROXYARP = 1 << 2;
        /// Wireless proxy ARP; skipped once a proxied reply was sent.
        const PROXYARP_WIFI = 1 << 3;
        /// Upstream (WAN-facing) port.
        const UPSTREAM = 1 << 4;
        /// Port is backed by the hardware switch and reachable by the
        /// hardware multicast table.
        const HW_OFFLOAD = 1 << 5;
    }
}

impl Default for PortFlags {
    fn default() -> Self {
        PortFlags::FLOOD
    }
}

/// Drop counters kept per port. Shared by every snapshot of the port.
#[derive(Debug, Default)]
pub struct PortStats {
    pub tx_dropped: AtomicU64,
}

impl PortStats {
    pub fn tx_dropped(&self) -> u64 {
        self.tx_dropped.load(Ordering::Relaxed)
    }
}

/// Description of a device joining the bridge.
#[derive(Debug, Clone)]
pub struct PortDescriptor {
    pub name: String,
    pub device: DeviceHandle,
    pub state: PortState,
    pub flags: PortFlags,
    /// VLANs allowed on egress.
    pub vlans: VlanSet,
    /// Subset of `vlans` sent untagged.
    pub untagged: VlanSet,
    /// VLAN assigned to untagged ingress frames.
    pub pvid: Option<VlanId>,
    /// VLAN of the device itself (802.1Q sub-interface), used by isolation mode.
    pub device_vlan: Option<u16>,
    /// Logical LAN group, used by LAN isolation.
    pub lan_group: Option<u16>,
    pub mtu: u32,
}

impl PortDescriptor {
    /// A forwarding, flood-enabled port with no VLAN configuration.
    pub fn new(name: impl Into<String>, device: DeviceHandle) -> Self {
        Self {
            name: name.into(),
            device,
            state: PortState::Forwarding,
            flags: PortFlags::default(),
            vlans: VlanSet::new(),
            untagged: VlanSet::new(),
            pvid: None,
            device_vlan: None,
            lan_group: None,
            mtu: DEFAULT_MTU,
        }
    }

    pub fn with_state(mut self, state: PortState) -> Self {
        self.state = state;
        self
    }

    pub fn with_flags(mut self, flags: PortFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Adds a VLAN; `untagged` also makes it leave the port without a tag.
    pub fn with_vlan(mut self, vlan: VlanId, untagged: bool) -> Self {
        self.vlans.insert(vlan);
        if untagged {
            self.untagged.insert(vlan);
        }
        self
    }

    /// Sets the PVID, which is also an untagged member VLAN.
    pub fn with_pvid(mut self, vlan: VlanId) -> Self {
        self.pvid = Some(vlan);
        self.with_vlan(vlan, true)
    }

    pub fn with_device_vlan(mut self, vlan: u16) -> Self {
        self.device_vlan = Some(vlan);
        self
    }

    pub fn with_lan_group(mut self, group: u16) -> Self {
        self.lan_group = Some(group);
        self
    }

    pub fn with_mtu(mut self, mtu: u32) -> Self {
        self.mtu = mtu;
        self
    }
}

/// A port attached to the bridge.
///
/// Ports are immutable once published in a snapshot; administrative
/// changes publish a modified copy that shares the same [`PortStats`].
#[derive(Debug, Clone)]
pub struct Port {
    pub id: PortId,
    pub name: String,
    pub device: DeviceHandle,
    pub state: PortState,
    pub flags: PortFlags,
    pub vlans: VlanSet,
    pub untagged: VlanSet,
    pub pvid: Option<VlanId>,
    pub device_vlan: Option<u16>,
    pub lan_group: Option<u16>,
    pub mtu: u32,
    pub stats: Arc<PortStats>,
}

impl Port {
    pub fn from_descriptor(id: PortId, desc: PortDescriptor) -> Self {
        Self {
            id,
            name: desc.name,
            device: desc.device,
            state: desc.state,
            flags: desc.flags,
            vlans: desc.vlans,
            untagged: desc.untagged,
            pvid: desc.pvid,
            device_vlan: desc.device_vlan,
            lan_group: desc.lan_group,
            mtu: desc.mtu,
            stats: Arc::new(PortStats::default()),
        }
    }

    pub fn is_forwarding(&self) -> bool {
        self.state == PortState::Forwarding
    }

    pub fn has_flag(&self, flag: PortFlags) -> bool {
        self.flags.contains(flag)
    }

    pub fn allows_vlan(&self, vlan: VlanId) -> bool {
        self.vlans.contains(vlan)
    }

    /// Returns true if frames in `vlan` leave this port untagged.
    pub fn egress_untagged(&self, vlan: VlanId) -> bool {
        self.untagged.contains(vlan)
    }

    /// Ingress attributes copied into a frame received on this port.
    pub fn stamp(&self) -> IngressStamp {
        IngressStamp {
            port: self.id,
            device: self.device,
            device_vlan: self.device_vlan,
            lan_group: self.lan_group,
            upstream: self.has_flag(PortFlags::UPSTREAM),
            hw_backed: self.has_flag(PortFlags::HW_OFFLOAD),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn pid(id: u8) -> PortId {
        PortId::new(id).unwrap()
    }

    #[test]
    fn test_port_id_range() {
        assert!(PortId::new(0).is_some());
        assert!(PortId::new(63).is_some());
        assert!(PortId::new(64).is_none());
        assert_eq!(pid(5).bit(), 0b100000);
    }

    #[test]
    fn test_port_mask_ops() {
        let a = PortMask::of(&[pid(0), pid(2)]);
        let b = PortMask::of(&[pid(1), pid(2)]);

        assert_eq!(a.union(b), PortMask::of(&[pid(0), pid(1), pid(2)]));
        assert_eq!(a.intersect(b), PortMask::of(&[pid(2)]));
        assert_eq!(a.difference(b), PortMask::of(&[pid(0)]));
        assert!(a.intersect(b).is_subset_of(a));
        assert!(!a.is_subset_of(b));
        assert_eq!(a.len(), 2);
        assert_eq!(a.iter().collect::<Vec<_>>(), vec![pid(0), pid(2)]);
        assert_eq!(a.without(pid(0)), PortMask::of(&[pid(2)]));
    }

    #[test]
    fn test_first_free() {
        assert_eq!(PortMask::EMPTY.first_free(), Some(pid(0)));
        assert_eq!(PortMask::of(&[pid(0), pid(1), pid(3)]).first_free(), Some(pid(2)));
        assert_eq!(PortMask::from_bits(u64::MAX).first_free(), None);
    }

    #[test]
    fn test_port_state_parse() {
        assert_eq!(PortState::parse("forwarding"), Some(PortState::Forwarding));
        assert_eq!(PortState::parse("4"), Some(PortState::Blocking));
        assert_eq!(PortState::parse("bogus"), None);
        assert!(PortState::Learning.learns());
        assert!(!PortState::Blocking.learns());
    }

    #[test]
    fn test_descriptor_builder() {
        let vlan10 = VlanId::new(10).unwrap();
        let vlan20 = VlanId::new(20).unwrap();
        let desc = PortDescriptor::new("eth1", DeviceHandle(1))
            .with_pvid(vlan10)
            .with_vlan(vlan20, false)
            .with_flags(PortFlags::FLOOD | PortFlags::HAIRPIN);
        let port = Port::from_descriptor(pid(1), desc);

        assert!(port.allows_vlan(vlan10));
        assert!(port.allows_vlan(vlan20));
        assert!(port.egress_untagged(vlan10));
        assert!(!port.egress_untagged(vlan20));
        assert!(port.has_flag(PortFlags::HAIRPIN));
        assert!(port.is_forwarding());
        assert_eq!(port.stamp().port, pid(1));
    }
}
