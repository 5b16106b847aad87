//! Port and frame fixtures for bridge scenarios
//!
//! Host MACs are locally administered `02:00:00:00:00:NN`; the default
//! multicast sender is `10.0.0.9`.

use bytes::Bytes;
use sonic_bridge::{
    DeviceHandle, Frame, FrameMeta, IpMulticastInfo, PortDescriptor, PortFlags,
};
use sonic_bridge_types::{FlowKey, GroupAddress, MacAddress, VlanId};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Default frame payload length.
pub const PAYLOAD_LEN: usize = 100;

/// Source of multicast fixtures.
pub const MCAST_SOURCE: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 9);

/// Unicast host address `02:00:00:00:00:<n>`.
pub fn host_mac(n: u8) -> MacAddress {
    MacAddress::new([0x02, 0, 0, 0, 0, n])
}

pub fn vlan(id: u16) -> VlanId {
    match VlanId::new(id) {
        Ok(v) => v,
        Err(e) => panic!("fixture VLAN {id}: {e}"),
    }
}

/// IPv4 group address; panics on a non-multicast address.
pub fn group(addr: Ipv4Addr) -> GroupAddress {
    match GroupAddress::from_v4(addr) {
        Some(g) => g,
        None => panic!("{addr} is not a multicast group"),
    }
}

/// Any-source flow key for a group, as the snooping collaborator reports it.
pub fn group_key(addr: Ipv4Addr) -> FlowKey {
    FlowKey::new(group(addr))
}

/// Common port descriptor fixtures
pub mod port_fixtures {
    use super::*;

    /// Ethernet port forwarding with the default flags.
    pub fn ethernet(name: &str, device: u32) -> PortDescriptor {
        PortDescriptor::new(name, DeviceHandle(device))
    }

    /// Port backed by a switch ASIC port.
    pub fn hw_ethernet(name: &str, device: u32) -> PortDescriptor {
        ethernet(name, device).with_flags(PortFlags::FLOOD | PortFlags::HW_OFFLOAD)
    }

    /// Uplink port, optionally backed by the switch.
    pub fn upstream(name: &str, device: u32, hw: bool) -> PortDescriptor {
        let mut flags = PortFlags::FLOOD | PortFlags::UPSTREAM;
        if hw {
            flags |= PortFlags::HW_OFFLOAD;
        }
        ethernet(name, device).with_flags(flags)
    }

    /// Access port: `id` untagged and as PVID.
    pub fn access(name: &str, device: u32, id: u16) -> PortDescriptor {
        ethernet(name, device)
            .with_vlan(vlan(id), true)
            .with_pvid(vlan(id))
    }

    /// Trunk port carrying `ids` tagged.
    pub fn trunk(name: &str, device: u32, ids: &[u16]) -> PortDescriptor {
        ids.iter()
            .fold(ethernet(name, device), |desc, id| desc.with_vlan(vlan(*id), false))
    }
}

/// Common frame fixtures
pub mod frame_fixtures {
    use super::*;

    fn frame(payload: impl Into<Bytes>, meta: FrameMeta) -> Frame {
        Frame::new(payload, meta)
    }

    pub fn unicast(dst: u8, src: u8) -> Frame {
        frame(
            vec![0u8; PAYLOAD_LEN],
            FrameMeta {
                dst: host_mac(dst),
                src: host_mac(src),
                ethertype: 0x0800,
                ..Default::default()
            },
        )
    }

    pub fn broadcast(src: u8) -> Frame {
        frame(
            vec![0u8; PAYLOAD_LEN],
            FrameMeta {
                dst: MacAddress::BROADCAST,
                src: host_mac(src),
                ethertype: 0x0806,
                ..Default::default()
            },
        )
    }

    /// UDP to an IPv4 group from [`MCAST_SOURCE`].
    pub fn ipv4_multicast(group: Ipv4Addr) -> Frame {
        ipv4_multicast_from(group, MCAST_SOURCE)
    }

    pub fn ipv4_multicast_from(group: Ipv4Addr, source: Ipv4Addr) -> Frame {
        frame(vec![0u8; PAYLOAD_LEN], ipv4_meta(group, source))
    }

    pub fn ipv6_multicast(group: Ipv6Addr) -> Frame {
        frame(
            vec![0u8; PAYLOAD_LEN],
            FrameMeta {
                dst: MacAddress::from_ipv6_group(group),
                src: host_mac(0x99),
                ethertype: 0x86dd,
                ip: Some(IpMulticastInfo {
                    source: IpAddr::V6(Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, 9)),
                    destination: IpAddr::V6(group),
                    protocol: 17,
                }),
                ..Default::default()
            },
        )
    }

    pub fn ipv4_meta(group: Ipv4Addr, source: Ipv4Addr) -> FrameMeta {
        FrameMeta {
            dst: MacAddress::from_ipv4_group(group),
            src: host_mac(0x99),
            ethertype: 0x0800,
            ip: Some(IpMulticastInfo {
                source: IpAddr::V4(source),
                destination: IpAddr::V4(group),
                protocol: 17,
            }),
            ..Default::default()
        }
    }
}

/// Counts how many times payload buffers are released.
#[derive(Debug, Clone, Default)]
pub struct ReleaseCounter(Arc<AtomicUsize>);

impl ReleaseCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn released(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    /// Payload of `len` bytes whose buffer bumps this counter when the
    /// last reference to it goes away.
    pub fn payload(&self, len: usize) -> Bytes {
        Bytes::from_owner(Tracked {
            data: vec![0u8; len],
            releases: self.0.clone(),
        })
    }
}

struct Tracked {
    data: Vec<u8>,
    releases: Arc<AtomicUsize>,
}

impl AsRef<[u8]> for Tracked {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

impl Drop for Tracked {
    fn drop(&mut self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }
}
