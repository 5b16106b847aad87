//! Frames moving through the bridge.
//!
//! A [`Frame`] owns its payload and is deliberately not `Clone`: every
//! extra copy goes through a [`FrameAllocator`], which may fail under
//! memory pressure. The payload is a [`Bytes`] buffer, so a copy shares
//! the data and only duplicates metadata.

use crate::ports::{DeviceHandle, PortId};
use bytes::Bytes;
use sonic_bridge_types::{FlowKey, GroupAddress, MacAddress, VlanId};
use std::net::IpAddr;

/// Ethernet header length without a VLAN tag.
pub const ETH_HLEN: usize = 14;

/// Length of an 802.1Q tag.
pub const VLAN_HLEN: usize = 4;

/// Platform mark on a frame, set by the classification stage upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameMark {
    #[default]
    None,
    /// Frame came from the guest network. Guest traffic never reaches
    /// multicast listeners.
    Guest,
}

/// IP fields of a multicast frame, as parsed upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpMulticastInfo {
    pub source: IpAddr,
    pub destination: IpAddr,
    pub protocol: u8,
}

/// Attributes of the port a frame entered on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngressStamp {
    pub port: PortId,
    pub device: DeviceHandle,
    pub device_vlan: Option<u16>,
    pub lan_group: Option<u16>,
    pub upstream: bool,
    pub hw_backed: bool,
}

/// Everything the bridge knows about a frame besides its bytes.
#[derive(Debug, Clone, Default)]
pub struct FrameMeta {
    pub dst: MacAddress,
    pub src: MacAddress,
    /// VLAN the frame belongs to, if VLAN processing assigned one.
    pub vlan: Option<VlanId>,
    /// Whether the frame carries an 802.1Q tag on the wire.
    pub tagged: bool,
    pub ethertype: u16,
    pub ip: Option<IpMulticastInfo>,
    pub mark: FrameMark,
    /// A proxied ARP reply was already sent for this frame.
    pub proxyarp_replied: bool,
    /// Set when the frame entered through a bridge port; `None` for frames
    /// originated by the bridge itself.
    pub ingress: Option<IngressStamp>,
}

/// A frame in flight.
#[derive(Debug)]
pub struct Frame {
    payload: Bytes,
    pub meta: FrameMeta,
    cloned: bool,
}

impl Frame {
    /// Builds a frame from its payload (L3 and up) and metadata.
    pub fn new(payload: impl Into<Bytes>, meta: FrameMeta) -> Self {
        Self {
            payload: payload.into(),
            meta,
            cloned: false,
        }
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Copy sharing this frame's payload. Allocators build on this.
    pub fn shallow_clone(&self) -> Frame {
        Frame {
            payload: self.payload.clone(),
            meta: self.meta.clone(),
            cloned: true,
        }
    }

    /// Returns true if this frame was produced by an allocator copy.
    pub fn is_clone(&self) -> bool {
        self.cloned
    }

    pub fn dst(&self) -> MacAddress {
        self.meta.dst
    }

    pub fn src(&self) -> MacAddress {
        self.meta.src
    }

    pub fn ingress(&self) -> Option<&IngressStamp> {
        self.meta.ingress.as_ref()
    }

    pub fn ingress_port(&self) -> Option<PortId> {
        self.meta.ingress.map(|s| s.port)
    }

    /// On-wire length including the Ethernet header and any VLAN tag.
    pub fn len(&self) -> usize {
        let header = if self.meta.tagged {
            ETH_HLEN + VLAN_HLEN
        } else {
            ETH_HLEN
        };
        header + self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Length the frame will have on a port's wire, for MTU checks: the
    /// Ethernet header and tag do not count against the MTU.
    pub fn l2_payload_len(&self) -> usize {
        self.payload.len()
    }

    /// Multicast key derived from the IP header, or `None` if the frame is
    /// not IP multicast or its destination is not a multicast address.
    pub fn flow_key(&self, vlan_aware: bool) -> Option<FlowKey> {
        let ip = self.meta.ip?;
        let group = GroupAddress::new(ip.destination)?;
        let mut key = FlowKey::new(group).with_source(ip.source);
        if vlan_aware {
            if let Some(vlan) = self.meta.vlan {
                key = key.with_vlan(vlan);
            }
        }
        Some(key)
    }
}

/// Source of frame copies.
pub trait FrameAllocator: Send + Sync {
    /// Returns a copy of `frame`, or `None` if no buffer is available.
    fn try_clone(&self, frame: &Frame) -> Option<Frame>;
}

/// Allocator that never fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeapAllocator;

impl FrameAllocator for HeapAllocator {
    fn try_clone(&self, frame: &Frame) -> Option<Frame> {
        Some(frame.shallow_clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::net::Ipv4Addr;

    fn mcast_meta() -> FrameMeta {
        FrameMeta {
            dst: MacAddress::from_ipv4_group(Ipv4Addr::new(239, 1, 2, 3)),
            src: MacAddress::new([0x02, 0, 0, 0, 0, 1]),
            vlan: Some(VlanId::new(10).unwrap()),
            ethertype: 0x0800,
            ip: Some(IpMulticastInfo {
                source: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
                destination: IpAddr::V4(Ipv4Addr::new(239, 1, 2, 3)),
                protocol: 17,
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_length_accounts_for_tag() {
        let mut frame = Frame::new(vec![0u8; 100], FrameMeta::default());
        assert_eq!(frame.len(), 114);
        frame.meta.tagged = true;
        assert_eq!(frame.len(), 118);
        assert_eq!(frame.l2_payload_len(), 100);
    }

    #[test]
    fn test_shallow_clone_shares_payload() {
        let frame = Frame::new(Bytes::from_static(b"hello"), mcast_meta());
        let copy = HeapAllocator.try_clone(&frame).unwrap();

        assert!(!frame.is_clone());
        assert!(copy.is_clone());
        assert_eq!(copy.payload().as_ptr(), frame.payload().as_ptr());
        assert_eq!(copy.dst(), frame.dst());
    }

    #[test]
    fn test_flow_key() {
        let frame = Frame::new(Bytes::new(), mcast_meta());

        let key = frame.flow_key(true).unwrap();
        assert_eq!(key.group.to_string(), "239.1.2.3");
        assert_eq!(key.source, Some(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1))));
        assert_eq!(key.vlan, Some(VlanId::new(10).unwrap()));

        assert_eq!(frame.flow_key(false).unwrap().vlan, None);
    }

    #[test]
    fn test_flow_key_requires_multicast_destination() {
        let mut meta = mcast_meta();
        meta.ip = Some(IpMulticastInfo {
            source: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
            destination: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)),
            protocol: 17,
        });
        assert!(Frame::new(Bytes::new(), meta).flow_key(false).is_none());

        let broadcast = Frame::new(Bytes::new(), FrameMeta::default());
        assert!(broadcast.flow_key(false).is_none());
    }
}
