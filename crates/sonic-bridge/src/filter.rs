//! DeliveryFilter - may this frame leave through this port?

use crate::config::{Capabilities, FilterConfig};
use crate::frame::{Frame, FrameMark};
use crate::ports::{Port, PortFlags};
use sonic_bridge_types::VlanId;

/// Per-port delivery predicate.
///
/// Implementations must be pure: they are called concurrently from every
/// forwarding thread against immutable port snapshots.
pub trait DeliveryFilter: Send + Sync {
    fn should_deliver(&self, port: &Port, frame: &Frame) -> bool;
}

/// Why [`StandardFilter`] rejected a delivery. Exposed for diagnostics and
/// tests; the data path only looks at the boolean.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Egress device is the ingress device and the port is not in hairpin mode.
    Hairpin,
    NotForwarding,
    VlanNotAllowed,
    VlanIsolated,
    LanIsolated,
    GuestMulticast,
}

/// The bridge's delivery rules, with VLAN checks enabled by capability.
#[derive(Debug, Clone)]
pub struct StandardFilter {
    vlan_aware: bool,
    vlan_isolation: bool,
    lan_isolation: bool,
}

impl StandardFilter {
    pub fn new(caps: Capabilities, config: &FilterConfig) -> Self {
        Self {
            vlan_aware: caps.contains(Capabilities::VLAN_AWARE),
            vlan_isolation: config.vlan_isolation,
            lan_isolation: config.lan_isolation,
        }
    }

    /// Returns the first rule the delivery violates, if any.
    pub fn check(&self, port: &Port, frame: &Frame) -> Option<Rejection> {
        let meta = &frame.meta;

        if let Some(ingress) = meta.ingress.as_ref() {
            if ingress.device == port.device && !port.has_flag(PortFlags::HAIRPIN) {
                return Some(Rejection::Hairpin);
            }
        }

        if !port.is_forwarding() {
            return Some(Rejection::NotForwarding);
        }

        if self.vlan_aware {
            if let Some(vlan) = meta.vlan {
                if !port.allows_vlan(vlan) {
                    return Some(Rejection::VlanNotAllowed);
                }
            }
        }

        if let Some(ingress) = meta.ingress.as_ref() {
            if self.vlan_isolation {
                if let (Some(from), Some(to)) = (ingress.device_vlan, port.device_vlan) {
                    if VlanId::is_valid(from) && VlanId::is_valid(to) && from != to {
                        return Some(Rejection::VlanIsolated);
                    }
                }
            }

            if self.lan_isolation && (meta.dst.is_broadcast() || meta.dst.is_unicast()) {
                if let (Some(from), Some(to)) = (ingress.lan_group, port.lan_group) {
                    if from == to {
                        return Some(Rejection::LanIsolated);
                    }
                }
            }
        }

        if meta.mark == FrameMark::Guest && meta.dst.is_multicast() {
            return Some(Rejection::GuestMulticast);
        }

        None
    }
}

impl DeliveryFilter for StandardFilter {
    fn should_deliver(&self, port: &Port, frame: &Frame) -> bool {
        self.check(port, frame).is_none()
    }
}
