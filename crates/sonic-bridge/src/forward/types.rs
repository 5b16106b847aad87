//! Facade types: the egress collaborator and per-frame outcomes.

use crate::error::DropReason;
use crate::fanout::FanoutOutcome;
use crate::frame::Frame;
use crate::ports::{Port, PortId, PortMask, PortState};

/// Egress collaborator: hands a frame to a port's device.
///
/// Any error is terminal for that delivery; the bridge counts it and never
/// retries.
pub trait Transmit: Send + Sync {
    fn transmit(&self, port: &Port, frame: Frame) -> Result<(), DropReason>;
}

/// How a multicast frame was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MulticastPath {
    /// Delivered to the snooped membership.
    Known,
    /// No membership; flooded after passing the limiter.
    Unknown,
    /// Reserved group; flooded to every eligible port.
    Reserved,
    /// Hardware forwards to `hw_mask`; software covered the rest.
    HardwareAssisted { hw_mask: PortMask },
    /// No receivers; hardware now drops the flow.
    HardwareBlocked,
    /// Unknown flow over its packet ceiling; dropped.
    RateLimited,
    /// Snooping disabled; flooded like broadcast.
    Unsnooped,
}

/// Result of [`Bridge::flood_multicast`](super::Bridge::flood_multicast).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MulticastOutcome {
    pub path: MulticastPath,
    pub fanout: FanoutOutcome,
}

/// Why a received frame was dropped before any forwarding decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngressDrop {
    UnknownPort,
    /// VLAN not configured on the ingress port, or untagged with no PVID.
    VlanNotAllowed,
    /// Ingress port is not forwarding. Learning ports still learn.
    PortState(PortState),
}

/// Forwarding path chosen for a received frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardPath {
    /// Addressed to the bridge itself.
    Local,
    KnownUnicast(PortId),
    UnknownUnicast,
    /// Broadcast and non-IP multicast.
    Broadcast,
    Multicast(MulticastPath),
    Dropped(IngressDrop),
}

/// What happened to a received frame.
#[derive(Debug)]
pub struct Disposition {
    pub path: ForwardPath,
    pub fanout: FanoutOutcome,
    /// Frame handed back for local delivery to the bridge device.
    pub local: Option<Frame>,
}

impl Disposition {
    pub(crate) fn dropped(reason: IngressDrop) -> Self {
        Self {
            path: ForwardPath::Dropped(reason),
            fanout: FanoutOutcome::NoEligiblePort,
            local: None,
        }
    }

    pub fn delivered(&self) -> usize {
        self.fanout.delivered()
    }
}
