use crate::error::OffloadError;
use crate::ports::{PortId, PortMask};
use sonic_bridge_types::FlowKey;

/// A flow entry as reported by the hardware table driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HwMulticastEntry {
    pub key: FlowKey,
    pub ingress: PortId,
    /// Ports the hardware forwards the flow to.
    pub fwd_mask: PortMask,
    /// Entry is programmed in the switch, not only cached by the driver.
    pub in_hardware: bool,
}

/// Request to program one multicast flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardDescriptor {
    /// Bridge the entry belongs to.
    pub bridge: String,
    pub key: FlowKey,
    pub ingress: PortId,
    pub fwd_mask: PortMask,
    /// Also trap the flow to the CPU, for members hardware cannot reach.
    pub to_cpu: bool,
}

/// Advice returned by [`HardwareOffloadBridge::try_accelerate`].
///
/// [`HardwareOffloadBridge::try_accelerate`]: super::HardwareOffloadBridge::try_accelerate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OffloadDecision {
    /// Hardware already forwards the flow to these ports.
    AlreadyInstalled(PortMask),
    /// A new entry forwarding to these ports was programmed.
    Installed(PortMask),
    /// The flow has no receivers; hardware now drops it.
    Blocked,
    /// Software handles the flow.
    NotApplicable,
}

impl OffloadDecision {
    /// Ports hardware delivers to, which software must skip.
    pub fn hw_mask(&self) -> PortMask {
        match *self {
            OffloadDecision::AlreadyInstalled(mask) | OffloadDecision::Installed(mask) => mask,
            OffloadDecision::Blocked | OffloadDecision::NotApplicable => PortMask::EMPTY,
        }
    }
}

/// Driver for the hardware multicast table.
pub trait MulticastOffload: Send + Sync {
    fn find_entry(&self, key: &FlowKey, ingress: PortId) -> Option<HwMulticastEntry>;

    fn add_entry(&self, desc: &ForwardDescriptor) -> Result<(), OffloadError>;

    /// Installs a rule dropping the flow in hardware.
    fn block_flow(&self, key: &FlowKey, ingress: PortId) -> Result<(), OffloadError>;

    fn invalidate_entry(&self, key: &FlowKey) -> Result<(), OffloadError>;
}

/// Driver for platforms without a hardware multicast table.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOffload;

impl MulticastOffload for NoOffload {
    fn find_entry(&self, _key: &FlowKey, _ingress: PortId) -> Option<HwMulticastEntry> {
        None
    }

    fn add_entry(&self, _desc: &ForwardDescriptor) -> Result<(), OffloadError> {
        Err(OffloadError::Unsupported)
    }

    fn block_flow(&self, _key: &FlowKey, _ingress: PortId) -> Result<(), OffloadError> {
        Err(OffloadError::Unsupported)
    }

    fn invalidate_entry(&self, _key: &FlowKey) -> Result<(), OffloadError> {
        Ok(())
    }
}
