//! HardwareOffloadBridge - the hardware multicast table adapter.
//!
//! Only the bridges configuration allows may program the table, and
//! only for flows entering on switch-backed ports. Platforms without the
//! table use [`NoOffload`].

mod bridge;
mod types;

pub use bridge::HardwareOffloadBridge;
pub use types::{ForwardDescriptor, HwMulticastEntry, MulticastOffload, NoOffload, OffloadDecision};
