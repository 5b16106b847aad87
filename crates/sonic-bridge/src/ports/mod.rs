//! PortTable - the ports attached to a bridge.
//!
//! Every port carries a stable small-integer id used as its bit in
//! [`PortMask`], the only representation multicast membership uses.
//! The table is read on every frame and written only by the
//! administrative and spanning-tree collaborators, so reads go through
//! immutable snapshots.

mod table;
mod types;

pub use table::{PortSnapshot, PortTable};
pub use types::{
    DeviceHandle, Port, PortDescriptor, PortFlags, PortId, PortMask, PortState, PortStats,
    DEFAULT_MTU, MAX_PORTS,
};
