//! Ethernet bridge forwarding engine.
//!
//! Decides, for every frame received on a bridge, which ports get a copy:
//!
//! - [`ports`]: the port table, read through immutable snapshots
//! - [`filter`]: per-port delivery rules (hairpin, STP state, VLAN, isolation)
//! - [`fanout`]: one frame to N deliveries, cloning only when needed
//! - [`mcast`]: snooped multicast membership
//! - [`limiter`]: storm control for multicast flows with no membership
//! - [`offload`]: the hardware multicast table adapter
//! - [`forward`]: the [`Bridge`] facade composing all of the above
//!
//! # Example
//!
//! ```ignore
//! use sonic_bridge::{Bridge, BridgeConfig, DeviceHandle, PortDescriptor};
//!
//! let bridge = Bridge::builder(BridgeConfig::default(), transmit).build()?;
//! let eth0 = bridge.add_port(PortDescriptor::new("eth0", DeviceHandle(2)))?;
//! let eth1 = bridge.add_port(PortDescriptor::new("eth1", DeviceHandle(3)))?;
//!
//! let disposition = bridge.on_frame_received(eth0, frame);
//! ```
//!
//! The data path never fails: every frame is delivered, dropped or
//! handed back, and the outcome is returned as a value. Errors are only
//! returned by administration and configuration.

pub mod audit;
pub mod clock;
pub mod config;
pub mod error;
pub mod fanout;
pub mod fdb;
pub mod filter;
pub mod forward;
pub mod frame;
pub mod limiter;
pub mod mcast;
pub mod offload;
pub mod ports;
pub mod stats;

pub use audit::{init_logging, init_logging_pretty, AuditCategory, AuditOutcome, AuditRecord};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    BridgeConfig, Capabilities, ExhaustionPolicy, FdbConfig, FilterConfig, LimiterConfig,
    OffloadConfig,
};
pub use error::{BridgeError, DropReason, OffloadError, Result};
pub use fanout::{FanoutEngine, FanoutOutcome};
pub use fdb::ForwardingDatabase;
pub use filter::{DeliveryFilter, Rejection, StandardFilter};
pub use forward::{
    Bridge, BridgeBuilder, Disposition, ForwardPath, IngressDrop, MulticastOutcome,
    MulticastPath, Transmit,
};
pub use frame::{
    Frame, FrameAllocator, FrameMark, FrameMeta, HeapAllocator, IngressStamp, IpMulticastInfo,
};
pub use limiter::{UnknownMulticastLimiter, Verdict};
pub use mcast::{IndexChange, Membership, MembershipUpdate, MembershipView, MulticastGroupIndex};
pub use offload::{
    ForwardDescriptor, HardwareOffloadBridge, HwMulticastEntry, MulticastOffload, NoOffload,
    OffloadDecision,
};
pub use ports::{DeviceHandle, Port, PortDescriptor, PortFlags, PortId, PortMask, PortState};
pub use stats::StatsSnapshot;

pub use sonic_bridge_types::{FlowKey, GroupAddress, MacAddress, VlanId, VlanSet};
