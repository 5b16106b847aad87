//! ForwardingFacade - the bridge's public entry points.
//!
//! [`Bridge`] ties the port table, delivery filter, fanout engine, group
//! index, limiter and hardware adapter together behind the ingress,
//! egress, snooping and administrative interfaces.

mod bridge;
mod types;

pub use bridge::{Bridge, BridgeBuilder};
pub use types::{
    Disposition, ForwardPath, IngressDrop, MulticastOutcome, MulticastPath, Transmit,
};
