//! Common value types for the SONiC bridge forwarding engine.
//!
//! This crate provides type-safe representations of the primitives the
//! forwarding engine and its collaborators exchange:
//!
//! - [`MacAddress`]: 48-bit Ethernet MAC addresses with multicast classification
//! - [`VlanId`]: IEEE 802.1Q VLAN identifiers
//! - [`VlanSet`]: fixed-size VLAN membership bitmap
//! - [`GroupAddress`]: IPv4/IPv6 multicast group addresses
//! - [`FlowKey`]: (group, source, VLAN) lookup key for multicast state

mod group;
mod mac;
mod vlan;

pub use group::{FlowKey, GroupAddress};
pub use mac::MacAddress;
pub use vlan::{VlanId, VlanSet};

/// Common error type for parsing failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid MAC address format: {0}")]
    InvalidMacAddress(String),

    #[error("invalid multicast group address: {0}")]
    InvalidGroupAddress(String),

    #[error("invalid VLAN ID: {0} (must be 1-4094)")]
    InvalidVlanId(u16),
}
