//! Error types for the bridge administrative surface and its collaborators.
//!
//! The data path never returns these: frames are delivered, dropped, or
//! cached, and the outcome is reported as a value. Errors exist only for
//! port/membership administration, configuration loading, and the
//! collaborator traits (egress transmit, hardware table driver).

use crate::ports::PortId;
use thiserror::Error;

/// Bridge administration errors.
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Port not found: {0}")]
    PortNotFound(PortId),

    #[error("Device already attached to bridge: {0}")]
    DuplicateDevice(String),

    #[error("Port table full ({0} ports)")]
    PortTableFull(usize),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for bridge administration.
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Why the egress collaborator refused a frame. Terminal for that delivery.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    #[error("transmit queue full")]
    QueueFull,

    #[error("egress device down")]
    DeviceDown,

    #[error("frame exceeds egress MTU")]
    Oversize,

    #[error("filtered by egress hook")]
    Filtered,

    #[error("transmit failed")]
    Other,
}

/// Errors reported by the hardware multicast table driver.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OffloadError {
    #[error("hardware table busy")]
    Busy,

    #[error("hardware table full")]
    TableFull,

    #[error("operation not supported by hardware")]
    Unsupported,

    #[error("driver error: {0}")]
    Driver(String),
}
