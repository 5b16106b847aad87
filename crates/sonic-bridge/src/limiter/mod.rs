//! UnknownMulticastLimiter - storm control for unregistered groups.
//!
//! Multicast flows with no snooped membership are flooded. This limiter
//! tracks a handful of such flows and blocks any that exceed a packet
//! ceiling within one window. The table lock is held only for the
//! lookup and update, never across a fanout.

#[allow(clippy::module_inception)]
mod limiter;
mod types;

pub use limiter::UnknownMulticastLimiter;
pub use types::{LimiterKey, UnknownFlowRecord, Verdict};
