//! MulticastGroupIndex - snooped group membership.
//!
//! Fed by the IGMP/MLD snooping collaborator and read by the multicast
//! flood path. The index never expires entries on its own.

mod index;
mod types;

pub use index::MulticastGroupIndex;
pub use types::{GroupEntry, IndexChange, Membership, MembershipUpdate, MembershipView};
