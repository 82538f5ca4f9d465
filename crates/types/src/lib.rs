//! Core types shared by every Cohort crate.
//!
//! Everything here is plain data: identifiers for peers, arbitration domains,
//! resource kinds and slots, the Lamport timestamp, and the peer topology
//! that tells a process who else takes part in the run.

mod identifiers;
mod topology;

pub use identifiers::{DomainId, LamportTime, OrderKey, PeerId, ResourceKind, SlotId};
pub use topology::{PeerTopology, StaticTopology, TopologyError};
