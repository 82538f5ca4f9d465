//! Domain-specific identifier types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Peer identifier.
///
/// Unique per process and stable for the lifetime of a run. Peers are
/// numbered densely from zero, so the id doubles as an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(pub u32);

impl PeerId {
    /// Get the peer id as an index into per-peer arrays.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Peer({})", self.0)
    }
}

/// Arbitration domain identifier.
///
/// Each domain is clocked, queued and granted independently of every other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DomainId(pub u32);

impl fmt::Display for DomainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Domain({})", self.0)
    }
}

/// Lamport timestamp for a single domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LamportTime(pub u32);

impl LamportTime {
    /// The time every domain clock starts at.
    pub const ZERO: Self = LamportTime(0);

    /// Get the next timestamp.
    pub fn next(self) -> Self {
        LamportTime(self.0.saturating_add(1))
    }
}

impl fmt::Display for LamportTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}", self.0)
    }
}

/// Arbitration ordering key: `(time, sender)`.
///
/// Ties on time are broken by peer id, which makes the order total across
/// every request a domain can see.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OrderKey {
    /// Lamport time of the message.
    pub time: LamportTime,
    /// Peer that stamped the message.
    pub sender: PeerId,
}

impl OrderKey {
    /// Create a new ordering key.
    pub fn new(time: LamportTime, sender: PeerId) -> Self {
        Self { time, sender }
    }
}

impl fmt::Display for OrderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.time, self.sender)
    }
}

/// Index of a counted resource kind within its pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceKind(pub u8);

impl ResourceKind {
    /// Get the kind as an index into per-kind arrays.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Kind({})", self.0)
    }
}

/// Fixed identity of a slot in a slotted resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SlotId(pub u32);

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Slot({})", self.0)
    }
}
