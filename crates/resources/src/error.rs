//! Error types for resource managers.

use cohort_types::{ResourceKind, SlotId};
use thiserror::Error;

/// Errors from building, mutating or replacing a resource view.
///
/// Exhaustion is not an error: a partial counted acquisition and a missing
/// slot are ordinary outcomes that the workflow retries.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResourceError {
    #[error("{count} resource kinds exceed the wire limit of {max}")]
    TooManyKinds { count: usize, max: usize },

    #[error("resource kind {0:?} declared twice")]
    DuplicateKind(String),

    #[error("capacity {capacity} of {name:?} does not fit the wire format")]
    CapacityTooLarge { name: String, capacity: u32 },

    #[error("{count} slots exceed the wire limit of {max}")]
    TooManySlots { count: usize, max: usize },

    #[error("snapshot count {count} for {kind} outside 0..={capacity}")]
    InvalidCount {
        kind: ResourceKind,
        count: i32,
        capacity: u32,
    },

    #[error("snapshot slot record {index} is invalid: {reason}")]
    InvalidSlotRecord { index: usize, reason: &'static str },

    #[error("unknown slot {0}")]
    UnknownSlot(SlotId),

    #[error("{0} is not held")]
    SlotNotHeld(SlotId),

    #[error("cooldown range {min_ms}ms..={max_ms}ms is empty")]
    InvalidCooldown { min_ms: u64, max_ms: u64 },
}
