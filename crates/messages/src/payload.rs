//! Fixed-shape resource snapshot carried by every envelope.

use cohort_types::{PeerId, SlotId};

/// Number of counted resource kinds an envelope can describe.
pub const MAX_RESOURCE_KINDS: usize = 4;

/// Number of slot records an envelope can describe.
pub const MAX_SLOTS: usize = 8;

/// One slot as it travels on the wire.
///
/// `cooldown_remaining_ms` is relative to the moment the sender built the
/// snapshot; receivers turn it back into an absolute deadline on their own
/// clock. `available_at_secs` is the sender's absolute deadline and is only
/// meaningful to the sender.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlotRecord {
    /// Slot identity, or [`SlotRecord::UNUSED_ID`] for padding.
    pub id: i32,
    /// Owning peer, or [`SlotRecord::NO_OWNER`].
    pub owner: i32,
    /// Milliseconds of cooldown left when the snapshot was taken.
    pub cooldown_remaining_ms: i32,
    /// Sender-local deadline, in seconds.
    pub available_at_secs: f64,
}

impl SlotRecord {
    /// Id marking a padding record.
    pub const UNUSED_ID: i32 = -1;

    /// Owner value of a free slot.
    pub const NO_OWNER: i32 = -1;

    /// Padding record filling the unused tail of the slot array.
    pub const UNUSED: Self = Self {
        id: Self::UNUSED_ID,
        owner: Self::NO_OWNER,
        cooldown_remaining_ms: 0,
        available_at_secs: 0.0,
    };

    /// Whether this record describes a real slot.
    pub fn is_used(&self) -> bool {
        self.id >= 0
    }

    /// Slot identity, if this record is not padding.
    pub fn slot_id(&self) -> Option<SlotId> {
        u32::try_from(self.id).ok().map(SlotId)
    }

    /// Owning peer, if any.
    pub fn owner_peer(&self) -> Option<PeerId> {
        u32::try_from(self.owner).ok().map(PeerId)
    }
}

impl Default for SlotRecord {
    fn default() -> Self {
        Self::UNUSED
    }
}

/// Resource snapshot embedded in every envelope.
///
/// Counted domains fill `counts` with the free units per kind; slotted
/// domains fill `slots`. The unused half stays zeroed or padded so that the
/// envelope keeps its fixed size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Payload {
    /// Free units per counted kind, indexed by kind.
    pub counts: [i32; MAX_RESOURCE_KINDS],
    /// Slot records in fixed index order.
    pub slots: [SlotRecord; MAX_SLOTS],
}

impl Payload {
    /// Payload with no counts and only padding slots.
    pub fn empty() -> Self {
        Self {
            counts: [0; MAX_RESOURCE_KINDS],
            slots: [SlotRecord::UNUSED; MAX_SLOTS],
        }
    }

    /// Payload carrying counted-pool free counts.
    pub fn with_counts(counts: [i32; MAX_RESOURCE_KINDS]) -> Self {
        Self {
            counts,
            ..Self::empty()
        }
    }

    /// Payload carrying a slot array.
    pub fn with_slots(slots: [SlotRecord; MAX_SLOTS]) -> Self {
        Self {
            slots,
            ..Self::empty()
        }
    }

    /// Iterate over the non-padding slot records.
    pub fn used_slots(&self) -> impl Iterator<Item = &SlotRecord> {
        self.slots.iter().filter(|s| s.is_used())
    }
}

impl Default for Payload {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_payload_has_only_padding() {
        let payload = Payload::empty();
        assert_eq!(payload.counts, [0; MAX_RESOURCE_KINDS]);
        assert_eq!(payload.used_slots().count(), 0);
    }

    #[test]
    fn test_slot_record_owner() {
        let mut record = SlotRecord {
            id: 3,
            ..SlotRecord::UNUSED
        };
        assert_eq!(record.slot_id(), Some(SlotId(3)));
        assert_eq!(record.owner_peer(), None);

        record.owner = 2;
        assert_eq!(record.owner_peer(), Some(PeerId(2)));
        assert_eq!(SlotRecord::UNUSED.slot_id(), None);
    }
}
