//! Slotted-resource manager.
//!
//! Slots have a fixed identity. Releasing a slot starts a cooldown during
//! which nobody may claim it. Cooldowns are wall-clock time: a snapshot
//! carries the *remaining* cooldown and every receiver re-anchors it on its
//! own clock at receipt.

use crate::ResourceError;
use cohort_messages::{SlotRecord, MAX_SLOTS};
use cohort_types::{PeerId, SlotId};
use std::time::Duration;

/// One slot in the local view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    /// Fixed identity.
    pub id: SlotId,
    /// Peer holding the slot, if any.
    pub owner: Option<PeerId>,
    /// Earliest time the slot may be claimed again.
    pub available_at: Duration,
}

impl Slot {
    /// A free slot available immediately.
    pub fn new(id: SlotId) -> Self {
        Self {
            id,
            owner: None,
            available_at: Duration::ZERO,
        }
    }

    /// Check if the slot can be claimed at `now`.
    pub fn is_acquirable(&self, now: Duration) -> bool {
        self.owner.is_none() && self.available_at <= now
    }

    fn to_record(self, now: Duration) -> SlotRecord {
        let remaining = self.available_at.saturating_sub(now);
        // Round up so a receiver never sees a shorter cooldown than we set
        let remaining_ms = remaining.as_nanos().div_ceil(1_000_000);

        SlotRecord {
            id: self.id.0 as i32,
            owner: self.owner.map_or(SlotRecord::NO_OWNER, |p| p.0 as i32),
            cooldown_remaining_ms: i32::try_from(remaining_ms).unwrap_or(i32::MAX),
            available_at_secs: self.available_at.as_secs_f64(),
        }
    }
}

/// Local view of a slotted resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotTable {
    slots: Vec<Slot>,
}

impl SlotTable {
    /// Create `count` free slots with ids `0..count`.
    pub fn new(count: usize) -> Result<Self, ResourceError> {
        if count > MAX_SLOTS {
            return Err(ResourceError::TooManySlots {
                count,
                max: MAX_SLOTS,
            });
        }
        Ok(Self {
            slots: (0..count as u32).map(|i| Slot::new(SlotId(i))).collect(),
        })
    }

    /// Slots in fixed index order.
    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    /// Look a slot up by id.
    pub fn get(&self, id: SlotId) -> Option<&Slot> {
        self.slots.iter().find(|s| s.id == id)
    }

    /// Number of slots claimable at `now`.
    pub fn available_count(&self, now: Duration) -> usize {
        self.slots.iter().filter(|s| s.is_acquirable(now)).count()
    }

    /// Claim the first slot, in index order, that is free and cooled down.
    ///
    /// Must only run inside a granted critical section.
    pub fn acquire_first_available(&mut self, peer: PeerId, now: Duration) -> Option<SlotId> {
        let slot = self.slots.iter_mut().find(|s| s.is_acquirable(now))?;
        slot.owner = Some(peer);
        Some(slot.id)
    }

    /// Release a held slot and start its cooldown at `now + cooldown`.
    ///
    /// Must only run inside a granted critical section.
    pub fn release(
        &mut self,
        id: SlotId,
        now: Duration,
        cooldown: Duration,
    ) -> Result<(), ResourceError> {
        let slot = self
            .slots
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or(ResourceError::UnknownSlot(id))?;

        if slot.owner.is_none() {
            return Err(ResourceError::SlotNotHeld(id));
        }

        slot.owner = None;
        slot.available_at = now + cooldown;
        Ok(())
    }

    /// Slot array in envelope layout, cooldowns relative to `now`.
    pub fn snapshot(&self, now: Duration) -> [SlotRecord; MAX_SLOTS] {
        let mut records = [SlotRecord::UNUSED; MAX_SLOTS];
        for (record, slot) in records.iter_mut().zip(&self.slots) {
            *record = slot.to_record(now);
        }
        records
    }

    /// Replace the whole view with a peer's snapshot received at `now`.
    ///
    /// Remaining cooldowns become absolute deadlines on the local clock. The
    /// snapshot is checked in full before anything changes.
    pub fn apply_snapshot(
        &mut self,
        records: &[SlotRecord; MAX_SLOTS],
        now: Duration,
    ) -> Result<(), ResourceError> {
        let mut slots = Vec::with_capacity(MAX_SLOTS);

        for (index, record) in records.iter().enumerate() {
            let Some(id) = record.slot_id() else {
                continue;
            };
            if record.owner < SlotRecord::NO_OWNER {
                return Err(ResourceError::InvalidSlotRecord {
                    index,
                    reason: "negative owner",
                });
            }
            let Ok(remaining_ms) = u64::try_from(record.cooldown_remaining_ms) else {
                return Err(ResourceError::InvalidSlotRecord {
                    index,
                    reason: "negative cooldown",
                });
            };

            slots.push(Slot {
                id,
                owner: record.owner_peer(),
                available_at: now + Duration::from_millis(remaining_ms),
            });
        }

        self.slots = slots;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[test]
    fn test_acquire_scans_in_index_order() {
        let mut table = SlotTable::new(3).unwrap();

        assert_eq!(table.acquire_first_available(PeerId(0), secs(0)), Some(SlotId(0)));
        assert_eq!(table.acquire_first_available(PeerId(1), secs(0)), Some(SlotId(1)));
        assert_eq!(table.get(SlotId(1)).unwrap().owner, Some(PeerId(1)));
        assert_eq!(table.available_count(secs(0)), 1);
    }

    #[test]
    fn test_released_slot_cools_down() {
        let mut table = SlotTable::new(1).unwrap();
        let slot = table.acquire_first_available(PeerId(0), secs(10)).unwrap();
        table.release(slot, secs(10), secs(3)).unwrap();

        assert_eq!(table.acquire_first_available(PeerId(1), secs(12)), None);
        assert_eq!(
            table.acquire_first_available(PeerId(1), Duration::from_millis(12_999)),
            None
        );
        assert_eq!(table.acquire_first_available(PeerId(1), secs(13)), Some(slot));
    }

    #[test]
    fn test_none_when_everything_is_taken() {
        let mut table = SlotTable::new(2).unwrap();
        table.acquire_first_available(PeerId(0), secs(0));
        table.acquire_first_available(PeerId(1), secs(0));
        assert_eq!(table.acquire_first_available(PeerId(2), secs(0)), None);
    }

    #[test]
    fn test_release_errors() {
        let mut table = SlotTable::new(2).unwrap();
        assert_eq!(
            table.release(SlotId(0), secs(0), secs(1)),
            Err(ResourceError::SlotNotHeld(SlotId(0)))
        );
        assert_eq!(
            table.release(SlotId(7), secs(0), secs(1)),
            Err(ResourceError::UnknownSlot(SlotId(7)))
        );
    }

    #[test]
    fn test_snapshot_reanchors_cooldown_on_receiver_clock() {
        let mut sender = SlotTable::new(2).unwrap();
        let slot = sender.acquire_first_available(PeerId(0), secs(100)).unwrap();
        sender.release(slot, secs(100), Duration::from_millis(1_500)).unwrap();

        let records = sender.snapshot(secs(100));
        assert_eq!(records[0].cooldown_remaining_ms, 1_500);
        assert_eq!(records[0].owner, SlotRecord::NO_OWNER);
        assert_eq!(records[2], SlotRecord::UNUSED);

        // Receiver's clock is unrelated to the sender's
        let mut receiver = SlotTable::new(2).unwrap();
        receiver.apply_snapshot(&records, secs(5)).unwrap();
        assert_eq!(
            receiver.get(slot).unwrap().available_at,
            Duration::from_millis(6_500)
        );
        assert!(!receiver.get(slot).unwrap().is_acquirable(secs(6)));
        assert!(receiver.get(SlotId(1)).unwrap().is_acquirable(secs(5)));
    }

    #[test]
    fn test_snapshot_replaces_rather_than_merges() {
        let mut sender = SlotTable::new(1).unwrap();
        sender.acquire_first_available(PeerId(3), secs(0));

        let mut receiver = SlotTable::new(4).unwrap();
        receiver.apply_snapshot(&sender.snapshot(secs(0)), secs(0)).unwrap();

        assert_eq!(receiver.slots().len(), 1);
        assert_eq!(receiver.slots()[0].owner, Some(PeerId(3)));
        assert_eq!(receiver.snapshot(secs(0)), sender.snapshot(secs(0)));
    }

    #[test]
    fn test_invalid_snapshot_leaves_view_untouched() {
        let mut table = SlotTable::new(2).unwrap();
        let mut records = table.snapshot(secs(0));
        records[1].cooldown_remaining_ms = -5;

        assert_eq!(
            table.apply_snapshot(&records, secs(0)),
            Err(ResourceError::InvalidSlotRecord {
                index: 1,
                reason: "negative cooldown"
            })
        );
        assert_eq!(table.slots().len(), 2);
    }

    #[test]
    fn test_too_many_slots() {
        assert_eq!(
            SlotTable::new(MAX_SLOTS + 1),
            Err(ResourceError::TooManySlots {
                count: MAX_SLOTS + 1,
                max: MAX_SLOTS
            })
        );
    }
}
