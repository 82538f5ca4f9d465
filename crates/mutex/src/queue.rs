//! Arbitration queue for one domain.
//!
//! Records every REQUEST and ACK a process has seen for a domain, ordered by
//! `(time, sender)`. Entry into the critical section is decided entirely from
//! this record: queue position for ordering among rivals, ACK count for proof
//! that every peer has seen our request.

use cohort_messages::Intent;
use cohort_types::{LamportTime, OrderKey, PeerId};
use std::collections::BTreeSet;

/// What a queue entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// A peer's request to enter.
    Request(Intent),
    /// A peer's acknowledgement of our request.
    Ack,
}

/// One resident queue entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueEntry {
    /// Ordering key of the envelope the entry came from.
    pub key: OrderKey,
    /// Entry kind.
    pub kind: EntryKind,
}

impl QueueEntry {
    /// Check if this entry is a request of either intent.
    pub fn is_request(&self) -> bool {
        matches!(self.kind, EntryKind::Request(_))
    }

    /// Check if this entry is an acknowledgement.
    pub fn is_ack(&self) -> bool {
        self.kind == EntryKind::Ack
    }
}

/// Ordered record of outstanding requests and acknowledgements.
///
/// Kept sorted on insertion. Entries are never deduplicated by content; they
/// leave the queue only through explicit pruning.
#[derive(Debug, Clone, Default)]
pub struct ArbitrationQueue {
    entries: Vec<QueueEntry>,
}

impl ArbitrationQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry at its ordered position.
    ///
    /// Entries with equal keys keep arrival order.
    pub fn insert(&mut self, entry: QueueEntry) {
        let position = self.entries.partition_point(|e| e.key <= entry.key);
        self.entries.insert(position, entry);
    }

    /// Insert a request.
    pub fn insert_request(&mut self, key: OrderKey, intent: Intent) {
        self.insert(QueueEntry {
            key,
            kind: EntryKind::Request(intent),
        });
    }

    /// Insert an acknowledgement.
    pub fn insert_ack(&mut self, key: OrderKey) {
        self.insert(QueueEntry {
            key,
            kind: EntryKind::Ack,
        });
    }

    /// The resident request of a peer, if any.
    pub fn request_of(&self, peer: PeerId) -> Option<&QueueEntry> {
        self.entries
            .iter()
            .find(|e| e.is_request() && e.key.sender == peer)
    }

    /// The earliest resident request.
    pub fn first_request(&self) -> Option<&QueueEntry> {
        self.entries.iter().find(|e| e.is_request())
    }

    /// Check if the earliest resident request belongs to `local`.
    ///
    /// False when `local` has no resident request.
    pub fn is_first(&self, local: PeerId) -> bool {
        self.first_request()
            .is_some_and(|entry| entry.key.sender == local)
    }

    /// Peers that acknowledged after `after`, excluding `local`.
    pub fn confirmations_after(&self, local: PeerId, after: LamportTime) -> BTreeSet<PeerId> {
        self.entries
            .iter()
            .filter(|e| e.is_ack() && e.key.sender != local && e.key.time > after)
            .map(|e| e.key.sender)
            .collect()
    }

    /// Check if `needed` distinct peers acknowledged `local`'s request with a
    /// later timestamp.
    ///
    /// False when `local` has no resident request.
    pub fn has_all_confirmations(&self, local: PeerId, needed: usize) -> bool {
        match self.request_of(local) {
            Some(own) => self.confirmations_after(local, own.key.time).len() >= needed,
            None => false,
        }
    }

    /// Remove every request (of either intent) belonging to `peer`.
    ///
    /// Returns the number of entries removed.
    pub fn prune_requests_of(&mut self, peer: PeerId) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|e| !(e.is_request() && e.key.sender == peer));
        before - self.entries.len()
    }

    /// Remove every acknowledgement.
    ///
    /// Returns the number of entries removed.
    pub fn prune_acks(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| !e.is_ack());
        before - self.entries.len()
    }

    /// Number of resident requests.
    pub fn request_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_request()).count()
    }

    /// Iterate over resident entries in order.
    pub fn iter(&self) -> impl Iterator<Item = &QueueEntry> {
        self.entries.iter()
    }

    /// Get the number of resident entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
