//! Event queue ordering.

use bytes::Bytes;
use cohort_messages::Intent;
use cohort_types::{DomainId, PeerId};
use std::time::Duration;

/// Processing priority of events scheduled for the same instant.
///
/// Deliveries go first so a peer sees everything that has arrived before it
/// acts on its own initiative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EventPriority {
    Delivery = 0,
    Request = 1,
    Pacing = 2,
}

/// Key for ordering events in the simulation queue.
///
/// Fields compare in declaration order: time, then priority, then the
/// receiving node, then insertion sequence. The sequence keeps two envelopes
/// scheduled on the same link for the same instant in send order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventKey {
    /// When the event fires.
    pub time: Duration,
    pub priority: EventPriority,
    /// Node the event is for.
    pub node: PeerId,
    /// Monotonic insertion counter.
    pub sequence: u64,
}

/// Something scheduled for one node.
#[derive(Debug, Clone)]
pub enum SimEvent {
    /// Wire bytes arriving from `from`.
    Deliver { from: PeerId, bytes: Bytes },
    /// An external entry request.
    EntryRequested { domain: DomainId, intent: Intent },
    /// The node's pacing driver wakes up.
    Pacing,
}

impl SimEvent {
    /// Priority this event is scheduled with.
    pub fn priority(&self) -> EventPriority {
        match self {
            SimEvent::Deliver { .. } => EventPriority::Delivery,
            SimEvent::EntryRequested { .. } => EventPriority::Request,
            SimEvent::Pacing => EventPriority::Pacing,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_event_key_ordering() {
        let key = |ms, priority, node, sequence| EventKey {
            time: Duration::from_millis(ms),
            priority,
            node: PeerId(node),
            sequence,
        };

        let mut queue = BTreeMap::new();
        queue.insert(key(5, EventPriority::Pacing, 0, 0), "late");
        queue.insert(key(1, EventPriority::Pacing, 0, 1), "tick");
        queue.insert(key(1, EventPriority::Delivery, 2, 3), "deliver-2b");
        queue.insert(key(1, EventPriority::Delivery, 2, 2), "deliver-2a");
        queue.insert(key(1, EventPriority::Delivery, 1, 4), "deliver-1");

        let order: Vec<_> = queue.into_values().collect();
        assert_eq!(
            order,
            vec!["deliver-1", "deliver-2a", "deliver-2b", "tick", "late"]
        );
    }
}
