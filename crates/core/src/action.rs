//! Outbound actions and notifications.

use cohort_messages::{Envelope, Intent};
use cohort_types::{DomainId, OrderKey, PeerId, ResourceKind, SlotId};
use std::time::Duration;

/// Actions a peer state machine asks its runner to perform.
#[derive(Debug, Clone)]
pub enum Action {
    /// Send an envelope to every other peer.
    Broadcast {
        /// The envelope to send.
        envelope: Envelope,
    },

    /// Send an envelope to a single peer.
    SendTo {
        /// Destination peer.
        peer: PeerId,
        /// The envelope to send.
        envelope: Envelope,
    },

    /// Report something that happened inside the state machine.
    Notify(Notification),
}

impl Action {
    /// Get a human-readable name for this action type.
    pub fn type_name(&self) -> &'static str {
        match self {
            Action::Broadcast { .. } => "Broadcast",
            Action::SendTo { .. } => "SendTo",
            Action::Notify(_) => "Notify",
        }
    }

    /// The envelope carried by this action, if it sends one.
    pub fn envelope(&self) -> Option<&Envelope> {
        match self {
            Action::Broadcast { envelope } | Action::SendTo { envelope, .. } => Some(envelope),
            Action::Notify(_) => None,
        }
    }
}

/// Observable protocol milestones.
///
/// Runners log these, count them, and check invariants against them. The
/// state machine never depends on anyone consuming them.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// The local peer was granted a domain's critical section.
    EntryGranted {
        /// Granted domain.
        domain: DomainId,
        /// Ordering key of the request that was granted.
        request: OrderKey,
        /// Why the peer entered.
        intent: Intent,
        /// Wall-clock time of the grant.
        at: Duration,
        /// Wall-clock time between issuing the request and the grant.
        waited: Duration,
    },

    /// Counted units were claimed inside a granted entry.
    ResourcesAcquired {
        /// Counted domain.
        domain: DomainId,
        /// Kinds claimed in this entry.
        acquired: Vec<ResourceKind>,
        /// Whether the peer now holds every kind.
        holds_all: bool,
    },

    /// Every held counted unit was returned inside a granted entry.
    ResourcesReturned {
        /// Counted domain.
        domain: DomainId,
        /// Kinds returned.
        returned: Vec<ResourceKind>,
    },

    /// A slot was claimed and immediately released inside a granted entry.
    SlotVisited {
        /// Slotted domain.
        domain: DomainId,
        /// Visited slot.
        slot: SlotId,
        /// Cooldown applied on release.
        cooldown: Duration,
    },

    /// A granted slot entry found no slot available.
    SlotUnavailable {
        /// Slotted domain.
        domain: DomainId,
    },

    /// The workflow finished a full acquire, visit, return cycle.
    WorkflowCycleCompleted {
        /// Number of cycles completed so far.
        cycles: u64,
    },

    /// An inbound envelope violated the protocol and was dropped.
    EnvelopeDropped {
        /// Claimed sender.
        sender: PeerId,
        /// Why it was dropped.
        reason: String,
    },
}
