//! Inbound events.

use cohort_messages::{Envelope, Intent};
use cohort_types::DomainId;

/// Events a peer state machine reacts to.
#[derive(Debug, Clone)]
pub enum Event {
    /// The pacing driver decided it is time for the next protocol round.
    ///
    /// This is the only trigger that makes an idle peer issue a new request.
    PacingTick,

    /// An envelope arrived from another peer.
    EnvelopeReceived {
        /// The decoded envelope.
        envelope: Envelope,
    },

    /// An external caller asks for entry into a domain directly, bypassing
    /// the workflow.
    EntryRequested {
        /// Domain to enter.
        domain: DomainId,
        /// Why.
        intent: Intent,
    },
}

impl Event {
    /// Get a human-readable name for this event type.
    pub fn type_name(&self) -> &'static str {
        match self {
            Event::PacingTick => "PacingTick",
            Event::EnvelopeReceived { .. } => "EnvelopeReceived",
            Event::EntryRequested { .. } => "EntryRequested",
        }
    }
}
