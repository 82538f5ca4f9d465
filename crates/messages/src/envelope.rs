//! The envelope: the single wire unit exchanged between peers.

use crate::Payload;
use cohort_types::{DomainId, LamportTime, OrderKey, PeerId};
use std::fmt;

/// Why a peer wants into a domain's critical section.
///
/// A multi-purpose domain (the counted pool) is entered both to take units
/// and to hand them back; the two requests are siblings and a RELEASE ends
/// whichever one the releasing peer had outstanding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Intent {
    /// Enter to claim resources.
    Acquire,
    /// Enter to give resources back.
    Return,
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Intent::Acquire => write!(f, "acquire"),
            Intent::Return => write!(f, "return"),
        }
    }
}

/// Envelope kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Request to enter the domain's critical section.
    Request(Intent),
    /// Acknowledgement of a peer's request, addressed to that peer only.
    Ack,
    /// Exit from the critical section, carrying the authoritative snapshot.
    Release,
}

impl MessageKind {
    /// Get a human-readable name for this kind.
    pub fn type_name(&self) -> &'static str {
        match self {
            MessageKind::Request(Intent::Acquire) => "request",
            MessageKind::Request(Intent::Return) => "request.return",
            MessageKind::Ack => "ack",
            MessageKind::Release => "release",
        }
    }

    /// Check if this is a request of either intent.
    pub fn is_request(&self) -> bool {
        matches!(self, MessageKind::Request(_))
    }
}

/// A protocol message.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// Domain this message arbitrates.
    pub domain: DomainId,
    /// What the message is.
    pub kind: MessageKind,
    /// Sender's Lamport time for `domain` when the message was stamped.
    pub time: LamportTime,
    /// Sending peer.
    pub sender: PeerId,
    /// Resource snapshot. Only RELEASE gives it meaning, but every envelope
    /// carries the full shape.
    pub payload: Payload,
}

impl Envelope {
    /// Create a request envelope.
    pub fn request(domain: DomainId, intent: Intent, time: LamportTime, sender: PeerId) -> Self {
        Self {
            domain,
            kind: MessageKind::Request(intent),
            time,
            sender,
            payload: Payload::empty(),
        }
    }

    /// Create an acknowledgement envelope.
    pub fn ack(domain: DomainId, time: LamportTime, sender: PeerId) -> Self {
        Self {
            domain,
            kind: MessageKind::Ack,
            time,
            sender,
            payload: Payload::empty(),
        }
    }

    /// Create a release envelope carrying a snapshot.
    pub fn release(domain: DomainId, time: LamportTime, sender: PeerId, payload: Payload) -> Self {
        Self {
            domain,
            kind: MessageKind::Release,
            time,
            sender,
            payload,
        }
    }

    /// Arbitration ordering key of this message.
    pub fn order_key(&self) -> OrderKey {
        OrderKey::new(self.time, self.sender)
    }
}

impl fmt::Display for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} from {} at {}",
            self.domain,
            self.kind.type_name(),
            self.sender,
            self.time
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors_set_kind() {
        let request = Envelope::request(DomainId(0), Intent::Return, LamportTime(3), PeerId(1));
        assert_eq!(request.kind, MessageKind::Request(Intent::Return));
        assert!(request.kind.is_request());
        assert_eq!(request.order_key(), OrderKey::new(LamportTime(3), PeerId(1)));

        let ack = Envelope::ack(DomainId(0), LamportTime(4), PeerId(2));
        assert!(!ack.kind.is_request());
        assert_eq!(ack.kind.type_name(), "ack");
    }

    #[test]
    fn test_display() {
        let release = Envelope::release(DomainId(1), LamportTime(7), PeerId(0), Payload::empty());
        assert_eq!(release.to_string(), "Domain(1) release from Peer(0) at T7");
    }
}
