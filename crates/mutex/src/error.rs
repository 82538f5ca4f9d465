//! Error types for the mutual exclusion engine.

use cohort_types::{DomainId, PeerId};
use thiserror::Error;

/// Errors raised by a [`crate::MutexEngine`].
///
/// `NotFree` and `NotGranted` are caller mistakes. The rest describe inbound
/// envelopes that break the protocol; callers drop those envelopes and log.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MutexError {
    /// A request was issued while one is already outstanding.
    #[error("{domain}: request already outstanding")]
    NotFree { domain: DomainId },

    /// `enter` was called without arbitration granting entry.
    #[error("{domain}: entry not granted")]
    NotGranted { domain: DomainId },

    /// An envelope for another domain was routed to this engine.
    #[error("envelope for {actual} routed to engine of {expected}")]
    WrongDomain {
        expected: DomainId,
        actual: DomainId,
    },

    /// An envelope claims to come from the local peer.
    #[error("{domain}: envelope from the local peer")]
    SelfDelivery { domain: DomainId },

    /// A second request arrived while the peer's first is still resident.
    #[error("{domain}: {peer} already has a resident request")]
    DuplicateRequest { domain: DomainId, peer: PeerId },

    /// An acknowledgement arrived while no request of ours is outstanding.
    #[error("{domain}: unexpected ack from {peer}")]
    UnexpectedAck { domain: DomainId, peer: PeerId },
}
