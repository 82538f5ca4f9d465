//! Per-domain mutual exclusion engine.

use crate::{ArbitrationQueue, LogicalTime, MutexError};
use cohort_messages::{Envelope, Intent, MessageKind, Payload};
use cohort_types::{DomainId, OrderKey, PeerId, PeerTopology};
use tracing::{debug, trace};

/// Engine state. There is no terminal state: a domain cycles forever.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutexState {
    /// No request outstanding.
    Free,
    /// Our request is broadcast and waiting for arbitration.
    Waiting,
}

/// Our outstanding request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingRequest {
    /// Ordering key the request was stamped with.
    pub key: OrderKey,
    /// Why we asked.
    pub intent: Intent,
}

/// An envelope addressed to a single peer.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    /// Destination peer.
    pub to: PeerId,
    /// The envelope to send.
    pub envelope: Envelope,
}

/// Outcome of a granted entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Grant {
    /// Ordering key of the request that was granted.
    pub request: OrderKey,
    /// Why we entered.
    pub intent: Intent,
    /// RELEASE envelope to broadcast, carrying the snapshot.
    pub release: Envelope,
}

/// Mutual exclusion state machine for one domain.
///
/// The engine borrows the process's [`LogicalTime`] on every call rather than
/// owning a clock, so that all domains of a process share one clock object
/// while keeping independent counters.
pub struct MutexEngine {
    /// Domain this engine arbitrates.
    domain: DomainId,

    /// Local peer.
    local: PeerId,

    /// ACKs required before entry (peer count - 1).
    confirmations_needed: usize,

    /// Current state.
    state: MutexState,

    /// Resident requests and acknowledgements.
    queue: ArbitrationQueue,

    /// Our outstanding request, present exactly while `Waiting`.
    pending: Option<PendingRequest>,

    /// Number of entries granted so far.
    grants: u64,
}

impl MutexEngine {
    /// Create an engine for `domain`.
    pub fn new(domain: DomainId, topology: &dyn PeerTopology) -> Self {
        Self {
            domain,
            local: topology.local_peer(),
            confirmations_needed: topology.confirmations_needed(),
            state: MutexState::Free,
            queue: ArbitrationQueue::new(),
            pending: None,
            grants: 0,
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Accessors
    // ═══════════════════════════════════════════════════════════════════════════

    /// Domain this engine arbitrates.
    pub fn domain(&self) -> DomainId {
        self.domain
    }

    /// Current state.
    pub fn state(&self) -> MutexState {
        self.state
    }

    /// Our outstanding request, if any.
    pub fn pending(&self) -> Option<PendingRequest> {
        self.pending
    }

    /// The arbitration queue.
    pub fn queue(&self) -> &ArbitrationQueue {
        &self.queue
    }

    /// Number of entries granted so far.
    pub fn grants(&self) -> u64 {
        self.grants
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Protocol
    // ═══════════════════════════════════════════════════════════════════════════

    /// Ask to enter the critical section.
    ///
    /// Only allowed from `Free`. Our own request goes straight into the local
    /// queue; the returned envelope must be broadcast to every other peer.
    pub fn request_entry(
        &mut self,
        clock: &mut LogicalTime,
        intent: Intent,
    ) -> Result<Envelope, MutexError> {
        if self.state != MutexState::Free {
            return Err(MutexError::NotFree {
                domain: self.domain,
            });
        }

        let time = clock.tick(self.domain);
        let key = OrderKey::new(time, self.local);
        self.queue.insert_request(key, intent);
        self.pending = Some(PendingRequest { key, intent });
        self.state = MutexState::Waiting;

        debug!(
            domain = self.domain.0,
            time = time.0,
            %intent,
            "Requesting entry"
        );

        Ok(Envelope::request(self.domain, intent, time, self.local))
    }

    /// Process an inbound envelope.
    ///
    /// Returns the ACK to send when the envelope is a request. Errors mean the
    /// envelope broke the protocol and left the engine untouched.
    pub fn on_envelope(
        &mut self,
        clock: &mut LogicalTime,
        envelope: &Envelope,
    ) -> Result<Option<Reply>, MutexError> {
        if envelope.domain != self.domain {
            return Err(MutexError::WrongDomain {
                expected: self.domain,
                actual: envelope.domain,
            });
        }
        if envelope.sender == self.local {
            return Err(MutexError::SelfDelivery {
                domain: self.domain,
            });
        }

        let sender = envelope.sender;
        match envelope.kind {
            MessageKind::Request(intent) => {
                if self.queue.request_of(sender).is_some() {
                    return Err(MutexError::DuplicateRequest {
                        domain: self.domain,
                        peer: sender,
                    });
                }

                self.queue.insert_request(envelope.order_key(), intent);
                let now = clock.observe(self.domain, envelope.time);

                trace!(
                    domain = self.domain.0,
                    peer = sender.0,
                    request_time = envelope.time.0,
                    ack_time = now.0,
                    "Acknowledging request"
                );

                Ok(Some(Reply {
                    to: sender,
                    envelope: Envelope::ack(self.domain, now, self.local),
                }))
            }
            MessageKind::Ack => {
                if self.pending.is_none() {
                    return Err(MutexError::UnexpectedAck {
                        domain: self.domain,
                        peer: sender,
                    });
                }

                self.queue.insert_ack(envelope.order_key());
                clock.observe(self.domain, envelope.time);
                Ok(None)
            }
            MessageKind::Release => {
                clock.observe(self.domain, envelope.time);
                let pruned = self.queue.prune_requests_of(sender);

                trace!(
                    domain = self.domain.0,
                    peer = sender.0,
                    pruned,
                    "Peer released"
                );

                Ok(None)
            }
        }
    }

    /// Check if our request is the earliest resident request.
    pub fn is_first(&self) -> bool {
        self.queue.is_first(self.local)
    }

    /// Check if every other peer acknowledged our request.
    pub fn has_all_confirmations(&self) -> bool {
        self.queue
            .has_all_confirmations(self.local, self.confirmations_needed)
    }

    /// Check if arbitration grants us entry.
    pub fn can_enter(&self) -> bool {
        self.state == MutexState::Waiting && self.is_first() && self.has_all_confirmations()
    }

    /// Enter the critical section.
    ///
    /// Runs `section` with the intent of the granted request; `section` does
    /// the domain's work and returns the resulting resource snapshot. The
    /// engine then drops its acknowledgements and request and returns the
    /// RELEASE to broadcast.
    pub fn enter<F>(&mut self, clock: &mut LogicalTime, section: F) -> Result<Grant, MutexError>
    where
        F: FnOnce(Intent) -> Payload,
    {
        if !self.can_enter() {
            return Err(MutexError::NotGranted {
                domain: self.domain,
            });
        }
        let Some(pending) = self.pending.take() else {
            return Err(MutexError::NotGranted {
                domain: self.domain,
            });
        };

        let payload = section(pending.intent);

        self.queue.prune_acks();
        self.queue.prune_requests_of(self.local);
        let time = clock.tick(self.domain);
        self.state = MutexState::Free;
        self.grants += 1;

        debug!(
            domain = self.domain.0,
            request = %pending.key,
            release_time = time.0,
            "Entry granted"
        );

        Ok(Grant {
            request: pending.key,
            intent: pending.intent,
            release: Envelope::release(self.domain, time, self.local, payload),
        })
    }
}
