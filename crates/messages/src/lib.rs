//! Network messages for the mutual-exclusion protocol.
//!
//! Every message between peers is an [`Envelope`]: a domain, a kind
//! (REQUEST, ACK or RELEASE), the sender's Lamport time for that domain, the
//! sender, and a fixed-shape [`Payload`] holding the resource snapshot.
//!
//! The [`wire`] module lays an envelope out as a fixed-size byte blob so that
//! every message, whatever its kind, has the same length on the wire.

mod envelope;
mod payload;
pub mod wire;

pub use envelope::{Envelope, Intent, MessageKind};
pub use payload::{Payload, SlotRecord, MAX_RESOURCE_KINDS, MAX_SLOTS};
pub use wire::{decode_envelope, encode_envelope, WireError, ENVELOPE_SIZE};
