//! Lamport-clock mutual exclusion.
//!
//! This crate provides the permission-based mutual exclusion primitive every
//! resource manager is built on. It is synchronous and performs no I/O: the
//! engine consumes envelopes and hands back the envelopes to send.
//!
//! # Protocol
//!
//! For each domain, independently:
//!
//! - `request_entry` → tick the domain clock, queue our own REQUEST, broadcast it
//! - REQUEST from q → queue it, observe the clock, reply with an ACK to q
//! - ACK → queue it, observe the clock
//! - RELEASE from q → observe the clock, drop q's requests
//! - `can_enter` → our REQUEST is first by `(time, sender)` **and** every other
//!   peer has acknowledged it with a later timestamp
//! - `enter` → run the critical section, drop our ACKs and request, broadcast
//!   a RELEASE carrying the resource snapshot
//!
//! ACKs are never withheld. Fairness comes from ordering alone.

mod clock;
mod engine;
mod error;
mod queue;

pub use clock::LogicalTime;
pub use engine::{Grant, MutexEngine, MutexState, PendingRequest, Reply};
pub use error::MutexError;
pub use queue::{ArbitrationQueue, EntryKind, QueueEntry};
