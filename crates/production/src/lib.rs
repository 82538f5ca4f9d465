//! Production runner for Cohort peers.
//!
//! Runs every peer of a cluster as its own tokio task. Peers talk over a
//! [`PeerChannel`]; the in-process implementation is a mesh of unbounded
//! mpsc channels carrying encoded envelopes.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                    PeerRunner (task)                     │
//! │                                                          │
//! │  receive_any ─► decode ─► EnvelopeReceived ─┐            │
//! │                                             ▼            │
//! │  RandomPacing ─► PacingTick ──────► NodeStateMachine     │
//! │                                             │            │
//! │  broadcast / send ◄─ encode ◄─ Action ◄─────┘            │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! The state machine never sees a socket or a clock: the runner sets the
//! wall-clock time before every event and performs every returned action.

mod channel;
mod config;
mod error;
mod runner;

pub use channel::{mesh, ChannelError, MeshChannel, PeerChannel};
pub use config::ClusterConfig;
pub use error::RunnerError;
pub use runner::{run_cluster, ClusterReport, PeerReport, PeerRunner, PeerStats};
