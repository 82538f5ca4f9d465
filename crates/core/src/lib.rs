//! Core types for Cohort peers.
//!
//! A peer is a synchronous state machine: it consumes [`Event`]s and returns
//! [`Action`]s. The runner owns every side effect (sending envelopes, pacing,
//! collecting notifications), which keeps the protocol deterministic and lets
//! the same state machine run under the simulator and under tokio.

mod action;
mod driver;
mod event;
mod traits;

pub use action::{Action, Notification};
pub use driver::{DriverAction, PacingDriver, RandomPacing};
pub use event::Event;
pub use traits::StateMachine;
