//! Per-peer node state machine.
//!
//! This crate composes one mutual exclusion engine and one resource view per
//! configured domain with the workflow sequencer into the complete,
//! synchronous state machine of a single peer. Runners feed it events and
//! perform the actions it returns.

mod config;
mod state;
mod workflow;

pub use config::{ConfigError, DomainConfig, NodeConfig, ResourceConfig, WorkflowConfig};
pub use state::{DomainResource, NodeStateMachine, NodeStats};
pub use workflow::{EntryOutcome, WorkflowRequest, WorkflowSequencer, WorkflowState};
