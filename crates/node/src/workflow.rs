//! Workflow sequencer.
//!
//! Orders a peer's visits to its domains: acquire one unit of every counted
//! kind, visit a slot while holding them, then return everything.
//!
//! ```text
//! NeedResources ──tick──► WaitingResources ──grant(all held)──► HaveResources
//!       ▲                        │ grant(partial)                    │ tick
//!       │                        ▼                                   ▼
//!       │                  NeedResources                          NeedSlot ◄─┐
//!       │                                                            │ tick  │ grant(no slot)
//!       │                                                            ▼       │
//!       │                                                      WaitingSlot ──┘
//!       │                                                            │ grant(visited)
//!       │                                                            ▼
//! WaitingReturn ◄──tick── NeedReturn ◄──────────tick────────── SlotReleased
//! ```
//!
//! Without a slot domain `HaveResources` moves straight to `NeedReturn`. A
//! granted return completes the cycle and goes back to `NeedResources`.

use crate::WorkflowConfig;
use cohort_messages::Intent;
use cohort_types::DomainId;
use std::fmt;

/// Where the sequencer is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowState {
    NeedResources,
    WaitingResources,
    HaveResources,
    NeedSlot,
    WaitingSlot,
    SlotReleased,
    NeedReturn,
    WaitingReturn,
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkflowState::NeedResources => "need-resources",
            WorkflowState::WaitingResources => "waiting-resources",
            WorkflowState::HaveResources => "have-resources",
            WorkflowState::NeedSlot => "need-slot",
            WorkflowState::WaitingSlot => "waiting-slot",
            WorkflowState::SlotReleased => "slot-released",
            WorkflowState::NeedReturn => "need-return",
            WorkflowState::WaitingReturn => "waiting-return",
        };
        f.write_str(name)
    }
}

/// Entry the sequencer wants issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkflowRequest {
    pub domain: DomainId,
    pub intent: Intent,
}

/// What a granted entry achieved, as far as the workflow cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryOutcome {
    /// Counted acquisition; `holds_all` once every kind is held.
    Acquired { holds_all: bool },
    /// Every counted unit was returned.
    Returned,
    /// A slot was visited and released.
    SlotVisited,
    /// No slot qualified.
    SlotUnavailable,
}

/// Per-peer workflow state machine.
#[derive(Debug, Clone)]
pub struct WorkflowSequencer {
    config: WorkflowConfig,
    state: WorkflowState,
    cycles: u64,
}

impl WorkflowSequencer {
    pub fn new(config: WorkflowConfig) -> Self {
        Self {
            config,
            state: WorkflowState::NeedResources,
            cycles: 0,
        }
    }

    pub fn state(&self) -> WorkflowState {
        self.state
    }

    /// Completed acquire-visit-return cycles.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    /// React to a pacing tick.
    ///
    /// Transient states advance by one step. `Need*` states return the entry
    /// to request; the caller confirms with [`Self::request_sent`] once the
    /// engine accepted it, so a refused request is retried on the next tick.
    pub fn on_tick(&mut self) -> Option<WorkflowRequest> {
        match self.state {
            WorkflowState::HaveResources => {
                self.state = match self.config.slot_domain {
                    Some(_) => WorkflowState::NeedSlot,
                    None => WorkflowState::NeedReturn,
                };
                None
            }
            WorkflowState::SlotReleased => {
                self.state = WorkflowState::NeedReturn;
                None
            }
            _ => self.pending_request(),
        }
    }

    /// Entry wanted in the current state, if any.
    pub fn pending_request(&self) -> Option<WorkflowRequest> {
        let (domain, intent) = match self.state {
            WorkflowState::NeedResources => (self.config.counted_domain, Intent::Acquire),
            WorkflowState::NeedSlot => (self.config.slot_domain?, Intent::Acquire),
            WorkflowState::NeedReturn => (self.config.counted_domain, Intent::Return),
            _ => return None,
        };
        Some(WorkflowRequest { domain, intent })
    }

    /// The engine accepted the request returned by [`Self::on_tick`].
    pub fn request_sent(&mut self) {
        self.state = match self.state {
            WorkflowState::NeedResources => WorkflowState::WaitingResources,
            WorkflowState::NeedSlot => WorkflowState::WaitingSlot,
            WorkflowState::NeedReturn => WorkflowState::WaitingReturn,
            other => other,
        };
    }

    /// Check if a grant for `domain` with `intent` belongs to the workflow.
    pub fn is_waiting_for(&self, domain: DomainId, intent: Intent) -> bool {
        match self.state {
            WorkflowState::WaitingResources => {
                domain == self.config.counted_domain && intent == Intent::Acquire
            }
            WorkflowState::WaitingSlot => Some(domain) == self.config.slot_domain,
            WorkflowState::WaitingReturn => {
                domain == self.config.counted_domain && intent == Intent::Return
            }
            _ => false,
        }
    }

    /// Feed back the outcome of a granted workflow entry.
    ///
    /// Returns the new cycle count when the grant completed a cycle.
    pub fn on_outcome(&mut self, outcome: EntryOutcome) -> Option<u64> {
        match (self.state, outcome) {
            (WorkflowState::WaitingResources, EntryOutcome::Acquired { holds_all }) => {
                self.state = if holds_all {
                    WorkflowState::HaveResources
                } else {
                    WorkflowState::NeedResources
                };
                None
            }
            (WorkflowState::WaitingSlot, EntryOutcome::SlotVisited) => {
                self.state = WorkflowState::SlotReleased;
                None
            }
            (WorkflowState::WaitingSlot, EntryOutcome::SlotUnavailable) => {
                self.state = WorkflowState::NeedSlot;
                None
            }
            (WorkflowState::WaitingReturn, EntryOutcome::Returned) => {
                self.state = WorkflowState::NeedResources;
                self.cycles += 1;
                Some(self.cycles)
            }
            _ => None,
        }
    }
}
