//! Runtime invariant checking.
//!
//! The checker watches the notification stream of a simulation, one event at
//! a time, and compares it with the state of every node right after that
//! event. Three properties are checked:
//!
//! - **Grant order**: per domain, granted request keys strictly increase.
//!   Entries are instantaneous, so this also rules out two holders at once.
//! - **Conservation**: after every counted entry, the grantee's free counts
//!   plus the units every peer holds equal the capacity of each kind.
//! - **Cooldown**: a slot is never visited before the previous visit's
//!   cooldown has run out.

use cohort_core::Notification;
use cohort_node::NodeStateMachine;
use cohort_simulation::NotificationRecord;
use cohort_types::{DomainId, OrderKey, PeerId, ResourceKind, SlotId};
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;
use tracing::error;

/// A broken invariant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Violation {
    #[error("{domain}: {granted} granted after {previous}")]
    GrantOrder {
        domain: DomainId,
        previous: OrderKey,
        granted: OrderKey,
    },

    #[error("{domain}/{kind}: {free} free + {held} held != capacity {capacity} at {peer}")]
    Conservation {
        domain: DomainId,
        kind: ResourceKind,
        peer: PeerId,
        free: u32,
        held: u32,
        capacity: u32,
    },

    #[error("{domain}/{slot}: visited at {at:?} before cooldown ended at {available_at:?}")]
    Cooldown {
        domain: DomainId,
        slot: SlotId,
        at: Duration,
        available_at: Duration,
    },
}

/// Checks protocol invariants event by event.
#[derive(Debug, Default)]
pub struct InvariantChecker {
    /// Last granted request per domain.
    last_grant: BTreeMap<DomainId, OrderKey>,

    /// When each visited slot becomes available again.
    slot_deadlines: BTreeMap<(DomainId, SlotId), Duration>,

    violations: Vec<Violation>,

    /// Number of individual checks performed.
    checks: u64,
}

impl InvariantChecker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Violations found so far.
    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    /// Number of individual checks performed.
    pub fn checks(&self) -> u64 {
        self.checks
    }

    /// Check one notification against the node states right after the event
    /// that raised it.
    pub fn observe(&mut self, record: &NotificationRecord, nodes: &[NodeStateMachine]) {
        match &record.notification {
            Notification::EntryGranted {
                domain, request, ..
            } => self.check_grant_order(*domain, *request),
            Notification::ResourcesAcquired { domain, .. }
            | Notification::ResourcesReturned { domain, .. } => {
                self.check_conservation(*domain, record.peer, nodes)
            }
            Notification::SlotVisited {
                domain,
                slot,
                cooldown,
            } => self.check_cooldown(*domain, *slot, record.at, *cooldown),
            _ => {}
        }
    }

    fn record(&mut self, violation: Violation) {
        error!(%violation, "Invariant violated");
        self.violations.push(violation);
    }

    fn check_grant_order(&mut self, domain: DomainId, granted: OrderKey) {
        self.checks += 1;
        if let Some(&previous) = self.last_grant.get(&domain) {
            if granted <= previous {
                self.record(Violation::GrantOrder {
                    domain,
                    previous,
                    granted,
                });
            }
        }
        self.last_grant.insert(domain, granted);
    }

    fn check_conservation(
        &mut self,
        domain: DomainId,
        grantee: PeerId,
        nodes: &[NodeStateMachine],
    ) {
        let Some(pool) = nodes
            .get(grantee.index())
            .and_then(|n| n.counted_pool(domain))
        else {
            return;
        };

        let mut found = Vec::new();
        for kind in pool.kinds() {
            self.checks += 1;
            let (Some(free), Some(capacity)) = (pool.free(kind), pool.capacity(kind)) else {
                continue;
            };
            let held = nodes
                .iter()
                .filter(|n| n.counted_pool(domain).is_some_and(|p| p.holds(kind)))
                .count() as u32;
            if free + held != capacity {
                found.push(Violation::Conservation {
                    domain,
                    kind,
                    peer: grantee,
                    free,
                    held,
                    capacity,
                });
            }
        }
        for violation in found {
            self.record(violation);
        }
    }

    fn check_cooldown(
        &mut self,
        domain: DomainId,
        slot: SlotId,
        at: Duration,
        cooldown: Duration,
    ) {
        self.checks += 1;
        if let Some(&available_at) = self.slot_deadlines.get(&(domain, slot)) {
            if at < available_at {
                self.record(Violation::Cooldown {
                    domain,
                    slot,
                    at,
                    available_at,
                });
            }
        }
        self.slot_deadlines.insert((domain, slot), at + cooldown);
    }
}
