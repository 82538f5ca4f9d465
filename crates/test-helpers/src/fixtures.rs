//! Configuration fixtures and notification analysis.

use cohort_core::Notification;
use cohort_node::{DomainConfig, NodeConfig, WorkflowConfig};
use cohort_resources::{CooldownRange, KindSpec};
use cohort_types::{DomainId, OrderKey, PeerId};
use std::collections::BTreeMap;
use std::time::Duration;

/// One counted domain (id 0) with the given kinds and no workflow.
pub fn counted_config(kinds: &[(&str, u32)]) -> NodeConfig {
    let kinds = kinds
        .iter()
        .map(|(name, capacity)| KindSpec::new(*name, *capacity))
        .collect();
    NodeConfig::new(vec![DomainConfig::counted(DomainId(0), "equipment", kinds)])
}

/// One slotted domain (id 0) with a fixed cooldown and no workflow.
pub fn slotted_config(slots: usize, cooldown: Duration) -> NodeConfig {
    NodeConfig::new(vec![DomainConfig::slotted(
        DomainId(0),
        "bays",
        slots,
        CooldownRange::fixed(cooldown),
    )])
}

/// Counted domain 0 and slotted domain 1, driven by the workflow.
pub fn two_domain_config(
    kinds: &[(&str, u32)],
    slots: usize,
    cooldown: CooldownRange,
) -> NodeConfig {
    let mut config = counted_config(kinds);
    config
        .domains
        .push(DomainConfig::slotted(DomainId(1), "bays", slots, cooldown));
    config.with_workflow(WorkflowConfig {
        counted_domain: DomainId(0),
        slot_domain: Some(DomainId(1)),
    })
}

/// A granted entry as seen in a notification log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GrantRecord {
    pub peer: PeerId,
    pub request: OrderKey,
    pub at: Duration,
}

/// Granted entries per domain, in log order.
pub fn grants_by_domain<'a>(
    log: impl IntoIterator<Item = (PeerId, &'a Notification)>,
) -> BTreeMap<DomainId, Vec<GrantRecord>> {
    let mut grants: BTreeMap<DomainId, Vec<GrantRecord>> = BTreeMap::new();
    for (peer, notification) in log {
        if let Notification::EntryGranted {
            domain,
            request,
            at,
            ..
        } = notification
        {
            grants.entry(*domain).or_default().push(GrantRecord {
                peer,
                request: *request,
                at: *at,
            });
        }
    }
    grants
}
