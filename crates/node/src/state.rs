//! Node state machine.

use crate::workflow::{EntryOutcome, WorkflowSequencer};
use crate::{ConfigError, NodeConfig, ResourceConfig};
use cohort_core::{Action, Event, Notification, StateMachine};
use cohort_messages::{Envelope, Intent, MessageKind, Payload};
use cohort_mutex::{LogicalTime, MutexEngine, MutexError};
use cohort_resources::{CooldownRange, CountedPool, ResourceError, SlotTable};
use cohort_types::{DomainId, OrderKey, PeerId, PeerTopology};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, trace, warn};

/// Why an inbound envelope was dropped.
#[derive(Debug, Error)]
enum Rejection {
    #[error("unknown sender {0}")]
    UnknownSender(PeerId),

    #[error("unknown {0}")]
    UnknownDomain(DomainId),

    #[error(transparent)]
    Protocol(#[from] MutexError),

    #[error("invalid snapshot: {0}")]
    Snapshot(#[from] ResourceError),
}

/// Resource view guarded by one domain.
#[derive(Debug, Clone)]
pub enum DomainResource {
    /// Counted units of several kinds.
    Counted(CountedPool),
    /// Slots plus the range release cooldowns are drawn from.
    Slotted {
        table: SlotTable,
        cooldown: CooldownRange,
    },
}

impl DomainResource {
    fn from_config(config: &ResourceConfig) -> Result<Self, ResourceError> {
        Ok(match config {
            ResourceConfig::Counted { kinds } => DomainResource::Counted(CountedPool::new(kinds)?),
            ResourceConfig::Slotted { slots, cooldown } => DomainResource::Slotted {
                table: SlotTable::new(*slots)?,
                cooldown: *cooldown,
            },
        })
    }

    pub fn as_counted(&self) -> Option<&CountedPool> {
        match self {
            DomainResource::Counted(pool) => Some(pool),
            DomainResource::Slotted { .. } => None,
        }
    }

    pub fn as_slotted(&self) -> Option<&SlotTable> {
        match self {
            DomainResource::Counted(_) => None,
            DomainResource::Slotted { table, .. } => Some(table),
        }
    }

    /// Replace the view with the snapshot of a peer's RELEASE received at `now`.
    pub fn apply_snapshot(
        &mut self,
        payload: &Payload,
        now: Duration,
    ) -> Result<(), ResourceError> {
        match self {
            DomainResource::Counted(pool) => pool.apply_snapshot(&payload.counts),
            DomainResource::Slotted { table, .. } => table.apply_snapshot(&payload.slots, now),
        }
    }

    /// The domain's critical section.
    ///
    /// Counted domains claim or return units depending on `intent`. Slotted
    /// domains visit the first available slot and release it at once with a
    /// freshly drawn cooldown.
    fn run_section(
        &mut self,
        domain: DomainId,
        intent: Intent,
        local: PeerId,
        now: Duration,
        rng: &mut impl Rng,
    ) -> (Payload, EntryOutcome, Notification) {
        match self {
            DomainResource::Counted(pool) => {
                let notification = match intent {
                    Intent::Acquire => Notification::ResourcesAcquired {
                        domain,
                        acquired: pool.acquire_if_available(),
                        holds_all: pool.holds_all(),
                    },
                    Intent::Return => Notification::ResourcesReturned {
                        domain,
                        returned: pool.release_all(),
                    },
                };
                let outcome = match &notification {
                    Notification::ResourcesAcquired { holds_all, .. } => EntryOutcome::Acquired {
                        holds_all: *holds_all,
                    },
                    _ => EntryOutcome::Returned,
                };
                (Payload::with_counts(pool.snapshot()), outcome, notification)
            }
            DomainResource::Slotted { table, cooldown } => {
                let (outcome, notification) = match table.acquire_first_available(local, now) {
                    Some(slot) => {
                        let cooldown = cooldown.sample(rng);
                        if let Err(e) = table.release(slot, now, cooldown) {
                            warn!(
                                domain = domain.0,
                                %slot,
                                error = %e,
                                "Failed to release visited slot"
                            );
                        }
                        (
                            EntryOutcome::SlotVisited,
                            Notification::SlotVisited {
                                domain,
                                slot,
                                cooldown,
                            },
                        )
                    }
                    None => (
                        EntryOutcome::SlotUnavailable,
                        Notification::SlotUnavailable { domain },
                    ),
                };
                (Payload::with_slots(table.snapshot(now)), outcome, notification)
            }
        }
    }
}

/// One arbitration domain of the node.
struct DomainState {
    name: String,
    engine: MutexEngine,
    resource: DomainResource,
    /// Ordering key of the RELEASE whose snapshot the view holds.
    snapshot_key: Option<OrderKey>,
    /// Wall-clock time our outstanding request was issued.
    requested_at: Duration,
}

/// Counters kept by a node over its lifetime.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeStats {
    /// Requests broadcast.
    pub requests_sent: u64,
    /// Critical sections entered.
    pub grants: u64,
    /// Envelopes handed to the node.
    pub envelopes_received: u64,
    /// Envelopes dropped as protocol violations.
    pub envelopes_dropped: u64,
    /// Completed workflow cycles.
    pub cycles_completed: u64,
}

/// Complete state machine of one peer.
///
/// Owns the logical clock shared by every domain, one mutual exclusion engine
/// and resource view per domain, and the workflow sequencer.
pub struct NodeStateMachine {
    /// Peer set (single source of truth for who takes part).
    topology: Arc<dyn PeerTopology>,

    /// Lamport counters, one per domain.
    clock: LogicalTime,

    /// Domains by id.
    domains: BTreeMap<DomainId, DomainState>,

    /// Workflow driven by pacing ticks.
    workflow: Option<WorkflowSequencer>,

    /// Cooldown draws.
    rng: ChaCha8Rng,

    /// Current wall-clock time.
    now: Duration,

    stats: NodeStats,
}

impl std::fmt::Debug for NodeStateMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeStateMachine")
            .field("peer", &self.local_peer())
            .field("domains", &self.domains.keys().collect::<Vec<_>>())
            .field("workflow", &self.workflow.as_ref().map(|w| w.state()))
            .field("now", &self.now)
            .finish()
    }
}

impl NodeStateMachine {
    /// Build a node from a validated configuration.
    pub fn new(topology: Arc<dyn PeerTopology>, config: &NodeConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let mut domains = BTreeMap::new();
        for domain in &config.domains {
            let resource = DomainResource::from_config(&domain.resource).map_err(|source| {
                ConfigError::Resource {
                    domain: domain.id,
                    source,
                }
            })?;
            domains.insert(
                domain.id,
                DomainState {
                    name: domain.name.clone(),
                    engine: MutexEngine::new(domain.id, topology.as_ref()),
                    resource,
                    snapshot_key: None,
                    requested_at: Duration::ZERO,
                },
            );
        }

        let local = topology.local_peer();
        Ok(Self {
            rng: ChaCha8Rng::seed_from_u64(config.seed ^ u64::from(local.0)),
            topology,
            clock: LogicalTime::new(),
            domains,
            workflow: config.workflow.map(WorkflowSequencer::new),
            now: Duration::ZERO,
            stats: NodeStats::default(),
        })
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Accessors
    // ═══════════════════════════════════════════════════════════════════════════

    /// The local peer.
    pub fn local_peer(&self) -> PeerId {
        self.topology.local_peer()
    }

    pub fn topology(&self) -> &dyn PeerTopology {
        self.topology.as_ref()
    }

    pub fn clock(&self) -> &LogicalTime {
        &self.clock
    }

    /// Configured domains in id order.
    pub fn domains(&self) -> impl Iterator<Item = DomainId> + '_ {
        self.domains.keys().copied()
    }

    pub fn engine(&self, domain: DomainId) -> Option<&MutexEngine> {
        self.domains.get(&domain).map(|d| &d.engine)
    }

    pub fn resource(&self, domain: DomainId) -> Option<&DomainResource> {
        self.domains.get(&domain).map(|d| &d.resource)
    }

    pub fn counted_pool(&self, domain: DomainId) -> Option<&CountedPool> {
        self.resource(domain).and_then(DomainResource::as_counted)
    }

    pub fn slot_table(&self, domain: DomainId) -> Option<&SlotTable> {
        self.resource(domain).and_then(DomainResource::as_slotted)
    }

    pub fn workflow(&self) -> Option<&WorkflowSequencer> {
        self.workflow.as_ref()
    }

    pub fn stats(&self) -> &NodeStats {
        &self.stats
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Event Handlers
    // ═══════════════════════════════════════════════════════════════════════════

    fn on_pacing_tick(&mut self) -> Vec<Action> {
        let mut actions = Vec::new();

        let request = self.workflow.as_mut().and_then(WorkflowSequencer::on_tick);
        if let Some(request) = request {
            if self.request_entry(request.domain, request.intent, &mut actions) {
                if let Some(workflow) = self.workflow.as_mut() {
                    workflow.request_sent();
                }
            }
        }

        self.try_enter(&mut actions);
        actions
    }

    fn on_entry_requested(&mut self, domain: DomainId, intent: Intent) -> Vec<Action> {
        let mut actions = Vec::new();
        self.request_entry(domain, intent, &mut actions);
        self.try_enter(&mut actions);
        actions
    }

    fn on_envelope(&mut self, envelope: Envelope) -> Vec<Action> {
        self.stats.envelopes_received += 1;
        let mut actions = Vec::new();

        if let Err(rejection) = self.apply_envelope(&envelope, &mut actions) {
            self.stats.envelopes_dropped += 1;
            warn!(
                peer = self.local_peer().0,
                sender = envelope.sender.0,
                domain = envelope.domain.0,
                kind = envelope.kind.type_name(),
                reason = %rejection,
                "Dropping envelope"
            );
            actions.push(Action::Notify(Notification::EnvelopeDropped {
                sender: envelope.sender,
                reason: rejection.to_string(),
            }));
        }

        self.try_enter(&mut actions);
        actions
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Protocol
    // ═══════════════════════════════════════════════════════════════════════════

    /// Ask `domain` for entry. Returns whether a request went out.
    fn request_entry(
        &mut self,
        domain: DomainId,
        intent: Intent,
        actions: &mut Vec<Action>,
    ) -> bool {
        let Some(state) = self.domains.get_mut(&domain) else {
            warn!(
                peer = self.topology.local_peer().0,
                domain = domain.0,
                "Entry requested for unknown domain"
            );
            return false;
        };

        match state.engine.request_entry(&mut self.clock, intent) {
            Ok(envelope) => {
                self.stats.requests_sent += 1;
                state.requested_at = self.now;
                trace!(
                    domain = %state.name,
                    %intent,
                    time = envelope.time.0,
                    "Broadcasting request"
                );
                actions.push(Action::Broadcast { envelope });
                true
            }
            Err(e) => {
                debug!(domain = %state.name, error = %e, "Request refused");
                false
            }
        }
    }

    /// Apply an inbound envelope, or explain why it must be dropped.
    ///
    /// A RELEASE snapshot is checked against a scratch copy of the view. An
    /// invalid one leaves the view untouched, but the RELEASE still reaches
    /// the engine so the sender's request leaves the queue.
    fn apply_envelope(
        &mut self,
        envelope: &Envelope,
        actions: &mut Vec<Action>,
    ) -> Result<(), Rejection> {
        if !self.topology.contains(envelope.sender) {
            return Err(Rejection::UnknownSender(envelope.sender));
        }
        let now = self.now;
        let state = self
            .domains
            .get_mut(&envelope.domain)
            .ok_or(Rejection::UnknownDomain(envelope.domain))?;

        // Releases of different peers may overtake each other; a snapshot
        // older than the one already held is stale and only prunes the queue.
        let mut invalid = None;
        let next_view = match envelope.kind {
            MessageKind::Release if state.snapshot_key < Some(envelope.order_key()) => {
                let mut view = state.resource.clone();
                match view.apply_snapshot(&envelope.payload, now) {
                    Ok(()) => Some(view),
                    Err(e) => {
                        invalid = Some(e);
                        None
                    }
                }
            }
            MessageKind::Release => {
                debug!(
                    domain = %state.name,
                    sender = envelope.sender.0,
                    time = envelope.time.0,
                    "Skipping stale snapshot"
                );
                None
            }
            _ => None,
        };

        let reply = state.engine.on_envelope(&mut self.clock, envelope)?;

        if let Some(view) = next_view {
            state.resource = view;
            state.snapshot_key = Some(envelope.order_key());
        }
        if let Some(reply) = reply {
            actions.push(Action::SendTo {
                peer: reply.to,
                envelope: reply.envelope,
            });
        }
        match invalid {
            Some(e) => Err(Rejection::Snapshot(e)),
            None => Ok(()),
        }
    }

    /// Enter every domain whose arbitration grants us entry.
    fn try_enter(&mut self, actions: &mut Vec<Action>) {
        let local = self.topology.local_peer();
        let now = self.now;

        for (&domain, state) in self.domains.iter_mut() {
            if !state.engine.can_enter() {
                continue;
            }

            let resource = &mut state.resource;
            let rng = &mut self.rng;
            let mut section_result = None;
            let grant = match state.engine.enter(&mut self.clock, |intent| {
                let (payload, outcome, notification) =
                    resource.run_section(domain, intent, local, now, rng);
                section_result = Some((outcome, notification));
                payload
            }) {
                Ok(grant) => grant,
                Err(e) => {
                    warn!(domain = %state.name, error = %e, "Failed to enter granted domain");
                    continue;
                }
            };

            self.stats.grants += 1;
            debug!(
                peer = local.0,
                domain = %state.name,
                request = %grant.request,
                intent = %grant.intent,
                "Entered critical section"
            );

            state.snapshot_key = Some(grant.release.order_key());
            actions.push(Action::Broadcast {
                envelope: grant.release,
            });
            actions.push(Action::Notify(Notification::EntryGranted {
                domain,
                request: grant.request,
                intent: grant.intent,
                at: now,
                waited: now.saturating_sub(state.requested_at),
            }));

            let Some((outcome, notification)) = section_result else {
                continue;
            };
            actions.push(Action::Notify(notification));

            let Some(workflow) = self.workflow.as_mut() else {
                continue;
            };
            if !workflow.is_waiting_for(domain, grant.intent) {
                continue;
            }
            if let Some(cycles) = workflow.on_outcome(outcome) {
                self.stats.cycles_completed = cycles;
                info!(peer = local.0, cycles, "Workflow cycle completed");
                actions.push(Action::Notify(Notification::WorkflowCycleCompleted { cycles }));
            }
        }
    }
}

impl StateMachine for NodeStateMachine {
    fn handle(&mut self, event: Event) -> Vec<Action> {
        match event {
            Event::PacingTick => self.on_pacing_tick(),
            Event::EnvelopeReceived { envelope } => self.on_envelope(envelope),
            Event::EntryRequested { domain, intent } => self.on_entry_requested(domain, intent),
        }
    }

    fn set_time(&mut self, now: Duration) {
        self.now = now;
    }

    fn now(&self) -> Duration {
        self.now
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::WorkflowState;
    use crate::{DomainConfig, WorkflowConfig};
    use cohort_resources::KindSpec;
    use cohort_types::{LamportTime, ResourceKind, SlotId, StaticTopology};
    use std::collections::VecDeque;
    use tracing_test::traced_test;

    const COUNTED: DomainId = DomainId(0);
    const SLOTS: DomainId = DomainId(1);

    fn nodes(peers: usize, config: &NodeConfig) -> Vec<NodeStateMachine> {
        (0..peers)
            .map(|i| {
                let topology = StaticTopology::new(PeerId(i as u32), peers).unwrap();
                NodeStateMachine::new(Arc::new(topology), config).unwrap()
            })
            .collect()
    }

    /// Where an envelope in flight goes: one peer, or everyone but the sender.
    enum Target {
        Peer(usize),
        AllOthers,
    }

    fn route(
        from: usize,
        actions: Vec<Action>,
        in_flight: &mut VecDeque<(Target, Envelope)>,
        notifications: &mut Vec<(usize, Notification)>,
    ) {
        for action in actions {
            match action {
                Action::Broadcast { envelope } => {
                    in_flight.push_back((Target::AllOthers, envelope))
                }
                Action::SendTo { peer, envelope } => {
                    in_flight.push_back((Target::Peer(peer.index()), envelope))
                }
                Action::Notify(n) => notifications.push((from, n)),
            }
        }
    }

    /// Deliver every envelope in flight in global FIFO order and collect the
    /// notifications raised on the way, tagged with the raising peer.
    fn pump(
        nodes: &mut [NodeStateMachine],
        initial: Vec<(usize, Vec<Action>)>,
    ) -> Vec<(usize, Notification)> {
        let mut in_flight = VecDeque::new();
        let mut notifications = Vec::new();

        for (from, actions) in initial {
            route(from, actions, &mut in_flight, &mut notifications);
        }

        while let Some((target, envelope)) = in_flight.pop_front() {
            let targets: Vec<usize> = match target {
                Target::Peer(peer) => vec![peer],
                Target::AllOthers => (0..nodes.len())
                    .filter(|&i| i != envelope.sender.index())
                    .collect(),
            };
            for to in targets {
                let actions = nodes[to].handle(Event::EnvelopeReceived {
                    envelope: envelope.clone(),
                });
                route(to, actions, &mut in_flight, &mut notifications);
            }
        }

        notifications
    }

    fn grants(notifications: &[(usize, Notification)]) -> Vec<(usize, OrderKey)> {
        notifications
            .iter()
            .filter_map(|(peer, n)| match n {
                Notification::EntryGranted { request, .. } => Some((*peer, *request)),
                _ => None,
            })
            .collect()
    }

    #[traced_test]
    #[test]
    fn test_lower_peer_id_wins_tie() {
        let config = NodeConfig::new(vec![DomainConfig::counted(
            COUNTED,
            "equipment",
            vec![KindSpec::new("stretcher", 1)],
        )]);
        let mut nodes = nodes(3, &config);

        // Peer 2 and peer 1 both request at logical time 1
        let a = nodes[2].handle(Event::EntryRequested {
            domain: COUNTED,
            intent: Intent::Acquire,
        });
        let b = nodes[1].handle(Event::EntryRequested {
            domain: COUNTED,
            intent: Intent::Acquire,
        });
        let notifications = pump(&mut nodes, vec![(2, a), (1, b)]);

        assert_eq!(
            grants(&notifications),
            vec![
                (1, OrderKey::new(LamportTime(1), PeerId(1))),
                (2, OrderKey::new(LamportTime(1), PeerId(2))),
            ]
        );

        // Peer 1 took the only stretcher and never returned it
        let kind = ResourceKind(0);
        assert!(nodes[1].counted_pool(COUNTED).unwrap().holds(kind));
        assert!(!nodes[2].counted_pool(COUNTED).unwrap().holds(kind));
        for node in &nodes {
            assert_eq!(node.counted_pool(COUNTED).unwrap().free(kind), Some(0));
        }
    }

    #[traced_test]
    #[test]
    fn test_return_frees_units_for_next_requester() {
        let config = NodeConfig::new(vec![DomainConfig::counted(
            COUNTED,
            "equipment",
            vec![KindSpec::new("stretcher", 1)],
        )]);
        let mut nodes = nodes(3, &config);
        let kind = ResourceKind(0);

        let b = nodes[1].handle(Event::EntryRequested {
            domain: COUNTED,
            intent: Intent::Acquire,
        });
        pump(&mut nodes, vec![(1, b)]);
        let b = nodes[1].handle(Event::EntryRequested {
            domain: COUNTED,
            intent: Intent::Return,
        });
        pump(&mut nodes, vec![(1, b)]);

        let a = nodes[2].handle(Event::EntryRequested {
            domain: COUNTED,
            intent: Intent::Acquire,
        });
        pump(&mut nodes, vec![(2, a)]);

        assert!(nodes[2].counted_pool(COUNTED).unwrap().holds(kind));
        assert!(!nodes[1].counted_pool(COUNTED).unwrap().holds(kind));
        for node in &nodes {
            assert_eq!(node.counted_pool(COUNTED).unwrap().free(kind), Some(0));
        }
    }

    #[traced_test]
    #[test]
    fn test_single_peer_runs_whole_workflow() {
        let config = NodeConfig::default().with_seed(3);
        let mut nodes = nodes(1, &config);
        let node = &mut nodes[0];

        let mut visited = Vec::new();
        for i in 0..5 {
            node.set_time(Duration::from_secs(i));
            for action in node.handle(Event::PacingTick) {
                if let Action::Notify(Notification::SlotVisited { slot, .. }) = action {
                    visited.push(slot);
                }
            }
        }

        assert_eq!(visited, vec![SlotId(0)]);
        assert_eq!(
            node.workflow().unwrap().state(),
            WorkflowState::NeedResources
        );
        assert_eq!(node.stats().cycles_completed, 1);
        assert_eq!(node.stats().grants, 3);
        assert!(!node.counted_pool(COUNTED).unwrap().holds_all());

        let slot = node.slot_table(SLOTS).unwrap().get(SlotId(0)).unwrap();
        assert_eq!(slot.owner, None);
        assert!(slot.available_at >= Duration::from_millis(2_500));
    }

    #[traced_test]
    #[test]
    fn test_unknown_domain_is_dropped() {
        let mut nodes = nodes(2, &NodeConfig::default());
        let envelope = Envelope::request(DomainId(7), Intent::Acquire, LamportTime(1), PeerId(1));

        let actions = nodes[0].handle(Event::EnvelopeReceived { envelope });

        assert!(matches!(
            actions.as_slice(),
            [Action::Notify(Notification::EnvelopeDropped { sender: PeerId(1), .. })]
        ));
        assert_eq!(nodes[0].stats().envelopes_dropped, 1);
        assert!(logs_contain("Dropping envelope"));
    }

    #[traced_test]
    #[test]
    fn test_unknown_sender_is_dropped() {
        let mut nodes = nodes(2, &NodeConfig::default());
        let envelope = Envelope::request(COUNTED, Intent::Acquire, LamportTime(1), PeerId(5));

        let actions = nodes[0].handle(Event::EnvelopeReceived { envelope });

        assert_eq!(actions.len(), 1);
        assert!(nodes[0].engine(COUNTED).unwrap().queue().is_empty());
    }

    #[traced_test]
    #[test]
    fn test_invalid_snapshot_keeps_view_but_prunes_request() {
        let mut nodes = nodes(2, &NodeConfig::default());
        let request = Envelope::request(COUNTED, Intent::Acquire, LamportTime(1), PeerId(1));
        nodes[0].handle(Event::EnvelopeReceived { envelope: request });

        // Claims 9 free doctors out of 5
        let payload = Payload::with_counts([9, 5, 0, 0]);
        let release = Envelope::release(COUNTED, LamportTime(3), PeerId(1), payload);
        let actions = nodes[0].handle(Event::EnvelopeReceived { envelope: release });

        assert!(matches!(
            actions.as_slice(),
            [Action::Notify(Notification::EnvelopeDropped { .. })]
        ));
        assert!(logs_contain("Dropping envelope"));
        assert_eq!(nodes[0].stats().envelopes_dropped, 1);
        let engine = nodes[0].engine(COUNTED).unwrap();
        assert_eq!(engine.queue().request_count(), 0);
        assert_eq!(
            nodes[0].counted_pool(COUNTED).unwrap().free(ResourceKind(0)),
            Some(5)
        );
    }

    #[traced_test]
    #[test]
    fn test_domain_progresses_after_invalid_snapshot() {
        let mut nodes = nodes(2, &NodeConfig::default());
        let deliver = |node: &mut NodeStateMachine, envelope: Envelope| {
            node.handle(Event::EnvelopeReceived { envelope })
        };

        deliver(
            &mut nodes[0],
            Envelope::request(COUNTED, Intent::Acquire, LamportTime(1), PeerId(1)),
        );
        let bad = Payload::with_counts([9, 5, 0, 0]);
        deliver(
            &mut nodes[0],
            Envelope::release(COUNTED, LamportTime(3), PeerId(1), bad),
        );

        // The sender's next request is acknowledged, not a duplicate
        let next = Envelope::request(COUNTED, Intent::Return, LamportTime(4), PeerId(1));
        let actions = deliver(&mut nodes[0], next);
        assert!(matches!(
            actions.as_slice(),
            [Action::SendTo { peer: PeerId(1), envelope }] if envelope.kind == MessageKind::Ack
        ));

        // Our own request queues behind it
        let actions = nodes[0].handle(Event::EntryRequested {
            domain: COUNTED,
            intent: Intent::Acquire,
        });
        let own = match actions.as_slice() {
            [Action::Broadcast { envelope }] => envelope.time,
            other => panic!("expected a request broadcast, got {other:?}"),
        };
        let engine = nodes[0].engine(COUNTED).unwrap();
        assert!(!engine.is_first());

        // Peer 1 releases its Return request, then confirms ours
        let ok = Payload::with_counts(nodes[0].counted_pool(COUNTED).unwrap().snapshot());
        deliver(
            &mut nodes[0],
            Envelope::release(COUNTED, LamportTime(own.0 + 1), PeerId(1), ok),
        );
        let actions = deliver(
            &mut nodes[0],
            Envelope::ack(COUNTED, LamportTime(own.0 + 2), PeerId(1)),
        );

        assert_eq!(nodes[0].stats().grants, 1);
        assert!(actions
            .iter()
            .filter_map(Action::envelope)
            .any(|e| e.kind == MessageKind::Release));
    }

    #[traced_test]
    #[test]
    fn test_stale_snapshot_is_skipped() {
        let config = NodeConfig::new(vec![DomainConfig::counted(
            COUNTED,
            "equipment",
            vec![KindSpec::new("stretcher", 2)],
        )]);
        let mut nodes = nodes(3, &config);

        // Peer 2's release at T5 overtook peer 1's older release at T3
        let newer = Payload::with_counts([0, 0, 0, 0]);
        let newer = Envelope::release(COUNTED, LamportTime(5), PeerId(2), newer);
        let older = Payload::with_counts([1, 0, 0, 0]);
        let older = Envelope::release(COUNTED, LamportTime(3), PeerId(1), older);
        nodes[0].handle(Event::EnvelopeReceived { envelope: newer });
        let actions = nodes[0].handle(Event::EnvelopeReceived { envelope: older });

        assert!(actions.is_empty());
        assert_eq!(
            nodes[0].counted_pool(COUNTED).unwrap().free(ResourceKind(0)),
            Some(0)
        );
        assert!(logs_contain("Skipping stale snapshot"));
    }

    #[traced_test]
    #[test]
    fn test_request_is_acked_to_sender_only() {
        let mut nodes = nodes(3, &NodeConfig::default());
        let request = Envelope::request(SLOTS, Intent::Acquire, LamportTime(4), PeerId(2));

        let actions = nodes[0].handle(Event::EnvelopeReceived { envelope: request });

        match actions.as_slice() {
            [Action::SendTo { peer, envelope }] => {
                assert_eq!(*peer, PeerId(2));
                assert_eq!(envelope.kind, MessageKind::Ack);
                assert_eq!(envelope.time, LamportTime(5));
            }
            other => panic!("unexpected actions: {other:?}"),
        }
    }

    #[test]
    fn test_workflow_disabled_ticks_do_nothing() {
        let config = NodeConfig::default().without_workflow();
        let mut nodes = nodes(2, &config);
        assert!(nodes[0].handle(Event::PacingTick).is_empty());
        assert!(nodes[0].workflow().is_none());
    }

    #[test]
    fn test_seeded_nodes_are_deterministic() {
        let config = NodeConfig::default().with_workflow(WorkflowConfig {
            counted_domain: COUNTED,
            slot_domain: Some(SLOTS),
        });
        let run = || {
            let mut nodes = nodes(1, &config);
            let mut cooldowns = Vec::new();
            for _ in 0..12 {
                for action in nodes[0].handle(Event::PacingTick) {
                    if let Action::Notify(Notification::SlotVisited { cooldown, .. }) = action {
                        cooldowns.push(cooldown);
                    }
                }
            }
            cooldowns
        };
        assert_eq!(run(), run());
    }
}
