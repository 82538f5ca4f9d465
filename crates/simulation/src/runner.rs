//! Simulation runner.

use crate::event_queue::{EventKey, SimEvent};
use crate::network::{NetworkConfig, SimulatedNetwork};
use bytes::Bytes;
use cohort_core::{
    Action, DriverAction, Event, Notification, PacingDriver, RandomPacing, StateMachine,
};
use cohort_messages::{decode_envelope, encode_envelope, Envelope, Intent};
use cohort_node::{ConfigError, NodeConfig, NodeStateMachine};
use cohort_types::{DomainId, PeerId, StaticTopology, TopologyError};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, trace, warn};

/// Errors building a simulation.
#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("invalid topology: {0}")]
    Topology(#[from] TopologyError),

    #[error("invalid node configuration: {0}")]
    Config(#[from] ConfigError),
}

/// A notification raised by a node, stamped with who and when.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationRecord {
    pub peer: PeerId,
    pub at: Duration,
    pub notification: Notification,
}

/// Counters kept by the runner.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimulationStats {
    /// Events taken off the queue.
    pub events_processed: u64,
    /// Envelopes put on the network (a broadcast counts once per receiver).
    pub envelopes_sent: u64,
    /// Envelopes decoded and handed to a node.
    pub envelopes_delivered: u64,
    /// Bytes put on the network.
    pub bytes_sent: u64,
    /// Deliveries whose bytes did not decode.
    pub decode_failures: u64,
    /// Envelopes that could not be encoded.
    pub encode_failures: u64,
    /// Pacing rounds that ticked a node.
    pub pacing_ticks: u64,
    /// Pacing rounds the driver skipped.
    pub idle_rounds: u64,
}

/// Deterministic simulation runner.
///
/// Owns every node, the event queue and the simulated network. All
/// randomness (network jitter, pacing) comes from one seeded RNG, so the same
/// seed and inputs always replay the same run.
pub struct SimulationRunner {
    nodes: Vec<NodeStateMachine>,

    /// Pending events.
    queue: BTreeMap<EventKey, SimEvent>,

    /// Insertion counter for [`EventKey::sequence`].
    sequence: u64,

    /// Current simulated time.
    now: Duration,

    network: SimulatedNetwork,

    rng: ChaCha8Rng,

    /// Pacing driver per node; `None` means the node never ticks.
    pacing: Vec<Option<Box<dyn PacingDriver + Send>>>,

    notifications: Vec<NotificationRecord>,

    stats: SimulationStats,
}

impl SimulationRunner {
    /// Create a runner with one node per peer of `network`.
    pub fn new(
        network: NetworkConfig,
        node_config: &NodeConfig,
        seed: u64,
    ) -> Result<Self, SimulationError> {
        let peers = network.peers;
        if peers == 0 {
            return Err(TopologyError::Empty.into());
        }
        let nodes = (0..peers as u32)
            .map(|i| {
                let topology = StaticTopology::new(PeerId(i), peers)?;
                Ok(NodeStateMachine::new(Arc::new(topology), node_config)?)
            })
            .collect::<Result<Vec<_>, SimulationError>>()?;

        debug!(peers, seed, "Created simulation runner");

        Ok(Self {
            nodes,
            queue: BTreeMap::new(),
            sequence: 0,
            now: Duration::ZERO,
            network: SimulatedNetwork::new(network),
            rng: ChaCha8Rng::seed_from_u64(seed),
            pacing: (0..peers).map(|_| None).collect(),
            notifications: Vec::new(),
            stats: SimulationStats::default(),
        })
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Accessors
    // ═══════════════════════════════════════════════════════════════════════════

    /// Current simulated time.
    pub fn now(&self) -> Duration {
        self.now
    }

    pub fn nodes(&self) -> &[NodeStateMachine] {
        &self.nodes
    }

    pub fn node(&self, peer: PeerId) -> Option<&NodeStateMachine> {
        self.nodes.get(peer.index())
    }

    pub fn network(&self) -> &SimulatedNetwork {
        &self.network
    }

    pub fn stats(&self) -> &SimulationStats {
        &self.stats
    }

    /// Notifications raised so far and not yet taken.
    pub fn notifications(&self) -> &[NotificationRecord] {
        &self.notifications
    }

    /// Take the notification log, leaving it empty.
    pub fn take_notifications(&mut self) -> Vec<NotificationRecord> {
        std::mem::take(&mut self.notifications)
    }

    /// Number of events still queued.
    pub fn pending_events(&self) -> usize {
        self.queue.len()
    }

    /// Time of the next queued event.
    pub fn next_event_time(&self) -> Option<Duration> {
        self.queue.first_key_value().map(|(key, _)| key.time)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Inputs
    // ═══════════════════════════════════════════════════════════════════════════

    /// Give every node a [`RandomPacing`] driver seeded from the runner.
    pub fn start_random_pacing(&mut self, max_jitter: Duration) {
        for peer in 0..self.nodes.len() as u32 {
            let rng = ChaCha8Rng::seed_from_u64(self.rng.gen());
            self.set_pacing(PeerId(peer), Box::new(RandomPacing::new(rng, max_jitter)));
        }
    }

    /// Install a pacing driver for one node and schedule its first round.
    pub fn set_pacing(&mut self, peer: PeerId, mut driver: Box<dyn PacingDriver + Send>) {
        let Some(slot) = self.pacing.get_mut(peer.index()) else {
            warn!(peer = peer.0, "Pacing driver for unknown peer");
            return;
        };
        let first = self.now + driver.next_delay();
        *slot = Some(driver);
        self.schedule(first, peer, SimEvent::Pacing);
    }

    /// Remove every pacing driver. Rounds already queued become no-ops.
    pub fn stop_pacing(&mut self) {
        for driver in &mut self.pacing {
            *driver = None;
        }
    }

    /// Ask `peer` to request entry into `domain` at the current time.
    pub fn request_entry(&mut self, peer: PeerId, domain: DomainId, intent: Intent) {
        self.schedule(self.now, peer, SimEvent::EntryRequested { domain, intent });
    }

    /// Put raw bytes on the `from -> to` link as if `from` sent them.
    pub fn inject_bytes(&mut self, from: PeerId, to: PeerId, bytes: Bytes) {
        self.send(from, to, bytes);
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Execution
    // ═══════════════════════════════════════════════════════════════════════════

    /// Process the next event. Returns false when the queue is empty.
    pub fn step(&mut self) -> bool {
        let Some((key, event)) = self.queue.pop_first() else {
            return false;
        };
        self.now = key.time;
        self.stats.events_processed += 1;
        self.dispatch(key.node, event);
        true
    }

    /// Process every event up to and including `end`, then advance to `end`.
    pub fn run_until(&mut self, end: Duration) {
        while self.next_event_time().is_some_and(|time| time <= end) {
            self.step();
        }
        self.now = self.now.max(end);
    }

    /// Process events until none are left or `max_events` were processed.
    ///
    /// Returns true if the queue drained. With pacing running the queue never
    /// drains; call [`Self::stop_pacing`] first.
    pub fn run_until_quiet(&mut self, max_events: u64) -> bool {
        for _ in 0..max_events {
            if !self.step() {
                return true;
            }
        }
        self.queue.is_empty()
    }

    fn dispatch(&mut self, peer: PeerId, event: SimEvent) {
        let event = match event {
            SimEvent::Deliver { from, bytes } => match decode_envelope(&bytes) {
                Ok(envelope) => {
                    self.stats.envelopes_delivered += 1;
                    Event::EnvelopeReceived { envelope }
                }
                Err(e) => {
                    self.stats.decode_failures += 1;
                    warn!(peer = peer.0, from = from.0, error = %e, "Dropping undecodable bytes");
                    return;
                }
            },
            SimEvent::EntryRequested { domain, intent } => Event::EntryRequested { domain, intent },
            SimEvent::Pacing => match self.next_pacing_round(peer) {
                Some(DriverAction::Tick) => {
                    self.stats.pacing_ticks += 1;
                    Event::PacingTick
                }
                Some(DriverAction::Idle) => {
                    self.stats.idle_rounds += 1;
                    return;
                }
                None => return,
            },
        };

        let Some(node) = self.nodes.get_mut(peer.index()) else {
            warn!(peer = peer.0, "Event for unknown peer");
            return;
        };
        trace!(peer = peer.0, event = event.type_name(), now = ?self.now, "Dispatching");
        node.set_time(self.now);
        let actions = node.handle(event);
        self.process_actions(peer, actions);
    }

    /// Ask the node's driver what to do and schedule its next round.
    fn next_pacing_round(&mut self, peer: PeerId) -> Option<DriverAction> {
        let driver = self.pacing.get_mut(peer.index())?.as_mut()?;
        let action = driver.next_action();
        let next = self.now + driver.next_delay();
        self.schedule(next, peer, SimEvent::Pacing);
        Some(action)
    }

    fn process_actions(&mut self, from: PeerId, actions: Vec<Action>) {
        for action in actions {
            match action {
                Action::Broadcast { envelope } => {
                    let Some(bytes) = self.encode(&envelope) else {
                        continue;
                    };
                    let receivers: Vec<PeerId> =
                        self.network.peers().filter(|&p| p != from).collect();
                    for to in receivers {
                        self.send(from, to, bytes.clone());
                    }
                }
                Action::SendTo { peer, envelope } => {
                    if let Some(bytes) = self.encode(&envelope) {
                        self.send(from, peer, bytes);
                    }
                }
                Action::Notify(notification) => {
                    self.notifications.push(NotificationRecord {
                        peer: from,
                        at: self.now,
                        notification,
                    });
                }
            }
        }
    }

    fn encode(&mut self, envelope: &Envelope) -> Option<Bytes> {
        match encode_envelope(envelope) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                self.stats.encode_failures += 1;
                warn!(%envelope, error = %e, "Failed to encode envelope");
                None
            }
        }
    }

    fn send(&mut self, from: PeerId, to: PeerId, bytes: Bytes) {
        let arrival = self
            .network
            .arrival_time(from, to, self.now, &mut self.rng);
        self.stats.envelopes_sent += 1;
        self.stats.bytes_sent += bytes.len() as u64;
        self.schedule(arrival, to, SimEvent::Deliver { from, bytes });
    }

    fn schedule(&mut self, time: Duration, node: PeerId, event: SimEvent) {
        let key = EventKey {
            time,
            priority: event.priority(),
            node,
            sequence: self.sequence,
        };
        self.sequence += 1;
        self.queue.insert(key, event);
    }
}
