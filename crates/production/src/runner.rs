//! Async peer runner.

use crate::channel::{mesh, PeerChannel};
use crate::config::ClusterConfig;
use crate::error::RunnerError;
use bytes::Bytes;
use cohort_core::{
    Action, DriverAction, Event, Notification, PacingDriver, RandomPacing, StateMachine,
};
use cohort_messages::{decode_envelope, encode_envelope, Envelope};
use cohort_node::{NodeStateMachine, NodeStats};
use cohort_types::{DomainId, OrderKey, PeerId, StaticTopology};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{self, Instant};
use tracing::{debug, info, warn};

/// Mixed into the node seed so pacing draws differ from cooldown draws.
const PACING_SEED_SALT: u64 = 0x7061_6369_6e67;

/// I/O counters kept by a runner.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerStats {
    pub pacing_ticks: u64,
    pub idle_rounds: u64,
    pub envelopes_sent: u64,
    pub bytes_sent: u64,
    pub envelopes_received: u64,
    pub send_failures: u64,
    pub decode_failures: u64,
    pub encode_failures: u64,
}

/// What a peer task hands back when it stops.
#[derive(Debug)]
pub struct PeerReport {
    pub peer: PeerId,
    /// The node in its final state.
    pub node: NodeStateMachine,
    pub io: PeerStats,
    /// Every notification the node raised, in order.
    pub notifications: Vec<Notification>,
}

impl PeerReport {
    pub fn stats(&self) -> &NodeStats {
        self.node.stats()
    }
}

/// Drives one node from a channel and a pacing driver.
pub struct PeerRunner<C> {
    node: NodeStateMachine,
    channel: C,
    pacing: RandomPacing<ChaCha8Rng>,
    /// Time zero of the node's wall clock, shared by the whole cluster.
    started: Instant,
    io: PeerStats,
    notifications: Vec<Notification>,
}

impl<C: PeerChannel> PeerRunner<C> {
    pub fn new(
        node: NodeStateMachine,
        channel: C,
        pacing: RandomPacing<ChaCha8Rng>,
        started: Instant,
    ) -> Self {
        Self {
            node,
            channel,
            pacing,
            started,
            io: PeerStats::default(),
            notifications: Vec::new(),
        }
    }

    pub fn local_peer(&self) -> PeerId {
        self.node.local_peer()
    }

    /// Pace the node for `duration`, then keep handling envelopes for
    /// `drain` so requests already issued can finish.
    pub async fn run(mut self, duration: Duration, drain: Duration) -> PeerReport {
        let peer = self.local_peer();
        let pacing_ends = self.started + duration;
        let stop = pacing_ends + drain;
        let mut pacing = true;
        let mut next_round = Instant::now() + self.pacing.next_delay();

        debug!(peer = peer.0, ?duration, ?drain, "Peer started");

        loop {
            tokio::select! {
                received = self.channel.receive_any() => match received {
                    Some((from, bytes)) => self.on_bytes(from, bytes).await,
                    None => break,
                },
                _ = time::sleep_until(next_round), if pacing => {
                    match self.pacing.next_action() {
                        DriverAction::Tick => {
                            self.io.pacing_ticks += 1;
                            self.dispatch(Event::PacingTick).await;
                        }
                        DriverAction::Idle => self.io.idle_rounds += 1,
                    }
                    next_round = Instant::now() + self.pacing.next_delay();
                }
                _ = time::sleep_until(pacing_ends), if pacing => {
                    pacing = false;
                    debug!(peer = peer.0, "Pacing stopped, draining");
                }
                _ = time::sleep_until(stop) => break,
            }
        }

        info!(
            peer = peer.0,
            grants = self.node.stats().grants,
            cycles = self.node.stats().cycles_completed,
            envelopes_sent = self.io.envelopes_sent,
            "Peer stopped"
        );

        PeerReport {
            peer,
            node: self.node,
            io: self.io,
            notifications: self.notifications,
        }
    }

    async fn on_bytes(&mut self, from: PeerId, bytes: Bytes) {
        match decode_envelope(&bytes) {
            Ok(envelope) => {
                self.io.envelopes_received += 1;
                self.dispatch(Event::EnvelopeReceived { envelope }).await;
            }
            Err(e) => {
                self.io.decode_failures += 1;
                warn!(
                    peer = self.local_peer().0,
                    from = from.0,
                    error = %e,
                    "Dropping undecodable bytes"
                );
            }
        }
    }

    async fn dispatch(&mut self, event: Event) {
        self.node.set_time(self.started.elapsed());
        let actions = self.node.handle(event);

        for action in actions {
            match action {
                Action::Broadcast { envelope } => {
                    let Some(bytes) = self.encode(&envelope) else {
                        continue;
                    };
                    let receivers = self.channel.peer_count().saturating_sub(1) as u64;
                    let len = bytes.len() as u64;
                    match self.channel.broadcast(bytes).await {
                        Ok(()) => {
                            self.io.envelopes_sent += receivers;
                            self.io.bytes_sent += receivers * len;
                        }
                        Err(e) => {
                            self.io.send_failures += 1;
                            debug!(%envelope, error = %e, "Broadcast incomplete");
                        }
                    }
                }
                Action::SendTo { peer, envelope } => {
                    let Some(bytes) = self.encode(&envelope) else {
                        continue;
                    };
                    let len = bytes.len() as u64;
                    match self.channel.send(peer, bytes).await {
                        Ok(()) => {
                            self.io.envelopes_sent += 1;
                            self.io.bytes_sent += len;
                        }
                        Err(e) => {
                            self.io.send_failures += 1;
                            debug!(%envelope, error = %e, "Send failed");
                        }
                    }
                }
                Action::Notify(notification) => self.notifications.push(notification),
            }
        }
    }

    fn encode(&mut self, envelope: &Envelope) -> Option<Bytes> {
        match encode_envelope(envelope) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                self.io.encode_failures += 1;
                warn!(%envelope, error = %e, "Failed to encode envelope");
                None
            }
        }
    }
}

/// Final reports of every peer, indexed by peer id.
#[derive(Debug)]
pub struct ClusterReport {
    pub peers: Vec<PeerReport>,
}

impl ClusterReport {
    pub fn total_grants(&self) -> u64 {
        self.peers.iter().map(|p| p.stats().grants).sum()
    }

    pub fn cycles_completed(&self) -> u64 {
        self.peers.iter().map(|p| p.stats().cycles_completed).sum()
    }

    pub fn envelopes_dropped(&self) -> u64 {
        self.peers.iter().map(|p| p.stats().envelopes_dropped).sum()
    }

    /// Granted requests per domain, sorted by request key.
    pub fn grants(&self) -> BTreeMap<DomainId, Vec<(OrderKey, PeerId)>> {
        let mut grants: BTreeMap<DomainId, Vec<(OrderKey, PeerId)>> = BTreeMap::new();
        for report in &self.peers {
            for notification in &report.notifications {
                if let Notification::EntryGranted {
                    domain, request, ..
                } = notification
                {
                    grants
                        .entry(*domain)
                        .or_default()
                        .push((*request, report.peer));
                }
            }
        }
        for keys in grants.values_mut() {
            keys.sort();
        }
        grants
    }
}

/// Run a whole cluster in-process until every peer stops.
pub async fn run_cluster(config: &ClusterConfig) -> Result<ClusterReport, RunnerError> {
    config.validate()?;

    let started = Instant::now();
    let mut tasks = Vec::with_capacity(config.peers);
    for channel in mesh(config.peers) {
        let peer = channel.local_peer();
        let topology = Arc::new(StaticTopology::new(peer, config.peers)?);
        let node = NodeStateMachine::new(topology, &config.node)?;
        let rng = ChaCha8Rng::seed_from_u64(config.node.seed ^ PACING_SEED_SALT ^ peer.0 as u64);
        let pacing = RandomPacing::new(rng, config.pacing_jitter());
        let runner = PeerRunner::new(node, channel, pacing, started);
        tasks.push((
            peer,
            tokio::spawn(runner.run(config.duration(), config.drain())),
        ));
    }

    info!(
        peers = config.peers,
        duration = ?config.duration(),
        "Cluster started"
    );

    let mut peers = Vec::with_capacity(tasks.len());
    for (peer, task) in tasks {
        let report = task
            .await
            .map_err(|source| RunnerError::Task { peer, source })?;
        peers.push(report);
    }

    let report = ClusterReport { peers };
    info!(
        grants = report.total_grants(),
        cycles = report.cycles_completed(),
        "Cluster stopped"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    fn quick(peers: usize) -> ClusterConfig {
        ClusterConfig::new(peers)
            .with_duration(Duration::from_millis(400))
            .with_drain(Duration::from_millis(400))
            .with_pacing_jitter(Duration::from_millis(5))
    }

    #[traced_test]
    #[tokio::test]
    async fn test_cluster_makes_progress() {
        let report = run_cluster(&quick(3)).await.unwrap();

        assert_eq!(report.peers.len(), 3);
        assert!(report.total_grants() > 0);
        assert_eq!(report.envelopes_dropped(), 0);
        for peer in &report.peers {
            assert_eq!(peer.io.decode_failures, 0);
            assert!(peer.io.pacing_ticks > 0);
        }
    }

    #[traced_test]
    #[tokio::test]
    async fn test_request_keys_granted_once() {
        let report = run_cluster(&quick(4)).await.unwrap();

        for (domain, grants) in report.grants() {
            for pair in grants.windows(2) {
                assert!(pair[0].0 < pair[1].0, "{domain}: {} granted twice", pair[1].0);
            }
        }
    }

    #[traced_test]
    #[tokio::test]
    async fn test_counted_views_agree_after_drain() {
        let report = run_cluster(&quick(3)).await.unwrap();
        let domain = DomainId(0);

        let reference = report.peers[0].node.counted_pool(domain).unwrap();
        assert!(reference.kinds().count() > 0);
        for kind in reference.kinds() {
            let holders = report
                .peers
                .iter()
                .filter(|p| p.node.counted_pool(domain).unwrap().holds(kind))
                .count() as u32;
            for peer in &report.peers {
                let pool = peer.node.counted_pool(domain).unwrap();
                assert_eq!(pool.free(kind), reference.free(kind));
                assert_eq!(pool.free(kind).unwrap() + holders, pool.capacity(kind).unwrap());
            }
        }
    }

    #[traced_test]
    #[tokio::test]
    async fn test_garbage_bytes_dropped() {
        let config = quick(2);
        let mut channels = mesh(2);
        let channel = channels.remove(0);
        let intruder = channels.remove(0);

        let topology = Arc::new(StaticTopology::new(PeerId(0), 2).unwrap());
        let node = NodeStateMachine::new(topology, &config.node.clone().without_workflow())
            .unwrap();
        let pacing = RandomPacing::new(ChaCha8Rng::seed_from_u64(1), Duration::from_millis(5));
        let runner = PeerRunner::new(node, channel, pacing, Instant::now());

        intruder
            .send(PeerId(0), Bytes::from_static(b"garbage"))
            .await
            .unwrap();
        let report = runner
            .run(Duration::from_millis(20), Duration::from_millis(20))
            .await;

        assert_eq!(report.io.decode_failures, 1);
        assert_eq!(report.io.envelopes_received, 0);
        assert!(logs_contain("Dropping undecodable bytes"));
    }
}
