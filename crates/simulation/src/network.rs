//! Simulated network with per-link FIFO delivery.

use cohort_types::PeerId;
use rand::Rng;
use std::collections::HashMap;
use std::time::Duration;

/// Configuration for the simulated network.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Number of peers.
    pub peers: usize,

    /// Latency every envelope pays.
    pub base_latency: Duration,

    /// Extra latency drawn uniformly from `[0, jitter]` per envelope.
    pub jitter: Duration,
}

impl NetworkConfig {
    /// A network of `peers` with default latencies.
    pub fn new(peers: usize) -> Self {
        Self {
            peers,
            ..Default::default()
        }
    }

    /// Set the base latency.
    pub fn with_base_latency(mut self, latency: Duration) -> Self {
        self.base_latency = latency;
        self
    }

    /// Set the jitter.
    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            peers: 3,
            base_latency: Duration::from_millis(5),
            jitter: Duration::from_millis(10),
        }
    }
}

/// Latency model of a reliable network that keeps every ordered pair of peers
/// FIFO.
///
/// Jitter may reorder envelopes of different links, never of the same link:
/// an envelope is never scheduled before the previous one on its link.
#[derive(Debug)]
pub struct SimulatedNetwork {
    config: NetworkConfig,
    /// Last scheduled arrival per (from, to).
    last_arrival: HashMap<(PeerId, PeerId), Duration>,
}

impl SimulatedNetwork {
    pub fn new(config: NetworkConfig) -> Self {
        Self {
            config,
            last_arrival: HashMap::new(),
        }
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    /// All peers of the network.
    pub fn peers(&self) -> impl Iterator<Item = PeerId> {
        (0..self.config.peers as u32).map(PeerId)
    }

    /// Pick the arrival time of an envelope sent on `from -> to` at `now`.
    pub fn arrival_time(
        &mut self,
        from: PeerId,
        to: PeerId,
        now: Duration,
        rng: &mut impl Rng,
    ) -> Duration {
        let jitter_us = self.config.jitter.as_micros() as u64;
        let jitter = if jitter_us == 0 {
            Duration::ZERO
        } else {
            Duration::from_micros(rng.gen_range(0..=jitter_us))
        };

        let candidate = now + self.config.base_latency + jitter;
        let last = self.last_arrival.entry((from, to)).or_default();
        let arrival = candidate.max(*last);
        *last = arrival;
        arrival
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_link_stays_fifo_under_jitter() {
        let config = NetworkConfig::new(2)
            .with_base_latency(Duration::from_millis(1))
            .with_jitter(Duration::from_millis(50));
        let mut network = SimulatedNetwork::new(config);
        let mut rng = ChaCha8Rng::seed_from_u64(9);

        let mut previous = Duration::ZERO;
        for i in 0..200 {
            let sent = Duration::from_micros(i * 100);
            let arrival = network.arrival_time(PeerId(0), PeerId(1), sent, &mut rng);
            assert!(arrival >= previous);
            assert!(arrival >= sent + Duration::from_millis(1));
            previous = arrival;
        }
    }

    #[test]
    fn test_fixed_latency_without_jitter() {
        let config = NetworkConfig::new(2)
            .with_base_latency(Duration::from_millis(3))
            .with_jitter(Duration::ZERO);
        let mut network = SimulatedNetwork::new(config);
        let mut rng = ChaCha8Rng::seed_from_u64(0);

        let arrival = network.arrival_time(PeerId(1), PeerId(0), Duration::from_secs(1), &mut rng);
        assert_eq!(arrival, Duration::from_millis(1_003));
        assert_eq!(network.peers().count(), 2);
    }
}
