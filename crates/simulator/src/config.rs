//! Configuration types for the simulator.

use cohort_node::NodeConfig;
use cohort_simulation::NetworkConfig;
use std::time::Duration;

/// Configuration for a simulation run.
#[derive(Clone, Debug)]
pub struct SimulatorConfig {
    /// Number of peers.
    pub peers: usize,

    /// Domains, resources and workflow every peer runs.
    pub node: NodeConfig,

    /// Latency every envelope pays.
    pub base_latency: Duration,

    /// Extra per-envelope latency drawn from `[0, jitter]`.
    pub jitter: Duration,

    /// Pacing jitter: each peer ticks after a pause drawn from
    /// `[0, pacing_jitter)`.
    pub pacing_jitter: Duration,

    /// Simulated time to run with pacing on. Outstanding requests are then
    /// drained with pacing off.
    pub duration: Duration,

    /// Random seed for deterministic simulation.
    pub seed: u64,
}

impl SimulatorConfig {
    /// Create a new simulator configuration.
    pub fn new(peers: usize) -> Self {
        Self {
            peers,
            node: NodeConfig::default(),
            base_latency: Duration::from_millis(5),
            jitter: Duration::from_millis(10),
            pacing_jitter: Duration::from_millis(50),
            duration: Duration::from_secs(30),
            seed: 12345,
        }
    }

    /// Set the node configuration.
    pub fn with_node(mut self, node: NodeConfig) -> Self {
        self.node = node;
        self
    }

    /// Set the network latency model.
    pub fn with_latency(mut self, base: Duration, jitter: Duration) -> Self {
        self.base_latency = base;
        self.jitter = jitter;
        self
    }

    /// Set the pacing jitter.
    pub fn with_pacing_jitter(mut self, jitter: Duration) -> Self {
        self.pacing_jitter = jitter;
        self
    }

    /// Set how long pacing runs.
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Set the random seed.
    ///
    /// The seed drives the network, pacing, and every node's cooldown draws.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Convert to a NetworkConfig for the underlying simulation.
    pub fn to_network_config(&self) -> NetworkConfig {
        NetworkConfig::new(self.peers)
            .with_base_latency(self.base_latency)
            .with_jitter(self.jitter)
    }

    /// Node configuration with the run's seed mixed in.
    pub fn to_node_config(&self) -> NodeConfig {
        self.node.clone().with_seed(self.seed)
    }
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self::new(5)
    }
}
