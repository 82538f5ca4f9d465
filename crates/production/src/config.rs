//! Cluster configuration.

use crate::error::RunnerError;
use cohort_node::NodeConfig;
use cohort_types::TopologyError;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Configuration for a cluster run, loadable from TOML.
///
/// ```toml
/// peers = 4
/// duration_ms = 20000
///
/// [node]
/// seed = 7
///
/// [[node.domains]]
/// id = 0
/// name = "staff"
///
/// [node.domains.resource]
/// type = "counted"
/// kinds = [{ name = "doctor", capacity = 2 }]
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Number of peers.
    pub peers: usize,

    /// How long peers pace new requests, in milliseconds.
    pub duration_ms: u64,

    /// How long peers keep handling envelopes after pacing stops, in
    /// milliseconds.
    pub drain_ms: u64,

    /// Maximum pause between a peer's pacing rounds, in milliseconds.
    pub pacing_jitter_ms: u64,

    /// Domains, resources and workflow every peer runs.
    pub node: NodeConfig,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self::new(5)
    }
}

impl ClusterConfig {
    pub fn new(peers: usize) -> Self {
        Self {
            peers,
            duration_ms: 10_000,
            drain_ms: 1_000,
            pacing_jitter_ms: 50,
            node: NodeConfig::default(),
        }
    }

    /// Parse a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self, RunnerError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RunnerError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| RunnerError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn with_node(mut self, node: NodeConfig) -> Self {
        self.node = node;
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration_ms = duration.as_millis() as u64;
        self
    }

    pub fn with_drain(mut self, drain: Duration) -> Self {
        self.drain_ms = drain.as_millis() as u64;
        self
    }

    pub fn with_pacing_jitter(mut self, jitter: Duration) -> Self {
        self.pacing_jitter_ms = jitter.as_millis() as u64;
        self
    }

    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }

    pub fn drain(&self) -> Duration {
        Duration::from_millis(self.drain_ms)
    }

    pub fn pacing_jitter(&self) -> Duration {
        Duration::from_millis(self.pacing_jitter_ms)
    }

    /// Check the peer count and the node configuration.
    pub fn validate(&self) -> Result<(), RunnerError> {
        if self.peers == 0 {
            return Err(TopologyError::Empty.into());
        }
        self.node.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cohort_node::{ConfigError, ResourceConfig};
    use cohort_types::DomainId;
    use std::io::Write;

    const CLUSTER: &str = r#"
        peers = 3
        duration_ms = 2000
        pacing_jitter_ms = 20

        [node]
        seed = 9

        [[node.domains]]
        id = 0
        name = "staff"

        [node.domains.resource]
        type = "counted"
        kinds = [{ name = "doctor", capacity = 2 }]
    "#;

    #[test]
    fn test_parse_cluster() {
        let config = ClusterConfig::from_toml_str(CLUSTER).unwrap();
        assert_eq!(config.peers, 3);
        assert_eq!(config.duration(), Duration::from_secs(2));
        assert_eq!(config.drain(), Duration::from_secs(1));
        assert_eq!(config.pacing_jitter(), Duration::from_millis(20));
        assert_eq!(config.node.seed, 9);
        assert!(matches!(
            config.node.domain(DomainId(0)).unwrap().resource,
            ResourceConfig::Counted { .. }
        ));
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = ClusterConfig::from_toml_str("").unwrap();
        assert_eq!(config.peers, 5);
        assert_eq!(config.node.domains.len(), 2);
    }

    #[test]
    fn test_invalid_node_rejected() {
        let err = ClusterConfig::from_toml_str("[node]\ndomains = []").unwrap_err();
        assert!(matches!(err, RunnerError::Config(ConfigError::NoDomains)));
    }

    #[test]
    fn test_zero_peers_rejected() {
        let err = ClusterConfig::from_toml_str("peers = 0").unwrap_err();
        assert!(matches!(err, RunnerError::Topology(TopologyError::Empty)));
        assert!(ClusterConfig::new(0).validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(CLUSTER.as_bytes()).unwrap();

        let config = ClusterConfig::load(file.path()).unwrap();
        assert_eq!(config.peers, 3);

        let missing = ClusterConfig::load("/nonexistent/cluster.toml").unwrap_err();
        assert!(matches!(missing, RunnerError::Io { .. }));
    }
}
