//! Errors raised while setting up or running a cluster.

use cohort_node::ConfigError;
use cohort_types::{PeerId, TopologyError};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid cluster config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Topology(#[from] TopologyError),

    #[error("peer {peer} task failed: {source}")]
    Task {
        peer: PeerId,
        #[source]
        source: tokio::task::JoinError,
    },
}
