//! Topology trait and static implementation.

use crate::PeerId;

/// Who takes part in the run.
///
/// The peer set is fixed and known to every process for the lifetime of the
/// run; discovering it is the bootstrap collaborator's job.
pub trait PeerTopology: Send + Sync {
    /// Get the local peer's ID.
    fn local_peer(&self) -> PeerId;

    /// Get the total number of peers, including the local one.
    fn peer_count(&self) -> usize;

    // Derived methods

    /// All peers in id order, including the local one.
    fn peers(&self) -> Vec<PeerId> {
        (0..self.peer_count() as u32).map(PeerId).collect()
    }

    /// Every peer except the local one.
    fn other_peers(&self) -> Vec<PeerId> {
        let local = self.local_peer();
        self.peers().into_iter().filter(|p| *p != local).collect()
    }

    /// Number of acknowledgements a request needs before entry.
    fn confirmations_needed(&self) -> usize {
        self.peer_count().saturating_sub(1)
    }

    /// Check if a peer belongs to the run.
    fn contains(&self, peer: PeerId) -> bool {
        peer.index() < self.peer_count()
    }
}

/// Errors that can occur when building a topology.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TopologyError {
    /// A run needs at least one peer.
    #[error("peer count must be at least 1")]
    Empty,

    /// The local peer is not part of the peer set.
    #[error("local peer {local} is outside a run of {peer_count} peers")]
    LocalPeerOutOfRange {
        /// The offending local peer.
        local: PeerId,
        /// Size of the peer set.
        peer_count: usize,
    },
}

/// Fixed topology of `peer_count` densely numbered peers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticTopology {
    local: PeerId,
    peer_count: usize,
}

impl StaticTopology {
    /// Create a topology for `local` within `peer_count` peers.
    pub fn new(local: PeerId, peer_count: usize) -> Result<Self, TopologyError> {
        if peer_count == 0 {
            return Err(TopologyError::Empty);
        }
        if local.index() >= peer_count {
            return Err(TopologyError::LocalPeerOutOfRange { local, peer_count });
        }
        Ok(Self { local, peer_count })
    }
}

impl PeerTopology for StaticTopology {
    fn local_peer(&self) -> PeerId {
        self.local
    }

    fn peer_count(&self) -> usize {
        self.peer_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_topology_peers() {
        let topology = StaticTopology::new(PeerId(1), 3).unwrap();

        assert_eq!(topology.peers(), vec![PeerId(0), PeerId(1), PeerId(2)]);
        assert_eq!(topology.other_peers(), vec![PeerId(0), PeerId(2)]);
        assert_eq!(topology.confirmations_needed(), 2);
        assert!(topology.contains(PeerId(2)));
        assert!(!topology.contains(PeerId(3)));
    }

    #[test]
    fn test_static_topology_rejects_out_of_range_local() {
        assert_eq!(
            StaticTopology::new(PeerId(3), 3),
            Err(TopologyError::LocalPeerOutOfRange {
                local: PeerId(3),
                peer_count: 3
            })
        );
        assert_eq!(StaticTopology::new(PeerId(0), 0), Err(TopologyError::Empty));
    }

    #[test]
    fn test_single_peer_needs_no_confirmations() {
        let topology = StaticTopology::new(PeerId(0), 1).unwrap();
        assert_eq!(topology.confirmations_needed(), 0);
        assert!(topology.other_peers().is_empty());
    }
}
