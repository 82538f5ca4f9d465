//! Message channels between peers.
//!
//! A channel moves opaque encoded envelopes. It is reliable and FIFO per
//! sender, which is all the mutex protocol asks of the transport.

use async_trait::async_trait;
use bytes::Bytes;
use cohort_types::PeerId;
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors sending on a channel.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    #[error("no channel to {0}")]
    UnknownPeer(PeerId),

    #[error("{0} stopped receiving")]
    Closed(PeerId),
}

/// Point-to-point and broadcast transport for one peer.
#[async_trait]
pub trait PeerChannel: Send + Sync {
    /// The peer this channel belongs to.
    fn local_peer(&self) -> PeerId;

    /// Number of peers reachable, the local one included.
    fn peer_count(&self) -> usize;

    /// Send bytes to one peer.
    async fn send(&self, to: PeerId, bytes: Bytes) -> Result<(), ChannelError>;

    /// Send bytes to every peer except the local one.
    ///
    /// Every peer is attempted; the first failure is returned.
    async fn broadcast(&self, bytes: Bytes) -> Result<(), ChannelError> {
        let local = self.local_peer();
        let mut result = Ok(());
        for peer in (0..self.peer_count() as u32).map(PeerId) {
            if peer == local {
                continue;
            }
            if let Err(e) = self.send(peer, bytes.clone()).await {
                result = result.and(Err(e));
            }
        }
        result
    }

    /// Wait for the next message from any peer.
    ///
    /// Returns `None` once no sender is left.
    async fn receive_any(&mut self) -> Option<(PeerId, Bytes)>;
}

/// In-process channel backed by tokio mpsc queues.
#[derive(Debug)]
pub struct MeshChannel {
    local: PeerId,
    outboxes: Vec<mpsc::UnboundedSender<(PeerId, Bytes)>>,
    inbox: mpsc::UnboundedReceiver<(PeerId, Bytes)>,
}

/// Build a fully connected mesh, one channel per peer, indexed by peer id.
pub fn mesh(peers: usize) -> Vec<MeshChannel> {
    let (senders, receivers): (Vec<_>, Vec<_>) =
        (0..peers).map(|_| mpsc::unbounded_channel()).unzip();

    receivers
        .into_iter()
        .enumerate()
        .map(|(index, inbox)| MeshChannel {
            local: PeerId(index as u32),
            outboxes: senders.clone(),
            inbox,
        })
        .collect()
}

#[async_trait]
impl PeerChannel for MeshChannel {
    fn local_peer(&self) -> PeerId {
        self.local
    }

    fn peer_count(&self) -> usize {
        self.outboxes.len()
    }

    async fn send(&self, to: PeerId, bytes: Bytes) -> Result<(), ChannelError> {
        let outbox = self
            .outboxes
            .get(to.index())
            .ok_or(ChannelError::UnknownPeer(to))?;
        outbox
            .send((self.local, bytes))
            .map_err(|_| ChannelError::Closed(to))
    }

    async fn receive_any(&mut self) -> Option<(PeerId, Bytes)> {
        self.inbox.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_send_reaches_only_target() {
        let mut channels = mesh(3);
        channels[0]
            .send(PeerId(2), Bytes::from_static(b"hello"))
            .await
            .unwrap();

        let (from, bytes) = channels[2].receive_any().await.unwrap();
        assert_eq!(from, PeerId(0));
        assert_eq!(&bytes[..], b"hello");
        assert!(channels[1].inbox.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_broadcast_skips_sender() {
        let mut channels = mesh(3);
        channels[1]
            .broadcast(Bytes::from_static(b"all"))
            .await
            .unwrap();

        for peer in [0, 2] {
            let (from, _) = channels[peer].receive_any().await.unwrap();
            assert_eq!(from, PeerId(1));
        }
        assert!(channels[1].inbox.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_per_sender_fifo() {
        let mut channels = mesh(2);
        for i in 0..10u8 {
            channels[0]
                .send(PeerId(1), Bytes::from(vec![i]))
                .await
                .unwrap();
        }
        for i in 0..10u8 {
            let (_, bytes) = channels[1].receive_any().await.unwrap();
            assert_eq!(bytes[0], i);
        }
    }

    #[tokio::test]
    async fn test_send_errors() {
        let mut channels = mesh(2);
        assert_eq!(
            channels[0].send(PeerId(5), Bytes::new()).await,
            Err(ChannelError::UnknownPeer(PeerId(5)))
        );

        let gone = channels.pop().unwrap();
        drop(gone);
        assert_eq!(
            channels[0].broadcast(Bytes::new()).await,
            Err(ChannelError::Closed(PeerId(1)))
        );
    }
}
