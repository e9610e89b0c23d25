// Copyright (c) Hetu Project
// SPDX-License-Identifier: Apache-2.0

//! Consensus message broadcasting
//!
//! The engine hands encoded messages to a [`ConsensusBroadcaster`] and never
//! sees the transport behind it. A node does not receive its own broadcasts;
//! the engine processes its messages locally.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tessera_types::Address;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BroadcastError {
    #[error("Peer {0} disconnected")]
    Disconnected(Address),

    #[error("Transport error: {0}")]
    Transport(String),
}

pub type BroadcastResult<T> = Result<T, BroadcastError>;

#[async_trait]
pub trait ConsensusBroadcaster: Send + Sync {
    /// Deliver `message` to every other validator.
    async fn broadcast(&self, message: Vec<u8>) -> BroadcastResult<()>;
}

/// Drops everything; for single-node setups.
#[derive(Debug, Default)]
pub struct NoOpBroadcaster;

#[async_trait]
impl ConsensusBroadcaster for NoOpBroadcaster {
    async fn broadcast(&self, _message: Vec<u8>) -> BroadcastResult<()> {
        Ok(())
    }
}

/// Records broadcasts for inspection in tests.
#[derive(Debug, Default)]
pub struct MockBroadcaster {
    sent: Mutex<Vec<Vec<u8>>>,
}

impl MockBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.sent.lock().clone()
    }

    pub fn take(&self) -> Vec<Vec<u8>> {
        std::mem::take(&mut *self.sent.lock())
    }
}

#[async_trait]
impl ConsensusBroadcaster for MockBroadcaster {
    async fn broadcast(&self, message: Vec<u8>) -> BroadcastResult<()> {
        self.sent.lock().push(message);
        Ok(())
    }
}

/// In-process transport over Tokio channels, one inbox per peer.
///
/// Delivery to each reachable peer is attempted even when another peer is
/// gone; the first failure is reported.
#[derive(Debug, Default)]
pub struct ChannelBroadcaster {
    peers: RwLock<Vec<(Address, mpsc::UnboundedSender<Vec<u8>>)>>,
}

impl ChannelBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_peer(&self, address: Address, inbox: mpsc::UnboundedSender<Vec<u8>>) {
        self.peers.write().push((address, inbox));
    }

    pub fn remove_peer(&self, address: &Address) {
        self.peers.write().retain(|(peer, _)| peer != address);
    }

    pub fn peer_count(&self) -> usize {
        self.peers.read().len()
    }

    /// Wire `addresses` into a full mesh. Returns one broadcaster and one
    /// inbox per address, in order.
    pub fn mesh(
        addresses: &[Address],
    ) -> Vec<(Arc<ChannelBroadcaster>, mpsc::UnboundedReceiver<Vec<u8>>)> {
        let channels: Vec<_> = addresses
            .iter()
            .map(|_| mpsc::unbounded_channel::<Vec<u8>>())
            .collect();
        let senders: Vec<_> = channels.iter().map(|(tx, _)| tx.clone()).collect();

        channels
            .into_iter()
            .enumerate()
            .map(|(i, (_, rx))| {
                let broadcaster = Arc::new(ChannelBroadcaster::new());
                for (j, tx) in senders.iter().enumerate() {
                    if i != j {
                        broadcaster.add_peer(addresses[j], tx.clone());
                    }
                }
                (broadcaster, rx)
            })
            .collect()
    }
}

#[async_trait]
impl ConsensusBroadcaster for ChannelBroadcaster {
    async fn broadcast(&self, message: Vec<u8>) -> BroadcastResult<()> {
        let mut first_error = None;
        for (address, inbox) in self.peers.read().iter() {
            if inbox.send(message.clone()).is_err() && first_error.is_none() {
                first_error = Some(BroadcastError::Disconnected(*address));
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addresses(count: u8) -> Vec<Address> {
        (1..=count).map(|i| Address::new([i; 20])).collect()
    }

    #[tokio::test]
    async fn test_mesh_skips_sender() {
        let mut mesh = ChannelBroadcaster::mesh(&addresses(3));
        assert!(mesh.iter().all(|(b, _)| b.peer_count() == 2));

        mesh[0].0.broadcast(b"hello".to_vec()).await.unwrap();
        assert!(mesh[0].1.try_recv().is_err());
        assert_eq!(mesh[1].1.recv().await.unwrap(), b"hello".to_vec());
        assert_eq!(mesh[2].1.recv().await.unwrap(), b"hello".to_vec());
    }

    #[tokio::test]
    async fn test_closed_inbox_reports_peer() {
        let addrs = addresses(3);
        let mut mesh = ChannelBroadcaster::mesh(&addrs);
        let (_, inbox) = mesh.remove(1);
        drop(inbox);

        let err = mesh[0].0.broadcast(vec![1]).await.unwrap_err();
        assert_eq!(err, BroadcastError::Disconnected(addrs[1]));
        // the live peer still got it
        assert_eq!(mesh[1].1.recv().await.unwrap(), vec![1]);

        mesh[0].0.remove_peer(&addrs[1]);
        assert!(mesh[0].0.broadcast(vec![2]).await.is_ok());
    }

    #[tokio::test]
    async fn test_mock_records() {
        let mock = MockBroadcaster::new();
        mock.broadcast(vec![1]).await.unwrap();
        mock.broadcast(vec![2]).await.unwrap();
        assert_eq!(mock.sent(), vec![vec![1], vec![2]]);
        assert_eq!(mock.take().len(), 2);
        assert!(mock.sent().is_empty());
        assert!(NoOpBroadcaster.broadcast(vec![3]).await.is_ok());
    }
}
