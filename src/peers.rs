//! Peer capabilities consumed by a [`Group`](crate::group::Group).
//!
//! The group only needs two things from the transport: a way to find the
//! peer that owns a key, and a way to ask that peer for a value. The TCP
//! implementations live in [`network`](crate::network).

use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;

/// Locates the peer that owns a key.
pub trait PeerPicker: Send + Sync + 'static {
    /// Return the owning peer, or `None` when the key belongs to this node
    /// (or no peers are known).
    fn pick_peer(&self, key: &str) -> Option<Arc<dyn PeerGetter>>;
}

/// Fetches values from one remote peer.
#[async_trait]
pub trait PeerGetter: Send + Sync + 'static {
    /// Fetch the value of `key` in the peer's group `group`.
    async fn get(&self, group: &str, key: &str) -> Result<Bytes>;

    /// Address of the peer, for logging.
    fn addr(&self) -> &str;
}

/// A picker that never returns a peer, so every miss is loaded locally.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPeers;

impl PeerPicker for NoPeers {
    fn pick_peer(&self, _key: &str) -> Option<Arc<dyn PeerGetter>> {
        None
    }
}
