//! Peer pool: routes keys to their owning peer over TCP.

use crate::config::PoolConfig;
use crate::network::client::TcpPeerGetter;
use crate::partitioning::HashRing;
use crate::peers::{PeerGetter, PeerPicker};
use crate::types::PeerId;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Ring and getters for the current peer set, replaced together.
struct PoolState {
    ring: HashRing,
    getters: HashMap<PeerId, Arc<TcpPeerGetter>>,
}

/// The set of peers this node knows, including itself.
///
/// Keys are assigned with a consistent hash ring over the peer addresses.
/// When a key maps to this node's own address, [`pick_peer`] returns `None`
/// and the group loads it locally.
///
/// [`pick_peer`]: PeerPicker::pick_peer
pub struct PeerPool {
    /// This node's address, as it appears in the peer list.
    self_addr: PeerId,

    config: PoolConfig,

    state: RwLock<PoolState>,
}

impl PeerPool {
    /// Create an empty pool for the node at `self_addr`.
    pub fn new(self_addr: impl Into<String>, config: PoolConfig) -> Self {
        let state = PoolState {
            ring: HashRing::new(config.replicas),
            getters: HashMap::new(),
        };

        Self {
            self_addr: self_addr.into(),
            config,
            state: RwLock::new(state),
        }
    }

    /// This node's address.
    pub fn self_addr(&self) -> &str {
        &self.self_addr
    }

    /// Replace the peer set.
    ///
    /// A fresh ring and getter map are built from `peers` and swapped in
    /// whole, so concurrent lookups see either the old set or the new one.
    pub fn set<I, S>(&self, peers: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut ring = HashRing::new(self.config.replicas);
        let mut getters = HashMap::new();

        for peer in peers {
            let peer = peer.as_ref();
            ring.add([peer]);
            getters
                .entry(peer.to_owned())
                .or_insert_with(|| Arc::new(TcpPeerGetter::new(peer, &self.config)));
        }

        info!(
            self_addr = %self.self_addr,
            peers = ?ring.nodes(),
            "Updated peer set"
        );

        *self.state.write() = PoolState { ring, getters };
    }

    /// Addresses of all known peers, in the order they were set.
    pub fn peers(&self) -> Vec<PeerId> {
        self.state.read().ring.nodes().to_vec()
    }

    /// Address of the peer owning `key`, this node included.
    pub fn owner(&self, key: &str) -> Option<PeerId> {
        self.state.read().ring.get(key).map(str::to_owned)
    }
}

impl PeerPicker for PeerPool {
    fn pick_peer(&self, key: &str) -> Option<Arc<dyn PeerGetter>> {
        let state = self.state.read();
        let owner = state.ring.get(key)?;
        if owner == self.self_addr {
            return None;
        }

        let getter: Arc<dyn PeerGetter> = state.getters.get(owner)?.clone();
        debug!(self_addr = %self.self_addr, peer = owner, key, "Picked peer");
        Some(getter)
    }
}

impl std::fmt::Debug for PeerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerPool")
            .field("self_addr", &self.self_addr)
            .field("peers", &self.peers())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PEERS: [&str; 3] = ["127.0.0.1:8001", "127.0.0.1:8002", "127.0.0.1:8003"];

    #[test]
    fn test_empty_pool_picks_nothing() {
        let pool = PeerPool::new(PEERS[0], PoolConfig::default());
        assert!(pool.pick_peer("Tom").is_none());
        assert!(pool.owner("Tom").is_none());
    }

    #[test]
    fn test_pick_peer_skips_self() {
        let pool = PeerPool::new(PEERS[0], PoolConfig::default());
        pool.set(PEERS);
        assert_eq!(pool.peers(), PEERS.map(String::from).to_vec());

        let mut remote = 0;
        for i in 0..200 {
            let key = format!("key-{}", i);
            let owner = pool.owner(&key).unwrap();
            match pool.pick_peer(&key) {
                Some(peer) => {
                    assert_eq!(peer.addr(), owner);
                    assert_ne!(owner, PEERS[0]);
                    remote += 1;
                }
                None => assert_eq!(owner, PEERS[0]),
            }
        }
        assert!(remote > 0 && remote < 200);
    }

    #[test]
    fn test_only_self_is_always_local() {
        let pool = PeerPool::new(PEERS[1], PoolConfig::default());
        pool.set([PEERS[1]]);
        for key in ["Tom", "Jack", "Sam"] {
            assert!(pool.pick_peer(key).is_none());
        }
    }

    #[test]
    fn test_nodes_agree_on_owners() {
        let pools: Vec<_> = PEERS
            .iter()
            .map(|addr| {
                let pool = PeerPool::new(*addr, PoolConfig::default());
                pool.set(PEERS);
                pool
            })
            .collect();

        for key in ["Tom", "Jack", "Sam", "Unknown"] {
            let owner = pools[0].owner(key).unwrap();
            for pool in &pools {
                assert_eq!(pool.owner(key).unwrap(), owner);
                // Exactly the owner keeps the key local
                assert_eq!(pool.pick_peer(key).is_none(), pool.self_addr() == owner);
            }
        }
    }

    #[test]
    fn test_set_replaces_peers() {
        let pool = PeerPool::new(PEERS[0], PoolConfig::default().with_replicas(10));
        pool.set(PEERS);
        pool.set([PEERS[0], PEERS[2]]);

        assert_eq!(pool.peers().len(), 2);
        for i in 0..100 {
            let owner = pool.owner(&format!("key-{}", i)).unwrap();
            assert_ne!(owner, PEERS[1]);
        }
    }
}
