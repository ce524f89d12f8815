//! Distributed read-through cache with peer-to-peer key ownership.
//!
//! Every node embeds the same set of named cache [`Group`]s. A lookup that
//! misses locally is routed to the peer owning the key on a consistent hash
//! ring. The owner loads the value from the source of truth once, caches it,
//! and serves it to everyone else.
//!
//! # Features
//!
//! - Byte-budgeted LRU caches of immutable byte views
//! - Consistent hashing with virtual nodes for key ownership
//! - Coalescing of concurrent loads for the same key
//! - Length-prefixed bincode RPC between peers over TCP
//! - Fallback to the local loader when a peer is unreachable
//!
//! # Example
//!
//! ```rust,no_run
//! use bytes::Bytes;
//! use peercache::{Error, GroupRegistry, LoaderFn, PeerPool, PeerServer, PoolConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = GroupRegistry::global();
//!     let scores = registry.new_group(
//!         "scores",
//!         2 << 10,
//!         LoaderFn(|key: String| async move {
//!             match key.as_str() {
//!                 "Tom" => Ok(Bytes::from_static(b"630")),
//!                 _ => Err(Error::NotFound(key)),
//!             }
//!         }),
//!     );
//!
//!     // Serve this node's groups to its peers
//!     let (server, _shutdown) = PeerServer::bind("127.0.0.1:8001", registry).await?;
//!     tokio::spawn(server.run());
//!
//!     // Route misses to the owning peer
//!     let pool = Arc::new(PeerPool::new("127.0.0.1:8001", PoolConfig::default()));
//!     pool.set(["127.0.0.1:8001", "127.0.0.1:8002", "127.0.0.1:8003"]);
//!     scores.register_peers(pool)?;
//!
//!     let value = scores.get("Tom").await?;
//!     println!("Tom = {}", value);
//!
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │               Application                   │
//! └─────────────────────────────────────────────┘
//!                      │ get(key)
//!                      ▼
//! ┌─────────────────────────────────────────────┐
//! │                  Group                      │
//! │  BoundedCache ─► SingleFlight ─► Loader     │
//! └─────────────────────────────────────────────┘
//!                      │ miss, remote owner
//!                      ▼
//! ┌──────────────┐          ┌─────────────────┐
//! │   PeerPool   │── TCP ──►│ PeerServer on   │
//! │  (HashRing)  │          │ the owning node │
//! └──────────────┘          └─────────────────┘
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod group;
pub mod metrics;
pub mod network;
pub mod partitioning;
pub mod peers;
pub mod singleflight;
pub mod types;

// Re-export main types for convenience
pub use cache::{BoundedCache, ByteView, EvictionCallback};
pub use config::{GroupConfig, PoolConfig};
pub use error::{Error, NetworkError, Result, Status};
pub use group::{get_group, new_group, Group, GroupBuilder, GroupRegistry, Loader, LoaderFn};
pub use metrics::{GroupMetrics, MetricsSnapshot};
pub use network::{PeerPool, PeerServer, TcpPeerGetter};
pub use partitioning::HashRing;
pub use peers::{NoPeers, PeerGetter, PeerPicker};
pub use singleflight::SingleFlight;
pub use types::{CacheStats, PeerId};
