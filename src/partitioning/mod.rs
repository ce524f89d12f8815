//! Partitioning module for routing keys to peer nodes.
//!
//! This module implements consistent hashing for key ownership, ensuring:
//! - Every node in the fleet agrees on the owner of a key without coordination
//! - Keys spread evenly thanks to virtual nodes
//! - Only a fraction of keys move when membership changes
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         HashRing                             │
//! │  ┌─────┐ ┌─────┐ ┌─────┐ ┌─────┐ ┌─────┐ ┌─────┐           │
//! │  │VN:A │→│VN:B │→│VN:C │→│VN:A │→│VN:B │→│VN:C │→ (wrap)   │
//! │  └─────┘ └─────┘ └─────┘ └─────┘ └─────┘ └─────┘           │
//! │        `replicas` virtual nodes per physical node           │
//! │                                                             │
//! │  Key "Tom" → crc32 → first VN >= hash → "http://b:8002"     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust
//! use peercache::partitioning::HashRing;
//!
//! let mut ring = HashRing::new(50);
//! ring.add(["http://a:8001", "http://b:8002", "http://c:8003"]);
//!
//! let owner = ring.get("Tom").unwrap();
//! assert!(ring.contains_node(owner));
//! ```

mod hashring;

pub use hashring::{crc32_ieee, HashFn, HashRing};
