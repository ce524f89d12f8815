//! Consistent hashing implementation with virtual nodes.
//!
//! Each physical node is represented by `replicas` virtual nodes placed on a
//! 32-bit ring. A key belongs to the first virtual node at or after the key's
//! hash, wrapping around to the smallest position.

use crc::{Crc, CRC_32_ISO_HDLC};
use std::collections::{BTreeMap, HashMap};

/// CRC-32 calculator (IEEE polynomial).
const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Hash function used to place keys and virtual nodes on the ring.
pub type HashFn = fn(&[u8]) -> u32;

/// Default ring hash: CRC-32/IEEE.
pub fn crc32_ieee(data: &[u8]) -> u32 {
    CRC32.checksum(data)
}

/// A consistent hash ring mapping string keys to node identifiers.
///
/// The ring only grows. Membership changes are made by building a new ring
/// and swapping it in whole.
#[derive(Debug, Clone)]
pub struct HashRing {
    /// Virtual node positions mapped to their owning physical node.
    vnodes: BTreeMap<u32, String>,

    /// Number of virtual nodes per physical node.
    replicas: usize,

    /// Physical nodes in insertion order.
    nodes: Vec<String>,

    hash: HashFn,
}

impl HashRing {
    /// Create an empty ring hashing with CRC-32.
    pub fn new(replicas: usize) -> Self {
        Self::with_hasher(replicas, crc32_ieee)
    }

    /// Create an empty ring with a custom hash function.
    pub fn with_hasher(replicas: usize, hash: HashFn) -> Self {
        Self {
            vnodes: BTreeMap::new(),
            replicas: replicas.max(1),
            nodes: Vec::new(),
            hash,
        }
    }

    /// Number of virtual nodes per physical node.
    pub fn replicas(&self) -> usize {
        self.replicas
    }

    /// Get the number of physical nodes in the ring.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Get all physical nodes in the ring.
    pub fn nodes(&self) -> &[String] {
        &self.nodes
    }

    /// Whether no node has been added yet.
    pub fn is_empty(&self) -> bool {
        self.vnodes.is_empty()
    }

    /// Check if a node is in the ring.
    pub fn contains_node(&self, node: &str) -> bool {
        self.nodes.iter().any(|n| n == node)
    }

    /// Add nodes to the ring.
    ///
    /// Virtual node `i` of `node` sits at `hash(i ++ node)`. Adding a node
    /// twice is harmless: its positions are recomputed to the same values.
    /// On a collision between different nodes the later one wins.
    pub fn add<I, S>(&mut self, nodes: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for node in nodes {
            let node = node.as_ref();
            if !self.contains_node(node) {
                self.nodes.push(node.to_owned());
            }

            for i in 0..self.replicas {
                let vnode_key = format!("{}{}", i, node);
                let hash = (self.hash)(vnode_key.as_bytes());
                self.vnodes.insert(hash, node.to_owned());
            }
        }
    }

    /// Get the node owning `key`, or `None` if the ring is empty.
    pub fn get(&self, key: &str) -> Option<&str> {
        if self.vnodes.is_empty() {
            return None;
        }

        let hash = (self.hash)(key.as_bytes());

        // First vnode >= hash, or wrap around to the smallest
        self.vnodes
            .range(hash..)
            .next()
            .or_else(|| self.vnodes.iter().next())
            .map(|(_, node)| node.as_str())
    }

    /// Count how many of `sample_size` synthetic keys each node owns.
    pub fn get_distribution(&self, sample_size: usize) -> HashMap<String, usize> {
        let mut distribution = HashMap::new();

        for i in 0..sample_size {
            let key = format!("sample_key_{}", i);
            if let Some(owner) = self.get(&key) {
                *distribution.entry(owner.to_owned()).or_insert(0) += 1;
            }
        }

        distribution
    }
}
