//! Configuration types for groups and the peer transport.

use std::time::Duration;

/// Default number of virtual nodes per peer on the hash ring.
pub const DEFAULT_REPLICAS: usize = 50;

/// Largest frame accepted on the wire.
pub const DEFAULT_MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

/// Configuration for one cache group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupConfig {
    /// Namespace name, unique per registry.
    pub name: String,

    /// Byte budget of the group's local cache. 0 means unbounded.
    pub cache_bytes: usize,
}

impl GroupConfig {
    /// Create a configuration for the named group.
    pub fn new(name: impl Into<String>, cache_bytes: usize) -> Self {
        Self {
            name: name.into(),
            cache_bytes,
        }
    }

    /// Set the cache byte budget.
    pub fn with_cache_bytes(mut self, cache_bytes: usize) -> Self {
        self.cache_bytes = cache_bytes;
        self
    }
}

/// Configuration for the peer pool and its TCP getters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Virtual nodes per peer on the hash ring.
    pub replicas: usize,

    /// Timeout for establishing a connection to a peer.
    pub connect_timeout: Duration,

    /// Timeout for a whole fetch, connection included.
    pub request_timeout: Duration,

    /// Largest frame sent or accepted.
    pub max_frame_bytes: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            replicas: DEFAULT_REPLICAS,
            connect_timeout: Duration::from_secs(2),
            request_timeout: Duration::from_secs(5),
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        }
    }
}

impl PoolConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of virtual nodes per peer.
    pub fn with_replicas(mut self, replicas: usize) -> Self {
        self.replicas = replicas;
        self
    }

    /// Set the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the maximum frame size.
    pub fn with_max_frame_bytes(mut self, max: usize) -> Self {
        self.max_frame_bytes = max;
        self
    }
}
