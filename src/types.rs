//! Core types used throughout the peer cache.

/// Peer identifier: the base address other nodes use to reach it.
///
/// Used both as a hash ring node and as the key of the peer getter map.
pub type PeerId = String;

/// Local cache statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of resident entries.
    pub entries: u64,
    /// Bytes accounted to keys and values.
    pub bytes: u64,
    /// Number of lookups that found an entry.
    pub hits: u64,
    /// Number of lookups that found nothing.
    pub misses: u64,
    /// Entries removed by eviction or explicit removal.
    pub evictions: u64,
}

impl CacheStats {
    /// Fraction of lookups that hit, 0.0 when there were none.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
