//! Per-group counters for monitoring.
//!
//! Every [`Group`](crate::group::Group) keeps a [`GroupMetrics`] describing
//! how its lookups were served:
//!
//! ```text
//! get ──► cache hit ─────────────────────────────► cache_hits
//!     └─► miss ──► load (coalesced) ──────────────► loads, loads_deduped
//!                   ├─► peer ──► ok ──────────────► peer_loads
//!                   │        └─► failed ──────────► peer_errors
//!                   └─► local loader ──► ok ──────► local_loads
//!                                    └─► failed ──► local_load_errs
//! ```

mod counters;

pub use counters::{Counter, LabeledCounter};

/// Counters describing how a group served its lookups.
#[derive(Debug)]
pub struct GroupMetrics {
    /// Lookups of any kind, including cache hits.
    pub gets: Counter,
    /// Lookups answered from the local cache.
    pub cache_hits: Counter,
    /// Misses that went through the coalescer.
    pub loads: Counter,
    /// Loads actually executed after coalescing.
    pub loads_deduped: Counter,
    /// Values fetched from a remote peer.
    pub peer_loads: Counter,
    /// Remote fetches that failed and fell back to the loader.
    pub peer_errors: Counter,
    /// Successful local loader calls.
    pub local_loads: Counter,
    /// Failed local loader calls.
    pub local_load_errs: Counter,
    /// Requests received from other peers.
    pub server_requests: Counter,
    /// Errors returned to callers, by kind.
    pub errors: LabeledCounter,
}

impl GroupMetrics {
    pub fn new() -> Self {
        Self {
            gets: Counter::new("group_gets_total", "Total lookups"),
            cache_hits: Counter::new("group_cache_hits_total", "Lookups served from cache"),
            loads: Counter::new("group_loads_total", "Cache misses entering a load"),
            loads_deduped: Counter::new(
                "group_loads_deduped_total",
                "Loads executed after coalescing",
            ),
            peer_loads: Counter::new("group_peer_loads_total", "Values fetched from peers"),
            peer_errors: Counter::new("group_peer_errors_total", "Failed peer fetches"),
            local_loads: Counter::new("group_local_loads_total", "Successful loader calls"),
            local_load_errs: Counter::new("group_local_load_errors_total", "Failed loader calls"),
            server_requests: Counter::new(
                "group_server_requests_total",
                "Requests received from peers",
            ),
            errors: LabeledCounter::new("group_errors_total", "Errors returned by kind", "kind"),
        }
    }

    /// Get a snapshot of current values.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            gets: self.gets.get(),
            cache_hits: self.cache_hits.get(),
            loads: self.loads.get(),
            loads_deduped: self.loads_deduped.get(),
            peer_loads: self.peer_loads.get(),
            peer_errors: self.peer_errors.get(),
            local_loads: self.local_loads.get(),
            local_load_errs: self.local_load_errs.get(),
            server_requests: self.server_requests.get(),
        }
    }

    /// Format metrics in Prometheus exposition format.
    pub fn to_prometheus(&self) -> String {
        let mut output = String::new();
        for counter in [
            &self.gets,
            &self.cache_hits,
            &self.loads,
            &self.loads_deduped,
            &self.peer_loads,
            &self.peer_errors,
            &self.local_loads,
            &self.local_load_errs,
            &self.server_requests,
        ] {
            counter.render(&mut output);
        }
        self.errors.render(&mut output);
        output
    }
}

impl Default for GroupMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// A point-in-time copy of [`GroupMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub gets: u64,
    pub cache_hits: u64,
    pub loads: u64,
    pub loads_deduped: u64,
    pub peer_loads: u64,
    pub peer_errors: u64,
    pub local_loads: u64,
    pub local_load_errs: u64,
    pub server_requests: u64,
}

impl MetricsSnapshot {
    /// Calculate the cache hit rate.
    pub fn hit_rate(&self) -> f64 {
        if self.gets == 0 {
            0.0
        } else {
            self.cache_hits as f64 / self.gets as f64
        }
    }
}
