//! Cache groups: named read-through namespaces.
//!
//! A [`Group`] answers `get(key)` from its local cache, and on a miss loads
//! the value exactly once per wave of concurrent callers:
//!
//! ```text
//! get(key)
//!   │
//!   ├── empty key ──────────────────────────────► Error::EmptyKey
//!   ├── local cache hit ────────────────────────► value
//!   └── miss ──► SingleFlight ──► PeerPicker
//!                                   ├── remote owner ──► PeerGetter ──► value (not cached)
//!                                   │                     └── failed ──┐
//!                                   └── this node ─────────────────────┴─► Loader ──► cache ──► value
//! ```
//!
//! Values fetched from a peer are never stored locally: only the owner of a
//! key on the hash ring caches it.

mod registry;

pub use registry::{get_group, new_group, GroupRegistry};

use crate::cache::{BoundedCache, ByteView, EvictionCallback};
use crate::config::GroupConfig;
use crate::error::{Error, Result};
use crate::metrics::{GroupMetrics, MetricsSnapshot};
use crate::peers::{PeerGetter, PeerPicker};
use crate::singleflight::SingleFlight;
use crate::types::CacheStats;
use async_trait::async_trait;
use bytes::Bytes;
use once_cell::sync::OnceCell;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

/// Source of truth consulted when no cache has a key.
///
/// Implementations should be idempotent: the group may ask for the same key
/// again after it has been evicted. Return [`Error::NotFound`] for keys the
/// source does not have.
#[async_trait]
pub trait Loader: Send + Sync + 'static {
    async fn load(&self, key: &str) -> Result<Bytes>;
}

#[async_trait]
impl<L: Loader + ?Sized> Loader for Arc<L> {
    async fn load(&self, key: &str) -> Result<Bytes> {
        (**self).load(key).await
    }
}

/// Adapts an async function into a [`Loader`].
///
/// ```rust
/// use bytes::Bytes;
/// use peercache::{Error, LoaderFn};
///
/// let loader = LoaderFn(|key: String| async move {
///     match key.as_str() {
///         "Tom" => Ok(Bytes::from_static(b"630")),
///         _ => Err(Error::NotFound(key)),
///     }
/// });
/// # let _ = loader;
/// ```
pub struct LoaderFn<F>(pub F);

#[async_trait]
impl<F, Fut> Loader for LoaderFn<F>
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Bytes>> + Send + 'static,
{
    async fn load(&self, key: &str) -> Result<Bytes> {
        (self.0)(key.to_owned()).await
    }
}

/// A named cache namespace with its own loader and byte budget.
pub struct Group {
    core: Arc<GroupCore>,

    /// Collapses concurrent loads of the same key.
    flight: SingleFlight<ByteView>,
}

/// State shared with in-flight loads, which outlive the caller that started
/// them.
struct GroupCore {
    name: String,

    /// Called on local misses that no peer answered.
    loader: Arc<dyn Loader>,

    /// Values this node loaded itself.
    main_cache: BoundedCache,

    /// Set at most once, after construction.
    peers: OnceCell<Arc<dyn PeerPicker>>,

    metrics: GroupMetrics,
}

impl Group {
    /// Start building a group.
    pub fn builder(name: impl Into<String>, cache_bytes: usize) -> GroupBuilder {
        GroupBuilder::new(name, cache_bytes)
    }

    /// Create a group with the given loader.
    pub fn new(name: impl Into<String>, cache_bytes: usize, loader: impl Loader) -> Self {
        Self::from_parts(
            GroupConfig::new(name, cache_bytes),
            Arc::new(loader),
            BoundedCache::new(cache_bytes),
        )
    }

    fn from_parts(config: GroupConfig, loader: Arc<dyn Loader>, main_cache: BoundedCache) -> Self {
        let core = GroupCore {
            name: config.name,
            loader,
            main_cache,
            peers: OnceCell::new(),
            metrics: GroupMetrics::new(),
        };

        Self {
            core: Arc::new(core),
            flight: SingleFlight::new(),
        }
    }

    /// The group's name.
    pub fn name(&self) -> &str {
        &self.core.name
    }

    /// Byte budget of the local cache.
    pub fn cache_bytes(&self) -> usize {
        self.core.main_cache.max_bytes()
    }

    /// The local cache, for inspection.
    pub fn cache(&self) -> &BoundedCache {
        &self.core.main_cache
    }

    /// Whether a peer picker has been registered.
    pub fn has_peers(&self) -> bool {
        self.core.peers.get().is_some()
    }

    /// Attach the picker used to route misses to their owning peer.
    ///
    /// May be called once. A second call is a configuration error and
    /// leaves the first picker in place.
    pub fn register_peers(&self, peers: Arc<dyn PeerPicker>) -> Result<()> {
        self.core.peers.set(peers).map_err(|_| {
            Error::Config(format!(
                "register_peers called more than once for group {}",
                self.core.name
            ))
        })
    }

    /// Look up `key`, loading it on a miss.
    ///
    /// Dropping the returned future abandons only this caller. A load it
    /// started keeps running for the callers that joined it and still
    /// populates the cache.
    pub async fn get(&self, key: &str) -> Result<ByteView> {
        let metrics = &self.core.metrics;
        metrics.gets.inc();

        if key.is_empty() {
            metrics.errors.inc(Error::EmptyKey.kind());
            return Err(Error::EmptyKey);
        }

        if let Some(value) = self.core.main_cache.get(key) {
            metrics.cache_hits.inc();
            debug!(group = %self.core.name, key, "cache hit");
            return Ok(value);
        }

        let result = self.load(key).await;
        if let Err(e) = &result {
            metrics.errors.inc(e.kind());
        }
        result
    }

    async fn load(&self, key: &str) -> Result<ByteView> {
        self.core.metrics.loads.inc();

        let core = self.core.clone();
        let owned_key = key.to_owned();
        self.flight
            .work(key, move || core.load_once(owned_key))
            .await
    }

    /// Group counters.
    pub fn metrics(&self) -> &GroupMetrics {
        &self.core.metrics
    }

    /// Snapshot of the group counters.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.core.metrics.snapshot()
    }

    /// Local cache statistics.
    pub fn stats(&self) -> CacheStats {
        self.core.main_cache.stats()
    }
}

impl GroupCore {
    /// Body of a coalesced load: try the owning peer, then the loader.
    async fn load_once(self: Arc<Self>, key: String) -> Result<ByteView> {
        self.metrics.loads_deduped.inc();

        if let Some(peer) = self.peers.get().and_then(|picker| picker.pick_peer(&key)) {
            match self.get_from_peer(peer.as_ref(), &key).await {
                Ok(value) => {
                    self.metrics.peer_loads.inc();
                    return Ok(value);
                }
                Err(e) => {
                    self.metrics.peer_errors.inc();
                    warn!(
                        group = %self.name,
                        key = %key,
                        peer = peer.addr(),
                        error = %e,
                        "Failed to get from peer, loading locally"
                    );
                }
            }
        }

        self.get_locally(&key).await
    }

    async fn get_from_peer(&self, peer: &dyn PeerGetter, key: &str) -> Result<ByteView> {
        let bytes = peer.get(&self.name, key).await?;
        Ok(ByteView::from(bytes))
    }

    async fn get_locally(&self, key: &str) -> Result<ByteView> {
        match self.loader.load(key).await {
            Ok(bytes) => {
                self.metrics.local_loads.inc();
                // The loader's buffer may be shared with its caller
                let value = ByteView::copy_from_slice(&bytes);
                self.main_cache.add(key, value.clone());
                Ok(value)
            }
            Err(e) => {
                self.metrics.local_load_errs.inc();
                debug!(group = %self.name, key, error = %e, "Loader failed");
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for Group {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Group")
            .field("name", &self.core.name)
            .field("cache", &self.core.main_cache)
            .field("has_peers", &self.has_peers())
            .field("in_flight", &self.flight.in_flight())
            .finish()
    }
}

/// Builder for [`Group`]. A loader is required.
#[must_use]
pub struct GroupBuilder {
    config: GroupConfig,
    loader: Option<Arc<dyn Loader>>,
    on_evicted: Option<EvictionCallback>,
}

impl GroupBuilder {
    pub fn new(name: impl Into<String>, cache_bytes: usize) -> Self {
        Self::from_config(GroupConfig::new(name, cache_bytes))
    }

    pub fn from_config(config: GroupConfig) -> Self {
        Self {
            config,
            loader: None,
            on_evicted: None,
        }
    }

    /// Set the loader.
    pub fn loader(mut self, loader: impl Loader) -> Self {
        self.loader = Some(Arc::new(loader));
        self
    }

    /// Report entries evicted from the local cache.
    pub fn on_evicted(mut self, callback: EvictionCallback) -> Self {
        self.on_evicted = Some(callback);
        self
    }

    /// Build the group, failing if no loader was set.
    pub fn build(self) -> Result<Group> {
        let loader = self.loader.ok_or_else(|| {
            Error::Config(format!("group {} has no loader", self.config.name))
        })?;

        let cache = match self.on_evicted {
            Some(callback) => BoundedCache::with_eviction_callback(self.config.cache_bytes, callback),
            None => BoundedCache::new(self.config.cache_bytes),
        };

        Ok(Group::from_parts(self.config, loader, cache))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::NetworkError;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Barrier;

    /// The "scores" table, with per-key loader call counts.
    pub(crate) struct ScoresDb {
        data: HashMap<&'static str, &'static str>,
        calls: Mutex<HashMap<String, usize>>,
        total: AtomicUsize,
        delay: Duration,
    }

    impl ScoresDb {
        pub(crate) fn new() -> Arc<Self> {
            Self::with_delay(Duration::ZERO)
        }

        pub(crate) fn with_delay(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                data: HashMap::from([("Tom", "630"), ("Jack", "589"), ("Sam", "567")]),
                calls: Mutex::new(HashMap::new()),
                total: AtomicUsize::new(0),
                delay,
            })
        }

        pub(crate) fn calls(&self, key: &str) -> usize {
            self.calls.lock().get(key).copied().unwrap_or(0)
        }

        pub(crate) fn total_calls(&self) -> usize {
            self.total.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Loader for ScoresDb {
        async fn load(&self, key: &str) -> Result<Bytes> {
            self.total.fetch_add(1, Ordering::SeqCst);
            *self.calls.lock().entry(key.to_owned()).or_insert(0) += 1;

            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }

            match self.data.get(key) {
                Some(value) => Ok(Bytes::from_static(value.as_bytes())),
                None => Err(Error::NotFound(key.to_owned())),
            }
        }
    }

    /// A peer that answers every key with a fixed value, or always fails.
    struct StaticPeer {
        value: Option<&'static str>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl PeerGetter for StaticPeer {
        async fn get(&self, group: &str, _key: &str) -> Result<Bytes> {
            assert_eq!(group, "scores");
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.value.map(|v| Bytes::from_static(v.as_bytes())).ok_or_else(|| {
                NetworkError::ConnectionFailed {
                    addr: "http://peer:8002".into(),
                    reason: "connection refused".into(),
                }
                .into()
            })
        }

        fn addr(&self) -> &str {
            "http://peer:8002"
        }
    }

    /// Routes the listed keys to one peer and everything else locally.
    struct StaticPicker {
        remote_keys: Vec<&'static str>,
        peer: Arc<StaticPeer>,
    }

    impl StaticPicker {
        fn new(remote_keys: Vec<&'static str>, value: Option<&'static str>) -> Arc<Self> {
            Arc::new(Self {
                remote_keys,
                peer: Arc::new(StaticPeer {
                    value,
                    calls: AtomicUsize::new(0),
                }),
            })
        }
    }

    impl PeerPicker for StaticPicker {
        fn pick_peer(&self, key: &str) -> Option<Arc<dyn PeerGetter>> {
            if self.remote_keys.contains(&key) {
                let peer: Arc<dyn PeerGetter> = self.peer.clone();
                Some(peer)
            } else {
                None
            }
        }
    }

    fn scores_group(db: &Arc<ScoresDb>) -> Group {
        Group::new("scores", 2 << 10, db.clone())
    }

    #[tokio::test]
    async fn test_get_loads_then_caches() {
        let db = ScoresDb::new();
        let group = scores_group(&db);

        for _ in 0..2 {
            let value = group.get("Tom").await.unwrap();
            assert_eq!(value.as_slice(), b"630");
        }
        assert_eq!(db.calls("Tom"), 1);
        assert_eq!(group.cache().len(), 1);

        let snapshot = group.metrics_snapshot();
        assert_eq!(snapshot.gets, 2);
        assert_eq!(snapshot.cache_hits, 1);
        assert_eq!(snapshot.local_loads, 1);
    }

    #[tokio::test]
    async fn test_unknown_key_is_not_found_and_not_cached() {
        let db = ScoresDb::new();
        let group = scores_group(&db);

        assert_eq!(
            group.get("Unknown").await,
            Err(Error::NotFound("Unknown".into()))
        );
        assert_eq!(db.calls("Unknown"), 1);

        // Negative results are not cached
        assert!(group.get("Unknown").await.is_err());
        assert_eq!(db.calls("Unknown"), 2);
        assert!(group.cache().is_empty());
        assert_eq!(group.metrics().errors.get("not_found"), 2);
    }

    #[tokio::test]
    async fn test_every_score_loads_once() {
        let db = ScoresDb::new();
        let group = scores_group(&db);

        for (key, value) in [("Tom", "630"), ("Jack", "589"), ("Sam", "567")] {
            assert_eq!(group.get(key).await.unwrap().to_string(), value);
            assert_eq!(group.get(key).await.unwrap().to_string(), value);
            assert_eq!(db.calls(key), 1, "cache {} miss", key);
        }
    }

    #[tokio::test]
    async fn test_empty_key_rejected() {
        let db = ScoresDb::new();
        let group = scores_group(&db);

        assert_eq!(group.get("").await, Err(Error::EmptyKey));
        assert_eq!(db.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_remote_value_is_not_cached_locally() {
        let db = ScoresDb::new();
        let group = scores_group(&db);
        let picker = StaticPicker::new(vec!["Tom"], Some("630"));
        group.register_peers(picker.clone()).unwrap();

        let value = group.get("Tom").await.unwrap();
        assert_eq!(value.as_slice(), b"630");
        assert_eq!(group.cache().len(), 0);
        assert_eq!(db.total_calls(), 0);

        // Still not cached, so the peer is asked again
        group.get("Tom").await.unwrap();
        assert_eq!(picker.peer.calls.load(Ordering::SeqCst), 2);
        assert_eq!(group.metrics_snapshot().peer_loads, 2);
    }

    #[tokio::test]
    async fn test_peer_failure_falls_back_to_loader() {
        let db = ScoresDb::new();
        let group = scores_group(&db);
        let picker = StaticPicker::new(vec!["Tom"], None);
        group.register_peers(picker.clone()).unwrap();

        let value = group.get("Tom").await.unwrap();
        assert_eq!(value.as_slice(), b"630");
        assert_eq!(picker.peer.calls.load(Ordering::SeqCst), 1);
        assert_eq!(db.calls("Tom"), 1);

        // Loaded locally, so it is cached here
        assert!(group.cache().contains("Tom"));
        group.get("Tom").await.unwrap();
        assert_eq!(picker.peer.calls.load(Ordering::SeqCst), 1);

        let snapshot = group.metrics_snapshot();
        assert_eq!(snapshot.peer_errors, 1);
        assert_eq!(snapshot.local_loads, 1);
    }

    #[tokio::test]
    async fn test_keys_owned_locally_skip_peers() {
        let db = ScoresDb::new();
        let group = scores_group(&db);
        let picker = StaticPicker::new(vec!["Tom"], Some("999"));
        group.register_peers(picker.clone()).unwrap();

        assert_eq!(group.get("Jack").await.unwrap().to_string(), "589");
        assert_eq!(picker.peer.calls.load(Ordering::SeqCst), 0);
        assert!(group.cache().contains("Jack"));
    }

    #[tokio::test]
    async fn test_register_peers_twice_fails() {
        let db = ScoresDb::new();
        let group = scores_group(&db);

        group
            .register_peers(StaticPicker::new(vec![], None))
            .unwrap();
        let err = group
            .register_peers(StaticPicker::new(vec![], None))
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(group.has_peers());
    }

    #[test]
    fn test_builder_requires_loader() {
        let err = Group::builder("scores", 1024).build().unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let group = Group::builder("scores", 1024)
            .loader(ScoresDb::new())
            .build()
            .unwrap();
        assert_eq!(group.name(), "scores");
        assert_eq!(group.cache_bytes(), 1024);
    }

    #[tokio::test]
    async fn test_builder_eviction_callback() {
        let evicted = Arc::new(Mutex::new(Vec::new()));
        let sink = evicted.clone();

        // "Tom630" and "Jack589" are 6 and 7 bytes
        let group = Group::builder("scores", 10)
            .loader(ScoresDb::new())
            .on_evicted(Arc::new(move |key: &str, _: &ByteView| {
                sink.lock().push(key.to_owned());
            }))
            .build()
            .unwrap();

        group.get("Tom").await.unwrap();
        group.get("Jack").await.unwrap();

        assert_eq!(*evicted.lock(), vec!["Tom".to_string()]);
        assert!(!group.cache().contains("Tom"));
        assert!(group.cache().contains("Jack"));
    }

    #[tokio::test]
    async fn test_loader_fn() {
        let group = Group::new(
            "scores",
            0,
            LoaderFn(|key: String| async move {
                if key == "Tom" {
                    Ok(Bytes::from_static(b"630"))
                } else {
                    Err(Error::NotFound(key))
                }
            }),
        );

        assert_eq!(group.get("Tom").await.unwrap().to_string(), "630");
        assert!(matches!(group.get("Sam").await, Err(Error::NotFound(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_misses_load_once() {
        const CALLERS: usize = 16;

        let db = ScoresDb::with_delay(Duration::from_millis(200));
        let group = Arc::new(scores_group(&db));
        let barrier = Arc::new(Barrier::new(CALLERS));

        let handles: Vec<_> = (0..CALLERS)
            .map(|_| {
                let group = group.clone();
                let barrier = barrier.clone();
                tokio::spawn(async move {
                    barrier.wait().await;
                    group.get("Tom").await
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap().as_slice(), b"630");
        }
        assert_eq!(db.calls("Tom"), 1);
        assert_eq!(group.metrics_snapshot().loads_deduped, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_timed_out_caller_does_not_rerun_load() {
        let db = ScoresDb::with_delay(Duration::from_millis(200));
        let group = Arc::new(scores_group(&db));

        let impatient = {
            let group = group.clone();
            tokio::spawn(async move {
                tokio::time::timeout(Duration::from_millis(50), group.get("Tom")).await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        let value = group.get("Tom").await.unwrap();
        assert_eq!(value.to_string(), "630");
        assert!(impatient.await.unwrap().is_err());

        assert_eq!(db.calls("Tom"), 1);
        assert!(group.cache().contains("Tom"));
        assert_eq!(group.flight.in_flight(), 0);
    }
}
