//! Name-to-group lookup shared by the local API and the peer server.

use super::{Group, GroupBuilder, Loader};
use crate::error::{Error, Result};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

static GLOBAL: Lazy<Arc<GroupRegistry>> = Lazy::new(|| Arc::new(GroupRegistry::new()));

/// A set of groups addressed by name.
///
/// Registration is last-write-wins: registering a name twice replaces the
/// earlier group for subsequent lookups. Holders of the old `Arc<Group>`
/// keep using it.
#[derive(Default)]
pub struct GroupRegistry {
    groups: RwLock<HashMap<String, Arc<Group>>>,
}

impl GroupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry used by [`new_group`] and [`get_group`].
    pub fn global() -> Arc<GroupRegistry> {
        GLOBAL.clone()
    }

    /// Create a group and register it under its name.
    pub fn new_group(
        &self,
        name: impl Into<String>,
        cache_bytes: usize,
        loader: impl Loader,
    ) -> Arc<Group> {
        self.insert(Group::new(name, cache_bytes, loader))
    }

    /// Build a group and register it.
    pub fn register(&self, builder: GroupBuilder) -> Result<Arc<Group>> {
        Ok(self.insert(builder.build()?))
    }

    /// Register an already-built group.
    pub fn insert(&self, group: Group) -> Arc<Group> {
        let group = Arc::new(group);
        let name = group.name().to_owned();

        let previous = self.groups.write().insert(name.clone(), group.clone());
        if previous.is_some() {
            warn!(group = %name, "Replaced existing group");
        } else {
            info!(group = %name, cache_bytes = group.cache_bytes(), "Registered group");
        }
        group
    }

    /// Look up a group by name.
    pub fn get(&self, name: &str) -> Option<Arc<Group>> {
        self.groups.read().get(name).cloned()
    }

    /// Look up a group by name, failing with [`Error::NoSuchGroup`].
    pub fn lookup(&self, name: &str) -> Result<Arc<Group>> {
        self.get(name)
            .ok_or_else(|| Error::NoSuchGroup(name.to_owned()))
    }

    /// Names of all registered groups, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.groups.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.groups.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.read().is_empty()
    }
}

impl std::fmt::Debug for GroupRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroupRegistry")
            .field("groups", &self.names())
            .finish()
    }
}

/// Create a group in the global registry.
pub fn new_group(name: impl Into<String>, cache_bytes: usize, loader: impl Loader) -> Arc<Group> {
    GroupRegistry::global().new_group(name, cache_bytes, loader)
}

/// Look up a group in the global registry.
pub fn get_group(name: &str) -> Option<Arc<Group>> {
    GroupRegistry::global().get(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::group::tests::ScoresDb;

    #[tokio::test]
    async fn test_new_group_and_get() {
        let registry = GroupRegistry::new();
        assert!(registry.get("scores").is_none());

        let group = registry.new_group("scores", 2 << 10, ScoresDb::new());
        let found = registry.get("scores").unwrap();
        assert!(Arc::ptr_eq(&group, &found));
        assert_eq!(found.get("Jack").await.unwrap().to_string(), "589");
        assert_eq!(registry.names(), vec!["scores".to_string()]);
    }

    #[test]
    fn test_lookup_unknown_group() {
        let registry = GroupRegistry::new();
        registry.new_group("scores", 64, ScoresDb::new());

        assert!(registry.lookup("scores").is_ok());
        assert_eq!(
            registry.lookup("nope").unwrap_err(),
            Error::NoSuchGroup("nope".into())
        );
    }

    #[test]
    fn test_last_registration_wins() {
        let registry = GroupRegistry::new();
        let first = registry.new_group("scores", 64, ScoresDb::new());
        let second = registry.new_group("scores", 128, ScoresDb::new());

        assert_eq!(registry.len(), 1);
        let found = registry.get("scores").unwrap();
        assert!(Arc::ptr_eq(&found, &second));
        assert!(!Arc::ptr_eq(&found, &first));
        assert_eq!(found.cache_bytes(), 128);
    }

    #[test]
    fn test_register_builder_without_loader() {
        let registry = GroupRegistry::new();
        let err = registry
            .register(Group::builder("scores", 64))
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_global_registry() {
        let group = new_group("registry-test-global", 1024, ScoresDb::new());
        let found = get_group("registry-test-global").unwrap();
        assert!(Arc::ptr_eq(&group, &found));
        assert_eq!(found.get("Sam").await.unwrap().to_string(), "567");
        assert!(get_group("registry-test-missing").is_none());
    }
}
