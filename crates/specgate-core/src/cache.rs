//! SpecCache - in-memory view of the registry
//!
//! One `parking_lot::RwLock` guards the whole cached state. Loads happen
//! before the lock is taken; the write lock is held only to swap the freshly
//! built state in, so readers always see a complete snapshot. Readers clone a
//! handful of `Arc`s out of the lock and never hold it while resolving or
//! dispatching.

use crate::error::{Error, Result};
use crate::model::{
    Framework, FrameworkVersion, FrameworksConfig, OperationTable, Service, parse_service_key,
};
use crate::store::{SpecStore, load_or_default};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Derived dispatch tables of one cache generation
#[derive(Debug, Default)]
pub struct DispatchTable {
    /// Service key -> dispatch target
    pub services: BTreeMap<String, Service>,
    /// Service key -> operation table
    pub operations: BTreeMap<String, OperationTable>,
    /// Lowercased operation id -> dispatchable service keys defining it
    global_index: BTreeMap<String, Vec<String>>,
}

impl DispatchTable {
    /// Build the tables and the global operation index.
    ///
    /// A service key is dispatchable when it is the active version key of a
    /// registered framework, or when it belongs to no registered framework.
    pub fn build(
        services: BTreeMap<String, Service>,
        operations: BTreeMap<String, OperationTable>,
        frameworks: &FrameworksConfig,
    ) -> Self {
        let mut global_index: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (service_key, table) in &operations {
            if !is_dispatchable(service_key, frameworks) {
                continue;
            }
            for operation_id in table.keys() {
                global_index
                    .entry(operation_id.to_lowercase())
                    .or_default()
                    .push(service_key.clone());
            }
        }
        Self {
            services,
            operations,
            global_index,
        }
    }

    /// Dispatchable service keys defining `operation_id` (case-insensitive)
    pub fn global_candidates(&self, operation_id: &str) -> &[String] {
        self.global_index
            .get(&operation_id.to_lowercase())
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Operation ids defined by more than one dispatchable service key
    pub fn collisions(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.global_index
            .iter()
            .filter(|(_, keys)| keys.len() > 1)
            .map(|(id, keys)| (id.as_str(), keys.as_slice()))
    }

    /// Total number of operations across all service keys
    pub fn operation_count(&self) -> usize {
        self.operations.values().map(BTreeMap::len).sum()
    }
}

fn is_dispatchable(service_key: &str, frameworks: &FrameworksConfig) -> bool {
    let Ok((name, version)) = parse_service_key(service_key) else {
        return true;
    };
    match frameworks.framework(&name) {
        Some(framework) => framework.active_version == version,
        None => true,
    }
}

/// Everything a reader needs, detached from the lock
#[derive(Debug, Clone, Default)]
pub struct CacheSnapshot {
    /// Whether the last init/refresh succeeded at least once
    pub initialized: bool,
    /// Registry document
    pub frameworks: Arc<FrameworksConfig>,
    /// Framework name -> active version
    pub active_versions: Arc<HashMap<String, String>>,
    /// Dispatch tables
    pub table: Arc<DispatchTable>,
}

/// Concurrency-safe cache over a [`SpecStore`]
pub struct SpecCache {
    store: Arc<SpecStore>,
    state: RwLock<CacheSnapshot>,
}

impl SpecCache {
    /// Empty, uninitialized cache. Call [`SpecCache::init`] before use.
    pub fn new(store: Arc<SpecStore>) -> Self {
        Self {
            store,
            state: RwLock::new(CacheSnapshot::default()),
        }
    }

    /// Backing store
    pub fn store(&self) -> &Arc<SpecStore> {
        &self.store
    }

    /// Load all three documents and swap them in.
    ///
    /// On failure the previous state stays in place and the error is wrapped
    /// in [`Error::Init`].
    pub fn init(&self) -> Result<()> {
        let loaded = self.load().map_err(|e| Error::Init(Box::new(e)))?;
        let frameworks = loaded.frameworks.frameworks.len();
        let services = loaded.table.services.len();
        let operations = loaded.table.operation_count();
        *self.state.write() = loaded;
        info!(
            "Spec cache loaded: {} frameworks, {} services, {} operations",
            frameworks, services, operations
        );
        Ok(())
    }

    /// Rebuild the whole cache from disk; same as [`SpecCache::init`]
    pub fn refresh(&self) -> Result<()> {
        debug!("Refreshing spec cache");
        self.init()
    }

    fn load(&self) -> Result<CacheSnapshot> {
        let frameworks = self.store.load_frameworks()?;
        let services = load_or_default(self.store.load_server_info())?.services;
        let operations = load_or_default(self.store.load_operation_info())?.service_actions;

        let active_versions = active_version_map(&frameworks);
        let table = DispatchTable::build(services, operations, &frameworks);
        for (operation_id, keys) in table.collisions() {
            warn!(
                "Operation id '{}' is defined by several dispatchable services: {}",
                operation_id,
                keys.join(", ")
            );
        }

        Ok(CacheSnapshot {
            initialized: true,
            frameworks: Arc::new(frameworks),
            active_versions: Arc::new(active_versions),
            table: Arc::new(table),
        })
    }

    /// Current state; cheap `Arc` clones
    pub fn snapshot(&self) -> CacheSnapshot {
        self.state.read().clone()
    }

    /// Whether a load has succeeded
    pub fn is_initialized(&self) -> bool {
        self.state.read().initialized
    }

    /// Active version of a framework
    pub fn get_active_version(&self, name: &str) -> Result<String> {
        self.state
            .read()
            .active_versions
            .get(name)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("no active version for framework {name}")))
    }

    /// Framework name -> active version, ordered by name
    pub fn all_active_versions(&self) -> BTreeMap<String, String> {
        self.state
            .read()
            .active_versions
            .iter()
            .map(|(name, version)| (name.clone(), version.clone()))
            .collect()
    }

    /// Write the new active version through to the store, then to the cache.
    ///
    /// A failed store write leaves the cache untouched.
    pub fn update_active_version(&self, name: &str, version: &str) -> Result<()> {
        self.store.set_active_version(name, version)?;

        let mut state = self.state.write();
        let mut frameworks = (*state.frameworks).clone();
        if let Some(framework) = frameworks.framework_mut(name) {
            framework.active_version = version.to_string();
        }
        let table = DispatchTable::build(
            state.table.services.clone(),
            state.table.operations.clone(),
            &frameworks,
        );
        state.active_versions = Arc::new(active_version_map(&frameworks));
        state.frameworks = Arc::new(frameworks);
        state.table = Arc::new(table);
        info!("Active version of {} set to {}", name, version);
        Ok(())
    }

    /// All cached frameworks
    pub fn get_cached_frameworks(&self) -> Vec<Framework> {
        self.state.read().frameworks.frameworks.clone()
    }

    /// One cached framework
    pub fn get_cached_framework(&self, name: &str) -> Result<Framework> {
        self.state
            .read()
            .frameworks
            .framework(name)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("framework not found: {name}")))
    }

    /// One cached framework version
    pub fn get_cached_framework_version(
        &self,
        name: &str,
        version: &str,
    ) -> Result<FrameworkVersion> {
        let framework = self.get_cached_framework(name)?;
        framework.version(version).cloned().ok_or_else(|| {
            Error::not_found(format!("version {version} not found for framework {name}"))
        })
    }
}

fn active_version_map(config: &FrameworksConfig) -> HashMap<String, String> {
    config
        .frameworks
        .iter()
        .map(|fw| (fw.name.clone(), fw.active_version.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::make_service_key;
    use crate::resolver::resolve_global;
    use crate::testing::{TestContext, operation, sample_framework, seed_store};
    use std::sync::Barrier;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn seeded_cache(ctx: &TestContext) -> SpecCache {
        let store = seed_store(ctx, "http://127.0.0.1:9");
        let cache = SpecCache::new(Arc::new(store));
        cache.init().unwrap();
        cache
    }

    #[test]
    fn test_init_builds_active_versions() {
        let ctx = TestContext::new();
        let cache = seeded_cache(&ctx);
        assert!(cache.is_initialized());
        assert_eq!(cache.get_active_version("cb-tumblebug").unwrap(), "0.11.13");
        assert_eq!(cache.get_active_version("mc-iam-manager").unwrap(), "0.1.0");
        assert!(cache.get_active_version("unknown").unwrap_err().is_not_found());
        assert_eq!(cache.all_active_versions().len(), 3);
    }

    #[test]
    fn test_init_failure_is_wrapped_and_degraded() {
        let ctx = TestContext::new();
        let cache = SpecCache::new(Arc::new(SpecStore::new(ctx.path())));
        let err = cache.init().unwrap_err();
        assert!(matches!(err, Error::Init(_)));
        assert_eq!(err.status_code(), 500);
        assert!(!cache.is_initialized());
        assert!(cache.get_cached_frameworks().is_empty());
    }

    #[test]
    fn test_failed_refresh_keeps_previous_state() {
        let ctx = TestContext::new();
        let cache = seeded_cache(&ctx);
        std::fs::write(cache.store().frameworks_path(), "frameworks: [broken").unwrap();
        assert!(cache.refresh().is_err());
        assert!(cache.get_cached_framework("cb-spider").is_ok());
    }

    #[test]
    fn test_no_auto_refresh_on_store_write() {
        let ctx = TestContext::new();
        let cache = seeded_cache(&ctx);
        let fw = sample_framework("cm-beetle", &["0.4.0"]);

        cache.store().add_framework(&fw).unwrap();
        assert!(cache.get_cached_framework("cm-beetle").unwrap_err().is_not_found());

        cache.refresh().unwrap();
        assert_eq!(cache.get_cached_framework("cm-beetle").unwrap(), fw);
    }

    #[test]
    fn test_update_active_version() {
        let ctx = TestContext::new();
        let cache = seeded_cache(&ctx);

        cache.update_active_version("mc-iam-manager", "0.2.0").unwrap();
        assert_eq!(cache.get_active_version("mc-iam-manager").unwrap(), "0.2.0");
        assert_eq!(
            cache.get_cached_framework("mc-iam-manager").unwrap().active_version,
            "0.2.0"
        );
        assert_eq!(
            cache.snapshot().table.global_candidates("listusers"),
            ["mc-iam-manager_0.2.0".to_string()]
        );
    }

    #[test]
    fn test_update_active_version_store_failure_leaves_cache() {
        let ctx = TestContext::new();
        let cache = seeded_cache(&ctx);

        let err = cache.update_active_version("mc-iam-manager", "9.9.9").unwrap_err();
        assert!(matches!(err, Error::InvalidReference(_)));
        assert!(cache.update_active_version("missing", "1.0").unwrap_err().is_not_found());
        assert_eq!(cache.get_active_version("mc-iam-manager").unwrap(), "0.1.0");
    }

    #[test]
    fn test_cached_framework_version() {
        let ctx = TestContext::new();
        let cache = seeded_cache(&ctx);
        let version = cache
            .get_cached_framework_version("mc-iam-manager", "0.2.0")
            .unwrap();
        assert_eq!(version.version, "0.2.0");
        assert!(
            cache
                .get_cached_framework_version("mc-iam-manager", "0.3.0")
                .unwrap_err()
                .is_not_found()
        );
    }

    #[test]
    fn test_global_index_only_covers_dispatchable_keys() {
        let ctx = TestContext::new();
        let cache = seeded_cache(&ctx);
        let snapshot = cache.snapshot();

        // Inactive mc-iam-manager_0.2.0 is not part of the global namespace
        assert_eq!(
            snapshot.table.global_candidates("LISTUSERS"),
            ["mc-iam-manager_0.1.0".to_string()]
        );
        assert_eq!(snapshot.table.collisions().count(), 0);
    }

    #[test]
    fn test_collisions_detected_across_frameworks() {
        let ctx = TestContext::new();
        let store = seed_store(&ctx, "http://127.0.0.1:9");
        store
            .replace_operations(
                "cb-spider",
                "0.11.13",
                [("getns".to_string(), operation("get", "/ns"))].into(),
            )
            .unwrap();
        let cache = SpecCache::new(Arc::new(store));
        cache.init().unwrap();

        let snapshot = cache.snapshot();
        let collisions: Vec<_> = snapshot.table.collisions().collect();
        assert_eq!(collisions.len(), 1);
        assert_eq!(collisions[0].0, "getns");
        assert_eq!(collisions[0].1.len(), 2);
    }

    #[test]
    fn test_missing_derived_documents_load_empty() {
        let ctx = TestContext::new();
        let store = SpecStore::new(ctx.path());
        store.ensure_default_frameworks().unwrap();
        let cache = SpecCache::new(Arc::new(store));
        cache.init().unwrap();
        assert!(cache.snapshot().table.services.is_empty());
        assert_eq!(cache.get_cached_frameworks().len(), 2);
    }

    #[test]
    fn test_readers_see_whole_snapshots_during_swaps() {
        let ctx = TestContext::new();
        let cache = seeded_cache(&ctx);
        let readers = 4;
        let barrier = Barrier::new(readers + 1);
        let done = AtomicBool::new(false);

        std::thread::scope(|scope| {
            for _ in 0..readers {
                scope.spawn(|| {
                    barrier.wait();
                    let mut reads = 0usize;
                    while reads == 0 || !done.load(Ordering::Acquire) {
                        let snapshot = cache.snapshot();
                        let active = snapshot.active_versions["mc-iam-manager"].clone();
                        assert!(active == "0.1.0" || active == "0.2.0");

                        let framework = snapshot.frameworks.framework("mc-iam-manager").unwrap();
                        assert_eq!(framework.active_version, active);

                        let resolved = resolve_global(&snapshot, "listUsers").unwrap();
                        assert_eq!(
                            resolved.service_key,
                            make_service_key("mc-iam-manager", &active)
                        );
                        assert_eq!(resolved.spec.resource_path, format!("/{active}/users"));

                        let cached = cache.get_cached_framework("mc-iam-manager").unwrap();
                        assert!(cached.has_version(&cached.active_version));
                        reads += 1;
                    }
                });
            }

            barrier.wait();
            for round in 0..50 {
                let version = if round % 2 == 0 { "0.2.0" } else { "0.1.0" };
                cache.update_active_version("mc-iam-manager", version).unwrap();
                cache.refresh().unwrap();
            }
            done.store(true, Ordering::Release);
        });

        assert_eq!(cache.get_active_version("mc-iam-manager").unwrap(), "0.1.0");
    }
}
