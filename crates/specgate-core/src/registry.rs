//! Registry management service
//!
//! Cold-path operations behind the management API. Every mutation goes
//! through [`SpecStore`](crate::SpecStore) and is followed by a whole-cache
//! refresh; reads are served from the cache.

use crate::cache::SpecCache;
use crate::error::{Error, Result};
use crate::model::{Framework, FrameworkVersion, OperationTable, make_service_key};
use crate::swagger::SwaggerIngester;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};
use tracing::{error, info, warn};

/// Base URL of one service, without credentials
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiHost {
    /// Base URL, or its `:port/path` tail in iframe mode
    #[serde(rename = "BaseURL")]
    pub base_url: String,
}

/// Result of a full synchronization
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Versions synced
    pub succeeded: usize,
    /// Versions that failed
    pub failed: usize,
    /// One message per failure
    pub errors: Vec<String>,
}

impl SyncReport {
    /// `N succeeded, M failed`
    pub fn summary(&self) -> String {
        format!("{} succeeded, {} failed", self.succeeded, self.failed)
    }
}

/// Counts reported by the health endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegistryStats {
    /// Whether the cache has loaded at least once
    pub initialized: bool,
    /// Registered frameworks
    pub frameworks: usize,
    /// Server-info entries
    pub services: usize,
    /// Operations across all service keys
    pub operations: usize,
}

/// Management operations over the registry
pub struct Registry {
    cache: Arc<SpecCache>,
    ingester: SwaggerIngester,
    iframe_target_is_host: bool,
}

impl Registry {
    /// Registry over `cache`, fetching swagger documents with `ingester`
    pub fn new(cache: Arc<SpecCache>, ingester: SwaggerIngester) -> Self {
        Self {
            cache,
            ingester,
            iframe_target_is_host: false,
        }
    }

    /// Rewrite API host base URLs to their `:port/path` tail
    pub fn with_iframe_target_is_host(mut self, enabled: bool) -> Self {
        self.iframe_target_is_host = enabled;
        self
    }

    /// Underlying cache
    pub fn cache(&self) -> &Arc<SpecCache> {
        &self.cache
    }

    /// Prepare the conf directory and load the cache.
    ///
    /// Writes the default registry when `frameworks.yaml` is missing,
    /// generates the server-info document when it is missing and ingests the
    /// active version of every framework when the operation-info document is
    /// missing. Every failure is logged and startup continues; dispatch then
    /// answers `NotFound` until a refresh succeeds.
    pub async fn bootstrap(&self) {
        let store = self.cache.store().clone();
        if let Err(e) = store.ensure_default_frameworks() {
            warn!("Failed to create default frameworks.yaml: {}", e);
        }

        if let Err(e) = self.cache.init() {
            warn!("Failed to initialize spec cache: {}", e);
            warn!("Server will continue in degraded mode; dispatch is unavailable until a refresh succeeds");
            return;
        }

        let snapshot = self.cache.snapshot();
        if !store.server_info_path().exists() {
            info!("apiServerInfo.yaml not found, generating");
            if let Err(e) = store.generate_server_info(&snapshot.frameworks) {
                warn!("Failed to generate apiServerInfo.yaml: {}", e);
            }
        }

        if !store.operation_info_path().exists() {
            info!("apiOperationInfo.yaml not found, ingesting active versions");
            for framework in &snapshot.frameworks.frameworks {
                let Some(version) = framework.active().filter(|v| v.enabled) else {
                    continue;
                };
                if let Err(e) = self.ingest_operations(&framework.name, version).await {
                    warn!(
                        "Failed to ingest operations for {} {}: {}",
                        framework.name, version.version, e
                    );
                }
            }
        }

        if let Err(e) = self.cache.refresh() {
            warn!("Failed to refresh spec cache after bootstrap: {}", e);
        }
    }

    // ---------------------------------------------------------------------
    // Frameworks
    // ---------------------------------------------------------------------

    /// All frameworks
    pub fn list_frameworks(&self) -> Vec<Framework> {
        self.cache.get_cached_frameworks()
    }

    /// One framework
    pub fn get_framework(&self, name: &str) -> Result<Framework> {
        self.cache.get_cached_framework(name)
    }

    /// Register a framework
    pub fn create_framework(&self, framework: Framework) -> Result<Framework> {
        validate_framework_fields(&framework)?;
        self.cache.store().add_framework(&framework)?;
        self.refresh_after_commit();
        info!("Created framework {}", framework.name);
        Ok(framework)
    }

    /// Replace a framework
    pub fn update_framework(&self, name: &str, framework: Framework) -> Result<Framework> {
        validate_framework_fields(&framework)?;
        self.cache.store().update_framework(name, &framework)?;
        self.refresh_after_commit();
        info!("Updated framework {}", name);
        Ok(framework)
    }

    /// Remove a framework
    pub fn delete_framework(&self, name: &str) -> Result<()> {
        self.cache.store().delete_framework(name)?;
        self.refresh_after_commit();
        info!("Deleted framework {}", name);
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Versions
    // ---------------------------------------------------------------------

    /// Versions of a framework
    pub fn list_versions(&self, name: &str) -> Result<Vec<FrameworkVersion>> {
        Ok(self.cache.get_cached_framework(name)?.versions)
    }

    /// Add a version
    pub fn add_version(&self, name: &str, version: FrameworkVersion) -> Result<FrameworkVersion> {
        validate_version_fields(&version)?;
        self.cache.store().add_framework_version(name, &version)?;
        self.refresh_after_commit();
        info!("Added version {} to {}", version.version, name);
        Ok(version)
    }

    /// Replace a version
    pub fn update_version(
        &self,
        name: &str,
        version: &str,
        replacement: FrameworkVersion,
    ) -> Result<FrameworkVersion> {
        validate_version_fields(&replacement)?;
        self.cache
            .store()
            .update_framework_version(name, version, &replacement)?;
        self.refresh_after_commit();
        info!("Updated version {} of {}", version, name);
        Ok(replacement)
    }

    /// Remove a version
    pub fn delete_version(&self, name: &str, version: &str) -> Result<()> {
        self.cache.store().delete_framework_version(name, version)?;
        self.refresh_after_commit();
        info!("Deleted version {} of {}", version, name);
        Ok(())
    }

    /// Switch the active version
    pub fn set_active_version(&self, name: &str, version: &str) -> Result<()> {
        if version.is_empty() {
            return Err(Error::validation("version is required"));
        }
        self.cache.update_active_version(name, version)?;
        self.refresh_after_commit();
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Synchronization
    // ---------------------------------------------------------------------

    /// Re-ingest one version's swagger and regenerate its derived entries
    pub async fn sync_version(&self, name: &str, version: &str) -> Result<()> {
        let framework_version = self.cache.get_cached_framework_version(name, version)?;
        self.sync_one(name, &framework_version).await?;
        self.refresh_after_commit();
        Ok(())
    }

    /// Sync every enabled version of every framework.
    ///
    /// Continues past failures; fails with a `Fetch` error carrying the
    /// summary when any version failed.
    pub async fn sync_all(&self) -> Result<SyncReport> {
        info!("Starting full synchronization");
        let config = self.cache.store().load_frameworks()?;
        let mut report = SyncReport::default();

        for framework in &config.frameworks {
            for version in framework.versions.iter().filter(|v| v.enabled) {
                match self.sync_one(&framework.name, version).await {
                    Ok(()) => report.succeeded += 1,
                    Err(e) => {
                        error!("Sync of {} {} failed: {}", framework.name, version.version, e);
                        report.failed += 1;
                        report
                            .errors
                            .push(format!("{} {}: {}", framework.name, version.version, e));
                    }
                }
            }
        }

        self.refresh_after_commit();
        info!("Synchronization completed: {}", report.summary());
        if report.failed > 0 {
            return Err(Error::fetch(format!(
                "synchronization completed with errors: {}",
                report.summary()
            )));
        }
        Ok(report)
    }

    async fn sync_one(&self, name: &str, version: &FrameworkVersion) -> Result<()> {
        info!("Syncing {} {}", name, version.version);
        let operations = self.ingester.ingest(&version.swagger_url).await?;
        let store = self.cache.store();
        store.upsert_service(name, version)?;
        store.replace_operations(name, &version.version, operations)
    }

    async fn ingest_operations(&self, name: &str, version: &FrameworkVersion) -> Result<()> {
        let operations = self.ingester.ingest(&version.swagger_url).await?;
        self.cache
            .store()
            .replace_operations(name, &version.version, operations)
    }

    // Store writes have committed by now; a failed refresh keeps the previous
    // cache state.
    fn refresh_after_commit(&self) {
        if let Err(e) = self.cache.refresh() {
            warn!("Spec cache refresh failed, serving the previous state: {}", e);
        }
    }

    // ---------------------------------------------------------------------
    // Read models
    // ---------------------------------------------------------------------

    /// Operation table of a framework version (active version when `None`)
    pub fn operations(
        &self,
        framework: &str,
        version: Option<&str>,
    ) -> Result<(String, OperationTable)> {
        let version = match version.filter(|v| !v.is_empty()) {
            Some(version) => version.to_string(),
            None => self.cache.get_active_version(framework)?,
        };
        let service_key = make_service_key(framework, &version);
        let snapshot = self.cache.snapshot();
        let table = snapshot
            .table
            .operations
            .get(&service_key)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("no operations found for {service_key}")))?;
        Ok((service_key, table))
    }

    /// Same as [`Registry::operations`], rendered as YAML
    pub fn operations_yaml(&self, framework: &str, version: Option<&str>) -> Result<String> {
        let (_, table) = self.operations(framework, version)?;
        serde_yaml::to_string(&table)
            .map_err(|e| Error::decode(format!("failed to convert operations to yaml: {e}")))
    }

    /// Framework name -> active version
    pub fn active_versions(&self) -> BTreeMap<String, String> {
        self.cache.all_active_versions()
    }

    /// Service key -> base URL of every server-info entry
    pub fn api_hosts(&self) -> BTreeMap<String, ApiHost> {
        let snapshot = self.cache.snapshot();
        snapshot
            .table
            .services
            .iter()
            .map(|(key, service)| {
                let base_url = if self.iframe_target_is_host {
                    port_tail(&service.base_url).unwrap_or(&service.base_url)
                } else {
                    &service.base_url
                };
                (
                    key.clone(),
                    ApiHost {
                        base_url: base_url.to_string(),
                    },
                )
            })
            .collect()
    }

    /// Health counters
    pub fn stats(&self) -> RegistryStats {
        let snapshot = self.cache.snapshot();
        RegistryStats {
            initialized: snapshot.initialized,
            frameworks: snapshot.frameworks.frameworks.len(),
            services: snapshot.table.services.len(),
            operations: snapshot.table.operation_count(),
        }
    }
}

/// `:port/path` tail of a URL, e.g. `:1024/spider` for `http://cb-spider:1024/spider`
pub fn port_tail(base_url: &str) -> Option<&str> {
    PORT_AND_PATH
        .as_ref()?
        .find(base_url)
        .map(|m| m.as_str())
}

static PORT_AND_PATH: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r":(\d+.*)").ok());

fn validate_framework_fields(framework: &Framework) -> Result<()> {
    if framework.name.is_empty() {
        return Err(Error::validation("name is required"));
    }
    if framework.display_name.is_empty() {
        return Err(Error::validation("displayName is required"));
    }
    if framework.active_version.is_empty() {
        return Err(Error::validation("activeVersion is required"));
    }
    if framework.versions.is_empty() {
        return Err(Error::validation("at least one version is required"));
    }
    framework.versions.iter().try_for_each(validate_version_fields)
}

fn validate_version_fields(version: &FrameworkVersion) -> Result<()> {
    if version.version.is_empty() {
        return Err(Error::validation("version is required"));
    }
    if version.swagger_url.is_empty() {
        return Err(Error::validation("swaggerUrl is required"));
    }
    if version.base_url.is_empty() {
        return Err(Error::validation("baseUrl is required"));
    }
    Ok(())
}
