//! SpecStore - durable CRUD over the registry documents
//!
//! Every mutation is a whole-document load -> mutate -> save. Saves go through
//! a sibling temp file that is renamed over the target, so readers never see a
//! half-written document. There is no multi-writer transaction support:
//! concurrent mutations race and the last save wins.

use crate::error::{Error, Result};
use crate::model::{
    AuthType, Framework, FrameworkVersion, FrameworksConfig, OperationInfoDocument,
    OperationTable, ServerInfoDocument, Service, make_service_key, parse_service_key,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// File name of the authoritative registry document
pub const FRAMEWORKS_FILE: &str = "frameworks.yaml";
/// File name of the derived server-info document
pub const SERVER_INFO_FILE: &str = "apiServerInfo.yaml";
/// File name of the derived operation-info document
pub const OPERATION_INFO_FILE: &str = "apiOperationInfo.yaml";

/// File-backed registry storage
#[derive(Debug, Clone)]
pub struct SpecStore {
    frameworks_path: PathBuf,
    server_info_path: PathBuf,
    operation_info_path: PathBuf,
}

impl SpecStore {
    /// Store rooted at a conf directory holding the three documents
    pub fn new(conf_dir: impl AsRef<Path>) -> Self {
        let dir = conf_dir.as_ref();
        Self {
            frameworks_path: dir.join(FRAMEWORKS_FILE),
            server_info_path: dir.join(SERVER_INFO_FILE),
            operation_info_path: dir.join(OPERATION_INFO_FILE),
        }
    }

    /// Path of `frameworks.yaml`
    pub fn frameworks_path(&self) -> &Path {
        &self.frameworks_path
    }

    /// Path of `apiServerInfo.yaml`
    pub fn server_info_path(&self) -> &Path {
        &self.server_info_path
    }

    /// Path of `apiOperationInfo.yaml`
    pub fn operation_info_path(&self) -> &Path {
        &self.operation_info_path
    }

    // ---------------------------------------------------------------------
    // frameworks.yaml
    // ---------------------------------------------------------------------

    /// Read and decode `frameworks.yaml`
    pub fn load_frameworks(&self) -> Result<FrameworksConfig> {
        read_yaml(&self.frameworks_path)
    }

    /// Rewrite `frameworks.yaml` as a whole
    pub fn save_frameworks(&self, config: &FrameworksConfig) -> Result<()> {
        write_yaml(&self.frameworks_path, config)
    }

    /// Write the bundled default registry when `frameworks.yaml` is missing.
    ///
    /// Returns `true` when a file was created.
    pub fn ensure_default_frameworks(&self) -> Result<bool> {
        if self.frameworks_path.exists() {
            return Ok(false);
        }
        if let Some(parent) = self.frameworks_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        info!(
            "{} not found, writing default registry to {:?}",
            FRAMEWORKS_FILE, self.frameworks_path
        );
        self.save_frameworks(&default_frameworks())?;
        Ok(true)
    }

    /// Framework by name, read straight from disk
    pub fn get_framework(&self, name: &str) -> Result<Framework> {
        let config = self.load_frameworks()?;
        config
            .framework(name)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("framework not found: {name}")))
    }

    /// Framework version, read straight from disk
    pub fn get_framework_version(&self, name: &str, version: &str) -> Result<FrameworkVersion> {
        let framework = self.get_framework(name)?;
        framework.version(version).cloned().ok_or_else(|| {
            Error::not_found(format!("version {version} not found for framework {name}"))
        })
    }

    /// Register a new framework
    pub fn add_framework(&self, framework: &Framework) -> Result<()> {
        validate_framework(framework)?;
        let mut config = self.load_frameworks()?;
        if config.framework(&framework.name).is_some() {
            return Err(Error::already_exists(format!(
                "framework already exists: {}",
                framework.name
            )));
        }
        config.frameworks.push(framework.clone());
        self.save_frameworks(&config)
    }

    /// Replace the framework registered as `name`
    pub fn update_framework(&self, name: &str, framework: &Framework) -> Result<()> {
        validate_framework(framework)?;
        let mut config = self.load_frameworks()?;
        if framework.name != name && config.framework(&framework.name).is_some() {
            return Err(Error::already_exists(format!(
                "framework already exists: {}",
                framework.name
            )));
        }
        let slot = config
            .framework_mut(name)
            .ok_or_else(|| Error::not_found(format!("framework not found: {name}")))?;
        *slot = framework.clone();
        self.save_frameworks(&config)
    }

    /// Remove a framework
    pub fn delete_framework(&self, name: &str) -> Result<()> {
        let mut config = self.load_frameworks()?;
        let before = config.frameworks.len();
        config.frameworks.retain(|fw| fw.name != name);
        if config.frameworks.len() == before {
            return Err(Error::not_found(format!("framework not found: {name}")));
        }
        self.save_frameworks(&config)?;
        self.remove_derived_entries(name, None)
    }

    /// Append a version to an existing framework
    pub fn add_framework_version(&self, name: &str, version: &FrameworkVersion) -> Result<()> {
        validate_version_label(&version.version)?;
        let mut config = self.load_frameworks()?;
        let framework = config
            .framework_mut(name)
            .ok_or_else(|| Error::not_found(format!("framework not found: {name}")))?;
        if framework.has_version(&version.version) {
            return Err(Error::already_exists(format!(
                "version {} already exists for framework {name}",
                version.version
            )));
        }
        framework.versions.push(version.clone());
        self.save_frameworks(&config)
    }

    /// Replace version `version` of framework `name`.
    ///
    /// Renaming the active version moves the active reference along with it.
    pub fn update_framework_version(
        &self,
        name: &str,
        version: &str,
        replacement: &FrameworkVersion,
    ) -> Result<()> {
        validate_version_label(&replacement.version)?;
        let mut config = self.load_frameworks()?;
        let framework = config
            .framework_mut(name)
            .ok_or_else(|| Error::not_found(format!("framework not found: {name}")))?;
        if replacement.version != version && framework.has_version(&replacement.version) {
            return Err(Error::already_exists(format!(
                "version {} already exists for framework {name}",
                replacement.version
            )));
        }
        let slot = framework
            .versions
            .iter_mut()
            .find(|v| v.version == version)
            .ok_or_else(|| {
                Error::not_found(format!("version {version} not found for framework {name}"))
            })?;
        *slot = replacement.clone();
        if framework.active_version == version {
            framework.active_version = replacement.version.clone();
        }
        self.save_frameworks(&config)
    }

    /// Remove a version. The active version cannot be removed.
    pub fn delete_framework_version(&self, name: &str, version: &str) -> Result<()> {
        let mut config = self.load_frameworks()?;
        let framework = config
            .framework_mut(name)
            .ok_or_else(|| Error::not_found(format!("framework not found: {name}")))?;
        if !framework.has_version(version) {
            return Err(Error::not_found(format!(
                "version {version} not found for framework {name}"
            )));
        }
        if framework.active_version == version {
            return Err(Error::invalid_reference(format!(
                "version {version} is the active version of {name}; activate another version first"
            )));
        }
        framework.versions.retain(|v| v.version != version);
        self.save_frameworks(&config)?;
        self.remove_derived_entries(name, Some(version))
    }

    /// Point the framework's active version at `version`
    pub fn set_active_version(&self, name: &str, version: &str) -> Result<()> {
        let mut config = self.load_frameworks()?;
        let framework = config
            .framework_mut(name)
            .ok_or_else(|| Error::not_found(format!("framework not found: {name}")))?;
        if !framework.has_version(version) {
            return Err(Error::invalid_reference(format!(
                "version {version} not found for framework {name}"
            )));
        }
        framework.active_version = version.to_string();
        self.save_frameworks(&config)
    }

    // ---------------------------------------------------------------------
    // Derived documents
    // ---------------------------------------------------------------------

    /// Read `apiServerInfo.yaml`
    pub fn load_server_info(&self) -> Result<ServerInfoDocument> {
        read_yaml(&self.server_info_path)
    }

    /// Rewrite `apiServerInfo.yaml`
    pub fn save_server_info(&self, doc: &ServerInfoDocument) -> Result<()> {
        write_yaml(&self.server_info_path, doc)
    }

    /// Read `apiOperationInfo.yaml`
    pub fn load_operation_info(&self) -> Result<OperationInfoDocument> {
        read_yaml(&self.operation_info_path)
    }

    /// Rewrite `apiOperationInfo.yaml`
    pub fn save_operation_info(&self, doc: &OperationInfoDocument) -> Result<()> {
        write_yaml(&self.operation_info_path, doc)
    }

    /// Regenerate `apiServerInfo.yaml` from every enabled version
    pub fn generate_server_info(&self, config: &FrameworksConfig) -> Result<ServerInfoDocument> {
        let mut doc = ServerInfoDocument::default();
        for framework in &config.frameworks {
            for version in framework.versions.iter().filter(|v| v.enabled) {
                doc.services.insert(
                    make_service_key(&framework.name, &version.version),
                    Service::from_version(version),
                );
            }
        }
        self.save_server_info(&doc)?;
        info!("Generated {} with {} services", SERVER_INFO_FILE, doc.services.len());
        Ok(doc)
    }

    /// Insert or replace one version's server-info entry
    pub fn upsert_service(&self, framework_name: &str, version: &FrameworkVersion) -> Result<()> {
        let mut doc = load_or_default(self.load_server_info())?;
        let key = make_service_key(framework_name, &version.version);
        debug!("Upserting server info for {}", key);
        doc.services.insert(key, Service::from_version(version));
        self.save_server_info(&doc)
    }

    /// Replace one version's operation table
    pub fn replace_operations(
        &self,
        framework_name: &str,
        version: &str,
        operations: OperationTable,
    ) -> Result<()> {
        let mut doc = load_or_default(self.load_operation_info())?;
        let key = make_service_key(framework_name, version);
        debug!("Storing {} operations for {}", operations.len(), key);
        doc.service_actions.insert(key, operations);
        self.save_operation_info(&doc)
    }

    /// Drop the server-info and operation-info entries of a framework, or of
    /// one of its versions when `version` is given.
    ///
    /// Keys are matched on the framework name parsed from the service key, so
    /// removing `mc` leaves `mc_iam_0.1.0` alone.
    pub fn remove_derived_entries(
        &self,
        framework_name: &str,
        version: Option<&str>,
    ) -> Result<()> {
        let owned = |key: &str| match parse_service_key(key) {
            Ok((name, v)) => name == framework_name && version.is_none_or(|wanted| v == wanted),
            Err(_) => false,
        };

        let mut servers = load_or_default(self.load_server_info())?;
        let before = servers.services.len();
        servers.services.retain(|key, _| !owned(key.as_str()));
        if servers.services.len() != before {
            self.save_server_info(&servers)?;
        }

        let mut operations = load_or_default(self.load_operation_info())?;
        let before = operations.service_actions.len();
        operations.service_actions.retain(|key, _| !owned(key.as_str()));
        if operations.service_actions.len() != before {
            self.save_operation_info(&operations)?;
        }

        debug!(
            "Removed derived entries of {}{}",
            framework_name,
            version.map(|v| format!(" {v}")).unwrap_or_default()
        );
        Ok(())
    }

    /// Operation table of one service key
    pub fn operations(&self, service_key: &str) -> Result<OperationTable> {
        let doc = self.load_operation_info()?;
        doc.service_actions
            .get(service_key)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("no operations found for {service_key}")))
    }
}

/// Treat a missing derived document as empty; any other failure propagates.
pub(crate) fn load_or_default<T: Default>(loaded: Result<T>) -> Result<T> {
    match loaded {
        Ok(doc) => Ok(doc),
        Err(Error::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => Ok(T::default()),
        Err(e) => Err(e),
    }
}

fn read_yaml<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)?;
    if content.trim().is_empty() {
        return Ok(T::default());
    }
    serde_yaml::from_str(&content)
        .map_err(|e| Error::decode(format!("failed to parse {}: {e}", path.display())))
}

fn write_yaml<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let data = serde_yaml::to_string(value)
        .map_err(|e| Error::decode(format!("failed to encode {}: {e}", path.display())))?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(data.as_bytes())?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| Error::Io(e.error))?;
    Ok(())
}

fn validate_version_label(version: &str) -> Result<()> {
    if version.is_empty() {
        return Err(Error::validation("version is required"));
    }
    if version.contains('_') {
        return Err(Error::validation(format!(
            "version '{version}' must not contain '_' (it separates framework and version in service keys)"
        )));
    }
    Ok(())
}

fn validate_framework(framework: &Framework) -> Result<()> {
    if framework.name.is_empty() {
        return Err(Error::validation("framework name is required"));
    }
    for version in &framework.versions {
        validate_version_label(&version.version)?;
    }
    if !framework.has_version(&framework.active_version) {
        return Err(Error::invalid_reference(format!(
            "active version '{}' is not among the versions of {}",
            framework.active_version, framework.name
        )));
    }
    Ok(())
}

/// Registry written on first start
pub fn default_frameworks() -> FrameworksConfig {
    FrameworksConfig {
        frameworks: vec![
            Framework {
                name: "cb-spider".into(),
                display_name: "CB-Spider".into(),
                active_version: "0.11.13".into(),
                versions: vec![FrameworkVersion {
                    version: "0.11.13".into(),
                    swagger_url:
                        "https://raw.githubusercontent.com/cloud-barista/cb-spider/main/api/swagger.yaml"
                            .into(),
                    base_url: "http://cb-spider:1024/spider".into(),
                    auth_type: AuthType::None,
                    username: String::new(),
                    password: String::new(),
                    enabled: true,
                }],
            },
            Framework {
                name: "cb-tumblebug".into(),
                display_name: "CB-Tumblebug".into(),
                active_version: "0.11.13".into(),
                versions: vec![FrameworkVersion {
                    version: "0.11.13".into(),
                    swagger_url: "https://raw.githubusercontent.com/cloud-barista/cb-tumblebug/main/src/api/rest/docs/swagger.yaml".into(),
                    base_url: "http://cb-tumblebug:1323/tumblebug".into(),
                    auth_type: AuthType::Basic,
                    username: "default".into(),
                    password: "default".into(),
                    enabled: true,
                }],
            },
        ],
    }
}
