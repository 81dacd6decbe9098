//! Registry data model
//!
//! Three persisted documents make up the registry:
//!
//! - `frameworks.yaml` ([`FrameworksConfig`]) is authoritative: frameworks,
//!   their versions and which version is active.
//! - `apiServerInfo.yaml` ([`ServerInfoDocument`]) maps a service key to the
//!   base URL and auth block used for dispatch.
//! - `apiOperationInfo.yaml` ([`OperationInfoDocument`]) maps a service key to
//!   its operation table.
//!
//! The two derived documents are joined on the service key
//! `<frameworkName>_<version>` (see [`make_service_key`]).

use crate::error::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Authentication scheme a downstream service expects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub enum AuthType {
    /// No Authorization header
    #[default]
    None,
    /// `Basic base64(username:password)` from stored credentials
    Basic,
    /// Caller's forwarded bearer token
    Bearer,
}

impl AuthType {
    /// Lowercase wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Basic => "basic",
            Self::Bearer => "bearer",
        }
    }

    /// Whether a header has to be attached at all
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

impl fmt::Display for AuthType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuthType {
    type Err = std::convert::Infallible;

    /// Unknown or empty values fall back to `none`, matching how the
    /// registry has always treated them.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "basic" => Self::Basic,
            "bearer" => Self::Bearer,
            _ => Self::None,
        })
    }
}

impl Serialize for AuthType {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for AuthType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw
            .as_deref()
            .map(|s| s.parse().unwrap_or_default())
            .unwrap_or_default())
    }
}

/// One deployable version of a framework
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FrameworkVersion {
    /// Version label (must not contain `_`)
    #[serde(deserialize_with = "lenient_string")]
    pub version: String,
    /// Where the swagger / OpenAPI document is published
    pub swagger_url: String,
    /// Base URL dispatch calls are sent to
    pub base_url: String,
    /// Auth scheme
    pub auth_type: AuthType,
    /// Basic auth username
    pub username: String,
    /// Basic auth password
    pub password: String,
    /// Disabled versions are ignored by generation and sync
    pub enabled: bool,
}

/// A downstream service family with one or more versions
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Framework {
    /// Unique registry key
    pub name: String,
    /// Human readable name
    pub display_name: String,
    /// Version currently used for live dispatch
    #[serde(deserialize_with = "lenient_string")]
    pub active_version: String,
    /// Declared versions, in insertion order
    pub versions: Vec<FrameworkVersion>,
}

impl Framework {
    /// Look up a declared version
    pub fn version(&self, version: &str) -> Option<&FrameworkVersion> {
        self.versions.iter().find(|v| v.version == version)
    }

    /// Whether `version` is declared
    pub fn has_version(&self, version: &str) -> bool {
        self.version(version).is_some()
    }

    /// The active version entry, when the reference resolves
    pub fn active(&self) -> Option<&FrameworkVersion> {
        self.version(&self.active_version)
    }
}

/// Root of `frameworks.yaml`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FrameworksConfig {
    /// Registered frameworks
    #[serde(default)]
    pub frameworks: Vec<Framework>,
}

impl FrameworksConfig {
    /// Look up a framework by name
    pub fn framework(&self, name: &str) -> Option<&Framework> {
        self.frameworks.iter().find(|fw| fw.name == name)
    }

    /// Mutable lookup by name
    pub fn framework_mut(&mut self, name: &str) -> Option<&mut Framework> {
        self.frameworks.iter_mut().find(|fw| fw.name == name)
    }
}

/// Auth block of a server-info entry
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ServiceAuth {
    /// Auth scheme
    #[serde(rename = "type", default)]
    pub auth_type: AuthType,
    /// Basic auth username
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub username: String,
    /// Basic auth password
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub password: String,
}

/// Dispatch target of one service key (`apiServerInfo.yaml` entry)
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Service {
    /// Version label
    #[serde(default)]
    pub version: String,
    /// Base URL dispatch calls are sent to
    #[serde(rename = "baseurl", default)]
    pub base_url: String,
    /// Auth block, absent for `none`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<ServiceAuth>,
}

impl Service {
    /// Build the server-info entry for a framework version
    pub fn from_version(version: &FrameworkVersion) -> Self {
        let auth = (!version.auth_type.is_none()).then(|| ServiceAuth {
            auth_type: version.auth_type,
            username: version.username.clone(),
            password: version.password.clone(),
        });
        Self {
            version: version.version.clone(),
            base_url: version.base_url.clone(),
            auth,
        }
    }

    /// Effective auth scheme (`none` when the block is absent)
    pub fn auth_type(&self) -> AuthType {
        self.auth.as_ref().map(|a| a.auth_type).unwrap_or_default()
    }
}

/// Root of `apiServerInfo.yaml`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ServerInfoDocument {
    /// Service key -> dispatch target
    #[serde(default, deserialize_with = "null_as_default")]
    pub services: BTreeMap<String, Service>,
}

/// One downstream operation
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApiOperationSpec {
    /// HTTP method as written in the swagger document
    pub method: String,
    /// Path template with `{name}` placeholders
    pub resource_path: String,
    /// Description, falling back to the summary
    pub description: String,
}

/// Operation id -> spec for one service key
pub type OperationTable = BTreeMap<String, ApiOperationSpec>;

/// Root of `apiOperationInfo.yaml`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OperationInfoDocument {
    /// Service key -> operation table
    #[serde(
        rename = "serviceActions",
        default,
        deserialize_with = "deserialize_service_actions"
    )]
    pub service_actions: BTreeMap<String, OperationTable>,
}

// Hand-edited YAML often carries `version: 1.0` unquoted.
fn lenient_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error as _;
    match Option::<serde_yaml::Value>::deserialize(deserializer)? {
        None | Some(serde_yaml::Value::Null) => Ok(String::new()),
        Some(serde_yaml::Value::String(s)) => Ok(s),
        Some(serde_yaml::Value::Number(n)) => Ok(n.to_string()),
        Some(serde_yaml::Value::Bool(b)) => Ok(b.to_string()),
        Some(other) => Err(D::Error::custom(format!(
            "expected a version string, got {other:?}"
        ))),
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// `serviceKey: {}` and `serviceKey: ~` both mean "no operations yet".
fn deserialize_service_actions<'de, D>(
    deserializer: D,
) -> std::result::Result<BTreeMap<String, OperationTable>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<BTreeMap<String, Option<OperationTable>>>::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .map(|(key, table)| (key, table.unwrap_or_default()))
        .collect())
}

/// Build a service key. `make_service_key("cb-spider", "0.11.13") == "cb-spider_0.11.13"`
pub fn make_service_key(framework_name: &str, version: &str) -> String {
    format!("{framework_name}_{version}")
}

/// Split a service key on its rightmost `_` into (framework name, version).
///
/// Framework names may contain underscores, versions may not.
pub fn parse_service_key(service_key: &str) -> Result<(String, String)> {
    match service_key.rsplit_once('_') {
        Some((name, version)) if !name.is_empty() && !version.is_empty() => {
            Ok((name.to_string(), version.to_string()))
        }
        _ => Err(Error::InvalidServiceKey(service_key.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_make_service_key() {
        assert_eq!(make_service_key("cb-spider", "0.11.13"), "cb-spider_0.11.13");
        assert_eq!(make_service_key("mc-iam-manager", "0.1.0"), "mc-iam-manager_0.1.0");
        assert_eq!(make_service_key("cm-beetle", "0.4.0"), "cm-beetle_0.4.0");
    }

    #[test]
    fn test_parse_service_key() {
        assert_eq!(
            parse_service_key("cb-spider_0.11.13").unwrap(),
            ("cb-spider".to_string(), "0.11.13".to_string())
        );
        assert_eq!(
            parse_service_key("mc-iam-manager_0.1.0").unwrap(),
            ("mc-iam-manager".to_string(), "0.1.0".to_string())
        );
        assert!(matches!(
            parse_service_key("invalid"),
            Err(Error::InvalidServiceKey(_))
        ));
        assert!(parse_service_key("trailing_").is_err());
        assert!(parse_service_key("_0.1.0").is_err());
    }

    #[test]
    fn test_service_key_round_trip_with_underscored_name() {
        let key = make_service_key("legacy_manager", "1.2.3");
        let (name, version) = parse_service_key(&key).unwrap();
        assert_eq!(name, "legacy_manager");
        assert_eq!(version, "1.2.3");
    }

    #[test]
    fn test_auth_type_lenient_parsing() {
        assert_eq!("basic".parse::<AuthType>().unwrap(), AuthType::Basic);
        assert_eq!("Bearer".parse::<AuthType>().unwrap(), AuthType::Bearer);
        assert_eq!("".parse::<AuthType>().unwrap(), AuthType::None);
        assert_eq!("digest".parse::<AuthType>().unwrap(), AuthType::None);
    }

    #[test]
    fn test_frameworks_yaml_shape() {
        let yaml = r#"
frameworks:
  - name: cb-tumblebug
    displayName: CB-Tumblebug
    activeVersion: 0.11.13
    versions:
      - version: 0.11.13
        swaggerUrl: https://example.com/swagger.yaml
        baseUrl: http://cb-tumblebug:1323/tumblebug
        authType: basic
        username: default
        password: default
        enabled: true
"#;
        let config: FrameworksConfig = serde_yaml::from_str(yaml).unwrap();
        let fw = config.framework("cb-tumblebug").unwrap();
        assert_eq!(fw.display_name, "CB-Tumblebug");
        assert_eq!(fw.active_version, "0.11.13");
        let active = fw.active().unwrap();
        assert_eq!(active.auth_type, AuthType::Basic);
        assert!(active.enabled);

        let out = serde_yaml::to_string(&config).unwrap();
        assert!(out.contains("displayName: CB-Tumblebug"));
        assert!(out.contains("authType: basic"));
        assert!(out.contains("swaggerUrl:"));
    }

    #[test]
    fn test_unquoted_numeric_versions() {
        let yaml = r#"
frameworks:
  - name: cm-beetle
    activeVersion: 2
    versions:
      - version: 2
        enabled: true
"#;
        let config: FrameworksConfig = serde_yaml::from_str(yaml).unwrap();
        let fw = config.framework("cm-beetle").unwrap();
        assert_eq!(fw.active_version, "2");
        assert!(fw.has_version("2"));
    }

    #[test]
    fn test_service_from_version_omits_auth_for_none() {
        let version = FrameworkVersion {
            version: "0.11.13".into(),
            base_url: "http://cb-spider:1024/spider".into(),
            enabled: true,
            ..Default::default()
        };
        let service = Service::from_version(&version);
        assert!(service.auth.is_none());

        let yaml = serde_yaml::to_string(&service).unwrap();
        assert!(yaml.contains("baseurl: http://cb-spider:1024/spider"));
        assert!(!yaml.contains("auth"));
    }

    #[test]
    fn test_service_auth_skips_empty_credentials() {
        let version = FrameworkVersion {
            version: "0.1.0".into(),
            base_url: "http://iam:5000".into(),
            auth_type: AuthType::Bearer,
            ..Default::default()
        };
        let yaml = serde_yaml::to_string(&Service::from_version(&version)).unwrap();
        assert!(yaml.contains("type: bearer"));
        assert!(!yaml.contains("username"));
        assert!(!yaml.contains("password"));
    }

    #[test]
    fn test_operation_info_tolerates_empty_tables() {
        let yaml = r#"
serviceActions:
  cb-spider_0.11.13: {}
  mc-iam-manager_0.1.0: ~
  cb-tumblebug_0.11.13:
    GetNs:
      method: get
      resourcePath: /ns/{nsId}
      description: Get namespace
"#;
        let doc: OperationInfoDocument = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(doc.service_actions.len(), 3);
        assert!(doc.service_actions["mc-iam-manager_0.1.0"].is_empty());
        let spec = &doc.service_actions["cb-tumblebug_0.11.13"]["GetNs"];
        assert_eq!(spec.method, "get");
        assert_eq!(spec.resource_path, "/ns/{nsId}");
    }
}
