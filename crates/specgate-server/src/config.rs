//! Server configuration
//!
//! Priority: environment variables > `config/gateway.toml` > defaults.

use serde::Deserialize;
use specgate_core::OutboundOptions;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_ADDR: &str = "127.0.0.1:3000";
const DEFAULT_CONF_DIR: &str = "./conf";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Bind address could not be parsed
    #[error("Invalid bind address '{0}'")]
    InvalidAddr(String),

    /// A setting holds a value of the wrong type or out of range
    #[error("Invalid value '{value}' for {var}")]
    InvalidValue {
        /// Environment variable or `gateway.toml` key
        var: &'static str,
        /// Offending value
        value: String,
    },
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Server bind address
    pub addr: SocketAddr,
    /// Directory holding frameworks.yaml, apiServerInfo.yaml and apiOperationInfo.yaml
    pub conf_dir: String,
    /// Gateway behaviour
    pub gateway: GatewayConfig,
}

/// Gateway behaviour settings (`[gateway]` table)
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Rewrite API host base URLs to their `:port/path` tail
    pub iframe_target_is_host: bool,
    /// Timeout of dispatched calls
    pub dispatch_timeout_secs: u64,
    /// Timeout of swagger fetches
    pub fetch_timeout_secs: u64,
    /// Skip TLS certificate verification on outbound calls
    pub accept_invalid_certs: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            iframe_target_is_host: false,
            dispatch_timeout_secs: 30,
            fetch_timeout_secs: 30,
            accept_invalid_certs: true,
        }
    }
}

impl GatewayConfig {
    /// Outbound options for dispatched calls
    pub fn dispatch_options(&self) -> OutboundOptions {
        OutboundOptions::default()
            .with_timeout(Duration::from_secs(self.dispatch_timeout_secs))
            .with_accept_invalid_certs(self.accept_invalid_certs)
    }

    /// Outbound options for swagger fetches
    pub fn fetch_options(&self) -> OutboundOptions {
        OutboundOptions::default()
            .with_timeout(Duration::from_secs(self.fetch_timeout_secs))
            .with_accept_invalid_certs(self.accept_invalid_certs)
    }

    /// Reject timeouts that would fail every outbound call
    fn validate(&self) -> Result<(), ConfigError> {
        let timeouts = [
            ("dispatch_timeout_secs", self.dispatch_timeout_secs),
            ("fetch_timeout_secs", self.fetch_timeout_secs),
        ];
        match timeouts.into_iter().find(|(_, secs)| *secs == 0) {
            Some((var, secs)) => Err(ConfigError::InvalidValue {
                var,
                value: secs.to_string(),
            }),
            None => Ok(()),
        }
    }
}

/// `[server]` table of the config file
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ServerSection {
    addr: Option<String>,
    conf_dir: Option<String>,
}

/// Config file structure
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigFile {
    server: ServerSection,
    gateway: GatewayConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            conf_dir: DEFAULT_CONF_DIR.to_string(),
            gateway: GatewayConfig::default(),
        }
    }
}

impl Config {
    /// Load `gateway.toml` from `config_dir`.
    /// Returns None if the file doesn't exist or can't be parsed.
    fn from_file(config_dir: impl AsRef<Path>) -> Option<ConfigFile> {
        let config_path = config_dir.as_ref().join("gateway.toml");

        if !config_path.exists() {
            tracing::debug!("Gateway config file not found: {:?}", config_path);
            return None;
        }

        match std::fs::read_to_string(&config_path) {
            Ok(content) => match toml::from_str::<ConfigFile>(&content) {
                Ok(file) => {
                    tracing::info!("Loaded gateway configuration from {:?}", config_path);
                    Some(file)
                }
                Err(e) => {
                    tracing::warn!("Failed to parse gateway config file {:?}: {}", config_path, e);
                    None
                }
            },
            Err(e) => {
                tracing::warn!("Failed to read gateway config file {:?}: {}", config_path, e);
                None
            }
        }
    }

    /// Load configuration from environment variables and `<config_dir>/gateway.toml`
    pub fn from_env(config_dir: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let file = Self::from_file(config_dir).unwrap_or_default();
        let mut gateway = file.gateway;

        let addr_str = std::env::var("SPECGATE_ADDR")
            .ok()
            .or(file.server.addr)
            .unwrap_or_else(|| DEFAULT_ADDR.to_string());
        let addr = addr_str
            .parse()
            .map_err(|_| ConfigError::InvalidAddr(addr_str.clone()))?;

        let conf_dir = std::env::var("SPECGATE_CONF_DIR")
            .ok()
            .or(file.server.conf_dir)
            .unwrap_or_else(|| DEFAULT_CONF_DIR.to_string());

        if let Some(value) = env_parse("SPECGATE_IFRAME_TARGET_IS_HOST")? {
            gateway.iframe_target_is_host = value;
        }
        if let Some(value) = env_parse("SPECGATE_DISPATCH_TIMEOUT_SECS")? {
            gateway.dispatch_timeout_secs = value;
        }
        if let Some(value) = env_parse("SPECGATE_FETCH_TIMEOUT_SECS")? {
            gateway.fetch_timeout_secs = value;
        }
        if let Some(value) = env_parse("SPECGATE_ACCEPT_INVALID_CERTS")? {
            gateway.accept_invalid_certs = value;
        }
        gateway.validate()?;

        Ok(Self {
            addr,
            conf_dir,
            gateway,
        })
    }

    /// Get the bind address
    pub fn addr(&self) -> &SocketAddr {
        &self.addr
    }

    /// Get the conf directory
    pub fn conf_dir(&self) -> &str {
        &self.conf_dir
    }

    /// Set a new conf directory
    pub fn with_conf_dir(mut self, conf_dir: impl Into<String>) -> Self {
        self.conf_dir = conf_dir.into();
        self
    }

    /// Set a new bind address
    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }
}

fn env_parse<T: std::str::FromStr>(var: &'static str) -> Result<Option<T>, ConfigError> {
    match std::env::var(var) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { var, value }),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use specgate_core::testing::TestContext;
    use std::net::{IpAddr, Ipv4Addr};

    const VARS: [&str; 6] = [
        "SPECGATE_ADDR",
        "SPECGATE_CONF_DIR",
        "SPECGATE_IFRAME_TARGET_IS_HOST",
        "SPECGATE_DISPATCH_TIMEOUT_SECS",
        "SPECGATE_FETCH_TIMEOUT_SECS",
        "SPECGATE_ACCEPT_INVALID_CERTS",
    ];

    fn clear_env() {
        for var in VARS {
            unsafe {
                std::env::remove_var(var);
            }
        }
    }

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.addr.port(), 3000);
        assert_eq!(config.addr.ip(), IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)));
        assert_eq!(config.conf_dir, "./conf");
        assert!(config.gateway.accept_invalid_certs);
        assert!(!config.gateway.iframe_target_is_host);
    }

    #[test]
    fn test_config_chaining() {
        let new_addr = "10.0.0.1:9000".parse().unwrap();
        let config = Config::default()
            .with_conf_dir("/etc/specgate")
            .with_addr(new_addr);

        assert_eq!(config.conf_dir(), "/etc/specgate");
        assert_eq!(config.addr(), &new_addr);
    }

    #[test]
    fn test_outbound_options() {
        let gateway = GatewayConfig {
            dispatch_timeout_secs: 5,
            fetch_timeout_secs: 60,
            accept_invalid_certs: false,
            ..GatewayConfig::default()
        };
        assert_eq!(gateway.dispatch_options().timeout, Duration::from_secs(5));
        assert_eq!(gateway.fetch_options().timeout, Duration::from_secs(60));
        assert!(!gateway.dispatch_options().accept_invalid_certs);
    }

    #[test]
    #[serial]
    fn test_from_env_defaults_without_file() {
        clear_env();
        let ctx = TestContext::new();
        let config = Config::from_env(ctx.path()).unwrap();
        assert_eq!(config.addr.port(), 3000);
        assert_eq!(config.conf_dir, "./conf");
        assert_eq!(config.gateway, GatewayConfig::default());
    }

    #[test]
    #[serial]
    fn test_from_env_reads_file_then_env() {
        clear_env();
        let ctx = TestContext::new();
        std::fs::write(
            ctx.path().join("gateway.toml"),
            r#"
[server]
addr = "0.0.0.0:8080"
conf_dir = "/srv/conf"

[gateway]
iframe_target_is_host = true
dispatch_timeout_secs = 10
"#,
        )
        .unwrap();

        let config = Config::from_env(ctx.path()).unwrap();
        assert_eq!(config.addr.port(), 8080);
        assert_eq!(config.conf_dir, "/srv/conf");
        assert!(config.gateway.iframe_target_is_host);
        assert_eq!(config.gateway.dispatch_timeout_secs, 10);
        assert_eq!(config.gateway.fetch_timeout_secs, 30);

        unsafe {
            std::env::set_var("SPECGATE_ADDR", "192.168.1.50:3100");
            std::env::set_var("SPECGATE_DISPATCH_TIMEOUT_SECS", "3");
            std::env::set_var("SPECGATE_ACCEPT_INVALID_CERTS", "false");
        }
        let config = Config::from_env(ctx.path()).unwrap();
        assert_eq!(config.addr.ip(), IpAddr::V4(Ipv4Addr::new(192, 168, 1, 50)));
        assert_eq!(config.gateway.dispatch_timeout_secs, 3);
        assert!(!config.gateway.accept_invalid_certs);
        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_env_malformed_file_falls_back() {
        clear_env();
        let ctx = TestContext::new();
        std::fs::write(ctx.path().join("gateway.toml"), "[gateway\nbroken").unwrap();
        let config = Config::from_env(ctx.path()).unwrap();
        assert_eq!(config.gateway, GatewayConfig::default());
    }

    #[test]
    #[serial]
    fn test_from_env_invalid_values() {
        clear_env();
        let ctx = TestContext::new();
        unsafe {
            std::env::set_var("SPECGATE_ADDR", "not-an-address");
        }
        assert!(matches!(
            Config::from_env(ctx.path()),
            Err(ConfigError::InvalidAddr(_))
        ));
        clear_env();

        unsafe {
            std::env::set_var("SPECGATE_FETCH_TIMEOUT_SECS", "soon");
        }
        assert!(matches!(
            Config::from_env(ctx.path()),
            Err(ConfigError::InvalidValue { var: "SPECGATE_FETCH_TIMEOUT_SECS", .. })
        ));
        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_env_rejects_zero_timeouts() {
        clear_env();
        let ctx = TestContext::new();
        unsafe {
            std::env::set_var("SPECGATE_DISPATCH_TIMEOUT_SECS", "0");
        }
        assert!(matches!(
            Config::from_env(ctx.path()),
            Err(ConfigError::InvalidValue { var: "dispatch_timeout_secs", .. })
        ));
        clear_env();

        std::fs::write(
            ctx.path().join("gateway.toml"),
            "[gateway]\nfetch_timeout_secs = 0\n",
        )
        .unwrap();
        assert!(matches!(
            Config::from_env(ctx.path()),
            Err(ConfigError::InvalidValue { var: "fetch_timeout_secs", .. })
        ));
    }
}
