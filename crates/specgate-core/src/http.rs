//! Outbound HTTP client construction shared by swagger fetches and dispatch

use crate::error::{Error, Result};
use std::time::Duration;
use tracing::warn;

/// Default bound on every outbound round trip
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Transport settings of an outbound client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutboundOptions {
    /// Whole-request timeout
    pub timeout: Duration,
    /// Skip TLS certificate verification.
    ///
    /// Internal services commonly run on self-signed certificates. Turning
    /// this on trades away server authentication for that interoperability.
    pub accept_invalid_certs: bool,
}

impl Default for OutboundOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            accept_invalid_certs: true,
        }
    }
}

impl OutboundOptions {
    /// Same options with a different timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Same options with certificate verification switched
    pub fn with_accept_invalid_certs(mut self, accept: bool) -> Self {
        self.accept_invalid_certs = accept;
        self
    }
}

/// Build a reqwest client for `options`
pub fn build_client(options: OutboundOptions) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .use_rustls_tls()
        .timeout(options.timeout)
        .connect_timeout(options.timeout.min(Duration::from_secs(10)));

    if options.accept_invalid_certs {
        warn!("Outbound TLS certificate verification is disabled");
        builder = builder.danger_accept_invalid_certs(true);
    }

    builder
        .build()
        .map_err(|e| Error::config(format!("failed to build HTTP client: {e}")))
}
