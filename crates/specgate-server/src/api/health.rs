//! Health check endpoint

use crate::GatewayServer;
use axum::extract::{Json, State};
use serde::Serialize;
use std::sync::{Arc, OnceLock};
use std::time::Instant;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Overall health status
    pub status: HealthStatus,
    /// Version information
    pub version: String,
    /// Uptime in seconds
    pub uptime_seconds: u64,
    /// Whether the spec cache has loaded
    pub initialized: bool,
    /// Registered frameworks
    pub frameworks: usize,
    /// Server-info entries
    pub services: usize,
    /// Cached operations
    pub operations: usize,
}

/// Health status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Cache loaded
    Healthy,
    /// Serving without a loaded cache
    Degraded,
}

static START_TIME: OnceLock<Instant> = OnceLock::new();

/// Record the process start for uptime reporting
pub fn init() {
    let _ = START_TIME.set(Instant::now());
}

/// GET /health
pub async fn health_check(State(server): State<Arc<GatewayServer>>) -> Json<HealthResponse> {
    let uptime = START_TIME.get().copied().unwrap_or_else(Instant::now).elapsed();
    let stats = server.registry.stats();

    let status = if stats.initialized {
        HealthStatus::Healthy
    } else {
        HealthStatus::Degraded
    };

    Json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: uptime.as_secs(),
        initialized: stats.initialized,
        frameworks: stats.frameworks,
        services: stats.services,
        operations: stats.operations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&HealthStatus::Degraded).unwrap(),
            "\"degraded\""
        );
    }
}
