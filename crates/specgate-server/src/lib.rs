//! SpecGate Server - HTTP surface of the registry and dispatch engine
//!
//! Provides REST endpoints for:
//! - GET /health - Cache state and registry counts
//! - /api/registry/frameworks[/{name}[/versions[/{version}[/sync]]|/active-version]] - Registry CRUD
//! - POST /api/registry/sync - Re-ingest every enabled version
//! - GET /api/registry/operations/{framework} - Operation table (JSON or YAML)
//! - GET /api/registry/active-versions - Framework -> active version
//! - GET /api/registry/hosts - Service key -> base URL
//! - POST /api/call/{operationId} - Dispatch by operation id
//! - POST /api/call/{subsystem}/{operationId} - Dispatch within one subsystem
//! - POST /api/direct-call - Dispatch to an explicit URL

use axum::{
    Router,
    routing::{get, post, put},
};
use specgate_core::{Dispatcher, Gateway, Registry, SpecCache, SpecStore, SwaggerIngester};
use std::sync::Arc;

pub mod api;
pub mod config;
pub mod middleware;

use config::GatewayConfig;

/// Shared server state
#[derive(Clone)]
pub struct GatewayServer {
    /// Registry management service
    pub registry: Arc<Registry>,
    /// Dispatch hot path
    pub gateway: Gateway,
}

impl GatewayServer {
    /// Create a server over an existing registry and gateway
    pub fn new(registry: Arc<Registry>, gateway: Gateway) -> Self {
        Self { registry, gateway }
    }

    /// Wire store, cache, ingester and dispatcher for `conf_dir`.
    ///
    /// The cache starts empty; call [`Registry::bootstrap`] to load it.
    pub fn build(conf_dir: &str, settings: &GatewayConfig) -> specgate_core::Result<Self> {
        let store = Arc::new(SpecStore::new(conf_dir));
        let cache = Arc::new(SpecCache::new(store));
        let ingester = SwaggerIngester::new(settings.fetch_options())?;
        let dispatcher = Dispatcher::new(settings.dispatch_options())?;

        let registry = Registry::new(cache.clone(), ingester)
            .with_iframe_target_is_host(settings.iframe_target_is_host);
        Ok(Self::new(Arc::new(registry), Gateway::new(cache, dispatcher)))
    }
}

/// Build the application router
pub fn router(server: Arc<GatewayServer>) -> Router {
    use api::{dispatch, health, registry};

    Router::new()
        .route("/health", get(health::health_check))
        .route(
            "/api/registry/frameworks",
            get(registry::list_frameworks).post(registry::create_framework),
        )
        .route(
            "/api/registry/frameworks/{name}",
            get(registry::get_framework)
                .put(registry::update_framework)
                .delete(registry::delete_framework),
        )
        .route(
            "/api/registry/frameworks/{name}/versions",
            get(registry::list_versions).post(registry::add_version),
        )
        .route(
            "/api/registry/frameworks/{name}/versions/{version}",
            put(registry::update_version).delete(registry::delete_version),
        )
        .route(
            "/api/registry/frameworks/{name}/versions/{version}/sync",
            post(registry::sync_version),
        )
        .route(
            "/api/registry/frameworks/{name}/active-version",
            put(registry::set_active_version),
        )
        .route("/api/registry/sync", post(registry::sync_all))
        .route(
            "/api/registry/operations/{framework}",
            get(registry::get_operations),
        )
        .route(
            "/api/registry/active-versions",
            get(registry::active_versions),
        )
        .route("/api/registry/hosts", get(registry::api_hosts))
        .route("/api/call/{operation_id}", post(dispatch::call_operation))
        .route(
            "/api/call/{subsystem}/{operation_id}",
            post(dispatch::call_subsystem_operation),
        )
        .route("/api/direct-call", post(dispatch::direct_call))
        .layer(axum::middleware::from_fn(
            middleware::caller_context_middleware,
        ))
        .with_state(server)
}
