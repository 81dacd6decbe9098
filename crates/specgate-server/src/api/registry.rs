//! Registry management endpoints

use super::{error_response, json_body, ok_response, result_response};
use crate::GatewayServer;
use axum::{
    Json,
    extract::{Path, Query, State, rejection::JsonRejection},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::json;
use specgate_core::{Framework, FrameworkVersion};
use std::sync::Arc;
use tracing::info;

/// Body of the set-active-version endpoint
#[derive(Debug, Deserialize)]
pub struct SetActiveVersionRequest {
    /// Version to activate
    #[serde(default)]
    pub version: String,
}

/// Query of the operations endpoint
#[derive(Debug, Default, Deserialize)]
pub struct OperationsQuery {
    /// Version; the active version when absent
    pub version: Option<String>,
    /// `json` (default) or `yaml`
    pub format: Option<String>,
}

/// GET /api/registry/frameworks
pub async fn list_frameworks(State(server): State<Arc<GatewayServer>>) -> Response {
    ok_response(server.registry.list_frameworks())
}

/// GET /api/registry/frameworks/{name}
pub async fn get_framework(
    State(server): State<Arc<GatewayServer>>,
    Path(name): Path<String>,
) -> Response {
    result_response(server.registry.get_framework(&name))
}

/// POST /api/registry/frameworks
pub async fn create_framework(
    State(server): State<Arc<GatewayServer>>,
    payload: Result<Json<Framework>, JsonRejection>,
) -> Response {
    let framework = match json_body(payload) {
        Ok(framework) => framework,
        Err(response) => return response,
    };
    result_response(server.registry.create_framework(framework))
}

/// PUT /api/registry/frameworks/{name}
pub async fn update_framework(
    State(server): State<Arc<GatewayServer>>,
    Path(name): Path<String>,
    payload: Result<Json<Framework>, JsonRejection>,
) -> Response {
    let framework = match json_body(payload) {
        Ok(framework) => framework,
        Err(response) => return response,
    };
    result_response(server.registry.update_framework(&name, framework))
}

/// DELETE /api/registry/frameworks/{name}
pub async fn delete_framework(
    State(server): State<Arc<GatewayServer>>,
    Path(name): Path<String>,
) -> Response {
    result_response(
        server
            .registry
            .delete_framework(&name)
            .map(|()| json!({"message": "Framework deleted successfully", "framework": name})),
    )
}

/// GET /api/registry/frameworks/{name}/versions
pub async fn list_versions(
    State(server): State<Arc<GatewayServer>>,
    Path(name): Path<String>,
) -> Response {
    result_response(server.registry.list_versions(&name))
}

/// POST /api/registry/frameworks/{name}/versions
pub async fn add_version(
    State(server): State<Arc<GatewayServer>>,
    Path(name): Path<String>,
    payload: Result<Json<FrameworkVersion>, JsonRejection>,
) -> Response {
    let version = match json_body(payload) {
        Ok(version) => version,
        Err(response) => return response,
    };
    result_response(server.registry.add_version(&name, version))
}

/// PUT /api/registry/frameworks/{name}/versions/{version}
pub async fn update_version(
    State(server): State<Arc<GatewayServer>>,
    Path((name, version)): Path<(String, String)>,
    payload: Result<Json<FrameworkVersion>, JsonRejection>,
) -> Response {
    let replacement = match json_body(payload) {
        Ok(replacement) => replacement,
        Err(response) => return response,
    };
    result_response(server.registry.update_version(&name, &version, replacement))
}

/// DELETE /api/registry/frameworks/{name}/versions/{version}
pub async fn delete_version(
    State(server): State<Arc<GatewayServer>>,
    Path((name, version)): Path<(String, String)>,
) -> Response {
    result_response(server.registry.delete_version(&name, &version).map(|()| {
        json!({
            "message": "Framework version deleted successfully",
            "framework": name,
            "version": version,
        })
    }))
}

/// PUT /api/registry/frameworks/{name}/active-version
pub async fn set_active_version(
    State(server): State<Arc<GatewayServer>>,
    Path(name): Path<String>,
    payload: Result<Json<SetActiveVersionRequest>, JsonRejection>,
) -> Response {
    let request = match json_body(payload) {
        Ok(request) => request,
        Err(response) => return response,
    };
    result_response(
        server
            .registry
            .set_active_version(&name, &request.version)
            .map(|()| {
                json!({
                    "message": "Active version updated successfully",
                    "framework": name,
                    "version": request.version,
                })
            }),
    )
}

/// POST /api/registry/frameworks/{name}/versions/{version}/sync
pub async fn sync_version(
    State(server): State<Arc<GatewayServer>>,
    Path((name, version)): Path<(String, String)>,
) -> Response {
    result_response(server.registry.sync_version(&name, &version).await.map(|()| {
        json!({
            "message": "Framework version synced successfully",
            "framework": name,
            "version": version,
        })
    }))
}

/// POST /api/registry/sync
pub async fn sync_all(State(server): State<Arc<GatewayServer>>) -> Response {
    match server.registry.sync_all().await {
        Ok(report) => {
            info!("Full sync finished: {}", report.summary());
            ok_response(json!({
                "message": "All frameworks synced successfully",
                "succeeded": report.succeeded,
                "failed": report.failed,
            }))
        }
        Err(e) => error_response(&e),
    }
}

/// GET /api/registry/operations/{framework}?version=&format=
pub async fn get_operations(
    State(server): State<Arc<GatewayServer>>,
    Path(framework): Path<String>,
    Query(query): Query<OperationsQuery>,
) -> Response {
    let version = query.version.as_deref();
    if query.format.as_deref() == Some("yaml") {
        return match server.registry.operations_yaml(&framework, version) {
            Ok(yaml) => yaml.into_response(),
            Err(e) => error_response(&e),
        };
    }
    result_response(
        server
            .registry
            .operations(&framework, version)
            .map(|(_, table)| table),
    )
}

/// GET /api/registry/active-versions
pub async fn active_versions(State(server): State<Arc<GatewayServer>>) -> Response {
    ok_response(server.registry.active_versions())
}

/// GET /api/registry/hosts
pub async fn api_hosts(State(server): State<Arc<GatewayServer>>) -> Response {
    ok_response(server.registry.api_hosts())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use specgate_core::testing::{TestContext, sample_framework, seed_store};
    use specgate_core::{
        Dispatcher, Gateway, OutboundOptions, Registry, SpecCache, SwaggerIngester,
    };

    fn server(ctx: &TestContext) -> Arc<GatewayServer> {
        let cache = Arc::new(SpecCache::new(Arc::new(seed_store(ctx, "http://127.0.0.1:9"))));
        cache.init().unwrap();
        let registry = Registry::new(
            cache.clone(),
            SwaggerIngester::new(OutboundOptions::default()).unwrap(),
        );
        let gateway = Gateway::new(cache, Dispatcher::new(OutboundOptions::default()).unwrap());
        Arc::new(GatewayServer::new(Arc::new(registry), gateway))
    }

    #[tokio::test]
    async fn test_get_framework_not_found() {
        let ctx = TestContext::new();
        let response = get_framework(State(server(&ctx)), Path("missing".to_string())).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_create_framework_duplicate() {
        let ctx = TestContext::new();
        let server = server(&ctx);
        let fw = sample_framework("cm-beetle", &["0.4.0"]);

        let response = create_framework(State(server.clone()), Ok(Json(fw.clone()))).await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = create_framework(State(server), Ok(Json(fw))).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_set_active_version_requires_version() {
        let ctx = TestContext::new();
        let response = set_active_version(
            State(server(&ctx)),
            Path("cb-spider".to_string()),
            Ok(Json(SetActiveVersionRequest {
                version: String::new(),
            })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_operations_yaml() {
        let ctx = TestContext::new();
        let response = get_operations(
            State(server(&ctx)),
            Path("cb-tumblebug".to_string()),
            Query(OperationsQuery {
                version: None,
                format: Some("yaml".to_string()),
            }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response.headers()["content-type"].to_str().unwrap();
        assert!(content_type.starts_with("text/plain"));
    }
}
