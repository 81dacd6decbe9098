//! Dispatch endpoints
//!
//! The body of every call is a [`CommonRequest`]; an empty body is treated as
//! a request with no parameters and no payload.

use super::envelope_response;
use crate::GatewayServer;
use axum::{
    Extension,
    body::Bytes,
    extract::{Path, State},
    response::Response,
};
use serde::de::DeserializeOwned;
use specgate_core::{CallerContext, CommonRequest, CommonResponse, DirectCall, DispatchResult};
use std::sync::Arc;
use tracing::warn;

#[allow(clippy::result_large_err)]
fn parse_body<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, Response> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| {
        envelope_response(CommonResponse::bad_request(format!(
            "invalid request body: {e}"
        )))
    })
}

fn render(result: DispatchResult) -> Response {
    match result {
        Ok(response) => envelope_response(response),
        Err(failure) => {
            warn!("Dispatch failed: {}", failure.error);
            envelope_response(failure.response)
        }
    }
}

/// POST /api/call/{operationId}
pub async fn call_operation(
    State(server): State<Arc<GatewayServer>>,
    Extension(caller): Extension<CallerContext>,
    Path(operation_id): Path<String>,
    body: Bytes,
) -> Response {
    let request: CommonRequest = match parse_body(&body) {
        Ok(request) => request,
        Err(response) => return response,
    };
    render(
        server
            .gateway
            .call_operation(&caller, &operation_id, &request)
            .await,
    )
}

/// POST /api/call/{subsystem}/{operationId}
pub async fn call_subsystem_operation(
    State(server): State<Arc<GatewayServer>>,
    Extension(caller): Extension<CallerContext>,
    Path((subsystem, operation_id)): Path<(String, String)>,
    body: Bytes,
) -> Response {
    let request: CommonRequest = match parse_body(&body) {
        Ok(request) => request,
        Err(response) => return response,
    };
    render(
        server
            .gateway
            .call_subsystem_operation(&caller, &subsystem, &operation_id, &request)
            .await,
    )
}

/// POST /api/direct-call
pub async fn direct_call(State(server): State<Arc<GatewayServer>>, body: Bytes) -> Response {
    let call: DirectCall = match parse_body(&body) {
        Ok(call) => call,
        Err(response) => return response,
    };
    render(server.gateway.direct_call(&call).await)
}
