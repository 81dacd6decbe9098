//! Dispatch gateway: resolve -> authorize -> dispatch
//!
//! Failures on this path are returned as data: every error comes back as a
//! [`DispatchFailure`] whose envelope carries the matching status code.

use crate::auth::{normalize_bearer, resolve_authorization};
use crate::cache::SpecCache;
use crate::dispatch::{DispatchFailure, DispatchResult, DispatchTarget, Dispatcher};
use crate::envelope::CommonRequest;
use crate::error::Error;
use crate::resolver::{Resolution, Resolver};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Methods accepted by [`Gateway::direct_call`]
pub const DIRECT_CALL_METHODS: [&str; 5] = ["GET", "POST", "PUT", "DELETE", "PATCH"];

/// Identity of the inbound caller, as established by the IAM layer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallerContext {
    /// Inbound `Authorization` header value
    pub authorization: Option<String>,
    /// Opaque user id claim
    pub user_id: Option<String>,
    /// Opaque user name claim
    pub user_name: Option<String>,
    /// Role claims
    pub roles: Vec<String>,
}

impl CallerContext {
    /// Context carrying only a bearer token
    pub fn with_authorization(authorization: impl Into<String>) -> Self {
        Self {
            authorization: Some(authorization.into()),
            ..Self::default()
        }
    }
}

/// Ad hoc call bypassing the registry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DirectCall {
    /// Base URL of the target
    pub target_url: String,
    /// Path template appended to the base URL
    pub endpoint: String,
    /// One of [`DIRECT_CALL_METHODS`], any case
    pub method: String,
    /// Token sent as `Bearer <token>`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_auth_token: Option<String>,
    /// Path/query parameters and body
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<CommonRequest>,
}

/// Entry point of the dispatch hot path
#[derive(Clone)]
pub struct Gateway {
    resolver: Resolver,
    dispatcher: Dispatcher,
}

impl Gateway {
    /// Gateway resolving against `cache`
    pub fn new(cache: Arc<SpecCache>, dispatcher: Dispatcher) -> Self {
        Self {
            resolver: Resolver::new(cache),
            dispatcher,
        }
    }

    /// Call an operation resolved across all dispatchable services
    pub async fn call_operation(
        &self,
        caller: &CallerContext,
        operation_id: &str,
        request: &CommonRequest,
    ) -> DispatchResult {
        let resolution = self.resolver.resolve_global(operation_id)?;
        self.call_resolved(caller, resolution, request).await
    }

    /// Call an operation of one subsystem
    pub async fn call_subsystem_operation(
        &self,
        caller: &CallerContext,
        subsystem: &str,
        operation_id: &str,
        request: &CommonRequest,
    ) -> DispatchResult {
        let resolution = self.resolver.resolve_scoped(subsystem, operation_id)?;
        self.call_resolved(caller, resolution, request).await
    }

    async fn call_resolved(
        &self,
        caller: &CallerContext,
        resolution: Resolution,
        request: &CommonRequest,
    ) -> DispatchResult {
        debug!(
            "Resolved {} to {} {} on {}",
            resolution.operation_id,
            resolution.spec.method,
            resolution.spec.resource_path,
            resolution.service_key
        );
        let authorization =
            resolve_authorization(&resolution.service, caller.authorization.as_deref())?;
        let target = DispatchTarget {
            method: &resolution.spec.method,
            base_url: &resolution.service.base_url,
            resource_path: &resolution.spec.resource_path,
            authorization: authorization.as_deref(),
        };
        self.dispatcher.dispatch(target, request).await
    }

    /// Call an explicit URL without consulting the registry
    pub async fn direct_call(&self, call: &DirectCall) -> DispatchResult {
        validate_direct_call(call)?;
        let method = call.method.to_ascii_uppercase();
        let authorization = call.target_auth_token.as_deref().and_then(normalize_bearer);
        let default_request = CommonRequest::default();
        let request = call.parameters.as_ref().unwrap_or(&default_request);

        debug!("Direct call {} {}{}", method, call.target_url, call.endpoint);
        let target = DispatchTarget {
            method: &method,
            base_url: &call.target_url,
            resource_path: &call.endpoint,
            authorization: authorization.as_deref(),
        };
        self.dispatcher.dispatch(target, request).await
    }
}

fn validate_direct_call(call: &DirectCall) -> Result<(), DispatchFailure> {
    let required = [
        ("targetUrl", &call.target_url),
        ("endpoint", &call.endpoint),
        ("method", &call.method),
    ];
    if let Some((field, _)) = required.iter().find(|(_, value)| value.is_empty()) {
        return Err(Error::validation(format!("{field} is required")).into());
    }
    let method = call.method.to_ascii_uppercase();
    if !DIRECT_CALL_METHODS.contains(&method.as_str()) {
        return Err(Error::validation(format!("invalid method: {}", call.method)).into());
    }
    Ok(())
}
