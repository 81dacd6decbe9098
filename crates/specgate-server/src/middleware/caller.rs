//! Caller context extraction
//!
//! Token validation happens upstream in the IAM layer. This middleware only
//! copies what it established into a [`CallerContext`] request extension:
//! the `Authorization` header plus the `X-User-Id`, `X-User-Name` and
//! `X-User-Roles` claim headers.

use axum::{
    extract::Request,
    http::{HeaderMap, header::AUTHORIZATION},
    middleware::Next,
    response::Response,
};
use specgate_core::CallerContext;

/// Header carrying the user id claim
pub const USER_ID_HEADER: &str = "x-user-id";
/// Header carrying the user name claim
pub const USER_NAME_HEADER: &str = "x-user-name";
/// Header carrying comma-separated role claims
pub const USER_ROLES_HEADER: &str = "x-user-roles";

/// Build a caller context from request headers
pub fn caller_context_from_headers(headers: &HeaderMap) -> CallerContext {
    let text = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };

    CallerContext {
        authorization: text(AUTHORIZATION.as_str()),
        user_id: text(USER_ID_HEADER),
        user_name: text(USER_NAME_HEADER),
        roles: text(USER_ROLES_HEADER)
            .map(|roles| {
                roles
                    .split(',')
                    .map(str::trim)
                    .filter(|r| !r.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default(),
    }
}

/// Attach a [`CallerContext`] to every request
pub async fn caller_context_middleware(mut request: Request, next: Next) -> Response {
    let caller = caller_context_from_headers(request.headers());
    request.extensions_mut().insert(caller);
    next.run(request).await
}
