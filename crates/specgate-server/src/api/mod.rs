//! API handlers
//!
//! Every JSON response is a [`CommonResponse`] envelope whose `status.code`
//! matches the HTTP status of the response.

pub mod dispatch;
pub mod health;
pub mod registry;

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use specgate_core::{CommonResponse, Error};

/// HTTP status for an envelope code.
///
/// Invalid codes map to 500. Statuses that cannot carry a body (1xx, 204,
/// 205, 304) map to 200 so the envelope still reaches the client; the
/// original code stays in `status.code`.
pub fn status_for(code: u16) -> StatusCode {
    match StatusCode::from_u16(code) {
        Ok(status) if carries_body(status) => status,
        Ok(_) => StatusCode::OK,
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn carries_body(status: StatusCode) -> bool {
    !(status.is_informational()
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::RESET_CONTENT
        || status == StatusCode::NOT_MODIFIED)
}

/// Render an envelope with its own status code
pub fn envelope_response(envelope: CommonResponse) -> Response {
    (status_for(envelope.status.code), Json(envelope)).into_response()
}

/// 200 envelope around `data`
pub fn ok_response<T: Serialize>(data: T) -> Response {
    match serde_json::to_value(data) {
        Ok(value) => envelope_response(CommonResponse::ok(value)),
        Err(e) => envelope_response(CommonResponse::internal_error(format!(
            "failed to encode response: {e}"
        ))),
    }
}

/// Error envelope with the error's status code
pub fn error_response(err: &Error) -> Response {
    envelope_response(CommonResponse::from_error(err))
}

/// Render a core result
pub fn result_response<T: Serialize>(result: specgate_core::Result<T>) -> Response {
    match result {
        Ok(data) => ok_response(data),
        Err(e) => error_response(&e),
    }
}

/// Unwrap a JSON body or render the rejection as a 400 envelope
#[allow(clippy::result_large_err)]
pub fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, Response> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| {
            envelope_response(CommonResponse::bad_request(format!(
                "invalid request body: {}",
                rejection.body_text()
            )))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    #[test]
    fn test_status_for() {
        assert_eq!(status_for(201), StatusCode::CREATED);
        assert_eq!(status_for(503), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(status_for(42), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(status_for(204), StatusCode::OK);
        assert_eq!(status_for(304), StatusCode::OK);
        assert_eq!(status_for(101), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_no_content_envelope_keeps_body() {
        let response = envelope_response(CommonResponse::new(204, "204 No Content", Value::Null));
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let envelope: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(envelope["status"], json!({"code": 204, "message": "204 No Content"}));
    }
}
