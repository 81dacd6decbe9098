//! CommonRequest / CommonResponse envelope
//!
//! The uniform contract between callers and the dispatcher, and between the
//! dispatcher and the HTTP boundary. The payload itself stays an opaque
//! `serde_json::Value`.

use crate::error::Error;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Inbound dispatch envelope
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CommonRequest {
    /// Values for `{name}` placeholders of the resource path
    pub path_params: BTreeMap<String, String>,
    /// Query parameters set on the outbound URL
    pub query_params: BTreeMap<String, String>,
    /// Opaque body
    pub request: Value,
}

impl CommonRequest {
    /// Set a path parameter
    pub fn with_path_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.path_params.insert(name.into(), value.into());
        self
    }

    /// Set a query parameter
    pub fn with_query_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query_params.insert(name.into(), value.into());
        self
    }

    /// Replace the body
    pub fn with_request(mut self, request: Value) -> Self {
        self.request = request;
        self
    }
}

/// Status block of a response envelope
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebStatus {
    /// HTTP status code
    pub code: u16,
    /// Status line text, e.g. `200 OK`
    pub message: String,
}

/// Outbound dispatch envelope
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommonResponse {
    /// Decoded downstream body (or raw text when it is not JSON)
    #[serde(default)]
    pub response_data: Value,
    /// Downstream status
    #[serde(default)]
    pub status: WebStatus,
}

impl CommonResponse {
    /// Envelope with an explicit status
    pub fn new(code: u16, message: impl Into<String>, data: Value) -> Self {
        Self {
            response_data: data,
            status: WebStatus {
                code,
                message: message.into(),
            },
        }
    }

    /// 200 with `data`, status text as dispatch renders it
    pub fn ok(data: Value) -> Self {
        Self::new(200, status_text(reqwest::StatusCode::OK), data)
    }

    /// 400 with a message
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(400, message, Value::Null)
    }

    /// 500 with a message
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(500, message, Value::Null)
    }

    /// Error rendered as data: status from [`Error::status_code`]
    pub fn from_error(err: &Error) -> Self {
        Self::new(err.status_code(), err.to_string(), Value::Null)
    }
}

/// Status text in the `"200 OK"` form
pub fn status_text(status: reqwest::StatusCode) -> String {
    match status.canonical_reason() {
        Some(reason) => format!("{} {reason}", status.as_u16()),
        None => status.as_u16().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_wire_shape() {
        let req: CommonRequest = serde_json::from_value(json!({
            "pathParams": {"nsId": "ns1"},
            "queryParams": {"option": "id"},
            "request": {"name": "vm01"}
        }))
        .unwrap();
        assert_eq!(req.path_params["nsId"], "ns1");
        assert_eq!(req.query_params["option"], "id");
        assert_eq!(req.request["name"], "vm01");
    }

    #[test]
    fn test_empty_request_body_defaults() {
        let req: CommonRequest = serde_json::from_value(json!({})).unwrap();
        assert!(req.path_params.is_empty());
        assert!(req.request.is_null());
    }

    #[test]
    fn test_response_wire_shape() {
        let resp = CommonResponse::ok(json!({"id": "ns1"}));
        let value = serde_json::to_value(&resp).unwrap();
        assert_eq!(value["responseData"]["id"], "ns1");
        assert_eq!(value["status"]["code"], 200);
        assert_eq!(value["status"]["message"], "200 OK");
    }

    #[test]
    fn test_from_error() {
        let resp = CommonResponse::from_error(&Error::missing_credential("no token"));
        assert_eq!(resp.status.code, 400);
        assert!(resp.status.message.contains("no token"));
    }

    #[test]
    fn test_status_text() {
        assert_eq!(status_text(reqwest::StatusCode::OK), "200 OK");
        assert_eq!(status_text(reqwest::StatusCode::NOT_FOUND), "404 Not Found");
    }
}
