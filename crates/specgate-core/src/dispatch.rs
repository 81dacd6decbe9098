//! Dispatcher - executes a resolved call and normalizes the response
//!
//! The outbound request is built from a method, a base URL, a resource path
//! template and a [`CommonRequest`]:
//!
//! 1. `{name}` tokens in the template are replaced by `pathParams[name]`.
//!    Tokens without a value stay in place and are reported with `warn!`.
//! 2. Every `queryParams` entry is set on the URL, replacing any parameter of
//!    the same name already present.
//! 3. A payload carrying a `file` object (top level or under `request`) is
//!    sent as `multipart/form-data` with a `path` field and a `file` part.
//!    Anything else is sent as JSON; a null payload sends no body.
//! 4. The downstream body is decoded as JSON, falling back to the trimmed
//!    text when it is not JSON.

use crate::envelope::{CommonRequest, CommonResponse, status_text};
use crate::error::{Error, Result};
use crate::http::{OutboundOptions, build_client};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::multipart::{Form, Part};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, warn};
use url::Url;

/// A failed dispatch: the envelope to render plus the underlying error
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct DispatchFailure {
    /// Envelope describing the failure (status 500 for transport errors)
    pub response: CommonResponse,
    /// Underlying error
    #[source]
    pub error: Error,
}

impl DispatchFailure {
    /// Failure whose envelope mirrors the error's status code
    pub fn from_error(error: Error) -> Self {
        Self {
            response: CommonResponse::from_error(&error),
            error,
        }
    }

    fn transport(error: reqwest::Error) -> Self {
        let message = error.to_string();
        Self {
            response: CommonResponse::new(
                500,
                "500 Internal Server Error",
                Value::String(message.clone()),
            ),
            error: Error::transport(message),
        }
    }
}

impl From<Error> for DispatchFailure {
    fn from(error: Error) -> Self {
        Self::from_error(error)
    }
}

/// Outcome of a dispatch
pub type DispatchResult = std::result::Result<CommonResponse, DispatchFailure>;

/// One outbound call, fully described
#[derive(Debug, Clone, Copy)]
pub struct DispatchTarget<'a> {
    /// HTTP method, any case
    pub method: &'a str,
    /// Base URL of the service
    pub base_url: &'a str,
    /// Path template, e.g. `/ns/{nsId}`
    pub resource_path: &'a str,
    /// Authorization header value, if any
    pub authorization: Option<&'a str>,
}

/// Executes outbound calls on a shared client
#[derive(Debug, Clone)]
pub struct Dispatcher {
    client: reqwest::Client,
}

impl Dispatcher {
    /// Dispatcher with its own client
    pub fn new(options: OutboundOptions) -> Result<Self> {
        Ok(Self {
            client: build_client(options)?,
        })
    }

    /// Dispatcher sharing an existing client
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Execute the call described by `target` with `request`.
    ///
    /// Transport failures produce a 500 envelope with the error text as data
    /// alongside the error itself. Any HTTP status from downstream, including
    /// 4xx/5xx, is a successful dispatch.
    pub async fn dispatch(
        &self,
        target: DispatchTarget<'_>,
        request: &CommonRequest,
    ) -> DispatchResult {
        let url = build_url(target.base_url, target.resource_path, request)?;
        let method = parse_method(target.method)?;
        debug!("Dispatching {} {}", method, url);

        let mut builder = self.client.request(method, url);
        if let Some(authorization) = target.authorization.filter(|a| !a.is_empty()) {
            builder = builder.header(AUTHORIZATION, authorization);
        }

        builder = match find_file_upload(&request.request) {
            Some(upload) => {
                debug!("File payload detected, sending multipart/form-data");
                builder.multipart(upload.into_form()?)
            }
            None if request.request.is_null() => builder.header(CONTENT_TYPE, "application/json"),
            None => builder.json(&request.request),
        };

        let response = builder.send().await.map_err(DispatchFailure::transport)?;
        let status = response.status();
        let body = response.bytes().await.map_err(DispatchFailure::transport)?;
        debug!("Downstream answered {} ({} bytes)", status, body.len());

        Ok(CommonResponse::new(
            status.as_u16(),
            status_text(status),
            decode_body(&body),
        ))
    }
}

/// Replace `{name}` tokens with path parameters.
///
/// Returns the substituted path and the names of tokens left unresolved.
pub fn substitute_path_params(
    template: &str,
    params: &BTreeMap<String, String>,
) -> (String, Vec<String>) {
    let mut out = String::with_capacity(template.len());
    let mut unresolved = Vec::new();
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        let Some(close) = rest[open..].find('}').map(|i| open + i) else {
            break;
        };
        out.push_str(&rest[..open]);
        let name = &rest[open + 1..close];
        match params.get(name) {
            Some(value) => out.push_str(value),
            None => {
                out.push_str(&rest[open..=close]);
                unresolved.push(name.to_string());
            }
        }
        rest = &rest[close + 1..];
    }
    out.push_str(rest);
    (out, unresolved)
}

/// Join base URL and substituted path, then apply query parameters
pub fn build_url(base_url: &str, resource_path: &str, request: &CommonRequest) -> Result<Url> {
    let (path, unresolved) = substitute_path_params(resource_path, &request.path_params);
    if !unresolved.is_empty() {
        warn!(
            "Unresolved path parameters in {}: {}",
            resource_path,
            unresolved.join(", ")
        );
    }

    let joined = match (base_url.ends_with('/'), path.starts_with('/')) {
        (true, true) => format!("{}{}", base_url.trim_end_matches('/'), path),
        (false, false) if !path.is_empty() => format!("{base_url}/{path}"),
        _ => format!("{base_url}{path}"),
    };
    let mut url = Url::parse(&joined)
        .map_err(|e| Error::config(format!("invalid target URL '{joined}': {e}")))?;

    if !request.query_params.is_empty() {
        let kept: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(key, _)| !request.query_params.contains_key(key.as_ref()))
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect();
        url.query_pairs_mut()
            .clear()
            .extend_pairs(kept)
            .extend_pairs(&request.query_params);
    }
    Ok(url)
}

fn parse_method(method: &str) -> Result<reqwest::Method> {
    reqwest::Method::from_bytes(method.trim().to_ascii_uppercase().as_bytes())
        .map_err(|_| Error::validation(format!("invalid HTTP method '{method}'")))
}

fn decode_body(body: &[u8]) -> Value {
    serde_json::from_slice(body)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(body).trim().to_string()))
}

/// File upload found in a payload
#[derive(Debug, Clone, PartialEq)]
pub struct FileUpload<'a> {
    /// `path` form field
    pub path: Option<&'a str>,
    /// The `file` field, normally a `{name, data}` object
    pub file: &'a Value,
}

/// Look for a non-null `file` field at the top level or one level under
/// `request`. Only a `{name, data}` object becomes a file part.
pub fn find_file_upload(payload: &Value) -> Option<FileUpload<'_>> {
    let nested = payload.get("request").filter(|r| r.is_object());
    let file = payload
        .get("file")
        .filter(|f| !f.is_null())
        .or_else(|| nested.and_then(|r| r.get("file")).filter(|f| !f.is_null()))?;
    let path = payload
        .get("path")
        .and_then(Value::as_str)
        .or_else(|| nested.and_then(|r| r.get("path")).and_then(Value::as_str));
    Some(FileUpload { path, file })
}

impl FileUpload<'_> {
    /// Multipart form with the `path` field and the decoded `file` part
    pub fn into_form(self) -> Result<Form> {
        let mut form = Form::new();
        if let Some(path) = self.path.filter(|p| !p.is_empty()) {
            form = form.text("path", path.to_string());
        }

        let name = self.file.get("name").and_then(Value::as_str);
        let data = self.file.get("data").and_then(Value::as_str);
        match (name, data) {
            (Some(name), Some(data)) => {
                let bytes = decode_data_url(data)?;
                form = form.part("file", Part::bytes(bytes).file_name(name.to_string()));
            }
            _ => warn!("File payload without name or data, sending form without file part"),
        }
        Ok(form)
    }
}

/// Decode `data:<mime>;base64,<payload>` or bare base64
pub fn decode_data_url(data: &str) -> Result<Vec<u8>> {
    let encoded = data.split_once(',').map_or(data, |(_, tail)| tail);
    STANDARD
        .decode(encoded.trim())
        .map_err(|e| Error::validation(format!("file data is not valid base64: {e}")))
}
