//! SwaggerIngester - fetch and flatten OpenAPI / Swagger documents
//!
//! Only the parts needed for dispatch are decoded: `paths`, and for every HTTP
//! method under a path its `operationId`, `summary` and `description`.
//! Everything else in the document is ignored.

use crate::error::{Error, Result};
use crate::http::{OutboundOptions, build_client};
use crate::model::{ApiOperationSpec, OperationTable};
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Decoded subset of a swagger document
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SwaggerSpec {
    /// Path template -> path item
    #[serde(default)]
    pub paths: BTreeMap<String, PathItem>,
}

/// Operations declared under one path.
///
/// Non-method keys (`parameters`, `servers`, `$ref`, ...) are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PathItem {
    /// GET
    pub get: Option<SwaggerOperation>,
    /// PUT
    pub put: Option<SwaggerOperation>,
    /// POST
    pub post: Option<SwaggerOperation>,
    /// DELETE
    pub delete: Option<SwaggerOperation>,
    /// OPTIONS
    pub options: Option<SwaggerOperation>,
    /// HEAD
    pub head: Option<SwaggerOperation>,
    /// PATCH
    pub patch: Option<SwaggerOperation>,
    /// TRACE
    pub trace: Option<SwaggerOperation>,
}

impl PathItem {
    /// `(method, operation)` pairs in a fixed method order
    pub fn operations(&self) -> impl Iterator<Item = (&'static str, &SwaggerOperation)> {
        [
            ("get", &self.get),
            ("put", &self.put),
            ("post", &self.post),
            ("delete", &self.delete),
            ("options", &self.options),
            ("head", &self.head),
            ("patch", &self.patch),
            ("trace", &self.trace),
        ]
        .into_iter()
        .filter_map(|(method, op)| op.as_ref().map(|op| (method, op)))
    }
}

/// One method entry under a path
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SwaggerOperation {
    /// Operation id; entries without one are not dispatchable
    pub operation_id: Option<String>,
    /// Short summary
    pub summary: Option<String>,
    /// Long description
    pub description: Option<String>,
}

/// Fetches swagger documents and turns them into operation tables
#[derive(Debug, Clone)]
pub struct SwaggerIngester {
    client: reqwest::Client,
}

impl SwaggerIngester {
    /// Ingester with its own outbound client
    pub fn new(options: OutboundOptions) -> Result<Self> {
        Ok(Self {
            client: build_client(options)?,
        })
    }

    /// Ingester sharing an existing client
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// GET the document; any transport failure or non-2xx status is a `Fetch` error
    pub async fn fetch_document(&self, url: &str) -> Result<Vec<u8>> {
        debug!("Fetching swagger document from {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::fetch(format!("failed to fetch {url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::fetch(format!("failed to fetch {url}: HTTP {status}")));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::fetch(format!("failed to read body of {url}: {e}")))?;
        Ok(bytes.to_vec())
    }

    /// Fetch, parse and flatten in one go
    pub async fn ingest(&self, url: &str) -> Result<OperationTable> {
        let bytes = self.fetch_document(url).await?;
        let spec = parse_document(&bytes)?;
        let operations = extract_operations(&spec);
        info!("Ingested {} operations from {}", operations.len(), url);
        Ok(operations)
    }
}

/// Decode a swagger document. YAML and JSON are both accepted.
pub fn parse_document(bytes: &[u8]) -> Result<SwaggerSpec> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Err(Error::parse("empty swagger document"));
    }
    serde_yaml::from_slice(bytes).map_err(|e| Error::parse(format!("invalid swagger document: {e}")))
}

/// Flatten paths x methods into an operation table.
///
/// Entries without an operation id are skipped. When the description is
/// empty the summary is used instead.
pub fn extract_operations(spec: &SwaggerSpec) -> OperationTable {
    let mut table = OperationTable::new();
    for (path, item) in &spec.paths {
        for (method, op) in item.operations() {
            let Some(operation_id) = op.operation_id.as_deref().filter(|id| !id.is_empty()) else {
                debug!("Skipping {} {} without operationId", method, path);
                continue;
            };
            let description = op
                .description
                .as_deref()
                .filter(|d| !d.is_empty())
                .or(op.summary.as_deref())
                .unwrap_or_default();
            table.insert(
                operation_id.to_string(),
                ApiOperationSpec {
                    method: method.to_string(),
                    resource_path: path.clone(),
                    description: description.to_string(),
                },
            );
        }
    }
    table
}
