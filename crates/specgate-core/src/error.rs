//! Error types for SpecGate Core

use thiserror::Error;

/// Result type alias using SpecGate Error
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for the registry and dispatch engine
#[derive(Error, Debug)]
pub enum Error {
    /// I/O errors from the backing YAML documents
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed persisted document (frameworks / server info / operation info)
    #[error("Decode error: {0}")]
    Decode(String),

    /// Malformed swagger / OpenAPI document
    #[error("Parse error: {0}")]
    Parse(String),

    /// Framework, version, service key or operation id not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Duplicate framework or version on add
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Active version pointing at a version the framework does not declare
    #[error("Invalid reference: {0}")]
    InvalidReference(String),

    /// Service auth configuration is unusable (e.g. basic auth without credentials)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Bearer auth requested but the caller forwarded no token
    #[error("Missing credential: {0}")]
    MissingCredential(String),

    /// Swagger download failed (transport error or non-2xx status)
    #[error("Fetch error: {0}")]
    Fetch(String),

    /// Outbound dispatch failed at the network layer
    #[error("Transport error: {0}")]
    Transport(String),

    /// Request is missing required fields
    #[error("Validation error: {0}")]
    Validation(String),

    /// Service key is not of the form `<framework>_<version>`
    #[error("Invalid service key format: {0}")]
    InvalidServiceKey(String),

    /// Operation id defined by more than one dispatchable service
    #[error("Ambiguous operation id '{operation_id}', defined by: {}", .service_keys.join(", "))]
    AmbiguousOperation {
        /// Requested operation id
        operation_id: String,
        /// Service keys that all define it
        service_keys: Vec<String>,
    },

    /// Cache initialization failed; wraps the underlying load failure
    #[error("Cache initialization failed: {0}")]
    Init(#[source] Box<Error>),
}

impl Error {
    /// Create a decode error
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    /// Create a swagger parse error
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    /// Create a not-found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create an already-exists error
    pub fn already_exists(msg: impl Into<String>) -> Self {
        Self::AlreadyExists(msg.into())
    }

    /// Create an invalid-reference error
    pub fn invalid_reference(msg: impl Into<String>) -> Self {
        Self::InvalidReference(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a missing-credential error
    pub fn missing_credential(msg: impl Into<String>) -> Self {
        Self::MissingCredential(msg.into())
    }

    /// Create a fetch error
    pub fn fetch(msg: impl Into<String>) -> Self {
        Self::Fetch(msg.into())
    }

    /// Create a transport error
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// HTTP status mirroring the error kind.
    ///
    /// Client mistakes map to 400, lookups to 404, ambiguous registry state
    /// to 409 and everything touching disk or network to 500.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_)
            | Self::AlreadyExists(_)
            | Self::InvalidReference(_)
            | Self::InvalidServiceKey(_)
            | Self::Config(_)
            | Self::MissingCredential(_) => 400,
            Self::NotFound(_) => 404,
            Self::AmbiguousOperation { .. } => 409,
            Self::Io(_)
            | Self::Decode(_)
            | Self::Parse(_)
            | Self::Fetch(_)
            | Self::Transport(_)
            | Self::Init(_) => 500,
        }
    }

    /// Whether this is a `NotFound`
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
