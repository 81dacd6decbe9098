//! SpecGate Core - API specification registry and dynamic dispatch engine
//!
//! This crate holds everything behind the gateway's HTTP surface:
//! - Versioned framework registry persisted as YAML ([`SpecStore`])
//! - Swagger / OpenAPI ingestion into flat operation tables ([`SwaggerIngester`])
//! - Concurrency-safe in-memory view of the registry ([`SpecCache`])
//! - Operation id resolution, global or scoped to a subsystem ([`Resolver`])
//! - Outbound authorization and dispatch ([`auth`], [`Dispatcher`])
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │     Gateway (hot path)  │  Registry (mgmt)  │
//! └──────────────┬──────────────────┬───────────┘
//!                │                  │
//! ┌──────────────┴───────┐  ┌───────┴───────────┐
//! │ Resolver → Auth →    │  │  SwaggerIngester  │
//! │ Dispatcher           │  │                   │
//! └──────────────┬───────┘  └───────┬───────────┘
//!                │                  │
//! ┌──────────────┴──────────────────┴───────────┐
//! │        SpecCache (RwLock snapshot)          │
//! └──────────────┬──────────────────────────────┘
//!                │
//! ┌──────────────┴──────────────────────────────┐
//! │  SpecStore (frameworks.yaml, apiServerInfo, │
//! │             apiOperationInfo)               │
//! └─────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod auth;
pub mod cache;
pub mod dispatch;
pub mod envelope;
pub mod error;
pub mod gateway;
pub mod http;
pub mod model;
pub mod registry;
pub mod resolver;
pub mod store;
pub mod swagger;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use cache::{CacheSnapshot, SpecCache};
pub use dispatch::{DispatchFailure, DispatchResult, Dispatcher};
pub use envelope::{CommonRequest, CommonResponse, WebStatus};
pub use error::{Error, Result};
pub use gateway::{CallerContext, DirectCall, Gateway};
pub use http::OutboundOptions;
pub use model::{
    ApiOperationSpec, AuthType, Framework, FrameworkVersion, FrameworksConfig, Service,
    make_service_key, parse_service_key,
};
pub use registry::{ApiHost, Registry, RegistryStats, SyncReport};
pub use resolver::{Resolution, Resolver};
pub use store::SpecStore;
pub use swagger::SwaggerIngester;
