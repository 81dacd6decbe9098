//! Testing infrastructure for SpecGate Core
//!
//! Shared helpers so unit tests and the server's integration suite build
//! stores and caches the same way.
//!
//! - **TestContext**: owns a temporary conf directory, removed on drop
//! - **Fixtures**: sample frameworks, versions and operation tables
//! - **seed_store**: writes a consistent set of the three registry documents
//!
//! # Usage
//!
//! ```rust,no_run
//! use specgate_core::testing::{TestContext, seed_store};
//!
//! let ctx = TestContext::new();
//! let store = seed_store(&ctx, "http://127.0.0.1:9");
//! assert!(store.load_frameworks().is_ok());
//! ```

mod context;
mod fixtures;

pub use context::TestContext;
pub use fixtures::{operation, sample_framework, sample_version, seed_store};
