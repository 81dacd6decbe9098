//! Middleware modules

pub mod caller;

pub use caller::{caller_context_from_headers, caller_context_middleware};
