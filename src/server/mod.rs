//! HTTP server exposing vendor data through the cache.
//!
//! - [`api`]: Application state, router and route handlers
//! - [`error`]: Domain error to HTTP status mapping

pub mod api;
pub mod error;
