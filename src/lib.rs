//! vendor-cache: Multi-tier cache in front of a rate-limited financial data provider.
//!
//! Lookups consult a SQLite record store, then a flat-file cache, then a
//! bounded in-memory LRU in front of the provider:
//!   SQLite records (7 days) → JSON files (7 days) → memory (1 hour) → provider
//!
//! Exposes the cached vendor data over an HTTP API.

pub mod cache;
pub mod config;
pub mod metrics;
pub mod provider;
pub mod server;
pub mod vendor;
