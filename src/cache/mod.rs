//! Multi-tier cache for provider payloads.
//!
//! This module contains the tiers and the policy that coordinates them:
//! - [`key`]: DataKind and CacheKey normalization
//! - [`codec`]: Per-kind codec shared by every tier
//! - [`volatile`]: In-process LRU with fixed TTL (tier 1)
//! - [`record_store`]: SQLite records with explicit expiry (tier 2)
//! - [`file_cache`]: One file per key, mtime-based validity (tier 3)
//! - [`orchestrator`]: Read-through / write-through policy across tiers

pub mod codec;
pub mod file_cache;
pub mod key;
pub mod orchestrator;
pub mod record_store;
pub mod volatile;

use thiserror::Error;

use crate::cache::codec::CodecError;

/// Failure inside a durable tier. Always soft on the request path.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Storage task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
