//! Read-through / write-through policy across the three tiers.
//!
//! Lookup order for durable kinds is record store, then file cache, then
//! the volatile tier in front of the provider. A record-store miss that hits
//! the file cache is returned as-is and is not copied back into the record
//! store. After a genuine provider fetch the payload is written to the file
//! cache and then the record store; either write may fail without affecting
//! the other or the response. Non-durable kinds (symbol search) only ever
//! touch the volatile tier.
//!
//! Durable-tier failures are logged and treated as misses. Provider
//! failures are returned to the caller and never stored anywhere.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cache::codec::RawPayload;
use crate::cache::file_cache::{FileCache, FileStatus};
use crate::cache::key::{CacheKey, DataKind};
use crate::cache::record_store::{CacheEntry, RecordStore};
use crate::cache::volatile::VolatileCache;
use crate::cache::StoreError;
use crate::metrics::CacheMetrics;
use crate::provider::{ProviderClient, ProviderError, ProviderRequest};

/// Which tier answered a lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Records,
    Files,
    Volatile,
    Provider,
}

impl Source {
    pub fn as_str(self) -> &'static str {
        match self {
            Source::Records => "records",
            Source::Files => "files",
            Source::Volatile => "volatile",
            Source::Provider => "provider",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct Lookup {
    pub key: CacheKey,
    pub payload: RawPayload,
    pub source: Source,
}

/// Entries removed from each tier by [`CacheOrchestrator::clear_all`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ClearReport {
    pub volatile: usize,
    pub records: usize,
    pub files: usize,
}

pub struct CacheOrchestrator {
    volatile: VolatileCache<ProviderRequest, RawPayload>,
    records: RecordStore,
    files: FileCache,
    provider: Arc<dyn ProviderClient>,
    metrics: CacheMetrics,
}

impl CacheOrchestrator {
    pub fn new(
        volatile: VolatileCache<ProviderRequest, RawPayload>,
        records: RecordStore,
        files: FileCache,
        provider: Arc<dyn ProviderClient>,
        metrics: CacheMetrics,
    ) -> Self {
        Self {
            volatile,
            records,
            files,
            provider,
            metrics,
        }
    }

    pub fn records(&self) -> &RecordStore {
        &self.records
    }

    pub fn files(&self) -> &FileCache {
        &self.files
    }

    pub fn volatile(&self) -> &VolatileCache<ProviderRequest, RawPayload> {
        &self.volatile
    }

    /// Resolve `subject` for `kind`, consulting tiers in order.
    pub async fn get(&self, kind: DataKind, subject: &str) -> Result<Lookup, ProviderError> {
        let codec = kind.codec();
        let key = codec.key(subject);

        if codec.durable() {
            if let Some(payload) = self.check_records(&key).await {
                return Ok(Lookup {
                    key,
                    payload,
                    source: Source::Records,
                });
            }
            if let Some(payload) = self.check_files(&key).await {
                return Ok(Lookup {
                    key,
                    payload,
                    source: Source::Files,
                });
            }
        }

        let request = codec.request(&key);
        let (payload, source) = self.fetch_live(request).await?;

        if codec.durable() && source == Source::Provider {
            self.write_through(&key, &payload).await;
        }

        Ok(Lookup {
            key,
            payload,
            source,
        })
    }

    async fn check_records(&self, key: &CacheKey) -> Option<RawPayload> {
        let store = self.records.clone();
        let lookup_key = key.clone();
        match run_blocking(move || store.get(&lookup_key)).await {
            Ok(Some(entry)) => {
                debug!(key = %key, expires_at = %entry.expires_at, "Record store hit");
                self.metrics.record_lookup(Source::Records.as_str(), "hit");
                Some(entry.raw_payload)
            }
            Ok(None) => {
                self.metrics.record_lookup(Source::Records.as_str(), "miss");
                None
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Record store lookup failed, continuing");
                self.metrics.record_lookup(Source::Records.as_str(), "error");
                None
            }
        }
    }

    async fn check_files(&self, key: &CacheKey) -> Option<RawPayload> {
        match self.files.get(key).await {
            Ok(Some(payload)) => {
                debug!(key = %key, "File cache hit");
                self.metrics.record_lookup(Source::Files.as_str(), "hit");
                Some(payload)
            }
            Ok(None) => {
                self.metrics.record_lookup(Source::Files.as_str(), "miss");
                None
            }
            Err(e) => {
                warn!(key = %key, error = %e, "File cache lookup failed, continuing");
                self.metrics.record_lookup(Source::Files.as_str(), "error");
                None
            }
        }
    }

    /// Volatile tier in front of one provider call.
    async fn fetch_live(&self, request: ProviderRequest) -> Result<(RawPayload, Source), ProviderError> {
        if let Some(payload) = self.volatile.get(&request).await {
            self.metrics.record_lookup(Source::Volatile.as_str(), "hit");
            return Ok((payload, Source::Volatile));
        }
        self.metrics.record_lookup(Source::Volatile.as_str(), "miss");

        let kind = request.key().kind();
        info!(data_kind = %kind, symbol = %request.key().subject(), "Cache miss, fetching from provider");

        let result = self.provider.fetch(&request).await;
        match result {
            Ok(payload) => {
                self.metrics.record_fetch(kind, "ok");
                self.volatile.put(request, payload.clone()).await;
                Ok((payload, Source::Provider))
            }
            Err(e) => {
                warn!(
                    data_kind = %kind,
                    symbol = %request.key().subject(),
                    error = %e,
                    "Provider fetch failed"
                );
                self.metrics.record_fetch(kind, e.label());
                Err(e)
            }
        }
    }

    async fn write_through(&self, key: &CacheKey, payload: &RawPayload) {
        if let Err(e) = self.files.put(key, payload).await {
            warn!(key = %key, error = %e, "File cache write failed");
            self.metrics.record_write_failure(Source::Files.as_str());
        }

        let store = self.records.clone();
        let write_key = key.clone();
        let write_payload = payload.clone();
        match run_blocking(move || store.put(&write_key, &write_payload)).await {
            Ok(entry) => debug!(key = %key, expires_at = %entry.expires_at, "Record stored"),
            Err(e) => {
                warn!(key = %key, error = %e, "Record store write failed");
                self.metrics.record_write_failure(Source::Records.as_str());
            }
        }
    }

    /// Record-store entries, newest first. Expired rows are included.
    pub async fn record_entries(
        &self,
        kind: Option<DataKind>,
        symbol: Option<String>,
        limit: usize,
    ) -> Result<Vec<CacheEntry>, StoreError> {
        let store = self.records.clone();
        run_blocking(move || store.enumerate(kind, symbol.as_deref(), limit)).await
    }

    pub async fn record_count(&self) -> Result<usize, StoreError> {
        let store = self.records.clone();
        run_blocking(move || store.count()).await
    }

    pub async fn file_status(&self) -> Result<Vec<FileStatus>, StoreError> {
        self.files.status().await
    }

    /// Empty every tier. All three are attempted even if one fails.
    pub async fn clear_all(&self) -> Result<ClearReport, StoreError> {
        let volatile = self.volatile.clear().await;
        let store = self.records.clone();
        let records = run_blocking(move || store.clear_all()).await;
        let files = self.files.clear().await;

        let report = ClearReport {
            volatile,
            records: records?,
            files: files?,
        };
        info!(
            volatile = report.volatile,
            records = report.records,
            files = report.files,
            "Cleared cache tiers"
        );
        Ok(report)
    }
}

async fn run_blocking<T, F>(f: F) -> Result<T, StoreError>
where
    F: FnOnce() -> Result<T, StoreError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await?
}
