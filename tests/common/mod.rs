//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use vendor_cache::cache::codec::RawPayload;
use vendor_cache::cache::file_cache::FileCache;
use vendor_cache::cache::orchestrator::CacheOrchestrator;
use vendor_cache::cache::record_store::RecordStore;
use vendor_cache::cache::volatile::VolatileCache;
use vendor_cache::metrics::CacheMetrics;
use vendor_cache::provider::{ProviderClient, ProviderError, ProviderRequest};

pub const WEEK: Duration = Duration::from_secs(7 * 24 * 3600);

/// In-memory provider answering from a script keyed by `{FUNCTION}:{subject}`.
/// Unscripted requests get `EmptyResult`.
#[derive(Default)]
pub struct ScriptedProvider {
    script: Mutex<HashMap<String, Result<RawPayload, ProviderError>>>,
    calls: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(&self, function: &str, subject: &str, result: Result<RawPayload, ProviderError>) {
        self.script
            .lock()
            .unwrap()
            .insert(format!("{function}:{subject}"), result);
    }

    pub fn calls(&self) -> Vec<ProviderRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl ProviderClient for ScriptedProvider {
    async fn fetch(&self, request: &ProviderRequest) -> Result<RawPayload, ProviderError> {
        self.calls.lock().unwrap().push(request.clone());
        let id = format!("{}:{}", request.function(), request.key().subject());
        self.script
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .unwrap_or(Err(ProviderError::EmptyResult))
    }
}

/// Orchestrator over temporary storage.
pub struct Harness {
    pub tmp: TempDir,
    pub orchestrator: Arc<CacheOrchestrator>,
    pub provider: Arc<ScriptedProvider>,
    pub metrics: CacheMetrics,
}

impl Harness {
    pub async fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        let provider = ScriptedProvider::new();
        let metrics = CacheMetrics::new().unwrap();

        let records = RecordStore::open(tmp.path().join("cache.db"), chrono::Duration::days(7)).unwrap();
        let files = FileCache::new(tmp.path().join("files"), WEEK).await.unwrap();
        let orchestrator = Arc::new(CacheOrchestrator::new(
            VolatileCache::new(200, Duration::from_secs(3600)),
            records,
            files,
            provider.clone(),
            metrics.clone(),
        ));

        Self {
            tmp,
            orchestrator,
            provider,
            metrics,
        }
    }

    pub fn db_path(&self) -> PathBuf {
        self.tmp.path().join("cache.db")
    }

    pub fn files_dir(&self) -> PathBuf {
        self.tmp.path().join("files")
    }
}
