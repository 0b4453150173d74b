//! Flat-file tier: one JSON file per (data kind, symbol).
//!
//! Validity comes from the file's modification time, not from anything
//! stored inside it. Writes land in a temporary file in the same directory
//! and are renamed over the target, so readers see either the old or the
//! new file in full.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::fs;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::cache::codec::RawPayload;
use crate::cache::key::{CacheKey, DataKind};
use crate::cache::StoreError;

const EXTENSION: &str = "json";

/// Metadata for one cache file, for operational inspection.
#[derive(Debug, Clone, Serialize)]
pub struct FileStatus {
    pub file_name: String,
    pub data_kind: Option<DataKind>,
    pub symbol: Option<String>,
    pub size_bytes: u64,
    pub modified_at: DateTime<Utc>,
    pub age_secs: u64,
    pub valid: bool,
}

#[derive(Debug, Clone)]
pub struct FileCache {
    dir: PathBuf,
    retention: Duration,
}

impl FileCache {
    /// Create the cache, making sure `dir` exists.
    pub async fn new(dir: impl Into<PathBuf>, retention: Duration) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await?;
        Ok(Self { dir, retention })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Deterministic file name for a key: `{DATA_KIND}_{SYMBOL}.json`.
    ///
    /// Bytes outside `[A-Za-z0-9._-]` are written as `%XX`, so distinct
    /// subjects always map to distinct names.
    pub fn file_name(key: &CacheKey) -> String {
        format!("{}_{}.{EXTENSION}", key.kind(), encode_subject(key.subject()))
    }

    pub fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(Self::file_name(key))
    }

    fn age_of(modified: SystemTime) -> Duration {
        // A modification time in the future counts as brand new.
        SystemTime::now().duration_since(modified).unwrap_or(Duration::ZERO)
    }

    /// Read a fresh payload. Missing, stale or undecodable files are absent.
    pub async fn get(&self, key: &CacheKey) -> Result<Option<RawPayload>, StoreError> {
        let path = self.path_for(key);

        let meta = match fs::metadata(&path).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let age = Self::age_of(meta.modified()?);
        if age >= self.retention {
            debug!(key = %key, age_secs = age.as_secs(), "Cache file expired");
            return Ok(None);
        }

        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        match key.kind().codec().deserialize(&bytes) {
            Ok(payload) => Ok(Some(payload)),
            Err(e) => {
                warn!(key = %key, path = %path.display(), error = %e, "Ignoring unreadable cache file");
                Ok(None)
            }
        }
    }

    /// Replace the file for `key` with `payload`.
    pub async fn put(&self, key: &CacheKey, payload: &RawPayload) -> Result<PathBuf, StoreError> {
        let bytes = key.kind().codec().serialize(payload)?;
        let path = self.path_for(key);
        let tmp = self
            .dir
            .join(format!(".{}.{}.tmp", Self::file_name(key), Uuid::new_v4()));

        fs::write(&tmp, &bytes).await?;
        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        debug!(key = %key, path = %path.display(), size = bytes.len(), "Wrote cache file");
        Ok(path)
    }

    async fn cache_files(&self) -> Result<Vec<(PathBuf, String)>, StoreError> {
        let mut files = Vec::new();
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(files),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            let path = entry.path();
            if name.starts_with('.') || path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            if entry.file_type().await?.is_file() {
                files.push((path, name));
            }
        }

        files.sort_by(|a, b| a.1.cmp(&b.1));
        Ok(files)
    }

    /// Every cache file with its size, age and validity.
    pub async fn status(&self) -> Result<Vec<FileStatus>, StoreError> {
        let mut statuses = Vec::new();
        for (path, file_name) in self.cache_files().await? {
            let meta = fs::metadata(&path).await?;
            let modified = meta.modified()?;
            let age = Self::age_of(modified);
            let (data_kind, symbol) = parse_file_name(&file_name);

            statuses.push(FileStatus {
                file_name,
                data_kind,
                symbol,
                size_bytes: meta.len(),
                modified_at: DateTime::<Utc>::from(modified),
                age_secs: age.as_secs(),
                valid: age < self.retention,
            });
        }
        Ok(statuses)
    }

    /// Delete every cache file. Returns how many were removed.
    pub async fn clear(&self) -> Result<usize, StoreError> {
        let mut removed = 0;
        for (path, _) in self.cache_files().await? {
            match fs::remove_file(&path).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(removed)
    }
}

fn is_plain(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || matches!(byte, b'.' | b'-' | b'_')
}

fn encode_subject(subject: &str) -> String {
    let mut encoded = String::with_capacity(subject.len());
    for byte in subject.bytes() {
        if is_plain(byte) {
            encoded.push(char::from(byte));
        } else {
            encoded.push_str(&format!("%{byte:02X}"));
        }
    }
    encoded
}

fn decode_subject(encoded: &str) -> Option<String> {
    let bytes = encoded.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = encoded.get(i + 1..i + 3)?;
            decoded.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            decoded.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(decoded).ok()
}

fn parse_file_name(file_name: &str) -> (Option<DataKind>, Option<String>) {
    let stem = file_name
        .strip_suffix(EXTENSION)
        .and_then(|s| s.strip_suffix('.'))
        .unwrap_or(file_name);

    DataKind::ALL
        .into_iter()
        .find_map(|kind| {
            stem.strip_prefix(kind.as_str())
                .and_then(|rest| rest.strip_prefix('_'))
                .map(|symbol| (Some(kind), decode_subject(symbol)))
        })
        .unwrap_or((None, None))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    const WEEK: Duration = Duration::from_secs(7 * 24 * 3600);

    async fn make_cache(tmp: &TempDir) -> FileCache {
        FileCache::new(tmp.path().join("files"), WEEK).await.unwrap()
    }

    fn backdate(path: &Path, by: Duration) {
        let file = std::fs::File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() - by).unwrap();
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let tmp = TempDir::new().unwrap();
        let cache = make_cache(&tmp).await;
        let key = CacheKey::new(DataKind::IncomeStatement, "aapl");
        let payload = json!({"symbol": "AAPL", "annualReports": []});

        let path = cache.put(&key, &payload).await.unwrap();

        assert!(path.ends_with("INCOME_STATEMENT_AAPL.json"));
        assert_eq!(cache.get(&key).await.unwrap(), Some(payload));
    }

    #[tokio::test]
    async fn test_missing_file_is_absent() {
        let tmp = TempDir::new().unwrap();
        let cache = make_cache(&tmp).await;
        let key = CacheKey::new(DataKind::Overview, "NOPE");
        assert_eq!(cache.get(&key).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_stale_file_is_absent() {
        let tmp = TempDir::new().unwrap();
        let cache = make_cache(&tmp).await;
        let key = CacheKey::new(DataKind::Overview, "IBM");

        let path = cache.put(&key, &json!({"Symbol": "IBM"})).await.unwrap();
        backdate(&path, WEEK + Duration::from_secs(60));

        assert_eq!(cache.get(&key).await.unwrap(), None);
        assert!(path.exists(), "stale file is left in place");
    }

    #[tokio::test]
    async fn test_corrupt_file_is_absent() {
        let tmp = TempDir::new().unwrap();
        let cache = make_cache(&tmp).await;
        let key = CacheKey::new(DataKind::Overview, "IBM");

        std::fs::write(cache.path_for(&key), b"{\"Symbol\": \"IB").unwrap();

        assert_eq!(cache.get(&key).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_put_overwrites_and_leaves_no_temp_files() {
        let tmp = TempDir::new().unwrap();
        let cache = make_cache(&tmp).await;
        let key = CacheKey::new(DataKind::Overview, "MSFT");

        cache.put(&key, &json!({"Name": "first"})).await.unwrap();
        cache.put(&key, &json!({"Name": "second"})).await.unwrap();

        assert_eq!(cache.get(&key).await.unwrap().unwrap()["Name"], "second");
        let names: Vec<_> = std::fs::read_dir(cache.dir())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["OVERVIEW_MSFT.json"]);
    }

    #[test]
    fn test_file_name_is_sanitized() {
        let key = CacheKey::new(DataKind::Overview, "../etc/passwd");
        assert_eq!(FileCache::file_name(&key), "OVERVIEW_..%2FETC%2FPASSWD.json");
    }

    #[test]
    fn test_distinct_subjects_get_distinct_files() {
        let subjects = ["BRK/B", "BRK_B", "BRK%2FB", "BRK B", "BRK.B", "BRK-B", "BRK\\B"];
        let names: std::collections::HashSet<String> = subjects
            .iter()
            .map(|s| FileCache::file_name(&CacheKey::new(DataKind::Overview, s)))
            .collect();
        assert_eq!(names.len(), subjects.len());
    }

    #[tokio::test]
    async fn test_similar_subjects_do_not_share_payloads() {
        let tmp = TempDir::new().unwrap();
        let cache = make_cache(&tmp).await;
        let slash = CacheKey::new(DataKind::Overview, "BRK/B");
        let underscore = CacheKey::new(DataKind::Overview, "BRK_B");

        cache.put(&slash, &json!({"Name": "slash"})).await.unwrap();

        assert_eq!(cache.get(&underscore).await.unwrap(), None);
        assert_eq!(cache.get(&slash).await.unwrap().unwrap()["Name"], "slash");

        let status = cache.status().await.unwrap();
        assert_eq!(status[0].symbol.as_deref(), Some("BRK/B"));
    }

    #[tokio::test]
    async fn test_status_and_clear() {
        let tmp = TempDir::new().unwrap();
        let cache = make_cache(&tmp).await;
        let fresh = CacheKey::new(DataKind::Overview, "AAPL");
        let stale = CacheKey::new(DataKind::DailySeries, "MSFT");

        cache.put(&fresh, &json!({"Symbol": "AAPL"})).await.unwrap();
        let stale_path = cache.put(&stale, &json!({"Meta Data": {}})).await.unwrap();
        backdate(&stale_path, WEEK * 2);
        std::fs::write(cache.dir().join("notes.txt"), b"not a cache file").unwrap();

        let status = cache.status().await.unwrap();
        assert_eq!(status.len(), 2);

        let daily = &status[0];
        assert_eq!(daily.file_name, "DAILY_SERIES_MSFT.json");
        assert_eq!(daily.data_kind, Some(DataKind::DailySeries));
        assert_eq!(daily.symbol.as_deref(), Some("MSFT"));
        assert!(!daily.valid);
        assert!(daily.age_secs >= WEEK.as_secs() * 2);

        let overview = &status[1];
        assert_eq!(overview.data_kind, Some(DataKind::Overview));
        assert!(overview.valid);
        assert!(overview.size_bytes > 0);

        assert_eq!(cache.clear().await.unwrap(), 2);
        assert!(cache.status().await.unwrap().is_empty());
        assert!(cache.dir().join("notes.txt").exists());
    }
}
