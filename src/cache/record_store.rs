//! Durable record store: SQLite rows keyed by (data kind, symbol).
//!
//! Every entry carries an explicit `expires_at` computed once at write
//! time. Expiry is a filter on read; expired rows stay in the table until
//! the next upsert for the key or a bulk clear.
//!
//! Each public operation opens its own connection and runs inside its own
//! transaction. A transaction that is dropped without commit rolls back,
//! and the connection closes when it goes out of scope, so every exit path
//! releases it.
//!
//! Structured projections (overview rows, income reports per fiscal period,
//! daily closes per date) are written after the entry commits, in a
//! separate transaction. They are never read back by the cache.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use serde::Serialize;
use tracing::{debug, warn};

use crate::cache::codec::{Projection, RawPayload};
use crate::cache::key::{CacheKey, DataKind};
use crate::cache::StoreError;

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS cache_entries (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        data_kind TEXT NOT NULL,
        symbol TEXT NOT NULL,
        raw_payload BLOB NOT NULL,
        created_at INTEGER NOT NULL,
        expires_at INTEGER NOT NULL,
        UNIQUE(data_kind, symbol)
    );
    CREATE INDEX IF NOT EXISTS idx_entries_created ON cache_entries(created_at DESC);

    CREATE TABLE IF NOT EXISTS company_overviews (
        symbol TEXT PRIMARY KEY,
        name TEXT,
        market_cap INTEGER,
        pe_ratio REAL,
        ebitda INTEGER,
        updated_at INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS income_reports (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        symbol TEXT NOT NULL,
        fiscal_date_ending TEXT NOT NULL,
        total_revenue INTEGER,
        net_income INTEGER,
        updated_at INTEGER NOT NULL,
        UNIQUE(symbol, fiscal_date_ending)
    );

    CREATE TABLE IF NOT EXISTS daily_closes (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        symbol TEXT NOT NULL,
        date TEXT NOT NULL,
        close REAL,
        updated_at INTEGER NOT NULL,
        UNIQUE(symbol, date)
    );
    CREATE INDEX IF NOT EXISTS idx_daily_symbol_date ON daily_closes(symbol, date DESC);
"#;

/// A durable cache entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub raw_payload: RawPayload,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Handle to the record store. Cheap to clone; holds no open connection.
#[derive(Debug, Clone)]
pub struct RecordStore {
    path: PathBuf,
    retention: chrono::Duration,
}

impl RecordStore {
    /// Open (creating if needed) the database at `path` and ensure the schema.
    pub fn open(path: impl Into<PathBuf>, retention: chrono::Duration) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let store = Self { path, retention };
        store.connect()?.execute_batch(SCHEMA)?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn retention(&self) -> chrono::Duration {
        self.retention
    }

    fn connect(&self) -> Result<Connection, StoreError> {
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Ok(conn)
    }

    /// Fetch the live entry for `key`, if any.
    pub fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>, StoreError> {
        let now = Utc::now().timestamp_millis();
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;

        let row = tx
            .query_row(
                "SELECT raw_payload, created_at, expires_at FROM cache_entries
                 WHERE data_kind = ?1 AND symbol = ?2 AND expires_at > ?3",
                params![key.kind().as_str(), key.subject(), now],
                |row| {
                    Ok((
                        row.get::<_, Vec<u8>>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)?,
                    ))
                },
            )
            .optional()?;
        tx.commit()?;

        let Some((bytes, created_at, expires_at)) = row else {
            return Ok(None);
        };

        Ok(Some(CacheEntry {
            key: key.clone(),
            raw_payload: key.kind().codec().deserialize(&bytes)?,
            created_at: from_millis(created_at),
            expires_at: from_millis(expires_at),
        }))
    }

    /// Insert or replace the entry for `key`, restarting its retention window.
    pub fn put(&self, key: &CacheKey, payload: &RawPayload) -> Result<CacheEntry, StoreError> {
        let codec = key.kind().codec();
        let bytes = codec.serialize(payload)?;
        // Millisecond precision, matching what the table stores.
        let created_at = from_millis(Utc::now().timestamp_millis());
        let expires_at = created_at + self.retention;

        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO cache_entries (data_kind, symbol, raw_payload, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(data_kind, symbol) DO UPDATE SET
                raw_payload = excluded.raw_payload,
                created_at = excluded.created_at,
                expires_at = excluded.expires_at",
            params![
                key.kind().as_str(),
                key.subject(),
                bytes,
                created_at.timestamp_millis(),
                expires_at.timestamp_millis()
            ],
        )?;
        tx.commit()?;

        let projections = codec.projections(key, payload);
        if !projections.is_empty() {
            match write_projections(&mut conn, &projections, created_at.timestamp_millis()) {
                Ok(()) => debug!(key = %key, rows = projections.len(), "Projections written"),
                Err(e) => warn!(key = %key, error = %e, "Projection write failed"),
            }
        }

        Ok(CacheEntry {
            key: key.clone(),
            raw_payload: payload.clone(),
            created_at,
            expires_at,
        })
    }

    /// Delete every entry and projection row. Returns the number of entries removed.
    pub fn clear_all(&self) -> Result<usize, StoreError> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        let deleted = tx.execute("DELETE FROM cache_entries", [])?;
        tx.execute_batch(
            "DELETE FROM company_overviews;
             DELETE FROM income_reports;
             DELETE FROM daily_closes;",
        )?;
        tx.commit()?;
        Ok(deleted)
    }

    /// Number of stored entries, expired or not.
    pub fn count(&self) -> Result<usize, StoreError> {
        let conn = self.connect()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM cache_entries", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    /// List entries, most recently written first. Expired rows are included.
    pub fn enumerate(
        &self,
        kind: Option<DataKind>,
        symbol: Option<&str>,
        limit: usize,
    ) -> Result<Vec<CacheEntry>, StoreError> {
        let symbol = symbol.map(str::to_uppercase);
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;

        let rows = {
            let mut stmt = tx.prepare(
                "SELECT data_kind, symbol, raw_payload, created_at, expires_at FROM cache_entries
                 WHERE (?1 IS NULL OR data_kind = ?1) AND (?2 IS NULL OR symbol = ?2)
                 ORDER BY created_at DESC, id DESC
                 LIMIT ?3",
            )?;
            let rows = stmt.query_map(
                params![
                    kind.map(|k| k.as_str()),
                    symbol,
                    i64::try_from(limit).unwrap_or(i64::MAX)
                ],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Vec<u8>>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, i64>(4)?,
                    ))
                },
            )?;
            let collected = rows.collect::<Result<Vec<_>, _>>()?;
            collected
        };
        tx.commit()?;

        let mut entries = Vec::with_capacity(rows.len());
        for (kind, subject, bytes, created_at, expires_at) in rows {
            let Ok(kind) = kind.parse::<DataKind>() else {
                warn!(data_kind = %kind, symbol = %subject, "Skipping row with unknown data kind");
                continue;
            };
            match kind.codec().deserialize(&bytes) {
                Ok(raw_payload) => entries.push(CacheEntry {
                    key: CacheKey::from_normalized(kind, subject),
                    raw_payload,
                    created_at: from_millis(created_at),
                    expires_at: from_millis(expires_at),
                }),
                Err(e) => warn!(data_kind = %kind, symbol = %subject, error = %e, "Skipping undecodable row"),
            }
        }

        Ok(entries)
    }
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

fn write_projections(
    conn: &mut Connection,
    projections: &[Projection],
    updated_at: i64,
) -> Result<(), StoreError> {
    let tx = conn.transaction()?;
    for projection in projections {
        write_projection(&tx, projection, updated_at)?;
    }
    tx.commit()?;
    Ok(())
}

fn write_projection(tx: &Transaction<'_>, projection: &Projection, updated_at: i64) -> Result<(), StoreError> {
    match projection {
        Projection::Overview {
            symbol,
            name,
            market_cap,
            pe_ratio,
            ebitda,
        } => tx.execute(
            "INSERT INTO company_overviews (symbol, name, market_cap, pe_ratio, ebitda, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(symbol) DO UPDATE SET
                name = excluded.name,
                market_cap = excluded.market_cap,
                pe_ratio = excluded.pe_ratio,
                ebitda = excluded.ebitda,
                updated_at = excluded.updated_at",
            params![symbol, name, market_cap, pe_ratio, ebitda, updated_at],
        )?,
        Projection::IncomeReport {
            symbol,
            fiscal_date_ending,
            total_revenue,
            net_income,
        } => tx.execute(
            "INSERT INTO income_reports (symbol, fiscal_date_ending, total_revenue, net_income, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(symbol, fiscal_date_ending) DO UPDATE SET
                total_revenue = excluded.total_revenue,
                net_income = excluded.net_income,
                updated_at = excluded.updated_at",
            params![symbol, fiscal_date_ending, total_revenue, net_income, updated_at],
        )?,
        Projection::DailyClose { symbol, date, close } => tx.execute(
            "INSERT INTO daily_closes (symbol, date, close, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(symbol, date) DO UPDATE SET
                close = excluded.close,
                updated_at = excluded.updated_at",
            params![symbol, date, close, updated_at],
        )?,
    };
    Ok(())
}
