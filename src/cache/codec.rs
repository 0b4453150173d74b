//! Per-kind cache codecs.
//!
//! Each data kind has one codec that owns everything kind-specific:
//! key normalization, the outbound provider request, the on-disk byte
//! format shared by the record store and the file cache, durability, and
//! the denormalized projections written next to durable entries.

use serde_json::Value;
use thiserror::Error;

use crate::cache::key::{CacheKey, DataKind};
use crate::provider::ProviderRequest;
use crate::vendor::parse_number;

/// Provider-native JSON payload, not yet validated into a caller shape.
pub type RawPayload = Value;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Payload for {0} is not a JSON object")]
    NotAnObject(DataKind),
}

/// A structured row derived from a payload, stored alongside the raw entry.
#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    Overview {
        symbol: String,
        name: Option<String>,
        market_cap: Option<i64>,
        pe_ratio: Option<f64>,
        ebitda: Option<i64>,
    },
    IncomeReport {
        symbol: String,
        fiscal_date_ending: String,
        total_revenue: Option<i64>,
        net_income: Option<i64>,
    },
    DailyClose {
        symbol: String,
        date: String,
        close: Option<f64>,
    },
}

/// Kind-specific behaviour shared by every tier.
pub trait CacheCodec: Send + Sync {
    fn kind(&self) -> DataKind;

    /// Normalize a caller-supplied subject into a key.
    fn key(&self, subject: &str) -> CacheKey {
        CacheKey::from_normalized(self.kind(), subject.to_uppercase())
    }

    /// Whether entries of this kind are written to the durable tiers.
    fn durable(&self) -> bool {
        true
    }

    /// The exact outbound parameter set for a key.
    fn request(&self, key: &CacheKey) -> ProviderRequest;

    fn serialize(&self, payload: &RawPayload) -> Result<Vec<u8>, CodecError> {
        if !payload.is_object() {
            return Err(CodecError::NotAnObject(self.kind()));
        }
        Ok(serde_json::to_vec(payload)?)
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<RawPayload, CodecError> {
        let payload: RawPayload = serde_json::from_slice(bytes)?;
        if !payload.is_object() {
            return Err(CodecError::NotAnObject(self.kind()));
        }
        Ok(payload)
    }

    /// Structured rows for the record store's projection tables.
    fn projections(&self, _key: &CacheKey, _payload: &RawPayload) -> Vec<Projection> {
        Vec::new()
    }
}

pub struct OverviewCodec;
pub struct IncomeStatementCodec;
pub struct DailySeriesCodec;
pub struct SymbolSearchCodec;

static OVERVIEW: OverviewCodec = OverviewCodec;
static INCOME_STATEMENT: IncomeStatementCodec = IncomeStatementCodec;
static DAILY_SERIES: DailySeriesCodec = DailySeriesCodec;
static SYMBOL_SEARCH: SymbolSearchCodec = SymbolSearchCodec;

pub(crate) fn codec_for(kind: DataKind) -> &'static dyn CacheCodec {
    match kind {
        DataKind::Overview => &OVERVIEW,
        DataKind::IncomeStatement => &INCOME_STATEMENT,
        DataKind::DailySeries => &DAILY_SERIES,
        DataKind::SymbolSearch => &SYMBOL_SEARCH,
    }
}

fn text_field(payload: &Value, field: &str) -> Option<String> {
    payload
        .get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn int_field(payload: &Value, field: &str) -> Option<i64> {
    payload.get(field).and_then(parse_number).map(|n| n as i64)
}

impl CacheCodec for OverviewCodec {
    fn kind(&self) -> DataKind {
        DataKind::Overview
    }

    fn request(&self, key: &CacheKey) -> ProviderRequest {
        ProviderRequest::new(key.clone(), "OVERVIEW").param("symbol", key.subject())
    }

    fn projections(&self, key: &CacheKey, payload: &RawPayload) -> Vec<Projection> {
        vec![Projection::Overview {
            symbol: key.subject().to_string(),
            name: text_field(payload, "Name"),
            market_cap: int_field(payload, "MarketCapitalization"),
            pe_ratio: payload.get("PERatio").and_then(parse_number),
            ebitda: int_field(payload, "EBITDA"),
        }]
    }
}

impl CacheCodec for IncomeStatementCodec {
    fn kind(&self) -> DataKind {
        DataKind::IncomeStatement
    }

    fn request(&self, key: &CacheKey) -> ProviderRequest {
        ProviderRequest::new(key.clone(), "INCOME_STATEMENT").param("symbol", key.subject())
    }

    fn projections(&self, key: &CacheKey, payload: &RawPayload) -> Vec<Projection> {
        let Some(reports) = payload.get("annualReports").and_then(Value::as_array) else {
            return Vec::new();
        };

        reports
            .iter()
            .filter_map(|report| {
                Some(Projection::IncomeReport {
                    symbol: key.subject().to_string(),
                    fiscal_date_ending: text_field(report, "fiscalDateEnding")?,
                    total_revenue: int_field(report, "totalRevenue"),
                    net_income: int_field(report, "netIncome"),
                })
            })
            .collect()
    }
}

impl CacheCodec for DailySeriesCodec {
    fn kind(&self) -> DataKind {
        DataKind::DailySeries
    }

    fn request(&self, key: &CacheKey) -> ProviderRequest {
        ProviderRequest::new(key.clone(), "TIME_SERIES_DAILY")
            .param("symbol", key.subject())
            .param("outputsize", "compact")
    }

    fn projections(&self, key: &CacheKey, payload: &RawPayload) -> Vec<Projection> {
        let Some(series) = payload.get("Time Series (Daily)").and_then(Value::as_object) else {
            return Vec::new();
        };

        series
            .iter()
            .map(|(date, bar)| Projection::DailyClose {
                symbol: key.subject().to_string(),
                date: date.clone(),
                close: bar.get("4. close").and_then(parse_number),
            })
            .collect()
    }
}

impl CacheCodec for SymbolSearchCodec {
    fn kind(&self) -> DataKind {
        DataKind::SymbolSearch
    }

    fn key(&self, subject: &str) -> CacheKey {
        CacheKey::from_normalized(DataKind::SymbolSearch, subject.to_string())
    }

    // Keyword results live in the volatile tier only.
    fn durable(&self) -> bool {
        false
    }

    fn request(&self, key: &CacheKey) -> ProviderRequest {
        ProviderRequest::new(key.clone(), "SYMBOL_SEARCH").param("keywords", key.subject())
    }
}
