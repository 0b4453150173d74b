//! Caller-facing vendor shapes.
//!
//! Converts raw provider payloads into the snake_case shapes served by the
//! API. Coercion is lenient: placeholder strings become `"Unknown"` and
//! unparseable numbers become zero. A missing required field is a
//! [`SchemaMismatch`]; the raw payload stays cached either way.

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::cache::codec::RawPayload;

/// Values the provider uses in place of a real field.
const PLACEHOLDERS: [&str; 4] = ["None", "", "N/A", "-"];

const UNKNOWN: &str = "Unknown";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unexpected data format for {shape}: {reason}")]
pub struct SchemaMismatch {
    pub shape: &'static str,
    pub reason: String,
}

impl SchemaMismatch {
    fn missing(shape: &'static str, field: &str) -> Self {
        Self {
            shape,
            reason: format!("missing field '{field}'"),
        }
    }
}

/// Parse a provider number that may arrive as a string or a placeholder.
pub fn parse_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let s = s.trim();
            if PLACEHOLDERS.contains(&s) {
                None
            } else {
                s.parse().ok()
            }
        }
        _ => None,
    }
}

fn is_placeholder(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => PLACEHOLDERS.contains(&s.trim()),
        _ => false,
    }
}

fn to_float(value: &Value) -> f64 {
    parse_number(value).unwrap_or_else(|| {
        if !is_placeholder(value) {
            warn!(value = %value, "Could not convert to float");
        }
        0.0
    })
}

fn to_int(value: &Value) -> i64 {
    parse_number(value).map(|n| n as i64).unwrap_or_else(|| {
        if !is_placeholder(value) {
            warn!(value = %value, "Could not convert to int");
        }
        0
    })
}

fn clean_string(value: &Value) -> String {
    if is_placeholder(value) {
        return UNKNOWN.to_string();
    }
    match value {
        Value::String(s) => s.trim().to_string(),
        other => other.to_string(),
    }
}

fn field<'a>(object: &'a Value, shape: &'static str, name: &str) -> Result<&'a Value, SchemaMismatch> {
    object.get(name).ok_or_else(|| SchemaMismatch::missing(shape, name))
}

fn text<'a>(object: &'a Value, shape: &'static str, name: &str) -> Result<&'a str, SchemaMismatch> {
    field(object, shape, name)?.as_str().ok_or_else(|| SchemaMismatch {
        shape,
        reason: format!("field '{name}' is not a string"),
    })
}

/// Summary row for the vendor dashboard.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VendorOverview {
    pub symbol: String,
    pub name: String,
    pub market_cap: i64,
    pub pe_ratio: f64,
    pub ebitda: i64,
}

impl VendorOverview {
    const SHAPE: &'static str = "overview";

    pub fn from_raw(raw: &RawPayload) -> Result<Self, SchemaMismatch> {
        Ok(Self {
            symbol: clean_string(field(raw, Self::SHAPE, "Symbol")?),
            name: clean_string(field(raw, Self::SHAPE, "Name")?),
            market_cap: to_int(field(raw, Self::SHAPE, "MarketCapitalization")?),
            pe_ratio: to_float(field(raw, Self::SHAPE, "PERatio")?),
            ebitda: to_int(field(raw, Self::SHAPE, "EBITDA")?),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IncomeReport {
    pub fiscal_date_ending: String,
    pub total_revenue: i64,
    pub net_income: i64,
}

/// Annual income statements for the deep-dive view.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VendorIncomeStatement {
    pub symbol: String,
    pub annual_reports: Vec<IncomeReport>,
}

impl VendorIncomeStatement {
    const SHAPE: &'static str = "income statement";

    /// `ticker` is the fallback symbol when the payload omits one.
    pub fn from_raw(raw: &RawPayload, ticker: &str) -> Result<Self, SchemaMismatch> {
        let annual_reports = match raw.get("annualReports") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(reports)) => reports
                .iter()
                .map(|report| {
                    Ok(IncomeReport {
                        fiscal_date_ending: text(report, Self::SHAPE, "fiscalDateEnding")?.to_string(),
                        total_revenue: to_int(field(report, Self::SHAPE, "totalRevenue")?),
                        net_income: to_int(field(report, Self::SHAPE, "netIncome")?),
                    })
                })
                .collect::<Result<_, SchemaMismatch>>()?,
            Some(_) => {
                return Err(SchemaMismatch {
                    shape: Self::SHAPE,
                    reason: "'annualReports' is not a list".to_string(),
                })
            }
        };

        Ok(Self {
            symbol: raw
                .get("symbol")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| ticker.to_uppercase()),
            annual_reports,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeSeriesPoint {
    pub date: String,
    pub close: f64,
}

/// Daily closing prices, newest first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VendorDailySeries {
    pub symbol: String,
    pub time_series: Vec<TimeSeriesPoint>,
}

impl VendorDailySeries {
    const SHAPE: &'static str = "daily series";

    pub fn from_raw(raw: &RawPayload, ticker: &str) -> Result<Self, SchemaMismatch> {
        let mut time_series = match raw.get("Time Series (Daily)") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Object(series)) => series
                .iter()
                .map(|(date, bar)| {
                    Ok(TimeSeriesPoint {
                        date: date.clone(),
                        close: to_float(field(bar, Self::SHAPE, "4. close")?),
                    })
                })
                .collect::<Result<Vec<_>, SchemaMismatch>>()?,
            Some(_) => {
                return Err(SchemaMismatch {
                    shape: Self::SHAPE,
                    reason: "'Time Series (Daily)' is not an object".to_string(),
                })
            }
        };
        time_series.sort_by(|a, b| b.date.cmp(&a.date));

        Ok(Self {
            symbol: raw
                .get("Meta Data")
                .and_then(|meta| meta.get("2. Symbol"))
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| ticker.to_uppercase()),
            time_series,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub symbol: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub region: String,
    pub market_open: String,
    pub market_close: String,
    pub timezone: String,
    pub currency: String,
    pub match_score: f64,
}

/// Symbol search hits, restricted to US listings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VendorSearchResponse {
    pub results: Vec<SearchResult>,
}

impl VendorSearchResponse {
    const SHAPE: &'static str = "search results";
    const REGION: &'static str = "United States";

    pub fn from_raw(raw: &RawPayload) -> Result<Self, SchemaMismatch> {
        let matches = raw
            .get("bestMatches")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();

        let results = matches
            .iter()
            .filter(|item| item.get("4. region").and_then(Value::as_str) == Some(Self::REGION))
            .map(|item| {
                let s = |name: &str| text(item, Self::SHAPE, name).map(str::to_string);
                Ok(SearchResult {
                    symbol: s("1. symbol")?,
                    name: s("2. name")?,
                    kind: s("3. type")?,
                    region: s("4. region")?,
                    market_open: s("5. marketOpen")?,
                    market_close: s("6. marketClose")?,
                    timezone: s("7. timezone")?,
                    currency: s("8. currency")?,
                    match_score: to_float(field(item, Self::SHAPE, "9. matchScore")?),
                })
            })
            .collect::<Result<_, SchemaMismatch>>()?;

        Ok(Self { results })
    }
}
