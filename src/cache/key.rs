//! Data kinds and cache keys.
//!
//! A cache key is the pair (data kind, subject). The subject is an
//! uppercased ticker for symbol-keyed kinds and the raw keywords for
//! symbol search. Keys are only built through the kind's codec, so every
//! tier sees the same normalization.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::cache::codec::CacheCodec;

/// The category of provider data being cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DataKind {
    /// Company overview (fundamentals summary).
    Overview,
    /// Annual income statements.
    IncomeStatement,
    /// Compact daily price series.
    DailySeries,
    /// Keyword symbol search.
    SymbolSearch,
}

impl DataKind {
    /// Every data kind, in a stable order.
    pub const ALL: [DataKind; 4] = [
        DataKind::Overview,
        DataKind::IncomeStatement,
        DataKind::DailySeries,
        DataKind::SymbolSearch,
    ];

    /// Stable identifier used in file names and database rows.
    pub fn as_str(&self) -> &'static str {
        match self {
            DataKind::Overview => "OVERVIEW",
            DataKind::IncomeStatement => "INCOME_STATEMENT",
            DataKind::DailySeries => "DAILY_SERIES",
            DataKind::SymbolSearch => "SYMBOL_SEARCH",
        }
    }

    /// The codec responsible for this kind.
    pub fn codec(self) -> &'static dyn CacheCodec {
        crate::cache::codec::codec_for(self)
    }
}

impl fmt::Display for DataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown data kind.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown data kind: {0}")]
pub struct UnknownDataKind(pub String);

impl FromStr for DataKind {
    type Err = UnknownDataKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DataKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownDataKind(s.to_string()))
    }
}

/// A normalized (data kind, subject) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct CacheKey {
    kind: DataKind,
    subject: String,
}

impl CacheKey {
    /// Build a key, applying the kind's normalization to `subject`.
    pub fn new(kind: DataKind, subject: &str) -> Self {
        kind.codec().key(subject)
    }

    /// Build a key from an already-normalized subject.
    pub(crate) fn from_normalized(kind: DataKind, subject: String) -> Self {
        Self { kind, subject }
    }

    pub fn kind(&self) -> DataKind {
        self.kind
    }

    /// Uppercased symbol, or the verbatim keywords for symbol search.
    pub fn subject(&self) -> &str {
        &self.subject
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.kind, self.subject)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_is_uppercased() {
        let key = CacheKey::new(DataKind::Overview, "aapl");
        assert_eq!(key.subject(), "AAPL");
        assert_eq!(key.to_string(), "OVERVIEW_AAPL");
    }

    #[test]
    fn test_search_keywords_kept_verbatim() {
        let key = CacheKey::new(DataKind::SymbolSearch, "tesla Motors");
        assert_eq!(key.subject(), "tesla Motors");
    }

    #[test]
    fn test_same_symbol_different_case_collide() {
        assert_eq!(
            CacheKey::new(DataKind::DailySeries, "msft"),
            CacheKey::new(DataKind::DailySeries, "MSFT")
        );
    }

    #[test]
    fn test_parse_data_kind() {
        assert_eq!("income_statement".parse(), Ok(DataKind::IncomeStatement));
        assert_eq!("DAILY_SERIES".parse(), Ok(DataKind::DailySeries));
        assert!("QUOTE".parse::<DataKind>().is_err());
    }
}
