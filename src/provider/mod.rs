//! External financial-data provider boundary.
//!
//! - [`ProviderRequest`]: the exact outbound parameter set for one call
//! - [`ProviderClient`]: one network call per request, classified failures
//! - [`alpha_vantage`]: reqwest-backed client for the Alpha Vantage API

pub mod alpha_vantage;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::cache::codec::RawPayload;
use crate::cache::key::CacheKey;

/// A classified provider failure. Never cached.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("API rate limit reached or invalid key: {0}")]
    RateLimited(String),

    #[error("Invalid API call: {0}")]
    InvalidSymbol(String),

    #[error("Error communicating with external API: {0}")]
    Transport(String),

    #[error("No data returned from API")]
    EmptyResult,
}

impl ProviderError {
    /// Short label for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            ProviderError::RateLimited(_) => "rate_limited",
            ProviderError::InvalidSymbol(_) => "invalid_symbol",
            ProviderError::Transport(_) => "transport",
            ProviderError::EmptyResult => "empty_result",
        }
    }
}

/// Outbound request parameters. Also the volatile tier's key, so two
/// requests collide only if every parameter matches.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProviderRequest {
    key: CacheKey,
    function: &'static str,
    params: Vec<(&'static str, String)>,
}

impl ProviderRequest {
    pub fn new(key: CacheKey, function: &'static str) -> Self {
        Self {
            key,
            function,
            params: Vec::new(),
        }
    }

    /// Append a query parameter.
    pub fn param(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.params.push((name, value.into()));
        self
    }

    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    /// The provider's `function` query parameter.
    pub fn function(&self) -> &'static str {
        self.function
    }

    pub fn params(&self) -> &[(&'static str, String)] {
        &self.params
    }
}

/// Performs one provider call per request.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    async fn fetch(&self, request: &ProviderRequest) -> Result<RawPayload, ProviderError>;
}

/// Separate provider soft errors from usable payloads.
///
/// The provider reports rate limits and unknown symbols inside an otherwise
/// successful response body.
pub fn classify(payload: Value) -> Result<RawPayload, ProviderError> {
    let Some(object) = payload.as_object() else {
        return Err(ProviderError::EmptyResult);
    };
    if object.is_empty() {
        return Err(ProviderError::EmptyResult);
    }

    for notice in ["Information", "Note"] {
        if let Some(info) = object.get(notice) {
            return Err(ProviderError::RateLimited(notice_text(info)));
        }
    }
    if let Some(message) = object.get("Error Message") {
        return Err(ProviderError::InvalidSymbol(notice_text(message)));
    }

    Ok(payload)
}

fn notice_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_classify_passes_real_payload() {
        let payload = json!({"Symbol": "AAPL", "Name": "Apple Inc"});
        assert_eq!(classify(payload.clone()), Ok(payload));
    }

    #[test]
    fn test_classify_rate_limit_notice() {
        let payload = json!({"Information": "Thank you for using Alpha Vantage! Our standard API rate limit is 25 requests per day."});
        assert!(matches!(classify(payload), Err(ProviderError::RateLimited(msg)) if msg.contains("rate limit")));
        assert!(matches!(
            classify(json!({"Note": "slow down"})),
            Err(ProviderError::RateLimited(_))
        ));
    }

    #[test]
    fn test_classify_invalid_symbol() {
        let payload = json!({"Error Message": "Invalid API call. Please retry or visit the documentation."});
        assert!(matches!(classify(payload), Err(ProviderError::InvalidSymbol(_))));
    }

    #[test]
    fn test_classify_empty_and_non_object() {
        assert_eq!(classify(json!({})), Err(ProviderError::EmptyResult));
        assert_eq!(classify(json!(null)), Err(ProviderError::EmptyResult));
        assert_eq!(classify(json!([])), Err(ProviderError::EmptyResult));
    }
}
