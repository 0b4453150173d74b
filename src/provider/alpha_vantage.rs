//! Alpha Vantage HTTP client.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, error};

use crate::cache::codec::RawPayload;
use crate::config::ProviderConfig;
use crate::provider::{classify, ProviderClient, ProviderError, ProviderRequest};

/// Provider client backed by `reqwest`, with a fixed per-call timeout.
pub struct AlphaVantageClient {
    http: reqwest::Client,
    base_url: String,

    /// Swappable at runtime by the reload endpoint.
    api_key: RwLock<String>,
}

impl AlphaVantageClient {
    pub fn new(config: &ProviderConfig, api_key: String) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            base_url: config.base_url.clone(),
            api_key: RwLock::new(api_key),
        })
    }

    /// Replace the API key used for subsequent calls.
    pub async fn set_api_key(&self, api_key: String) {
        *self.api_key.write().await = api_key;
    }
}

#[async_trait]
impl ProviderClient for AlphaVantageClient {
    async fn fetch(&self, request: &ProviderRequest) -> Result<RawPayload, ProviderError> {
        let api_key = self.api_key.read().await.clone();

        let mut query: Vec<(&str, &str)> = vec![("function", request.function())];
        query.extend(request.params().iter().map(|(name, value)| (*name, value.as_str())));
        query.push(("apikey", api_key.as_str()));

        let key = request.key();
        let response = self
            .http
            .get(&self.base_url)
            .query(&query)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| {
                // The request URL carries the API key.
                let e = e.without_url();
                error!(
                    data_kind = %key.kind(),
                    symbol = key.subject(),
                    error = %e,
                    "External API communication error"
                );
                ProviderError::Transport(e.to_string())
            })?;

        let payload: Value = response.json().await.map_err(|e| {
            let e = e.without_url();
            error!(
                data_kind = %key.kind(),
                symbol = key.subject(),
                error = %e,
                "Provider returned an undecodable body"
            );
            ProviderError::Transport(e.to_string())
        })?;

        debug!(data_kind = %key.kind(), symbol = key.subject(), "Provider responded");

        classify(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::key::{CacheKey, DataKind};
    use mockito::Matcher;

    fn client_for(base: &str) -> AlphaVantageClient {
        let config = ProviderConfig {
            base_url: format!("{base}/query"),
            timeout_secs: 2,
            ..Default::default()
        };
        AlphaVantageClient::new(&config, "test-key".to_string()).unwrap()
    }

    fn overview_request(symbol: &str) -> ProviderRequest {
        let key = CacheKey::new(DataKind::Overview, symbol);
        key.kind().codec().request(&key)
    }

    #[tokio::test]
    async fn test_fetch_sends_params_and_key() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/query")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("function".into(), "OVERVIEW".into()),
                Matcher::UrlEncoded("symbol".into(), "AAPL".into()),
                Matcher::UrlEncoded("apikey".into(), "test-key".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"Symbol":"AAPL","Name":"Apple Inc"}"#)
            .create_async()
            .await;

        let client = client_for(&server.url());
        let payload = client.fetch(&overview_request("aapl")).await.unwrap();

        assert_eq!(payload["Name"], "Apple Inc");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_fetch_classifies_rate_limit() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/query")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"Information":"standard API rate limit is 25 requests per day"}"#)
            .create_async()
            .await;

        let client = client_for(&server.url());
        let result = client.fetch(&overview_request("MSFT")).await;

        assert!(matches!(result, Err(ProviderError::RateLimited(_))));
    }

    #[tokio::test]
    async fn test_fetch_http_error_is_transport() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/query")
            .match_query(Matcher::Any)
            .with_status(502)
            .create_async()
            .await;

        let client = client_for(&server.url());
        let result = client.fetch(&overview_request("IBM")).await;

        assert!(matches!(result, Err(ProviderError::Transport(_))));
    }

    #[tokio::test]
    async fn test_transport_error_does_not_expose_api_key() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/query")
            .match_query(Matcher::Any)
            .with_status(502)
            .create_async()
            .await;

        let client = client_for(&server.url());
        client.set_api_key("SECRET-KEY-123".to_string()).await;
        let err = client.fetch(&overview_request("IBM")).await.unwrap_err();

        assert!(matches!(err, ProviderError::Transport(_)));
        let message = err.to_string();
        assert!(!message.contains("SECRET-KEY-123"), "{message}");
        assert!(!message.contains("apikey"), "{message}");
    }

    #[tokio::test]
    async fn test_undecodable_body_error_does_not_expose_api_key() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/query")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("<html>maintenance</html>")
            .create_async()
            .await;

        let client = client_for(&server.url());
        client.set_api_key("SECRET-KEY-123".to_string()).await;
        let message = client.fetch(&overview_request("IBM")).await.unwrap_err().to_string();

        assert!(!message.contains("SECRET-KEY-123"), "{message}");
    }

    #[tokio::test]
    async fn test_fetch_non_json_is_transport() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/query")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("<html>maintenance</html>")
            .create_async()
            .await;

        let client = client_for(&server.url());
        let result = client.fetch(&overview_request("IBM")).await;

        assert!(matches!(result, Err(ProviderError::Transport(_))));
    }

    #[tokio::test]
    async fn test_set_api_key_is_used() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/query")
            .match_query(Matcher::UrlEncoded("apikey".into(), "rotated".into()))
            .with_status(200)
            .with_body(r#"{"Symbol":"IBM"}"#)
            .create_async()
            .await;

        let client = client_for(&server.url());
        client.set_api_key("rotated".to_string()).await;
        client.fetch(&overview_request("IBM")).await.unwrap();

        mock.assert_async().await;
    }
}
