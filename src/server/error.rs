//! Mapping from domain errors to HTTP responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::cache::StoreError;
use crate::provider::ProviderError;
use crate::vendor::SchemaMismatch;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Schema(#[from] SchemaMismatch),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("{0}")]
    BadRequest(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Provider(ProviderError::RateLimited(_)) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Provider(ProviderError::InvalidSymbol(_)) => StatusCode::BAD_REQUEST,
            ApiError::Provider(ProviderError::EmptyResult) => StatusCode::NOT_FOUND,
            ApiError::Provider(ProviderError::Transport(_)) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Schema(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let detail = match &self {
            ApiError::Store(e) => {
                error!(error = %e, "Storage failure while serving request");
                "Internal server error.".to_string()
            }
            other => other.to_string(),
        };
        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (ApiError::from(ProviderError::RateLimited("x".into())), 429),
            (ApiError::from(ProviderError::InvalidSymbol("x".into())), 400),
            (ApiError::from(ProviderError::EmptyResult), 404),
            (ApiError::from(ProviderError::Transport("x".into())), 503),
            (
                ApiError::from(SchemaMismatch {
                    shape: "overview",
                    reason: "missing field 'Name'".into(),
                }),
                422,
            ),
            (ApiError::BadRequest("bad kind".into()), 400),
        ];
        for (err, expected) in cases {
            assert_eq!(err.status().as_u16(), expected, "{err}");
        }
    }

    #[test]
    fn test_store_error_detail_is_generic() {
        let err = ApiError::from(StoreError::Io(std::io::Error::other("disk on fire")));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
