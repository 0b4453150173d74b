//! Vendor data HTTP API.
//!
//! Routes:
//! - GET /, GET /health, POST /reload-env, GET /test/{ticker}
//! - GET /api/vendor/{ticker}/overview
//! - GET /api/vendor/{ticker}/income-statement
//! - GET /api/vendor/{ticker}/daily-series
//! - GET /api/search/{keywords}
//! - GET /api/cache/status, DELETE /api/cache
//! - GET /metrics

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Path, Query, Request, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderValue, Method};
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, info_span, warn, Span};

use crate::cache::file_cache::FileStatus;
use crate::cache::key::DataKind;
use crate::cache::orchestrator::{CacheOrchestrator, ClearReport, Lookup};
use crate::config::{self, Config};
use crate::metrics::CacheMetrics;
use crate::provider::alpha_vantage::AlphaVantageClient;
use crate::server::error::ApiError;
use crate::vendor::{
    SchemaMismatch, VendorDailySeries, VendorIncomeStatement, VendorOverview, VendorSearchResponse,
};

const DEFAULT_STATUS_LIMIT: usize = 50;

/// Application state shared across handlers.
pub struct AppState {
    pub orchestrator: Arc<CacheOrchestrator>,

    /// Live provider client, kept for API key rotation.
    pub client: Arc<AlphaVantageClient>,
    pub config: Arc<Config>,
    pub metrics: CacheMetrics,
    pub start_time: Instant,
}

/// Build the axum router with all API routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.config.server.allowed_origins);

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/reload-env", post(reload_env))
        .route("/test/{ticker}", get(test_connection))
        .route("/api/vendor/{ticker}/overview", get(vendor_overview))
        .route("/api/vendor/{ticker}/income-statement", get(income_statement))
        .route("/api/vendor/{ticker}/daily-series", get(daily_series))
        .route("/api/search/{keywords}", get(search))
        .route("/api/cache/status", get(cache_status))
        .route("/api/cache", delete(clear_cache))
        .route("/metrics", get(metrics))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http().make_span_with(request_span))
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(cors)
        .with_state(state)
}

/// Span for one HTTP request, tagged with its `x-request-id`.
fn request_span(request: &Request) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-");
    info_span!(
        "request",
        request_id = %request_id,
        method = %request.method(),
        uri = %request.uri(),
    )
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers(Any)
}

// ─── Request/Response Types ────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct RootResponse {
    pub status: String,
    pub docs_url: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_secs: u64,
    pub tiers: TierSizes,
}

/// Entry counts per tier. `None` when the tier could not be read.
#[derive(Debug, Serialize)]
pub struct TierSizes {
    pub volatile: usize,
    pub records: Option<usize>,
    pub files: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct ReloadResponse {
    pub status: String,
    pub message: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct StatusQuery {
    pub kind: Option<String>,
    pub symbol: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct CacheStatusResponse {
    pub volatile: VolatileStatus,
    pub records: Vec<RecordSummary>,
    pub files: Vec<FileStatus>,
}

#[derive(Debug, Serialize)]
pub struct VolatileStatus {
    pub entries: usize,
    pub capacity: usize,
    pub ttl_secs: u64,
}

/// Record-store entry without its payload.
#[derive(Debug, Serialize)]
pub struct RecordSummary {
    pub data_kind: DataKind,
    pub symbol: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub expired: bool,
}

#[derive(Debug, Serialize)]
pub struct ClearResponse {
    pub status: String,
    pub cleared: ClearReport,
}

// ─── Route Handlers ────────────────────────────────────────────────────────

async fn root() -> Json<RootResponse> {
    Json(RootResponse {
        status: "API is running".to_string(),
        docs_url: "/docs".to_string(),
    })
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let orchestrator = &state.orchestrator;
    let records = orchestrator
        .record_count()
        .await
        .inspect_err(|e| warn!(error = %e, "Record store unavailable for health check"))
        .ok();
    let files = orchestrator
        .file_status()
        .await
        .inspect_err(|e| warn!(error = %e, "File cache unavailable for health check"))
        .ok()
        .map(|files| files.len());

    Json(HealthResponse {
        status: "ok".to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        tiers: TierSizes {
            volatile: orchestrator.volatile().len().await,
            records,
            files,
        },
    })
}

async fn reload_env(State(state): State<Arc<AppState>>) -> Json<ReloadResponse> {
    match config::load_api_key(&state.config.provider.api_key_env) {
        Ok(key) => {
            state.client.set_api_key(key).await;
            info!("Provider API key reloaded");
            Json(ReloadResponse {
                status: "success".to_string(),
                message: "Environment variables reloaded successfully".to_string(),
            })
        }
        Err(e) => {
            warn!(error = %e, "API key reload rejected, keeping current key");
            Json(ReloadResponse {
                status: "error".to_string(),
                message: format!("Invalid API key after reload: {e}"),
            })
        }
    }
}

/// Diagnostic overview fetch. Failures are reported in the body.
async fn test_connection(
    State(state): State<Arc<AppState>>,
    Path(ticker): Path<String>,
) -> Json<Value> {
    match state.orchestrator.get(DataKind::Overview, &ticker).await {
        Ok(lookup) => {
            let object = lookup.payload.as_object().cloned().unwrap_or_default();
            let sample: Map<String, Value> = object
                .iter()
                .take(5)
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            Json(json!({
                "status": "success",
                "ticker": ticker,
                "source": lookup.source,
                "data_keys": object.keys().collect::<Vec<_>>(),
                "symbol_field": object.get("Symbol"),
                "name_field": object.get("Name"),
                "sample_data": sample,
            }))
        }
        Err(e) => Json(json!({
            "status": "error",
            "ticker": ticker,
            "error": e.to_string(),
            "error_type": e.label(),
        })),
    }
}

async fn vendor_overview(
    State(state): State<Arc<AppState>>,
    Path(ticker): Path<String>,
) -> Result<Json<VendorOverview>, ApiError> {
    let lookup = fetch(&state, DataKind::Overview, &ticker).await?;
    let overview = VendorOverview::from_raw(&lookup.payload).map_err(|e| mismatch(&lookup, e))?;
    Ok(Json(overview))
}

async fn income_statement(
    State(state): State<Arc<AppState>>,
    Path(ticker): Path<String>,
) -> Result<Json<VendorIncomeStatement>, ApiError> {
    let lookup = fetch(&state, DataKind::IncomeStatement, &ticker).await?;
    let statement =
        VendorIncomeStatement::from_raw(&lookup.payload, &ticker).map_err(|e| mismatch(&lookup, e))?;
    Ok(Json(statement))
}

async fn daily_series(
    State(state): State<Arc<AppState>>,
    Path(ticker): Path<String>,
) -> Result<Json<VendorDailySeries>, ApiError> {
    let lookup = fetch(&state, DataKind::DailySeries, &ticker).await?;
    let series =
        VendorDailySeries::from_raw(&lookup.payload, &ticker).map_err(|e| mismatch(&lookup, e))?;
    Ok(Json(series))
}

async fn search(
    State(state): State<Arc<AppState>>,
    Path(keywords): Path<String>,
) -> Result<Json<VendorSearchResponse>, ApiError> {
    let lookup = fetch(&state, DataKind::SymbolSearch, &keywords).await?;
    let results = VendorSearchResponse::from_raw(&lookup.payload).map_err(|e| mismatch(&lookup, e))?;
    Ok(Json(results))
}

async fn cache_status(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<CacheStatusResponse>, ApiError> {
    let kind = query
        .kind
        .as_deref()
        .map(str::parse::<DataKind>)
        .transpose()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let limit = query.limit.unwrap_or(DEFAULT_STATUS_LIMIT);

    let orchestrator = &state.orchestrator;
    let now = Utc::now();
    let records = orchestrator
        .record_entries(kind, query.symbol, limit)
        .await?
        .into_iter()
        .map(|entry| RecordSummary {
            data_kind: entry.key.kind(),
            symbol: entry.key.subject().to_string(),
            created_at: entry.created_at,
            expires_at: entry.expires_at,
            expired: entry.is_expired_at(now),
        })
        .collect();

    let volatile = orchestrator.volatile();
    Ok(Json(CacheStatusResponse {
        volatile: VolatileStatus {
            entries: volatile.len().await,
            capacity: volatile.capacity(),
            ttl_secs: volatile.ttl().as_secs(),
        },
        records,
        files: orchestrator.file_status().await?,
    }))
}

async fn clear_cache(State(state): State<Arc<AppState>>) -> Result<Json<ClearResponse>, ApiError> {
    let cleared = state.orchestrator.clear_all().await?;
    Ok(Json(ClearResponse {
        status: "cleared".to_string(),
        cleared,
    }))
}

async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (
        [(CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

// ─── Helpers ───────────────────────────────────────────────────────────────

async fn fetch(state: &AppState, kind: DataKind, subject: &str) -> Result<Lookup, ApiError> {
    let lookup = state.orchestrator.get(kind, subject).await?;
    info!(
        data_kind = %kind,
        key = %lookup.key,
        source = %lookup.source,
        "Served vendor data"
    );
    Ok(lookup)
}

fn mismatch(lookup: &Lookup, e: SchemaMismatch) -> ApiError {
    warn!(key = %lookup.key, source = %lookup.source, error = %e, "Cached payload does not match shape");
    ApiError::Schema(e)
}
