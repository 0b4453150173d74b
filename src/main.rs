use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;

use vendor_cache::cache::file_cache::FileCache;
use vendor_cache::cache::orchestrator::CacheOrchestrator;
use vendor_cache::cache::record_store::RecordStore;
use vendor_cache::cache::volatile::VolatileCache;
use vendor_cache::config::{self, Cli, Config};
use vendor_cache::metrics::CacheMetrics;
use vendor_cache::provider::alpha_vantage::AlphaVantageClient;
use vendor_cache::server::api::{build_router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments.
    let cli = Cli::parse();

    // Initialize tracing/logging.
    let filter = if cli.verbose {
        "vendor_cache=debug,tower_http=debug"
    } else {
        "vendor_cache=info,tower_http=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with_target(true)
        .init();

    info!("vendor-cache v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration.
    let mut config = Config::load(&cli.config)?;
    if let Some(listen) = cli.listen {
        config.server.listen = listen;
    }
    let config = Arc::new(config);

    let api_key = config::load_api_key(&config.provider.api_key_env)?;
    info!(
        base_url = %config.provider.base_url,
        timeout_secs = config.provider.timeout_secs,
        "Provider configured"
    );

    info!(
        volatile_capacity = config.tiers.volatile_capacity,
        volatile_ttl_secs = config.tiers.volatile_ttl_secs,
        record_db = %config.tiers.record_db_path.display(),
        file_dir = %config.tiers.file_cache_dir.display(),
        retention_days = config.tiers.retention_days,
        "Cache tiers"
    );

    // Build the tiers and the provider client.
    let records = RecordStore::open(&config.tiers.record_db_path, config.tiers.retention())
        .context("failed to open record store")?;
    let files = FileCache::new(&config.tiers.file_cache_dir, config.tiers.file_retention())
        .await
        .context("failed to create file cache directory")?;
    let volatile = VolatileCache::new(config.tiers.volatile_capacity, config.tiers.volatile_ttl());
    let client = Arc::new(AlphaVantageClient::new(&config.provider, api_key)?);
    let metrics = CacheMetrics::new()?;

    let orchestrator = Arc::new(CacheOrchestrator::new(
        volatile,
        records,
        files,
        client.clone(),
        metrics.clone(),
    ));

    // Build application state.
    let state = Arc::new(AppState {
        orchestrator,
        client,
        config: config.clone(),
        metrics,
        start_time: Instant::now(),
    });

    // Build the HTTP router.
    let app = build_router(state);

    // Start the server.
    let listen_addr = &config.server.listen;
    info!(addr = %listen_addr, "Starting server");

    let listener = TcpListener::bind(listen_addr).await?;
    info!("Listening on {listen_addr}");

    axum::serve(listener, app).await?;

    Ok(())
}
