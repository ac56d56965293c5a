mod assessment;
mod cache;
mod config;
mod db;
mod errors;
mod export;
mod extraction;
mod llm_client;
mod models;
mod retry;
mod routes;
mod state;

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::assessment::prompts::{REPORT_MODEL, STRUCTURING_MODEL};
use crate::assessment::Pipeline;
use crate::cache::{RedisStageCache, StageCache};
use crate::config::Config;
use crate::db::{create_pool, init_schema, PgRecordStore};
use crate::export::WeasyPrintRenderer;
use crate::llm_client::LlmClient;
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_CRATE_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Assessor API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize PostgreSQL
    let db = create_pool(&config.database_url).await?;
    init_schema(&db).await?;
    let store = Arc::new(PgRecordStore::new(db));

    // Initialize LLM client
    let llm = Arc::new(LlmClient::new(config.anthropic_api_key.clone())?);
    info!("LLM client initialized (structuring: {STRUCTURING_MODEL}, report: {REPORT_MODEL})");

    // Initialize PDF renderer
    let stylesheet = if config.report_stylesheet.is_file() {
        Some(config.report_stylesheet.clone())
    } else {
        warn!(
            "Report stylesheet {} not found; exporting unstyled PDFs",
            config.report_stylesheet.display()
        );
        None
    };
    let renderer = Arc::new(WeasyPrintRenderer::new(
        config.pdf_renderer_bin.clone(),
        stylesheet,
    ));

    let mut pipeline = Pipeline::new(llm, store, renderer);

    // Initialize Redis stage cache (optional)
    if let Some(redis_url) = &config.redis_url {
        match RedisStageCache::connect(redis_url, config.cache_ttl_secs).await {
            Ok(cache) => {
                info!("Stage cache enabled (ttl {}s)", config.cache_ttl_secs);
                let cache: Arc<dyn StageCache> = Arc::new(cache);
                pipeline = pipeline.with_cache(cache);
            }
            Err(e) => warn!("Redis unavailable, running without stage cache: {e}"),
        }
    } else {
        info!("REDIS_URL not set; stage cache disabled");
    }

    // Build app state
    let state = AppState {
        pipeline: Arc::new(pipeline),
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: restrict origins once the UI has a fixed host

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
