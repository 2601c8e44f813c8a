mod analysis;
mod config;
mod errors;
mod extraction;
mod llm_client;
mod routes;
mod state;

use anyhow::Result;
use std::net::SocketAddr;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use std::sync::Arc;

use crate::analysis::analyzer::{Analyzer, LlmAnalyzer, MockAnalyzer};
use crate::analysis::cache::AnalysisCache;
use crate::analysis::service::AnalysisService;
use crate::analysis::store::{CacheStore, MemoryStore, RedisStore};
use crate::config::Config;
use crate::extraction::PdfTextExtractor;
use crate::llm_client::LlmClient;
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on malformed env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_CRATE_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting résumé analyzer v{}", env!("CARGO_PKG_VERSION"));

    // Initialize cache store (Redis when configured, in-process otherwise)
    let store: Arc<dyn CacheStore> = if config.redis_url.trim().is_empty() {
        warn!("REDIS_URL not set; using in-process cache (not shared across instances)");
        Arc::new(MemoryStore::new())
    } else {
        Arc::new(RedisStore::from_url(&config.redis_url)?)
    };
    let cache = AnalysisCache::new(store, config.cache_ttl, config.cache_timeout);
    info!(
        "Cache initialized (backend: {}, ttl: {}s, timeout: {}ms, single-flight: {})",
        cache.backend(),
        config.cache_ttl.as_secs(),
        config.cache_timeout.as_millis(),
        config.cache_single_flight
    );

    // Initialize analyzer (mock mode swaps out the LLM entirely)
    let analyzer: Arc<dyn Analyzer> = if config.use_mock_analyzer() {
        warn!("Mock mode active: analyses return placeholder data; check MOCK_MODE and LLM_API_KEY");
        Arc::new(MockAnalyzer)
    } else {
        let llm = LlmClient::new(
            config.llm_api_key.clone(),
            config.llm_base_url.clone(),
            config.llm_model.clone(),
        )?;
        info!("LLM client initialized (model: {})", llm.model());
        Arc::new(LlmAnalyzer(llm))
    };

    let analysis = AnalysisService::new(
        cache,
        analyzer,
        Arc::new(PdfTextExtractor),
        config.cache_single_flight,
    );

    // Build app state
    let state = AppState {
        config: config.clone(),
        analysis: Arc::new(analysis),
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: restrict origins once the frontend domain is fixed

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
