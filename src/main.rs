//! Feed Aggregator — Binary Entrypoint
//! Boots the Axum HTTP server, wiring the cache tiers, the provider
//! adapters, and the metrics exporter.

use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use huntrix_feed_aggregator::api::{create_router, AppState};
use huntrix_feed_aggregator::cache::{FeedCache, RedisTier};
use huntrix_feed_aggregator::config::Env;
use huntrix_feed_aggregator::metrics::Metrics;
use huntrix_feed_aggregator::providers::Aggregator;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .compact()
        .init();

    let env = Env::from_env();
    let metrics = Metrics::init();

    let redis = RedisTier::from_env(&env);
    if redis.is_none() {
        info!("redis not configured; cache runs memory-only");
    }
    let cache = Arc::new(FeedCache::new(redis));
    let aggregator = Arc::new(Aggregator::with_default_providers(Arc::clone(&cache), &env));

    let state = AppState {
        aggregator,
        cache,
        env: env.clone(),
    };
    let app = create_router(state).merge(metrics.router());

    let listener = tokio::net::TcpListener::bind(&env.bind_addr)
        .await
        .with_context(|| format!("binding {}", env.bind_addr))?;
    info!(addr = %env.bind_addr, "feed aggregator listening");
    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
