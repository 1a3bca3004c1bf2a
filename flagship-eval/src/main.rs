//! Evaluation API server entrypoint.

use anyhow::{Context, Result};
use flagship_cache::{
    InvalidationSubscriber, MemoryCache, RedisCache, TieredCache, Cache,
};
use flagship_eval::api::{router, AppState};
use flagship_eval::{Config, EvaluationService, PgFlagStore};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::load();

    let store = PgFlagStore::connect(&config.database)
        .await
        .context("Failed to connect to database")?;
    info!("connected to database");

    let l1: Arc<dyn Cache> = Arc::new(MemoryCache::new(config.memory_cache.clone()));
    let l2 = Arc::new(
        RedisCache::connect(config.redis.clone())
            .await
            .context("Failed to connect to redis")?,
    );
    let redis_client = l2.client();
    let cache: Arc<dyn Cache> = Arc::new(TieredCache::new(l1, l2));

    let subscriber = Arc::new(InvalidationSubscriber::new(redis_client, cache.clone()));
    subscriber.start();

    let service = Arc::new(EvaluationService::new(Arc::new(store), Some(cache.clone())));
    let state = Arc::new(AppState { service });
    let app = router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;

    info!(port = config.server.port, "starting evaluation API server");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("shutting down server...");

    let shutdown = async {
        subscriber.stop().await;
        if let Err(err) = cache.close().await {
            error!(error = %err, "failed to close cache");
        }
    };
    if tokio::time::timeout(config.server.shutdown_timeout, shutdown)
        .await
        .is_err()
    {
        error!("shutdown timed out");
    }

    info!("server stopped gracefully");
    Ok(())
}

/// Resolve on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT"),
        _ = terminate => info!("received SIGTERM"),
    }
}
