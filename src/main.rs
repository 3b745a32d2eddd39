//! live-current server: connects the broker, reconciles subscriptions from the
//! record file on a schedule, and serves current values over HTTP.

use anyhow::Context;
use clap::Parser;
use live_current::{
    router, ApiState, CurrentValueCache, JsonFileDirectory, LiveFeed, RecordDirectory,
    RedisValueEmitter, RefreshScheduler,
};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let dotenv = dotenvy::dotenv();
    let args = cli::Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(err) = dotenv {
        tracing::debug!(error = %err, "no .env file loaded");
    }

    let config = args.feed_config();
    config.validate()?;

    // No initial connectivity, no service.
    let emitter = Arc::new(
        RedisValueEmitter::connect(&config).context("initial broker connection failed")?,
    );

    let cache = Arc::new(CurrentValueCache::new());
    let directory: Arc<dyn RecordDirectory> = Arc::new(JsonFileDirectory::new(&args.records_file));
    let feed = Arc::new(LiveFeed::new(
        emitter.clone(),
        Arc::clone(&directory),
        Arc::clone(&cache),
        config.channel_tag.clone(),
    ));

    feed.refresh()
        .with_context(|| format!("initial refresh from {}", args.records_file.display()))?;
    let scheduler = RefreshScheduler::spawn(Arc::clone(&feed), config.refresh_interval)?;

    let app = router(ApiState::new(cache, directory));
    let listener = tokio::net::TcpListener::bind((args.host.as_str(), args.port)).await?;
    tracing::info!(addr = %listener.local_addr()?, "serving");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("shutting down");
    scheduler.shutdown();
    feed.detach_all();
    emitter.close();
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "cannot listen for shutdown signal");
    }
}
