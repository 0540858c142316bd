use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tabscribe::{
    create_router, AppState, BatchSpeechAdapter, Config, SessionRegistry, UpstreamAdapter,
    UpstreamMode, WsSpeechAdapter,
};
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "tabscribe", about = "Tab-audio transcription relay")]
struct Args {
    /// Path to the configuration file (without extension)
    #[arg(long, default_value = "config/tabscribe")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let cfg = Config::load(&args.config)?;

    info!("{} starting", cfg.service.name);

    // Credential resolution happens here, outside the relay core.
    let credential = std::env::var(&cfg.upstream.credentials_env)
        .with_context(|| format!("{} is not set", cfg.upstream.credentials_env))?;

    let upstream: Arc<dyn UpstreamAdapter> = match cfg.upstream.mode {
        UpstreamMode::Streaming => {
            Arc::new(WsSpeechAdapter::new(cfg.upstream.url.clone(), credential))
        }
        UpstreamMode::PerChunk => {
            Arc::new(BatchSpeechAdapter::new(cfg.upstream.url.clone(), credential))
        }
    };
    info!(adapter = upstream.name(), "upstream adapter ready");

    let registry = Arc::new(SessionRegistry::new(upstream));
    let state = AppState::new(Arc::clone(&registry), cfg.session_defaults());
    let router = create_router(state);

    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("listening on {addr}");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown(registry))
        .await
        .context("server error")?;

    Ok(())
}

/// Waits for ctrl-c, then stops every live session so upstream streams get a
/// clean end-of-audio instead of a dropped connection.
async fn shutdown(registry: Arc<SessionRegistry>) {
    if tokio::signal::ctrl_c().await.is_err() {
        return;
    }
    info!("shutdown requested, stopping live sessions");
    registry.stop_all().await;
}
