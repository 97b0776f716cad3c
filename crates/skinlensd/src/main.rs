use anyhow::{Context, Result};
use skinlens_core::Pipeline;
use tracing_subscriber::EnvFilter;

mod config;
mod engine;
mod http;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = config::Config::load()?;
    tracing::info!(
        bind = %config.bind,
        model = %config.model_path().display(),
        face_policy = %config.face_policy,
        "skinlensd starting"
    );

    // Load models up front so a missing artifact fails startup, not the first request.
    let pipeline =
        Pipeline::load(&config.load_options()).context("failed to load analysis pipeline")?;
    let engine = engine::spawn_engine(pipeline)?;
    tracing::info!(labels = ?engine.info().labels, "models loaded");

    let app = http::router(
        http::AppState::new(engine, config.static_dir.clone()),
        config.max_upload_bytes,
    );

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;
    tracing::info!(addr = %listener.local_addr()?, "skinlensd ready");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("skinlensd shutting down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for ctrl-c; running until killed");
        std::future::pending::<()>().await;
    }
}
