use anyhow::{Context, Result};
use facemark_core::DetectionPipeline;
use tracing_subscriber::EnvFilter;

mod config;
mod engine;
mod http;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = config::Config::from_env();
    tracing::info!(
        bind = %config.bind_addr,
        model_dir = %config.model_dir.display(),
        intra_threads = config.intra_threads,
        "facemarkd starting"
    );

    // Models load on the first detection request, not here.
    let pipeline = DetectionPipeline::onnx(config.onnx_options());
    let state = http::AppState {
        engine: engine::EngineHandle::new(pipeline),
    };

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    tracing::info!(addr = %listener.local_addr()?, "facemarkd ready");

    axum::serve(listener, http::router(state))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for shutdown signal");
            }
        })
        .await?;

    tracing::info!("facemarkd shutting down");
    Ok(())
}
