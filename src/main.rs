//! Speech-to-text server entry point.
//!
//! Loads configuration, installs logging and metrics, wires the model loader
//! into the HTTP router and serves until SIGINT or SIGTERM.

use std::sync::Arc;
use tracing::{debug, info, warn};

use seamless_stt_server::{
    config::Config,
    model::RegistryModelLoader,
    server::{create_router, metrics, AppState},
    shutdown::GracefulShutdown,
    telemetry,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Arc::new(Config::load()?);
    telemetry::init_tracing(&config);

    info!(
        model = %config.model_name,
        bind = %config.bind_address(),
        max_content_length = config.max_content_length,
        "Starting speech-to-text service"
    );

    match config.to_toml() {
        Ok(effective) => debug!(config = %effective, "Effective configuration"),
        Err(e) => warn!(error = %e, "Could not render effective configuration"),
    }

    let loader = Arc::new(RegistryModelLoader::new(Arc::clone(&config)));
    let mut state = AppState::new(Arc::clone(&config), loader);
    match metrics::install_recorder() {
        Ok(handle) => state = state.with_metrics(handle),
        Err(e) => warn!(error = %e, "Prometheus recorder unavailable; /metrics disabled"),
    }
    let state = Arc::new(state);

    if config.eager_load {
        let model_state = Arc::clone(&state.model_state);
        tokio::spawn(async move {
            info!("Eager model load requested");
            if let Err(e) = model_state.ensure_loaded().await {
                warn!(error = %e, "Eager model load failed; will retry on first request");
            }
        });
    }

    let app = create_router(state);

    let shutdown = GracefulShutdown::new();
    shutdown.listen_for_signals();

    let listener = tokio::net::TcpListener::bind(config.bind_address()).await?;
    info!("Server listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.signalled())
        .await?;

    info!("Server stopped");
    Ok(())
}
