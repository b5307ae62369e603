use anyhow::Context;
use payment_verification::api::{self, AppState};
use payment_verification::config::Config;
use payment_verification::service::PaymentService;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env().context("loading configuration")?;

    let db = sled::open(&config.database_path)
        .with_context(|| format!("opening database at {}", config.database_path.display()))?;
    let service = PaymentService::new(Arc::new(db), config.verifier_id.clone())
        .context("opening payment trees")?;

    let addr = config.bind_addr;
    let state = AppState::new(service, config);
    let service = state.service.clone();
    let app = api::router(state);

    info!(addr = %addr, "starting payment verification service");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    service.flush().await.context("flushing database")?;
    info!("payment verification service stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
