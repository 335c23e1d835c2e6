use anyhow::Context;

use rollcall_api::app::{self, services};
use rollcall_infra::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    rollcall_observability::init();

    let config = AppConfig::from_env().map_err(|err| {
        tracing::error!(error = %err, "invalid configuration");
        err
    })?;

    let services = services::build_services(&config).await?;
    let background = services::Background::start(&services);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    tracing::info!("listening on {}", listener.local_addr()?);

    let served = axum::serve(listener, app::build_app(services))
        .with_graceful_shutdown(shutdown_signal())
        .await;

    background.shutdown().await;
    served.context("http server failed")
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "could not listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
