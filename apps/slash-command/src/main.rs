use anyhow::Result;
use axum::serve;
use mantis_slash::{ServiceConfig, build_app};
use mantis_telemetry::{TelemetryConfig, init_telemetry};
use tokio::net::TcpListener;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_telemetry(TelemetryConfig::from_env(
        "mantis-slash",
        env!("CARGO_PKG_VERSION"),
    ))?;

    let config = ServiceConfig::from_env()?;
    info!(?config, "configuration loaded");
    let router = build_app(&config)?;
    let listener = TcpListener::bind(config.addr).await?;
    info!("mantis-slash listening on {}", config.addr);

    serve(listener, router)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("shutdown signal received");
        })
        .await?;

    Ok(())
}
