//! Tollgate Gateway - HTTP/WebSocket API gateway
//!
//! This is the main entry point for the gateway service. Configuration is
//! read from the environment; see [`GatewayConfig::from_env`].

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tollgate_gateway::{Gateway, GatewayConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tollgate=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Tollgate Gateway");

    let config = GatewayConfig::from_env()?;
    tracing::info!(
        listen_addr = %config.listen_addr,
        data_dir = %config.data_dir,
        stream = %config.consumer.stream,
        group = %config.consumer.group,
        consumer = %config.consumer.consumer,
        rate_limit_rps = config.rate_limit.requests_per_second,
        rate_limit_burst = config.rate_limit.burst,
        "Gateway configuration loaded"
    );
    let listen_addr = config.listen_addr.clone();

    let gateway = Gateway::start(config)?;
    let app = gateway.router();

    tracing::info!(listen_addr = %listen_addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    gateway.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
