//! vizrec Proxy
//!
//! Serves the classifier REST API and the web client's static pages.

use anyhow::Result;
use clap::Parser;
use metrics_exporter_prometheus::PrometheusHandle;
use std::net::SocketAddr;
use tokio::signal;
use tracing::{info, warn};

use vizrec_proxy::logging::init_tracing;
use vizrec_proxy::{create_router, AppState, Cli, ProxyConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    init_tracing(cli.verbose);

    info!("Starting vizrec proxy");

    // Load configuration
    let config = ProxyConfig::load(&cli.config, &cli)?;
    info!("Configuration loaded successfully");
    info!("Max upload size: {} bytes", config.max_upload_bytes);
    info!("Allowed origins: {}", config.cors.origins.render());

    // Initialize metrics
    let metrics_handle = init_metrics()?;

    let state = AppState::new(config, Some(metrics_handle))?;
    info!("Using {} adapter", state.service.name());

    let addr: SocketAddr = format!("{}:{}", cli.listen, cli.port).parse()?;
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Proxy listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            shutdown_signal().await;
            warn!("Shutdown signal received, stopping server...");
        })
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Listen for shutdown signals (SIGTERM, SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Initialize metrics exporter and return handle for rendering
fn init_metrics() -> Result<PrometheusHandle> {
    use metrics_exporter_prometheus::PrometheusBuilder;

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install metrics: {}", e))?;

    metrics::describe_counter!(
        "vizrec_requests_total",
        "Total number of API requests by route"
    );
    metrics::describe_counter!(
        "vizrec_upstream_errors_total",
        "Failures reaching the recognition service by operation"
    );
    metrics::describe_histogram!(
        "vizrec_upstream_latency_us",
        metrics::Unit::Microseconds,
        "Recognition service round-trip latency in microseconds by operation"
    );

    info!("Metrics exporter initialized");
    Ok(handle)
}
