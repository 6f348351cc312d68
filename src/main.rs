use anyhow::{Context, Result};
use moment_capture::config::Config;
use moment_capture::gemini::GeminiClient;
use moment_capture::locator::{GeminiMomentLocator, MomentAnalyzer};
use moment_capture::server::{start_server, AppState};
use moment_capture::storage::{ObjectStore, S3ObjectStore};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load().context("Failed to load configuration")?;

    // Initialize logging
    init_tracing(&config.service.log_level);

    info!(
        service = %config.service.name,
        "Starting moment capture service"
    );

    // Initialize metrics
    init_metrics(config.service.metrics_port)?;

    // Initialize components
    let store: Arc<dyn ObjectStore> = Arc::new(
        S3ObjectStore::new(&config.storage)
            .await
            .context("Failed to initialize object store")?,
    );

    let analyzer: Option<Arc<dyn MomentAnalyzer>> = if config.gemini.api_key.is_some() {
        let client =
            GeminiClient::new(&config.gemini).context("Failed to initialize model client")?;
        info!(model = %config.gemini.model, "video analysis enabled");
        Some(Arc::new(GeminiMomentLocator::new(
            client,
            config.poll_interval(),
            config.gemini.poll_max_attempts,
        )))
    } else {
        warn!("GEMINI_API_KEY not configured - video analysis will be disabled");
        None
    };

    if config.storage.output_bucket.is_none() {
        warn!("OUTPUT_BUCKET not configured - captured frames will not be published");
    }

    let state = AppState {
        store,
        analyzer,
        output_bucket: config.storage.output_bucket.clone(),
    };

    // Spawn webhook server task
    let http_config = config.http.clone();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(state, &http_config).await {
            error!(error = %e, "Webhook server error");
        }
    });

    info!("Moment capture service started successfully");

    // Wait for shutdown signal
    shutdown_signal().await;

    info!("Shutting down moment capture service");

    server_handle.abort();

    info!("Moment capture service stopped");

    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().json())
        .init();
}

/// Initialize Prometheus metrics exporter
fn init_metrics(port: u16) -> Result<()> {
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new();

    builder
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .context("Failed to install Prometheus metrics exporter")?;

    info!(port = port, "Prometheus metrics exporter started");

    Ok(())
}

/// Wait for shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}
