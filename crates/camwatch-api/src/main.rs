//! camwatch binary: camera runtime plus HTTP API.

use std::net::SocketAddr;

use anyhow::Context;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use camwatch_api::{create_router, metrics, ApiConfig, AppState, HttpServer};
use camwatch_core::{CameraConfig, CameraRuntime, ConfigSource};

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenvy::dotenv().ok();

    let source = ConfigSource::load();
    let camera = CameraConfig::from_source(&source);
    let api = ApiConfig::from_source(&source);

    init_logging(&camera.log_level);

    if let Err(e) = run(camera, api).await {
        error!("Fatal: {:#}", e);
        std::process::exit(1);
    }
}

/// Colored output for dev, JSON when `LOG_FORMAT=json`. `RUST_LOG` wins over
/// the configured level.
fn init_logging(level: &str) {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let level = level.to_lowercase();
    let mut env_filter = EnvFilter::from_default_env();
    for directive in [format!("camwatch={level}"), format!("tower_http={level}")] {
        match directive.parse() {
            Ok(d) => env_filter = env_filter.add_directive(d),
            Err(e) => eprintln!("Ignoring log directive {directive}: {e}"),
        }
    }

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
}

async fn run(camera: CameraConfig, api: ApiConfig) -> anyhow::Result<()> {
    info!("Starting camwatch {}", env!("CARGO_PKG_VERSION"));
    info!(
        stream = %camera.stream_url,
        recordings = %camera.recordings_path.display(),
        "Camera config loaded"
    );
    info!("API config: host={}, port={}", api.host, api.port);

    let metrics_handle = if api.metrics_enabled {
        let handle = metrics::init_metrics().context("Failed to install Prometheus recorder")?;
        info!("Prometheus metrics enabled at /metrics");
        Some(handle)
    } else {
        None
    };

    let addr: SocketAddr = format!("{}:{}", api.host, api.port)
        .parse()
        .context("Invalid bind address")?;

    let runtime = CameraRuntime::start_ffmpeg(&camera)
        .await
        .context("Failed to start camera runtime")?;

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            runtime.shutdown(camera.shutdown_timeout).await;
            return Err(e).with_context(|| format!("Failed to bind {addr}"));
        }
    };

    let app = create_router(AppState::new(api, &camera, &runtime), metrics_handle);
    info!("Listening on {}", addr);

    let mut server = HttpServer::spawn(listener, app);
    tokio::select! {
        _ = shutdown_signal() => {}
        _ = server.stopped() => {}
    }

    // Recordings are finalized before waiting on open HTTP connections
    runtime.shutdown(camera.shutdown_timeout).await;
    server.shutdown(camera.shutdown_timeout).await;
    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("Received shutdown signal");
}
