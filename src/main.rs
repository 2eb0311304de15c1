use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use tracing::{error, info};

use movievault::core::config::AppConfig;
use movievault::core::shutdown::{ShutdownCoordinator, SHUTDOWN_TIMEOUT_SECS};
use movievault::delivery::router::{self, AppState};
use movievault::media::repository::MediaRepository;
use movievault::observability::metrics as obs_metrics;
use movievault::storage::memory::InMemoryObjectStore;
use movievault::storage::ObjectStore;

#[tokio::main]
async fn main() -> ExitCode {
    // Install Prometheus metrics recorder before any metrics are recorded.
    let metrics_handle = obs_metrics::install_prometheus_recorder();

    // Install panic hook: log panics with full backtrace and increment counter.
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        obs_metrics::inc_panic_total();
        let backtrace = std::backtrace::Backtrace::force_capture();
        eprintln!("PANIC: {info}\nBacktrace:\n{backtrace}");
        default_hook(info);
    }));

    // Load configuration (layered: default.toml → {env}.toml → env vars)
    let config = match AppConfig::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    init_tracing(
        &config.observability.log_level,
        &config.observability.log_format,
    );

    info!(version = env!("CARGO_PKG_VERSION"), "movievault starting");
    obs_metrics::describe_all_metrics();

    let shutdown = ShutdownCoordinator::new();

    // Connect to the object store. A gateway that cannot reach its store
    // must fail at boot, not on the first request.
    let store: Arc<dyn ObjectStore> = match build_store(&config).await {
        Ok(store) => store,
        Err(e) => {
            error!(error = %e, "object store unavailable at startup");
            return ExitCode::FAILURE;
        }
    };

    let repo = Arc::new(MediaRepository::new(store.clone(), &config.upload));

    let start_time = std::time::Instant::now();
    let app_state = AppState {
        repo,
        store,
        config: config.clone(),
        start_time,
        metrics_handle,
    };
    let app = router::build_router(app_state);

    // Uptime gauge task
    let uptime_cancel = shutdown.token();
    tokio::spawn(async move {
        obs_metrics::run_uptime_task(start_time, uptime_cancel).await;
    });

    let http_addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .expect("invalid HTTP bind address");

    let listener = tokio::net::TcpListener::bind(http_addr)
        .await
        .expect("failed to bind HTTP listener");

    info!(%http_addr, "HTTP server listening");

    // Run HTTP server with graceful shutdown
    let shutdown_token = shutdown.token();
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown_token.cancelled().await;
            })
            .await
    });

    // Wait for SIGINT/SIGTERM
    shutdown.wait_for_signal_and_shutdown().await;

    info!("draining in-flight requests");
    match tokio::time::timeout(
        std::time::Duration::from_secs(SHUTDOWN_TIMEOUT_SECS),
        server,
    )
    .await
    {
        Ok(Ok(Ok(()))) => {
            info!("graceful shutdown completed");
            ExitCode::SUCCESS
        }
        Ok(Ok(Err(e))) => {
            error!(error = %e, "HTTP server error during shutdown");
            ExitCode::FAILURE
        }
        Ok(Err(e)) => {
            error!(error = %e, "HTTP server task panicked");
            ExitCode::FAILURE
        }
        Err(_) => {
            error!("shutdown timed out after {}s, forcing exit", SHUTDOWN_TIMEOUT_SECS);
            ExitCode::FAILURE
        }
    }
}

/// Construct the configured storage backend and probe it.
async fn build_store(config: &AppConfig) -> anyhow::Result<Arc<dyn ObjectStore>> {
    match config.storage.backend.as_str() {
        "memory" => {
            info!("using in-memory object store (no durability)");
            Ok(Arc::new(InMemoryObjectStore::new()))
        }
        "s3" => {
            #[cfg(feature = "s3")]
            {
                let store = movievault::storage::s3::S3ObjectStore::new(&config.storage);
                store.startup_check().await?;
                info!(
                    bucket = %config.storage.bucket,
                    endpoint = %config.storage.endpoint,
                    "connected to S3 object store"
                );
                return Ok(Arc::new(store));
            }
            #[cfg(not(feature = "s3"))]
            anyhow::bail!("storage backend 's3' requires building with the 's3' feature");
        }
        other => anyhow::bail!("unknown storage backend: {other}"),
    }
}

fn init_tracing(log_level: &str, log_format: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    match log_format {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .json()
                .init();
        }
        _ => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
    }
}
