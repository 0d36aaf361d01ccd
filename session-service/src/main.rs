use session_service::{
    build_router,
    config::{Environment, SessionConfig, StoreBackend},
    services::{InMemoryDirectory, MemoryStore, RedisStore, SessionStore},
    AppState,
};
use service_core::observability::{init_tracing, shutdown_tracing};
use std::sync::Arc;
use tokio::{signal, sync::Notify};

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    // Load configuration - fail fast if invalid
    let config = SessionConfig::from_env()?;

    init_tracing(
        &config.service_name,
        &config.log_level,
        config.otlp_endpoint.as_deref(),
    );

    session_service::services::metrics::init_metrics()?;

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
        "Starting session service"
    );

    // One store handle for the whole process
    let store: Arc<dyn SessionStore> = match config.store.backend {
        StoreBackend::Redis => {
            let url = config
                .store
                .redis_url
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("REDIS_URL is required when STORE_BACKEND=redis"))?;
            Arc::new(RedisStore::connect(url, config.store.timeout).await?)
        }
        StoreBackend::Memory => {
            tracing::warn!("Using in-process session store; state is lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    let directory = Arc::new(match &config.directory.seed_path {
        Some(path) => {
            InMemoryDirectory::from_seed_file(path, config.environment == Environment::Dev)?
        }
        None => {
            tracing::warn!("DIRECTORY_SEED_PATH not set; no account can log in");
            InMemoryDirectory::new()?
        }
    });

    let state = AppState::new(config.clone(), store.clone(), directory.clone(), directory)?;
    let app = build_router(state);

    let addr = config.common.socket_addr();
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(address = %addr, "Listening");

    let shutdown = Arc::new(Notify::new());
    let server = tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { shutdown.notified().await })
                .await
        }
    });

    shutdown_signal().await;
    shutdown.notify_one();

    // Give in-flight requests the configured grace period to complete
    let grace = config.common.shutdown_grace();
    match tokio::time::timeout(grace, server).await {
        Ok(joined) => joined.map_err(|e| anyhow::anyhow!("Server task failed: {}", e))??,
        Err(_) => tracing::warn!(
            grace_seconds = grace.as_secs(),
            "Grace period elapsed with requests still in flight"
        ),
    }

    drop(store);
    tracing::info!("Service shutdown complete");
    shutdown_tracing();
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        },
    }
}
