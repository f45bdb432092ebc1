use std::sync::Arc;
use std::time::Duration;

use mimalloc::MiMalloc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};

use mediaq::config::ServerConfig;
use mediaq::queue::{MemoryStore, QueueManager};
use mediaq::{http, telemetry};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler, continuing without it");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler, continuing without it");
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

    info!("Shutdown signal received, starting graceful shutdown...");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    telemetry::init();
    let config = ServerConfig::from_env();
    config.validate()?;

    let store = Arc::new(MemoryStore::new());
    let queue_manager = QueueManager::new(store);
    queue_manager.register_queue(config.download.clone())?;

    let maintenance = tokio::spawn(
        Arc::clone(&queue_manager)
            .background_tasks(Duration::from_millis(config.maintenance_tick_ms)),
    );

    let addr = format!("{}:{}", config.bind_addr, config.http_port);
    let listener = TcpListener::bind(&addr).await?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        endpoint = %format!("http://{}", addr),
        queues = ?queue_manager.queue_names(),
        "mediaq server ready"
    );

    let router = http::create_router(Arc::clone(&queue_manager));
    if let Err(e) = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!(error = %e, "HTTP server error");
    }

    // Stop claiming, then give running handlers time to finish.
    queue_manager.shutdown();
    let timeout = Duration::from_secs(config.shutdown_timeout_secs);
    if !queue_manager.drain(timeout).await {
        warn!(
            timeout_secs = config.shutdown_timeout_secs,
            "Shutdown timeout reached, forcing exit"
        );
    }
    let _ = maintenance.await;

    info!("Shutdown complete");
    Ok(())
}
