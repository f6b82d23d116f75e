use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use paygate::store::snapshot::{self, PersistedState};
use paygate::{create_router, AppState, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "paygate=debug,tower_http=debug,axum=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;
    info!("Configuration loaded: {:?}", config.server);

    // Restore the ledger (event log, sessions, counters) from the snapshot
    let ledger = snapshot::load(&config.snapshot.path).await;

    // Create shared state
    let state = AppState::new(config.clone(), ledger);

    // Periodic snapshot writer
    let snapshot_state = state.clone();
    let snapshot_path = config.snapshot.path.clone();
    let interval_secs = config.snapshot.interval_secs.max(1);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
        interval.tick().await; // the first tick fires immediately
        loop {
            interval.tick().await;
            let captured = {
                let ledger = snapshot_state.ledger.read().unwrap();
                PersistedState::capture(&ledger)
            };
            snapshot::save(&snapshot_path, &captured).await;
        }
    });

    // Create router
    let app = create_router(state.clone());

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    info!("Gateway listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    // Final snapshot on graceful shutdown
    info!("Shutting down, writing final snapshot");
    let captured = {
        let ledger = state.ledger.read().unwrap();
        PersistedState::capture(&ledger)
    };
    snapshot::save(&config.snapshot.path, &captured).await;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => error!("Failed to install SIGTERM handler: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
