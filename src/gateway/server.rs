//! Server lifecycle: wiring, listening, and graceful shutdown.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use tokio::{net::TcpListener, signal};
use tracing::info;

use super::handler::{AppState, create_router};
use crate::{
    Error, Result,
    auth::AuthService,
    config::Config,
    idp::IdpClient,
    store::{InMemoryTtlStore, spawn_reaper},
};

/// Sweep interval for the store's background reaper.
const REAPER_INTERVAL: Duration = Duration::from_secs(60);

/// The auth gateway server.
pub struct Server {
    config: Config,
}

impl Server {
    /// Create a server from loaded configuration.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Run until a shutdown signal arrives.
    pub async fn run(self) -> Result<()> {
        let addr = SocketAddr::new(
            self.config
                .server
                .host
                .parse()
                .map_err(|e| Error::Configuration(format!("Invalid host: {e}")))?,
            self.config.server.port,
        );

        let (shutdown_tx, _) = tokio::sync::broadcast::channel(1);

        let store = Arc::new(InMemoryTtlStore::new());
        spawn_reaper(Arc::clone(&store), REAPER_INTERVAL, shutdown_tx.subscribe());

        let idp = Arc::new(IdpClient::new(self.config.idp.clone())?);
        let auth = Arc::new(AuthService::new(&self.config, store, idp));

        let app = create_router(
            Arc::new(AppState { auth }),
            self.config.server.request_timeout,
        );

        let listener = TcpListener::bind(addr).await?;
        info!(
            host = %self.config.server.host,
            port = self.config.server.port,
            version = env!("CARGO_PKG_VERSION"),
            "Auth gateway listening"
        );

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal(shutdown_tx))
            .await
            .map_err(|e| Error::Internal(e.to_string()))?;

        info!("Auth gateway stopped");
        Ok(())
    }
}

/// Resolve on Ctrl+C or SIGTERM, fanning the shutdown out to background
/// tasks over the broadcast channel.
async fn shutdown_signal(shutdown_tx: tokio::sync::broadcast::Sender<()>) {
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
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
    let _ = shutdown_tx.send(());
}
