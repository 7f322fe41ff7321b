//! HTTP server lifecycle for the API surface.

use std::net::SocketAddr;

use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{debug, info};

use crate::routes::router;
use crate::state::AppState;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address, port 0 auto-assigns.
    pub bind: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind: SocketAddr::from(([127, 0, 0, 1], 0)) }
    }
}

/// A running API server.
pub struct ApiServer {
    /// The actual bound address.
    pub addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl ApiServer {
    /// Bind and start serving.
    pub async fn start(state: AppState, config: ServerConfig) -> std::io::Result<Self> {
        let listener = TcpListener::bind(config.bind).await?;
        let addr = listener.local_addr()?;
        info!(addr = %addr, "starting API server");

        let app = router(state);
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            let serve = axum::serve(listener, app).with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            });
            if let Err(e) = serve.await {
                debug!(error = %e, "server loop ended with error");
            }
        });

        Ok(Self { addr, shutdown_tx: Some(shutdown_tx), handle: Some(handle) })
    }

    /// The base URL of this server.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Graceful stop.
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
        info!("API server stopped");
    }
}

impl Drop for ApiServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
