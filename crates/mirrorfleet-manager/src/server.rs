use std::future::Future;
use std::net::SocketAddr;

use tracing::info;

use crate::error::{ApiError, Result};
use crate::routes::build_router;
use crate::state::AppState;

/// The coordinator HTTP server.
pub struct ManagerServer {
    addr: SocketAddr,
    state: AppState,
}

impl ManagerServer {
    pub fn new(addr: SocketAddr, state: AppState) -> Self {
        Self { addr, state }
    }

    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    /// Serve until the shutdown future resolves. Blocks until the caches are
    /// primed so no request ever sees a half-filled store.
    pub async fn run(
        self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<()> {
        self.state.wait_for_cache_sync().await;

        let router = build_router(self.state);

        info!("Manager server is starting to listen {}", self.addr);
        let listener = tokio::net::TcpListener::bind(self.addr)
            .await
            .map_err(|e| ApiError::Internal(format!("failed to bind {}: {e}", self.addr)))?;

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| ApiError::Internal(format!("server error: {e}")))?;

        info!("Manager server shutdown complete");
        Ok(())
    }
}
