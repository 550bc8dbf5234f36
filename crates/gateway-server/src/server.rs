//! Listener and serve loop.

use crate::routes::create_router;
use crate::shutdown::shutdown_signal;
use crate::state::AppState;
use std::future::{Future, IntoFuture};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{info, warn};

/// HTTP server for one [`AppState`]
#[derive(Debug)]
pub struct Server {
    state: AppState,
}

impl Server {
    /// Create a server
    #[must_use]
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    /// Address from the configured host and port
    #[must_use]
    pub fn bind_address(&self) -> String {
        let config = self.state.config.load();
        format!("{}:{}", config.server.host, config.server.port)
    }

    /// Bind the configured address and serve until Ctrl+C or SIGTERM
    ///
    /// # Errors
    /// Returns error if binding or serving fails
    pub async fn run(self) -> std::io::Result<()> {
        let listener = TcpListener::bind(self.bind_address()).await?;
        self.serve(listener, shutdown_signal()).await
    }

    /// Serve on `listener` until `signal` resolves, then drain.
    ///
    /// In-flight requests get `server.shutdown_grace`; anything still open
    /// after that is dropped.
    ///
    /// # Errors
    /// Returns error if serving fails
    pub async fn serve<F>(self, listener: TcpListener, signal: F) -> std::io::Result<()>
    where
        F: Future<Output = String> + Send + 'static,
    {
        let addr: SocketAddr = listener.local_addr()?;
        let coordinator = self.state.shutdown.clone();
        let deadline = self.state.shutdown.clone();
        let router = create_router(self.state);

        info!(%addr, "Gateway listening");
        let server = axum::serve(listener, router).with_graceful_shutdown(async move {
            let reason = signal.await;
            coordinator.begin(&reason);
        })
        .into_future();

        tokio::select! {
            result = server => result?,
            () = deadline.deadline() => {
                warn!(in_flight = deadline.in_flight_count(), "Shutdown grace elapsed, dropping open connections");
            }
        }
        info!("Gateway stopped");
        Ok(())
    }
}
