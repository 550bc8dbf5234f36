//! Graceful shutdown handling for the gateway.
//!
//! Once shutdown starts, new requests get 503 and in-flight requests
//! (including open SSE streams) have `shutdown_grace` to finish.

use crate::error::ApiError;
use crate::state::AppState;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::Notify;
use tracing::{debug, error, info};

/// Shutdown coordinator tracking in-flight requests
#[derive(Debug)]
pub struct ShutdownCoordinator {
    grace: Duration,
    triggered: AtomicBool,
    in_flight: AtomicU64,
    notify: Notify,
}

impl ShutdownCoordinator {
    /// Create a coordinator allowing `grace` for in-flight requests
    #[must_use]
    pub fn new(grace: Duration) -> Self {
        Self {
            grace,
            triggered: AtomicBool::new(false),
            in_flight: AtomicU64::new(0),
            notify: Notify::new(),
        }
    }

    /// Check if shutdown is in progress
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }

    /// Get the number of in-flight requests
    #[must_use]
    pub fn in_flight_count(&self) -> u64 {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Stop accepting requests
    pub fn begin(&self, reason: &str) {
        if self
            .triggered
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }
        info!(
            reason = %reason,
            in_flight = self.in_flight_count(),
            grace_ms = self.grace.as_millis(),
            "Initiating graceful shutdown"
        );
        self.notify.notify_waiters();
    }

    /// Resolves once shutdown has started and the grace period elapsed
    pub async fn deadline(&self) {
        let notified = self.notify.notified();
        if !self.is_shutting_down() {
            notified.await;
        }
        tokio::time::sleep(self.grace).await;
    }

    fn request_start(&self) {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
    }

    fn request_complete(&self) {
        let prev = self.in_flight.fetch_sub(1, Ordering::SeqCst);
        debug!(in_flight = prev.saturating_sub(1), "Request completed");
    }
}

/// Request guard that tracks request lifecycle
#[derive(Debug)]
pub struct RequestGuard {
    coordinator: Arc<ShutdownCoordinator>,
}

impl RequestGuard {
    /// Register a request, or `None` once shutdown started
    #[must_use]
    pub fn new(coordinator: Arc<ShutdownCoordinator>) -> Option<Self> {
        if coordinator.is_shutting_down() {
            return None;
        }
        coordinator.request_start();
        Some(Self { coordinator })
    }
}

impl Drop for RequestGuard {
    fn drop(&mut self) {
        self.coordinator.request_complete();
    }
}

/// Middleware counting in-flight requests and refusing new ones during shutdown.
///
/// The guard travels with the response body so streams count until they end.
pub async fn track_requests(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let Some(guard) = RequestGuard::new(state.shutdown.clone()) else {
        return ApiError::unavailable("gateway is shutting down").into_response();
    };
    let response = next.run(request).await;
    let (parts, body) = response.into_parts();
    let body = axum::body::Body::new(GuardedBody { inner: body, _guard: guard });
    Response::from_parts(parts, body)
}

pin_project_lite::pin_project! {
    struct GuardedBody {
        #[pin]
        inner: axum::body::Body,
        _guard: RequestGuard,
    }
}

impl http_body::Body for GuardedBody {
    type Data = bytes::Bytes;
    type Error = axum::Error;

    fn poll_frame(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Result<http_body::Frame<Self::Data>, Self::Error>>> {
        self.project().inner.poll_frame(cx)
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> http_body::SizeHint {
        self.inner.size_hint()
    }
}

/// Wait for Ctrl+C or SIGTERM and return the signal name
pub async fn shutdown_signal() -> String {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
        "ctrl+c"
    };

    #[cfg(unix)]
    let sigterm = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
        "sigterm"
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<&str>();

    let signal_name = tokio::select! {
        name = ctrl_c => name,
        name = sigterm => name,
    };

    info!(signal = signal_name, "Received shutdown signal");
    signal_name.to_string()
}
