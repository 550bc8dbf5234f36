//! Test helper utilities for integration tests

use gateway_config::{ConfigHandle, GatewayConfig};
use gateway_core::CredentialProvider;
use gateway_pipeline::{PipelineManager, PoolRegistry};
use gateway_server::{AppState, Server};
use once_cell::sync::Lazy;
use reqwest::{Client, Response};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

/// Initialize tracing for tests (only once)
static TRACING: Lazy<()> = Lazy::new(|| {
    if std::env::var("TEST_LOG").is_ok() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }
});

/// Initialize tracing for tests
pub fn init_tracing() {
    Lazy::force(&TRACING);
}

/// A running gateway bound to an ephemeral port
pub struct TestGateway {
    /// The server address
    pub addr: SocketAddr,
    /// HTTP client for making requests
    pub client: Client,
    /// Base URL for the server
    pub base_url: String,
    /// Live configuration, for reload tests
    pub config: ConfigHandle,
    /// Pipeline manager behind the server
    pub manager: PipelineManager,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl TestGateway {
    /// Start a gateway reading keys from the config
    pub async fn start(config: GatewayConfig) -> Self {
        init_tracing();
        let registry = PoolRegistry::from_config(&config).expect("valid config");
        Self::with_registry(config, registry).await
    }

    /// Start a gateway with an external credential source
    pub async fn with_credentials(config: GatewayConfig, credentials: Arc<dyn CredentialProvider>) -> Self {
        init_tracing();
        let registry = PoolRegistry::with_credential_provider(&config, credentials).expect("valid config");
        Self::with_registry(config, registry).await
    }

    async fn with_registry(config: GatewayConfig, registry: PoolRegistry) -> Self {
        let registry = Arc::new(registry);
        let handle = ConfigHandle::new(config);
        drop(registry.follow(handle.clone()));
        let manager = PipelineManager::new(registry);
        let state = AppState::new(manager.clone(), handle.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("Failed to bind");
        let addr = listener.local_addr().expect("Failed to get local addr");
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        tokio::spawn(Server::new(state).serve(listener, async move {
            let _ = shutdown_rx.await;
            "test finished".to_string()
        }));

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create client");

        Self {
            addr,
            client,
            base_url: format!("http://{addr}"),
            config: handle,
            manager,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Get the full URL for a path
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Make a GET request
    pub async fn get(&self, path: &str) -> Response {
        self.client.get(self.url(path)).send().await.expect("Request failed")
    }

    /// POST a JSON body
    pub async fn post(&self, path: &str, body: &Value) -> Response {
        self.post_with_headers(path, body, &[]).await
    }

    /// POST a JSON body with extra headers
    pub async fn post_with_headers(&self, path: &str, body: &Value, headers: &[(&str, &str)]) -> Response {
        let mut builder = self.client.post(self.url(path)).json(body);
        for (key, value) in headers {
            builder = builder.header(*key, *value);
        }
        builder.send().await.expect("Request failed")
    }

    /// Number of requests whose caller protocol is still tracked
    pub fn tracked_requests(&self) -> usize {
        self.manager.registry().correlation().len()
    }
}

impl Drop for TestGateway {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

/// Parsed SSE frame
#[derive(Debug, Clone)]
pub struct SseFrame {
    /// `event:` field
    pub event: Option<String>,
    /// `data:` payload
    pub data: String,
}

impl SseFrame {
    /// Payload as JSON, `None` for `[DONE]`
    pub fn json(&self) -> Option<Value> {
        serde_json::from_str(&self.data).ok()
    }
}

/// Split an SSE body into frames
pub fn parse_sse(body: &str) -> Vec<SseFrame> {
    body.replace("\r\n", "\n")
        .split("\n\n")
        .filter_map(|block| {
            let mut event = None;
            let mut data = Vec::new();
            for line in block.lines() {
                if let Some(v) = line.strip_prefix("event:") {
                    event = Some(v.trim().to_string());
                } else if let Some(v) = line.strip_prefix("data:") {
                    data.push(v.trim_start().to_string());
                }
            }
            (!data.is_empty()).then(|| SseFrame {
                event,
                data: data.join("\n"),
            })
        })
        .collect()
}

/// Wait until `check` passes or a second elapsed
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
