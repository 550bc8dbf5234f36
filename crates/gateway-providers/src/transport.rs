//! HTTP transport to one upstream provider.

use crate::classify::{classify_status, classify_transport};
use crate::endpoint::{
    apply_query_key, build_headers, resolve_url, unwrap_cloud_code_in_place, wrap_cloud_code,
};
use async_stream::stream;
use futures::StreamExt;
use gateway_config::{ProviderConfig, StreamingSupport, TimeoutConfig};
use gateway_core::{ByteStream, Credential, GatewayError, GatewayResult, Protocol, ProviderId};
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Body of a successful upstream response
pub enum UpstreamBody {
    /// Complete JSON body, Cloud Code envelope removed
    Json(Value),
    /// Raw SSE bytes
    Stream(ByteStream),
}

impl std::fmt::Debug for UpstreamBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Json(v) => f.debug_tuple("Json").field(v).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// One upstream call
#[derive(Debug)]
pub struct UpstreamCall<'a> {
    /// Upstream model
    pub model: &'a str,
    /// Native request body
    pub body: Value,
    /// Whether to use the streaming transport
    pub stream: bool,
    /// Credential, absent for `auth_mode: none`
    pub credential: Option<&'a Credential>,
}

/// Sends requests to one configured provider.
///
/// One transport is shared by every pipeline bound to the provider; the
/// underlying connection pool is safe for concurrent use.
#[derive(Debug)]
pub struct ProviderTransport {
    id: ProviderId,
    config: ProviderConfig,
    client: Client,
    connect_timeout: Duration,
    stream_idle: Duration,
}

impl ProviderTransport {
    /// Create a transport
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created
    pub fn new(id: ProviderId, config: ProviderConfig, timeouts: &TimeoutConfig) -> GatewayResult<Self> {
        let client = Client::builder()
            .connect_timeout(timeouts.connect)
            .pool_max_idle_per_host(100)
            .build()
            .map_err(|e| GatewayError::internal(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            id,
            config,
            client,
            connect_timeout: timeouts.connect,
            stream_idle: timeouts.stream_idle,
        })
    }

    /// Provider id
    #[must_use]
    pub fn id(&self) -> &ProviderId {
        &self.id
    }

    /// Native protocol of the upstream
    #[must_use]
    pub fn protocol(&self) -> Protocol {
        self.config.protocol
    }

    /// Streaming capability of the upstream
    #[must_use]
    pub fn streaming(&self) -> StreamingSupport {
        self.config.streaming
    }

    /// Provider configuration
    #[must_use]
    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    /// Whether responses arrive in the Cloud Code envelope
    #[must_use]
    pub fn is_cloud_code(&self) -> bool {
        self.config.protocol == Protocol::Gemini && self.config.cloud_code_project.is_some()
    }

    /// Send one request.
    ///
    /// Returns once the response headers arrived. Non-success statuses are
    /// classified into typed errors.
    pub async fn send(&self, call: UpstreamCall<'_>) -> GatewayResult<UpstreamBody> {
        let mut url = resolve_url(&self.config, call.model, call.stream)?;
        apply_query_key(&mut url, self.config.auth_mode, call.credential);
        let headers = build_headers(&self.config, call.credential, call.stream)?;
        let body = match (&self.config.cloud_code_project, self.config.protocol) {
            (Some(project), Protocol::Gemini) => wrap_cloud_code(call.body, call.model, project),
            _ => call.body,
        };

        debug!(
            provider = %self.id,
            model = %call.model,
            url = %url.path(),
            stream = call.stream,
            "Sending upstream request"
        );

        let response = self
            .client
            .post(url)
            .headers(headers)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                warn!(provider = %self.id, error = %e, "Upstream request failed");
                classify_transport(self.id.as_str(), &e, self.connect_timeout)
            })?;

        let status = response.status();
        if !status.is_success() {
            let headers = response.headers().clone();
            let text = response.text().await.unwrap_or_default();
            trace!(provider = %self.id, status = %status, body = %text, "Upstream error body");
            return Err(classify_status(self.id.as_str(), status.as_u16(), &headers, &text));
        }

        if call.stream {
            let bytes = Box::pin(response.bytes_stream());
            return Ok(UpstreamBody::Stream(idle_guarded(
                self.id.to_string(),
                bytes,
                self.stream_idle,
            )));
        }

        let text = response
            .text()
            .await
            .map_err(|e| classify_transport(self.id.as_str(), &e, self.connect_timeout))?;
        let mut value: Value = serde_json::from_str(&text).map_err(|e| {
            warn!(provider = %self.id, error = %e, "Upstream returned an undecodable body");
            GatewayError::provider(
                self.id.as_str(),
                format!("invalid response JSON: {e}"),
                Some(status.as_u16()),
                true,
            )
        })?;
        if self.is_cloud_code() {
            unwrap_cloud_code_in_place(&mut value);
        }
        Ok(UpstreamBody::Json(value))
    }
}

/// End the stream with a timeout error when no chunk arrives within `idle`
fn idle_guarded<S>(provider: String, mut inner: S, idle: Duration) -> ByteStream
where
    S: futures::Stream<Item = reqwest::Result<bytes::Bytes>> + Send + Unpin + 'static,
{
    Box::pin(stream! {
        loop {
            match tokio::time::timeout(idle, inner.next()).await {
                Ok(Some(Ok(chunk))) => yield Ok(chunk),
                Ok(Some(Err(e))) => {
                    yield Err(GatewayError::streaming(format!("{provider}: {e}")));
                    break;
                }
                Ok(None) => break,
                Err(_) => {
                    warn!(provider = %provider, idle_ms = idle.as_millis() as u64, "Upstream stream went idle");
                    yield Err(GatewayError::timeout(idle, "stream idle"));
                    break;
                }
            }
        }
    })
}
