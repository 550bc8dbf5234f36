//! The fixed four-stage module chain bound to one upstream target.
//!
//! Request direction: llm-switch, workflow, compatibility, provider.
//! Response direction runs the same stages in reverse.

use crate::compatibility::CompatibilityMapper;
use crate::streaming::{aggregate, is_streaming_request, prime, synthesize, StreamMode, StreamPlan};
use gateway_config::AuthMode;
use gateway_core::{
    CanonicalResponse, Credential, EventStream, GatewayError, GatewayResult, KeyId, ModelId, PipelineId,
    PipelineRequest, ProviderId, Stage, StageError, StageTiming,
};
use gateway_protocols::{LlmSwitch, PayloadHook};
use gateway_providers::{
    unwrap_cloud_code_in_place, CredentialCache, ProviderTransport, UpstreamBody, UpstreamCall,
};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info_span, warn, Instrument};

/// Result of a successful attempt, still in canonical form
pub enum PipelineOutput {
    /// One complete response
    Complete {
        /// Canonical response
        response: CanonicalResponse,
        /// Upstream JSON after compatibility mapping, when there was one
        upstream_body: Option<Value>,
    },
    /// Canonical event stream, already primed with its first event
    Stream {
        /// Events
        events: EventStream,
        /// Model reported to the caller
        model: String,
    },
}

impl std::fmt::Debug for PipelineOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Complete { response, .. } => f.debug_struct("Complete").field("response", response).finish_non_exhaustive(),
            Self::Stream { model, .. } => f.debug_struct("Stream").field("model", model).finish_non_exhaustive(),
        }
    }
}

/// Successful attempt
#[derive(Debug)]
pub struct AttemptOutcome {
    /// Output
    pub output: PipelineOutput,
    /// Non-fatal notes from the stages
    pub notes: Vec<StageError>,
    /// Stage timings, when debugging
    pub stages: Vec<StageTiming>,
}

/// One concrete `(provider, model, key)` chain.
///
/// Holds no per-request state, so one instance serves concurrent requests.
pub struct Pipeline {
    id: PipelineId,
    model: ModelId,
    switch: Arc<LlmSwitch>,
    transport: Arc<ProviderTransport>,
    credentials: CredentialCache,
    compatibility: CompatibilityMapper,
}

impl Pipeline {
    /// Assemble a pipeline
    #[must_use]
    pub fn new(
        provider: &ProviderId,
        model: ModelId,
        key: &KeyId,
        switch: Arc<LlmSwitch>,
        transport: Arc<ProviderTransport>,
        credentials: CredentialCache,
        compatibility: CompatibilityMapper,
    ) -> Self {
        Self {
            id: PipelineId::from_parts(provider, &model, key),
            model,
            switch,
            transport,
            credentials,
            compatibility,
        }
    }

    /// `provider.model.key`
    #[must_use]
    pub fn id(&self) -> &PipelineId {
        &self.id
    }

    /// Upstream model
    #[must_use]
    pub fn model(&self) -> &ModelId {
        &self.model
    }

    /// Upstream provider
    #[must_use]
    pub fn provider(&self) -> &ProviderId {
        self.transport.id()
    }

    /// Credential cache of this pipeline
    #[must_use]
    pub fn credentials(&self) -> &CredentialCache {
        &self.credentials
    }

    /// Run one attempt.
    ///
    /// `original` is never mutated; every attempt starts from its own copy.
    pub async fn execute(&self, original: &PipelineRequest) -> GatewayResult<AttemptOutcome> {
        let span = info_span!(
            "pipeline",
            request_id = %original.request_id(),
            pipeline_id = %self.id,
        );
        self.run(original).instrument(span).await
    }

    async fn run(&self, original: &PipelineRequest) -> GatewayResult<AttemptOutcome> {
        let mut request = original.clone();
        request.route.provider_id = Some(self.transport.id().clone());
        request.route.model_id = Some(self.model.clone());
        let upstream = self.transport.protocol();

        // llm-switch
        let started = Instant::now();
        let plan = StreamPlan::new(is_streaming_request(&request), self.transport.streaming());
        request.data.stream = plan.upstream_stream;
        let (mut body, notes) = self
            .switch
            .transform_request(&request, upstream, self.model.as_str())?;
        request.debug.record(Stage::LlmSwitch, "request", started.elapsed());

        // workflow
        let started = Instant::now();
        if matches!(plan.mode(), StreamMode::Aggregate | StreamMode::Synthesize) {
            debug!(mode = ?plan.mode(), "Bridging caller and upstream streaming");
        }
        request.debug.record(Stage::Workflow, "request", started.elapsed());

        // compatibility
        let started = Instant::now();
        CompatibilityMapper::check_model(&request.data.model)
            .map_err(|e| e.in_stage(Stage::Compatibility))?;
        self.compatibility.apply_request(&mut body);
        request.debug.record(Stage::Compatibility, "request", started.elapsed());

        // provider
        let started = Instant::now();
        let credential = self.credential().await.map_err(|e| e.in_stage(Stage::Provider))?;
        request.debug.record(Stage::Provider, "request", started.elapsed());
        let started = Instant::now();
        let sent = self
            .transport
            .send(UpstreamCall {
                model: self.model.as_str(),
                body,
                stream: plan.upstream_stream,
                credential: credential.as_ref(),
            })
            .await;
        let upstream_body = match sent {
            Ok(body) => body,
            Err(e) => {
                if e.is_auth_failure() {
                    self.credentials.invalidate();
                }
                return Err(e.in_stage(Stage::Provider));
            }
        };
        request.debug.record(Stage::Provider, "response", started.elapsed());

        let output = self.respond(&mut request, plan, upstream_body).await?;
        debug!(mode = ?plan.mode(), "Attempt succeeded");
        Ok(AttemptOutcome {
            output,
            notes,
            stages: request.debug.stages,
        })
    }

    async fn respond(
        &self,
        request: &mut PipelineRequest,
        plan: StreamPlan,
        upstream_body: UpstreamBody,
    ) -> GatewayResult<PipelineOutput> {
        let upstream = self.transport.protocol();
        match upstream_body {
            UpstreamBody::Json(mut value) => {
                let started = Instant::now();
                self.compatibility.apply_response(&mut value);
                request.debug.record(Stage::Compatibility, "response", started.elapsed());

                let started = Instant::now();
                let mut response = self
                    .switch
                    .decode_response(upstream, &value)
                    .map_err(|e| self.undecodable(e))?;
                if response.model.is_empty() {
                    response.model = self.model.to_string();
                }
                request.debug.record(Stage::LlmSwitch, "response", started.elapsed());

                let started = Instant::now();
                let output = if plan.mode() == StreamMode::Synthesize {
                    PipelineOutput::Stream {
                        model: response.model.clone(),
                        events: synthesize(response),
                    }
                } else {
                    PipelineOutput::Complete {
                        response,
                        upstream_body: Some(value),
                    }
                };
                request.debug.record(Stage::Workflow, "response", started.elapsed());
                Ok(output)
            }
            UpstreamBody::Stream(bytes) => {
                let events = self.switch.decode_stream(upstream, bytes, self.payload_hook());
                let started = Instant::now();
                let output = if plan.mode() == StreamMode::Aggregate {
                    let response = aggregate(events, request.request_id().as_str(), self.model.as_str())
                        .await
                        .map_err(|e| e.in_stage(Stage::Workflow))?;
                    PipelineOutput::Complete {
                        response,
                        upstream_body: None,
                    }
                } else {
                    PipelineOutput::Stream {
                        events: prime(events).await.map_err(|e| e.in_stage(Stage::Workflow))?,
                        model: self.model.to_string(),
                    }
                };
                request.debug.record(Stage::Workflow, "response", started.elapsed());
                Ok(output)
            }
        }
    }

    /// An upstream body that does not decode is a failure of this member,
    /// not of the caller's request
    fn undecodable(&self, error: GatewayError) -> GatewayError {
        match error.root() {
            GatewayError::Translation { message } => {
                warn!(pipeline_id = %self.id, error = %message, "Upstream response did not decode");
                GatewayError::provider(self.provider().as_str(), message.clone(), None, true)
                    .in_stage(Stage::LlmSwitch)
            }
            _ => error,
        }
    }

    /// Per-event adjustments applied before decoding
    fn payload_hook(&self) -> Option<PayloadHook> {
        let cloud_code = self.transport.is_cloud_code();
        if !cloud_code && self.compatibility.is_response_passthrough() {
            return None;
        }
        let mapper = self.compatibility.clone();
        Some(Box::new(move |payload: &mut Value| {
            if cloud_code {
                unwrap_cloud_code_in_place(payload);
            }
            mapper.apply_response(payload);
        }))
    }

    async fn credential(&self) -> GatewayResult<Option<Credential>> {
        if self.transport.config().auth_mode == AuthMode::None {
            return Ok(None);
        }
        match self.credentials.get().await {
            Ok(credential) => Ok(Some(credential)),
            Err(e) => {
                warn!(pipeline_id = %self.id, error = %e, "Credential unavailable");
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("id", &self.id)
            .field("protocol", &self.transport.protocol())
            .field("compatibility", &self.compatibility.name())
            .finish_non_exhaustive()
    }
}
