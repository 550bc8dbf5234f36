//! Pool selection and failover.
//!
//! Per request: `SELECT_POOL -> TRY_PIPELINE(i) -> SUCCESS | next i | ABORT`,
//! ending in `ALL_EXHAUSTED` once every member failed with a retryable error.

use crate::category::resolve_category;
use crate::pipeline::PipelineOutput;
use crate::registry::{PoolRegistry, PoolSet};
use gateway_config::GatewayConfig;
use gateway_core::{
    GatewayError, GatewayResult, PipelineResponse, ResponseMetadata, RouteRequest, Stage,
    StageError,
};
use gateway_protocols::{Incoming, Outgoing, RenderedError};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Executes requests against the pool of their routing category
#[derive(Debug, Clone)]
pub struct PipelineManager {
    registry: Arc<PoolRegistry>,
}

impl PipelineManager {
    /// Wrap a registry
    #[must_use]
    pub fn new(registry: Arc<PoolRegistry>) -> Self {
        Self { registry }
    }

    /// Build the registry from `config`
    pub fn from_config(config: &GatewayConfig) -> GatewayResult<Self> {
        Ok(Self::new(Arc::new(PoolRegistry::from_config(config)?)))
    }

    /// The pool registry
    #[must_use]
    pub fn registry(&self) -> &Arc<PoolRegistry> {
        &self.registry
    }

    /// Handle one caller request end to end.
    ///
    /// Errors come back already rendered in the caller's protocol.
    pub async fn handle(&self, route: &RouteRequest) -> Result<PipelineResponse, RenderedError> {
        let set = self.registry.snapshot();
        let incoming = set.switch().process_incoming(route)?;
        let span = info_span!(
            "request",
            request_id = %route.request_id,
            protocol = %incoming.detection.protocol,
        );
        Self::execute_with(&set, incoming).instrument(span).await
    }

    /// Execute an already parsed request
    pub async fn execute(&self, incoming: Incoming) -> Result<PipelineResponse, RenderedError> {
        let set = self.registry.snapshot();
        Self::execute_with(&set, incoming).await
    }

    async fn execute_with(set: &PoolSet, incoming: Incoming) -> Result<PipelineResponse, RenderedError> {
        let started = Instant::now();
        let Incoming {
            request,
            notes,
            guard,
            ..
        } = incoming;
        let switch = set.switch();
        let request_id = request.request_id().clone();

        let (category, source) = resolve_category(&request, set.routing(), |c| set.has_pool(c));
        let pool = match set.pool(&category) {
            Some(pool) if !pool.is_empty() => pool,
            _ => {
                error!(request_id = %request_id, category = %category, "No pool configured");
                let err = GatewayError::configuration(format!("no pipelines configured for category '{category}'"));
                return Err(switch.render_error_for(&request_id, err));
            }
        };
        debug!(category = %category, source = ?source, members = pool.len(), "Selected pool");

        let mut errors = notes;
        let mut last_error: Option<GatewayError> = None;

        for (index, pipeline) in pool.iter().enumerate() {
            let attempt = index + 1;
            if let Some(previous) = &last_error {
                set.backoff().wait(index as u32 - 1, previous).await;
            }

            let result = set
                .timeout()
                .run("attempt", pipeline.execute(&request))
                .await
                .map_err(|e| e.in_stage(Stage::Provider));

            match result {
                Ok(outcome) => {
                    errors.extend(outcome.notes);
                    let (protocol, data) = match outcome.output {
                        PipelineOutput::Complete {
                            response,
                            upstream_body,
                        } => switch.process_outgoing(
                            &request_id,
                            Outgoing::Complete {
                                response: &response,
                                upstream_body: upstream_body.as_ref(),
                            },
                        ),
                        PipelineOutput::Stream { events, model } => {
                            switch.process_outgoing(&request_id, Outgoing::Stream { events, model })
                        }
                    };
                    drop(guard);
                    info!(
                        pipeline_id = %pipeline.id(),
                        attempt,
                        category = %category,
                        stream = data.is_stream(),
                        "Request served"
                    );
                    return Ok(PipelineResponse {
                        data,
                        metadata: ResponseMetadata {
                            pipeline_id: pipeline.id().clone(),
                            protocol,
                            processing_time: started.elapsed(),
                            stages: outcome.stages,
                            request_id,
                            errors,
                            attempts: attempt,
                            debug: request.debug.enabled,
                        },
                    });
                }
                Err(e) if e.is_retryable() => {
                    warn!(
                        pipeline_id = %pipeline.id(),
                        attempt,
                        of = pool.len(),
                        stage = ?e.stage(),
                        error = %e.root(),
                        "Attempt failed, advancing"
                    );
                    errors.push(StageError::from_error(pipeline.id(), &e));
                    last_error = Some(e);
                }
                Err(e) => {
                    warn!(
                        pipeline_id = %pipeline.id(),
                        attempt,
                        class = ?e.class(),
                        error = %e.root(),
                        "Attempt failed fatally, aborting"
                    );
                    return Err(switch.render_error_for(&request_id, e));
                }
            }
        }

        let last_error = last_error
            .unwrap_or_else(|| GatewayError::internal("pool loop ended without an attempt"));
        error!(category = %category, attempts = pool.len(), "All pipelines failed");
        let exhausted = GatewayError::Exhausted {
            category,
            attempts: pool.len(),
            last_error: Box::new(last_error),
        };
        Err(switch.render_error_for(&request_id, exhausted))
    }
}
