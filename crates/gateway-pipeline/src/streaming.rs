//! Streaming control.
//!
//! Decides how the caller's streaming wish maps onto what an upstream
//! offers, and bridges the two shapes: buffering a stream into one response
//! or synthesizing events from a complete response.

use futures::StreamExt;
use gateway_config::StreamingSupport;
use gateway_core::{
    CanonicalResponse, DoneInfo, EventStream, FinishReason, GatewayError, GatewayResult,
    PipelineRequest, StreamEvent,
};
use tracing::{debug, warn};

/// True iff the canonical request explicitly asks for streaming
#[must_use]
pub fn is_streaming_request(request: &PipelineRequest) -> bool {
    request.data.stream
}

/// How one attempt bridges caller and upstream streaming
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamMode {
    /// JSON in, JSON out
    Complete,
    /// Events in, events out
    Passthrough,
    /// Upstream streams, caller wants one response
    Aggregate,
    /// Upstream returns JSON, caller wants events
    Synthesize,
}

/// Streaming decision for one attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamPlan {
    /// Caller asked for a stream
    pub caller_stream: bool,
    /// Upstream transport is streaming
    pub upstream_stream: bool,
}

impl StreamPlan {
    /// Decide the upstream transport for an upstream capability
    #[must_use]
    pub fn new(caller_stream: bool, support: StreamingSupport) -> Self {
        let upstream_stream = match support {
            StreamingSupport::Both => caller_stream,
            StreamingSupport::Always => true,
            StreamingSupport::Never => false,
        };
        Self {
            caller_stream,
            upstream_stream,
        }
    }

    /// Bridging mode
    #[must_use]
    pub fn mode(self) -> StreamMode {
        match (self.caller_stream, self.upstream_stream) {
            (false, false) => StreamMode::Complete,
            (true, true) => StreamMode::Passthrough,
            (false, true) => StreamMode::Aggregate,
            (true, false) => StreamMode::Synthesize,
        }
    }
}

/// Buffer a whole event sequence into one response.
///
/// A terminal `Error` event fails the call; the caller never observes
/// partial data of a non-streaming request.
pub async fn aggregate(mut events: EventStream, id: &str, model: &str) -> GatewayResult<CanonicalResponse> {
    let mut response = CanonicalResponse::new(id, model);
    while let Some(event) = events.next().await {
        match event {
            StreamEvent::Content(part) => response.push_part(part),
            StreamEvent::Done(done) => {
                if done.skipped_events > 0 {
                    warn!(skipped_events = done.skipped_events, "Aggregated stream skipped malformed events");
                }
                response.finish_reason = done.finish_reason;
                response.usage = done.usage;
                break;
            }
            StreamEvent::Error(failure) => {
                return Err(GatewayError::streaming(format!(
                    "upstream stream failed after {} events: {}",
                    failure.emitted, failure.message
                )));
            }
        }
    }
    if response.finish_reason.is_none() {
        response.finish_reason = Some(if response.tool_calls().next().is_some() {
            FinishReason::ToolCalls
        } else {
            FinishReason::Stop
        });
    }
    debug!(parts = response.parts.len(), "Aggregated upstream stream");
    Ok(response)
}

/// Event sequence equivalent to a complete response
#[must_use]
pub fn synthesize(response: CanonicalResponse) -> EventStream {
    let done = StreamEvent::Done(DoneInfo {
        finish_reason: response.finish_reason,
        usage: response.usage,
        skipped_events: 0,
    });
    let events: Vec<StreamEvent> = response
        .parts
        .into_iter()
        .map(StreamEvent::Content)
        .chain(std::iter::once(done))
        .collect();
    futures::stream::iter(events).boxed()
}

/// Wait for the first event so an upstream that fails before producing
/// anything is still a retryable attempt failure.
///
/// A stream whose first event is already `Done` carried no content and is
/// treated the same way.
pub async fn prime(mut events: EventStream) -> GatewayResult<EventStream> {
    match events.next().await {
        None | Some(StreamEvent::Done(_)) => {
            warn!("Upstream stream ended before its first event");
            Err(GatewayError::streaming("upstream stream ended without events"))
        }
        Some(StreamEvent::Error(failure)) if failure.emitted == 0 => {
            Err(GatewayError::streaming(failure.message))
        }
        Some(first) => Ok(futures::stream::once(async move { first }).chain(events).boxed()),
    }
}
