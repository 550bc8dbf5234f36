//! Gemini `streamGenerateContent?alt=sse`: every event is a partial response.

use super::parts::GeminiPart;
use super::response::{
    candidate_parts, finish_from_gemini, finish_to_gemini, parse_usage, render_usage,
    unwrap_envelope,
};
use crate::adapter::{DecodeStatus, EncoderContext, StreamDecoder, StreamEncoder};
use crate::sse::SseFrame;
use gateway_core::{DoneInfo, FinishReason, OutputPart, StreamEvent, Usage};
use serde_json::{json, Value};

/// Decodes Gemini stream events.
///
/// Accepts full responses, Cloud Code `{response: ...}` wrappers, and bare
/// `{content: ...}` or `{parts: [...]}` fragments.
#[derive(Debug, Default)]
pub struct GeminiStreamDecoder {
    saw_tool_call: bool,
    finish_reason: Option<FinishReason>,
    usage: Option<Usage>,
}

impl StreamDecoder for GeminiStreamDecoder {
    fn decode(
        &mut self,
        _event: Option<&str>,
        payload: Value,
        out: &mut Vec<OutputPart>,
    ) -> DecodeStatus {
        let payload = unwrap_envelope(&payload);
        if let Some(error) = payload.get("error") {
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .map_or_else(|| error.to_string(), str::to_string);
            return DecodeStatus::Failed(message);
        }

        for part in candidate_parts(payload) {
            if matches!(part, OutputPart::ToolCall { .. }) {
                self.saw_tool_call = true;
            }
            out.push(part);
        }
        if let Some(reason) = payload
            .pointer("/candidates/0/finishReason")
            .or_else(|| payload.get("finishReason"))
            .and_then(Value::as_str)
        {
            self.finish_reason = Some(finish_from_gemini(reason));
        }
        if let Some(usage) = payload.get("usageMetadata").and_then(parse_usage) {
            self.usage = Some(usage);
        }
        DecodeStatus::Continue
    }

    fn finish(&mut self, _out: &mut Vec<OutputPart>) -> DoneInfo {
        let finish_reason = if self.saw_tool_call {
            Some(FinishReason::ToolCalls)
        } else {
            self.finish_reason
        };
        DoneInfo {
            finish_reason,
            usage: self.usage,
            skipped_events: 0,
        }
    }
}

/// Encodes canonical events as Gemini stream chunks
#[derive(Debug)]
pub struct GeminiStreamEncoder {
    context: EncoderContext,
    started: bool,
}

impl GeminiStreamEncoder {
    /// Create an encoder
    #[must_use]
    pub fn new(context: EncoderContext) -> Self {
        Self {
            context,
            started: false,
        }
    }

    fn chunk(&mut self, parts: Vec<Value>, finish: Option<FinishReason>, usage: Option<&Usage>) -> SseFrame {
        self.started = true;
        let mut candidate = json!({
            "content": { "role": "model", "parts": parts },
            "index": 0,
        });
        if let Some(finish) = finish {
            candidate["finishReason"] = json!(finish_to_gemini(finish));
        }
        let mut payload = json!({
            "candidates": [candidate],
            "modelVersion": self.context.model,
            "responseId": self.context.id,
        });
        if let Some(usage) = usage {
            payload["usageMetadata"] = render_usage(usage);
        }
        SseFrame::json(None, &payload)
    }
}

impl StreamEncoder for GeminiStreamEncoder {
    fn encode(&mut self, event: &StreamEvent) -> Vec<SseFrame> {
        match event {
            StreamEvent::Content(part) => {
                vec![self.chunk(vec![GeminiPart::from_output(part).to_value()], None, None)]
            }
            StreamEvent::Done(done) => vec![self.chunk(
                vec![json!({ "text": "" })],
                Some(done.finish_reason.unwrap_or(FinishReason::Stop)),
                done.usage.as_ref(),
            )],
            StreamEvent::Error(failure) => {
                let was_started = self.started;
                let mut frames = vec![SseFrame::json(
                    None,
                    &json!({ "error": { "code": 500, "message": failure.message, "status": "INTERNAL" } }),
                )];
                if failure.emitted > 0 || was_started {
                    frames.push(self.chunk(vec![json!({ "text": "" })], Some(FinishReason::Error), None));
                }
                frames
            }
        }
    }
}
