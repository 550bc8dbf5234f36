//! OpenAI `chat.completion.chunk` streams.

use super::request::reasoning_text;
use super::response::{parse_usage, render_usage};
use crate::adapter::{generate_call_id, DecodeStatus, EncoderContext, StreamDecoder, StreamEncoder};
use crate::sse::SseFrame;
use gateway_core::{DoneInfo, FinishReason, OutputPart, StreamEvent, Usage};
use serde_json::{json, Value};
use std::collections::BTreeMap;

#[derive(Debug, Default)]
struct PendingCall {
    id: String,
    name: String,
    arguments: String,
}

/// Decodes upstream chunks. Tool call fragments are assembled by index and
/// emitted whole once the choice finishes.
#[derive(Debug, Default)]
pub struct ChatChunkDecoder {
    calls: BTreeMap<u64, PendingCall>,
    finish_reason: Option<FinishReason>,
    usage: Option<Usage>,
}

impl ChatChunkDecoder {
    fn flush_calls(&mut self, out: &mut Vec<OutputPart>) {
        for (_, call) in std::mem::take(&mut self.calls) {
            let id = if call.id.is_empty() {
                generate_call_id()
            } else {
                call.id
            };
            let arguments = if call.arguments.is_empty() {
                "{}".to_string()
            } else {
                call.arguments
            };
            out.push(OutputPart::tool_call(id, call.name, arguments));
        }
    }
}

impl StreamDecoder for ChatChunkDecoder {
    fn decode(
        &mut self,
        _event: Option<&str>,
        payload: Value,
        out: &mut Vec<OutputPart>,
    ) -> DecodeStatus {
        if let Some(error) = payload.get("error") {
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .map_or_else(|| error.to_string(), str::to_string);
            return DecodeStatus::Failed(message);
        }
        if let Some(usage) = payload.get("usage").and_then(parse_usage) {
            self.usage = Some(usage);
        }

        let Some(choice) = payload.get("choices").and_then(|c| c.get(0)) else {
            return DecodeStatus::Continue;
        };
        if let Some(delta) = choice.get("delta") {
            if let Some(thought) = reasoning_text(delta) {
                out.push(OutputPart::thought(thought));
            }
            if let Some(text) = delta.get("content").and_then(Value::as_str) {
                if !text.is_empty() {
                    out.push(OutputPart::text(text));
                }
            }
            if let Some(calls) = delta.get("tool_calls").and_then(Value::as_array) {
                for (position, call) in calls.iter().enumerate() {
                    let index = call
                        .get("index")
                        .and_then(Value::as_u64)
                        .unwrap_or(position as u64);
                    let pending = self.calls.entry(index).or_default();
                    if let Some(id) = call.get("id").and_then(Value::as_str) {
                        pending.id = id.to_string();
                    }
                    if let Some(function) = call.get("function") {
                        if let Some(name) = function.get("name").and_then(Value::as_str) {
                            pending.name.push_str(name);
                        }
                        if let Some(args) = function.get("arguments").and_then(Value::as_str) {
                            pending.arguments.push_str(args);
                        }
                    }
                }
            }
        }
        if let Some(reason) = choice.get("finish_reason").and_then(Value::as_str) {
            self.finish_reason = Some(FinishReason::from_openai(reason));
            self.flush_calls(out);
        }
        DecodeStatus::Continue
    }

    fn finish(&mut self, out: &mut Vec<OutputPart>) -> DoneInfo {
        self.flush_calls(out);
        DoneInfo {
            finish_reason: self.finish_reason,
            usage: self.usage,
            skipped_events: 0,
        }
    }
}

/// Encodes canonical events as `chat.completion.chunk` frames
#[derive(Debug)]
pub struct ChatChunkEncoder {
    context: EncoderContext,
    role_sent: bool,
    tool_index: usize,
    content_events: usize,
}

impl ChatChunkEncoder {
    /// Create an encoder
    #[must_use]
    pub fn new(context: EncoderContext) -> Self {
        Self {
            context,
            role_sent: false,
            tool_index: 0,
            content_events: 0,
        }
    }

    fn chunk(&mut self, mut delta: Value, finish_reason: Option<&str>) -> SseFrame {
        if !self.role_sent {
            delta["role"] = json!("assistant");
            self.role_sent = true;
        }
        SseFrame::json(
            None,
            &json!({
                "id": self.context.id,
                "object": "chat.completion.chunk",
                "created": self.context.created,
                "model": self.context.model,
                "choices": [{
                    "index": 0,
                    "delta": delta,
                    "finish_reason": finish_reason,
                }],
            }),
        )
    }

    fn closing_frames(&mut self, finish: FinishReason, usage: Option<&Usage>) -> Vec<SseFrame> {
        let finish = if self.tool_index > 0 {
            FinishReason::ToolCalls
        } else {
            finish
        };
        let mut last = self.chunk(json!({}), Some(finish.as_openai()));
        if let Some(usage) = usage {
            if let Ok(mut payload) = serde_json::from_str::<Value>(&last.data) {
                payload["usage"] = render_usage(usage);
                last = SseFrame::json(None, &payload);
            }
        }
        vec![last, SseFrame::done()]
    }
}

impl StreamEncoder for ChatChunkEncoder {
    fn encode(&mut self, event: &StreamEvent) -> Vec<SseFrame> {
        match event {
            StreamEvent::Content(part) => {
                self.content_events += 1;
                let delta = match part {
                    OutputPart::Thought { text, .. } => json!({ "reasoning_content": text }),
                    OutputPart::ToolCall {
                        id,
                        name,
                        arguments,
                    } => {
                        let index = self.tool_index;
                        self.tool_index += 1;
                        json!({ "tool_calls": [{
                            "index": index,
                            "id": id,
                            "type": "function",
                            "function": { "name": name, "arguments": arguments },
                        }]})
                    }
                    other => json!({ "content": other.as_fallback_text().unwrap_or_default() }),
                };
                vec![self.chunk(delta, None)]
            }
            StreamEvent::Done(done) => self.closing_frames(
                done.finish_reason.unwrap_or(FinishReason::Stop),
                done.usage.as_ref(),
            ),
            StreamEvent::Error(failure) => {
                let mut frames = vec![SseFrame::json(
                    None,
                    &json!({ "error": {
                        "message": failure.message,
                        "type": "upstream_error",
                        "code": null,
                    }}),
                )];
                if failure.emitted > 0 || self.content_events > 0 {
                    frames.extend(self.closing_frames(FinishReason::Error, None));
                }
                frames
            }
        }
    }
}
