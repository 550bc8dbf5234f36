//! OpenAI Responses streaming events (`response.*`).

use super::response::{
    function_call_item, item_id, message_item, parse_usage, reasoning_item, render_usage,
};
use crate::adapter::{generate_call_id, DecodeStatus, EncoderContext, StreamDecoder, StreamEncoder};
use crate::sse::SseFrame;
use gateway_core::{DoneInfo, FinishReason, OutputPart, StreamEvent, Usage};
use serde_json::{json, Value};

/// Decodes `response.*` stream events
#[derive(Debug, Default)]
pub struct ResponsesStreamDecoder {
    saw_tool_call: bool,
    finish_reason: Option<FinishReason>,
    usage: Option<Usage>,
}

impl StreamDecoder for ResponsesStreamDecoder {
    fn decode(
        &mut self,
        event: Option<&str>,
        payload: Value,
        out: &mut Vec<OutputPart>,
    ) -> DecodeStatus {
        let kind = payload
            .get("type")
            .and_then(Value::as_str)
            .or(event)
            .unwrap_or_default();
        let delta = || {
            payload
                .get("delta")
                .and_then(Value::as_str)
                .unwrap_or_default()
        };

        match kind {
            "response.output_text.delta" | "response.refusal.delta" => {
                out.push(OutputPart::text(delta()));
            }
            "response.reasoning_summary_text.delta" | "response.reasoning_text.delta" => {
                out.push(OutputPart::thought(delta()));
            }
            "response.output_item.done" => {
                let item = payload.get("item").unwrap_or(&Value::Null);
                if item.get("type").and_then(Value::as_str) == Some("function_call") {
                    self.saw_tool_call = true;
                    out.push(OutputPart::tool_call(
                        item.get("call_id")
                            .and_then(Value::as_str)
                            .map_or_else(generate_call_id, str::to_string),
                        item.get("name").and_then(Value::as_str).unwrap_or_default(),
                        item.get("arguments").and_then(Value::as_str).unwrap_or("{}"),
                    ));
                }
            }
            "response.completed" | "response.incomplete" => {
                self.usage = payload.pointer("/response/usage").and_then(parse_usage);
                self.finish_reason = Some(if self.saw_tool_call {
                    FinishReason::ToolCalls
                } else if kind == "response.incomplete" {
                    FinishReason::Length
                } else {
                    FinishReason::Stop
                });
                return DecodeStatus::Finished;
            }
            "response.failed" => {
                let message = payload
                    .pointer("/response/error/message")
                    .and_then(Value::as_str)
                    .unwrap_or("response failed");
                return DecodeStatus::Failed(message.to_string());
            }
            "error" => {
                let message = payload
                    .get("message")
                    .or_else(|| payload.pointer("/error/message"))
                    .and_then(Value::as_str)
                    .unwrap_or("upstream stream error");
                return DecodeStatus::Failed(message.to_string());
            }
            _ => {}
        }
        DecodeStatus::Continue
    }

    fn finish(&mut self, _out: &mut Vec<OutputPart>) -> DoneInfo {
        DoneInfo {
            finish_reason: self.finish_reason,
            usage: self.usage,
            skipped_events: 0,
        }
    }
}

#[derive(Debug)]
enum OpenItem {
    Message { id: String, text: String },
    Reasoning { id: String, text: String },
}

/// Encodes canonical events as `response.*` events with sequence numbers.
///
/// Tool calls are reported with `response.required_action` before the final
/// `response.completed`.
#[derive(Debug)]
pub struct ResponsesStreamEncoder {
    context: EncoderContext,
    sequence: u64,
    started: bool,
    open: Option<OpenItem>,
    output: Vec<Value>,
    tool_calls: Vec<Value>,
}

impl ResponsesStreamEncoder {
    /// Create an encoder
    #[must_use]
    pub fn new(context: EncoderContext) -> Self {
        Self {
            context,
            sequence: 0,
            started: false,
            open: None,
            output: Vec::new(),
            tool_calls: Vec::new(),
        }
    }

    fn event(&mut self, kind: &str, mut payload: Value) -> SseFrame {
        payload["type"] = json!(kind);
        payload["sequence_number"] = json!(self.sequence);
        self.sequence += 1;
        SseFrame::typed(&payload)
    }

    fn snapshot(&self, status: &str) -> Value {
        json!({
            "id": self.context.id,
            "object": "response",
            "created_at": self.context.created,
            "status": status,
            "model": self.context.model,
            "output": self.output,
        })
    }

    fn output_index(&self) -> usize {
        self.output.len()
    }

    fn ensure_started(&mut self, frames: &mut Vec<SseFrame>) {
        if self.started {
            return;
        }
        self.started = true;
        let snapshot = self.snapshot("in_progress");
        frames.push(self.event("response.created", json!({ "response": snapshot })));
        frames.push(self.event("response.in_progress", json!({ "response": snapshot })));
    }

    fn close_item(&mut self, frames: &mut Vec<SseFrame>) {
        let index = self.output_index();
        match self.open.take() {
            Some(OpenItem::Message { id, text }) => {
                frames.push(self.event(
                    "response.output_text.done",
                    json!({ "item_id": id, "output_index": index, "content_index": 0, "text": text }),
                ));
                frames.push(self.event(
                    "response.content_part.done",
                    json!({
                        "item_id": id,
                        "output_index": index,
                        "content_index": 0,
                        "part": { "type": "output_text", "text": text, "annotations": [] },
                    }),
                ));
                let item = message_item(&id, &text);
                frames.push(self.event(
                    "response.output_item.done",
                    json!({ "output_index": index, "item": item }),
                ));
                self.output.push(item);
            }
            Some(OpenItem::Reasoning { id, text }) => {
                frames.push(self.event(
                    "response.reasoning_summary_text.done",
                    json!({ "item_id": id, "output_index": index, "summary_index": 0, "text": text }),
                ));
                let item = reasoning_item(&id, &text);
                frames.push(self.event(
                    "response.output_item.done",
                    json!({ "output_index": index, "item": item }),
                ));
                self.output.push(item);
            }
            None => {}
        }
    }

    fn text(&mut self, delta: &str, frames: &mut Vec<SseFrame>) {
        if !matches!(self.open, Some(OpenItem::Message { .. })) {
            self.close_item(frames);
            let id = item_id("msg");
            let index = self.output_index();
            frames.push(self.event(
                "response.output_item.added",
                json!({
                    "output_index": index,
                    "item": { "type": "message", "id": id, "status": "in_progress", "role": "assistant", "content": [] },
                }),
            ));
            frames.push(self.event(
                "response.content_part.added",
                json!({
                    "item_id": id,
                    "output_index": index,
                    "content_index": 0,
                    "part": { "type": "output_text", "text": "", "annotations": [] },
                }),
            ));
            self.open = Some(OpenItem::Message {
                id,
                text: String::new(),
            });
        }
        let index = self.output_index();
        if let Some(OpenItem::Message { id, text }) = &mut self.open {
            text.push_str(delta);
            let payload = json!({ "item_id": id, "output_index": index, "content_index": 0, "delta": delta });
            frames.push(self.event("response.output_text.delta", payload));
        }
    }

    fn thought(&mut self, delta: &str, frames: &mut Vec<SseFrame>) {
        if !matches!(self.open, Some(OpenItem::Reasoning { .. })) {
            self.close_item(frames);
            let id = item_id("rs");
            let index = self.output_index();
            frames.push(self.event(
                "response.output_item.added",
                json!({ "output_index": index, "item": { "type": "reasoning", "id": id, "summary": [] } }),
            ));
            self.open = Some(OpenItem::Reasoning {
                id,
                text: String::new(),
            });
        }
        let index = self.output_index();
        if let Some(OpenItem::Reasoning { id, text }) = &mut self.open {
            text.push_str(delta);
            let payload = json!({ "item_id": id, "output_index": index, "summary_index": 0, "delta": delta });
            frames.push(self.event("response.reasoning_summary_text.delta", payload));
        }
    }

    fn tool_call(&mut self, call_id: &str, name: &str, arguments: &str, frames: &mut Vec<SseFrame>) {
        self.close_item(frames);
        let id = item_id("fc");
        let index = self.output_index();
        frames.push(self.event(
            "response.output_item.added",
            json!({
                "output_index": index,
                "item": {
                    "type": "function_call", "id": id, "status": "in_progress",
                    "call_id": call_id, "name": name, "arguments": "",
                },
            }),
        ));
        frames.push(self.event(
            "response.function_call_arguments.delta",
            json!({ "item_id": id, "output_index": index, "delta": arguments }),
        ));
        frames.push(self.event(
            "response.function_call_arguments.done",
            json!({ "item_id": id, "output_index": index, "arguments": arguments }),
        ));
        let item = function_call_item(&id, call_id, name, arguments);
        frames.push(self.event(
            "response.output_item.done",
            json!({ "output_index": index, "item": item }),
        ));
        self.output.push(item);
        self.tool_calls.push(json!({
            "id": call_id,
            "type": "function",
            "function": { "name": name, "arguments": arguments },
        }));
    }

    fn complete(&mut self, done: &DoneInfo, status: &str, frames: &mut Vec<SseFrame>) {
        self.close_item(frames);
        let mut response = self.snapshot(status);
        if let Some(usage) = &done.usage {
            response["usage"] = render_usage(usage);
        }
        if matches!(done.finish_reason, Some(FinishReason::Length)) && status == "completed" {
            response["status"] = json!("incomplete");
            response["incomplete_details"] = json!({ "reason": "max_output_tokens" });
        }
        response["metadata"] = json!({ "skipped_events": done.skipped_events.to_string() });

        if !self.tool_calls.is_empty() {
            let mut pending = response.clone();
            pending["status"] = json!("requires_action");
            pending["required_action"] = json!({
                "type": "submit_tool_outputs",
                "submit_tool_outputs": { "tool_calls": self.tool_calls },
            });
            frames.push(self.event("response.required_action", json!({ "response": pending })));
        }
        frames.push(self.event("response.completed", json!({ "response": response })));
    }
}

impl StreamEncoder for ResponsesStreamEncoder {
    fn encode(&mut self, event: &StreamEvent) -> Vec<SseFrame> {
        let mut frames = Vec::new();
        match event {
            StreamEvent::Content(part) => {
                self.ensure_started(&mut frames);
                match part {
                    OutputPart::Text { text } => self.text(text, &mut frames),
                    OutputPart::Thought { text, .. } => {
                        if !text.is_empty() {
                            self.thought(text, &mut frames);
                        }
                    }
                    OutputPart::ToolCall {
                        id,
                        name,
                        arguments,
                    } => self.tool_call(id, name, arguments, &mut frames),
                    other => {
                        if let Some(text) = other.as_fallback_text() {
                            self.text(&text, &mut frames);
                        }
                    }
                }
            }
            StreamEvent::Done(done) => {
                self.ensure_started(&mut frames);
                self.complete(done, "completed", &mut frames);
            }
            StreamEvent::Error(failure) => {
                frames.push(self.event(
                    "error",
                    json!({ "code": "upstream_error", "message": failure.message, "param": null }),
                ));
                if failure.emitted > 0 || self.started {
                    let done = DoneInfo {
                        finish_reason: Some(FinishReason::Error),
                        usage: None,
                        skipped_events: failure.skipped_events,
                    };
                    self.complete(&done, "incomplete", &mut frames);
                }
            }
        }
        frames
    }
}
