//! Anthropic Messages SSE: `message_start`, `content_block_*`, `message_delta`, `message_stop`.

use super::response::{finish_from_stop_reason, parse_block, stop_reason_for};
use crate::adapter::{DecodeStatus, EncoderContext, StreamDecoder, StreamEncoder};
use crate::sse::SseFrame;
use gateway_core::{DoneInfo, FinishReason, OutputPart, StreamEvent, Usage};
use serde_json::{json, Value};
use std::collections::BTreeMap;

#[derive(Debug)]
struct PendingToolUse {
    id: String,
    name: String,
    input: String,
}

/// Decodes Anthropic stream events
#[derive(Debug, Default)]
pub struct MessagesStreamDecoder {
    tools: BTreeMap<u64, PendingToolUse>,
    input_tokens: Option<u32>,
    output_tokens: Option<u32>,
    finish_reason: Option<FinishReason>,
}

impl MessagesStreamDecoder {
    fn flush_tool(&mut self, index: u64, out: &mut Vec<OutputPart>) {
        if let Some(tool) = self.tools.remove(&index) {
            let input = if tool.input.trim().is_empty() {
                "{}".to_string()
            } else {
                tool.input
            };
            out.push(OutputPart::tool_call(tool.id, tool.name, input));
        }
    }
}

impl StreamDecoder for MessagesStreamDecoder {
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
        let index = payload.get("index").and_then(Value::as_u64).unwrap_or(0);

        match kind {
            "message_start" => {
                if let Some(tokens) = payload
                    .pointer("/message/usage/input_tokens")
                    .and_then(Value::as_u64)
                {
                    self.input_tokens = u32::try_from(tokens).ok();
                }
            }
            "content_block_start" => {
                let block = payload.get("content_block").unwrap_or(&Value::Null);
                match block.get("type").and_then(Value::as_str) {
                    Some("tool_use" | "server_tool_use") => {
                        let initial = block
                            .get("input")
                            .filter(|v| v.as_object().is_some_and(|o| !o.is_empty()))
                            .map(Value::to_string)
                            .unwrap_or_default();
                        self.tools.insert(
                            index,
                            PendingToolUse {
                                id: block
                                    .get("id")
                                    .and_then(Value::as_str)
                                    .unwrap_or_default()
                                    .to_string(),
                                name: block
                                    .get("name")
                                    .and_then(Value::as_str)
                                    .unwrap_or_default()
                                    .to_string(),
                                input: initial,
                            },
                        );
                    }
                    Some("text") => {
                        if let Some(text) = block.get("text").and_then(Value::as_str) {
                            if !text.is_empty() {
                                out.push(OutputPart::text(text));
                            }
                        }
                    }
                    Some("thinking" | "redacted_thinking") => {}
                    _ => {
                        if let Some(part) = parse_block(block) {
                            out.push(part);
                        }
                    }
                }
            }
            "content_block_delta" => {
                let delta = payload.get("delta").unwrap_or(&Value::Null);
                let text = |key: &str| delta.get(key).and_then(Value::as_str).unwrap_or_default();
                match delta.get("type").and_then(Value::as_str) {
                    Some("text_delta") => out.push(OutputPart::text(text("text"))),
                    Some("thinking_delta") => out.push(OutputPart::thought(text("thinking"))),
                    Some("signature_delta") => out.push(OutputPart::Thought {
                        text: String::new(),
                        signature: Some(text("signature").to_string()),
                    }),
                    Some("input_json_delta") => {
                        if let Some(tool) = self.tools.get_mut(&index) {
                            tool.input.push_str(text("partial_json"));
                        }
                    }
                    _ => {}
                }
            }
            "content_block_stop" => self.flush_tool(index, out),
            "message_delta" => {
                if let Some(reason) = payload.pointer("/delta/stop_reason").and_then(Value::as_str) {
                    self.finish_reason = Some(finish_from_stop_reason(reason));
                }
                if let Some(tokens) = payload
                    .pointer("/usage/output_tokens")
                    .and_then(Value::as_u64)
                {
                    self.output_tokens = u32::try_from(tokens).ok();
                }
            }
            "message_stop" => return DecodeStatus::Finished,
            "error" => {
                let message = payload
                    .pointer("/error/message")
                    .and_then(Value::as_str)
                    .unwrap_or("upstream stream error");
                return DecodeStatus::Failed(message.to_string());
            }
            _ => {}
        }
        DecodeStatus::Continue
    }

    fn finish(&mut self, out: &mut Vec<OutputPart>) -> DoneInfo {
        let indexes: Vec<u64> = self.tools.keys().copied().collect();
        for index in indexes {
            self.flush_tool(index, out);
        }
        let usage = (self.input_tokens.is_some() || self.output_tokens.is_some()).then(|| {
            Usage::new(
                self.input_tokens.unwrap_or(0),
                self.output_tokens.unwrap_or(0),
            )
        });
        DoneInfo {
            finish_reason: self.finish_reason,
            usage,
            skipped_events: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpenBlock {
    Text,
    Thinking,
}

/// Encodes canonical events as Anthropic stream events
#[derive(Debug)]
pub struct MessagesStreamEncoder {
    context: EncoderContext,
    started: bool,
    open: Option<OpenBlock>,
    next_index: usize,
    saw_tool_use: bool,
}

impl MessagesStreamEncoder {
    /// Create an encoder
    #[must_use]
    pub fn new(context: EncoderContext) -> Self {
        Self {
            context,
            started: false,
            open: None,
            next_index: 0,
            saw_tool_use: false,
        }
    }

    fn ensure_started(&mut self, frames: &mut Vec<SseFrame>) {
        if self.started {
            return;
        }
        self.started = true;
        frames.push(SseFrame::typed(&json!({
            "type": "message_start",
            "message": {
                "id": self.context.id,
                "type": "message",
                "role": "assistant",
                "model": self.context.model,
                "content": [],
                "stop_reason": null,
                "stop_sequence": null,
                "usage": { "input_tokens": 0, "output_tokens": 0 },
            },
        })));
    }

    fn close_block(&mut self, frames: &mut Vec<SseFrame>) {
        if self.open.take().is_some() {
            frames.push(self.block_stop());
        }
    }

    fn block_stop(&mut self) -> SseFrame {
        let index = self.next_index;
        self.next_index += 1;
        SseFrame::typed(&json!({ "type": "content_block_stop", "index": index }))
    }

    fn open_block(&mut self, kind: OpenBlock, frames: &mut Vec<SseFrame>) {
        if self.open == Some(kind) {
            return;
        }
        self.close_block(frames);
        let block = match kind {
            OpenBlock::Text => json!({ "type": "text", "text": "" }),
            OpenBlock::Thinking => json!({ "type": "thinking", "thinking": "" }),
        };
        frames.push(SseFrame::typed(&json!({
            "type": "content_block_start",
            "index": self.next_index,
            "content_block": block,
        })));
        self.open = Some(kind);
    }

    fn delta(&self, delta: Value) -> SseFrame {
        SseFrame::typed(&json!({
            "type": "content_block_delta",
            "index": self.next_index,
            "delta": delta,
        }))
    }

    fn text(&mut self, text: &str, frames: &mut Vec<SseFrame>) {
        self.open_block(OpenBlock::Text, frames);
        frames.push(self.delta(json!({ "type": "text_delta", "text": text })));
    }

    fn finish_message(&mut self, finish: FinishReason, usage: Option<&Usage>, frames: &mut Vec<SseFrame>) {
        self.close_block(frames);
        let finish = if self.saw_tool_use {
            FinishReason::ToolCalls
        } else {
            finish
        };
        frames.push(SseFrame::typed(&json!({
            "type": "message_delta",
            "delta": { "stop_reason": stop_reason_for(finish), "stop_sequence": null },
            "usage": { "output_tokens": usage.map_or(0, |u| u.completion_tokens) },
        })));
        frames.push(SseFrame::typed(&json!({ "type": "message_stop" })));
    }
}

impl StreamEncoder for MessagesStreamEncoder {
    fn encode(&mut self, event: &StreamEvent) -> Vec<SseFrame> {
        let mut frames = Vec::new();
        match event {
            StreamEvent::Content(part) => {
                self.ensure_started(&mut frames);
                match part {
                    OutputPart::Text { text } => self.text(text, &mut frames),
                    OutputPart::Thought { text, signature } => {
                        self.open_block(OpenBlock::Thinking, &mut frames);
                        if !text.is_empty() {
                            frames.push(self.delta(json!({ "type": "thinking_delta", "thinking": text })));
                        }
                        if let Some(signature) = signature {
                            frames.push(
                                self.delta(json!({ "type": "signature_delta", "signature": signature })),
                            );
                        }
                    }
                    OutputPart::ToolCall {
                        id,
                        name,
                        arguments,
                    } => {
                        self.close_block(&mut frames);
                        self.saw_tool_use = true;
                        frames.push(SseFrame::typed(&json!({
                            "type": "content_block_start",
                            "index": self.next_index,
                            "content_block": { "type": "tool_use", "id": id, "name": name, "input": {} },
                        })));
                        frames.push(self.delta(json!({
                            "type": "input_json_delta",
                            "partial_json": arguments,
                        })));
                        frames.push(self.block_stop());
                    }
                    other => {
                        if let Some(text) = other.as_fallback_text() {
                            self.text(&text, &mut frames);
                        }
                    }
                }
            }
            StreamEvent::Done(done) => {
                self.ensure_started(&mut frames);
                self.finish_message(
                    done.finish_reason.unwrap_or(FinishReason::Stop),
                    done.usage.as_ref(),
                    &mut frames,
                );
            }
            StreamEvent::Error(failure) => {
                frames.push(SseFrame::typed(&json!({
                    "type": "error",
                    "error": { "type": "api_error", "message": failure.message },
                })));
                if failure.emitted > 0 || self.started {
                    self.finish_message(FinishReason::Error, None, &mut frames);
                }
            }
        }
        frames
    }
}
