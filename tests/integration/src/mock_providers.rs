//! Mock LLM upstreams for integration testing
//!
//! wiremock servers answering in the OpenAI, Anthropic and Gemini wire
//! formats, as JSON or SSE.

use serde_json::{json, Value};
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Mock upstream; one server can host several providers under path prefixes
pub struct MockUpstream {
    /// The wiremock server
    pub server: MockServer,
}

impl MockUpstream {
    /// Start a mock server
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Base URL of the server
    pub fn url(&self) -> String {
        self.server.uri()
    }

    /// Endpoint for a provider living under `/{prefix}`
    pub fn endpoint(&self, prefix: &str) -> String {
        format!("{}/{prefix}", self.server.uri())
    }

    /// Answer every POST to `route` with `template`, expecting `calls` hits
    pub async fn respond(&self, route: &str, template: ResponseTemplate, calls: u64) {
        Mock::given(method("POST"))
            .and(path(route))
            .respond_with(template)
            .expect(calls)
            .mount(&self.server)
            .await;
    }

    /// Bodies received on `route`, in arrival order
    pub async fn bodies(&self, route: &str) -> Vec<Value> {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .into_iter()
            .filter(|r| r.url.path() == route)
            .filter_map(|r| serde_json::from_slice(&r.body).ok())
            .collect()
    }
}

/// SSE response from already framed text
pub fn sse(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body, "text/event-stream")
}

/// Delay a template
pub fn delayed(template: ResponseTemplate, delay: Duration) -> ResponseTemplate {
    template.set_delay(delay)
}

/// Upstream error in the OpenAI shape
pub fn upstream_error(status: u16, message: &str) -> ResponseTemplate {
    ResponseTemplate::new(status).set_body_json(json!({
        "error": {"message": message, "type": "server_error", "code": status}
    }))
}

/// Non-streaming OpenAI chat completion
pub fn openai_chat_json(model: &str, content: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "id": "chatcmpl-test",
        "object": "chat.completion",
        "created": 1_700_000_000,
        "model": model,
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 5, "completion_tokens": 2, "total_tokens": 7}
    }))
}

/// OpenAI chat completion calling one tool
pub fn openai_tool_call_json(model: &str, name: &str, arguments: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "id": "chatcmpl-tool",
        "object": "chat.completion",
        "model": model,
        "choices": [{
            "index": 0,
            "message": {
                "role": "assistant",
                "content": null,
                "tool_calls": [{
                    "id": "call_1",
                    "type": "function",
                    "function": {"name": name, "arguments": arguments}
                }]
            },
            "finish_reason": "tool_calls"
        }],
        "usage": {"prompt_tokens": 9, "completion_tokens": 4, "total_tokens": 13}
    }))
}

/// OpenAI chat SSE body streaming `chunks` as content deltas
pub fn openai_chat_sse(model: &str, chunks: &[&str]) -> String {
    let mut body = String::new();
    for chunk in chunks {
        body.push_str(&openai_chunk_line(model, &json!({"content": chunk}), None));
    }
    body.push_str(&openai_chunk_line(model, &json!({}), Some("stop")));
    body.push_str("data: [DONE]\n\n");
    body
}

/// One framed `chat.completion.chunk`
pub fn openai_chunk_line(model: &str, delta: &Value, finish_reason: Option<&str>) -> String {
    let chunk = json!({
        "id": "chatcmpl-stream",
        "object": "chat.completion.chunk",
        "model": model,
        "choices": [{"index": 0, "delta": delta, "finish_reason": finish_reason}]
    });
    format!("data: {chunk}\n\n")
}

/// Non-streaming Anthropic message
pub fn anthropic_json(model: &str, text: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "id": "msg_test",
        "type": "message",
        "role": "assistant",
        "model": model,
        "content": [{"type": "text", "text": text}],
        "stop_reason": "end_turn",
        "usage": {"input_tokens": 5, "output_tokens": 2}
    }))
}

/// Anthropic SSE body for one text block
pub fn anthropic_sse(model: &str, chunks: &[&str]) -> String {
    let mut events = vec![
        json!({"type": "message_start", "message": {
            "id": "msg_stream", "type": "message", "role": "assistant", "model": model,
            "content": [], "usage": {"input_tokens": 5, "output_tokens": 0}
        }}),
        json!({"type": "content_block_start", "index": 0, "content_block": {"type": "text", "text": ""}}),
    ];
    for chunk in chunks {
        events.push(json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": chunk}}));
    }
    events.push(json!({"type": "content_block_stop", "index": 0}));
    events.push(json!({"type": "message_delta", "delta": {"stop_reason": "end_turn"}, "usage": {"output_tokens": 2}}));
    events.push(json!({"type": "message_stop"}));

    events
        .iter()
        .map(|e| format!("event: {}\ndata: {e}\n\n", e["type"].as_str().unwrap_or_default()))
        .collect()
}

/// Non-streaming Gemini response
pub fn gemini_json(text: &str) -> Value {
    json!({
        "candidates": [{
            "content": {"role": "model", "parts": [{"text": text}]},
            "finishReason": "STOP",
            "index": 0
        }],
        "usageMetadata": {"promptTokenCount": 5, "candidatesTokenCount": 2, "totalTokenCount": 7}
    })
}

/// Gemini SSE body, one event per payload
pub fn gemini_sse(payloads: &[Value]) -> String {
    payloads.iter().map(|p| format!("data: {p}\n\n")).collect()
}
