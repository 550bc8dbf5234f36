//! Streaming control and SSE translation end to end

use crate::*;
use serde_json::{json, Value};

fn text_of(frames: &[SseFrame], pick: impl Fn(&Value) -> Option<String>) -> String {
    frames.iter().filter_map(SseFrame::json).filter_map(|v| pick(&v)).collect()
}

fn types(frames: &[SseFrame]) -> Vec<String> {
    frames
        .iter()
        .filter_map(SseFrame::json)
        .filter_map(|v| v["type"].as_str().map(String::from))
        .collect()
}

#[tokio::test]
async fn test_openai_upstream_stream_rendered_as_anthropic_events() {
    let upstream = MockUpstream::start().await;
    upstream
        .respond(
            "/openai/v1/chat/completions",
            sse(openai_chat_sse("gpt-4o", &["Hel", "lo ", "world"])),
            1,
        )
        .await;
    let config = ConfigBuilder::new()
        .provider("openai", "openai-chat", &upstream.endpoint("openai/v1"))
        .pool("default", &[("openai", "gpt-4o")])
        .build();
    let gateway = TestGateway::start(config).await;

    let response = gateway
        .post_with_headers(
            "/v1/messages",
            &anthropic_request("claude-3-5-sonnet-20241022", true),
            &[("x-request-id", "req-stream-1")],
        )
        .await;
    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()["content-type"], "text/event-stream; charset=utf-8");
    assert_eq!(response.headers()["cache-control"], "no-store");
    assert_eq!(response.headers()["x-request-id"], "req-stream-1");

    let frames = parse_sse(&response.text().await.unwrap());
    let kinds = types(&frames);
    assert_eq!(kinds.first().map(String::as_str), Some("message_start"));
    assert_eq!(kinds.last().map(String::as_str), Some("message_stop"));
    assert!(kinds.iter().any(|k| k == "content_block_start"));
    let text = text_of(&frames, |v| v["delta"]["text"].as_str().map(String::from));
    assert_eq!(text, "Hello world");

    let sent = upstream.bodies("/openai/v1/chat/completions").await;
    assert_eq!(sent[0]["stream"], true);
    assert_eq!(sent[0]["model"], "gpt-4o");
    assert_eq!(gateway.tracked_requests(), 0);
}

#[tokio::test]
async fn test_malformed_upstream_event_skipped_and_counted() {
    let upstream = MockUpstream::start().await;
    let mut body = String::new();
    body.push_str(&openai_chunk_line("gpt-4o", &json!({"content": "one "}), None));
    body.push_str("data: {\"choices\": [ broken\n\n");
    body.push_str(&openai_chunk_line("gpt-4o", &json!({"content": "two"}), None));
    body.push_str(&openai_chunk_line("gpt-4o", &json!({}), Some("stop")));
    body.push_str("data: [DONE]\n\n");
    upstream.respond("/openai/v1/chat/completions", sse(body), 1).await;

    let config = ConfigBuilder::new()
        .provider("openai", "openai-chat", &upstream.endpoint("openai/v1"))
        .pool("default", &[("openai", "gpt-4o")])
        .build();
    let gateway = TestGateway::start(config).await;

    let response = gateway.post("/v1/responses", &responses_request("gpt-4o", true)).await;
    assert_eq!(response.status(), 200);
    let frames = parse_sse(&response.text().await.unwrap());

    let text = text_of(&frames, |v| {
        (v["type"] == "response.output_text.delta")
            .then(|| v["delta"].as_str().map(String::from))
            .flatten()
    });
    assert_eq!(text, "one two");
    let completed = frames
        .iter()
        .filter_map(SseFrame::json)
        .find(|v| v["type"] == "response.completed")
        .expect("stream completed");
    assert_eq!(completed["response"]["status"], "completed");
    assert_eq!(completed["response"]["metadata"]["skipped_events"], "1");
    assert!(!types(&frames).iter().any(|k| k == "error" || k == "response.failed"));
}

#[tokio::test]
async fn test_gemini_function_call_event_becomes_openai_tool_call_chunk() {
    let upstream = MockUpstream::start().await;
    let body = gemini_sse(&[
        json!({"candidates": [{"content": {"role": "model", "parts": [{"functionCall": {"name": "x", "args": {}}}]}, "index": 0}]}),
        json!({"candidates": [{"content": {"role": "model", "parts": []}, "finishReason": "STOP", "index": 0}]}),
    ]);
    upstream
        .respond("/gemini/v1beta/models/gemini-2.0-flash:streamGenerateContent", sse(body), 1)
        .await;

    let config = ConfigBuilder::new()
        .provider("gemini", "gemini", &upstream.endpoint("gemini/v1beta"))
        .pool("default", &[("gemini", "gemini-2.0-flash")])
        .build();
    let gateway = TestGateway::start(config).await;

    let response = gateway.post("/v1/chat/completions", &openai_chat_request("gpt-4o", true)).await;
    assert_eq!(response.status(), 200);
    let frames = parse_sse(&response.text().await.unwrap());
    let call = frames
        .iter()
        .filter_map(SseFrame::json)
        .find_map(|v| v["choices"][0]["delta"]["tool_calls"][0].as_object().cloned())
        .expect("tool call chunk");
    assert_eq!(call["function"]["name"], "x");
    assert_eq!(frames.last().map(|f| f.data.as_str()), Some("[DONE]"));
}

#[tokio::test]
async fn test_stream_synthesized_from_json_only_upstream() {
    let upstream = MockUpstream::start().await;
    upstream
        .respond("/openai/v1/chat/completions", openai_chat_json("gpt-4o", "synthesized"), 1)
        .await;
    let config = ConfigBuilder::new()
        .provider_with(
            "openai",
            json!({
                "protocol": "openai-chat",
                "endpoint": upstream.endpoint("openai/v1"),
                "streaming": "never",
                "keys": {"main": {"value": "sk"}}
            }),
        )
        .pool("default", &[("openai", "gpt-4o")])
        .build();
    let gateway = TestGateway::start(config).await;

    let response = gateway.post("/v1/chat/completions", &openai_chat_request("gpt-4o", true)).await;
    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()["content-type"], "text/event-stream; charset=utf-8");
    let frames = parse_sse(&response.text().await.unwrap());
    let text = text_of(&frames, |v| v["choices"][0]["delta"]["content"].as_str().map(String::from));
    assert_eq!(text, "synthesized");
    assert_eq!(frames.last().map(|f| f.data.as_str()), Some("[DONE]"));

    let sent = upstream.bodies("/openai/v1/chat/completions").await;
    assert_ne!(sent[0]["stream"], true);
}

#[tokio::test]
async fn test_stream_only_upstream_aggregated_for_json_caller() {
    let upstream = MockUpstream::start().await;
    upstream
        .respond(
            "/anthropic/v1/messages",
            sse(anthropic_sse("claude-3-5-sonnet-20241022", &["aggre", "gated"])),
            1,
        )
        .await;
    let config = ConfigBuilder::new()
        .provider_with(
            "anthropic",
            json!({
                "protocol": "anthropic-messages",
                "endpoint": upstream.endpoint("anthropic/v1"),
                "auth_mode": "x-api-key",
                "streaming": "always",
                "keys": {"main": {"value": "sk-ant"}}
            }),
        )
        .pool("default", &[("anthropic", "claude-3-5-sonnet-20241022")])
        .build();
    let gateway = TestGateway::start(config).await;

    let response = gateway.post("/v1/chat/completions", &openai_chat_request("gpt-4o", false)).await;
    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()["content-type"], "application/json; charset=utf-8");
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["choices"][0]["message"]["content"], "aggregated");
    assert_eq!(body["choices"][0]["finish_reason"], "stop");

    let sent = upstream.bodies("/anthropic/v1/messages").await;
    assert_eq!(sent[0]["stream"], true);
}

#[tokio::test]
async fn test_gemini_stream_path_sets_streaming() {
    let upstream = MockUpstream::start().await;
    upstream
        .respond("/openai/v1/chat/completions", sse(openai_chat_sse("gpt-4o", &["hi ", "there"])), 1)
        .await;
    let config = ConfigBuilder::new()
        .provider("openai", "openai-chat", &upstream.endpoint("openai/v1"))
        .pool("default", &[("openai", "gpt-4o")])
        .build();
    let gateway = TestGateway::start(config).await;

    let response = gateway
        .post("/v1beta/models/gemini-1.5-pro:streamGenerateContent?alt=sse", &gemini_request())
        .await;
    assert_eq!(response.status(), 200);
    let frames = parse_sse(&response.text().await.unwrap());
    let text = text_of(&frames, |v| {
        v["candidates"][0]["content"]["parts"][0]["text"].as_str().map(String::from)
    });
    assert_eq!(text, "hi there");
}
