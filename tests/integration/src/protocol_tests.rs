//! Caller/upstream protocol translation over HTTP

use crate::*;
use serde_json::{json, Value};
use wiremock::matchers::{header, method, path};
use wiremock::Mock;

async fn openai_gateway(upstream: &MockUpstream) -> TestGateway {
    let config = ConfigBuilder::new()
        .provider("openai", "openai-chat", &upstream.endpoint("openai/v1"))
        .pool("default", &[("openai", "gpt-4o")])
        .build();
    TestGateway::start(config).await
}

#[tokio::test]
async fn test_anthropic_required_tool_choice_reaches_openai_upstream_normalized() {
    let upstream = MockUpstream::start().await;
    upstream
        .respond(
            "/openai/v1/chat/completions",
            openai_tool_call_json("gpt-4o", "get_weather", r#"{"city":"Paris"}"#),
            1,
        )
        .await;
    let gateway = openai_gateway(&upstream).await;

    let request = json!({
        "model": "claude-3-5-sonnet-20241022",
        "max_tokens": 256,
        "messages": [{"role": "user", "content": "hi"}],
        "tools": [{
            "name": "get_weather",
            "description": "Current weather",
            "input_schema": {"type": "object", "properties": {"city": {"type": "string"}}}
        }],
        "tool_choice": "required"
    });
    let response = gateway.post("/v1/messages", &request).await;
    assert_eq!(response.status(), 200);

    let sent = upstream.bodies("/openai/v1/chat/completions").await;
    assert_eq!(sent[0]["tool_choice"], "required");
    assert_eq!(sent[0]["tools"][0]["type"], "function");
    assert_eq!(sent[0]["tools"][0]["function"]["name"], "get_weather");

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["type"], "message");
    assert_eq!(body["stop_reason"], "tool_use");
    let block = body["content"]
        .as_array()
        .unwrap()
        .iter()
        .find(|b| b["type"] == "tool_use")
        .expect("tool_use block");
    assert_eq!(block["name"], "get_weather");
    assert_eq!(block["id"], "call_1");
    assert_eq!(block["input"], json!({"city": "Paris"}));
}

#[tokio::test]
async fn test_internal_keys_never_reach_upstream() {
    let upstream = MockUpstream::start().await;
    upstream
        .respond("/openai/v1/chat/completions", openai_chat_json("gpt-4o", "ok"), 1)
        .await;
    let gateway = openai_gateway(&upstream).await;

    let mut request = openai_chat_request("gpt-4o", false);
    request["__route_category"] = json!("default");
    request["__debug"] = json!(true);
    let response = gateway.post("/v1/chat/completions", &request).await;
    assert_eq!(response.status(), 200);
    assert!(response.headers().contains_key("x-gateway-stages"));

    let sent = upstream.bodies("/openai/v1/chat/completions").await;
    let keys: Vec<&String> = sent[0].as_object().unwrap().keys().collect();
    assert!(keys.iter().all(|k| !k.starts_with("__")), "leaked keys: {keys:?}");
}

#[tokio::test]
async fn test_responses_caller_gets_function_call_items() {
    let upstream = MockUpstream::start().await;
    upstream
        .respond(
            "/openai/v1/chat/completions",
            openai_tool_call_json("gpt-4o", "lookup", r#"{"q":"rust"}"#),
            1,
        )
        .await;
    let gateway = openai_gateway(&upstream).await;

    let response = gateway.post("/v1/responses", &responses_request("gpt-4o", false)).await;
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["object"], "response");
    let call = body["output"]
        .as_array()
        .unwrap()
        .iter()
        .find(|item| item["type"] == "function_call")
        .expect("function_call item");
    assert_eq!(call["name"], "lookup");
    assert_eq!(call["call_id"], "call_1");
}

#[tokio::test]
async fn test_anthropic_upstream_receives_auth_and_version_headers() {
    let upstream = MockUpstream::start().await;
    Mock::given(method("POST"))
        .and(path("/anthropic/v1/messages"))
        .and(header("x-api-key", "sk-anthropic"))
        .and(header("anthropic-version", "2023-06-01"))
        .respond_with(anthropic_json("claude-3-5-sonnet-20241022", "bonjour"))
        .expect(1)
        .mount(&upstream.server)
        .await;
    let config = ConfigBuilder::new()
        .provider("anthropic", "anthropic-messages", &upstream.endpoint("anthropic/v1"))
        .pool("default", &[("anthropic", "claude-3-5-sonnet-20241022")])
        .build();
    let gateway = TestGateway::start(config).await;

    let response = gateway
        .post_with_headers(
            "/v1/chat/completions",
            &openai_chat_request("gpt-4o", false),
            &[("authorization", "Bearer caller-secret")],
        )
        .await;
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["object"], "chat.completion");
    assert_eq!(body["choices"][0]["message"]["content"], "bonjour");

    let received = upstream.server.received_requests().await.unwrap();
    assert!(received[0].headers.get("authorization").is_none());
}

#[tokio::test]
async fn test_cloud_code_envelope_wrapped_and_unwrapped() {
    let upstream = MockUpstream::start().await;
    upstream
        .respond(
            "/cc/v1internal:generateContent",
            wiremock::ResponseTemplate::new(200).set_body_json(json!({"response": gemini_json("from cloud code")})),
            1,
        )
        .await;
    let config = ConfigBuilder::new()
        .provider_with(
            "cloudcode",
            json!({
                "protocol": "gemini",
                "endpoint": upstream.endpoint("cc"),
                "auth_mode": "bearer",
                "cloud_code_project": "proj-1",
                "keys": {"main": {"value": "ya29.token"}}
            }),
        )
        .pool("default", &[("cloudcode", "gemini-2.5-pro")])
        .build();
    let gateway = TestGateway::start(config).await;

    let response = gateway.post("/v1/chat/completions", &openai_chat_request("gpt-4o", false)).await;
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["choices"][0]["message"]["content"], "from cloud code");

    let sent = upstream.bodies("/cc/v1internal:generateContent").await;
    assert_eq!(sent[0]["model"], "gemini-2.5-pro");
    assert_eq!(sent[0]["project"], "proj-1");
    assert!(sent[0]["request"]["contents"].is_array());
}

#[tokio::test]
async fn test_compatibility_profile_applied_to_upstream_body() {
    let upstream = MockUpstream::start().await;
    upstream
        .respond("/compat/v1/chat/completions", openai_chat_json("local-model", "ok"), 1)
        .await;
    let config = ConfigBuilder::new()
        .provider_with(
            "local",
            json!({
                "protocol": "openai-chat",
                "endpoint": upstream.endpoint("compat/v1"),
                "auth_mode": "none",
                "compatibility": "local",
                "keys": {"main": {"value": "unused"}}
            }),
        )
        .section(
            "compatibility",
            json!({
                "local": {
                    "request": [
                        {"default": {"to": "max_tokens", "value": 512}},
                        {"copy": {"from": "model", "to": "metadata.requested_model"}}
                    ],
                    "strip_request_fields": ["user"]
                }
            }),
        )
        .pool("default", &[("local", "local-model")])
        .build();
    let gateway = TestGateway::start(config).await;

    let mut request = openai_chat_request("gpt-4o", false);
    request["user"] = json!("u-1");
    let response = gateway.post("/v1/chat/completions", &request).await;
    assert_eq!(response.status(), 200);

    let sent = upstream.bodies("/compat/v1/chat/completions").await;
    assert_eq!(sent[0]["model"], "local-model");
    assert_eq!(sent[0]["max_tokens"], 512);
    assert_eq!(sent[0]["metadata"]["requested_model"], "local-model");
    assert!(sent[0].get("user").is_none());
    let received = upstream.server.received_requests().await.unwrap();
    assert!(received[0].headers.get("authorization").is_none());
}
