//! Routing category selection

use crate::*;
use serde_json::json;

/// One provider per category, each under its own path prefix
async fn category_gateway(upstream: &MockUpstream, categories: &[&str], routing: Option<serde_json::Value>) -> TestGateway {
    let mut builder = ConfigBuilder::new();
    for category in categories {
        builder = builder
            .provider(category, "openai-chat", &upstream.endpoint(&format!("{category}/v1")))
            .pool(category, &[(category, "gpt-4o")]);
    }
    if let Some(routing) = routing {
        builder = builder.section("routing", routing);
    }
    TestGateway::start(builder.build()).await
}

fn route(category: &str) -> String {
    format!("/{category}/v1/chat/completions")
}

#[tokio::test]
async fn test_image_parts_route_to_vision_pool() {
    let upstream = MockUpstream::start().await;
    upstream.respond(&route("vision"), openai_chat_json("gpt-4o", "a cat"), 1).await;
    upstream.respond(&route("default"), openai_chat_json("gpt-4o", "wrong pool"), 0).await;
    let gateway = category_gateway(&upstream, &["default", "vision"], None).await;

    let response = gateway.post("/v1/chat/completions", &openai_vision_request("gpt-4o")).await;
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["choices"][0]["message"]["content"], "a cat");
}

#[tokio::test]
async fn test_inferred_category_without_pool_falls_back_to_default() {
    let upstream = MockUpstream::start().await;
    upstream.respond(&route("default"), openai_chat_json("gpt-4o", "fallback"), 1).await;
    let gateway = category_gateway(&upstream, &["default", "vision"], None).await;

    let response = gateway.post("/v1/chat/completions", &openai_tools_request("gpt-4o")).await;
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn test_explicit_category_header_wins_over_inference() {
    let upstream = MockUpstream::start().await;
    upstream.respond(&route("thinking"), openai_chat_json("gpt-4o", "deep"), 1).await;
    upstream.respond(&route("vision"), openai_chat_json("gpt-4o", "wrong pool"), 0).await;
    let gateway = category_gateway(&upstream, &["default", "vision", "thinking"], None).await;

    let response = gateway
        .post_with_headers(
            "/v1/chat/completions",
            &openai_vision_request("gpt-4o"),
            &[("x-route-category", "thinking")],
        )
        .await;
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn test_category_from_body_key() {
    let upstream = MockUpstream::start().await;
    upstream.respond(&route("tools"), openai_chat_json("gpt-4o", "tooling"), 1).await;
    let gateway = category_gateway(&upstream, &["default", "tools"], None).await;

    let mut request = openai_chat_request("gpt-4o", false);
    request["__route_category"] = json!("tools");
    let response = gateway.post("/v1/chat/completions", &request).await;
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn test_long_requests_route_to_longcontext_pool() {
    let upstream = MockUpstream::start().await;
    upstream.respond(&route("longcontext"), openai_chat_json("gpt-4o", "long"), 1).await;
    upstream.respond(&route("default"), openai_chat_json("gpt-4o", "short"), 0).await;
    let gateway = category_gateway(
        &upstream,
        &["default", "longcontext"],
        Some(json!({"default_category": "default", "long_context_threshold": 10})),
    )
    .await;

    let request = json!({
        "model": "gpt-4o",
        "messages": [{"role": "user", "content": "word ".repeat(200)}]
    });
    let response = gateway.post("/v1/chat/completions", &request).await;
    assert_eq!(response.status(), 200);
}
