//! HTTP surface: probes, introspection, headers, reload

use crate::*;
use serde_json::{json, Value};

fn two_pools(upstream: &MockUpstream) -> ConfigBuilder {
    ConfigBuilder::new()
        .provider("openai", "openai-chat", &upstream.endpoint("openai/v1"))
        .provider("claude", "anthropic-messages", &upstream.endpoint("claude/v1"))
        .pool("default", &[("claude", "claude-3-5-sonnet-20241022"), ("openai", "gpt-4o")])
        .pool("vision", &[("openai", "gpt-4o")])
}

#[tokio::test]
async fn test_health_and_ready() {
    let upstream = MockUpstream::start().await;
    let gateway = TestGateway::start(two_pools(&upstream).build()).await;

    let health = gateway.get("/health").await;
    assert_eq!(health.status(), 200);
    let body: Value = health.json().await.unwrap();
    assert_eq!(body["status"], "healthy");

    let ready = gateway.get("/ready").await;
    assert_eq!(ready.status(), 200);
    let body: Value = ready.json().await.unwrap();
    assert_eq!(body["pools"], 2);
}

#[tokio::test]
async fn test_models_and_admin_pools() {
    let upstream = MockUpstream::start().await;
    let gateway = TestGateway::start(two_pools(&upstream).build()).await;

    let models: Value = gateway.get("/v1/models").await.json().await.unwrap();
    let ids: Vec<&str> = models["data"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|m| m["id"].as_str())
        .collect();
    assert_eq!(ids, vec!["claude-3-5-sonnet-20241022", "gpt-4o"]);

    let pools: Value = gateway.get("/admin/pools").await.json().await.unwrap();
    assert_eq!(
        pools["pools"]["default"],
        json!(["claude.claude-3-5-sonnet-20241022.main", "openai.gpt-4o.main"])
    );
    assert_eq!(pools["pools"]["vision"], json!(["openai.gpt-4o.main"]));
}

#[tokio::test]
async fn test_reload_replaces_pools() {
    let upstream = MockUpstream::start().await;
    let gateway = TestGateway::start(two_pools(&upstream).build()).await;

    let next = ConfigBuilder::new()
        .provider("openai", "openai-chat", &upstream.endpoint("openai/v1"))
        .pool("default", &[("openai", "gpt-4o-mini")])
        .build();
    gateway.config.replace(next).unwrap();

    let registry = gateway.manager.registry().clone();
    assert!(eventually(|| !registry.snapshot().has_pool("vision")).await);

    let pools: Value = gateway.get("/admin/pools").await.json().await.unwrap();
    assert_eq!(pools["pools"], json!({"default": ["openai.gpt-4o-mini.main"]}));
    assert_eq!(pools["config_version"], 1);
}

#[tokio::test]
async fn test_standard_headers_and_request_id() {
    let upstream = MockUpstream::start().await;
    let gateway = TestGateway::start(two_pools(&upstream).build()).await;

    let generated = gateway.get("/v1/models").await;
    assert_eq!(generated.headers()["cache-control"], "no-store");
    assert_eq!(generated.headers()["content-type"], "application/json; charset=utf-8");
    assert!(generated.headers()["x-request-id"].to_str().unwrap().starts_with("req_"));

    let echoed = gateway
        .client
        .get(gateway.url("/health"))
        .header("x-correlation-id", "corr-42")
        .send()
        .await
        .unwrap();
    assert_eq!(echoed.headers()["x-request-id"], "corr-42");
}

#[tokio::test]
async fn test_invalid_body_rendered_in_openai_shape() {
    let upstream = MockUpstream::start().await;
    let gateway = TestGateway::start(two_pools(&upstream).build()).await;

    let response = gateway
        .client
        .post(gateway.url("/v1/chat/completions"))
        .header("content-type", "application/json")
        .body("{\"model\": ")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["type"], "invalid_request_error");
    assert_eq!(gateway.tracked_requests(), 0);
}

#[tokio::test]
async fn test_oversized_body_rejected() {
    let upstream = MockUpstream::start().await;
    let config = two_pools(&upstream)
        .section("server", json!({"request_body_limit": 1024}))
        .build();
    let gateway = TestGateway::start(config).await;

    let mut request = openai_chat_request("gpt-4o", false);
    request["messages"][0]["content"] = json!("x".repeat(4096));
    let response = gateway.post("/v1/chat/completions", &request).await;
    assert_eq!(response.status(), 413);
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let upstream = MockUpstream::start().await;
    let gateway = TestGateway::start(two_pools(&upstream).build()).await;
    let response = gateway.get("/v1/unknown").await;
    assert_eq!(response.status(), 404);
}
