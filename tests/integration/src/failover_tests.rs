//! Pool failover across pipelines

use crate::*;
use async_trait::async_trait;
use gateway_core::{Credential, CredentialProvider, GatewayResult, KeyId, ProviderId};
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, ResponseTemplate};

fn pool_of(upstream: &MockUpstream, members: usize) -> ConfigBuilder {
    let mut builder = ConfigBuilder::new();
    let mut pool = Vec::new();
    for i in 0..members {
        let id = format!("p{i}");
        builder = builder.provider(&id, "openai-chat", &upstream.endpoint(&format!("p{i}/v1")));
        pool.push(id);
    }
    let members: Vec<(&str, &str)> = pool.iter().map(|p| (p.as_str(), "gpt-4o")).collect();
    builder.pool("default", &members)
}

fn route(i: usize) -> String {
    format!("/p{i}/v1/chat/completions")
}

#[tokio::test]
async fn test_third_pipeline_serves_after_two_retryable_failures() {
    let upstream = MockUpstream::start().await;
    upstream.respond(&route(0), upstream_error(503, "overloaded"), 1).await;
    upstream.respond(&route(1), upstream_error(429, "slow down"), 1).await;
    upstream.respond(&route(2), openai_chat_json("gpt-4o", "third time lucky"), 1).await;

    let gateway = TestGateway::start(pool_of(&upstream, 3).build()).await;
    let response = gateway
        .post_with_headers(
            "/v1/chat/completions",
            &openai_chat_request("gpt-4o", false),
            &[("x-gateway-debug", "1")],
        )
        .await;

    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()["x-gateway-attempts"], "3");
    assert_eq!(response.headers()["x-gateway-pipeline"], "p2.gpt-4o.main");
    let errors: serde_json::Value =
        serde_json::from_str(response.headers()["x-gateway-errors"].to_str().unwrap()).unwrap();
    assert_eq!(errors.as_array().map(Vec::len), Some(2));
    assert_eq!(errors[0]["pipeline_id"], "p0.gpt-4o.main");
    assert_eq!(errors[0]["stage"], "provider");
    assert_eq!(errors[0]["class"], "transient");
    assert_eq!(errors[1]["pipeline_id"], "p1.gpt-4o.main");
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["choices"][0]["message"]["content"], "third time lucky");
    assert_eq!(gateway.tracked_requests(), 0);
}

#[tokio::test]
async fn test_exhaustion_after_every_member_in_caller_shape() {
    let upstream = MockUpstream::start().await;
    for i in 0..3 {
        upstream.respond(&route(i), upstream_error(500, "boom"), 1).await;
    }

    let gateway = TestGateway::start(pool_of(&upstream, 3).build()).await;
    let response = gateway
        .post("/v1/messages", &anthropic_request("claude-3-5-sonnet-20241022", false))
        .await;

    assert_eq!(response.status(), 503);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["type"], "error");
    assert_eq!(body["error"]["type"], "overloaded_error");
    assert!(body["error"]["message"].as_str().unwrap().contains("All 3 pipelines"));
    assert_eq!(gateway.tracked_requests(), 0);
}

#[tokio::test]
async fn test_exhaustion_after_rate_limits_reports_429() {
    let upstream = MockUpstream::start().await;
    upstream.respond(&route(0), upstream_error(500, "boom"), 1).await;
    upstream.respond(&route(1), upstream_error(429, "slow down"), 1).await;

    let gateway = TestGateway::start(pool_of(&upstream, 2).build()).await;
    let response = gateway.post("/v1/chat/completions", &openai_chat_request("gpt-4o", false)).await;
    assert_eq!(response.status(), 429);
}

#[tokio::test]
async fn test_fatal_upstream_error_is_not_retried() {
    let upstream = MockUpstream::start().await;
    upstream.respond(&route(0), upstream_error(400, "bad request"), 1).await;
    upstream.respond(&route(1), openai_chat_json("gpt-4o", "unused"), 0).await;

    let gateway = TestGateway::start(pool_of(&upstream, 2).build()).await;
    let response = gateway.post("/v1/chat/completions", &openai_chat_request("gpt-4o", false)).await;
    assert_eq!(response.status(), 400);
    assert_eq!(gateway.tracked_requests(), 0);
}

#[tokio::test]
async fn test_timed_out_attempt_advances_to_next_member() {
    let upstream = MockUpstream::start().await;
    upstream
        .respond(&route(0), delayed(openai_chat_json("gpt-4o", "too late"), Duration::from_secs(2)), 1)
        .await;
    upstream.respond(&route(1), openai_chat_json("gpt-4o", "on time"), 1).await;

    let config = pool_of(&upstream, 2)
        .section("timeouts", json!({"attempt": "200ms"}))
        .build();
    let gateway = TestGateway::start(config).await;
    let response = gateway.post("/v1/chat/completions", &openai_chat_request("gpt-4o", false)).await;

    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["choices"][0]["message"]["content"], "on time");
}

#[tokio::test]
async fn test_garbled_upstream_body_advances() {
    let upstream = MockUpstream::start().await;
    upstream
        .respond(
            &route(0),
            ResponseTemplate::new(200).set_body_raw("<html>proxy error</html>", "text/html"),
            1,
        )
        .await;
    upstream.respond(&route(1), openai_chat_json("gpt-4o", "clean body"), 1).await;

    let gateway = TestGateway::start(pool_of(&upstream, 2).build()).await;
    let response = gateway.post("/v1/chat/completions", &openai_chat_request("gpt-4o", false)).await;

    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["choices"][0]["message"]["content"], "clean body");
}

#[tokio::test]
async fn test_stream_ending_before_first_event_advances() {
    let upstream = MockUpstream::start().await;
    upstream.respond(&route(0), sse(String::new()), 1).await;
    upstream.respond(&route(1), sse(openai_chat_sse("gpt-4o", &["ok"])), 1).await;

    let gateway = TestGateway::start(pool_of(&upstream, 2).build()).await;
    let response = gateway.post("/v1/chat/completions", &openai_chat_request("gpt-4o", true)).await;

    assert_eq!(response.status(), 200);
    let frames = parse_sse(&response.text().await.unwrap());
    assert_eq!(frames.last().map(|f| f.data.as_str()), Some("[DONE]"));
}

/// Hands out `stale` on the first fetch of each key, `fresh` afterwards
#[derive(Default)]
struct RotatingCredentials {
    fetches: Mutex<HashMap<String, usize>>,
}

impl RotatingCredentials {
    fn fetches(&self, provider: &str) -> usize {
        self.fetches.lock().unwrap().get(provider).copied().unwrap_or_default()
    }
}

#[async_trait]
impl CredentialProvider for RotatingCredentials {
    async fn credential(&self, provider: &ProviderId, _key: &KeyId) -> GatewayResult<Credential> {
        let mut fetches = self.fetches.lock().unwrap();
        let count = fetches.entry(provider.to_string()).or_default();
        *count += 1;
        Ok(Credential::new(if *count == 1 { "stale" } else { "fresh" }))
    }
}

#[tokio::test]
async fn test_auth_failure_refetches_credential_for_next_request() {
    let upstream = MockUpstream::start().await;
    Mock::given(method("POST"))
        .and(path(route(0)))
        .and(header("authorization", "Bearer stale"))
        .respond_with(upstream_error(401, "expired token"))
        .expect(1)
        .mount(&upstream.server)
        .await;
    Mock::given(method("POST"))
        .and(path(route(0)))
        .and(header("authorization", "Bearer fresh"))
        .respond_with(openai_chat_json("gpt-4o", "from p0"))
        .expect(1)
        .mount(&upstream.server)
        .await;
    upstream.respond(&route(1), openai_chat_json("gpt-4o", "from p1"), 1).await;

    let credentials = Arc::new(RotatingCredentials::default());
    let gateway = TestGateway::with_credentials(pool_of(&upstream, 2).build(), credentials.clone()).await;

    let first = gateway.post("/v1/chat/completions", &openai_chat_request("gpt-4o", false)).await;
    let first: serde_json::Value = first.json().await.unwrap();
    assert_eq!(first["choices"][0]["message"]["content"], "from p1");

    let second = gateway.post("/v1/chat/completions", &openai_chat_request("gpt-4o", false)).await;
    let second: serde_json::Value = second.json().await.unwrap();
    assert_eq!(second["choices"][0]["message"]["content"], "from p0");

    assert_eq!(credentials.fetches("p0"), 2);
    assert_eq!(credentials.fetches("p1"), 1);
}
