//! Route definitions for the gateway API.

use axum::{
    extract::{DefaultBodyLimit, Request},
    routing::{get, post},
    Router,
};
use gateway_core::Protocol;
use std::collections::BTreeSet;
use tower_http::trace::TraceLayer;
use tracing::debug;

use crate::{extractors::REQUEST_ID_HEADER, handlers, health, middleware, shutdown, state::AppState};

/// Chat endpoints served by the protocol-detecting proxy handler
const CHAT_ROUTES: &[&str] = &[
    "/v1/chat/completions",
    "/v1/openai/chat/completions",
    "/v1/responses",
    "/v1/messages",
    "/v1/anthropic/messages",
    "/v1/gemini",
];

/// Create the main API router
pub fn create_router(state: AppState) -> Router {
    let config = state.config.load();

    let mut router = Router::new()
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .route("/v1/models", get(handlers::list_models))
        .route("/admin/pools", get(handlers::list_pools))
        // Gemini carries model and action in the last segment
        .route("/v1beta/models/*target", post(handlers::gemini))
        .route("/v1/models/*target", post(handlers::gemini));

    for path in chat_paths(&config) {
        router = router.route(&path, post(handlers::proxy));
    }

    router
        .fallback(handlers::not_found)
        .layer(axum::middleware::from_fn_with_state(state.clone(), shutdown::track_requests))
        .layer(DefaultBodyLimit::max(config.server.request_body_limit))
        .layer(axum::middleware::from_fn(middleware::standard_headers_middleware))
        .layer(TraceLayer::new_for_http().make_span_with(|request: &Request| {
            let request_id = request
                .headers()
                .get(REQUEST_ID_HEADER)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default();
            gateway_telemetry::request_span!(request_id, request.uri().path())
        }))
        .layer(axum::middleware::from_fn(middleware::request_id_middleware))
        .with_state(state)
}

/// Built-in chat paths plus configured detection endpoints that are plain paths
fn chat_paths(config: &gateway_config::GatewayConfig) -> BTreeSet<String> {
    let mut paths: BTreeSet<String> = CHAT_ROUTES.iter().map(|p| (*p).to_string()).collect();
    for protocol in [
        Protocol::OpenAiChat,
        Protocol::OpenAiResponses,
        Protocol::AnthropicMessages,
        Protocol::Gemini,
    ] {
        for endpoint in config.endpoints_for(protocol) {
            if is_extra_route(&endpoint) && paths.insert(endpoint.clone()) {
                debug!(path = %endpoint, protocol = %protocol, "Registered configured endpoint");
            }
        }
    }
    paths
}

/// Configured endpoints that do not collide with fixed routes
fn is_extra_route(path: &str) -> bool {
    path.starts_with('/')
        && !path.ends_with('/')
        && !path.contains(['*', ':', '{'])
        && !matches!(path, "/health" | "/ready" | "/admin/pools" | "/v1/models")
        && !path.starts_with("/v1beta/models/")
        && !path.starts_with("/v1/models/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
    };
    use gateway_config::{ConfigHandle, GatewayConfig};
    use gateway_pipeline::PipelineManager;
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(upstream: &str) -> GatewayConfig {
        serde_json::from_value(json!({
            "providers": {
                "openai": {
                    "protocol": "openai-chat",
                    "endpoint": format!("{upstream}/v1"),
                    "keys": {"main": {"value": "sk-test"}}
                }
            },
            "pools": {
                "default": [{"provider": "openai", "model": "gpt-4o", "key": "main"}]
            }
        }))
        .unwrap()
    }

    fn create_test_state(config: GatewayConfig) -> AppState {
        let manager = PipelineManager::from_config(&config).unwrap();
        AppState::new(manager, ConfigHandle::new(config))
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn openai_upstream() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "chatcmpl-1",
                "object": "chat.completion",
                "model": "gpt-4o",
                "choices": [{"index": 0, "message": {"role": "assistant", "content": "hello"}, "finish_reason": "stop"}],
                "usage": {"prompt_tokens": 3, "completion_tokens": 1, "total_tokens": 4}
            })))
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let app = create_router(create_test_state(config("http://127.0.0.1:9")));
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CACHE_CONTROL], "no-store");
        assert!(response.headers().contains_key(REQUEST_ID_HEADER));
    }

    #[tokio::test]
    async fn test_ready_requires_default_pool() {
        let app = create_router(create_test_state(GatewayConfig::default()));
        let response = app
            .oneshot(Request::builder().uri("/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let app = create_router(create_test_state(config("http://127.0.0.1:9")));
        let response = app
            .oneshot(Request::builder().uri("/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_models_and_pools_listing() {
        let state = create_test_state(config("http://127.0.0.1:9"));
        let app = create_router(state);

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/v1/models").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let models = body_json(response).await;
        assert_eq!(models["data"][0]["id"], "gpt-4o");

        let response = app
            .oneshot(Request::builder().uri("/admin/pools").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let pools = body_json(response).await;
        assert_eq!(pools["pools"]["default"], json!(["openai.gpt-4o.main"]));
        assert_eq!(pools["ready"], true);
    }

    #[tokio::test]
    async fn test_invalid_json_rendered_in_caller_shape() {
        let app = create_router(create_test_state(config("http://127.0.0.1:9")));
        let mut request = post("/v1/messages", "{not json");
        request
            .headers_mut()
            .insert(REQUEST_ID_HEADER, "req-bad-body".parse().unwrap());
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response.headers()[REQUEST_ID_HEADER], "req-bad-body");
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/json; charset=utf-8"
        );
        let body = body_json(response).await;
        assert_eq!(body["type"], "error");
        assert_eq!(body["error"]["type"], "invalid_request_error");
    }

    #[tokio::test]
    async fn test_chat_completion_with_debug_headers() {
        let upstream = openai_upstream().await;
        let app = create_router(create_test_state(config(&upstream.uri())));
        let mut request = post(
            "/v1/chat/completions",
            r#"{"model":"gpt-4o","messages":[{"role":"user","content":"hi"}]}"#,
        );
        request
            .headers_mut()
            .insert("x-gateway-debug", "1".parse().unwrap());
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(headers[handlers::PIPELINE_HEADER], "openai.gpt-4o.main");
        assert_eq!(headers[handlers::ATTEMPTS_HEADER], "1");
        let stages = headers[handlers::STAGES_HEADER].to_str().unwrap();
        assert!(stages.starts_with("llm-switch.request="));
        assert!(stages.contains("provider.request="));
        let body = body_json(response).await;
        assert_eq!(body["choices"][0]["message"]["content"], "hello");
    }

    #[tokio::test]
    async fn test_debug_headers_absent_by_default() {
        let upstream = openai_upstream().await;
        let app = create_router(create_test_state(config(&upstream.uri())));
        let response = app
            .oneshot(post(
                "/v1/openai/chat/completions",
                r#"{"model":"gpt-4o","messages":[{"role":"user","content":"hi"}]}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(!response.headers().contains_key(handlers::STAGES_HEADER));
    }

    #[tokio::test]
    async fn test_body_debug_flag_enables_debug_headers() {
        let upstream = openai_upstream().await;
        let app = create_router(create_test_state(config(&upstream.uri())));
        let response = app
            .oneshot(post(
                "/v1/chat/completions",
                r#"{"model":"gpt-4o","__debug":true,"messages":[{"role":"user","content":"hi"}]}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[handlers::ATTEMPTS_HEADER], "1");
        assert!(response.headers().contains_key(handlers::STAGES_HEADER));
        assert!(!response.headers().contains_key(handlers::ERRORS_HEADER));
    }

    #[tokio::test]
    async fn test_gemini_path_model_translated_to_openai_upstream() {
        let upstream = openai_upstream().await;
        let app = create_router(create_test_state(config(&upstream.uri())));
        let response = app
            .oneshot(post(
                "/v1beta/models/gemini-1.5-pro:generateContent",
                r#"{"contents":[{"role":"user","parts":[{"text":"hi"}]}]}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["candidates"][0]["content"]["parts"][0]["text"], "hello");
    }

    #[tokio::test]
    async fn test_unknown_gemini_action_rejected() {
        let app = create_router(create_test_state(config("http://127.0.0.1:9")));
        let response = app
            .oneshot(post("/v1beta/models/gemini-1.5-pro:countTokens", "{}"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], 400);
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let app = create_router(create_test_state(config("http://127.0.0.1:9")));
        let response = app
            .oneshot(Request::builder().uri("/v2/nothing").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_configured_endpoints_added() {
        let mut cfg = config("http://127.0.0.1:9");
        cfg.detection
            .endpoints
            .insert(Protocol::OpenAiChat, vec!["/openai/v1/chat/completions".into(), "/v1/models".into()]);
        let paths = chat_paths(&cfg);
        assert!(paths.contains("/openai/v1/chat/completions"));
        assert!(!paths.contains("/v1/models"));
        assert!(paths.contains("/v1/messages"));
    }
}
