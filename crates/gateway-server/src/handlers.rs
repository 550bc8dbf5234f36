//! HTTP request handlers for the gateway API.

use axum::{
    body::{Body, Bytes},
    extract::{OriginalUri, Path, State},
    http::{header, HeaderMap, HeaderName, HeaderValue},
    response::{IntoResponse, Response},
    Json,
};
use gateway_core::{GatewayError, PipelineResponse, ResponseData, RouteRequest, StageError, StageTiming};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use tracing::{debug, instrument, warn};

use crate::{
    error::{ApiError, JSON_UTF8},
    extractors::{with_caller_headers, GatewayHints, RequestId},
    state::AppState,
};

/// Content type of SSE responses
pub const SSE_UTF8: &str = "text/event-stream; charset=utf-8";

/// Stage timings, only on debug requests
pub const STAGES_HEADER: &str = "x-gateway-stages";
/// Pipeline that served the request, only on debug requests
pub const PIPELINE_HEADER: &str = "x-gateway-pipeline";
/// Pipelines tried, only on debug requests
pub const ATTEMPTS_HEADER: &str = "x-gateway-attempts";
/// Failed attempts and translation notes as a JSON array, only on debug requests
pub const ERRORS_HEADER: &str = "x-gateway-errors";

const MAX_ERRORS_HEADER_LEN: usize = 4096;

/// Any chat endpoint whose protocol is detected from path, body and headers
#[instrument(skip_all, fields(request_id = %request_id, path = %uri.path()))]
pub async fn proxy(
    State(state): State<AppState>,
    RequestId(request_id): RequestId,
    hints: GatewayHints,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let route = route_request(uri.path(), request_id, &hints, &headers);
    dispatch(&state, route, &body).await
}

/// `POST /v1beta/models/{model}:{action}` and `/v1/models/{model}:{action}`
#[instrument(skip_all, fields(request_id = %request_id, target = %target))]
pub async fn gemini(
    State(state): State<AppState>,
    RequestId(request_id): RequestId,
    hints: GatewayHints,
    OriginalUri(uri): OriginalUri,
    Path(target): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let route = route_request(uri.path(), request_id, &hints, &headers);
    let Some((model, stream)) = parse_model_action(&target) else {
        let error = GatewayError::validation(
            format!("unsupported model action '{target}'"),
            None,
            "unsupported_action",
        );
        let rendered = state.manager.registry().snapshot().switch().reject(&route, error);
        return ApiError::from(rendered).into_response();
    };
    let route = route.with_path_model(model, stream);
    dispatch(&state, route, &body).await
}

/// `{model}:generateContent` or `{model}:streamGenerateContent`
fn parse_model_action(target: &str) -> Option<(&str, bool)> {
    let (model, action) = target.rsplit_once(':')?;
    let model = model.trim_start_matches('/');
    if model.is_empty() {
        return None;
    }
    match action {
        "generateContent" => Some((model, false)),
        "streamGenerateContent" => Some((model, true)),
        _ => None,
    }
}

fn route_request(
    path: &str,
    request_id: gateway_core::RequestId,
    hints: &GatewayHints,
    headers: &HeaderMap,
) -> RouteRequest {
    let mut route = RouteRequest::new(Value::Null, path)
        .with_request_id(request_id)
        .with_debug(hints.debug);
    if let Some(category) = &hints.category {
        route = route.with_category(category.clone());
    }
    with_caller_headers(route, headers)
}

async fn dispatch(state: &AppState, mut route: RouteRequest, body: &[u8]) -> Response {
    route.body = match serde_json::from_slice::<Value>(body) {
        Ok(value) if value.is_object() => value,
        Ok(_) => return reject(state, &route, "request body must be a JSON object"),
        Err(e) => return reject(state, &route, &format!("invalid JSON body: {e}")),
    };

    match state.manager.handle(&route).await {
        Ok(response) => into_http(response),
        Err(rendered) => {
            debug!(status = rendered.status, protocol = %rendered.protocol, "Returning rendered error");
            ApiError::from(rendered).into_response()
        }
    }
}

fn reject(state: &AppState, route: &RouteRequest, message: &str) -> Response {
    warn!(request_id = %route.request_id, error = %message, "Rejected request body");
    let error = GatewayError::validation(message, None, "invalid_body");
    let rendered = state.manager.registry().snapshot().switch().reject(route, error);
    ApiError::from(rendered).into_response()
}

fn into_http(response: PipelineResponse) -> Response {
    let PipelineResponse { data, metadata } = response;
    let (mut http, content_type) = match data {
        ResponseData::Json(body) => (Json(body).into_response(), JSON_UTF8),
        ResponseData::Sse(stream) => (Body::from_stream(stream).into_response(), SSE_UTF8),
    };
    let headers = http.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    if content_type == SSE_UTF8 {
        headers.insert("x-accel-buffering", HeaderValue::from_static("no"));
    }

    if metadata.debug {
        set_header(headers, STAGES_HEADER, &format_stages(&metadata.stages));
        set_header(headers, PIPELINE_HEADER, metadata.pipeline_id.as_str());
        set_header(headers, ATTEMPTS_HEADER, &metadata.attempts.to_string());
        if !metadata.errors.is_empty() {
            set_header(headers, ERRORS_HEADER, &format_errors(&metadata.errors));
        }
    }
    http
}

/// `llm-switch.request=0.214ms,...` in recording order
fn format_stages(stages: &[StageTiming]) -> String {
    let mut out = String::new();
    for timing in stages {
        if !out.is_empty() {
            out.push(',');
        }
        let _ = write!(
            out,
            "{}.{}={:.3}ms",
            timing.stage.as_str(),
            timing.direction,
            timing.elapsed.as_secs_f64() * 1000.0
        );
    }
    out
}

/// JSON array of stage errors, restricted to visible ASCII
fn format_errors(errors: &[StageError]) -> String {
    let json = serde_json::to_string(errors).unwrap_or_else(|_| "[]".to_string());
    let mut out: String = json
        .chars()
        .map(|c| if c.is_ascii_graphic() || c == ' ' { c } else { '?' })
        .collect();
    if out.len() > MAX_ERRORS_HEADER_LEN {
        out = serde_json::to_string(&json!([{ "truncated": errors.len() }])).unwrap_or_default();
    }
    out
}

fn set_header(headers: &mut HeaderMap, name: &'static str, value: &str) {
    if let Ok(value) = HeaderValue::from_str(value) {
        headers.insert(HeaderName::from_static(name), value);
    }
}

/// `GET /v1/models`: distinct upstream models across all pools
pub async fn list_models(State(state): State<AppState>) -> Json<Value> {
    let pools = state.manager.registry().snapshot();
    let data: Vec<Value> = pools
        .models()
        .into_iter()
        .map(|id| json!({"id": id, "object": "model", "owned_by": "gateway"}))
        .collect();
    Json(json!({"object": "list", "data": data}))
}

/// `GET /admin/pools`: pools with pipeline ids in retry order
pub async fn list_pools(State(state): State<AppState>) -> Json<Value> {
    let pools = state.manager.registry().snapshot();
    let listing: BTreeMap<&str, Vec<&str>> = pools
        .categories()
        .map(|(category, ids)| (category, ids.into_iter().map(|id| id.as_str()).collect()))
        .collect();
    let body = json!({
        "config_version": state.config.version(),
        "default_category": pools.routing().default_category,
        "ready": pools.is_ready(),
        "in_flight": state.shutdown.in_flight_count(),
        "correlation_entries": state.manager.registry().correlation().len(),
        "pools": listing,
    });
    Json(body)
}

/// Fallback for unknown paths
pub async fn not_found(OriginalUri(uri): OriginalUri) -> ApiError {
    ApiError::not_found(format!("no route for {}", uri.path()))
}
