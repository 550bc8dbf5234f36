//! Custom Axum extractors for the gateway.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap},
};
use gateway_core::RouteRequest;
use std::convert::Infallible;

/// Header carrying the correlation id
pub const REQUEST_ID_HEADER: &str = "x-request-id";
/// Header selecting a routing category
pub const CATEGORY_HEADER: &str = "x-route-category";
/// Header enabling stage timings
pub const DEBUG_HEADER: &str = "x-gateway-debug";

/// Caller headers never forwarded into the routing envelope
const PRIVATE_HEADERS: &[&str] = &["authorization", "cookie", "proxy-authorization"];

/// Extract request ID from headers or generate one
#[derive(Debug, Clone)]
pub struct RequestId(pub gateway_core::RequestId);

#[async_trait]
impl<S> FromRequestParts<S> for RequestId
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(request_id_from(&parts.headers)))
    }
}

pub(crate) fn request_id_from(headers: &HeaderMap) -> gateway_core::RequestId {
    headers
        .get(REQUEST_ID_HEADER)
        .or_else(|| headers.get("x-correlation-id"))
        .or_else(|| headers.get("request-id"))
        .and_then(|v| v.to_str().ok())
        .map_or_else(gateway_core::RequestId::generate, gateway_core::RequestId::from_header)
}

/// Routing hints supplied as headers
#[derive(Debug, Clone, Default)]
pub struct GatewayHints {
    /// Explicit routing category
    pub category: Option<String>,
    /// Stage timings requested
    pub debug: bool,
}

#[async_trait]
impl<S> FromRequestParts<S> for GatewayHints
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let category = parts
            .headers
            .get(CATEGORY_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_ascii_lowercase);
        let debug = parts
            .headers
            .get(DEBUG_HEADER)
            .and_then(|v| v.to_str().ok())
            .is_some_and(is_truthy);
        Ok(Self { category, debug })
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

/// Copy caller headers onto a route request, lower-cased, without credentials
#[must_use]
pub fn with_caller_headers(mut route: RouteRequest, headers: &HeaderMap) -> RouteRequest {
    for (name, value) in headers {
        let name = name.as_str();
        if PRIVATE_HEADERS.contains(&name) {
            continue;
        }
        if let Ok(value) = value.to_str() {
            route = route.with_header(name, value);
        }
    }
    route
}
