//! Request and response middleware.

use crate::error::JSON_UTF8;
use crate::extractors::{request_id_from, REQUEST_ID_HEADER};
use axum::{
    extract::Request,
    http::{header, HeaderValue},
    middleware::Next,
    response::Response,
};

/// Make sure every request carries `x-request-id` before tracing and handlers see it
pub async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    let id = request_id_from(request.headers());
    let value = HeaderValue::from_str(id.as_str()).ok();
    if let Some(value) = &value {
        request.headers_mut().insert(REQUEST_ID_HEADER, value.clone());
    }

    let mut response = next.run(request).await;
    if let Some(value) = value {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

/// Headers guaranteed on every response regardless of upstream:
/// no intermediary caching and a charset-qualified content type
pub async fn standard_headers_middleware(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));

    let qualified = match headers.get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok()) {
        None => Some(HeaderValue::from_static(JSON_UTF8)),
        Some(ct) if ct.contains("charset=") => None,
        Some(ct) => HeaderValue::from_str(&format!("{ct}; charset=utf-8")).ok(),
    };
    if let Some(value) = qualified {
        headers.insert(header::CONTENT_TYPE, value);
    }
    response
}
