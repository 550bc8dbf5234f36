//! HTTP error responses.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use gateway_protocols::RenderedError;
use serde_json::json;

/// Content type of every JSON body the gateway writes
pub const JSON_UTF8: &str = "application/json; charset=utf-8";

/// Errors returned by HTTP handlers
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Pipeline error already shaped for the caller protocol
    #[error("{}", .0.error)]
    Rendered(Box<RenderedError>),
    /// Unknown resource
    #[error("{0}")]
    NotFound(String),
    /// Gateway cannot take requests
    #[error("{0}")]
    Unavailable(String),
}

impl ApiError {
    /// Not found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Service unavailable error
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }

    /// HTTP status of the error
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Rendered(rendered) => {
                StatusCode::from_u16(rendered.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl From<RenderedError> for ApiError {
    fn from(rendered: RenderedError) -> Self {
        Self::Rendered(Box::new(rendered))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            Self::Rendered(rendered) => rendered.body,
            Self::NotFound(message) => json!({
                "error": {"message": message, "type": "not_found_error"}
            }),
            Self::Unavailable(message) => json!({
                "error": {"message": message, "type": "service_unavailable"}
            }),
        };
        let mut response = (status, Json(body)).into_response();
        response
            .headers_mut()
            .insert(header::CONTENT_TYPE, HeaderValue::from_static(JSON_UTF8));
        response
    }
}
