//! Upstream failure classification.
//!
//! HTTP statuses and transport errors become typed [`GatewayError`]s; the
//! pipeline manager decides retry vs abort from the resulting class only.

use gateway_core::GatewayError;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde_json::Value;
use std::time::Duration;

const MAX_MESSAGE_LEN: usize = 512;

/// Classify a non-success upstream response.
///
/// 408, 409, 425 and 5xx are transient, 429 is a rate limit, 401 and 403 are
/// credential-scoped authentication failures; every other 4xx is fatal.
pub fn classify_status(provider: &str, status: u16, headers: &HeaderMap, body: &str) -> GatewayError {
    let message = error_message(body).unwrap_or_else(|| format!("HTTP {status}"));
    match status {
        401 | 403 => GatewayError::authentication(provider, message),
        429 => GatewayError::rate_limit(provider, retry_after(headers)),
        408 | 409 | 425 | 500..=599 => GatewayError::provider(provider, message, Some(status), true),
        _ => GatewayError::provider(provider, message, Some(status), false),
    }
}

/// Classify a transport level failure
pub fn classify_transport(provider: &str, error: &reqwest::Error, deadline: Duration) -> GatewayError {
    if error.is_timeout() {
        GatewayError::timeout(deadline, format!("{provider} request"))
    } else if error.is_connect() {
        GatewayError::connection(format!("{provider}: connect failed: {error}"))
    } else if error.is_body() || error.is_decode() {
        GatewayError::streaming(format!("{provider}: {error}"))
    } else {
        GatewayError::connection(format!("{provider}: {error}"))
    }
}

/// Best effort human message from an upstream error body
fn error_message(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }
    let message = serde_json::from_str::<Value>(trimmed)
        .ok()
        .and_then(|v| {
            let v = v.as_array().and_then(|a| a.first()).cloned().unwrap_or(v);
            v.pointer("/error/message")
                .or_else(|| v.get("message"))
                .or_else(|| v.get("error").filter(|e| e.is_string()))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| trimmed.to_string());
    Some(truncate(message))
}

fn truncate(mut message: String) -> String {
    if message.len() > MAX_MESSAGE_LEN {
        let mut cut = MAX_MESSAGE_LEN;
        while !message.is_char_boundary(cut) {
            cut -= 1;
        }
        message.truncate(cut);
        message.push_str("...");
    }
    message
}

fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_core::ErrorClass;
    use reqwest::header::HeaderValue;

    fn classify(status: u16, body: &str) -> GatewayError {
        classify_status("p", status, &HeaderMap::new(), body)
    }

    #[test]
    fn test_status_classes() {
        for status in [408, 409, 425, 429, 500, 502, 503, 529, 401, 403] {
            assert_eq!(classify(status, "").class(), ErrorClass::Transient, "{status}");
        }
        for status in [400, 404, 413, 422] {
            assert_eq!(classify(status, "").class(), ErrorClass::Fatal, "{status}");
        }
        assert!(classify(401, "").is_auth_failure());
        assert!(!classify(500, "").is_auth_failure());
    }

    #[test]
    fn test_message_extraction() {
        let err = classify(400, r#"{"error": {"message": "bad model", "type": "invalid_request_error"}}"#);
        assert!(err.to_string().contains("bad model"));
        let err = classify(400, r#"[{"error": {"code": 400, "message": "gemini says no"}}]"#);
        assert!(err.to_string().contains("gemini says no"));
        let err = classify(502, "<html>bad gateway</html>");
        assert!(err.to_string().contains("bad gateway"));
    }

    #[test]
    fn test_retry_after_header() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("7"));
        match classify_status("p", 429, &headers, "") {
            GatewayError::RateLimit { retry_after, .. } => {
                assert_eq!(retry_after, Some(Duration::from_secs(7)));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_long_message_truncated_on_char_boundary() {
        let body = "é".repeat(600);
        let err = classify(500, &body);
        assert!(err.to_string().ends_with("..."));
    }
}
