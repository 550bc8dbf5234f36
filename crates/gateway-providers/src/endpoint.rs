//! Endpoint resolution and header/auth finalization per upstream protocol.

use gateway_config::{AuthMode, ProviderConfig};
use gateway_core::{Credential, GatewayError, GatewayResult, Protocol};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use serde_json::{json, Value};
use url::Url;

/// Version header sent to Anthropic upstreams
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

/// URL of one upstream call.
///
/// The query-key credential is not part of the URL; see [`apply_query_key`].
pub fn resolve_url(config: &ProviderConfig, model: &str, stream: bool) -> GatewayResult<Url> {
    let base = config.endpoint.trim_end_matches('/');
    let raw = match config.protocol {
        Protocol::OpenAiChat => join(base, "chat/completions"),
        Protocol::OpenAiResponses => join(base, "responses"),
        Protocol::AnthropicMessages => join(base, "messages"),
        Protocol::Gemini => {
            let action = if stream {
                "streamGenerateContent?alt=sse"
            } else {
                "generateContent"
            };
            if config.cloud_code_project.is_some() {
                format!("{base}/v1internal:{action}")
            } else {
                format!("{base}/models/{model}:{action}")
            }
        }
    };
    Url::parse(&raw).map_err(|e| GatewayError::configuration(format!("invalid upstream url '{raw}': {e}")))
}

/// Append `suffix` unless the configured endpoint already ends with it
fn join(base: &str, suffix: &str) -> String {
    if base.ends_with(suffix) {
        base.to_string()
    } else {
        format!("{base}/{suffix}")
    }
}

/// Add the credential as a `key` query parameter
pub fn apply_query_key(url: &mut Url, mode: AuthMode, credential: Option<&Credential>) {
    if let (AuthMode::QueryKey, Some(credential)) = (mode, credential) {
        url.query_pairs_mut().append_pair("key", credential.expose());
    }
}

/// Headers of one upstream call: content negotiation, protocol headers,
/// configured static headers, then the credential
pub fn build_headers(
    config: &ProviderConfig,
    credential: Option<&Credential>,
    stream: bool,
) -> GatewayResult<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(
        ACCEPT,
        HeaderValue::from_static(if stream { "text/event-stream" } else { "application/json" }),
    );
    if config.protocol == Protocol::AnthropicMessages {
        headers.insert(
            HeaderName::from_static("anthropic-version"),
            HeaderValue::from_static(ANTHROPIC_VERSION),
        );
    }
    for (name, value) in &config.headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| GatewayError::configuration(format!("invalid header name '{name}': {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| GatewayError::configuration(format!("invalid value for header '{name}': {e}")))?;
        headers.insert(name, value);
    }

    let Some(credential) = credential else {
        return Ok(headers);
    };
    let (name, value) = match config.auth_mode {
        AuthMode::Bearer => (AUTHORIZATION, format!("Bearer {}", credential.expose())),
        AuthMode::XApiKey => (HeaderName::from_static("x-api-key"), credential.expose().to_string()),
        AuthMode::GoogApiKey => (
            HeaderName::from_static("x-goog-api-key"),
            credential.expose().to_string(),
        ),
        AuthMode::QueryKey | AuthMode::None => return Ok(headers),
    };
    let mut value = HeaderValue::from_str(&value)
        .map_err(|_| GatewayError::configuration("credential contains characters not allowed in a header"))?;
    value.set_sensitive(true);
    headers.insert(name, value);
    Ok(headers)
}

/// Wrap a native Gemini body in the Cloud Code `{model, project, request}` envelope
#[must_use]
pub fn wrap_cloud_code(body: Value, model: &str, project: &str) -> Value {
    json!({
        "model": model,
        "project": project,
        "request": body,
    })
}

/// Replace a Cloud Code `{response: ...}` envelope by its content, in place
pub fn unwrap_cloud_code_in_place(value: &mut Value) {
    let inner = match value {
        Value::Object(map) if !map.contains_key("candidates") => match map.remove("response") {
            Some(inner @ Value::Object(_)) => inner,
            Some(other) => {
                map.insert("response".into(), other);
                return;
            }
            None => return,
        },
        _ => return,
    };
    *value = inner;
}
