//! Caller protocol detection.
//!
//! Rules run in the configured order; the first one that matches wins. When
//! none match the configured default protocol is used.

use crate::internal::PROTOCOL_KEY;
use gateway_config::{DetectionRule, GatewayConfig};
use gateway_core::{Protocol, RouteRequest};
use serde_json::Value;
use tracing::debug;

/// Outcome of detecting one inbound request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Detection {
    /// Detected protocol
    pub protocol: Protocol,
    /// Rule that matched; `None` when the default was used
    pub rule: Option<DetectionRule>,
}

/// Detects the wire protocol of inbound requests
#[derive(Debug, Clone)]
pub struct ProtocolDetector {
    order: Vec<DetectionRule>,
    default_protocol: Protocol,
    endpoints: Vec<(Protocol, String)>,
}

impl ProtocolDetector {
    /// Build a detector from the detection section of the config
    #[must_use]
    pub fn from_config(config: &GatewayConfig) -> Self {
        let endpoints = Protocol::ALL
            .iter()
            .flat_map(|&p| config.endpoints_for(p).into_iter().map(move |e| (p, e)))
            .collect();
        Self {
            order: config.detection.order.clone(),
            default_protocol: config.detection.default_protocol,
            endpoints,
        }
    }

    /// Detect the protocol of `route`
    #[must_use]
    pub fn detect(&self, route: &RouteRequest) -> Detection {
        for &rule in &self.order {
            let found = match rule {
                DetectionRule::Hint => by_hint(route),
                DetectionRule::Endpoint => self.by_endpoint(&route.path),
                DetectionRule::Content => by_content(&route.body),
                DetectionRule::Header => by_header(route),
            };
            if let Some(protocol) = found {
                debug!(
                    request_id = %route.request_id,
                    protocol = %protocol,
                    rule = ?rule,
                    "Detected caller protocol"
                );
                return Detection {
                    protocol,
                    rule: Some(rule),
                };
            }
        }
        debug!(
            request_id = %route.request_id,
            protocol = %self.default_protocol,
            "No detection rule matched, using default protocol"
        );
        Detection {
            protocol: self.default_protocol,
            rule: None,
        }
    }

    /// Longest configured endpoint that prefixes `path`
    fn by_endpoint(&self, path: &str) -> Option<Protocol> {
        let path = path.split('?').next().unwrap_or(path);
        self.endpoints
            .iter()
            .filter(|(_, endpoint)| path_matches(path, endpoint))
            .max_by_key(|(_, endpoint)| endpoint.len())
            .map(|(protocol, _)| *protocol)
    }
}

fn path_matches(path: &str, endpoint: &str) -> bool {
    let endpoint = endpoint.trim_end_matches('/');
    if endpoint.is_empty() {
        return false;
    }
    match path.strip_prefix(endpoint) {
        Some(rest) => rest.is_empty() || rest.starts_with('/') || rest.starts_with(':'),
        None => false,
    }
}

fn by_hint(route: &RouteRequest) -> Option<Protocol> {
    route.protocol_hint.or_else(|| {
        route
            .body
            .get(PROTOCOL_KEY)
            .and_then(Value::as_str)
            .and_then(|s| s.parse().ok())
    })
}

fn by_header(route: &RouteRequest) -> Option<Protocol> {
    if route.header("anthropic-version").is_some() {
        Some(Protocol::AnthropicMessages)
    } else if route.header("x-goog-api-key").is_some() {
        Some(Protocol::Gemini)
    } else {
        None
    }
}

/// Structural heuristics over the body
fn by_content(body: &Value) -> Option<Protocol> {
    let obj = body.as_object()?;
    if obj.get("contents").is_some_and(Value::is_array) {
        return Some(Protocol::Gemini);
    }
    let has_messages = obj.get("messages").is_some_and(Value::is_array);
    if !has_messages && (obj.contains_key("input") || obj.contains_key("instructions")) {
        return Some(Protocol::OpenAiResponses);
    }
    if has_messages {
        return Some(if has_anthropic_markers(body) {
            Protocol::AnthropicMessages
        } else {
            Protocol::OpenAiChat
        });
    }
    obj.contains_key("max_tokens")
        .then_some(Protocol::AnthropicMessages)
}

fn has_anthropic_markers(body: &Value) -> bool {
    if ["system", "stop_sequences", "thinking", "anthropic_version"]
        .iter()
        .any(|k| body.get(k).is_some())
    {
        return true;
    }
    if body
        .get("tool_choice")
        .is_some_and(|c| c.get("type").is_some() && c.get("function").is_none() && c["type"] != "function")
    {
        return true;
    }
    let anthropic_tools = body
        .get("tools")
        .and_then(Value::as_array)
        .is_some_and(|tools| tools.iter().any(|t| t.get("input_schema").is_some()));
    if anthropic_tools {
        return true;
    }
    body.get("messages")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|m| m.get("content").and_then(Value::as_array))
        .flatten()
        .any(|block| match block.get("type").and_then(Value::as_str) {
            Some("tool_use" | "tool_result" | "thinking" | "redacted_thinking" | "document") => {
                true
            }
            Some("image") => block.get("source").is_some(),
            _ => false,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn detector() -> ProtocolDetector {
        ProtocolDetector::from_config(&GatewayConfig::default())
    }

    #[test]
    fn test_hint_wins_over_endpoint() {
        let route = RouteRequest::new(json!({"messages": []}), "/v1/chat/completions")
            .with_protocol_hint(Protocol::Gemini);
        let detection = detector().detect(&route);
        assert_eq!(detection.protocol, Protocol::Gemini);
        assert_eq!(detection.rule, Some(DetectionRule::Hint));

        let route = RouteRequest::new(json!({"__protocol": "anthropic"}), "/v1/chat/completions");
        assert_eq!(detector().detect(&route).protocol, Protocol::AnthropicMessages);
    }

    #[test]
    fn test_endpoint_match() {
        let d = detector();
        let cases = [
            ("/v1/chat/completions", Protocol::OpenAiChat),
            ("/v1/responses", Protocol::OpenAiResponses),
            ("/v1/anthropic/messages", Protocol::AnthropicMessages),
            ("/v1beta/models/gemini-2.5-pro:streamGenerateContent?alt=sse", Protocol::Gemini),
        ];
        for (path, expected) in cases {
            assert_eq!(d.detect(&RouteRequest::new(json!({}), path)).protocol, expected, "{path}");
        }
    }

    #[test]
    fn test_endpoint_requires_segment_boundary() {
        let route = RouteRequest::new(json!({}), "/v1/messagesfoo");
        assert_eq!(detector().detect(&route).rule, None);
    }

    #[test]
    fn test_content_heuristics() {
        let d = detector();
        let detect = |body: Value| d.detect(&RouteRequest::new(body, "/other")).protocol;
        assert_eq!(detect(json!({"contents": []})), Protocol::Gemini);
        assert_eq!(detect(json!({"input": "hi"})), Protocol::OpenAiResponses);
        assert_eq!(detect(json!({"messages": [{"role": "user", "content": "hi"}]})), Protocol::OpenAiChat);
        assert_eq!(
            detect(json!({"system": "s", "messages": [{"role": "user", "content": "hi"}]})),
            Protocol::AnthropicMessages
        );
        assert_eq!(
            detect(json!({"messages": [{"role": "user", "content": [{"type": "tool_result", "tool_use_id": "t"}]}]})),
            Protocol::AnthropicMessages
        );
        assert_eq!(detect(json!({"max_tokens": 10, "prompt": "x"})), Protocol::AnthropicMessages);
    }

    #[test]
    fn test_header_rule_and_default() {
        let d = detector();
        let route = RouteRequest::new(json!({}), "/other").with_header("anthropic-version", "2023-06-01");
        assert_eq!(d.detect(&route).protocol, Protocol::AnthropicMessages);

        let detection = d.detect(&RouteRequest::new(json!("not an object"), "/other"));
        assert_eq!(detection.protocol, Protocol::OpenAiChat);
        assert_eq!(detection.rule, None);
    }
}
