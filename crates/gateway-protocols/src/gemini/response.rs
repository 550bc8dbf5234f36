//! Gemini `GenerateContentResponse` translation, including the Cloud Code
//! `{response: ...}` envelope.

use super::parts::GeminiPart;
use crate::adapter::u32_field;
use gateway_core::{CanonicalResponse, FinishReason, GatewayError, GatewayResult, OutputPart, Usage};
use serde_json::{json, Value};

/// Strip the Cloud Code envelope if present
pub(crate) fn unwrap_envelope(body: &Value) -> &Value {
    match body.get("response") {
        Some(inner) if body.get("candidates").is_none() && inner.is_object() => inner,
        _ => body,
    }
}

pub(crate) fn finish_from_gemini(reason: &str) -> FinishReason {
    match reason {
        "MAX_TOKENS" => FinishReason::Length,
        "SAFETY" | "RECITATION" | "BLOCKLIST" | "PROHIBITED_CONTENT" | "SPII" | "IMAGE_SAFETY" => {
            FinishReason::ContentFilter
        }
        "MALFORMED_FUNCTION_CALL" => FinishReason::Error,
        _ => FinishReason::Stop,
    }
}

pub(crate) fn finish_to_gemini(reason: FinishReason) -> &'static str {
    match reason {
        FinishReason::Stop | FinishReason::ToolCalls => "STOP",
        FinishReason::Length => "MAX_TOKENS",
        FinishReason::ContentFilter => "SAFETY",
        FinishReason::Error => "OTHER",
    }
}

pub(crate) fn parse_usage(usage: &Value) -> Option<Usage> {
    let prompt = u32_field(usage, "promptTokenCount")?;
    let candidates = u32_field(usage, "candidatesTokenCount").unwrap_or(0);
    let thoughts = u32_field(usage, "thoughtsTokenCount").unwrap_or(0);
    let mut out = Usage::new(prompt, candidates.saturating_add(thoughts));
    if let Some(total) = u32_field(usage, "totalTokenCount") {
        out.total_tokens = total;
    }
    Some(out)
}

pub(crate) fn render_usage(usage: &Usage) -> Value {
    json!({
        "promptTokenCount": usage.prompt_tokens,
        "candidatesTokenCount": usage.completion_tokens,
        "totalTokenCount": usage.total_tokens,
    })
}

/// Parts of the first candidate, in order
pub(crate) fn candidate_parts(body: &Value) -> impl Iterator<Item = OutputPart> + '_ {
    body.pointer("/candidates/0/content/parts")
        .or_else(|| body.pointer("/content/parts"))
        .or_else(|| body.get("parts"))
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|raw| GeminiPart::from_value(raw).and_then(GeminiPart::into_output))
}

/// Upstream JSON to canonical response
pub(crate) fn parse(body: &Value) -> GatewayResult<CanonicalResponse> {
    let body = unwrap_envelope(body);
    let mut response = CanonicalResponse::new(
        body.get("responseId").and_then(Value::as_str).unwrap_or_default(),
        body.get("modelVersion").and_then(Value::as_str).unwrap_or_default(),
    );

    if body.pointer("/candidates/0").is_none() {
        if body.pointer("/promptFeedback/blockReason").is_some() {
            response.finish_reason = Some(FinishReason::ContentFilter);
            response.usage = body.get("usageMetadata").and_then(parse_usage);
            return Ok(response);
        }
        return Err(GatewayError::translation("gemini response has no candidates"));
    }

    for part in candidate_parts(body) {
        response.push_part(part);
    }
    response.finish_reason = if response.tool_calls().next().is_some() {
        Some(FinishReason::ToolCalls)
    } else {
        body.pointer("/candidates/0/finishReason")
            .and_then(Value::as_str)
            .map(finish_from_gemini)
    };
    response.usage = body.get("usageMetadata").and_then(parse_usage);
    Ok(response)
}

/// Canonical response to caller JSON
pub(crate) fn render(response: &CanonicalResponse) -> Value {
    let parts: Vec<Value> = response
        .parts
        .iter()
        .map(|p| GeminiPart::from_output(p).to_value())
        .collect();
    let mut body = json!({
        "candidates": [{
            "content": { "role": "model", "parts": parts },
            "finishReason": finish_to_gemini(response.finish_reason.unwrap_or(FinishReason::Stop)),
            "index": 0,
        }],
        "modelVersion": response.model,
        "responseId": response.id,
    });
    if let Some(usage) = &response.usage {
        body["usageMetadata"] = render_usage(usage);
    }
    body
}

fn status_name(status: u16) -> &'static str {
    match status {
        400 => "INVALID_ARGUMENT",
        401 => "UNAUTHENTICATED",
        403 => "PERMISSION_DENIED",
        404 => "NOT_FOUND",
        429 => "RESOURCE_EXHAUSTED",
        503 => "UNAVAILABLE",
        504 => "DEADLINE_EXCEEDED",
        _ => "INTERNAL",
    }
}

/// Caller error body
pub(crate) fn render_error(status: u16, _error_type: &str, message: &str) -> Value {
    json!({
        "error": {
            "code": status,
            "message": message,
            "status": status_name(status),
        }
    })
}

pub(crate) fn matches(body: &Value) -> bool {
    unwrap_envelope(body).get("candidates").is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mixed_parts() {
        let response = parse(&json!({
            "candidates": [{
                "content": {"role": "model", "parts": [
                    {"text": "plan", "thought": true},
                    {"text": "Running code:"},
                    {"executableCode": {"language": "PYTHON", "code": "print(2)"}},
                    {"codeExecutionResult": {"outcome": "OUTCOME_OK", "output": "2"}},
                    {"functionCall": {"name": "f", "args": {"x": 1}}}
                ]},
                "finishReason": "STOP"
            }],
            "usageMetadata": {"promptTokenCount": 4, "candidatesTokenCount": 6, "totalTokenCount": 10},
            "modelVersion": "gemini-2.5-flash"
        }))
        .unwrap();
        assert_eq!(response.parts.len(), 5);
        assert_eq!(response.finish_reason, Some(FinishReason::ToolCalls));
        assert_eq!(response.usage.unwrap().total_tokens, 10);
        assert_eq!(response.model, "gemini-2.5-flash");
    }

    #[test]
    fn test_cloud_code_envelope_unwrapped() {
        let response = parse(&json!({
            "response": {"candidates": [{"content": {"parts": [{"text": "hi"}]}, "finishReason": "MAX_TOKENS"}]}
        }))
        .unwrap();
        assert_eq!(response.text(), "hi");
        assert_eq!(response.finish_reason, Some(FinishReason::Length));
        assert!(matches(&json!({"response": {"candidates": []}})));
    }

    #[test]
    fn test_blocked_prompt() {
        let response = parse(&json!({"promptFeedback": {"blockReason": "SAFETY"}})).unwrap();
        assert_eq!(response.finish_reason, Some(FinishReason::ContentFilter));
        assert!(parse(&json!({})).is_err());
    }

    #[test]
    fn test_render_round_trip() {
        let mut response = CanonicalResponse::new("r", "gemini");
        response.push_part(OutputPart::text("a"));
        response.push_part(OutputPart::tool_call("call_1", "f", "{\"k\":2}"));
        let body = render(&response);
        assert_eq!(body["candidates"][0]["content"]["parts"][1]["functionCall"]["args"]["k"], 2);
        let back = parse(&body).unwrap();
        assert_eq!(back.tool_calls().next(), Some(("call_1", "f", "{\"k\":2}")));
    }

    #[test]
    fn test_error_shape() {
        let body = render_error(429, "rate_limit_error", "quota");
        assert_eq!(body["error"]["status"], "RESOURCE_EXHAUSTED");
        assert_eq!(body["error"]["code"], 429);
    }
}
