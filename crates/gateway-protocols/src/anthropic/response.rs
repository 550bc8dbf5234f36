//! Anthropic Messages response translation.

use super::request::input_object;
use crate::adapter::{generate_call_id, opaque_text, u32_field};
use gateway_core::{CanonicalResponse, FinishReason, GatewayError, GatewayResult, OutputPart, Usage};
use serde_json::{json, Value};

/// Anthropic `stop_reason` to canonical
pub(crate) fn finish_from_stop_reason(reason: &str) -> FinishReason {
    match reason {
        "max_tokens" => FinishReason::Length,
        "tool_use" => FinishReason::ToolCalls,
        "refusal" => FinishReason::ContentFilter,
        _ => FinishReason::Stop,
    }
}

/// Canonical finish reason to Anthropic `stop_reason`
pub(crate) fn stop_reason_for(reason: FinishReason) -> &'static str {
    match reason {
        FinishReason::Stop | FinishReason::Error => "end_turn",
        FinishReason::Length => "max_tokens",
        FinishReason::ToolCalls => "tool_use",
        FinishReason::ContentFilter => "refusal",
    }
}

pub(crate) fn parse_usage(usage: &Value) -> Option<Usage> {
    let input = u32_field(usage, "input_tokens");
    let output = u32_field(usage, "output_tokens");
    (input.is_some() || output.is_some())
        .then(|| Usage::new(input.unwrap_or(0), output.unwrap_or(0)))
}

/// One content block to an output part
pub(crate) fn parse_block(block: &Value) -> Option<OutputPart> {
    let str_field = |key: &str| block.get(key).and_then(Value::as_str);
    match str_field("type")? {
        "text" => Some(OutputPart::text(str_field("text").unwrap_or_default())),
        "thinking" => Some(OutputPart::Thought {
            text: str_field("thinking").unwrap_or_default().to_string(),
            signature: str_field("signature").map(str::to_string),
        }),
        "redacted_thinking" => None,
        "tool_use" => Some(OutputPart::tool_call(
            str_field("id").map_or_else(generate_call_id, str::to_string),
            str_field("name").unwrap_or_default(),
            block
                .get("input")
                .map_or_else(|| "{}".to_string(), Value::to_string),
        )),
        _ => Some(OutputPart::text(opaque_text(block))),
    }
}

/// Upstream JSON to canonical response
pub(crate) fn parse(body: &Value) -> GatewayResult<CanonicalResponse> {
    let content = body
        .get("content")
        .and_then(Value::as_array)
        .ok_or_else(|| GatewayError::translation("anthropic message has no content array"))?;

    let mut response = CanonicalResponse::new(
        body.get("id").and_then(Value::as_str).unwrap_or_default(),
        body.get("model").and_then(Value::as_str).unwrap_or_default(),
    );
    for block in content {
        if let Some(part) = parse_block(block) {
            response.push_part(part);
        }
    }
    response.finish_reason = body
        .get("stop_reason")
        .and_then(Value::as_str)
        .map(finish_from_stop_reason);
    response.usage = body.get("usage").and_then(parse_usage);
    Ok(response)
}

/// Canonical response to caller JSON
pub(crate) fn render(response: &CanonicalResponse) -> Value {
    let mut content = Vec::new();
    let mut has_tool_use = false;
    for part in &response.parts {
        match part {
            OutputPart::Thought { text, signature } => content.push(json!({
                "type": "thinking",
                "thinking": text,
                "signature": signature.clone().unwrap_or_default(),
            })),
            OutputPart::ToolCall {
                id,
                name,
                arguments,
            } => {
                has_tool_use = true;
                content.push(json!({
                    "type": "tool_use",
                    "id": id,
                    "name": name,
                    "input": input_object(arguments),
                }));
            }
            other => {
                if let Some(text) = other.as_fallback_text() {
                    content.push(json!({ "type": "text", "text": text }));
                }
            }
        }
    }

    let finish = if has_tool_use {
        FinishReason::ToolCalls
    } else {
        response.finish_reason.unwrap_or(FinishReason::Stop)
    };
    let usage = response.usage.unwrap_or_default();
    json!({
        "id": response.id,
        "type": "message",
        "role": "assistant",
        "model": response.model,
        "content": content,
        "stop_reason": stop_reason_for(finish),
        "stop_sequence": null,
        "usage": {
            "input_tokens": usage.prompt_tokens,
            "output_tokens": usage.completion_tokens,
        },
    })
}

/// Anthropic error type for an HTTP status
pub(crate) fn error_type_for(status: u16) -> &'static str {
    match status {
        401 => "authentication_error",
        403 => "permission_error",
        404 => "not_found_error",
        413 => "request_too_large",
        429 => "rate_limit_error",
        503 | 529 => "overloaded_error",
        400..=499 => "invalid_request_error",
        _ => "api_error",
    }
}

/// Caller error body
pub(crate) fn render_error(status: u16, _error_type: &str, message: &str) -> Value {
    json!({
        "type": "error",
        "error": {
            "type": error_type_for(status),
            "message": message,
        }
    })
}

pub(crate) fn matches(body: &Value) -> bool {
    body.get("type").and_then(Value::as_str) == Some("message")
}
