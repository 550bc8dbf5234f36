//! OpenAI Chat Completions response translation.

use super::request::reasoning_text;
use crate::adapter::{generate_call_id, u32_field};
use gateway_core::{CanonicalResponse, FinishReason, GatewayError, GatewayResult, OutputPart, Usage};
use serde_json::{json, Map, Value};

/// Upstream JSON to canonical response
pub(crate) fn parse(body: &Value) -> GatewayResult<CanonicalResponse> {
    let choice = body
        .get("choices")
        .and_then(|c| c.get(0))
        .ok_or_else(|| GatewayError::translation("chat completion has no choices"))?;
    let message = choice.get("message").unwrap_or(&Value::Null);

    let mut response = CanonicalResponse::new(
        body.get("id").and_then(Value::as_str).unwrap_or_default(),
        body.get("model").and_then(Value::as_str).unwrap_or_default(),
    );
    if let Some(created) = body.get("created").and_then(Value::as_i64) {
        response.created = created;
    }

    if let Some(thought) = reasoning_text(message) {
        response.push_part(OutputPart::thought(thought));
    }
    if let Some(text) = message.get("content").and_then(Value::as_str) {
        if !text.is_empty() {
            response.push_part(OutputPart::text(text));
        }
    }
    if let Some(calls) = message.get("tool_calls").and_then(Value::as_array) {
        for call in calls {
            let function = call.get("function").unwrap_or(&Value::Null);
            response.push_part(OutputPart::tool_call(
                call.get("id")
                    .and_then(Value::as_str)
                    .map_or_else(generate_call_id, str::to_string),
                function.get("name").and_then(Value::as_str).unwrap_or_default(),
                function
                    .get("arguments")
                    .and_then(Value::as_str)
                    .unwrap_or("{}"),
            ));
        }
    }

    response.finish_reason = choice
        .get("finish_reason")
        .and_then(Value::as_str)
        .map(FinishReason::from_openai);
    response.usage = body.get("usage").and_then(parse_usage);
    Ok(response)
}

pub(crate) fn parse_usage(usage: &Value) -> Option<Usage> {
    let prompt = u32_field(usage, "prompt_tokens")?;
    let completion = u32_field(usage, "completion_tokens").unwrap_or(0);
    let mut usage_out = Usage::new(prompt, completion);
    if let Some(total) = u32_field(usage, "total_tokens") {
        usage_out.total_tokens = total;
    }
    Some(usage_out)
}

pub(crate) fn render_usage(usage: &Usage) -> Value {
    json!({
        "prompt_tokens": usage.prompt_tokens,
        "completion_tokens": usage.completion_tokens,
        "total_tokens": usage.total_tokens,
    })
}

/// Canonical response to caller JSON
pub(crate) fn render(response: &CanonicalResponse) -> Value {
    let mut content = String::new();
    let mut tool_calls = Vec::new();
    for part in &response.parts {
        match part {
            OutputPart::ToolCall {
                id,
                name,
                arguments,
            } => tool_calls.push(json!({
                "id": id,
                "type": "function",
                "function": { "name": name, "arguments": arguments },
            })),
            other => {
                if let Some(text) = other.as_fallback_text() {
                    content.push_str(&text);
                }
            }
        }
    }

    let mut message = Map::new();
    message.insert("role".into(), json!("assistant"));
    message.insert(
        "content".into(),
        if content.is_empty() && !tool_calls.is_empty() {
            Value::Null
        } else {
            json!(content)
        },
    );
    if let Some(thoughts) = response.thoughts() {
        message.insert("reasoning_content".into(), json!(thoughts));
    }
    let has_tool_calls = !tool_calls.is_empty();
    if has_tool_calls {
        message.insert("tool_calls".into(), Value::Array(tool_calls));
    }

    let finish_reason = if has_tool_calls {
        FinishReason::ToolCalls
    } else {
        response.finish_reason.unwrap_or(FinishReason::Stop)
    };

    let mut body = json!({
        "id": response.id,
        "object": "chat.completion",
        "created": response.created,
        "model": response.model,
        "choices": [{
            "index": 0,
            "message": message,
            "logprobs": null,
            "finish_reason": finish_reason.as_openai(),
        }],
    });
    if let Some(usage) = &response.usage {
        body["usage"] = render_usage(usage);
    }
    body
}

/// Caller error body
pub(crate) fn render_error(status: u16, error_type: &str, message: &str) -> Value {
    json!({
        "error": {
            "message": message,
            "type": error_type,
            "param": null,
            "code": status,
        }
    })
}

/// Whether a body looks like a chat completion
pub(crate) fn matches(body: &Value) -> bool {
    body.get("object").and_then(Value::as_str) == Some("chat.completion")
        || body.get("choices").is_some_and(Value::is_array)
}
