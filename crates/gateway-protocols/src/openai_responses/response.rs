//! OpenAI Responses response translation.

use crate::adapter::{generate_call_id, opaque_text, u32_field};
use gateway_core::{CanonicalResponse, FinishReason, GatewayError, GatewayResult, OutputPart, Usage};
use serde_json::{json, Value};

pub(crate) fn item_id(prefix: &str) -> String {
    format!("{prefix}_{}", uuid::Uuid::new_v4().simple())
}

pub(crate) fn parse_usage(usage: &Value) -> Option<Usage> {
    let input = u32_field(usage, "input_tokens")?;
    let mut out = Usage::new(input, u32_field(usage, "output_tokens").unwrap_or(0));
    if let Some(total) = u32_field(usage, "total_tokens") {
        out.total_tokens = total;
    }
    Some(out)
}

pub(crate) fn render_usage(usage: &Usage) -> Value {
    json!({
        "input_tokens": usage.prompt_tokens,
        "output_tokens": usage.completion_tokens,
        "total_tokens": usage.total_tokens,
    })
}

/// Upstream JSON to canonical response
pub(crate) fn parse(body: &Value) -> GatewayResult<CanonicalResponse> {
    let output = body
        .get("output")
        .and_then(Value::as_array)
        .ok_or_else(|| GatewayError::translation("response has no output array"))?;

    let mut response = CanonicalResponse::new(
        body.get("id").and_then(Value::as_str).unwrap_or_default(),
        body.get("model").and_then(Value::as_str).unwrap_or_default(),
    );
    if let Some(created) = body.get("created_at").and_then(Value::as_i64) {
        response.created = created;
    }

    for item in output {
        match item.get("type").and_then(Value::as_str).unwrap_or_default() {
            "message" => {
                for part in item.get("content").and_then(Value::as_array).into_iter().flatten() {
                    let text = part
                        .get("text")
                        .or_else(|| part.get("refusal"))
                        .and_then(Value::as_str);
                    if let Some(text) = text {
                        response.push_part(OutputPart::text(text));
                    }
                }
            }
            "function_call" => response.push_part(OutputPart::tool_call(
                item.get("call_id")
                    .and_then(Value::as_str)
                    .map_or_else(generate_call_id, str::to_string),
                item.get("name").and_then(Value::as_str).unwrap_or_default(),
                item.get("arguments").and_then(Value::as_str).unwrap_or("{}"),
            )),
            "reasoning" => {
                for summary in item.get("summary").and_then(Value::as_array).into_iter().flatten() {
                    if let Some(text) = summary.get("text").and_then(Value::as_str) {
                        response.push_part(OutputPart::thought(text));
                    }
                }
            }
            _ => response.push_part(OutputPart::text(opaque_text(item))),
        }
    }

    response.finish_reason = Some(if response.tool_calls().next().is_some() {
        FinishReason::ToolCalls
    } else if body.get("status").and_then(Value::as_str) == Some("incomplete") {
        match body
            .pointer("/incomplete_details/reason")
            .and_then(Value::as_str)
        {
            Some("content_filter") => FinishReason::ContentFilter,
            _ => FinishReason::Length,
        }
    } else {
        FinishReason::Stop
    });
    response.usage = body.get("usage").and_then(parse_usage);
    Ok(response)
}

/// Output items for a canonical response, as they appear in `response.output`
pub(crate) fn output_items(response: &CanonicalResponse) -> Vec<Value> {
    let mut items = Vec::new();
    let mut text = String::new();
    let flush_text = |text: &mut String, items: &mut Vec<Value>| {
        if !text.is_empty() {
            items.push(message_item(&item_id("msg"), &std::mem::take(text)));
        }
    };
    for part in &response.parts {
        match part {
            OutputPart::Thought { text: thought, .. } => {
                flush_text(&mut text, &mut items);
                items.push(reasoning_item(&item_id("rs"), thought));
            }
            OutputPart::ToolCall {
                id,
                name,
                arguments,
            } => {
                flush_text(&mut text, &mut items);
                items.push(function_call_item(&item_id("fc"), id, name, arguments));
            }
            other => {
                if let Some(fallback) = other.as_fallback_text() {
                    text.push_str(&fallback);
                }
            }
        }
    }
    flush_text(&mut text, &mut items);
    items
}

pub(crate) fn message_item(id: &str, text: &str) -> Value {
    json!({
        "type": "message",
        "id": id,
        "status": "completed",
        "role": "assistant",
        "content": [{ "type": "output_text", "text": text, "annotations": [] }],
    })
}

pub(crate) fn reasoning_item(id: &str, text: &str) -> Value {
    json!({
        "type": "reasoning",
        "id": id,
        "summary": [{ "type": "summary_text", "text": text }],
    })
}

pub(crate) fn function_call_item(id: &str, call_id: &str, name: &str, arguments: &str) -> Value {
    json!({
        "type": "function_call",
        "id": id,
        "status": "completed",
        "call_id": call_id,
        "name": name,
        "arguments": arguments,
    })
}

/// Canonical response to caller JSON
pub(crate) fn render(response: &CanonicalResponse) -> Value {
    let mut body = json!({
        "id": response.id,
        "object": "response",
        "created_at": response.created,
        "status": "completed",
        "model": response.model,
        "output": output_items(response),
    });
    match response.finish_reason {
        Some(FinishReason::Length) => {
            body["status"] = json!("incomplete");
            body["incomplete_details"] = json!({ "reason": "max_output_tokens" });
        }
        Some(FinishReason::ContentFilter) => {
            body["status"] = json!("incomplete");
            body["incomplete_details"] = json!({ "reason": "content_filter" });
        }
        _ => {}
    }
    if let Some(usage) = &response.usage {
        body["usage"] = render_usage(usage);
    }
    body
}

pub(crate) fn matches(body: &Value) -> bool {
    body.get("object").and_then(Value::as_str) == Some("response")
        || (body.get("output").is_some_and(Value::is_array) && body.get("choices").is_none())
}
