//! OpenAI Chat Completions request translation.

use crate::adapter::{canonical_from, carry_extra, object_body, opaque_text, TranslationNotes};
use gateway_core::{
    ChatMessage, ChatRequest, GatewayResult, MessageContent, MessageRole, Protocol, ToolChoice,
};
use serde_json::{json, Map, Value};

const PROTOCOL: Protocol = Protocol::OpenAiChat;

/// Caller body to canonical request
pub(crate) fn parse(body: &Value, notes: &mut TranslationNotes) -> GatewayResult<ChatRequest> {
    let mut map = object_body(body, PROTOCOL)?;

    if let Some(max) = map.remove("max_completion_tokens") {
        map.entry("max_tokens").or_insert(max);
    }
    if let Some(Value::String(stop)) = map.get("stop").cloned() {
        map.insert("stop".into(), json!([stop]));
    }
    if let Some(effort) = map.remove("reasoning_effort") {
        map.insert("reasoning".into(), json!({ "effort": effort }));
    }
    if let Some(choice) = map.remove("tool_choice") {
        if ToolChoice::from_openai(&choice).is_some() {
            map.insert("tool_choice".into(), choice);
        } else {
            notes.note(format!("dropped unparseable tool_choice {choice}"));
        }
    }
    if let Some(Value::Array(messages)) = map.get_mut("messages") {
        for message in messages.iter_mut() {
            normalize_content_parts(message, notes);
        }
    }

    canonical_from(map, PROTOCOL)
}

/// Content part types other than text and images become opaque text parts
fn normalize_content_parts(message: &mut Value, notes: &mut TranslationNotes) {
    let Some(Value::Array(parts)) = message.get_mut("content") else {
        return;
    };
    for part in parts.iter_mut() {
        let kind = part.get("type").and_then(Value::as_str).unwrap_or_default();
        if !matches!(kind, "text" | "image_url") {
            notes.note(format!("content part '{kind}' passed through as text"));
            *part = json!({ "type": "text", "text": opaque_text(part) });
        }
    }
}

/// Canonical request to upstream body
pub(crate) fn build(
    request: &ChatRequest,
    model: &str,
    origin: Protocol,
    notes: &mut TranslationNotes,
) -> GatewayResult<Value> {
    let mut body = Map::new();
    body.insert("model".into(), json!(model));
    body.insert(
        "messages".into(),
        Value::Array(request.messages.iter().map(build_message).collect()),
    );

    if let Some(t) = request.temperature {
        body.insert("temperature".into(), json!(t));
    }
    if let Some(p) = request.top_p {
        body.insert("top_p".into(), json!(p));
    }
    if let Some(max) = request.max_tokens {
        body.insert("max_tokens".into(), json!(max));
    }
    if let Some(stop) = &request.stop {
        body.insert("stop".into(), json!(stop));
    }
    if request.top_k.is_some() {
        notes.dropped("top_k", PROTOCOL);
    }
    if request.stream {
        body.insert("stream".into(), json!(true));
        body.insert("stream_options".into(), json!({ "include_usage": true }));
    }
    if let Some(tools) = &request.tools {
        body.insert("tools".into(), serde_json::to_value(tools)?);
    }
    if let Some(choice) = &request.tool_choice {
        body.insert("tool_choice".into(), choice.to_openai());
    }
    if let Some(parallel) = request.parallel_tool_calls {
        body.insert("parallel_tool_calls".into(), json!(parallel));
    }
    if let Some(format) = &request.response_format {
        body.insert("response_format".into(), format.clone());
    }
    if let Some(reasoning) = request.reasoning.as_ref().filter(|r| r.is_enabled()) {
        body.insert("reasoning_effort".into(), json!(reasoning.resolved_effort()));
    }
    if let Some(seed) = request.seed {
        body.insert("seed".into(), json!(seed));
    }
    if let Some(user) = &request.user {
        body.insert("user".into(), json!(user));
    }

    carry_extra(&mut body, request, PROTOCOL, origin, notes);
    Ok(Value::Object(body))
}

fn build_message(message: &ChatMessage) -> Value {
    let mut out = Map::new();
    out.insert("role".into(), json!(message.role.to_string()));
    let content = match &message.content {
        Some(MessageContent::Text(text)) => json!(text),
        Some(MessageContent::Parts(parts)) => json!(parts),
        None => Value::Null,
    };
    out.insert("content".into(), content);
    if let Some(name) = &message.name {
        out.insert("name".into(), json!(name));
    }
    if let Some(calls) = message.tool_calls.as_ref().filter(|c| !c.is_empty()) {
        out.insert("tool_calls".into(), json!(calls));
    }
    if message.role == MessageRole::Tool {
        if let Some(id) = &message.tool_call_id {
            out.insert("tool_call_id".into(), json!(id));
        }
    }
    Value::Object(out)
}

/// Reasoning field read from a chat completion message or delta
pub(crate) fn reasoning_text(value: &Value) -> Option<&str> {
    value
        .get("reasoning_content")
        .or_else(|| value.get("reasoning"))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}
