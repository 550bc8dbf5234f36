//! OpenAI Responses request translation.

use crate::adapter::{carry_extra, object_body, opaque_text, TranslationNotes};
use gateway_core::{
    ChatMessage, ChatRequest, ContentPart, GatewayError, GatewayResult, ImageUrl, MessageContent,
    MessageRole, Protocol, ReasoningConfig, ToolCall, ToolChoice, ToolDefinition,
};
use serde_json::{json, Map, Value};

const PROTOCOL: Protocol = Protocol::OpenAiResponses;

const KNOWN_FIELDS: &[&str] = &[
    "model",
    "input",
    "instructions",
    "tools",
    "tool_choice",
    "max_output_tokens",
    "temperature",
    "top_p",
    "stream",
    "parallel_tool_calls",
    "reasoning",
    "text",
    "user",
];

/// Caller body to canonical request
pub(crate) fn parse(body: &Value, notes: &mut TranslationNotes) -> GatewayResult<ChatRequest> {
    let map = object_body(body, PROTOCOL)?;
    let mut request = ChatRequest {
        model: map
            .get("model")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        ..ChatRequest::default()
    };

    if let Some(instructions) = map.get("instructions").and_then(Value::as_str) {
        request.messages.push(ChatMessage::system(instructions));
    }
    match map.get("input") {
        Some(Value::String(text)) => request.messages.push(ChatMessage::user(text.clone())),
        Some(Value::Array(items)) => {
            for item in items {
                parse_item(item, &mut request.messages, notes);
            }
        }
        _ => {
            return Err(GatewayError::validation(
                "input must be a string or an array of items",
                Some("input".into()),
                "invalid_request",
            ))
        }
    }

    request.max_tokens = map
        .get("max_output_tokens")
        .and_then(Value::as_u64)
        .and_then(|v| u32::try_from(v).ok());
    request.temperature = map.get("temperature").and_then(Value::as_f64).map(|v| v as f32);
    request.top_p = map.get("top_p").and_then(Value::as_f64).map(|v| v as f32);
    request.stream = map.get("stream").and_then(Value::as_bool).unwrap_or(false);
    request.parallel_tool_calls = map.get("parallel_tool_calls").and_then(Value::as_bool);
    request.user = map.get("user").and_then(Value::as_str).map(str::to_string);

    if let Some(tools) = map.get("tools").and_then(Value::as_array) {
        let mut defs = Vec::new();
        for tool in tools {
            match (
                tool.get("type").and_then(Value::as_str),
                tool.get("name").and_then(Value::as_str),
            ) {
                (Some("function"), Some(name)) => defs.push(ToolDefinition::function(
                    name,
                    tool.get("description")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                    tool.get("parameters").cloned(),
                )),
                (kind, _) => notes.note(format!(
                    "built-in tool '{}' has no function equivalent",
                    kind.unwrap_or("unknown")
                )),
            }
        }
        request.tools = (!defs.is_empty()).then_some(defs);
    }

    if let Some(choice) = map.get("tool_choice") {
        request.tool_choice = match choice {
            Value::Object(obj) if obj.get("type").and_then(Value::as_str) == Some("function") => obj
                .get("name")
                .and_then(Value::as_str)
                .map(|name| ToolChoice::Function {
                    name: name.to_string(),
                }),
            other => ToolChoice::from_openai(other),
        };
        if request.tool_choice.is_none() {
            notes.note(format!("dropped unparseable tool_choice {choice}"));
        }
    }

    if let Some(effort) = body.pointer("/reasoning/effort").and_then(Value::as_str) {
        request.reasoning = Some(ReasoningConfig {
            effort: Some(effort.to_string()),
            budget_tokens: None,
        });
    }
    if let Some(format) = body.pointer("/text/format") {
        request.response_format = response_format_from_text(format);
    }

    for (key, value) in map {
        if !KNOWN_FIELDS.contains(&key.as_str()) {
            request.extra.insert(key, value);
        }
    }
    Ok(request)
}

fn parse_item(item: &Value, out: &mut Vec<ChatMessage>, notes: &mut TranslationNotes) {
    let kind = item.get("type").and_then(Value::as_str).unwrap_or("message");
    match kind {
        "message" => {
            let role = match item.get("role").and_then(Value::as_str) {
                Some("assistant") => MessageRole::Assistant,
                Some("system" | "developer") => MessageRole::System,
                _ => MessageRole::User,
            };
            let content = match item.get("content") {
                Some(Value::String(text)) => MessageContent::Text(text.clone()),
                Some(Value::Array(parts)) => content_from_parts(parts, notes),
                _ => MessageContent::Text(String::new()),
            };
            out.push(ChatMessage {
                role,
                content: Some(content),
                name: None,
                tool_calls: None,
                tool_call_id: None,
                reasoning_content: None,
            });
        }
        "function_call" => {
            let call = ToolCall::function(
                item.get("call_id")
                    .or_else(|| item.get("id"))
                    .and_then(Value::as_str)
                    .unwrap_or_default(),
                item.get("name").and_then(Value::as_str).unwrap_or_default(),
                item.get("arguments").and_then(Value::as_str).unwrap_or("{}"),
            );
            match out.last_mut() {
                Some(last) if last.role == MessageRole::Assistant => {
                    last.tool_calls.get_or_insert_with(Vec::new).push(call);
                }
                _ => out.push(ChatMessage::assistant_tool_calls(vec![call])),
            }
        }
        "function_call_output" => out.push(ChatMessage::tool(
            item.get("call_id").and_then(Value::as_str).unwrap_or_default(),
            item.get("output").map(opaque_text).unwrap_or_default(),
        )),
        "reasoning" => notes.note("dropped reasoning input item"),
        other => {
            notes.note(format!("input item '{other}' passed through as text"));
            out.push(ChatMessage::user(opaque_text(item)));
        }
    }
}

fn content_from_parts(parts: &[Value], notes: &mut TranslationNotes) -> MessageContent {
    let mut out = Vec::new();
    for part in parts {
        match part.get("type").and_then(Value::as_str).unwrap_or_default() {
            "input_text" | "output_text" | "text" => out.push(ContentPart::text(
                part.get("text").and_then(Value::as_str).unwrap_or_default(),
            )),
            "refusal" => out.push(ContentPart::text(
                part.get("refusal").and_then(Value::as_str).unwrap_or_default(),
            )),
            "input_image" => {
                let url = part
                    .get("image_url")
                    .and_then(|u| u.as_str().or_else(|| u.get("url").and_then(Value::as_str)));
                match url {
                    Some(url) => out.push(ContentPart::ImageUrl {
                        image_url: ImageUrl {
                            url: url.to_string(),
                            detail: part.get("detail").and_then(Value::as_str).map(str::to_string),
                        },
                    }),
                    None => notes.note("dropped input_image without image_url"),
                }
            }
            other => {
                notes.note(format!("content part '{other}' passed through as text"));
                out.push(ContentPart::text(opaque_text(part)));
            }
        }
    }
    match out.as_slice() {
        [ContentPart::Text { text }] => MessageContent::Text(text.clone()),
        _ => MessageContent::Parts(out),
    }
}

/// `text.format` to a chat `response_format`
fn response_format_from_text(format: &Value) -> Option<Value> {
    match format.get("type").and_then(Value::as_str)? {
        "json_schema" => {
            let mut schema = format.as_object()?.clone();
            schema.remove("type");
            Some(json!({ "type": "json_schema", "json_schema": schema }))
        }
        "json_object" => Some(json!({ "type": "json_object" })),
        _ => None,
    }
}

/// Chat `response_format` to `text.format`
fn text_format_from_response_format(format: &Value) -> Option<Value> {
    match format.get("type").and_then(Value::as_str)? {
        "json_schema" => {
            let mut out = format.get("json_schema")?.as_object()?.clone();
            out.insert("type".into(), json!("json_schema"));
            Some(Value::Object(out))
        }
        other => Some(json!({ "type": other })),
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
    if let Some(system) = request.system_prompt() {
        body.insert("instructions".into(), json!(system));
    }

    let mut input = Vec::new();
    for message in &request.messages {
        match message.role {
            MessageRole::System => {}
            MessageRole::User => input.push(json!({
                "role": "user",
                "content": input_parts(message.content.as_ref()),
            })),
            MessageRole::Assistant => {
                let text = message.text();
                if !text.is_empty() {
                    input.push(json!({
                        "type": "message",
                        "role": "assistant",
                        "content": [{ "type": "output_text", "text": text }],
                    }));
                }
                for call in message.tool_calls.iter().flatten() {
                    input.push(json!({
                        "type": "function_call",
                        "call_id": call.id,
                        "name": call.function.name,
                        "arguments": call.function.arguments,
                    }));
                }
            }
            MessageRole::Tool => input.push(json!({
                "type": "function_call_output",
                "call_id": message.tool_call_id.clone().unwrap_or_default(),
                "output": message.text(),
            })),
        }
    }
    body.insert("input".into(), Value::Array(input));

    if let Some(max) = request.max_tokens {
        body.insert("max_output_tokens".into(), json!(max));
    }
    if let Some(t) = request.temperature {
        body.insert("temperature".into(), json!(t));
    }
    if let Some(p) = request.top_p {
        body.insert("top_p".into(), json!(p));
    }
    if request.stream {
        body.insert("stream".into(), json!(true));
    }
    if let Some(tools) = &request.tools {
        let tools: Vec<Value> = tools
            .iter()
            .map(|tool| {
                json!({
                    "type": "function",
                    "name": tool.function.name,
                    "description": tool.function.description,
                    "parameters": tool.function.parameters,
                })
            })
            .collect();
        body.insert("tools".into(), Value::Array(tools));
    }
    if let Some(choice) = &request.tool_choice {
        let value = match choice {
            ToolChoice::Function { name } => json!({ "type": "function", "name": name }),
            other => other.to_openai(),
        };
        body.insert("tool_choice".into(), value);
    }
    if let Some(parallel) = request.parallel_tool_calls {
        body.insert("parallel_tool_calls".into(), json!(parallel));
    }
    if let Some(reasoning) = request.reasoning.as_ref().filter(|r| r.is_enabled()) {
        body.insert(
            "reasoning".into(),
            json!({ "effort": reasoning.resolved_effort() }),
        );
    }
    if let Some(format) = request
        .response_format
        .as_ref()
        .and_then(text_format_from_response_format)
    {
        body.insert("text".into(), json!({ "format": format }));
    }
    if let Some(user) = &request.user {
        body.insert("user".into(), json!(user));
    }
    for (field, present) in [
        ("stop", request.stop.is_some()),
        ("top_k", request.top_k.is_some()),
        ("seed", request.seed.is_some()),
    ] {
        if present {
            notes.dropped(field, PROTOCOL);
        }
    }

    carry_extra(&mut body, request, PROTOCOL, origin, notes);
    Ok(Value::Object(body))
}

fn input_parts(content: Option<&MessageContent>) -> Value {
    let parts: Vec<Value> = content
        .cloned()
        .map(MessageContent::into_parts)
        .unwrap_or_default()
        .into_iter()
        .map(|part| match part {
            ContentPart::Text { text } => json!({ "type": "input_text", "text": text }),
            ContentPart::ImageUrl { image_url } => {
                json!({ "type": "input_image", "image_url": image_url.url })
            }
        })
        .collect();
    Value::Array(parts)
}
