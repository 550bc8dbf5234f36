//! Gemini `generateContent` request translation.

use super::parts::{args_object, response_object, GeminiPart};
use crate::adapter::{carry_extra, generate_call_id, object_body, opaque_text, TranslationNotes};
use gateway_core::{
    ChatMessage, ChatRequest, ContentPart, GatewayError, GatewayResult, ImageUrl, MessageContent,
    MessageRole, OutputPart, Protocol, ReasoningConfig, ToolCall, ToolChoice, ToolDefinition,
};
use serde_json::{json, Map, Value};
use std::collections::HashMap;

const PROTOCOL: Protocol = Protocol::Gemini;

const KNOWN_FIELDS: &[&str] = &[
    "model",
    "contents",
    "systemInstruction",
    "system_instruction",
    "generationConfig",
    "generation_config",
    "tools",
    "toolConfig",
    "tool_config",
];

/// JSON Schema keys Gemini rejects in function parameters
const UNSUPPORTED_SCHEMA_KEYS: &[&str] = &["$schema", "additionalProperties", "strict"];

fn get<'a>(map: &'a Map<String, Value>, camel: &str, snake: &str) -> Option<&'a Value> {
    map.get(camel).or_else(|| map.get(snake))
}

/// Caller body to canonical request. Model and streaming come from the URL
/// and are applied by the switch.
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

    if let Some(system) = get(&map, "systemInstruction", "system_instruction") {
        let text = match system {
            Value::String(s) => s.clone(),
            other => other
                .get("parts")
                .and_then(Value::as_array)
                .map(|parts| {
                    parts
                        .iter()
                        .filter_map(|p| p.get("text").and_then(Value::as_str))
                        .collect::<Vec<_>>()
                        .join("\n")
                })
                .unwrap_or_default(),
        };
        if !text.is_empty() {
            request.messages.push(ChatMessage::system(text));
        }
    }

    let contents = map
        .get("contents")
        .and_then(Value::as_array)
        .ok_or_else(|| {
            GatewayError::validation(
                "contents must be an array",
                Some("contents".into()),
                "invalid_request",
            )
        })?;
    let mut call_ids: HashMap<String, Vec<String>> = HashMap::new();
    for content in contents {
        parse_content(content, &mut request.messages, &mut call_ids, notes);
    }

    if let Some(Value::Object(config)) = get(&map, "generationConfig", "generation_config") {
        parse_generation_config(config, &mut request);
    }

    if let Some(tools) = map.get("tools").and_then(Value::as_array) {
        let mut defs = Vec::new();
        for tool in tools {
            let Some(obj) = tool.as_object() else { continue };
            for (key, value) in obj {
                if matches!(key.as_str(), "functionDeclarations" | "function_declarations") {
                    for decl in value.as_array().into_iter().flatten() {
                        if let Some(name) = decl.get("name").and_then(Value::as_str) {
                            defs.push(ToolDefinition::function(
                                name,
                                decl.get("description")
                                    .and_then(Value::as_str)
                                    .map(str::to_string),
                                decl.get("parameters")
                                    .or_else(|| decl.get("parametersJsonSchema"))
                                    .cloned(),
                            ));
                        }
                    }
                } else {
                    notes.note(format!("built-in tool '{key}' has no function equivalent"));
                }
            }
        }
        request.tools = (!defs.is_empty()).then_some(defs);
    }

    if let Some(config) = get(&map, "toolConfig", "tool_config")
        .and_then(|c| c.get("functionCallingConfig").or_else(|| c.get("function_calling_config")))
    {
        let allowed: Vec<&str> = config
            .get("allowedFunctionNames")
            .or_else(|| config.get("allowed_function_names"))
            .and_then(Value::as_array)
            .map(|names| names.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();
        request.tool_choice = match config.get("mode").and_then(Value::as_str) {
            Some("AUTO" | "VALIDATED") => Some(ToolChoice::Auto),
            Some("NONE") => Some(ToolChoice::None),
            Some("ANY") => Some(match allowed.as_slice() {
                [name] => ToolChoice::Function {
                    name: (*name).to_string(),
                },
                _ => ToolChoice::Required,
            }),
            other => {
                notes.note(format!("dropped unknown function calling mode {other:?}"));
                None
            }
        };
    }

    for (key, value) in map {
        if !KNOWN_FIELDS.contains(&key.as_str()) {
            request.extra.insert(key, value);
        }
    }
    Ok(request)
}

fn parse_content(
    content: &Value,
    out: &mut Vec<ChatMessage>,
    call_ids: &mut HashMap<String, Vec<String>>,
    notes: &mut TranslationNotes,
) {
    let role = match content.get("role").and_then(Value::as_str) {
        Some("model") => MessageRole::Assistant,
        _ => MessageRole::User,
    };
    let mut parts = Vec::new();
    let mut tool_calls = Vec::new();
    let mut reasoning = String::new();

    for raw in content.get("parts").and_then(Value::as_array).into_iter().flatten() {
        let Some(part) = GeminiPart::from_value(raw) else {
            notes.note("unparseable part passed through as text");
            parts.push(ContentPart::text(opaque_text(raw)));
            continue;
        };
        if let Some(inline) = &part.inline_data {
            if inline.mime_type.starts_with("image/") {
                parts.push(ContentPart::ImageUrl {
                    image_url: ImageUrl::from_inline(&inline.mime_type, &inline.data),
                });
                continue;
            }
        }
        if let Some(file) = &part.file_data {
            parts.push(ContentPart::ImageUrl {
                image_url: ImageUrl {
                    url: file.file_uri.clone(),
                    detail: None,
                },
            });
            continue;
        }
        match part.into_output() {
            Some(OutputPart::ToolCall {
                id,
                name,
                arguments,
            }) => {
                call_ids.entry(name.clone()).or_default().push(id.clone());
                tool_calls.push(ToolCall::function(id, name, arguments));
            }
            Some(OutputPart::ToolResult {
                call_id,
                name,
                content,
            }) => {
                let name = name.unwrap_or_default();
                let call_id = if call_id.is_empty() {
                    call_ids
                        .get_mut(&name)
                        .and_then(|ids| (!ids.is_empty()).then(|| ids.remove(0)))
                        .unwrap_or_else(generate_call_id)
                } else {
                    call_id
                };
                let mut message = ChatMessage::tool(call_id, opaque_text(&content));
                message.name = Some(name);
                out.push(message);
            }
            Some(OutputPart::Thought { text, .. }) => reasoning.push_str(&text),
            Some(OutputPart::Text { text }) => parts.push(ContentPart::text(text)),
            Some(other) => {
                if let Some(text) = other.as_fallback_text() {
                    parts.push(ContentPart::text(text));
                }
            }
            None => {}
        }
    }

    if parts.is_empty() && tool_calls.is_empty() && reasoning.is_empty() {
        return;
    }
    let content = match parts.as_slice() {
        [] => None,
        [ContentPart::Text { text }] => Some(MessageContent::Text(text.clone())),
        _ => Some(MessageContent::Parts(parts)),
    };
    out.push(ChatMessage {
        role,
        content,
        name: None,
        tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
        tool_call_id: None,
        reasoning_content: (!reasoning.is_empty()).then_some(reasoning),
    });
}

fn parse_generation_config(config: &Map<String, Value>, request: &mut ChatRequest) {
    let number = |camel: &str, snake: &str| get(config, camel, snake).and_then(Value::as_f64);
    let uint = |camel: &str, snake: &str| {
        get(config, camel, snake)
            .and_then(Value::as_u64)
            .and_then(|v| u32::try_from(v).ok())
    };

    request.temperature = number("temperature", "temperature").map(|v| v as f32);
    request.top_p = number("topP", "top_p").map(|v| v as f32);
    request.top_k = uint("topK", "top_k");
    request.max_tokens = uint("maxOutputTokens", "max_output_tokens");
    request.seed = get(config, "seed", "seed").and_then(Value::as_i64);
    request.stop = get(config, "stopSequences", "stop_sequences")
        .and_then(Value::as_array)
        .map(|s| s.iter().filter_map(Value::as_str).map(str::to_string).collect());

    if get(config, "responseMimeType", "response_mime_type").and_then(Value::as_str)
        == Some("application/json")
    {
        request.response_format = Some(
            match get(config, "responseSchema", "response_schema") {
                Some(schema) => json!({
                    "type": "json_schema",
                    "json_schema": { "name": "response", "schema": schema },
                }),
                None => json!({ "type": "json_object" }),
            },
        );
    }

    if let Some(thinking) = get(config, "thinkingConfig", "thinking_config") {
        let budget = thinking
            .get("thinkingBudget")
            .or_else(|| thinking.get("thinking_budget"))
            .and_then(Value::as_i64);
        request.reasoning = match budget {
            Some(0) => None,
            Some(b) if b > 0 => Some(ReasoningConfig {
                effort: None,
                budget_tokens: u32::try_from(b).ok(),
            }),
            _ => Some(ReasoningConfig {
                effort: Some("medium".to_string()),
                budget_tokens: None,
            }),
        };
    }
}

/// Remove JSON Schema keys Gemini rejects, recursively
pub(crate) fn clean_schema(schema: &Value) -> Value {
    match schema {
        Value::Object(obj) => Value::Object(
            obj.iter()
                .filter(|(k, _)| !UNSUPPORTED_SCHEMA_KEYS.contains(&k.as_str()))
                .map(|(k, v)| (k.clone(), clean_schema(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(clean_schema).collect()),
        other => other.clone(),
    }
}

fn guess_image_mime(url: &str) -> &'static str {
    let lower = url.to_ascii_lowercase();
    if lower.ends_with(".png") {
        "image/png"
    } else if lower.ends_with(".webp") {
        "image/webp"
    } else if lower.ends_with(".gif") {
        "image/gif"
    } else {
        "image/jpeg"
    }
}

fn user_parts(content: Option<&MessageContent>) -> Vec<Value> {
    content
        .cloned()
        .map(MessageContent::into_parts)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|part| match part {
            ContentPart::Text { text } if text.is_empty() => None,
            ContentPart::Text { text } => Some(json!({ "text": text })),
            ContentPart::ImageUrl { image_url } => Some(match image_url.as_data_url() {
                Some((mime_type, data)) => {
                    json!({ "inlineData": { "mimeType": mime_type, "data": data } })
                }
                None => json!({
                    "fileData": {
                        "mimeType": guess_image_mime(&image_url.url),
                        "fileUri": image_url.url,
                    }
                }),
            }),
        })
        .collect()
}

/// Canonical request to upstream body. The model travels in the URL.
pub(crate) fn build(
    request: &ChatRequest,
    _model: &str,
    origin: Protocol,
    notes: &mut TranslationNotes,
) -> GatewayResult<Value> {
    let mut body = Map::new();
    if let Some(system) = request.system_prompt() {
        body.insert(
            "systemInstruction".into(),
            json!({ "parts": [{ "text": system }] }),
        );
    }

    let mut call_names: HashMap<&str, &str> = HashMap::new();
    let mut contents: Vec<(&'static str, Vec<Value>)> = Vec::new();
    for message in &request.messages {
        let (role, parts) = match message.role {
            MessageRole::System => continue,
            MessageRole::User => ("user", user_parts(message.content.as_ref())),
            MessageRole::Assistant => {
                let mut parts = Vec::new();
                let text = message.text();
                if !text.is_empty() {
                    parts.push(json!({ "text": text }));
                }
                for call in message.tool_calls.iter().flatten() {
                    call_names.insert(&call.id, &call.function.name);
                    parts.push(json!({
                        "functionCall": {
                            "name": call.function.name,
                            "args": args_object(&call.function.arguments),
                        }
                    }));
                }
                ("model", parts)
            }
            MessageRole::Tool => {
                let id = message.tool_call_id.as_deref().unwrap_or_default();
                let name = call_names
                    .get(id)
                    .copied()
                    .or(message.name.as_deref())
                    .unwrap_or("unknown");
                (
                    "user",
                    vec![json!({
                        "functionResponse": {
                            "name": name,
                            "response": response_object(Value::String(message.text())),
                        }
                    })],
                )
            }
        };
        if parts.is_empty() {
            continue;
        }
        match contents.last_mut() {
            Some((last_role, last_parts)) if *last_role == role => last_parts.extend(parts),
            _ => contents.push((role, parts)),
        }
    }
    body.insert(
        "contents".into(),
        Value::Array(
            contents
                .into_iter()
                .map(|(role, parts)| json!({ "role": role, "parts": parts }))
                .collect(),
        ),
    );

    let mut config = Map::new();
    if let Some(t) = request.temperature {
        config.insert("temperature".into(), json!(t));
    }
    if let Some(p) = request.top_p {
        config.insert("topP".into(), json!(p));
    }
    if let Some(k) = request.top_k {
        config.insert("topK".into(), json!(k));
    }
    if let Some(max) = request.max_tokens {
        config.insert("maxOutputTokens".into(), json!(max));
    }
    if let Some(stop) = &request.stop {
        config.insert("stopSequences".into(), json!(stop));
    }
    if let Some(seed) = request.seed {
        config.insert("seed".into(), json!(seed));
    }
    if let Some(format) = &request.response_format {
        match format.get("type").and_then(Value::as_str) {
            Some("json_object") => {
                config.insert("responseMimeType".into(), json!("application/json"));
            }
            Some("json_schema") => {
                config.insert("responseMimeType".into(), json!("application/json"));
                if let Some(schema) = format.pointer("/json_schema/schema") {
                    config.insert("responseSchema".into(), clean_schema(schema));
                }
            }
            _ => {}
        }
    }
    if let Some(reasoning) = request.reasoning.as_ref().filter(|r| r.is_enabled()) {
        config.insert(
            "thinkingConfig".into(),
            json!({ "thinkingBudget": reasoning.resolved_budget(), "includeThoughts": true }),
        );
    }
    if !config.is_empty() {
        body.insert("generationConfig".into(), Value::Object(config));
    }

    if let Some(tools) = &request.tools {
        let declarations: Vec<Value> = tools
            .iter()
            .map(|tool| {
                let mut decl = json!({ "name": tool.function.name });
                if let Some(description) = &tool.function.description {
                    decl["description"] = json!(description);
                }
                if let Some(parameters) = &tool.function.parameters {
                    decl["parameters"] = clean_schema(parameters);
                }
                decl
            })
            .collect();
        body.insert(
            "tools".into(),
            json!([{ "functionDeclarations": declarations }]),
        );
    }
    if let Some(choice) = &request.tool_choice {
        let config = match choice {
            ToolChoice::Auto => json!({ "mode": "AUTO" }),
            ToolChoice::None => json!({ "mode": "NONE" }),
            ToolChoice::Required => json!({ "mode": "ANY" }),
            ToolChoice::Function { name } => {
                json!({ "mode": "ANY", "allowedFunctionNames": [name] })
            }
        };
        body.insert(
            "toolConfig".into(),
            json!({ "functionCallingConfig": config }),
        );
    }
    if request.parallel_tool_calls.is_some() {
        notes.dropped("parallel_tool_calls", PROTOCOL);
    }
    if request.user.is_some() {
        notes.dropped("user", PROTOCOL);
    }

    carry_extra(&mut body, request, PROTOCOL, origin, notes);
    Ok(Value::Object(body))
}
