//! Anthropic Messages request translation.

use crate::adapter::{carry_extra, object_body, opaque_text, TranslationNotes};
use gateway_core::{
    parse_arguments, ChatMessage, ChatRequest, ContentPart, GatewayError, GatewayResult, ImageUrl,
    MessageContent, MessageRole, Protocol, ReasoningConfig, ToolCall, ToolChoice, ToolDefinition,
};
use serde_json::{json, Map, Value};

const PROTOCOL: Protocol = Protocol::AnthropicMessages;

/// Anthropic requires `max_tokens`; used when the caller did not set one
pub const DEFAULT_MAX_TOKENS: u32 = 4_096;

/// Smallest thinking budget Anthropic accepts
pub const MIN_THINKING_BUDGET: u32 = 1_024;

const KNOWN_FIELDS: &[&str] = &[
    "model",
    "messages",
    "system",
    "max_tokens",
    "temperature",
    "top_p",
    "top_k",
    "stop_sequences",
    "stream",
    "tools",
    "tool_choice",
    "thinking",
    "metadata",
];

/// Normalize an Anthropic `tool_choice` into its object form.
///
/// String values `auto`, `none`, `any` and `required` become `{type: ...}` with
/// `required` aliasing to `any`. Objects with a known `type` are kept. Anything
/// else yields `None` and must not be forwarded.
#[must_use]
pub fn normalize_tool_choice(value: &Value) -> Option<Value> {
    match value {
        Value::String(s) => match s.as_str() {
            "auto" | "none" | "any" => Some(json!({ "type": s })),
            "required" => Some(json!({ "type": "any" })),
            _ => None,
        },
        Value::Object(obj) => match obj.get("type").and_then(Value::as_str) {
            Some("auto" | "none" | "any") => Some(value.clone()),
            Some("required") => {
                let mut out = obj.clone();
                out.insert("type".into(), json!("any"));
                Some(Value::Object(out))
            }
            Some("tool") if obj.get("name").is_some_and(Value::is_string) => Some(value.clone()),
            _ => None,
        },
        _ => None,
    }
}

fn tool_choice_from_object(choice: &Value) -> Option<ToolChoice> {
    match choice.get("type").and_then(Value::as_str)? {
        "auto" => Some(ToolChoice::Auto),
        "none" => Some(ToolChoice::None),
        "any" => Some(ToolChoice::Required),
        "tool" => Some(ToolChoice::Function {
            name: choice.get("name")?.as_str()?.to_string(),
        }),
        _ => None,
    }
}

fn invalid(message: impl Into<String>, field: &str) -> GatewayError {
    GatewayError::validation(message, Some(field.to_string()), "invalid_request")
}

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

    match map.get("system") {
        Some(Value::String(system)) if !system.is_empty() => {
            request.messages.push(ChatMessage::system(system.clone()));
        }
        Some(Value::Array(blocks)) => {
            let text = blocks
                .iter()
                .filter_map(|b| b.get("text").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join("\n");
            if !text.is_empty() {
                request.messages.push(ChatMessage::system(text));
            }
        }
        _ => {}
    }

    let messages = map
        .get("messages")
        .and_then(Value::as_array)
        .ok_or_else(|| invalid("messages must be an array", "messages"))?;
    for message in messages {
        parse_message(message, &mut request.messages, notes)?;
    }

    request.max_tokens = map
        .get("max_tokens")
        .and_then(Value::as_u64)
        .and_then(|v| u32::try_from(v).ok());
    request.temperature = map.get("temperature").and_then(Value::as_f64).map(|v| v as f32);
    request.top_p = map.get("top_p").and_then(Value::as_f64).map(|v| v as f32);
    request.top_k = map
        .get("top_k")
        .and_then(Value::as_u64)
        .and_then(|v| u32::try_from(v).ok());
    request.stop = map.get("stop_sequences").and_then(Value::as_array).map(|s| {
        s.iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect()
    });
    request.stream = map.get("stream").and_then(Value::as_bool).unwrap_or(false);

    if let Some(tools) = map.get("tools").and_then(Value::as_array) {
        let mut defs = Vec::new();
        for tool in tools {
            let Some(name) = tool.get("name").and_then(Value::as_str) else {
                continue;
            };
            if tool.get("input_schema").is_none() && tool.get("type").is_some() {
                notes.note(format!("server tool '{name}' has no function equivalent"));
                continue;
            }
            defs.push(ToolDefinition::function(
                name,
                tool.get("description")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                tool.get("input_schema").cloned(),
            ));
        }
        request.tools = (!defs.is_empty()).then_some(defs);
    }

    if let Some(choice) = map.get("tool_choice") {
        match normalize_tool_choice(choice) {
            Some(normalized) => {
                request.tool_choice = tool_choice_from_object(&normalized);
                if normalized
                    .get("disable_parallel_tool_use")
                    .and_then(Value::as_bool)
                    == Some(true)
                {
                    request.parallel_tool_calls = Some(false);
                }
            }
            None => notes.note(format!("dropped unparseable tool_choice {choice}")),
        }
    }

    if let Some(thinking) = map.get("thinking") {
        if thinking.get("type").and_then(Value::as_str) == Some("enabled") {
            request.reasoning = Some(ReasoningConfig {
                effort: None,
                budget_tokens: thinking
                    .get("budget_tokens")
                    .and_then(Value::as_u64)
                    .and_then(|v| u32::try_from(v).ok()),
            });
        }
    }
    request.user = body
        .pointer("/metadata/user_id")
        .and_then(Value::as_str)
        .map(str::to_string);

    for (key, value) in map {
        if !KNOWN_FIELDS.contains(&key.as_str()) {
            request.extra.insert(key, value);
        }
    }
    Ok(request)
}

fn parse_message(
    message: &Value,
    out: &mut Vec<ChatMessage>,
    notes: &mut TranslationNotes,
) -> GatewayResult<()> {
    let role = match message.get("role").and_then(Value::as_str) {
        Some("user") => MessageRole::User,
        Some("assistant") => MessageRole::Assistant,
        other => {
            return Err(invalid(
                format!("unsupported message role {other:?}"),
                "messages.role",
            ))
        }
    };

    let blocks = match message.get("content") {
        Some(Value::String(text)) => {
            out.push(ChatMessage {
                role,
                ..ChatMessage::user(text.clone())
            });
            return Ok(());
        }
        Some(Value::Array(blocks)) => blocks,
        _ => return Err(invalid("message content must be a string or array", "messages.content")),
    };

    let mut parts = Vec::new();
    let mut tool_calls = Vec::new();
    let mut reasoning = String::new();
    for block in blocks {
        match block.get("type").and_then(Value::as_str).unwrap_or_default() {
            "text" => parts.push(ContentPart::text(
                block.get("text").and_then(Value::as_str).unwrap_or_default(),
            )),
            "image" => match parse_image(block) {
                Some(image_url) => parts.push(ContentPart::ImageUrl { image_url }),
                None => notes.note("dropped image block with unsupported source"),
            },
            "tool_use" => tool_calls.push(ToolCall::function(
                block.get("id").and_then(Value::as_str).unwrap_or_default(),
                block.get("name").and_then(Value::as_str).unwrap_or_default(),
                block.get("input").map_or_else(|| "{}".to_string(), Value::to_string),
            )),
            "tool_result" => {
                let mut result = ChatMessage::tool(
                    block
                        .get("tool_use_id")
                        .and_then(Value::as_str)
                        .unwrap_or_default(),
                    tool_result_text(block.get("content")),
                );
                if block.get("is_error").and_then(Value::as_bool) == Some(true) {
                    result.name = Some("error".to_string());
                }
                out.push(result);
            }
            "thinking" => {
                if let Some(text) = block.get("thinking").and_then(Value::as_str) {
                    reasoning.push_str(text);
                }
            }
            "redacted_thinking" => notes.note("dropped redacted_thinking block"),
            other => {
                notes.note(format!("content block '{other}' passed through as text"));
                parts.push(ContentPart::text(opaque_text(block)));
            }
        }
    }

    if parts.is_empty() && tool_calls.is_empty() && reasoning.is_empty() {
        return Ok(());
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
    Ok(())
}

fn parse_image(block: &Value) -> Option<ImageUrl> {
    let source = block.get("source")?;
    match source.get("type").and_then(Value::as_str)? {
        "base64" => Some(ImageUrl::from_inline(
            source.get("media_type").and_then(Value::as_str)?,
            source.get("data").and_then(Value::as_str)?,
        )),
        "url" => Some(ImageUrl {
            url: source.get("url").and_then(Value::as_str)?.to_string(),
            detail: None,
        }),
        _ => None,
    }
}

fn tool_result_text(content: Option<&Value>) -> String {
    match content {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(blocks)) => blocks
            .iter()
            .map(|b| {
                b.get("text")
                    .and_then(Value::as_str)
                    .map_or_else(|| opaque_text(b), str::to_string)
            })
            .collect::<Vec<_>>()
            .join("\n"),
        Some(other) => opaque_text(other),
        None => String::new(),
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

    let thinking_budget = request
        .reasoning
        .as_ref()
        .filter(|r| r.is_enabled())
        .map(|r| r.resolved_budget().max(MIN_THINKING_BUDGET));
    let mut max_tokens = request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS);
    if let Some(budget) = thinking_budget {
        if max_tokens <= budget {
            max_tokens = budget.saturating_add(DEFAULT_MAX_TOKENS);
            notes.note(format!("raised max_tokens to {max_tokens} above thinking budget"));
        }
        body.insert(
            "thinking".into(),
            json!({ "type": "enabled", "budget_tokens": budget }),
        );
    }
    body.insert("max_tokens".into(), json!(max_tokens));

    if let Some(system) = request.system_prompt() {
        body.insert("system".into(), json!(system));
    }
    body.insert("messages".into(), Value::Array(build_messages(&request.messages)));

    if let Some(t) = request.temperature {
        body.insert("temperature".into(), json!(t));
    }
    if let Some(p) = request.top_p {
        body.insert("top_p".into(), json!(p));
    }
    if let Some(k) = request.top_k {
        body.insert("top_k".into(), json!(k));
    }
    if let Some(stop) = &request.stop {
        body.insert("stop_sequences".into(), json!(stop));
    }
    if request.stream {
        body.insert("stream".into(), json!(true));
    }

    if let Some(tools) = &request.tools {
        let tools: Vec<Value> = tools
            .iter()
            .map(|tool| {
                let mut out = json!({
                    "name": tool.function.name,
                    "input_schema": tool
                        .function
                        .parameters
                        .clone()
                        .unwrap_or_else(|| json!({ "type": "object", "properties": {} })),
                });
                if let Some(description) = &tool.function.description {
                    out["description"] = json!(description);
                }
                out
            })
            .collect();
        body.insert("tools".into(), Value::Array(tools));
    }

    let mut choice = request.tool_choice.as_ref().map(|choice| match choice {
        ToolChoice::Auto => json!({ "type": "auto" }),
        ToolChoice::None => json!({ "type": "none" }),
        ToolChoice::Required => json!({ "type": "any" }),
        ToolChoice::Function { name } => json!({ "type": "tool", "name": name }),
    });
    if request.parallel_tool_calls == Some(false) && request.has_tools() {
        let c = choice.get_or_insert_with(|| json!({ "type": "auto" }));
        c["disable_parallel_tool_use"] = json!(true);
    }
    if let Some(choice) = choice {
        body.insert("tool_choice".into(), choice);
    }

    if let Some(user) = &request.user {
        body.insert("metadata".into(), json!({ "user_id": user }));
    }
    if request.response_format.is_some() {
        notes.dropped("response_format", PROTOCOL);
    }
    if request.seed.is_some() {
        notes.dropped("seed", PROTOCOL);
    }

    carry_extra(&mut body, request, PROTOCOL, origin, notes);
    Ok(Value::Object(body))
}

/// Anthropic wants alternating user/assistant turns; adjacent turns of the
/// same role are merged and tool results travel inside user turns
fn build_messages(messages: &[ChatMessage]) -> Vec<Value> {
    let mut out: Vec<(&'static str, Vec<Value>)> = Vec::new();
    for message in messages {
        let (role, blocks) = match message.role {
            MessageRole::System => continue,
            MessageRole::User => ("user", content_blocks(message.content.as_ref())),
            MessageRole::Tool => (
                "user",
                vec![json!({
                    "type": "tool_result",
                    "tool_use_id": message.tool_call_id.clone().unwrap_or_default(),
                    "content": message.text(),
                })],
            ),
            MessageRole::Assistant => {
                let mut blocks = content_blocks(message.content.as_ref());
                for call in message.tool_calls.iter().flatten() {
                    blocks.push(json!({
                        "type": "tool_use",
                        "id": call.id,
                        "name": call.function.name,
                        "input": input_object(&call.function.arguments),
                    }));
                }
                ("assistant", blocks)
            }
        };
        if blocks.is_empty() {
            continue;
        }
        match out.last_mut() {
            Some((last_role, last_blocks)) if *last_role == role => last_blocks.extend(blocks),
            _ => out.push((role, blocks)),
        }
    }
    out.into_iter()
        .map(|(role, content)| json!({ "role": role, "content": content }))
        .collect()
}

fn content_blocks(content: Option<&MessageContent>) -> Vec<Value> {
    let Some(content) = content else {
        return Vec::new();
    };
    content
        .clone()
        .into_parts()
        .into_iter()
        .filter_map(|part| match part {
            ContentPart::Text { text } if text.is_empty() => None,
            ContentPart::Text { text } => Some(json!({ "type": "text", "text": text })),
            ContentPart::ImageUrl { image_url } => Some(match image_url.as_data_url() {
                Some((media_type, data)) => json!({
                    "type": "image",
                    "source": { "type": "base64", "media_type": media_type, "data": data },
                }),
                None => json!({
                    "type": "image",
                    "source": { "type": "url", "url": image_url.url },
                }),
            }),
        })
        .collect()
}

/// Tool arguments as an Anthropic `input` object
pub(crate) fn input_object(arguments: &str) -> Value {
    match parse_arguments(arguments) {
        Value::Object(obj) => Value::Object(obj),
        other => json!({ "value": other }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_choice_normalization() {
        assert_eq!(normalize_tool_choice(&json!("required")), Some(json!({"type": "any"})));
        assert_eq!(normalize_tool_choice(&json!("auto")), Some(json!({"type": "auto"})));
        assert_eq!(
            normalize_tool_choice(&json!({"type": "tool", "name": "x"})),
            Some(json!({"type": "tool", "name": "x"}))
        );
        assert_eq!(normalize_tool_choice(&json!("maybe")), None);
        assert_eq!(normalize_tool_choice(&json!({"type": "tool"})), None);
        assert_eq!(normalize_tool_choice(&json!(3)), None);
    }

    #[test]
    fn test_parse_required_tool_choice() {
        let mut notes = TranslationNotes::new();
        let request = parse(
            &json!({
                "model": "claude-3-5-sonnet-20241022",
                "messages": [{"role": "user", "content": "hi"}],
                "tool_choice": "required"
            }),
            &mut notes,
        )
        .unwrap();
        assert_eq!(request.tool_choice, Some(ToolChoice::Required));
        assert_eq!(request.model, "claude-3-5-sonnet-20241022");
        assert!(notes.is_empty());
    }

    #[test]
    fn test_parse_unparseable_tool_choice_is_dropped() {
        let mut notes = TranslationNotes::new();
        let request = parse(
            &json!({
                "messages": [{"role": "user", "content": "hi"}],
                "tool_choice": "whenever"
            }),
            &mut notes,
        )
        .unwrap();
        assert!(request.tool_choice.is_none());
        assert_eq!(notes.as_slice().len(), 1);
    }

    #[test]
    fn test_parse_tool_round_trip_blocks() {
        let mut notes = TranslationNotes::new();
        let request = parse(
            &json!({
                "system": [{"type": "text", "text": "sys"}],
                "messages": [
                    {"role": "user", "content": "weather?"},
                    {"role": "assistant", "content": [
                        {"type": "thinking", "thinking": "check", "signature": "s"},
                        {"type": "tool_use", "id": "toolu_1", "name": "get_weather", "input": {"city": "Paris"}}
                    ]},
                    {"role": "user", "content": [
                        {"type": "tool_result", "tool_use_id": "toolu_1", "content": [{"type": "text", "text": "sunny"}]},
                        {"type": "text", "text": "thanks"}
                    ]}
                ],
                "thinking": {"type": "enabled", "budget_tokens": 2048},
                "metadata": {"user_id": "u1"},
                "service_tier": "auto"
            }),
            &mut notes,
        )
        .unwrap();

        assert_eq!(request.messages[0].role, MessageRole::System);
        let assistant = &request.messages[2];
        assert_eq!(assistant.reasoning_content.as_deref(), Some("check"));
        let call = &assistant.tool_calls.as_ref().unwrap()[0];
        assert_eq!(call.id, "toolu_1");
        assert_eq!(call.arguments_value()["city"], "Paris");
        assert_eq!(request.messages[3].role, MessageRole::Tool);
        assert_eq!(request.messages[3].text(), "sunny");
        assert_eq!(request.messages[4].text(), "thanks");
        assert_eq!(request.reasoning.unwrap().budget_tokens, Some(2048));
        assert_eq!(request.user.as_deref(), Some("u1"));
        assert!(request.extra.contains_key("service_tier"));
    }

    #[test]
    fn test_unknown_block_passes_through_as_text() {
        let mut notes = TranslationNotes::new();
        let request = parse(
            &json!({"messages": [{"role": "user", "content": [
                {"type": "document", "source": {"type": "text", "data": "doc"}}
            ]}]}),
            &mut notes,
        )
        .unwrap();
        assert!(request.messages[0].text().contains("document"));
        assert_eq!(notes.as_slice().len(), 1);
    }

    #[test]
    fn test_build_merges_tool_results_and_sets_defaults() {
        let request = ChatRequest::builder()
            .message(ChatMessage::system("be brief"))
            .message(ChatMessage::user("weather?"))
            .message(ChatMessage::assistant_tool_calls(vec![ToolCall::function(
                "call_1",
                "get_weather",
                "{\"city\":\"Paris\"}",
            )]))
            .message(ChatMessage::tool("call_1", "sunny"))
            .message(ChatMessage::user("and tomorrow?"))
            .tool_choice(ToolChoice::Required)
            .build()
            .unwrap();
        let mut notes = TranslationNotes::new();
        let body = build(&request, "claude-3-5-haiku", Protocol::OpenAiChat, &mut notes).unwrap();

        assert_eq!(body["max_tokens"], DEFAULT_MAX_TOKENS);
        assert_eq!(body["system"], "be brief");
        assert_eq!(body["tool_choice"], json!({"type": "any"}));
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1]["content"][0]["input"]["city"], "Paris");
        assert_eq!(messages[2]["content"][0]["type"], "tool_result");
        assert_eq!(messages[2]["content"][1]["text"], "and tomorrow?");
    }

    #[test]
    fn test_build_thinking_raises_max_tokens() {
        let request = ChatRequest::builder()
            .message(ChatMessage::user("think"))
            .max_tokens(1000)
            .reasoning(ReasoningConfig {
                effort: Some("high".into()),
                budget_tokens: None,
            })
            .build()
            .unwrap();
        let mut notes = TranslationNotes::new();
        let body = build(&request, "claude", Protocol::OpenAiChat, &mut notes).unwrap();
        assert_eq!(body["thinking"]["budget_tokens"], 16_384);
        assert!(body["max_tokens"].as_u64().unwrap() > 16_384);
    }

    #[test]
    fn test_input_object_wraps_scalars() {
        assert_eq!(input_object("{\"a\":1}"), json!({"a": 1}));
        assert_eq!(input_object("[1]"), json!({"value": [1]}));
        assert_eq!(input_object(""), json!({}));
    }
}
