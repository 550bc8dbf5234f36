//! Canonical request model.
//!
//! The canonical request is shaped after OpenAI Chat Completions, the richest
//! common denominator of the supported protocols. Every protocol adapter parses
//! into it and renders out of it. Fields no adapter understands are carried in
//! [`ChatRequest::extra`] so that same-protocol round trips stay lossless.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Map, Value};

/// Canonical chat request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Model requested by the caller (replaced by the pipeline's model upstream)
    #[serde(default)]
    pub model: String,

    /// Conversation
    #[serde(default)]
    pub messages: Vec<ChatMessage>,

    /// Sampling temperature (0.0 - 2.0)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Top-p (nucleus sampling) parameter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,

    /// Top-k sampling parameter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,

    /// Stop sequences
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,

    /// Streaming requested by the caller. Absent means non-streaming.
    #[serde(default)]
    pub stream: bool,

    /// Tool definitions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDefinition>>,

    /// Tool choice
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,

    /// Whether the model may emit several tool calls in one turn
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parallel_tool_calls: Option<bool>,

    /// Response format (`{"type": "json_object"}` etc.)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_format: Option<Value>,

    /// Extended reasoning request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<ReasoningConfig>,

    /// Seed for deterministic generation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,

    /// End-user identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    /// Fields the canonical model has no slot for
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChatRequest {
    /// Create a new builder for `ChatRequest`
    #[must_use]
    pub fn builder() -> ChatRequestBuilder {
        ChatRequestBuilder::default()
    }

    /// Validate the request
    ///
    /// # Errors
    /// Returns error if any field is invalid
    pub fn validate(&self) -> Result<(), crate::error::GatewayError> {
        if self.messages.is_empty() {
            return Err(crate::error::GatewayError::validation(
                "messages cannot be empty",
                Some("messages".to_string()),
                "empty_messages",
            ));
        }

        if let Some(t) = self.temperature {
            if !(0.0..=2.0).contains(&t) {
                return Err(crate::error::GatewayError::validation(
                    format!("temperature must be between 0.0 and 2.0, got {t}"),
                    Some("temperature".to_string()),
                    "invalid_temperature",
                ));
            }
        }

        if let Some(p) = self.top_p {
            if !(0.0..=1.0).contains(&p) {
                return Err(crate::error::GatewayError::validation(
                    format!("top_p must be between 0.0 and 1.0, got {p}"),
                    Some("top_p".to_string()),
                    "invalid_top_p",
                ));
            }
        }

        if self.max_tokens == Some(0) {
            return Err(crate::error::GatewayError::validation(
                "max_tokens must be greater than 0",
                Some("max_tokens".to_string()),
                "invalid_max_tokens",
            ));
        }

        Ok(())
    }

    /// Whether any message carries an image
    #[must_use]
    pub fn has_images(&self) -> bool {
        self.messages.iter().any(|m| {
            matches!(&m.content, Some(MessageContent::Parts(parts))
                if parts.iter().any(|p| matches!(p, ContentPart::ImageUrl { .. })))
        })
    }

    /// Whether tools are declared
    #[must_use]
    pub fn has_tools(&self) -> bool {
        self.tools.as_ref().is_some_and(|t| !t.is_empty())
    }

    /// Whether extended reasoning was requested
    #[must_use]
    pub fn wants_reasoning(&self) -> bool {
        self.reasoning.as_ref().is_some_and(ReasoningConfig::is_enabled)
    }

    /// Rough prompt size estimate (~4 characters per token)
    #[must_use]
    pub fn estimated_tokens(&self) -> usize {
        let chars: usize = self
            .messages
            .iter()
            .map(|m| m.content.as_ref().map_or(0, MessageContent::char_len))
            .sum();
        chars / 4
    }

    /// Concatenated system prompt, if any
    #[must_use]
    pub fn system_prompt(&self) -> Option<String> {
        let parts: Vec<String> = self
            .messages
            .iter()
            .filter(|m| m.role == MessageRole::System)
            .filter_map(|m| m.content.as_ref().map(MessageContent::joined_text))
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("\n\n"))
        }
    }
}

/// Builder for `ChatRequest`
#[derive(Debug, Default)]
pub struct ChatRequestBuilder {
    inner: ChatRequest,
}

impl ChatRequestBuilder {
    /// Set the model
    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.inner.model = model.into();
        self
    }

    /// Add a message
    #[must_use]
    pub fn message(mut self, message: ChatMessage) -> Self {
        self.inner.messages.push(message);
        self
    }

    /// Set max_tokens
    #[must_use]
    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.inner.max_tokens = Some(max_tokens);
        self
    }

    /// Set the temperature
    #[must_use]
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.inner.temperature = Some(temperature);
        self
    }

    /// Enable streaming
    #[must_use]
    pub fn stream(mut self, stream: bool) -> Self {
        self.inner.stream = stream;
        self
    }

    /// Set tools
    #[must_use]
    pub fn tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.inner.tools = Some(tools);
        self
    }

    /// Set tool_choice
    #[must_use]
    pub fn tool_choice(mut self, tool_choice: ToolChoice) -> Self {
        self.inner.tool_choice = Some(tool_choice);
        self
    }

    /// Set reasoning
    #[must_use]
    pub fn reasoning(mut self, reasoning: ReasoningConfig) -> Self {
        self.inner.reasoning = Some(reasoning);
        self
    }

    /// Build the request
    ///
    /// # Errors
    /// Returns error if the request is invalid
    pub fn build(self) -> Result<ChatRequest, crate::error::GatewayError> {
        self.inner.validate()?;
        Ok(self.inner)
    }
}

/// Chat message with role and content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Role of the message author
    pub role: MessageRole,

    /// Content of the message; `None` for assistant turns that only call tools
    #[serde(default)]
    pub content: Option<MessageContent>,

    /// Optional name of the author
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Tool calls made by the assistant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,

    /// Tool call ID for tool response messages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    /// Reasoning trace attached to an assistant turn
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_content: Option<String>,
}

impl ChatMessage {
    fn with_text(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(MessageContent::Text(content.into())),
            name: None,
            tool_calls: None,
            tool_call_id: None,
            reasoning_content: None,
        }
    }

    /// Create a system message
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::with_text(MessageRole::System, content)
    }

    /// Create a user message
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::with_text(MessageRole::User, content)
    }

    /// Create an assistant message
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_text(MessageRole::Assistant, content)
    }

    /// Create an assistant message that only calls tools
    #[must_use]
    pub fn assistant_tool_calls(tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: None,
            name: None,
            tool_calls: Some(tool_calls),
            tool_call_id: None,
            reasoning_content: None,
        }
    }

    /// Create a tool response message
    #[must_use]
    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        let mut msg = Self::with_text(MessageRole::Tool, content);
        msg.tool_call_id = Some(tool_call_id.into());
        msg
    }

    /// Text of the message with parts joined, empty when there is no content
    #[must_use]
    pub fn text(&self) -> String {
        self.content
            .as_ref()
            .map(MessageContent::joined_text)
            .unwrap_or_default()
    }
}

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// System message
    #[serde(alias = "developer")]
    System,
    /// User message
    User,
    /// Assistant message
    Assistant,
    /// Tool response message
    Tool,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
            Self::Tool => write!(f, "tool"),
        }
    }
}

/// Message content (text or multimodal parts)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    /// Simple text content
    Text(String),
    /// Multimodal content parts
    Parts(Vec<ContentPart>),
}

impl MessageContent {
    /// All text parts joined, images ignored
    #[must_use]
    pub fn joined_text(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::ImageUrl { .. } => None,
                })
                .collect::<Vec<_>>()
                .join(""),
        }
    }

    /// Number of text characters
    #[must_use]
    pub fn char_len(&self) -> usize {
        match self {
            Self::Text(s) => s.chars().count(),
            Self::Parts(parts) => parts
                .iter()
                .map(|p| match p {
                    ContentPart::Text { text } => text.chars().count(),
                    ContentPart::ImageUrl { .. } => 0,
                })
                .sum(),
        }
    }

    /// Content as a list of parts
    #[must_use]
    pub fn into_parts(self) -> Vec<ContentPart> {
        match self {
            Self::Text(text) => vec![ContentPart::Text { text }],
            Self::Parts(parts) => parts,
        }
    }

    /// Check if content is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(s) => s.is_empty(),
            Self::Parts(parts) => parts.is_empty(),
        }
    }
}

/// Content part for multimodal messages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    /// Text content part
    Text {
        /// The text content
        text: String,
    },
    /// Image content part
    ImageUrl {
        /// Image URL details
        image_url: ImageUrl,
    },
}

impl ContentPart {
    /// Text part shortcut
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }
}

/// Image URL for vision models
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageUrl {
    /// URL of the image; `data:` URLs carry inline base64 payloads
    pub url: String,
    /// Detail level for processing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ImageUrl {
    /// Split a `data:<mime>;base64,<data>` URL into mime type and payload
    #[must_use]
    pub fn as_data_url(&self) -> Option<(String, String)> {
        let without_prefix = self.url.strip_prefix("data:")?;
        let (meta, data) = without_prefix.split_once(',')?;
        let mime_type = meta.strip_suffix(";base64").unwrap_or(meta);
        Some((mime_type.to_string(), data.to_string()))
    }

    /// Build a data URL from mime type and base64 payload
    #[must_use]
    pub fn from_inline(mime_type: &str, data: &str) -> Self {
        Self {
            url: format!("data:{mime_type};base64,{data}"),
            detail: None,
        }
    }
}

/// Tool/function definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool type (currently only "function" is supported)
    #[serde(rename = "type", default = "function_type")]
    pub tool_type: String,
    /// Function definition
    pub function: FunctionDefinition,
}

fn function_type() -> String {
    "function".to_string()
}

impl ToolDefinition {
    /// Function tool shortcut
    #[must_use]
    pub fn function(
        name: impl Into<String>,
        description: Option<String>,
        parameters: Option<Value>,
    ) -> Self {
        Self {
            tool_type: function_type(),
            function: FunctionDefinition {
                name: name.into(),
                description,
                parameters,
            },
        }
    }
}

/// Function definition for tools
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDefinition {
    /// Function name
    pub name: String,
    /// Function description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Function parameters (JSON Schema)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
}

/// Tool call made by the assistant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique ID for this tool call
    pub id: String,
    /// Tool type
    #[serde(rename = "type", default = "function_type")]
    pub tool_type: String,
    /// Function call details
    pub function: FunctionCall,
}

impl ToolCall {
    /// Function call shortcut
    #[must_use]
    pub fn function(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            tool_type: function_type(),
            function: FunctionCall {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }

    /// Arguments parsed as JSON; unparseable arguments are kept as a string value
    #[must_use]
    pub fn arguments_value(&self) -> Value {
        parse_arguments(&self.function.arguments)
    }
}

/// Parse a tool argument string into JSON, falling back to an empty object
/// for blank input and to the raw string for anything unparseable
#[must_use]
pub fn parse_arguments(arguments: &str) -> Value {
    if arguments.trim().is_empty() {
        return json!({});
    }
    serde_json::from_str(arguments).unwrap_or_else(|_| Value::String(arguments.to_string()))
}

/// Function call details
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCall {
    /// Function name
    pub name: String,
    /// Function arguments as JSON string
    #[serde(default)]
    pub arguments: String,
}

/// Tool choice, in canonical (OpenAI) vocabulary.
///
/// Anthropic's `any` is the same thing as OpenAI's `required`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolChoice {
    /// Model decides
    Auto,
    /// Tools disabled
    None,
    /// Model must call some tool
    Required,
    /// Model must call this function
    Function {
        /// Function name
        name: String,
    },
}

impl ToolChoice {
    /// Parse the OpenAI wire form; returns `None` for anything unrecognised
    #[must_use]
    pub fn from_openai(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => match s.as_str() {
                "auto" => Some(Self::Auto),
                "none" => Some(Self::None),
                "required" => Some(Self::Required),
                _ => None,
            },
            Value::Object(obj) => {
                let name = obj
                    .get("function")
                    .and_then(|f| f.get("name"))
                    .or_else(|| obj.get("name"))
                    .and_then(Value::as_str)?;
                Some(Self::Function {
                    name: name.to_string(),
                })
            }
            _ => None,
        }
    }

    /// Render the OpenAI wire form
    #[must_use]
    pub fn to_openai(&self) -> Value {
        match self {
            Self::Auto => json!("auto"),
            Self::None => json!("none"),
            Self::Required => json!("required"),
            Self::Function { name } => json!({"type": "function", "function": {"name": name}}),
        }
    }
}

impl Serialize for ToolChoice {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_openai().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ToolChoice {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_openai(&value)
            .ok_or_else(|| D::Error::custom(format!("unsupported tool_choice: {value}")))
    }
}

/// Extended reasoning ("thinking") request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReasoningConfig {
    /// Effort level: `low`, `medium`, `high`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effort: Option<String>,
    /// Explicit thinking token budget
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget_tokens: Option<u32>,
}

impl ReasoningConfig {
    /// Whether reasoning is actually requested
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.budget_tokens.is_some_and(|b| b > 0)
            || self.effort.as_deref().is_some_and(|e| e != "none")
    }

    /// Token budget, derived from effort when no explicit budget was given
    #[must_use]
    pub fn resolved_budget(&self) -> u32 {
        if let Some(budget) = self.budget_tokens {
            return budget;
        }
        match self.effort.as_deref() {
            Some("low" | "minimal") => 1_024,
            Some("high") => 16_384,
            _ => 4_096,
        }
    }

    /// Effort level, derived from the budget when no explicit effort was given
    #[must_use]
    pub fn resolved_effort(&self) -> &str {
        if let Some(effort) = self.effort.as_deref() {
            return effort;
        }
        match self.budget_tokens {
            Some(b) if b <= 2_048 => "low",
            Some(b) if b >= 12_000 => "high",
            _ => "medium",
        }
    }
}
