//! Canonical response model.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Canonical, protocol-neutral completion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalResponse {
    /// Response id
    pub id: String,
    /// Model that produced the response
    pub model: String,
    /// Unix timestamp of creation
    pub created: i64,
    /// Output parts in arrival order
    pub parts: Vec<OutputPart>,
    /// Why generation stopped
    pub finish_reason: Option<FinishReason>,
    /// Token usage
    pub usage: Option<Usage>,
}

impl CanonicalResponse {
    /// Create an empty response
    #[must_use]
    pub fn new(id: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            model: model.into(),
            created: chrono::Utc::now().timestamp(),
            parts: Vec::new(),
            finish_reason: None,
            usage: None,
        }
    }

    /// All text parts concatenated
    #[must_use]
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                OutputPart::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    /// All thought parts concatenated, `None` when there are none
    #[must_use]
    pub fn thoughts(&self) -> Option<String> {
        let thoughts: String = self
            .parts
            .iter()
            .filter_map(|p| match p {
                OutputPart::Thought { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect();
        (!thoughts.is_empty()).then_some(thoughts)
    }

    /// Tool calls in order
    pub fn tool_calls(&self) -> impl Iterator<Item = (&str, &str, &str)> {
        self.parts.iter().filter_map(|p| match p {
            OutputPart::ToolCall {
                id,
                name,
                arguments,
            } => Some((id.as_str(), name.as_str(), arguments.as_str())),
            _ => None,
        })
    }

    /// Append a part, merging adjacent text or thought deltas
    pub fn push_part(&mut self, part: OutputPart) {
        match (self.parts.last_mut(), part) {
            (Some(OutputPart::Text { text }), OutputPart::Text { text: more }) => {
                text.push_str(&more);
            }
            (
                Some(OutputPart::Thought { text, signature }),
                OutputPart::Thought {
                    text: more,
                    signature: sig,
                },
            ) => {
                text.push_str(&more);
                if sig.is_some() {
                    *signature = sig;
                }
            }
            (_, part) => self.parts.push(part),
        }
    }
}

/// One unit of model output.
///
/// Text and thought parts arrive as deltas in streams; tool calls are always whole.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutputPart {
    /// Visible text
    Text {
        /// Text
        text: String,
    },
    /// Reasoning trace
    Thought {
        /// Trace text
        text: String,
        /// Opaque signature some providers require to be echoed back
        #[serde(default, skip_serializing_if = "Option::is_none")]
        signature: Option<String>,
    },
    /// Function/tool invocation
    ToolCall {
        /// Call id
        id: String,
        /// Function name
        name: String,
        /// Arguments as a JSON string
        arguments: String,
    },
    /// Result of a tool invocation
    ToolResult {
        /// Id of the call this answers
        call_id: String,
        /// Function name, when known
        name: Option<String>,
        /// Result payload
        content: Value,
    },
    /// Code for a code interpreter
    Code {
        /// Language
        language: String,
        /// Source
        code: String,
    },
    /// Output of executed code
    CodeResult {
        /// Outcome label (`OUTCOME_OK` etc.)
        outcome: String,
        /// Captured output
        output: String,
    },
}

impl OutputPart {
    /// Text shortcut
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Thought shortcut
    #[must_use]
    pub fn thought(text: impl Into<String>) -> Self {
        Self::Thought {
            text: text.into(),
            signature: None,
        }
    }

    /// Tool call shortcut
    #[must_use]
    pub fn tool_call(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self::ToolCall {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }

    /// Render a part that the target protocol has no slot for as plain text
    #[must_use]
    pub fn as_fallback_text(&self) -> Option<String> {
        match self {
            Self::Text { text } => Some(text.clone()),
            Self::Thought { .. } | Self::ToolCall { .. } => None,
            Self::ToolResult { content, .. } => Some(match content {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            }),
            Self::Code { language, code } => {
                Some(format!("```{}\n{code}\n```", language.to_ascii_lowercase()))
            }
            Self::CodeResult { output, .. } => Some(format!("```\n{output}\n```")),
        }
    }
}

/// Reason the completion finished
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Natural stop or stop sequence
    Stop,
    /// Token limit reached
    Length,
    /// Model requested tool calls
    ToolCalls,
    /// Content was filtered
    ContentFilter,
    /// Upstream reported an error
    Error,
}

impl FinishReason {
    /// OpenAI vocabulary
    #[must_use]
    pub fn as_openai(self) -> &'static str {
        match self {
            Self::Stop | Self::Error => "stop",
            Self::Length => "length",
            Self::ToolCalls => "tool_calls",
            Self::ContentFilter => "content_filter",
        }
    }

    /// Parse OpenAI vocabulary
    #[must_use]
    pub fn from_openai(value: &str) -> Self {
        match value {
            "length" => Self::Length,
            "tool_calls" | "function_call" => Self::ToolCalls,
            "content_filter" => Self::ContentFilter,
            _ => Self::Stop,
        }
    }
}

/// Token usage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Prompt tokens
    pub prompt_tokens: u32,
    /// Completion tokens
    pub completion_tokens: u32,
    /// Total tokens
    pub total_tokens: u32,
}

impl Usage {
    /// Build usage with the total computed
    #[must_use]
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens.saturating_add(completion_tokens),
        }
    }
}
