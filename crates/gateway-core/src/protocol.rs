//! Closed set of wire protocols spoken by callers and upstreams.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A wire protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Protocol {
    /// OpenAI Chat Completions (`/v1/chat/completions`)
    #[serde(rename = "openai-chat", alias = "openai")]
    OpenAiChat,
    /// OpenAI Responses (`/v1/responses`)
    #[serde(rename = "openai-responses", alias = "responses")]
    OpenAiResponses,
    /// Anthropic Messages (`/v1/messages`)
    #[serde(alias = "anthropic")]
    AnthropicMessages,
    /// Gemini generateContent / streamGenerateContent
    Gemini,
}

impl Protocol {
    /// All protocols, in detection tie-break order
    pub const ALL: [Self; 4] = [
        Self::OpenAiChat,
        Self::OpenAiResponses,
        Self::AnthropicMessages,
        Self::Gemini,
    ];

    /// Stable name used in config and metadata
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OpenAiChat => "openai-chat",
            Self::OpenAiResponses => "openai-responses",
            Self::AnthropicMessages => "anthropic-messages",
            Self::Gemini => "gemini",
        }
    }

    /// Endpoint paths that identify the protocol when no config overrides them
    #[must_use]
    pub fn default_endpoints(self) -> &'static [&'static str] {
        match self {
            Self::OpenAiChat => &["/v1/chat/completions", "/v1/openai/chat/completions"],
            Self::OpenAiResponses => &["/v1/responses", "/v1/openai/responses"],
            Self::AnthropicMessages => &["/v1/messages", "/v1/anthropic/messages"],
            Self::Gemini => &["/v1beta/models", "/v1/models/", "/v1/gemini"],
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = crate::error::GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai-chat" | "openai" | "chat" => Ok(Self::OpenAiChat),
            "openai-responses" | "responses" => Ok(Self::OpenAiResponses),
            "anthropic-messages" | "anthropic" | "messages" => Ok(Self::AnthropicMessages),
            "gemini" | "google" => Ok(Self::Gemini),
            other => Err(crate::error::GatewayError::configuration(format!(
                "unknown protocol '{other}'"
            ))),
        }
    }
}
