//! Canonical stream events.

use crate::error::GatewayError;
use crate::response::{FinishReason, OutputPart, Usage};
use bytes::Bytes;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

/// Raw upstream or caller bytes
pub type ByteStream = BoxStream<'static, Result<Bytes, GatewayError>>;

/// Lazy, finite, non-restartable sequence of canonical events
pub type EventStream = BoxStream<'static, StreamEvent>;

/// Kind of a canonical stream event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Text delta
    Text,
    /// Complete tool call
    ToolCall,
    /// Tool result
    ToolResult,
    /// Reasoning delta
    Thought,
    /// Executable code
    Code,
    /// Code execution output
    CodeResult,
    /// Clean end of stream
    Done,
    /// Stream ended with an error
    Error,
}

/// Terminal information of a clean stream
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoneInfo {
    /// Why generation stopped
    pub finish_reason: Option<FinishReason>,
    /// Token usage, when reported
    pub usage: Option<Usage>,
    /// Malformed upstream events that were skipped
    pub skipped_events: usize,
}

/// Terminal information of a failed stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamFailure {
    /// Description of the failure
    pub message: String,
    /// Content events already emitted before the failure
    pub emitted: usize,
    /// Malformed upstream events that were skipped
    pub skipped_events: usize,
}

/// Canonical stream event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum StreamEvent {
    /// A unit of output
    Content(OutputPart),
    /// Clean termination
    Done(DoneInfo),
    /// Terminal failure
    Error(StreamFailure),
}

impl StreamEvent {
    /// Text delta shortcut
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Content(OutputPart::text(text))
    }

    /// Kind of the event
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Content(part) => match part {
                OutputPart::Text { .. } => EventKind::Text,
                OutputPart::Thought { .. } => EventKind::Thought,
                OutputPart::ToolCall { .. } => EventKind::ToolCall,
                OutputPart::ToolResult { .. } => EventKind::ToolResult,
                OutputPart::Code { .. } => EventKind::Code,
                OutputPart::CodeResult { .. } => EventKind::CodeResult,
            },
            Self::Done(_) => EventKind::Done,
            Self::Error(_) => EventKind::Error,
        }
    }

    /// Whether this event ends the stream
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done(_) | Self::Error(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_kinds() {
        assert_eq!(StreamEvent::text("a").kind(), EventKind::Text);
        assert_eq!(
            StreamEvent::Content(OutputPart::tool_call("c", "x", "{}")).kind(),
            EventKind::ToolCall
        );
        assert!(StreamEvent::Done(DoneInfo::default()).is_terminal());
        assert!(!StreamEvent::text("a").is_terminal());
    }

    #[test]
    fn test_event_serialization_shape() {
        let json = serde_json::to_value(StreamEvent::text("hi")).unwrap();
        assert_eq!(json["type"], "content");
        assert_eq!(json["payload"]["kind"], "text");
        assert_eq!(json["payload"]["text"], "hi");
    }
}
