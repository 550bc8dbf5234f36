//! Server-sent event framing.
//!
//! [`SseBuffer`] turns arbitrarily split network chunks into complete lines. It
//! carries two things between chunks: the undecoded bytes of a trailing,
//! incomplete UTF-8 code point and the text of a trailing line that has no
//! terminating newline yet. Nothing is decoded until it forms whole code points,
//! so a chunk boundary never produces replacement characters.

use bytes::Bytes;
use serde_json::Value;

/// Byte and line carry buffer for one upstream connection
#[derive(Debug, Default)]
pub struct SseBuffer {
    pending_bytes: Vec<u8>,
    pending_line: String,
}

impl SseBuffer {
    /// Create an empty buffer
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk, returning every line it completes (terminators removed)
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let text = self.decode(chunk);
        self.pending_line.push_str(&text);

        let mut lines = Vec::new();
        while let Some(pos) = self.pending_line.find('\n') {
            let mut line: String = self.pending_line.drain(..=pos).collect();
            line.pop();
            if line.ends_with('\r') {
                line.pop();
            }
            lines.push(line);
        }
        lines
    }

    /// Flush at end of input: the unterminated last line, if any
    pub fn finish(&mut self) -> Option<String> {
        if !self.pending_bytes.is_empty() {
            // A truncated code point at close can never complete
            let tail = String::from_utf8_lossy(&self.pending_bytes).into_owned();
            self.pending_bytes.clear();
            self.pending_line.push_str(&tail);
        }
        let line = std::mem::take(&mut self.pending_line);
        let line = line.strip_suffix('\r').map(str::to_string).unwrap_or(line);
        (!line.is_empty()).then_some(line)
    }

    /// Bytes held back waiting for the rest of a code point
    #[must_use]
    pub fn pending_bytes(&self) -> usize {
        self.pending_bytes.len()
    }

    /// Whether nothing is carried over
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending_bytes.is_empty() && self.pending_line.is_empty()
    }

    fn decode(&mut self, chunk: &[u8]) -> String {
        let mut bytes = std::mem::take(&mut self.pending_bytes);
        bytes.extend_from_slice(chunk);

        let mut out = String::with_capacity(bytes.len());
        let mut rest: &[u8] = &bytes;
        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    out.push_str(valid);
                    break;
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    // valid_up_to guarantees this prefix is UTF-8
                    out.push_str(&String::from_utf8_lossy(valid));
                    match e.error_len() {
                        // Incomplete sequence at the end: wait for more bytes
                        None => {
                            self.pending_bytes = after.to_vec();
                            break;
                        }
                        // Genuinely invalid bytes
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[len..];
                        }
                    }
                }
            }
        }
        out
    }
}

/// A classified SSE line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SseLine<'a> {
    /// `data:` payload
    Data(&'a str),
    /// `event:` name
    Event(&'a str),
    /// Blank line ending an event
    Blank,
    /// Comment, `id:`, `retry:` or unknown field
    Other,
}

impl<'a> SseLine<'a> {
    /// Classify a line
    #[must_use]
    pub fn parse(line: &'a str) -> Self {
        if line.is_empty() {
            return Self::Blank;
        }
        if let Some(data) = line.strip_prefix("data:") {
            return Self::Data(data.strip_prefix(' ').unwrap_or(data));
        }
        if let Some(event) = line.strip_prefix("event:") {
            return Self::Event(event.trim());
        }
        Self::Other
    }
}

/// One outgoing SSE event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    /// `event:` name
    pub event: Option<String>,
    /// `data:` payload (single line)
    pub data: String,
}

impl SseFrame {
    /// Frame with a JSON payload
    #[must_use]
    pub fn json(event: Option<&str>, payload: &Value) -> Self {
        Self {
            event: event.map(str::to_string),
            data: payload.to_string(),
        }
    }

    /// Frame named after the payload's `type` field, as Anthropic and Responses streams are
    #[must_use]
    pub fn typed(payload: &Value) -> Self {
        Self::json(payload.get("type").and_then(Value::as_str), payload)
    }

    /// OpenAI terminator
    #[must_use]
    pub fn done() -> Self {
        Self {
            event: None,
            data: "[DONE]".to_string(),
        }
    }

    /// Wire bytes
    #[must_use]
    pub fn to_bytes(&self) -> Bytes {
        let mut out = String::with_capacity(self.data.len() + 32);
        if let Some(event) = &self.event {
            out.push_str("event: ");
            out.push_str(event);
            out.push('\n');
        }
        out.push_str("data: ");
        out.push_str(&self.data);
        out.push_str("\n\n");
        Bytes::from(out)
    }
}
