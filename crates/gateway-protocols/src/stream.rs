//! Upstream byte stream to canonical events, and canonical events to caller bytes.

use crate::adapter::{DecodeStatus, StreamDecoder, StreamEncoder};
use crate::sse::{SseBuffer, SseLine};
use async_stream::stream;
use futures::StreamExt;
use gateway_core::{ByteStream, EventStream, OutputPart, StreamEvent, StreamFailure};
use serde_json::Value;
use tracing::{debug, warn};

/// Mutates each parsed payload before it is decoded
pub type PayloadHook = Box<dyn FnMut(&mut Value) + Send>;

/// Converts raw SSE bytes from one upstream into canonical events.
///
/// The `data:` lines of one event are joined with `\n` and parsed as one
/// payload. A payload that is not valid JSON is counted and skipped; it never
/// affects neighbouring events.
pub struct SseNormalizer {
    buffer: SseBuffer,
    decoder: Box<dyn StreamDecoder>,
    hook: Option<PayloadHook>,
    event_name: Option<String>,
    data: Vec<String>,
    emitted: usize,
    skipped: usize,
    finished: bool,
}

impl SseNormalizer {
    /// Create a normalizer around a protocol decoder
    #[must_use]
    pub fn new(decoder: Box<dyn StreamDecoder>) -> Self {
        Self {
            buffer: SseBuffer::new(),
            decoder,
            hook: None,
            event_name: None,
            data: Vec::new(),
            emitted: 0,
            skipped: 0,
            finished: false,
        }
    }

    /// Apply `hook` to every payload before decoding
    #[must_use]
    pub fn with_payload_hook(mut self, hook: PayloadHook) -> Self {
        self.hook = Some(hook);
        self
    }

    /// Feed one network chunk
    pub fn push(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        let mut out = Vec::new();
        if self.finished {
            return out;
        }
        for line in self.buffer.push(chunk) {
            self.handle_line(&line, &mut out);
            if self.finished {
                break;
            }
        }
        out
    }

    /// Upstream closed the connection
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        let mut out = Vec::new();
        if self.finished {
            return out;
        }
        if let Some(line) = self.buffer.finish() {
            self.handle_line(&line, &mut out);
        }
        self.dispatch(&mut out);
        if !self.finished {
            self.terminate(&mut out);
        }
        out
    }

    /// Upstream connection failed
    pub fn fail(&mut self, message: impl Into<String>) -> StreamEvent {
        self.finished = true;
        StreamEvent::Error(StreamFailure {
            message: message.into(),
            emitted: self.emitted,
            skipped_events: self.skipped,
        })
    }

    /// Whether a terminal event was produced
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Content events produced so far
    #[must_use]
    pub fn emitted(&self) -> usize {
        self.emitted
    }

    /// Malformed events skipped so far
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    fn handle_line(&mut self, line: &str, out: &mut Vec<StreamEvent>) {
        match SseLine::parse(line) {
            SseLine::Event(name) => self.event_name = Some(name.to_string()),
            SseLine::Blank => {
                self.dispatch(out);
                self.event_name = None;
            }
            SseLine::Other => {}
            SseLine::Data(data) => self.data.push(data.to_string()),
        }
    }

    /// End of one SSE event: its `data:` lines joined with `\n`
    fn dispatch(&mut self, out: &mut Vec<StreamEvent>) {
        let lines = std::mem::take(&mut self.data);
        if lines.is_empty() {
            return;
        }
        let joined = lines.join("\n");
        if lines.len() == 1 || serde_json::from_str::<Value>(&joined).is_ok() {
            self.handle_payload(&joined, out);
            return;
        }
        // Upstreams that omit blank lines between events
        for line in lines {
            if self.finished {
                return;
            }
            self.handle_payload(&line, out);
        }
    }

    fn handle_payload(&mut self, data: &str, out: &mut Vec<StreamEvent>) {
        let data = data.trim();
        if data.is_empty() || self.finished {
            return;
        }
        if data == "[DONE]" {
            self.terminate(out);
            return;
        }
        let mut payload: Value = match serde_json::from_str(data) {
            Ok(v) => v,
            Err(e) => {
                self.skipped += 1;
                warn!(
                    bytes = data.len(),
                    error = %e,
                    skipped = self.skipped,
                    "Skipping malformed SSE event"
                );
                return;
            }
        };
        if let Some(hook) = self.hook.as_mut() {
            hook(&mut payload);
        }

        let mut parts = Vec::new();
        let status = self
            .decoder
            .decode(self.event_name.as_deref(), payload, &mut parts);
        self.emit(parts, out);

        match status {
            DecodeStatus::Continue => {}
            DecodeStatus::Finished => self.terminate(out),
            DecodeStatus::Failed(message) => {
                debug!(message = %message, "Upstream reported an in-band error");
                out.push(self.fail(message));
            }
        }
    }

    fn emit(&mut self, parts: Vec<OutputPart>, out: &mut Vec<StreamEvent>) {
        self.emitted += parts.len();
        out.extend(parts.into_iter().map(StreamEvent::Content));
    }

    fn terminate(&mut self, out: &mut Vec<StreamEvent>) {
        let mut parts = Vec::new();
        let mut done = self.decoder.finish(&mut parts);
        self.emit(parts, out);
        done.skipped_events = self.skipped;
        if self.skipped > 0 {
            warn!(skipped = self.skipped, "Stream completed with skipped events");
        }
        self.finished = true;
        out.push(StreamEvent::Done(done));
    }
}

/// Drive a normalizer over an upstream byte stream.
///
/// The returned sequence is finite: it always ends with exactly one `Done` or
/// `Error` event, after which the upstream stream is dropped.
pub fn normalize_stream(mut bytes: ByteStream, mut normalizer: SseNormalizer) -> EventStream {
    Box::pin(stream! {
        while let Some(chunk) = bytes.next().await {
            match chunk {
                Ok(chunk) => {
                    for event in normalizer.push(&chunk) {
                        yield event;
                    }
                    if normalizer.is_finished() {
                        return;
                    }
                }
                Err(e) => {
                    warn!(error = %e, emitted = normalizer.emitted(), "Upstream stream failed");
                    yield normalizer.fail(e.to_string());
                    return;
                }
            }
        }
        for event in normalizer.finish() {
            yield event;
        }
    })
}

/// Serialize canonical events into caller SSE bytes
pub fn encode_stream(mut events: EventStream, mut encoder: Box<dyn StreamEncoder>) -> ByteStream {
    Box::pin(stream! {
        while let Some(event) = events.next().await {
            let terminal = event.is_terminal();
            for frame in encoder.encode(&event) {
                yield Ok(frame.to_bytes());
            }
            if terminal {
                return;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::adapter_for;
    use gateway_core::{EventKind, Protocol};
    use proptest::prelude::*;

    fn openai_normalizer() -> SseNormalizer {
        SseNormalizer::new(adapter_for(Protocol::OpenAiChat).stream_decoder())
    }

    fn chunk(content: &str) -> String {
        format!(
            "data: {}\n\n",
            serde_json::json!({"choices": [{"index": 0, "delta": {"content": content}}]})
        )
    }

    fn sample_stream() -> String {
        let mut s = String::new();
        s.push_str(&chunk("Hé"));
        s.push_str(&chunk("llo 世界 🎉"));
        s.push_str("data: {not json\n\n");
        s.push_str(&chunk("!"));
        s.push_str("data: {\"choices\":[{\"index\":0,\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n");
        s.push_str("data: [DONE]\n\n");
        s
    }

    fn run_split(bytes: &[u8], cuts: &[usize]) -> Vec<StreamEvent> {
        let mut normalizer = openai_normalizer();
        let mut events = Vec::new();
        let mut start = 0;
        for &cut in cuts {
            let cut = cut.clamp(start, bytes.len());
            events.extend(normalizer.push(&bytes[start..cut]));
            start = cut;
        }
        events.extend(normalizer.push(&bytes[start..]));
        events.extend(normalizer.finish());
        events
    }

    #[test]
    fn test_malformed_line_is_isolated() {
        let events = run_split(sample_stream().as_bytes(), &[]);
        let texts: Vec<_> = events
            .iter()
            .filter(|e| e.kind() == EventKind::Text)
            .collect();
        assert_eq!(texts.len(), 3);
        assert!(!events.iter().any(|e| e.kind() == EventKind::Error));

        match events.last() {
            Some(StreamEvent::Done(done)) => assert_eq!(done.skipped_events, 1),
            other => panic!("expected done, got {other:?}"),
        }
    }

    #[test]
    fn test_single_malformed_among_n_yields_n_minus_one() {
        let n = 6;
        let mut s = String::new();
        for i in 0..n {
            if i == 3 {
                s.push_str("data: {\"choices\": [\n\n");
            } else {
                s.push_str(&chunk(&i.to_string()));
            }
        }
        let events = run_split(s.as_bytes(), &[]);
        let content = events.iter().filter(|e| !e.is_terminal()).count();
        assert_eq!(content, n - 1);
        assert!(matches!(events.last(), Some(StreamEvent::Done(_))));
    }

    #[test]
    fn test_multi_line_data_is_joined() {
        let mut normalizer = openai_normalizer();
        let events = normalizer.push(
            b"data: {\"choices\":[{\"index\":0,\ndata: \"delta\":{\"content\":\"joined\"}}]}\n\n",
        );
        assert_eq!(events, [StreamEvent::text("joined")]);
        assert_eq!(normalizer.skipped(), 0);
    }

    #[test]
    fn test_events_without_blank_lines_still_decode() {
        let mut normalizer = openai_normalizer();
        let mut body = String::new();
        for content in ["a", "b"] {
            body.push_str(&chunk(content).replace("\n\n", "\n"));
        }
        body.push_str("data: [DONE]\n");
        let mut events = normalizer.push(body.as_bytes());
        events.extend(normalizer.finish());
        assert_eq!(events[0], StreamEvent::text("a"));
        assert_eq!(events[1], StreamEvent::text("b"));
        assert!(matches!(events.last(), Some(StreamEvent::Done(_))));
    }

    #[test]
    fn test_connection_close_without_marker_is_done() {
        let mut normalizer = openai_normalizer();
        let mut events = normalizer.push(chunk("a").as_bytes());
        events.extend(normalizer.finish());
        assert!(matches!(events.last(), Some(StreamEvent::Done(_))));
    }

    #[test]
    fn test_failure_reports_progress() {
        let mut normalizer = openai_normalizer();
        let _ = normalizer.push(chunk("a").as_bytes());
        let _ = normalizer.push(chunk("b").as_bytes());
        match normalizer.fail("reset") {
            StreamEvent::Error(failure) => assert_eq!(failure.emitted, 2),
            other => panic!("unexpected {other:?}"),
        }
        assert!(normalizer.push(chunk("c").as_bytes()).is_empty());
    }

    #[test]
    fn test_payload_hook_runs_before_decode() {
        let mut normalizer = openai_normalizer().with_payload_hook(Box::new(|v: &mut Value| {
            if let Some(delta) = v.pointer_mut("/choices/0/delta") {
                if let Some(r) = delta.get("reasoning").cloned() {
                    delta["reasoning_content"] = r;
                }
            }
        }));
        let events = normalizer
            .push(b"data: {\"choices\":[{\"index\":0,\"delta\":{\"reasoning\":\"hmm\"}}]}\n\n");
        assert_eq!(events[0].kind(), EventKind::Thought);
    }

    #[tokio::test]
    async fn test_normalize_stream_ends_with_one_terminal() {
        let chunks: Vec<Result<bytes::Bytes, gateway_core::GatewayError>> = vec![
            Ok(bytes::Bytes::from(chunk("x"))),
            Err(gateway_core::GatewayError::streaming("reset")),
            Ok(bytes::Bytes::from(chunk("never"))),
        ];
        let events: Vec<_> = normalize_stream(
            Box::pin(futures::stream::iter(chunks)),
            openai_normalizer(),
        )
        .collect()
        .await;
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[1], StreamEvent::Error(f) if f.emitted == 1));
    }

    proptest! {
        #[test]
        fn prop_arbitrary_splits_match_unsplit(cuts in proptest::collection::vec(0usize..400, 0..12)) {
            let stream = sample_stream();
            let bytes = stream.as_bytes();
            let mut cuts: Vec<usize> = cuts.into_iter().map(|c| c % (bytes.len() + 1)).collect();
            cuts.sort_unstable();

            let whole = run_split(bytes, &[]);
            let split = run_split(bytes, &cuts);
            prop_assert_eq!(whole, split);
        }
    }
}
