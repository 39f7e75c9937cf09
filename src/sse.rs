//! Streaming decode: turns a byte stream of server-sent events (or bare
//! newline-delimited JSON) into an ordered sequence of text deltas terminated by a
//! single terminal event. Adapters supply a [`StreamTransformer`] for their wire
//! format; the buffering and line-assembly logic below is shared.

use crate::error::RouterError;
use crate::response::{FinishReason, Usage};

/// One decoded unit of a stream: either a text delta to hand to the caller's
/// `onChunk`, or the terminal event carrying usage/finish data.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    Delta(String),
    Done {
        usage: Option<Usage>,
        finish_reason: FinishReason,
    },
}

/// Provider-specific translation from a single SSE `data:` payload (or NDJSON line)
/// into zero or more [`StreamEvent`]s. Implementors only need to understand their
/// own wire shape; buffering across partial reads is handled by [`SseDecoder`].
pub trait StreamTransformer: Send {
    fn provider_name(&self) -> &'static str;

    /// Whether `data` marks the end of the stream (e.g. OpenAI's literal `[DONE]`).
    fn is_end_marker(&self, data: &str) -> bool {
        data.trim() == "[DONE]"
    }

    fn transform(&mut self, data: &str) -> Result<Vec<StreamEvent>, RouterError>;

    /// Called once the wire stream closes without an explicit terminal event, so
    /// the decoder can still emit exactly one `Done`.
    fn finalize(&mut self) -> StreamEvent {
        StreamEvent::Done {
            usage: None,
            finish_reason: FinishReason::Stop,
        }
    }
}

/// Buffers raw bytes into complete `data: ...\n\n` events and feeds each to a
/// [`StreamTransformer`]. One instance per in-flight streaming request.
pub struct SseDecoder<T: StreamTransformer> {
    transformer: T,
    buffer: String,
    pending_data: String,
    done: bool,
}

impl<T: StreamTransformer> SseDecoder<T> {
    pub fn new(transformer: T) -> Self {
        Self {
            transformer,
            buffer: String::new(),
            pending_data: String::new(),
            done: false,
        }
    }

    /// Feed newly-received bytes, returning every [`StreamEvent`] they complete.
    /// Incomplete trailing lines remain buffered for the next call.
    pub fn push(&mut self, bytes: &[u8]) -> Result<Vec<StreamEvent>, RouterError> {
        if self.done {
            return Ok(Vec::new());
        }

        self.buffer.push_str(&String::from_utf8_lossy(bytes));

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.find('\n') {
            let line = self.buffer[..pos].trim_end_matches('\r').to_string();
            self.buffer.drain(..=pos);
            self.process_line(&line, &mut events)?;
        }
        Ok(events)
    }

    fn process_line(&mut self, line: &str, events: &mut Vec<StreamEvent>) -> Result<(), RouterError> {
        if line.is_empty() {
            if !self.pending_data.is_empty() {
                let data = std::mem::take(&mut self.pending_data);
                self.emit(&data, events)?;
            }
            return Ok(());
        }

        if let Some(rest) = line.strip_prefix("data:") {
            let value = rest.trim_start();
            if !self.pending_data.is_empty() {
                self.pending_data.push('\n');
            }
            self.pending_data.push_str(value);
            return Ok(());
        }

        // Bare NDJSON line (no "data:" prefix): treat the whole line as one event.
        if !line.starts_with("event:") && !line.starts_with("id:") && !line.starts_with(':') {
            self.emit(line, events)?;
        }
        Ok(())
    }

    fn emit(&mut self, data: &str, events: &mut Vec<StreamEvent>) -> Result<(), RouterError> {
        if self.transformer.is_end_marker(data) {
            self.done = true;
            events.push(self.transformer.finalize());
            return Ok(());
        }
        let produced = self.transformer.transform(data)?;
        for event in &produced {
            if matches!(event, StreamEvent::Done { .. }) {
                self.done = true;
            }
        }
        events.extend(produced);
        Ok(())
    }

    /// Call once the underlying byte stream has closed. If no terminal event was
    /// ever seen, synthesizes one so callers always observe exactly one `Done`.
    pub fn close(&mut self) -> Option<StreamEvent> {
        if self.done {
            None
        } else {
            self.done = true;
            Some(self.transformer.finalize())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoTransformer;

    impl StreamTransformer for EchoTransformer {
        fn provider_name(&self) -> &'static str {
            "test"
        }

        fn transform(&mut self, data: &str) -> Result<Vec<StreamEvent>, RouterError> {
            let value: serde_json::Value = serde_json::from_str(data)
                .map_err(|e| RouterError::unknown("test", e.to_string()))?;
            if let Some(text) = value.get("delta").and_then(|v| v.as_str()) {
                Ok(vec![StreamEvent::Delta(text.to_string())])
            } else {
                Ok(vec![])
            }
        }
    }

    #[test]
    fn decodes_deltas_across_partial_reads() {
        let mut decoder = SseDecoder::new(EchoTransformer);
        let mut events = decoder.push(b"data: {\"delta\": \"he").unwrap();
        assert!(events.is_empty());

        events = decoder.push(b"llo\"}\n\n").unwrap();
        assert_eq!(events.len(), 1);
        match &events[0] {
            StreamEvent::Delta(text) => assert_eq!(text, "hello"),
            _ => panic!("expected delta"),
        }
    }

    #[test]
    fn end_marker_emits_single_done() {
        let mut decoder = SseDecoder::new(EchoTransformer);
        let events = decoder.push(b"data: [DONE]\n\n").unwrap();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], StreamEvent::Done { .. }));

        let more = decoder.push(b"data: {\"delta\": \"ignored\"}\n\n").unwrap();
        assert!(more.is_empty());
    }

    #[test]
    fn close_without_terminal_event_synthesizes_done() {
        let mut decoder = SseDecoder::new(EchoTransformer);
        decoder.push(b"data: {\"delta\": \"hi\"}\n\n").unwrap();
        let done = decoder.close();
        assert!(matches!(done, Some(StreamEvent::Done { .. })));
        assert!(decoder.close().is_none());
    }

    #[test]
    fn bare_ndjson_line_without_data_prefix() {
        let mut decoder = SseDecoder::new(EchoTransformer);
        let events = decoder.push(b"{\"delta\": \"hey\"}\n").unwrap();
        assert_eq!(events.len(), 1);
    }
}
