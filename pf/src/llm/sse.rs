//! Server-sent event decoding for streamed chat completions
//!
//! The body is newline-delimited. Only `data: ` lines carry payloads; blank
//! lines, `:` comments and other fields are skipped. A `[DONE]` payload ends
//! the stream. Everything else is a chat-completions chunk whose text lives at
//! `choices[0].delta.content`.
//!
//! Network reads can split a line anywhere, including inside a multi-byte
//! character, so bytes accumulate until a newline arrives. A line is only
//! parsed once it is complete.

use serde::Deserialize;
use tracing::debug;

/// A decoded stream event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    /// Incremental assistant text
    Delta(String),

    /// Provider reported why it stopped (arrives with the last chunk)
    Finish(String),

    /// `[DONE]` sentinel
    Done,
}

/// Incremental line-buffered decoder
#[derive(Debug, Default)]
pub struct EventDecoder {
    buffer: Vec<u8>,
    done: bool,
}

impl EventDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `[DONE]` has been seen; later input is ignored
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Feed one network read and return the events from every line it completed
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        debug!(len = bytes.len(), buffered = self.buffer.len(), "EventDecoder::feed: called");
        let mut events = Vec::new();
        if self.done {
            return events;
        }

        self.buffer.extend_from_slice(bytes);

        let mut start = 0;
        while let Some(offset) = self.buffer[start..].iter().position(|b| *b == b'\n') {
            let end = start + offset;
            let line = String::from_utf8_lossy(&self.buffer[start..end]).into_owned();
            start = end + 1;

            self.decode_line(&line, &mut events);
            if self.done {
                break;
            }
        }
        self.buffer.drain(..start);

        events
    }

    /// Flush a trailing line that never got its newline
    pub fn finish(&mut self) -> Vec<SseEvent> {
        debug!(buffered = self.buffer.len(), "EventDecoder::finish: called");
        let mut events = Vec::new();
        if self.done || self.buffer.is_empty() {
            self.buffer.clear();
            return events;
        }

        let line = String::from_utf8_lossy(&self.buffer).into_owned();
        self.buffer.clear();
        self.decode_line(&line, &mut events);
        events
    }

    fn decode_line(&mut self, raw: &str, events: &mut Vec<SseEvent>) {
        let line = raw.strip_suffix('\r').unwrap_or(raw);

        if line.trim().is_empty() || line.starts_with(':') {
            return;
        }

        let Some(payload) = line.strip_prefix("data: ") else {
            debug!(%line, "EventDecoder::decode_line: ignoring non-data line");
            return;
        };

        let payload = payload.trim();
        if payload == "[DONE]" {
            debug!("EventDecoder::decode_line: done sentinel");
            self.done = true;
            events.push(SseEvent::Done);
            return;
        }

        match serde_json::from_str::<StreamPayload>(payload) {
            Ok(chunk) => {
                if let Some(choice) = chunk.choices.into_iter().next() {
                    if let Some(text) = choice.delta.content
                        && !text.is_empty()
                    {
                        events.push(SseEvent::Delta(text));
                    }
                    if let Some(reason) = choice.finish_reason {
                        events.push(SseEvent::Finish(reason));
                    }
                }
            }
            Err(e) => {
                debug!(error = %e, %payload, "EventDecoder::decode_line: skipping malformed payload");
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct StreamPayload {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}
