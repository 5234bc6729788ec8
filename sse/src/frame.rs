use log::*;
use serde_json::Value;

/// Event name used when a frame carries no `event:` line.
pub const DEFAULT_EVENT: &str = "message";

/// Payload used when a frame carries no `data:` line.
const DEFAULT_DATA: &str = "{}";

/// A single decoded server-sent event.
#[derive(Debug, Clone, PartialEq)]
pub struct EventFrame {
    pub event: String,
    pub data: Value,
}

/// Incremental decoder turning raw stream chunks into [`EventFrame`]s.
///
/// Chunks may split anywhere: inside a UTF-8 sequence, inside a line, or between
/// a frame's lines. Bytes are held back until they complete a character, and
/// characters until they complete a line. A frame is dispatched on the blank line
/// that ends it. Frames whose data is not valid JSON are dropped without error so
/// one bad frame cannot end a long-lived stream.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    pending_bytes: Vec<u8>,
    line: String,
    last_was_cr: bool,
    event: Option<String>,
    data: Vec<String>,
    has_fields: bool,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one chunk, returning every frame it completed.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<EventFrame> {
        self.pending_bytes.extend_from_slice(chunk);
        let text = self.take_decoded_text();

        let mut frames = Vec::new();
        for ch in text.chars() {
            match ch {
                '\n' if self.last_was_cr => {
                    // Second half of a CRLF; the line already ended on the CR.
                    self.last_was_cr = false;
                }
                '\r' | '\n' => {
                    self.last_was_cr = ch == '\r';
                    let line = std::mem::take(&mut self.line);
                    if let Some(frame) = self.process_line(&line) {
                        frames.push(frame);
                    }
                }
                _ => {
                    self.last_was_cr = false;
                    self.line.push(ch);
                }
            }
        }
        frames
    }

    /// Ends the stream, dispatching a final frame that was never terminated by a
    /// blank line.
    pub fn finish(&mut self) -> Option<EventFrame> {
        if !self.pending_bytes.is_empty() {
            let rest = std::mem::take(&mut self.pending_bytes);
            self.line.push_str(&String::from_utf8_lossy(&rest));
        }
        if !self.line.is_empty() {
            let line = std::mem::take(&mut self.line);
            // A field line can't complete a frame, only a blank line can.
            let _ = self.process_line(&line);
        }
        self.dispatch()
    }

    /// Removes and returns the longest valid UTF-8 prefix of the pending bytes.
    /// An incomplete trailing sequence stays pending; invalid bytes are replaced.
    fn take_decoded_text(&mut self) -> String {
        let mut text = String::new();
        loop {
            match std::str::from_utf8(&self.pending_bytes) {
                Ok(valid) => {
                    text.push_str(valid);
                    self.pending_bytes.clear();
                    return text;
                }
                Err(err) => {
                    let valid_up_to = err.valid_up_to();
                    text.push_str(&String::from_utf8_lossy(&self.pending_bytes[..valid_up_to]));
                    match err.error_len() {
                        Some(invalid_len) => {
                            text.push(char::REPLACEMENT_CHARACTER);
                            self.pending_bytes.drain(..valid_up_to + invalid_len);
                        }
                        None => {
                            self.pending_bytes.drain(..valid_up_to);
                            return text;
                        }
                    }
                }
            }
        }
    }

    fn process_line(&mut self, line: &str) -> Option<EventFrame> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => {
                self.event = Some(value.to_string());
                self.has_fields = true;
            }
            "data" => {
                self.data.push(value.to_string());
                self.has_fields = true;
            }
            // id and retry are meaningful only for replay, which is not supported.
            _ => trace!("Ignoring SSE field {field}"),
        }
        None
    }

    fn dispatch(&mut self) -> Option<EventFrame> {
        if !std::mem::take(&mut self.has_fields) {
            return None;
        }

        let event = self
            .event
            .take()
            .filter(|e| !e.is_empty())
            .unwrap_or_else(|| DEFAULT_EVENT.to_string());
        let data = std::mem::take(&mut self.data);
        let raw = if data.is_empty() {
            DEFAULT_DATA.to_string()
        } else {
            data.join("\n")
        };

        match serde_json::from_str(&raw) {
            Ok(data) => Some(EventFrame { event, data }),
            Err(err) => {
                debug!("Dropping {event} frame with malformed JSON data: {err}");
                None
            }
        }
    }
}
