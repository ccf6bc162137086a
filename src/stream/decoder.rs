//! Incremental `text/event-stream` decoder.
//!
//! Network chunks do not line up with event boundaries: a chunk may hold
//! several events, half a line, or even half of a multi-byte character.
//! The decoder buffers raw bytes until a full line is available and only
//! emits a [`Frame`] once the blank line terminating an event arrives.
//! A line longer than the configured limit is dropped instead of buffered.

use std::time::Duration;

use super::types::Frame;

const BOM: char = '\u{feff}';
const DEFAULT_MAX_LINE_BYTES: usize = 1 << 20;

#[derive(Debug, Default)]
pub struct FrameDecoder {
    /// Bytes not yet terminated by a line break
    buffer: Vec<u8>,
    /// Prefix of `buffer` already searched for a line break
    scanned: usize,
    max_line: usize,
    /// Inside an oversized line; everything up to the next break is dropped
    discarding: bool,
    /// Previous line ended in `\r`; a following `\n` belongs to it
    skip_lf: bool,
    first_line: bool,
    event_type: String,
    data: String,
    frame_id: Option<String>,
    last_event_id: Option<String>,
    retry: Option<Duration>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::with_max_line(DEFAULT_MAX_LINE_BYTES)
    }

    pub fn with_max_line(max_line: usize) -> Self {
        Self {
            first_line: true,
            max_line: max_line.max(1),
            ..Default::default()
        }
    }

    /// Feed one network chunk, returning every frame it completed
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Frame> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        let mut start = 0;

        for i in self.scanned..self.buffer.len() {
            let byte = self.buffer[i];
            if self.skip_lf {
                self.skip_lf = false;
                if byte == b'\n' {
                    start = i + 1;
                    continue;
                }
            }
            if byte == b'\n' || byte == b'\r' {
                self.skip_lf = byte == b'\r';
                if self.discarding {
                    self.discarding = false;
                    start = i + 1;
                    continue;
                }
                let line = String::from_utf8_lossy(&self.buffer[start..i]).into_owned();
                start = i + 1;
                if let Some(frame) = self.process_line(&line) {
                    frames.push(frame);
                }
            }
        }

        self.buffer.drain(..start);
        self.scanned = self.buffer.len();

        if self.buffer.len() > self.max_line {
            tracing::warn!(
                max_line_bytes = self.max_line,
                "Discarding oversized event stream line"
            );
            self.buffer.clear();
            self.scanned = 0;
            self.discarding = true;
        }

        frames
    }

    /// Drop any partially received event, keeping the last event id and
    /// retry hint. Called before reading from a fresh connection.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.scanned = 0;
        self.discarding = false;
        self.skip_lf = false;
        self.first_line = true;
        self.event_type.clear();
        self.data.clear();
        self.frame_id = None;
    }

    /// Value to send as `Last-Event-ID` when reconnecting
    pub fn last_event_id(&self) -> Option<&str> {
        self.last_event_id.as_deref()
    }

    /// Reconnection delay most recently requested by the server
    pub fn retry(&self) -> Option<Duration> {
        self.retry
    }

    fn process_line(&mut self, line: &str) -> Option<Frame> {
        let line = if self.first_line {
            self.first_line = false;
            line.strip_prefix(BOM).unwrap_or(line)
        } else {
            line
        };

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
                self.event_type.clear();
                self.event_type.push_str(value);
            }
            "data" => {
                self.data.push_str(value);
                self.data.push('\n');
            }
            "id" => {
                if !value.contains('\0') {
                    let id = (!value.is_empty()).then(|| value.to_string());
                    self.last_event_id = id.clone();
                    self.frame_id = id;
                }
            }
            "retry" => {
                if !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()) {
                    if let Ok(ms) = value.parse::<u64>() {
                        self.retry = Some(Duration::from_millis(ms));
                    }
                }
            }
            other => {
                tracing::trace!(field = %other, "Ignoring unknown event stream field");
            }
        }

        None
    }

    fn dispatch(&mut self) -> Option<Frame> {
        let frame_id = self.frame_id.take();
        let event_type = std::mem::take(&mut self.event_type);

        if self.data.is_empty() {
            return None;
        }

        let mut data = std::mem::take(&mut self.data);
        data.pop();

        Some(Frame {
            event_type: (!event_type.is_empty()).then_some(event_type),
            data,
            id: frame_id,
        })
    }
}
