//! Incremental NDJSON decoding.
//!
//! Bytes arrive in arbitrary chunks: a line, or even a multi-byte character,
//! can be split across reads. `LineDecoder` carries the undecoded UTF-8 tail
//! and the unterminated text tail between calls so the records produced never
//! depend on where the chunk boundaries fell.

use futures_util::{stream, Stream, StreamExt};
use tracing::{debug, warn};

use crate::error::QueryError;
use crate::record::StreamRecord;

const REPLACEMENT: char = '\u{FFFD}';

/// One item produced while consuming a response body
#[derive(Debug, Clone, PartialEq)]
pub enum StreamItem {
    Record(StreamRecord),
    /// A complete line that was not a valid record
    Malformed(String),
    /// The byte stream failed; no further items follow
    Transport(String),
}

/// Stateful byte → record decoder
#[derive(Debug, Default)]
pub struct LineDecoder {
    utf8_tail: Vec<u8>,
    buffer: String,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk, returning every record completed by it
    pub fn push(&mut self, chunk: &[u8]) -> Vec<StreamItem> {
        self.decode_utf8(chunk);

        let mut items = Vec::new();
        while let Some(pos) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=pos).collect();
            if let Some(item) = parse_line(&line[..line.len() - 1]) {
                items.push(item);
            }
        }
        items
    }

    /// End of stream. An unterminated trailing line is dropped, not parsed.
    pub fn finish(&mut self) {
        let dropped = self.pending().len() + self.utf8_tail.len();
        if dropped > 0 {
            debug!(bytes = dropped, "discarding unterminated trailing line");
        }
        self.buffer.clear();
        self.utf8_tail.clear();
    }

    /// Text received but not yet terminated by a newline
    pub fn pending(&self) -> &str {
        &self.buffer
    }

    fn decode_utf8(&mut self, chunk: &[u8]) {
        self.utf8_tail.extend_from_slice(chunk);

        let mut consumed = 0;
        loop {
            match std::str::from_utf8(&self.utf8_tail[consumed..]) {
                Ok(valid) => {
                    self.buffer.push_str(valid);
                    consumed = self.utf8_tail.len();
                    break;
                }
                Err(err) => {
                    let valid_end = consumed + err.valid_up_to();
                    if let Ok(valid) = std::str::from_utf8(&self.utf8_tail[consumed..valid_end]) {
                        self.buffer.push_str(valid);
                    }
                    match err.error_len() {
                        Some(len) => {
                            self.buffer.push(REPLACEMENT);
                            consumed = valid_end + len;
                        }
                        None => {
                            // Incomplete sequence at the end: wait for more bytes
                            consumed = valid_end;
                            break;
                        }
                    }
                }
            }
        }
        self.utf8_tail.drain(..consumed);
    }
}

fn parse_line(line: &str) -> Option<StreamItem> {
    if line.trim().is_empty() {
        return None;
    }

    match StreamRecord::parse(line) {
        Ok(record) => {
            debug!(status = record.status(), "stream record");
            Some(StreamItem::Record(record))
        }
        Err(e) => {
            warn!(error = %e, "malformed stream record");
            Some(StreamItem::Malformed(QueryError::from(e).to_string()))
        }
    }
}

struct DecodeState<S> {
    bytes: std::pin::Pin<Box<S>>,
    decoder: LineDecoder,
    ready: std::collections::VecDeque<StreamItem>,
    done: bool,
}

/// Adapt a response body into a lazy sequence of decoded items.
///
/// The sequence ends when the body ends, or right after a `Transport` item
/// if reading the body fails.
pub fn records<S, B, E>(bytes: S) -> impl Stream<Item = StreamItem>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    let state = DecodeState {
        bytes: Box::pin(bytes),
        decoder: LineDecoder::new(),
        ready: std::collections::VecDeque::new(),
        done: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.ready.pop_front() {
                return Some((item, state));
            }
            if state.done {
                return None;
            }
            match state.bytes.next().await {
                Some(Ok(chunk)) => {
                    let items = state.decoder.push(chunk.as_ref());
                    state.ready.extend(items);
                }
                Some(Err(e)) => {
                    warn!(error = %e, "response stream failed");
                    state.done = true;
                    state.ready.push_back(StreamItem::Transport(e.to_string()));
                }
                None => {
                    state.decoder.finish();
                    state.done = true;
                }
            }
        }
    })
}
