//! Line decoder for the incremental response channel

use super::event::{StreamError, StreamEvent};
use super::wire::parse_payload;
use bytes::{Bytes, BytesMut};
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use std::fmt::Display;

/// Incremental decoder. Feed it raw chunks in arrival order; it returns the
/// events completed by each chunk. Once a terminal error has been produced
/// the decoder is closed and swallows further input.
#[derive(Debug, Default)]
pub struct StreamDecoder {
    buf: BytesMut,
    closed: bool,
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        if self.closed {
            return events;
        }
        self.buf.extend_from_slice(chunk);
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let line = self.buf.split_to(pos + 1);
            if let Some(event) = self.decode_line(&line) {
                events.push(event);
                if self.closed {
                    break;
                }
            }
        }
        events
    }

    /// Flush a trailing unterminated line and close the stream with
    /// `Completed`, unless an error already closed it.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        if self.closed {
            return events;
        }
        let rest = self.buf.split();
        if let Some(event) = self.decode_line(&rest) {
            events.push(event);
        }
        if !self.closed {
            self.closed = true;
            events.push(StreamEvent::Completed);
        }
        events
    }

    /// Transport failure: emit the terminal error and close.
    pub fn fail(&mut self, message: impl Into<String>) -> Option<StreamEvent> {
        if self.closed {
            return None;
        }
        self.closed = true;
        Some(StreamEvent::Error(StreamError::transport(message)))
    }

    fn decode_line(&mut self, raw: &[u8]) -> Option<StreamEvent> {
        let event = match std::str::from_utf8(raw) {
            Ok(text) => decode_line(text)?,
            Err(e) => StreamEvent::Error(StreamError::decode(format!("invalid utf-8: {e}"))),
        };
        if matches!(event, StreamEvent::Error(_)) {
            self.closed = true;
        }
        Some(event)
    }
}

/// Decode a single framed line. Blank lines, SSE comments and SSE fields
/// other than `data` produce nothing. A bare JSON object is accepted too.
pub fn decode_line(line: &str) -> Option<StreamEvent> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() || line.starts_with(':') {
        return None;
    }
    let payload = if let Some(data) = line.strip_prefix("data:") {
        data.trim_start()
    } else if line.starts_with("event:") || line.starts_with("id:") || line.starts_with("retry:") {
        return None;
    } else {
        line.trim_start()
    };
    if payload.is_empty() {
        return None;
    }
    Some(parse_payload(payload))
}

/// Adapt a byte stream into the typed event stream. The result always ends
/// with exactly one terminal event (`Completed` or `Error`).
pub fn decode_stream<S, E>(bytes: S) -> BoxStream<'static, StreamEvent>
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Display + Send + 'static,
{
    let s = async_stream::stream! {
        let mut decoder = StreamDecoder::new();
        let mut bytes = Box::pin(bytes);
        while let Some(chunk) = bytes.next().await {
            match chunk {
                Ok(chunk) => {
                    for event in decoder.push(&chunk) {
                        yield event;
                    }
                    if decoder.is_closed() {
                        return;
                    }
                }
                Err(e) => {
                    if let Some(event) = decoder.fail(e.to_string()) {
                        yield event;
                    }
                    return;
                }
            }
        }
        for event in decoder.finish() {
            yield event;
        }
    };
    Box::pin(s)
}
