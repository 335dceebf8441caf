//! Decoder for the chat endpoint's `data: {"chunk": ...}` event stream
//!
//! Network chunks don't line up with event lines (or even with UTF-8
//! character boundaries), so bytes are buffered and only whole lines are
//! decoded. Each `data: ` line carries either a JSON `{"chunk": "..."}`
//! payload or the `[DONE]` marker.

use bytes::{Bytes, BytesMut};
use futures_util::{Stream, StreamExt};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::ApiError;

const DATA_PREFIX: &str = "data: ";
const DONE_MARKER: &str = "[DONE]";

/// One decoded event from the chat stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamItem {
    /// A piece of assistant text, in arrival order
    Fragment(String),
    /// End of the response. Always the last item.
    Done,
}

/// How a decoder's sequence ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    /// `[DONE]` was observed
    Done,
    /// The source ran out without a `[DONE]`
    Exhausted,
    Failed,
    Cancelled,
}

#[derive(Deserialize)]
struct ChunkPayload {
    chunk: String,
}

/// Parse one complete line. Returns `None` for lines that produce nothing:
/// non-data lines, malformed payloads and empty chunks.
pub fn parse_line(line: &str) -> Option<StreamItem> {
    let payload = line.strip_prefix(DATA_PREFIX)?;
    if payload == DONE_MARKER {
        return Some(StreamItem::Done);
    }

    match serde_json::from_str::<ChunkPayload>(payload) {
        // The backend wraps the marker in a chunk payload
        Ok(p) if p.chunk == DONE_MARKER => Some(StreamItem::Done),
        Ok(p) if p.chunk.is_empty() => None,
        Ok(p) => Some(StreamItem::Fragment(p.chunk)),
        Err(e) => {
            debug!(error = %e, payload, "skipping malformed stream payload");
            None
        }
    }
}

/// Byte buffer that hands out complete `\n`-terminated lines
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: BytesMut,
    // bytes already known to contain no newline
    scanned: usize,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Next complete line without its terminator (`\n` or `\r\n`)
    pub fn next_line(&mut self) -> Option<String> {
        let offset = self.buf[self.scanned..].iter().position(|&b| b == b'\n');
        match offset {
            Some(offset) => {
                let end = self.scanned + offset;
                let line = self.buf.split_to(end + 1);
                self.scanned = 0;
                Some(decode_line(&line[..end]))
            }
            None => {
                self.scanned = self.buf.len();
                None
            }
        }
    }

    /// Whatever is left after the last newline, if anything
    pub fn take_remainder(&mut self) -> Option<String> {
        self.scanned = 0;
        if self.buf.is_empty() {
            return None;
        }
        let rest = self.buf.split();
        Some(decode_line(&rest))
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

fn decode_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

/// Pull-based decoder over a byte stream.
///
/// Reads from the source only when no buffered line is left to inspect, so
/// fragments are never queued beyond one partial line. One decoder serves
/// one response; once it has ended every call to [`next`](Self::next)
/// returns `None`.
pub struct StreamDecoder<S> {
    source: S,
    lines: LineBuffer,
    cancel: CancellationToken,
    end: Option<StreamEnd>,
    fragments: usize,
}

impl<S, E> StreamDecoder<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: std::error::Error + Send + Sync + 'static,
{
    pub fn new(source: S, cancel: CancellationToken) -> Self {
        Self {
            source,
            lines: LineBuffer::new(),
            cancel,
            end: None,
            fragments: 0,
        }
    }

    /// Next item, an error if the source failed or the token fired, or
    /// `None` once the sequence has ended.
    pub async fn next(&mut self) -> Option<Result<StreamItem, ApiError>> {
        if self.end.is_some() {
            return None;
        }

        loop {
            if self.cancel.is_cancelled() {
                return Some(self.fail(StreamEnd::Cancelled, ApiError::Cancelled));
            }

            while let Some(line) = self.lines.next_line() {
                if let Some(item) = parse_line(&line) {
                    return Some(Ok(self.emit(item)));
                }
            }

            let polled = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                chunk = self.source.next() => Some(chunk),
            };
            let Some(chunk) = polled else {
                return Some(self.fail(StreamEnd::Cancelled, ApiError::Cancelled));
            };

            match chunk {
                Some(Ok(bytes)) => self.lines.extend(&bytes),
                Some(Err(e)) => {
                    return Some(self.fail(StreamEnd::Failed, ApiError::Stream(Box::new(e))));
                }
                None => return self.finish_exhausted(),
            }
        }
    }

    /// How the sequence ended, once it has
    pub fn end(&self) -> Option<StreamEnd> {
        self.end
    }

    /// Number of fragments produced so far
    pub fn fragments(&self) -> usize {
        self.fragments
    }

    fn emit(&mut self, item: StreamItem) -> StreamItem {
        match &item {
            StreamItem::Fragment(_) => self.fragments += 1,
            StreamItem::Done => {
                debug!(fragments = self.fragments, "chat stream done");
                self.end = Some(StreamEnd::Done);
            }
        }
        item
    }

    fn fail(&mut self, end: StreamEnd, err: ApiError) -> Result<StreamItem, ApiError> {
        self.end = Some(end);
        Err(err)
    }

    fn finish_exhausted(&mut self) -> Option<Result<StreamItem, ApiError>> {
        let last = self.lines.take_remainder().and_then(|line| parse_line(&line));
        if !matches!(last, Some(StreamItem::Done)) {
            warn!(fragments = self.fragments, "chat stream ended without [DONE]");
        }
        let item = last.map(|item| self.emit(item));
        if self.end.is_none() {
            self.end = Some(StreamEnd::Exhausted);
        }
        item.map(Ok)
    }
}
