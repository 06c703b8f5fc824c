//! Server-Sent Events (SSE) frame decoding.
//!
//! The backend streams newline-terminated lines. Only the `data:` subset of
//! SSE is understood here; `event:`, `id:` and `retry:` fields are ignored.
//!
//! SSE format:
//! ```text
//! data: {"conversation_id": "c1", "choices": [{"delta": {"content": "Hi"}}]}
//!
//! data: [DONE]
//! ```
//!
//! [`FrameDecoder`] is transport-agnostic: feed it text or raw bytes as they
//! arrive and it hands back complete frames, holding partial lines (and
//! partial UTF-8 sequences) until the rest shows up.

use std::collections::VecDeque;
use std::marker::PhantomData;

use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, warn};

use crate::client::ClientError;

const DATA_PREFIX: &str = "data: ";
const DONE_MARKER: &str = "[DONE]";

/// One decoded `data: <payload>` unit.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamFrame<T> {
    /// A payload that parsed into `T`.
    Data { payload: String, message: T },
    /// The `[DONE]` sentinel. Nothing follows it.
    Done,
}

impl<T> StreamFrame<T> {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamFrame::Done)
    }

    /// Raw payload with the `data: ` prefix removed.
    pub fn payload(&self) -> &str {
        match self {
            StreamFrame::Data { payload, .. } => payload,
            StreamFrame::Done => DONE_MARKER,
        }
    }
}

/// A single frame whose payload failed to parse. Never fatal to a stream.
#[derive(Debug, Error)]
#[error("malformed frame payload {payload:?}: {source}")]
pub struct FrameParseError {
    pub payload: String,
    #[source]
    pub source: serde_json::Error,
}

/// Incremental UTF-8 decoder.
///
/// Bytes belonging to a multi-byte sequence that is cut off at the end of a
/// chunk are held back and completed by the next call.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode as much of `bytes` (plus anything held back) as is complete.
    ///
    /// Invalid sequences are replaced with U+FFFD.
    pub fn decode(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut out = String::with_capacity(self.pending.len());

        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(s) => {
                    out.push_str(s);
                    self.pending.clear();
                    break;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    out.push_str(std::str::from_utf8(&self.pending[..valid]).unwrap_or_default());
                    match e.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + len);
                        }
                        None => {
                            // Incomplete sequence at the end: wait for more bytes.
                            self.pending.drain(..valid);
                            break;
                        }
                    }
                }
            }
        }

        out
    }

    /// Flush whatever is still held back, lossily.
    pub fn finish(&mut self) -> String {
        let out = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        out
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}

/// Reassembles `data:` frames across chunk boundaries.
///
/// One decoder serves exactly one stream. Once the `[DONE]` sentinel has been
/// produced the decoder is finished and ignores all further input.
///
/// # Example
/// ```
/// use visionai_stream::sse::{FrameDecoder, StreamFrame};
///
/// let mut decoder = FrameDecoder::<serde_json::Value>::new();
/// assert!(decoder.feed("data: {\"a\"").is_empty());
///
/// let frames = decoder.feed(":1}\ndata: [DONE]\n");
/// assert_eq!(frames.len(), 2);
/// assert_eq!(frames[0].payload(), "{\"a\":1}");
/// assert_eq!(frames[1], StreamFrame::Done);
/// ```
#[derive(Debug)]
pub struct FrameDecoder<T> {
    utf8: Utf8Decoder,
    buffer: String,
    finished: bool,
    errors: Vec<FrameParseError>,
    _message: PhantomData<fn() -> T>,
}

impl<T> Default for FrameDecoder<T> {
    fn default() -> Self {
        Self {
            utf8: Utf8Decoder::new(),
            buffer: String::new(),
            finished: false,
            errors: Vec::new(),
            _message: PhantomData,
        }
    }
}

impl<T: DeserializeOwned> FrameDecoder<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// True once the `[DONE]` sentinel has been decoded.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Decode a text chunk, returning frames and parse failures in line order.
    pub fn decode(&mut self, chunk: &str) -> Vec<Result<StreamFrame<T>, FrameParseError>> {
        if self.finished {
            debug!(len = chunk.len(), "ignoring chunk after terminal frame");
            return Vec::new();
        }

        // The held-back tail never contains a newline, so only the new text is searched.
        let scanned = self.buffer.len();
        self.buffer.push_str(chunk);
        let Some(last_newline) = self.buffer[scanned..].rfind('\n').map(|i| scanned + i) else {
            return Vec::new();
        };

        let tail = self.buffer.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.buffer, tail);
        self.decode_lines(complete.split('\n'))
    }

    /// Decode a raw byte chunk through the streaming UTF-8 decoder.
    pub fn decode_bytes(&mut self, chunk: &[u8]) -> Vec<Result<StreamFrame<T>, FrameParseError>> {
        if self.finished {
            return Vec::new();
        }
        let text = self.utf8.decode(chunk);
        self.decode(&text)
    }

    /// Decode a text chunk, returning only frames.
    ///
    /// Parse failures are queued; see [`FrameDecoder::take_errors`].
    pub fn feed(&mut self, chunk: &str) -> Vec<StreamFrame<T>> {
        let results = self.decode(chunk);
        self.split_errors(results)
    }

    /// Byte-oriented counterpart of [`FrameDecoder::feed`].
    pub fn feed_bytes(&mut self, chunk: &[u8]) -> Vec<StreamFrame<T>> {
        let results = self.decode_bytes(chunk);
        self.split_errors(results)
    }

    /// Drain the parse failures queued by `feed`/`feed_bytes`.
    pub fn take_errors(&mut self) -> Vec<FrameParseError> {
        std::mem::take(&mut self.errors)
    }

    /// Handle end of input: the unterminated tail is treated as a final line.
    pub fn finish(&mut self) -> Vec<Result<StreamFrame<T>, FrameParseError>> {
        if self.finished {
            return Vec::new();
        }
        let rest = self.utf8.finish();
        self.buffer.push_str(&rest);
        let tail = std::mem::take(&mut self.buffer);
        if !tail.trim().is_empty() {
            debug!(len = tail.len(), "flushing unterminated line at end of stream");
        }
        self.decode_lines(std::iter::once(tail.as_str()))
    }

    fn decode_lines<'a>(
        &mut self,
        lines: impl Iterator<Item = &'a str>,
    ) -> Vec<Result<StreamFrame<T>, FrameParseError>> {
        let mut out = Vec::new();

        for line in lines {
            let Some(result) = decode_line::<T>(line) else {
                continue;
            };
            let terminal = matches!(result, Ok(StreamFrame::Done));
            if let Err(e) = &result {
                warn!(error = %e.source, payload = %e.payload, "dropping malformed frame");
            }
            out.push(result);

            if terminal {
                self.finished = true;
                self.buffer.clear();
                break;
            }
        }

        out
    }

    fn split_errors(
        &mut self,
        results: Vec<Result<StreamFrame<T>, FrameParseError>>,
    ) -> Vec<StreamFrame<T>> {
        let mut frames = Vec::with_capacity(results.len());
        for result in results {
            match result {
                Ok(frame) => frames.push(frame),
                Err(e) => self.errors.push(e),
            }
        }
        frames
    }
}

fn decode_line<T: DeserializeOwned>(line: &str) -> Option<Result<StreamFrame<T>, FrameParseError>> {
    if line.trim().is_empty() {
        return None;
    }

    let payload = parse_sse_line(line)?;
    if is_done_marker(payload) {
        return Some(Ok(StreamFrame::Done));
    }

    Some(
        serde_json::from_str::<T>(payload)
            .map(|message| StreamFrame::Data {
                payload: payload.to_string(),
                message,
            })
            .map_err(|source| FrameParseError {
                payload: payload.to_string(),
                source,
            }),
    )
}

/// Parse an SSE line to extract the data portion.
///
/// Exactly the `data: ` prefix is removed; a trailing `\r` is dropped.
///
/// # Example
/// ```
/// use visionai_stream::sse::parse_sse_line;
///
/// let line = "data: {\"key\": \"value\"}";
/// assert_eq!(parse_sse_line(line), Some("{\"key\": \"value\"}"));
///
/// let line = "event: message";
/// assert_eq!(parse_sse_line(line), None);
/// ```
pub fn parse_sse_line(line: &str) -> Option<&str> {
    let line = line.strip_suffix('\r').unwrap_or(line);
    line.strip_prefix(DATA_PREFIX)
}

/// Check if an SSE data line indicates the stream is done.
///
/// # Example
/// ```
/// use visionai_stream::sse::is_done_marker;
///
/// assert!(is_done_marker("[DONE]"));
/// assert!(!is_done_marker(""));
/// assert!(!is_done_marker("{\"data\": \"value\"}"));
/// ```
pub fn is_done_marker(data: &str) -> bool {
    data == DONE_MARKER
}

/// Turn a chunked byte stream into a stream of frames.
///
/// Malformed payloads surface as `Err(ClientError::Frame(_))` and the stream
/// keeps going. A transport error is yielded once and ends the stream. After
/// `[DONE]` the underlying stream is not polled again.
pub fn decode_frames<T, S, E>(
    byte_stream: S,
) -> impl Stream<Item = Result<StreamFrame<T>, ClientError>> + Send
where
    T: DeserializeOwned + Send + 'static,
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Into<ClientError> + Send + 'static,
{
    stream::unfold(
        (Box::pin(byte_stream), FrameDecoder::<T>::new(), VecDeque::new(), false),
        |(mut byte_stream, mut decoder, mut pending, mut ended)| async move {
            loop {
                if let Some(item) = pending.pop_front() {
                    return Some((item, (byte_stream, decoder, pending, ended)));
                }

                if ended || decoder.is_finished() {
                    return None;
                }

                match byte_stream.next().await {
                    Some(Ok(chunk)) => {
                        let decoded = decoder.decode_bytes(&chunk);
                        pending.extend(decoded.into_iter().map(|r| r.map_err(ClientError::from)));
                    }
                    Some(Err(e)) => {
                        ended = true;
                        pending.push_back(Err(e.into()));
                    }
                    None => {
                        ended = true;
                        let decoded = decoder.finish();
                        pending.extend(decoded.into_iter().map(|r| r.map_err(ClientError::from)));
                    }
                }
            }
        },
    )
}

/// Extension trait for `reqwest::Response` to enable SSE streaming.
///
/// # Example
/// ```ignore
/// use visionai_stream::sse::SSEResponseExt;
///
/// let response = client.get("https://vision.example.com/api/v1/alerts/stream").send().await?;
///
/// let mut frames = std::pin::pin!(response.sse_frames::<serde_json::Value>());
/// while let Some(frame) = frames.next().await {
///     println!("frame: {:?}", frame?);
/// }
/// ```
pub trait SSEResponseExt {
    /// Convert the response body into a stream of decoded frames.
    fn sse_frames<T>(self) -> impl Stream<Item = Result<StreamFrame<T>, ClientError>> + Send
    where
        T: DeserializeOwned + Send + 'static;
}

impl SSEResponseExt for reqwest::Response {
    fn sse_frames<T>(self) -> impl Stream<Item = Result<StreamFrame<T>, ClientError>> + Send
    where
        T: DeserializeOwned + Send + 'static,
    {
        decode_frames(self.bytes_stream())
    }
}
