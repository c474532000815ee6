//! Server-Sent Events (SSE) processing for streaming completions.
//!
//! This module turns the raw body of a completion response into a lazy sequence of
//! [`CompletionChunk`] values.  Framing is done by [`SseCodec`], a `tokio_util` decoder
//! that splits the byte stream into events; [`process_sse`] then parses each event's
//! payload, stopping at the `[DONE]` sentinel.
//!
//! Nothing is read ahead: the next event is decoded only when the consumer polls for it,
//! and the underlying body is dropped as soon as the sequence ends, fails, or is dropped
//! itself.

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::{Buf, Bytes, BytesMut};
use futures::stream::{self, Stream, StreamExt, TryStreamExt};
use tokio_util::codec::{Decoder, FramedRead};
use tokio_util::io::StreamReader;

use crate::client_logger::ClientLogger;
use crate::observability::{STREAM_BYTES, STREAM_DURATION, STREAM_ERRORS, STREAM_EVENTS, STREAM_TTFB};
use crate::{CompletionChunk, Error, Result};

/// Payload that marks the normal end of a completion stream.
pub const DONE_SENTINEL: &str = "[DONE]";

const BOM: char = '\u{feff}';

/// A lazily decoded, single-pass sequence of completion chunks.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<CompletionChunk>> + Send>>;

/// One dispatched server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    /// The `event:` field, if the server sent one.
    pub event: Option<String>,
    /// The `data:` lines of the event, joined with newlines.
    pub data: String,
}

/// Splits a byte stream into [`SseFrame`]s.
///
/// Lines may end in `\n`, `\r\n`, or `\r`; a line ending in `\r` is complete at once.
/// Bytes are held until a whole line is available, so characters split across reads decode correctly.  Comment lines and the
/// `id:`/`retry:` fields are ignored; events without data are skipped.
#[derive(Debug, Default)]
pub struct SseCodec {
    data: Option<String>,
    event: Option<String>,
    started: bool,
    // The last line ended in '\r'; a '\n' at the start of the next read completes "\r\n".
    skip_lf: bool,
}

impl SseCodec {
    /// Create a codec at the start of a stream.
    pub fn new() -> Self {
        Self::default()
    }

    fn next_line(&mut self, src: &mut BytesMut) -> Result<Option<String>> {
        if self.skip_lf && !src.is_empty() {
            self.skip_lf = false;
            if src[0] == b'\n' {
                src.advance(1);
            }
        }
        let Some(pos) = src.iter().position(|b| *b == b'\n' || *b == b'\r') else {
            return Ok(None);
        };
        let terminator = if src[pos] == b'\r' {
            match src.get(pos + 1) {
                Some(b'\n') => 2,
                Some(_) => 1,
                None => {
                    self.skip_lf = true;
                    1
                }
            }
        } else {
            1
        };
        let line = src.split_to(pos);
        src.advance(terminator);
        self.decode_line(&line).map(Some)
    }

    fn decode_line(&mut self, bytes: &[u8]) -> Result<String> {
        let line = std::str::from_utf8(bytes).map_err(|e| {
            Error::protocol(
                format!("invalid UTF-8 in event stream: {e}"),
                Some(String::from_utf8_lossy(bytes).into_owned()),
                Some(Box::new(e)),
            )
        })?;
        let line = if self.started {
            line
        } else {
            self.started = true;
            line.strip_prefix(BOM).unwrap_or(line)
        };
        Ok(line.to_string())
    }

    fn process_line(&mut self, line: &str) -> Option<SseFrame> {
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
            "data" => match &mut self.data {
                Some(data) => {
                    data.push('\n');
                    data.push_str(value);
                }
                None => self.data = Some(value.to_string()),
            },
            "event" => self.event = Some(value.to_string()),
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        let event = self.event.take();
        self.data.take().map(|data| SseFrame { event, data })
    }
}

impl Decoder for SseCodec {
    type Item = SseFrame;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<SseFrame>> {
        while let Some(line) = self.next_line(src)? {
            if let Some(frame) = self.process_line(&line) {
                return Ok(Some(frame));
            }
        }
        Ok(None)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<SseFrame>> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }
        if !src.is_empty() {
            let rest = src.split_to(src.len());
            let line = self.decode_line(&rest)?;
            if let Some(frame) = self.process_line(&line) {
                return Ok(Some(frame));
            }
        }
        Ok(self.dispatch())
    }
}

/// Options applied while consuming a chunk stream.
#[derive(Clone, Default)]
pub struct StreamOptions {
    /// Longest wait for the next event; `None` waits indefinitely.
    pub chunk_timeout: Option<Duration>,
    /// Receives every decoded chunk.
    pub logger: Option<Arc<dyn ClientLogger>>,
}

impl StreamOptions {
    /// Set the chunk timeout.
    pub fn with_chunk_timeout(mut self, chunk_timeout: Option<Duration>) -> Self {
        self.chunk_timeout = chunk_timeout;
        self
    }

    /// Set the logger.
    pub fn with_logger(mut self, logger: Option<Arc<dyn ClientLogger>>) -> Self {
        self.logger = logger;
        self
    }
}

/// Parse one event payload as a [`CompletionChunk`].
///
/// Failures carry the raw payload.
pub fn decode_chunk(data: &str) -> Result<CompletionChunk> {
    serde_json::from_str(data).map_err(|e| {
        Error::protocol(
            format!("invalid completion chunk: {e}"),
            Some(data.to_string()),
            Some(Box::new(e)),
        )
    })
}

struct DecodeState<F> {
    frames: Option<Pin<Box<F>>>,
    options: StreamOptions,
    started: Instant,
    yielded: bool,
}

impl<F> DecodeState<F> {
    fn finish(&mut self) {
        if self.frames.take().is_some() {
            STREAM_DURATION.add(self.started.elapsed().as_secs_f64());
        }
    }

    fn fail(&mut self, err: Error) -> Result<CompletionChunk> {
        STREAM_ERRORS.click();
        self.finish();
        Err(err)
    }
}

/// Process a stream of bytes into a stream of completion chunks.
///
/// The sequence ends cleanly at the `[DONE]` sentinel or when the body ends.  A payload
/// that is not a valid chunk yields a protocol error carrying the payload, after which the
/// sequence ends; chunks already yielded are unaffected.
pub fn process_sse<S, E>(
    byte_stream: S,
    options: StreamOptions,
) -> impl Stream<Item = Result<CompletionChunk>>
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Send + 'static,
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let bytes = byte_stream
        .inspect_ok(|bytes| STREAM_BYTES.count(bytes.len() as u64))
        .map_err(io::Error::other);
    let frames = FramedRead::new(StreamReader::new(bytes), SseCodec::new());
    let state = DecodeState {
        frames: Some(Box::pin(frames)),
        options,
        started: Instant::now(),
        yielded: false,
    };

    stream::unfold(state, |mut state| async move {
        let frames = state.frames.as_mut()?;
        let next = match state.options.chunk_timeout {
            Some(limit) => match tokio::time::timeout(limit, frames.next()).await {
                Ok(next) => next,
                Err(_) => {
                    let err = Error::timeout(
                        "no event arrived from the completion stream",
                        Some(limit.as_secs_f64()),
                    );
                    let item = state.fail(err);
                    return Some((item, state));
                }
            },
            None => frames.next().await,
        };
        match next {
            None => {
                state.finish();
                None
            }
            Some(Err(err)) => {
                let item = state.fail(err);
                Some((item, state))
            }
            Some(Ok(frame)) if frame.data == DONE_SENTINEL => {
                state.finish();
                None
            }
            Some(Ok(frame)) => match decode_chunk(&frame.data) {
                Ok(chunk) => {
                    STREAM_EVENTS.click();
                    if !state.yielded {
                        state.yielded = true;
                        STREAM_TTFB.add(state.started.elapsed().as_secs_f64());
                    }
                    if let Some(logger) = &state.options.logger {
                        logger.log_chunk(&chunk);
                    }
                    Some((Ok(chunk), state))
                }
                Err(err) => {
                    let item = state.fail(err);
                    Some((item, state))
                }
            },
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn chunk_json(content: &str) -> String {
        serde_json::json!({
            "id": "c1",
            "object": "chat.completion.chunk",
            "created": 1742265411,
            "model": "mercury-coder-small",
            "choices": [{"index": 0, "delta": {"content": content}, "finish_reason": null}]
        })
        .to_string()
    }

    fn body(parts: Vec<&'static str>) -> impl Stream<Item = std::result::Result<Bytes, io::Error>> {
        stream::iter(parts.into_iter().map(|p| Ok(Bytes::from_static(p.as_bytes()))))
    }

    fn owned_body(parts: Vec<Vec<u8>>) -> impl Stream<Item = std::result::Result<Bytes, io::Error>> {
        stream::iter(parts.into_iter().map(|p| Ok(Bytes::from(p))))
    }

    fn decode_all(input: &[u8]) -> Vec<SseFrame> {
        let mut codec = SseCodec::new();
        let mut buf = BytesMut::from(input);
        let mut frames = Vec::new();
        while let Some(frame) = codec.decode_eof(&mut buf).unwrap() {
            frames.push(frame);
        }
        frames
    }

    #[test]
    fn codec_joins_multiline_data() {
        let frames = decode_all(b"data: one\ndata: two\n\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data, "one\ntwo");
    }

    #[test]
    fn codec_handles_crlf_and_cr() {
        let frames = decode_all(b"data: a\r\n\r\ndata: b\r\rdata:c\n\n");
        let data: Vec<_> = frames.iter().map(|f| f.data.as_str()).collect();
        assert_eq!(data, vec!["a", "b", "c"]);
    }

    #[test]
    fn codec_ignores_comments_and_other_fields() {
        let frames = decode_all(b": keep-alive\nid: 7\nretry: 100\nevent: delta\ndata: x\n\n\n\n");
        assert_eq!(
            frames,
            vec![SseFrame {
                event: Some("delta".to_string()),
                data: "x".to_string()
            }]
        );
    }

    #[test]
    fn codec_strips_bom() {
        let frames = decode_all("\u{feff}data: x\n\n".as_bytes());
        assert_eq!(frames[0].data, "x");
    }

    #[test]
    fn codec_waits_for_complete_lines() {
        let mut codec = SseCodec::new();
        let mut buf = BytesMut::from(&b"data: par"[..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        buf.extend_from_slice(b"tial\n");
        assert!(codec.decode(&mut buf).unwrap().is_none());
        buf.extend_from_slice(b"\n");
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap().data, "partial");
    }

    #[test]
    fn codec_ends_lines_at_a_trailing_cr() {
        let mut codec = SseCodec::new();
        let mut buf = BytesMut::from(&b"data: x\r\r"[..]);
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap().data, "x");
        assert!(buf.is_empty());

        // A '\n' arriving later completes the "\r\n" rather than forming an empty line.
        let mut buf = BytesMut::from(&b"data: y\r"[..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        buf.extend_from_slice(b"\ndata: z\n");
        assert!(codec.decode(&mut buf).unwrap().is_none());
        buf.extend_from_slice(b"\n");
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap().data, "y\nz");
    }

    #[test]
    fn codec_flushes_at_eof() {
        let frames = decode_all(b"data: tail");
        assert_eq!(frames[0].data, "tail");
    }

    #[test]
    fn codec_rejects_invalid_utf8() {
        let mut codec = SseCodec::new();
        let mut buf = BytesMut::from(&b"data: \xff\xfe\n\n"[..]);
        let err = codec.decode(&mut buf).unwrap_err();
        assert!(err.is_protocol());
    }

    #[tokio::test]
    async fn yields_one_chunk_per_event_then_stops_at_done() {
        let input = format!(
            "data: {}\n\ndata: {}\n\ndata: [DONE]\n\ndata: {}\n\n",
            chunk_json("Hel"),
            chunk_json("lo"),
            chunk_json("ignored")
        );
        let stream = process_sse(owned_body(vec![input.into_bytes()]), StreamOptions::default());
        let chunks: Vec<_> = stream.collect().await;
        assert_eq!(chunks.len(), 2);
        let text: String = chunks
            .iter()
            .map(|c| c.as_ref().unwrap().content().unwrap_or(""))
            .collect();
        assert_eq!(text, "Hello");
    }

    #[tokio::test]
    async fn events_split_across_reads() {
        let event = format!("data: {}\n\n", chunk_json("é"));
        let bytes = event.into_bytes();
        let parts: Vec<Vec<u8>> = bytes.chunks(3).map(|c| c.to_vec()).collect();
        let mut stream = Box::pin(process_sse(owned_body(parts), StreamOptions::default()));
        let chunk = stream.next().await.unwrap().unwrap();
        assert_eq!(chunk.content(), Some("é"));
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn malformed_payload_is_an_error_and_ends_the_stream() {
        let stream = process_sse(
            body(vec!["data: {not json\n\n", "data: [DONE]\n\n"]),
            StreamOptions::default(),
        );
        let items: Vec<_> = stream.collect().await;
        assert_eq!(items.len(), 1);
        let err = items.into_iter().next().unwrap().unwrap_err();
        assert!(err.is_protocol());
        assert_eq!(err.payload(), Some("{not json"));
    }

    #[tokio::test]
    async fn schema_mismatch_is_a_protocol_error() {
        let stream = process_sse(
            body(vec!["data: {\"choices\": \"nope\"}\n\n"]),
            StreamOptions::default(),
        );
        let items: Vec<_> = stream.collect().await;
        assert!(items[0].as_ref().unwrap_err().is_protocol());
    }

    #[tokio::test]
    async fn chunks_before_an_error_survive() {
        let input = format!("data: {}\n\ndata: oops\n\n", chunk_json("ok"));
        let items: Vec<_> =
            process_sse(owned_body(vec![input.into_bytes()]), StreamOptions::default())
                .collect()
                .await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap().content(), Some("ok"));
        assert!(items[1].is_err());
    }

    #[tokio::test]
    async fn body_errors_surface() {
        let parts: Vec<std::result::Result<Bytes, io::Error>> = vec![
            Ok(Bytes::from_static(b"data: ")),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset")),
        ];
        let items: Vec<_> = process_sse(stream::iter(parts), StreamOptions::default())
            .collect()
            .await;
        assert_eq!(items.len(), 1);
        assert!(items[0].is_err());
    }

    #[tokio::test]
    async fn end_of_body_without_done_ends_cleanly() {
        let input = format!("data: {}\n\n", chunk_json("x"));
        let items: Vec<_> =
            process_sse(owned_body(vec![input.into_bytes()]), StreamOptions::default())
                .collect()
                .await;
        assert_eq!(items.len(), 1);
        assert!(items[0].is_ok());
    }

    #[tokio::test]
    async fn nothing_is_read_before_the_first_poll() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        let reads = Arc::new(AtomicUsize::new(0));
        let counter = reads.clone();
        let input = format!("data: {}\n\n", chunk_json("x"));
        let source = stream::iter(vec![input.into_bytes()]).map(move |b| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<_, io::Error>(Bytes::from(b))
        });
        let mut chunks = Box::pin(process_sse(source, StreamOptions::default()));
        assert_eq!(reads.load(Ordering::SeqCst), 0);
        chunks.next().await.unwrap().unwrap();
        assert_eq!(reads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cr_terminated_event_is_yielded_without_more_input() {
        let input = format!("data: {}\r\r", chunk_json("cr"));
        let source = stream::iter(vec![Ok::<_, io::Error>(Bytes::from(input))])
            .chain(stream::pending());
        let mut chunks = Box::pin(process_sse(source, StreamOptions::default()));
        let chunk = tokio::time::timeout(Duration::from_secs(5), chunks.next())
            .await
            .expect("event should not wait for more bytes")
            .unwrap()
            .unwrap();
        assert_eq!(chunk.content(), Some("cr"));
    }

    #[tokio::test]
    async fn cr_terminated_done_ends_an_open_stream() {
        let source = stream::iter(vec![Ok::<_, io::Error>(Bytes::from_static(
            b"data: [DONE]\r\r",
        ))])
        .chain(stream::pending());
        let mut chunks = Box::pin(process_sse(source, StreamOptions::default()));
        let next = tokio::time::timeout(Duration::from_secs(5), chunks.next())
            .await
            .expect("[DONE] should end the stream");
        assert!(next.is_none());
    }

    /// A body that records when it is dropped.
    struct DropFlag(Arc<std::sync::atomic::AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, std::sync::atomic::Ordering::SeqCst);
        }
    }

    fn guarded_body(
        first: String,
    ) -> (
        impl Stream<Item = std::result::Result<Bytes, io::Error>> + Send + 'static,
        Arc<std::sync::atomic::AtomicBool>,
    ) {
        let dropped = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let guard = DropFlag(dropped.clone());
        let source = stream::iter(vec![Ok::<_, io::Error>(Bytes::from(first))])
            .chain(stream::pending())
            .map(move |item| {
                let _held = &guard;
                item
            });
        (source, dropped)
    }

    #[tokio::test]
    async fn body_is_released_after_done() {
        use std::sync::atomic::Ordering;
        let input = format!("data: {}\n\ndata: [DONE]\n\n", chunk_json("x"));
        let (source, dropped) = guarded_body(input);
        let mut chunks = Box::pin(process_sse(source, StreamOptions::default()));
        chunks.next().await.unwrap().unwrap();
        assert!(!dropped.load(Ordering::SeqCst));
        assert!(chunks.next().await.is_none());
        assert!(dropped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn body_is_released_after_a_malformed_payload() {
        use std::sync::atomic::Ordering;
        let (source, dropped) = guarded_body("data: {not json\n\n".to_string());
        let mut chunks = Box::pin(process_sse(source, StreamOptions::default()));
        assert!(chunks.next().await.unwrap().is_err());
        assert!(dropped.load(Ordering::SeqCst));
        assert!(chunks.next().await.is_none());
    }

    #[tokio::test]
    async fn body_is_released_when_the_consumer_stops() {
        use std::sync::atomic::Ordering;
        let input = format!("data: {}\n\n", chunk_json("x"));
        let (source, dropped) = guarded_body(input);
        let mut chunks = Box::pin(process_sse(source, StreamOptions::default()));
        chunks.next().await.unwrap().unwrap();
        assert!(!dropped.load(Ordering::SeqCst));
        drop(chunks);
        assert!(dropped.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn chunk_timeout_ends_a_stalled_stream() {
        let input = format!("data: {}\n\n", chunk_json("first"));
        let source = stream::iter(vec![Ok::<_, io::Error>(Bytes::from(input))])
            .chain(stream::pending());
        let options = StreamOptions::default().with_chunk_timeout(Some(Duration::from_secs(5)));
        let mut chunks = Box::pin(process_sse(source, options));
        assert_eq!(chunks.next().await.unwrap().unwrap().content(), Some("first"));
        let err = chunks.next().await.unwrap().unwrap_err();
        assert!(err.is_timeout());
        assert!(chunks.next().await.is_none());
    }
}
