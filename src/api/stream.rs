//! Server-Sent Events handling for streamed chat completions.
//!
//! Two pieces:
//! - [`SseFrameReader`] turns response lines into logical `data` payloads.
//! - [`DeltaAccumulator`] decodes each payload and grows the running
//!   transcript handed to the caller.

use std::io::{BufRead, BufReader, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::debug;

use super::types::{ChatCompletionResponse, Choice, Message, StreamChunk, Usage};
use crate::error::ApiError;

const DATA_PREFIX: &str = "data:";
const DONE_SENTINEL: &str = "[DONE]";

/// Shared flag that aborts an in-flight stream read.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Result of feeding one line to [`SseFrameReader`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    /// A complete logical payload (possibly joined from several `data:` lines).
    Payload(String),
    /// The `[DONE]` sentinel. Reading must stop.
    Done,
}

/// Line-level SSE reassembly state.
#[derive(Debug, Default)]
pub struct SseFrameReader {
    buffer: String,
}

impl SseFrameReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_line(&mut self, line: &str) -> Option<SseEvent> {
        let line = line.trim_end_matches('\r');

        if line.starts_with(':') {
            return None;
        }

        if let Some(rest) = line.strip_prefix(DATA_PREFIX) {
            let segment = rest.trim();
            if segment == DONE_SENTINEL {
                // Unflushed data before the sentinel is dropped.
                self.buffer.clear();
                return Some(SseEvent::Done);
            }
            if !self.buffer.is_empty() {
                self.buffer.push('\n');
            }
            self.buffer.push_str(segment);
            return None;
        }

        if line.trim().is_empty() {
            if self.buffer.is_empty() {
                return None;
            }
            return Some(SseEvent::Payload(std::mem::take(&mut self.buffer)));
        }

        // event:, id:, retry: and anything else we do not use
        None
    }

    /// Leftover payload at end of stream, returned once.
    pub fn finish(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.buffer))
        }
    }
}

/// Folds decoded stream chunks into a single response.
#[derive(Debug, Default)]
pub struct DeltaAccumulator {
    text: String,
    id: String,
    object: String,
    created: i64,
    usage: Option<Usage>,
    finish_reason: String,
    chunks: usize,
}

impl DeltaAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode one payload and apply it. `on_delta` receives the cumulative
    /// text after every non-empty increment.
    pub fn apply<F>(&mut self, payload: &str, on_delta: &mut F) -> Result<(), ApiError>
    where
        F: FnMut(&str),
    {
        if payload.trim().is_empty() {
            return Ok(());
        }

        let chunk: StreamChunk = serde_json::from_str(payload).map_err(|e| {
            ApiError::Protocol(format!(
                "failed to decode stream chunk: {} (raw: {})",
                e, payload
            ))
        })?;

        if let Some(error) = chunk.error {
            return Err(error.into());
        }

        if self.id.is_empty() && !chunk.id.is_empty() {
            self.id = chunk.id;
        }
        if self.object.is_empty() && !chunk.object.is_empty() {
            self.object = chunk.object;
        }
        if self.created == 0 && chunk.created != 0 {
            self.created = chunk.created;
        }
        if chunk.usage.is_some() {
            self.usage = chunk.usage;
        }

        for choice in chunk.choices {
            let delta = choice
                .delta
                .content
                .as_ref()
                .map(|c| c.text_fragments())
                .unwrap_or_default();
            if !delta.is_empty() {
                self.text.push_str(&delta);
                on_delta(&self.text);
            }
            if !choice.finish_reason.is_empty() {
                self.finish_reason = choice.finish_reason;
            }
        }

        self.chunks += 1;
        Ok(())
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks
    }

    /// Synthesize the single-choice response. Zero chunks is an error.
    pub fn finish(self) -> Result<ChatCompletionResponse, ApiError> {
        if self.chunks == 0 {
            return Err(ApiError::EmptyResult("empty stream response".to_string()));
        }

        Ok(ChatCompletionResponse {
            id: self.id,
            object: self.object,
            created: self.created,
            choices: vec![Choice {
                index: 0,
                message: Message::assistant(self.text),
                finish_reason: self.finish_reason,
            }],
            usage: self.usage.unwrap_or_default(),
            error: None,
        })
    }
}

/// How often a reader waiting on the body re-checks its cancellation token.
pub const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Drive a full event stream from `reader` to a synthesized response.
///
/// Reads on the calling thread, so a cancel only lands between lines. Use
/// [`read_event_stream_detached`] for network bodies.
pub fn read_event_stream<R, F>(
    reader: R,
    on_delta: F,
    cancel: &CancellationToken,
) -> Result<ChatCompletionResponse, ApiError>
where
    R: BufRead,
    F: FnMut(&str),
{
    fold_event_lines(
        reader.lines().map(|line| line.map_err(ApiError::from)),
        on_delta,
        cancel,
    )
}

/// Like [`read_event_stream`], but the body is read on a worker thread so
/// a cancel ends the call within [`CANCEL_POLL_INTERVAL`] even while the
/// server is silent. The worker exits on its own once the body ends or
/// errors; it never outlives a blocked socket read.
pub fn read_event_stream_detached<R, F>(
    reader: R,
    on_delta: F,
    cancel: &CancellationToken,
) -> Result<ChatCompletionResponse, ApiError>
where
    R: Read + Send + 'static,
    F: FnMut(&str),
{
    let (tx, rx) = channel::<std::io::Result<String>>();
    thread::Builder::new()
        .name("sse-reader".to_string())
        .spawn(move || {
            for line in BufReader::new(reader).lines() {
                let failed = line.is_err();
                // A send error means the consumer returned early.
                if tx.send(line).is_err() || failed {
                    break;
                }
            }
        })?;

    let lines = CancellableLines { rx, cancel };
    fold_event_lines(lines, on_delta, cancel)
}

/// Lines from the reader thread, ending early with `Cancelled`.
struct CancellableLines<'a> {
    rx: Receiver<std::io::Result<String>>,
    cancel: &'a CancellationToken,
}

impl Iterator for CancellableLines<'_> {
    type Item = Result<String, ApiError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.cancel.is_cancelled() {
                return Some(Err(ApiError::Cancelled));
            }
            match self.rx.recv_timeout(CANCEL_POLL_INTERVAL) {
                Ok(line) => return Some(line.map_err(ApiError::from)),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return None,
            }
        }
    }
}

fn fold_event_lines<I, F>(
    lines: I,
    mut on_delta: F,
    cancel: &CancellationToken,
) -> Result<ChatCompletionResponse, ApiError>
where
    I: Iterator<Item = Result<String, ApiError>>,
    F: FnMut(&str),
{
    let mut frames = SseFrameReader::new();
    let mut acc = DeltaAccumulator::new();
    let mut done = false;

    for line in lines {
        if cancel.is_cancelled() {
            return Err(ApiError::Cancelled);
        }
        let line = line?;

        match frames.push_line(&line) {
            Some(SseEvent::Payload(payload)) => acc.apply(&payload, &mut on_delta)?,
            Some(SseEvent::Done) => {
                done = true;
                break;
            }
            None => {}
        }
    }

    if cancel.is_cancelled() {
        return Err(ApiError::Cancelled);
    }

    if !done {
        if let Some(payload) = frames.finish() {
            acc.apply(&payload, &mut on_delta)?;
        }
    }

    debug!(
        chunks = acc.chunk_count(),
        chars = acc.text().chars().count(),
        "stream finished"
    );
    acc.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(text: &str) -> String {
        format!(
            r#"{{"id":"c1","created":7,"choices":[{{"index":0,"delta":{{"content":{}}},"finish_reason":null}}]}}"#,
            serde_json::to_string(text).unwrap()
        )
    }

    fn frames_of(input: &str) -> Vec<SseEvent> {
        let mut reader = SseFrameReader::new();
        let mut out: Vec<SseEvent> = input
            .split('\n')
            .filter_map(|line| reader.push_line(line))
            .collect();
        if let Some(rest) = reader.finish() {
            out.push(SseEvent::Payload(rest));
        }
        out
    }

    /// Hands out at most one byte per `read` call.
    struct Trickle<'a>(&'a [u8]);

    impl Read for Trickle<'_> {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.0.is_empty() || buf.is_empty() {
                return Ok(0);
            }
            buf[0] = self.0[0];
            self.0 = &self.0[1..];
            Ok(1)
        }
    }

    #[test]
    fn comments_and_blank_lines() {
        let events = frames_of(": keep-alive\n\ndata: {\"a\":1}\n\n\n");
        assert_eq!(events, vec![SseEvent::Payload("{\"a\":1}".to_string())]);
    }

    #[test]
    fn multi_line_data_joined_with_newline() {
        let events = frames_of("data: {\"a\":\ndata: 1}\n\n");
        assert_eq!(events, vec![SseEvent::Payload("{\"a\":\n1}".to_string())]);
    }

    #[test]
    fn done_discards_pending_buffer() {
        let events = frames_of("data: {\"partial\":\ndata: [DONE]\ndata: {\"late\":1}\n\n");
        assert_eq!(events[0], SseEvent::Done);
    }

    #[test]
    fn crlf_terminated_lines() {
        let events = frames_of("data: {\"a\":1}\r\n\r\n");
        assert_eq!(events, vec![SseEvent::Payload("{\"a\":1}".to_string())]);
    }

    #[test]
    fn unknown_fields_ignored() {
        let events = frames_of("event: message\nid: 4\ndata: x\n\n");
        assert_eq!(events, vec![SseEvent::Payload("x".to_string())]);
    }

    #[test]
    fn eof_flushes_leftover_once() {
        let mut reader = SseFrameReader::new();
        assert_eq!(reader.push_line("data: tail"), None);
        assert_eq!(reader.finish(), Some("tail".to_string()));
        assert_eq!(reader.finish(), None);
    }

    #[test]
    fn cumulative_deltas_in_order() {
        let body = format!(
            "data: {}\n\ndata: {}\n\ndata: {}\n\ndata: [DONE]\n\n",
            chunk("Hello"),
            chunk(", "),
            chunk("world")
        );
        let mut seen = Vec::new();
        let resp = read_event_stream(
            body.as_bytes(),
            |t: &str| seen.push(t.to_string()),
            &CancellationToken::new(),
        )
        .unwrap();

        assert_eq!(seen, vec!["Hello", "Hello, ", "Hello, world"]);
        assert_eq!(resp.first_text().unwrap(), "Hello, world");
        assert_eq!(resp.id, "c1");
        assert_eq!(resp.created, 7);
    }

    #[test]
    fn byte_at_a_time_matches_whole_buffer() {
        let body = format!(
            ": hi\ndata: {}\n\ndata: {}\n: ping\n\ndata: [DONE]\n",
            chunk("one "),
            chunk("two")
        );

        let mut whole = Vec::new();
        read_event_stream(
            body.as_bytes(),
            |t: &str| whole.push(t.to_string()),
            &CancellationToken::new(),
        )
        .unwrap();

        let mut trickled = Vec::new();
        let reader = BufReader::with_capacity(1, Trickle(body.as_bytes()));
        read_event_stream(
            reader,
            |t: &str| trickled.push(t.to_string()),
            &CancellationToken::new(),
        )
        .unwrap();

        assert_eq!(whole, trickled);
        assert_eq!(whole.last().map(String::as_str), Some("one two"));
    }

    #[test]
    fn content_parts_delta() {
        let body = concat!(
            r#"data: {"choices":[{"delta":{"content":[{"type":"text","text":"ab"},{"type":"image_url","image_url":{"url":"u"}},{"type":"text","text":"c"}]},"finish_reason":"stop"}],"usage":{"prompt_tokens":3,"completion_tokens":2,"total_tokens":5}}"#,
            "\n\n"
        );
        let resp =
            read_event_stream(body.as_bytes(), |_: &str| {}, &CancellationToken::new()).unwrap();
        assert_eq!(resp.first_text().unwrap(), "abc");
        assert_eq!(resp.choices[0].finish_reason, "stop");
        assert_eq!(resp.usage.total_tokens, 5);
    }

    #[test]
    fn trailing_frame_without_blank_line_is_flushed() {
        let body = format!("data: {}\n\ndata: {}", chunk("a"), chunk("b"));
        let resp =
            read_event_stream(body.as_bytes(), |_: &str| {}, &CancellationToken::new()).unwrap();
        assert_eq!(resp.first_text().unwrap(), "ab");
    }

    #[test]
    fn malformed_json_is_fatal() {
        let body = format!("data: {}\n\ndata: {{not json\n\n", chunk("a"));
        let err = read_event_stream(body.as_bytes(), |_: &str| {}, &CancellationToken::new())
            .unwrap_err();
        assert!(matches!(err, ApiError::Protocol(_)));
    }

    #[test]
    fn error_chunk_is_fatal() {
        let body = "data: {\"error\":{\"code\":\"429\",\"message\":\"slow down\"}}\n\n";
        let err = read_event_stream(body.as_bytes(), |_: &str| {}, &CancellationToken::new())
            .unwrap_err();
        assert!(matches!(err, ApiError::Api { ref code, .. } if code == "429"));
    }

    #[test]
    fn empty_stream_is_error() {
        let err = read_event_stream(
            ": nothing\n\ndata: [DONE]\n".as_bytes(),
            |_: &str| {},
            &CancellationToken::new(),
        )
        .unwrap_err();
        assert!(matches!(err, ApiError::EmptyResult(_)));
    }

    #[test]
    fn first_id_kept_latest_usage_wins() {
        let body = concat!(
            r#"data: {"id":"first","created":1,"choices":[],"usage":{"total_tokens":1}}"#,
            "\n\n",
            r#"data: {"id":"second","created":2,"choices":[{"delta":{"content":"x"}}],"usage":{"total_tokens":9}}"#,
            "\n\n"
        );
        let resp =
            read_event_stream(body.as_bytes(), |_: &str| {}, &CancellationToken::new()).unwrap();
        assert_eq!(resp.id, "first");
        assert_eq!(resp.created, 1);
        assert_eq!(resp.usage.total_tokens, 9);
    }

    #[test]
    fn cancelled_token_aborts() {
        let token = CancellationToken::new();
        token.cancel();
        let body = format!("data: {}\n\n", chunk("a"));
        let err = read_event_stream(body.as_bytes(), |_: &str| {}, &token).unwrap_err();
        assert!(err.is_cancelled());
    }

    #[test]
    fn reading_stops_at_done() {
        let body = format!(
            "data: {}\n\ndata: [DONE]\n\ndata: {}\n\n",
            chunk("kept"),
            chunk(" dropped")
        );
        let mut seen = Vec::new();
        let resp = read_event_stream(
            body.as_bytes(),
            |t: &str| seen.push(t.to_string()),
            &CancellationToken::new(),
        )
        .unwrap();
        assert_eq!(seen, vec!["kept"]);
        assert_eq!(resp.first_text().unwrap(), "kept");
    }

    /// Yields `head`, then blocks for `stall` before reporting EOF.
    struct Stalled {
        head: std::io::Cursor<Vec<u8>>,
        stall: Duration,
    }

    impl Read for Stalled {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let n = self.head.read(buf)?;
            if n == 0 {
                thread::sleep(self.stall);
            }
            Ok(n)
        }
    }

    #[test]
    fn detached_reader_matches_inline() {
        let body = format!("data: {}\n\ndata: {}\n\ndata: [DONE]\n", chunk("a"), chunk("b"));
        let mut seen = Vec::new();
        let resp = read_event_stream_detached(
            std::io::Cursor::new(body.into_bytes()),
            |t: &str| seen.push(t.to_string()),
            &CancellationToken::new(),
        )
        .unwrap();
        assert_eq!(seen, vec!["a", "ab"]);
        assert_eq!(resp.first_text().unwrap(), "ab");
    }

    #[test]
    fn cancel_interrupts_silent_body() {
        let reader = Stalled {
            head: std::io::Cursor::new(format!("data: {}\n\n", chunk("first")).into_bytes()),
            stall: Duration::from_secs(5),
        };
        let token = CancellationToken::new();
        let remote = token.clone();
        let canceller = thread::spawn(move || {
            thread::sleep(Duration::from_millis(200));
            remote.cancel();
        });

        let started = std::time::Instant::now();
        let mut seen = Vec::new();
        let err = read_event_stream_detached(reader, |t: &str| seen.push(t.to_string()), &token)
            .unwrap_err();
        canceller.join().unwrap();

        assert!(err.is_cancelled());
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(seen, vec!["first"]);
    }
}
