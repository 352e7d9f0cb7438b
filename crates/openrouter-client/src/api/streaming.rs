//! Server-Sent Events (SSE) streaming for chat and prompt completions.
//!
//! A streaming call establishes the HTTP response once (never retried) and
//! hands its body to a reader task. The task decodes `data:` frames into
//! [`StreamEvent`]s and pushes them through a bounded channel to the
//! [`ChatStream`] handle, which callers consume as a [`futures::Stream`].
//!
//! The sequence ends on the `[DONE]` sentinel (clean), on an explicit
//! [`ChatStream::close`] (clean), or on a failure, which is recorded in the
//! stream's terminal error slot and readable through [`ChatStream::err`]
//! once iteration has finished:
//!
//! | Cause | Terminal error |
//! |-------|----------------|
//! | Body read failure, idle timeout, EOF before `[DONE]` | [`Error::Transport`] |
//! | Frame is not valid UTF-8 / JSON | [`Error::Api`] (decode failure) |
//! | In-band `{"error": {...}}` chunk | [`Error::Api`] |
//! | Client cancellation token fired | [`Error::Cancelled`] |
//!
//! Events decoded before the failure are always delivered first.

use crate::api::error::{ApiError, Error, ErrorBody, Result, TransportError, TransportKind};
use crate::api::events::{ClientEvent, EventHandler, NoopHandler, generate_request_id};
use crate::chat::{FunctionCallData, MessageContent, MessageRole, ToolCall, ToolType};
use crate::response::{ChatResponse, Choice, ResponseMessage, Usage};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Deserializer, Serialize};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::string::FromUtf8Error;
use std::sync::Arc;
use std::task::{Context, Poll, ready};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Events buffered between the reader task and the consumer.
const CHANNEL_CAPACITY: usize = 64;

// ── Event types ────────────────────────────────────────────────────

/// One decoded SSE payload.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct StreamEvent {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub created: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub choices: Vec<StreamChoice>,
    /// Present on the final chunk when usage accounting is on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl StreamEvent {
    /// Content delta of the first choice: `delta.content` for chat streams,
    /// `text` for prompt completion streams.
    pub fn content(&self) -> Option<Cow<'_, str>> {
        let choice = self.choices.first()?;
        match &choice.delta.content {
            Some(content) => Some(content.as_text()),
            None => choice.text.as_deref().map(Cow::Borrowed),
        }
    }

    pub fn reasoning(&self) -> Option<&str> {
        self.choices.first()?.delta.reasoning.as_deref()
    }

    pub fn finish_reason(&self) -> Option<&str> {
        self.choices.first()?.finish_reason.as_deref()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct StreamChoice {
    #[serde(default)]
    pub index: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub delta: StreamDelta,
    /// Prompt completion streams carry text here instead of in `delta`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub native_finish_reason: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct StreamDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<MessageRole>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<MessageContent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    /// Tool call fragments, passed through verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallDelta>>,
}

/// A fragment of a tool call. `id` and `function.name` usually arrive on the
/// first fragment for an index; `arguments` is split across many.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct ToolCallDelta {
    #[serde(default)]
    pub index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub tool_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<FunctionCallDelta>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct FunctionCallDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Wire shape of one frame: an event, or an event with an in-band error.
#[derive(Deserialize)]
struct WireChunk {
    #[serde(default)]
    error: Option<ErrorBody>,
    #[serde(flatten)]
    event: StreamEvent,
}

/// Decode one `data:` payload. `status` is the HTTP status of the stream
/// response, used when an in-band error carries no numeric code.
fn decode_event(data: &str, status: u16) -> Result<StreamEvent> {
    let chunk: WireChunk =
        serde_json::from_str(data).map_err(|e| Error::Api(ApiError::decode(status, &e, data)))?;
    if let Some(body) = chunk.error {
        let code = body.numeric_code().unwrap_or(status);
        return Err(Error::Api(body.into_api_error(code, data.to_string())));
    }
    Ok(chunk.event)
}

// ── SSE decoder ────────────────────────────────────────────────────

/// A complete SSE frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Frame {
    Data(String),
    /// The `[DONE]` sentinel.
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum DecoderState {
    #[default]
    AwaitingFrame,
    AccumulatingFrame,
}

/// Incremental SSE line parser. Bytes go in through [`push`](Self::push) in
/// whatever pieces the network delivers; complete frames come out of
/// [`next_frame`](Self::next_frame).
#[derive(Debug, Default)]
pub(crate) struct SseDecoder {
    buf: Vec<u8>,
    /// Start of the unconsumed input in `buf`.
    pos: usize,
    /// `buf[pos..scanned]` is known to hold no newline.
    scanned: usize,
    data: Vec<u8>,
    state: DecoderState,
}

impl SseDecoder {
    pub(crate) fn push(&mut self, chunk: &[u8]) {
        if self.pos > 0 {
            self.buf.drain(..self.pos);
            self.scanned -= self.pos;
            self.pos = 0;
        }
        self.buf.extend_from_slice(chunk);
    }

    /// The next complete frame, or `None` when more input is needed.
    /// Fails only when a frame's data is not valid UTF-8; the error keeps
    /// the offending bytes.
    pub(crate) fn next_frame(&mut self) -> std::result::Result<Option<Frame>, FromUtf8Error> {
        loop {
            let from = self.scanned.max(self.pos);
            let Some(offset) = self.buf[from..].iter().position(|&b| b == b'\n') else {
                self.scanned = self.buf.len();
                return Ok(None);
            };
            let end = from + offset;
            let mut line = self.buf[self.pos..end].to_vec();
            self.pos = end + 1;
            self.scanned = self.pos;
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            if line.is_empty() {
                if let Some(frame) = self.finish_frame()? {
                    return Ok(Some(frame));
                }
            } else {
                self.accept_line(&line);
            }
        }
    }

    fn accept_line(&mut self, line: &[u8]) {
        // Comment, e.g. ": OPENROUTER PROCESSING" keep-alives.
        if line.first() == Some(&b':') {
            return;
        }
        let (field, value) = match line.iter().position(|&b| b == b':') {
            Some(i) => {
                let value = &line[i + 1..];
                (&line[..i], value.strip_prefix(b" ").unwrap_or(value))
            }
            None => (line, &[][..]),
        };
        // event:, id:, retry: carry nothing OpenRouter relies on.
        if field != b"data" {
            return;
        }
        if self.state == DecoderState::AccumulatingFrame {
            self.data.push(b'\n');
        }
        self.data.extend_from_slice(value);
        self.state = DecoderState::AccumulatingFrame;
    }

    fn finish_frame(&mut self) -> std::result::Result<Option<Frame>, FromUtf8Error> {
        if self.state == DecoderState::AwaitingFrame {
            return Ok(None);
        }
        self.state = DecoderState::AwaitingFrame;
        let text = String::from_utf8(std::mem::take(&mut self.data))?;
        if text.trim() == "[DONE]" {
            Ok(Some(Frame::Done))
        } else {
            Ok(Some(Frame::Data(text)))
        }
    }

    /// Called at end of input: whether the unterminated remainder is the
    /// `[DONE]` sentinel missing only its blank line.
    pub(crate) fn finish(&mut self) -> bool {
        if self.pos < self.buf.len() {
            let rest = self.buf.split_off(self.pos);
            let line = rest.strip_suffix(b"\r").unwrap_or(&rest[..]);
            self.accept_line(line);
        }
        self.buf.clear();
        self.pos = 0;
        self.scanned = 0;
        matches!(self.finish_frame(), Ok(Some(Frame::Done)))
    }
}

/// A frame whose data is not UTF-8, as a decode failure carrying the
/// lossily decoded frame.
fn invalid_frame(err: &FromUtf8Error, status: u16) -> Error {
    Error::Api(ApiError::decode(
        status,
        format_args!("invalid UTF-8 in stream frame: {}", err.utf8_error()),
        String::from_utf8_lossy(err.as_bytes()),
    ))
}

// ── Stream handle ──────────────────────────────────────────────────

/// Everything the reader task needs besides the body and the channel.
pub(crate) struct ReaderContext {
    /// The client's cancellation token.
    pub(crate) cancel: CancellationToken,
    pub(crate) idle_timeout: Duration,
    pub(crate) request_id: String,
    pub(crate) events: Arc<dyn EventHandler>,
    /// HTTP status of the stream response.
    pub(crate) status: u16,
}

/// How the reader stopped without an error.
enum End {
    Done,
    Closed,
}

/// A live stream of [`StreamEvent`]s.
///
/// Iterate with [`StreamExt::next`]; `None` means the stream is over, and
/// [`err`](Self::err) then tells a clean finish from a failure. The handle
/// owns the connection: [`close`](Self::close) (or dropping the handle)
/// releases it immediately, even if events are still buffered.
pub struct ChatStream {
    rx: mpsc::Receiver<StreamEvent>,
    reader: Option<JoinHandle<Option<Error>>>,
    close: CancellationToken,
    terminal: Option<Error>,
    closed: bool,
}

impl ChatStream {
    /// Decode an SSE byte stream. Spawns the reader task, so it must be
    /// called from within a tokio runtime.
    ///
    /// `cancel` ends the stream with [`Error::Cancelled`]; `idle_timeout`
    /// bounds the silence between two reads of `body`.
    pub fn new<S, E>(body: S, cancel: CancellationToken, idle_timeout: Duration) -> Self
    where
        S: Stream<Item = std::result::Result<Bytes, E>> + Send + 'static,
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::spawn(
            body,
            ReaderContext {
                cancel,
                idle_timeout,
                request_id: generate_request_id(),
                events: Arc::new(NoopHandler),
                status: 200,
            },
        )
    }

    pub(crate) fn spawn<S, E>(body: S, ctx: ReaderContext) -> Self
    where
        S: Stream<Item = std::result::Result<Bytes, E>> + Send + 'static,
        E: std::error::Error + Send + Sync + 'static,
    {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let close = CancellationToken::new();
        let reader = tokio::spawn(read_stream(body, tx, close.clone(), ctx));
        Self {
            rx,
            reader: Some(reader),
            close,
            terminal: None,
            closed: false,
        }
    }

    /// The terminal error, once iteration has returned `None`. `None` here
    /// means the stream finished cleanly (or was closed).
    pub fn err(&self) -> Option<&Error> {
        self.terminal.as_ref()
    }

    /// Like [`err`](Self::err), but hands over ownership.
    pub fn take_err(&mut self) -> Option<Error> {
        self.terminal.take()
    }

    /// Stop delivery and release the connection. Idempotent; safe before
    /// iteration started.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.close.cancel();
        self.rx.close();
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Drain the stream. Returns the terminal error if there was one, in
    /// which case the events received before it are discarded.
    pub async fn collect_events(mut self) -> Result<Vec<StreamEvent>> {
        let mut events = Vec::new();
        while let Some(event) = self.next().await {
            events.push(event);
        }
        match self.terminal.take() {
            Some(err) => Err(err),
            None => Ok(events),
        }
    }

    /// Drain the stream into a single assembled response.
    pub async fn into_response(mut self) -> Result<ChatResponse> {
        let mut acc = StreamAccumulator::default();
        while let Some(event) = self.next().await {
            acc.push(&event);
        }
        match self.terminal.take() {
            Some(err) => Err(err),
            None => Ok(acc.into_response()),
        }
    }
}

impl Stream for ChatStream {
    type Item = StreamEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<StreamEvent>> {
        let this = self.get_mut();
        if this.closed {
            return Poll::Ready(None);
        }
        if let Some(event) = ready!(this.rx.poll_recv(cx)) {
            return Poll::Ready(Some(event));
        }
        // Channel drained and the sender is gone: collect the reader's verdict.
        if let Some(reader) = this.reader.as_mut() {
            let outcome = ready!(Pin::new(reader).poll(cx));
            this.reader = None;
            this.terminal = match outcome {
                Ok(err) => err,
                Err(join) if join.is_cancelled() => None,
                Err(join) => Some(Error::Transport(TransportError::new(
                    TransportKind::Other,
                    format!("stream reader failed: {join}"),
                ))),
            };
        }
        Poll::Ready(None)
    }
}

impl Drop for ChatStream {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for ChatStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatStream")
            .field("closed", &self.closed)
            .field("terminal", &self.terminal)
            .finish_non_exhaustive()
    }
}

async fn read_stream<S, E>(
    body: S,
    tx: mpsc::Sender<StreamEvent>,
    close: CancellationToken,
    ctx: ReaderContext,
) -> Option<Error>
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    let mut delivered = 0;
    let outcome = pump(body, &tx, &close, &ctx, &mut delivered).await;
    drop(tx);
    let error = match outcome {
        Ok(End::Done) => {
            trace!(request_id = %ctx.request_id, "Stream sentinel received");
            None
        }
        Ok(End::Closed) => {
            debug!(request_id = %ctx.request_id, "Stream closed by consumer");
            None
        }
        Err(err) => Some(err),
    };
    ctx.events.on_event(&ClientEvent::StreamFinished {
        request_id: &ctx.request_id,
        events: delivered,
        error: error.as_ref(),
    });
    error
}

async fn pump<S, E>(
    body: S,
    tx: &mpsc::Sender<StreamEvent>,
    close: &CancellationToken,
    ctx: &ReaderContext,
    delivered: &mut usize,
) -> Result<End>
where
    S: Stream<Item = std::result::Result<Bytes, E>>,
    E: std::error::Error + Send + Sync + 'static,
{
    let mut body = std::pin::pin!(body);
    let mut decoder = SseDecoder::default();
    loop {
        while let Some(frame) = decoder
            .next_frame()
            .map_err(|e| invalid_frame(&e, ctx.status))?
        {
            let data = match frame {
                Frame::Done => return Ok(End::Done),
                Frame::Data(data) => data,
            };
            let event = decode_event(&data, ctx.status)?;
            tokio::select! {
                biased;
                _ = close.cancelled() => return Ok(End::Closed),
                _ = ctx.cancel.cancelled() => return Err(Error::Cancelled),
                sent = tx.send(event) => {
                    if sent.is_err() {
                        return Ok(End::Closed);
                    }
                }
            }
            *delivered += 1;
        }

        let next = tokio::select! {
            biased;
            _ = close.cancelled() => return Ok(End::Closed),
            _ = ctx.cancel.cancelled() => return Err(Error::Cancelled),
            next = tokio::time::timeout(ctx.idle_timeout, body.next()) => next,
        };
        match next {
            Err(_) => {
                return Err(Error::Transport(TransportError::new(
                    TransportKind::Timeout,
                    format!("no stream data for {:?}", ctx.idle_timeout),
                )));
            }
            Ok(None) => {
                if decoder.finish() {
                    return Ok(End::Done);
                }
                return Err(Error::Transport(TransportError::new(
                    TransportKind::Body,
                    "stream ended before [DONE]",
                )));
            }
            Ok(Some(Err(err))) => {
                return Err(Error::Transport(TransportError::new(TransportKind::Body, err)));
            }
            Ok(Some(Ok(bytes))) => decoder.push(&bytes),
        }
    }
}

// ── Assembly helpers ───────────────────────────────────────────────

/// Assemble the complete text from a sequence of stream events.
pub fn collect_text(events: &[StreamEvent]) -> String {
    events.iter().filter_map(StreamEvent::content).collect()
}

/// Assemble the complete reasoning from a sequence of stream events.
pub fn collect_reasoning(events: &[StreamEvent]) -> String {
    events.iter().filter_map(StreamEvent::reasoning).collect()
}

/// Usage from the last event that carried it.
pub fn extract_usage(events: &[StreamEvent]) -> Option<Usage> {
    events.iter().rev().find_map(|e| e.usage.clone())
}

/// Join tool-call fragments by index into complete calls.
pub fn assemble_tool_calls(events: &[StreamEvent]) -> Vec<ToolCall> {
    let mut acc = StreamAccumulator::default();
    for event in events {
        acc.push(event);
    }
    acc.tool_calls()
}

#[derive(Debug, Default, Clone)]
struct PartialToolCall {
    id: String,
    name: String,
    arguments: String,
}

/// Folds stream events (first choice only) into the pieces of a complete
/// response.
#[derive(Debug, Default, Clone)]
pub struct StreamAccumulator {
    id: String,
    model: String,
    provider: Option<String>,
    created: i64,
    text: String,
    reasoning: String,
    tool_calls: BTreeMap<usize, PartialToolCall>,
    finish_reason: Option<String>,
    native_finish_reason: Option<String>,
    usage: Option<Usage>,
}

impl StreamAccumulator {
    pub fn push(&mut self, event: &StreamEvent) {
        if self.id.is_empty() && !event.id.is_empty() {
            self.id = event.id.clone();
            self.model = event.model.clone();
            self.created = event.created;
        }
        if event.provider.is_some() {
            self.provider = event.provider.clone();
        }
        if let Some(usage) = &event.usage {
            self.usage = Some(usage.clone());
        }
        let Some(choice) = event.choices.iter().find(|c| c.index == 0) else {
            return;
        };
        if let Some(content) = &choice.delta.content {
            self.text.push_str(&content.as_text());
        } else if let Some(text) = &choice.text {
            self.text.push_str(text);
        }
        if let Some(reasoning) = &choice.delta.reasoning {
            self.reasoning.push_str(reasoning);
        }
        for fragment in choice.delta.tool_calls.iter().flatten() {
            let call = self.tool_calls.entry(fragment.index).or_default();
            if let Some(id) = &fragment.id {
                call.id.clone_from(id);
            }
            if let Some(function) = &fragment.function {
                if let Some(name) = &function.name {
                    call.name.push_str(name);
                }
                if let Some(arguments) = &function.arguments {
                    call.arguments.push_str(arguments);
                }
            }
        }
        if choice.finish_reason.is_some() {
            self.finish_reason.clone_from(&choice.finish_reason);
            self.native_finish_reason
                .clone_from(&choice.native_finish_reason);
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn reasoning(&self) -> &str {
        &self.reasoning
    }

    pub fn usage(&self) -> Option<&Usage> {
        self.usage.as_ref()
    }

    pub fn finish_reason(&self) -> Option<&str> {
        self.finish_reason.as_deref()
    }

    /// Completed tool calls in index order.
    pub fn tool_calls(&self) -> Vec<ToolCall> {
        self.tool_calls
            .values()
            .map(|c| ToolCall {
                id: c.id.clone(),
                call_type: ToolType::Function,
                function: FunctionCallData {
                    name: c.name.clone(),
                    arguments: c.arguments.clone(),
                },
            })
            .collect()
    }

    pub fn into_response(self) -> ChatResponse {
        let tool_calls = self.tool_calls();
        ChatResponse {
            id: self.id,
            model: self.model,
            provider: self.provider,
            object: "chat.completion".to_string(),
            created: self.created,
            choices: vec![Choice {
                index: 0,
                message: ResponseMessage {
                    role: MessageRole::Assistant,
                    content: (!self.text.is_empty()).then(|| MessageContent::Text(self.text)),
                    reasoning: (!self.reasoning.is_empty()).then_some(self.reasoning),
                    refusal: None,
                    tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
                    annotations: None,
                },
                finish_reason: self.finish_reason,
                native_finish_reason: self.native_finish_reason,
                logprobs: None,
            }],
            usage: self.usage,
            system_fingerprint: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use std::io;

    type Chunk = std::result::Result<Bytes, io::Error>;

    const IDLE: Duration = Duration::from_secs(30);

    fn frame(content: &str) -> String {
        format!(
            "data: {{\"id\":\"gen-1\",\"model\":\"m\",\"choices\":[{{\"index\":0,\"delta\":{{\"content\":\"{content}\"}}}}]}}\n\n"
        )
    }

    fn body_of(chunks: Vec<String>) -> impl Stream<Item = Chunk> + Send + 'static {
        stream::iter(chunks.into_iter().map(|c| Ok(Bytes::from(c))))
    }

    fn split_every(input: &[u8], size: usize) -> Vec<Chunk> {
        input
            .chunks(size)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect()
    }

    async fn drain(stream: &mut ChatStream) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        while let Some(event) = stream.next().await {
            events.push(event);
        }
        events
    }

    fn three_frames() -> String {
        format!(
            ": OPENROUTER PROCESSING\n\n{}{}{}data: [DONE]\n\n",
            frame("a"),
            frame("b"),
            frame("c")
        )
    }

    #[test]
    fn decoder_handles_every_split_offset() {
        let input = three_frames();
        let bytes = input.as_bytes();
        for offset in 0..=bytes.len() {
            let mut decoder = SseDecoder::default();
            let mut frames = Vec::new();
            for piece in [&bytes[..offset], &bytes[offset..]] {
                decoder.push(piece);
                while let Some(f) = decoder.next_frame().unwrap() {
                    frames.push(f);
                }
            }
            assert_eq!(frames.len(), 4, "split at {offset}");
            assert_eq!(frames[3], Frame::Done, "split at {offset}");
        }
    }

    #[test]
    fn decoder_joins_multiline_data_and_crlf() {
        let mut decoder = SseDecoder::default();
        decoder.push(b"event: message\r\nid: 7\r\ndata: {\"a\":\r\ndata:1}\r\n\r\n");
        assert_eq!(
            decoder.next_frame().unwrap(),
            Some(Frame::Data("{\"a\":\n1}".into()))
        );
        assert_eq!(decoder.next_frame().unwrap(), None);
    }

    #[test]
    fn decoder_ignores_blank_lines_between_frames() {
        let mut decoder = SseDecoder::default();
        decoder.push(b"\n\n: keepalive\n\ndata: [DONE]\n\n");
        assert_eq!(decoder.next_frame().unwrap(), Some(Frame::Done));
    }

    #[test]
    fn decoder_rejects_invalid_utf8() {
        let mut decoder = SseDecoder::default();
        decoder.push(b"data: \xff\xfe\n\n");
        let err = decoder.next_frame().unwrap_err();
        assert_eq!(err.as_bytes(), b"\xff\xfe");
    }

    #[test]
    fn long_line_scanned_once() {
        let payload = "x".repeat(1 << 20);
        let input = format!("data: {payload}");
        let mut decoder = SseDecoder::default();
        for piece in input.as_bytes().chunks(8 * 1024) {
            decoder.push(piece);
            assert_eq!(decoder.next_frame().unwrap(), None);
            assert_eq!(decoder.scanned, decoder.buf.len());
        }
        decoder.push(b"\n\ndata: [DONE]\n\n");
        assert_eq!(decoder.next_frame().unwrap(), Some(Frame::Data(payload)));
        assert_eq!(decoder.next_frame().unwrap(), Some(Frame::Done));
    }

    #[test]
    fn consumed_lines_compacted_on_push() {
        let mut decoder = SseDecoder::default();
        decoder.push(b"data: a\n\ndata: b");
        assert_eq!(decoder.next_frame().unwrap(), Some(Frame::Data("a".into())));
        assert_eq!(decoder.next_frame().unwrap(), None);
        decoder.push(b"c\n\n");
        assert_eq!(decoder.buf, b"data: bc\n\n");
        assert_eq!(decoder.next_frame().unwrap(), Some(Frame::Data("bc".into())));
    }

    #[tokio::test]
    async fn invalid_utf8_frame_kept_for_diagnosis() {
        let body = stream::iter(vec![Ok::<_, io::Error>(Bytes::from_static(
            b"data: {\"id\":\"\xff\"}\n\n",
        ))]);
        let mut stream = ChatStream::new(body, CancellationToken::new(), IDLE);
        assert!(drain(&mut stream).await.is_empty());
        let api = stream.err().unwrap().as_api().unwrap();
        assert!(api.is_decode_failure());
        assert_eq!(api.raw_body, "{\"id\":\"\u{fffd}\"}");
    }

    #[test]
    fn decoder_accepts_sentinel_without_trailing_blank_line() {
        let mut decoder = SseDecoder::default();
        decoder.push(b"data: [DONE]");
        assert_eq!(decoder.next_frame().unwrap(), None);
        assert!(decoder.finish());
    }

    #[tokio::test]
    async fn single_hi_frame_then_done() {
        let body = body_of(vec![frame("Hi"), "data: [DONE]\n\n".into()]);
        let mut stream = ChatStream::new(body, CancellationToken::new(), IDLE);
        let events = drain(&mut stream).await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].content().as_deref(), Some("Hi"));
        assert!(stream.err().is_none());
    }

    #[tokio::test]
    async fn every_chunk_size_yields_all_events() {
        let input = three_frames();
        for size in 1..=input.len() {
            let body = stream::iter(split_every(input.as_bytes(), size));
            let mut stream = ChatStream::new(body, CancellationToken::new(), IDLE);
            let events = drain(&mut stream).await;
            assert_eq!(collect_text(&events), "abc", "chunk size {size}");
            assert!(stream.err().is_none(), "chunk size {size}");
        }
    }

    #[tokio::test]
    async fn drop_mid_frame_delivers_complete_frames_then_errors() {
        let partial = frame("c");
        let cut = &partial.as_bytes()[..partial.len() / 2];
        let mut chunks: Vec<Chunk> = vec![Ok(Bytes::from(frame("a"))), Ok(Bytes::from(frame("b")))];
        chunks.push(Ok(Bytes::copy_from_slice(cut)));
        let mut stream = ChatStream::new(stream::iter(chunks), CancellationToken::new(), IDLE);

        let events = drain(&mut stream).await;
        assert_eq!(collect_text(&events), "ab");
        match stream.err() {
            Some(Error::Transport(t)) => assert_eq!(t.kind, TransportKind::Body),
            other => panic!("expected transport error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn body_read_failure_is_transport_error() {
        let chunks: Vec<Chunk> = vec![
            Ok(Bytes::from(frame("a"))),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset")),
        ];
        let mut stream = ChatStream::new(stream::iter(chunks), CancellationToken::new(), IDLE);
        let events = drain(&mut stream).await;
        assert_eq!(events.len(), 1);
        assert!(matches!(stream.err(), Some(Error::Transport(_))));
    }

    #[tokio::test]
    async fn double_close_is_noop() {
        let body = body_of(vec![frame("a")]).chain(stream::pending());
        let mut stream = ChatStream::new(body, CancellationToken::new(), IDLE);
        stream.close();
        stream.close();
        assert!(stream.is_closed());
        assert!(stream.next().await.is_none());
        assert!(stream.err().is_none());
    }

    #[tokio::test]
    async fn close_stops_delivery_of_buffered_events() {
        let body = body_of(vec![three_frames()]);
        let mut stream = ChatStream::new(body, CancellationToken::new(), IDLE);
        assert!(stream.next().await.is_some());
        stream.close();
        assert!(stream.next().await.is_none());
        assert!(stream.err().is_none());
    }

    #[tokio::test]
    async fn cancel_during_pending_read() {
        let cancel = CancellationToken::new();
        let body = body_of(vec![frame("a")]).chain(stream::pending());
        let mut stream = ChatStream::new(body, cancel.clone(), IDLE);
        assert_eq!(stream.next().await.unwrap().content().as_deref(), Some("a"));

        cancel.cancel();
        assert!(stream.next().await.is_none());
        assert!(stream.err().unwrap().is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn idle_timeout_is_transport_timeout() {
        let body = body_of(vec![frame("a")]).chain(stream::pending());
        let mut stream = ChatStream::new(body, CancellationToken::new(), Duration::from_secs(5));
        let events = drain(&mut stream).await;
        assert_eq!(events.len(), 1);
        match stream.err() {
            Some(Error::Transport(t)) => assert_eq!(t.kind, TransportKind::Timeout),
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn in_band_error_ends_stream() {
        let error = r#"data: {"id":"gen-1","error":{"code":502,"message":"Provider disconnected","metadata":{"provider_name":"Groq"}},"choices":[{"index":0,"delta":{"content":""},"finish_reason":"error"}]}"#;
        let body = body_of(vec![frame("partial "), format!("{error}\n\n"), frame("never")]);
        let mut stream = ChatStream::new(body, CancellationToken::new(), IDLE);

        let events = drain(&mut stream).await;
        assert_eq!(collect_text(&events), "partial ");
        let api = stream.err().and_then(Error::as_api).unwrap();
        assert_eq!(api.status, 502);
        assert_eq!(api.message, "Provider disconnected");
        assert_eq!(api.provider_name(), Some("Groq"));
    }

    #[tokio::test]
    async fn string_error_code_falls_back_to_stream_status() {
        let body = body_of(vec![
            "data: {\"error\":{\"code\":\"server_error\",\"message\":\"boom\"}}\n\n".into(),
        ]);
        let mut stream = ChatStream::new(body, CancellationToken::new(), IDLE);
        assert!(drain(&mut stream).await.is_empty());
        assert_eq!(stream.err().unwrap().status(), Some(200));
    }

    #[tokio::test]
    async fn malformed_json_is_fatal_decode_error() {
        let body = body_of(vec![frame("ok"), "data: {not json\n\n".into(), frame("late")]);
        let mut stream = ChatStream::new(body, CancellationToken::new(), IDLE);
        let events = drain(&mut stream).await;
        assert_eq!(events.len(), 1);
        let err = stream.err().unwrap();
        assert!(err.as_api().unwrap().is_decode_failure());
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn collect_events_surfaces_terminal_error() {
        let body = body_of(vec![frame("a")]);
        let stream = ChatStream::new(body, CancellationToken::new(), IDLE);
        assert!(matches!(
            stream.collect_events().await,
            Err(Error::Transport(_))
        ));
    }

    #[test]
    fn null_choices_tolerated() {
        let event = decode_event(r#"{"id":"x","choices":null,"usage":{"prompt_tokens":3,"completion_tokens":2,"total_tokens":5}}"#, 200).unwrap();
        assert!(event.choices.is_empty());
        assert_eq!(extract_usage(&[event]).unwrap().total_tokens, 5);
    }

    #[test]
    fn prompt_completion_text_counts_as_content() {
        let event = decode_event(r#"{"choices":[{"index":0,"text":"Once"}]}"#, 200).unwrap();
        assert_eq!(event.content().as_deref(), Some("Once"));
    }

    #[test]
    fn part_list_delta_flattened_to_text() {
        let event = decode_event(
            r#"{"choices":[{"index":0,"delta":{"content":[{"type":"text","text":"Hi"},{"type":"image_url","image_url":{"url":"https://x/y.png"}},{"type":"text","text":"!"}]}}]}"#,
            200,
        )
        .unwrap();
        assert_eq!(event.content().as_deref(), Some("Hi!"));
        assert_eq!(collect_text(&[event]), "Hi!");
    }

    #[test]
    fn tool_call_fragments_assembled_by_index() {
        let chunks = [
            r#"{"choices":[{"index":0,"delta":{"tool_calls":[{"index":0,"id":"call_a","type":"function","function":{"name":"read_file","arguments":""}}]}}]}"#,
            r#"{"choices":[{"index":0,"delta":{"tool_calls":[{"index":1,"id":"call_b","function":{"name":"grep","arguments":"{\"pat"}}]}}]}"#,
            r#"{"choices":[{"index":0,"delta":{"tool_calls":[{"index":0,"function":{"arguments":"{\"path\":"}}]}}]}"#,
            r#"{"choices":[{"index":0,"delta":{"tool_calls":[{"index":0,"function":{"arguments":"\"a.rs\"}"}}]}}]}"#,
            r#"{"choices":[{"index":0,"delta":{"tool_calls":[{"index":1,"function":{"arguments":"tern\":\"x\"}"}}]},"finish_reason":"tool_calls"}]}"#,
        ];
        let events: Vec<StreamEvent> = chunks
            .iter()
            .map(|c| decode_event(c, 200).unwrap())
            .collect();

        let calls = assemble_tool_calls(&events);
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].id, "call_a");
        assert_eq!(calls[0].function.name, "read_file");
        assert_eq!(calls[0].function.arguments, r#"{"path":"a.rs"}"#);
        assert_eq!(calls[1].function.arguments, r#"{"pattern":"x"}"#);
    }

    #[test]
    fn accumulator_builds_response() {
        let mut acc = StreamAccumulator::default();
        for raw in [
            r#"{"id":"gen-9","model":"m","provider":"OpenAI","choices":[{"index":0,"delta":{"role":"assistant","reasoning":"hmm"}}]}"#,
            r#"{"id":"gen-9","model":"m","choices":[{"index":0,"delta":{"content":"Hel"}}]}"#,
            r#"{"id":"gen-9","model":"m","choices":[{"index":0,"delta":{"content":"lo"},"finish_reason":"stop"}]}"#,
            r#"{"id":"gen-9","model":"m","choices":[],"usage":{"prompt_tokens":1,"completion_tokens":2,"total_tokens":3}}"#,
        ] {
            acc.push(&decode_event(raw, 200).unwrap());
        }
        assert_eq!(acc.text(), "Hello");
        assert_eq!(acc.finish_reason(), Some("stop"));
        let resp = acc.into_response();
        assert_eq!(resp.id, "gen-9");
        assert_eq!(resp.provider.as_deref(), Some("OpenAI"));
        assert_eq!(resp.content().as_deref(), Some("Hello"));
        assert_eq!(resp.reasoning(), Some("hmm"));
        assert_eq!(resp.usage.unwrap().total_tokens, 3);
    }
}
