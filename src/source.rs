//! Thread event sources.
//!
//! An [`EventSourceConnector`] opens a stream of raw `data:` payloads for a
//! thread. Dropping the stream closes the underlying connection;
//! [`Subscription`] wraps it so that closing is explicit and idempotent.

use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{BoxStream, Stream, StreamExt};
use reqwest::header::ACCEPT;
use tracing::{debug, info};

use crate::errors::{ConsoleError, Result};

/// Raw event payloads for one thread, in arrival order.
pub type EventStream = BoxStream<'static, Result<String>>;

/// Opens event streams for threads.
#[async_trait]
pub trait EventSourceConnector: Send + Sync {
    async fn open(&self, thread_id: &str) -> Result<EventStream>;
}

/// An open event stream for one thread.
pub struct Subscription {
    thread_id: String,
    stream: Option<EventStream>,
}

impl Subscription {
    pub fn new(thread_id: impl Into<String>, stream: EventStream) -> Self {
        Self { thread_id: thread_id.into(), stream: Some(stream) }
    }

    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }

    pub fn is_closed(&self) -> bool {
        self.stream.is_none()
    }

    /// Next raw payload. `None` once upstream ends the stream or after [`close`](Self::close).
    pub async fn next(&mut self) -> Option<Result<String>> {
        match self.stream.as_mut() {
            Some(stream) => stream.next().await,
            None => None,
        }
    }

    /// Closes the connection. Safe to call more than once.
    pub fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            info!(thread_id = %self.thread_id, "closed thread event stream");
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.close();
    }
}

// ── Server-sent events over HTTP ──────────────────────────────────────────────

/// Reads `GET {base_url}/api/threads/{id}/events` as server-sent events.
#[derive(Clone)]
pub struct HttpEventSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpEventSource {
    pub fn new(client: reqwest::Client, base_url: &str) -> Self {
        Self { client, base_url: base_url.trim_end_matches('/').to_string() }
    }

    pub fn events_url(&self, thread_id: &str) -> String {
        format!("{}/api/threads/{thread_id}/events", self.base_url)
    }
}

#[async_trait]
impl EventSourceConnector for HttpEventSource {
    async fn open(&self, thread_id: &str) -> Result<EventStream> {
        let url = self.events_url(thread_id);
        let resp = self
            .client
            .get(&url)
            .header(ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(|e| ConsoleError::connection(&url, e))?;

        if !resp.status().is_success() {
            return Err(ConsoleError::Upstream { status: resp.status().as_u16(), url });
        }

        info!(%url, "opened thread event stream");
        let bytes = resp
            .bytes_stream()
            .map(move |chunk| chunk.map_err(|e| ConsoleError::connection(&url, e)));
        Ok(Box::pin(SseStream::new(bytes)))
    }
}

/// Incremental server-sent events decoder.
///
/// `data:` lines are joined with `\n` and dispatched on a blank line.
/// `event:`, `id:`, `retry:` and comment lines are ignored.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    data: Option<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a chunk of bytes, returning every payload completed by it.
    /// A line that is not valid UTF-8 yields an error and ends decoding of the chunk.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Result<String>> {
        self.buffer.extend_from_slice(chunk);

        let mut ready = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=newline).collect();
            let line = match std::str::from_utf8(&raw) {
                Ok(line) => line.trim_end_matches(['\n', '\r']),
                Err(e) => {
                    self.buffer.clear();
                    self.data = None;
                    ready.push(Err(ConsoleError::InvalidEncoding(e)));
                    return ready;
                }
            };

            if line.is_empty() {
                if let Some(data) = self.data.take() {
                    ready.push(Ok(data));
                }
                continue;
            }

            if line.starts_with(':') {
                continue;
            }

            let (field, value) = match line.split_once(':') {
                Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
                None => (line, ""),
            };

            if field == "data" {
                match self.data.as_mut() {
                    Some(data) => {
                        data.push('\n');
                        data.push_str(value);
                    }
                    None => self.data = Some(value.to_string()),
                }
            } else {
                debug!(field, "ignoring sse field");
            }
        }
        ready
    }

    /// Ends decoding. An event not terminated by a blank line is incomplete
    /// and is discarded; returns whether anything was dropped.
    pub fn finish(&mut self) -> bool {
        let dropped = !self.buffer.is_empty() || self.data.is_some();
        if dropped {
            debug!(pending_bytes = self.buffer.len(), "discarding unterminated sse event");
        }
        self.buffer.clear();
        self.data = None;
        dropped
    }
}

/// Stream adapter that turns a byte stream into SSE `data:` payloads.
pub struct SseStream {
    inner: Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>,
    decoder: SseDecoder,
    ready: VecDeque<Result<String>>,
    done: bool,
}

impl SseStream {
    pub fn new(byte_stream: impl Stream<Item = Result<Bytes>> + Send + 'static) -> Self {
        Self {
            inner: Box::pin(byte_stream),
            decoder: SseDecoder::new(),
            ready: VecDeque::new(),
            done: false,
        }
    }
}

impl Stream for SseStream {
    type Item = Result<String>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            if let Some(payload) = this.ready.pop_front() {
                if payload.is_err() {
                    this.done = true;
                    this.ready.clear();
                }
                return Poll::Ready(Some(payload));
            }
            if this.done {
                return Poll::Ready(None);
            }

            match this.inner.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => {
                    this.ready.extend(this.decoder.feed(&bytes));
                }
                Poll::Ready(Some(Err(e))) => {
                    this.done = true;
                    return Poll::Ready(Some(Err(e)));
                }
                Poll::Ready(None) => {
                    this.done = true;
                    this.decoder.finish();
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
