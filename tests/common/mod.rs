#![allow(dead_code)]

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use agent_console::errors::{ConsoleError, Result};
use agent_console::invoke::{AgentInvoker, InvokeRequest, InvokeResponse};
use agent_console::models::TranscriptSnapshot;
use agent_console::source::{EventSourceConnector, EventStream};
use async_trait::async_trait;
use futures_util::stream::{Stream, StreamExt};
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch, Notify};
use tokio_stream::wrappers::UnboundedReceiverStream;

pub type Feed = mpsc::UnboundedSender<Result<String>>;

/// Event source whose streams are fed by the test. Threads named
/// `unreachable*` fail to open.
#[derive(Default)]
pub struct MockConnector {
    pending: Mutex<HashMap<String, mpsc::UnboundedReceiver<Result<String>>>>,
    pub opened: AtomicUsize,
    pub closed: Arc<AtomicUsize>,
}

impl MockConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Registers a stream for `thread_id` and returns its sending half.
    pub fn feed(&self, thread_id: &str) -> Feed {
        let (tx, rx) = mpsc::unbounded_channel();
        self.pending.lock().insert(thread_id.to_string(), rx);
        tx
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventSourceConnector for MockConnector {
    async fn open(&self, thread_id: &str) -> Result<EventStream> {
        if thread_id.starts_with("unreachable") {
            return Err(ConsoleError::connection(format!("mock://{thread_id}"), "refused"));
        }
        self.opened.fetch_add(1, Ordering::SeqCst);

        let inner: EventStream = match self.pending.lock().remove(thread_id) {
            Some(rx) => Box::pin(UnboundedReceiverStream::new(rx)),
            None => Box::pin(futures_util::stream::pending()),
        };
        Ok(Box::pin(Tracked { inner, closed: self.closed.clone() }))
    }
}

/// Counts how many streams were dropped.
struct Tracked {
    inner: EventStream,
    closed: Arc<AtomicUsize>,
}

impl Stream for Tracked {
    type Item = Result<String>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().inner.poll_next_unpin(cx)
    }
}

impl Drop for Tracked {
    fn drop(&mut self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Invoker that records requests and answers with a fixed thread id.
/// With a `gate`, each call waits for a notification before answering.
#[derive(Default)]
pub struct MockInvoker {
    pub requests: Mutex<Vec<InvokeRequest>>,
    pub thread_id: Option<String>,
    pub fail: bool,
    pub gate: Option<Arc<Notify>>,
}

#[async_trait]
impl AgentInvoker for MockInvoker {
    async fn invoke(&self, request: &InvokeRequest) -> Result<InvokeResponse> {
        self.requests.lock().push(request.clone());
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if self.fail {
            return Err(ConsoleError::Upstream { status: 503, url: "mock://invoke".into() });
        }
        Ok(InvokeResponse { thread_id: self.thread_id.clone() })
    }
}

pub fn send(feed: &Feed, json: &str) {
    feed.send(Ok(json.to_string())).expect("stream receiver alive");
}

/// Waits (bounded) until a snapshot satisfies `pred`.
pub async fn wait_for(
    rx: &mut watch::Receiver<TranscriptSnapshot>,
    pred: impl FnMut(&TranscriptSnapshot) -> bool,
) -> TranscriptSnapshot {
    let snapshot = tokio::time::timeout(Duration::from_secs(5), rx.wait_for(pred))
        .await
        .expect("timed out waiting for snapshot")
        .expect("snapshot sender alive");
    (*snapshot).clone()
}

/// Yields until `cond` holds, failing after a bounded number of tries.
pub async fn eventually(mut cond: impl FnMut() -> bool) {
    for _ in 0..1000 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    panic!("condition not reached");
}
