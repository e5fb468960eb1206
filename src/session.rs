//! A followed thread: one task owns the transcript and consumes the event stream.

use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::errors::{ConsoleError, Result};
use crate::models::{StreamStatus, TranscriptSnapshot};
use crate::source::{EventSourceConnector, Subscription};
use crate::transcript::{TranscriptReducer, DEFAULT_REPLAY_BUFFER_LIMIT};

/// Bounds on how long and how much history is held back while replaying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplaySettings {
    pub timeout: Duration,
    pub buffer_limit: usize,
}

impl Default for ReplaySettings {
    fn default() -> Self {
        Self { timeout: Duration::from_secs(30), buffer_limit: DEFAULT_REPLAY_BUFFER_LIMIT }
    }
}

struct Active {
    thread_id: String,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Follows at most one thread at a time and publishes its transcript.
///
/// Readers get snapshots through [`subscribe`](Self::subscribe); only the
/// background task writes them.
pub struct MessageSource {
    connector: Arc<dyn EventSourceConnector>,
    settings: ReplaySettings,
    snapshots: watch::Sender<TranscriptSnapshot>,
    active: Option<Active>,
}

impl MessageSource {
    pub fn new(connector: Arc<dyn EventSourceConnector>, settings: ReplaySettings) -> Self {
        let (snapshots, _) = watch::channel(TranscriptSnapshot::default());
        Self { connector, settings, snapshots, active: None }
    }

    pub fn subscribe(&self) -> watch::Receiver<TranscriptSnapshot> {
        self.snapshots.subscribe()
    }

    /// Number of live snapshot receivers.
    pub fn receiver_count(&self) -> usize {
        self.snapshots.receiver_count()
    }

    pub fn snapshot(&self) -> TranscriptSnapshot {
        self.snapshots.borrow().clone()
    }

    /// The thread currently followed, if any.
    pub fn thread_id(&self) -> Option<&str> {
        self.active.as_ref().map(|a| a.thread_id.as_str())
    }

    /// Switches to `thread_id`: closes the previous subscription, clears the
    /// transcript and, when an id is given, opens a new subscription.
    pub async fn connect(&mut self, thread_id: Option<&str>) {
        self.disconnect().await;

        let thread_id = thread_id.filter(|id| !id.is_empty());
        self.snapshots.send_replace(TranscriptSnapshot {
            thread_id: thread_id.map(str::to_string),
            status: if thread_id.is_some() { StreamStatus::Replaying } else { StreamStatus::Idle },
            ..Default::default()
        });

        let Some(thread_id) = thread_id else {
            return;
        };

        info!(thread_id, "following thread");
        let cancel = CancellationToken::new();
        let task = tokio::spawn(follow(
            self.connector.clone(),
            thread_id.to_string(),
            self.settings,
            self.snapshots.clone(),
            cancel.clone(),
        ));
        self.active = Some(Active { thread_id: thread_id.to_string(), cancel, task });
    }

    /// Closes the active subscription and waits for it to wind down. Safe to call more than once.
    pub async fn disconnect(&mut self) {
        let Some(active) = self.active.take() else {
            return;
        };

        active.cancel.cancel();
        if let Err(e) = active.task.await {
            error!(thread_id = %active.thread_id, "thread follower task failed: {e}");
        }
        info!(thread_id = %active.thread_id, "stopped following thread");
    }
}

impl Drop for MessageSource {
    fn drop(&mut self) {
        if let Some(active) = self.active.take() {
            active.cancel.cancel();
        }
    }
}

fn publish(tx: &watch::Sender<TranscriptSnapshot>, reducer: &TranscriptReducer) {
    let status = if reducer.is_replaying() { StreamStatus::Replaying } else { StreamStatus::Live };
    let transcript = reducer.transcript();
    tx.send_modify(|snapshot| {
        snapshot.messages = transcript.messages().to_vec();
        snapshot.is_running = transcript.is_running();
        snapshot.status = status;
    });
}

fn finish(tx: &watch::Sender<TranscriptSnapshot>, failure: Option<&ConsoleError>) {
    tx.send_modify(|snapshot| match failure {
        Some(e) => {
            snapshot.status = StreamStatus::Failed;
            snapshot.error = Some(e.to_string());
        }
        None => snapshot.status = StreamStatus::Closed,
    });
}

async fn follow(
    connector: Arc<dyn EventSourceConnector>,
    thread_id: String,
    settings: ReplaySettings,
    tx: watch::Sender<TranscriptSnapshot>,
    cancel: CancellationToken,
) {
    let opened = tokio::select! {
        _ = cancel.cancelled() => {
            finish(&tx, None);
            return;
        }
        opened = connector.open(&thread_id) => opened,
    };

    let mut subscription = match opened {
        Ok(stream) => Subscription::new(thread_id.as_str(), stream),
        Err(e) => {
            error!(%thread_id, "failed to open thread event stream: {e}");
            finish(&tx, Some(&e));
            return;
        }
    };

    let mut reducer = TranscriptReducer::new(settings.buffer_limit);
    let replay_deadline = Instant::now().checked_add(settings.timeout);
    if replay_deadline.is_none() {
        debug!(%thread_id, timeout = ?settings.timeout, "replay timeout out of range, waiting for the marker only");
    }
    let replay_timer = tokio::time::sleep_until(replay_deadline.unwrap_or_else(Instant::now));
    tokio::pin!(replay_timer);

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                subscription.close();
                finish(&tx, None);
                break;
            }

            _ = &mut replay_timer, if replay_deadline.is_some() && reducer.is_replaying() => {
                let flushed = reducer.flush_replay();
                warn!(
                    %thread_id,
                    flushed,
                    timeout = ?settings.timeout,
                    "replay marker not received in time, switching to live events"
                );
                publish(&tx, &reducer);
            }

            next = subscription.next() => {
                let (applied, batch) = apply_ready(&mut subscription, &mut reducer, next, &thread_id);
                if applied > 0 {
                    publish(&tx, &reducer);
                }
                match batch {
                    Batch::Open => {}
                    Batch::Failed(e) => {
                        error!(%thread_id, "dropping thread event stream: {e}");
                        subscription.close();
                        finish(&tx, Some(&e));
                        break;
                    }
                    Batch::Ended => {
                        info!(%thread_id, "upstream ended thread event stream");
                        subscription.close();
                        finish(&tx, None);
                        break;
                    }
                }
            }
        }
    }
}

/// Upper bound on payloads folded between two snapshot publications.
const MAX_BATCH: usize = 256;

enum Batch {
    /// The stream is still open.
    Open,
    Ended,
    Failed(ConsoleError),
}

/// Folds `first` and every payload already waiting behind it, so that a burst
/// of fragments is published as one snapshot.
fn apply_ready(
    subscription: &mut Subscription,
    reducer: &mut TranscriptReducer,
    first: Option<Result<String>>,
    thread_id: &str,
) -> (usize, Batch) {
    let mut applied = 0;
    let mut item = first;
    let mut taken = 1;

    loop {
        match item {
            Some(Ok(raw)) => match reducer.on_raw(&raw) {
                Ok(progress) => {
                    if progress.forced {
                        warn!(thread_id, "replay buffer full, switching to live events");
                    }
                    applied += progress.applied;
                }
                Err(e) => return (applied, Batch::Failed(e)),
            },
            Some(Err(e)) => return (applied, Batch::Failed(e)),
            None => return (applied, Batch::Ended),
        }

        if taken == MAX_BATCH {
            return (applied, Batch::Open);
        }
        match subscription.next().now_or_never() {
            Some(next) => {
                item = next;
                taken += 1;
            }
            None => return (applied, Batch::Open),
        }
    }
}
