use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{watch, Mutex};
use tracing::{debug, info};

use crate::models::{StreamStatus, TranscriptSnapshot};
use crate::session::{MessageSource, ReplaySettings};
use crate::source::EventSourceConnector;

/// One [`MessageSource`] per followed thread.
pub struct TranscriptHub {
    connector: Arc<dyn EventSourceConnector>,
    settings: ReplaySettings,
    sessions: Mutex<HashMap<String, MessageSource>>,
}

impl TranscriptHub {
    pub fn new(connector: Arc<dyn EventSourceConnector>, settings: ReplaySettings) -> Self {
        Self { connector, settings, sessions: Mutex::new(HashMap::new()) }
    }

    /// Starts following `thread_id` unless it is already followed. A session
    /// whose stream closed or failed is reconnected.
    pub async fn follow(&self, thread_id: &str) -> watch::Receiver<TranscriptSnapshot> {
        let mut sessions = self.sessions.lock().await;
        evict_ended(&mut sessions, Some(thread_id));
        let session = sessions
            .entry(thread_id.to_string())
            .or_insert_with(|| MessageSource::new(self.connector.clone(), self.settings));

        if session.thread_id().is_none() || is_ended(session) {
            session.connect(Some(thread_id)).await;
        }
        session.subscribe()
    }

    /// Current transcript of `thread_id`, following it first if needed.
    pub async fn snapshot(&self, thread_id: &str) -> TranscriptSnapshot {
        let rx = self.follow(thread_id).await;
        let snapshot = rx.borrow().clone();
        snapshot
    }

    /// Stops following `thread_id`. Returns whether it was followed.
    pub async fn unfollow(&self, thread_id: &str) -> bool {
        let removed = self.sessions.lock().await.remove(thread_id);
        match removed {
            Some(mut session) => {
                session.disconnect().await;
                true
            }
            None => false,
        }
    }

    /// Drops sessions whose stream ended and that nobody is watching.
    /// Returns how many were dropped.
    pub async fn evict_ended(&self) -> usize {
        evict_ended(&mut *self.sessions.lock().await, None)
    }

    pub async fn followed(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions.lock().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Disconnects every session.
    pub async fn shutdown(&self) {
        let sessions: Vec<(String, MessageSource)> = self.sessions.lock().await.drain().collect();
        info!(count = sessions.len(), "closing followed threads");
        for (_, mut session) in sessions {
            session.disconnect().await;
        }
    }
}

fn is_ended(session: &MessageSource) -> bool {
    matches!(session.snapshot().status, StreamStatus::Closed | StreamStatus::Failed)
}

/// `keep` is about to be reconnected and stays in the map.
fn evict_ended(sessions: &mut HashMap<String, MessageSource>, keep: Option<&str>) -> usize {
    let before = sessions.len();
    sessions.retain(|id, session| {
        Some(id.as_str()) == keep || session.receiver_count() > 0 || !is_ended(session)
    });
    let evicted = before - sessions.len();
    if evicted > 0 {
        debug!(evicted, "dropped ended thread sessions");
    }
    evicted
}
