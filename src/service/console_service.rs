use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::info;

use crate::cache::{Revalidator, ThreadListCache};
use crate::chat::{ChatController, InvokeOutcome};
use crate::errors::{ConsoleError, Result};
use crate::hub::TranscriptHub;
use crate::invoke::AgentInvoker;
use crate::models::{AgentStatus, ChatMode, InvokeBody, InvokeReply, ThreadList, TranscriptSnapshot};

/// Controllers are shared per agent, mode and read-only flag.
type ChatKey = (String, ChatMode, bool);

#[derive(Clone)]
pub struct ConsoleService {
    hub: Arc<TranscriptHub>,
    invoker: Arc<dyn AgentInvoker>,
    revalidator: Arc<Revalidator>,
    threads: Arc<ThreadListCache>,
    chats: Arc<Mutex<HashMap<ChatKey, Arc<ChatController>>>>,
}

impl ConsoleService {
    pub fn new(
        hub: Arc<TranscriptHub>,
        invoker: Arc<dyn AgentInvoker>,
        revalidator: Arc<Revalidator>,
        threads: Arc<ThreadListCache>,
    ) -> Self {
        Self { hub, invoker, revalidator, threads, chats: Arc::default() }
    }

    pub fn hub(&self) -> &Arc<TranscriptHub> {
        &self.hub
    }

    pub async fn get_threads(&self) -> Result<ThreadList> {
        self.threads.threads().await
    }

    pub async fn get_transcript(&self, thread_id: &str) -> TranscriptSnapshot {
        self.hub.snapshot(thread_id).await
    }

    pub async fn watch_transcript(&self, thread_id: &str) -> watch::Receiver<TranscriptSnapshot> {
        self.hub.follow(thread_id).await
    }

    pub async fn close_transcript(&self, thread_id: &str) -> bool {
        self.hub.unfollow(thread_id).await
    }

    /// Whether a run is being started for `agent_id` in any mode.
    pub fn is_invoking(&self, agent_id: &str) -> bool {
        self.chats
            .lock()
            .values()
            .any(|chat| chat.agent_id() == agent_id && chat.is_invoking())
    }

    pub fn agent_status(&self, agent_id: &str) -> AgentStatus {
        AgentStatus { agent_id: agent_id.to_string(), invoking: self.is_invoking(agent_id) }
    }

    fn chat(&self, agent_id: &str, mode: ChatMode, read_only: bool) -> Arc<ChatController> {
        self.chats
            .lock()
            .entry((agent_id.to_string(), mode, read_only))
            .or_insert_with(|| {
                Arc::new(
                    ChatController::new(agent_id, self.invoker.clone(), self.revalidator.clone())
                        .with_mode(mode)
                        .read_only(read_only),
                )
            })
            .clone()
    }

    pub async fn invoke(&self, agent_id: &str, body: InvokeBody) -> Result<InvokeReply> {
        // ── Validation ────────────────────────────────────────────────────────
        if body.prompt.trim().is_empty() {
            return Err(ConsoleError::EmptyField { field_name: "prompt".to_string() });
        }

        let controller = self.chat(agent_id, body.mode, body.read_only);

        let reply = match controller.invoke(Some(&body.prompt), body.thread.as_deref()).await? {
            InvokeOutcome::Skipped => InvokeReply { thread_id: body.thread, created: false, skipped: true },
            InvokeOutcome::Invoked { thread_id } => InvokeReply { thread_id, created: false, skipped: false },
            InvokeOutcome::Created(thread_id) => {
                // Follow the new thread right away so its first run is not missed.
                info!(agent_id, %thread_id, "agent created thread");
                self.hub.follow(&thread_id).await;
                InvokeReply { thread_id: Some(thread_id), created: true, skipped: false }
            }
        };
        Ok(reply)
    }
}
