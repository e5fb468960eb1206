use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::cache::{Revalidator, THREADS_KEY};
use crate::errors::Result;
use crate::invoke::{AgentInvoker, InvokeRequest};
use crate::models::ChatMode;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvokeOutcome {
    /// Nothing was sent: empty prompt, workflow mode or read-only chat.
    Skipped,
    /// The run was started on an existing thread (or upstream reported none).
    Invoked { thread_id: Option<String> },
    /// Upstream created this thread for the run.
    Created(String),
}

/// Sends prompts for one agent chat.
pub struct ChatController {
    agent_id: String,
    mode: ChatMode,
    read_only: bool,
    invoker: Arc<dyn AgentInvoker>,
    revalidator: Arc<Revalidator>,
    invoking: AtomicUsize,
}

struct Invoking<'a>(&'a AtomicUsize);

impl Drop for Invoking<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ChatController {
    pub fn new(
        agent_id: impl Into<String>,
        invoker: Arc<dyn AgentInvoker>,
        revalidator: Arc<Revalidator>,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            mode: ChatMode::Agent,
            read_only: false,
            invoker,
            revalidator,
            invoking: AtomicUsize::new(0),
        }
    }

    pub fn with_mode(mut self, mode: ChatMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub fn is_invoking(&self) -> bool {
        self.invoking.load(Ordering::SeqCst) > 0
    }

    /// Sends a message typed by the user.
    pub async fn process_user_message(&self, text: &str, thread: Option<&str>) -> Result<InvokeOutcome> {
        self.invoke(Some(text), thread).await
    }

    /// Starts a run for `prompt` on `thread`, or on a new thread when `thread` is `None`.
    pub async fn invoke(&self, prompt: Option<&str>, thread: Option<&str>) -> Result<InvokeOutcome> {
        let Some(prompt) = prompt.filter(|p| !p.is_empty()) else {
            return Ok(InvokeOutcome::Skipped);
        };
        if self.mode == ChatMode::Workflow || self.read_only {
            debug!(agent_id = %self.agent_id, mode = ?self.mode, read_only = self.read_only, "chat does not accept prompts");
            return Ok(InvokeOutcome::Skipped);
        }

        self.invoking.fetch_add(1, Ordering::SeqCst);
        let _invoking = Invoking(&self.invoking);

        let request = InvokeRequest {
            id: self.agent_id.clone(),
            prompt: prompt.to_string(),
            thread: thread.map(str::to_string),
        };
        let response = self.invoker.invoke(&request).await?;

        match (response.thread_id, thread) {
            (Some(created), None) => {
                if let Err(e) = self.revalidator.revalidate(THREADS_KEY).await {
                    warn!("Failed to revalidate thread list: {e}");
                }
                Ok(InvokeOutcome::Created(created))
            }
            (reported, existing) => Ok(InvokeOutcome::Invoked {
                thread_id: reported.or_else(|| existing.map(str::to_string)),
            }),
        }
    }
}
