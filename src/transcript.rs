//! Folds upstream chat events into an ordered list of display messages.
//!
//! [`Transcript`] is the pure fold, [`ReplayGate`] holds back replayed history
//! until upstream signals it has caught up, and [`TranscriptReducer`] combines
//! the two behind a raw-payload entry point.

use std::collections::HashMap;

use tracing::debug;

use crate::errors::{ConsoleError, Result};
use crate::messages::{prompt_message, tool_call_message};
use crate::models::{non_empty, ChatEvent, Message, Sender};

/// Default bound on the number of events held while replaying.
pub const DEFAULT_REPLAY_BUFFER_LIMIT: usize = 10_000;

/// What a single [`Transcript::apply`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// Text was appended to the message at this index.
    Extended(usize),
    /// A new message was pushed at this index.
    Appended(usize),
    /// The event carried nothing renderable.
    Ignored,
}

/// Ordered display messages plus the running flag of the latest run.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    messages: Vec<Message>,
    by_content_id: HashMap<String, usize>,
    is_running: bool,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn is_running(&self) -> bool {
        self.is_running
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Applies one event. The first matching rule wins:
    /// known content id, error, input, tool call, prompt, content.
    pub fn apply(&mut self, event: &ChatEvent) -> Applied {
        self.is_running = !event.run_complete;

        let content_id = event.content_key();
        let run_id = event.run_id.as_deref();

        if let Some(&index) = content_id.and_then(|id| self.by_content_id.get(id)) {
            let fragment = event.content.as_deref().unwrap_or_default();
            self.messages[index].text.push_str(fragment);
            return Applied::Extended(index);
        }

        let message = if let Some(error) = non_empty(&event.error) {
            Message {
                error: true,
                ..Message::new(Sender::Agent, error)
                    .with_run(run_id)
                    .with_content_id(content_id)
            }
        } else if let Some(input) = non_empty(&event.input) {
            Message::new(Sender::User, input)
                .with_run(run_id)
                .with_content_id(content_id)
        } else if let Some(tool_call) = &event.tool_call {
            tool_call_message(tool_call)
        } else if let Some(prompt) = &event.prompt {
            prompt_message(prompt, run_id)
        } else if let Some(content) = non_empty(&event.content) {
            Message::new(Sender::Agent, content)
                .with_run(run_id)
                .with_content_id(content_id)
        } else {
            return Applied::Ignored;
        };

        Applied::Appended(self.push(message))
    }

    fn push(&mut self, message: Message) -> usize {
        let index = self.messages.len();
        if let Some(id) = non_empty(&message.content_id) {
            self.by_content_id.entry(id.to_string()).or_insert(index);
        }
        self.messages.push(message);
        index
    }
}

/// Outcome of offering an event to a [`ReplayGate`].
#[derive(Debug, Clone, PartialEq)]
pub enum Admission {
    /// Still replaying; the event was buffered.
    Held,
    /// Events to apply now, in order.
    Ready(Vec<ChatEvent>),
    /// The buffer hit its limit and was released early, in order.
    Forced(Vec<ChatEvent>),
}

/// Buffers replayed events until the `replayComplete` marker arrives.
#[derive(Debug, Clone)]
pub struct ReplayGate {
    buffer: Vec<ChatEvent>,
    complete: bool,
    limit: usize,
}

impl Default for ReplayGate {
    fn default() -> Self {
        Self::new(DEFAULT_REPLAY_BUFFER_LIMIT)
    }
}

impl ReplayGate {
    pub fn new(limit: usize) -> Self {
        Self { buffer: Vec::new(), complete: false, limit: limit.max(1) }
    }

    pub fn is_replaying(&self) -> bool {
        !self.complete
    }

    /// Number of events currently held.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    pub fn admit(&mut self, event: ChatEvent) -> Admission {
        if self.complete {
            return Admission::Ready(vec![event]);
        }

        if event.replay_complete {
            self.complete = true;
            let mut ready = std::mem::take(&mut self.buffer);
            ready.push(event);
            return Admission::Ready(ready);
        }

        self.buffer.push(event);
        if self.buffer.len() >= self.limit {
            return Admission::Forced(self.force_complete());
        }
        Admission::Held
    }

    /// Ends replay without a marker, releasing everything held so far.
    pub fn force_complete(&mut self) -> Vec<ChatEvent> {
        self.complete = true;
        std::mem::take(&mut self.buffer)
    }
}

/// Result of feeding one event or raw payload to a [`TranscriptReducer`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Progress {
    /// Events folded into the transcript.
    pub applied: usize,
    /// Replay ended because the buffer limit was reached.
    pub forced: bool,
}

/// Replay gate and transcript, fed one event at a time.
#[derive(Debug, Clone, Default)]
pub struct TranscriptReducer {
    transcript: Transcript,
    gate: ReplayGate,
}

impl TranscriptReducer {
    pub fn new(replay_buffer_limit: usize) -> Self {
        Self { transcript: Transcript::new(), gate: ReplayGate::new(replay_buffer_limit) }
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn is_replaying(&self) -> bool {
        self.gate.is_replaying()
    }

    /// Parses and applies a raw JSON payload. A payload that fails to parse
    /// leaves the reducer untouched.
    pub fn on_raw(&mut self, raw: &str) -> Result<Progress> {
        let event = parse_event(raw)?;
        Ok(self.on_event(event))
    }

    pub fn on_event(&mut self, event: ChatEvent) -> Progress {
        match self.gate.admit(event) {
            Admission::Held => Progress::default(),
            Admission::Ready(events) => Progress { applied: self.apply_all(&events), forced: false },
            Admission::Forced(events) => Progress { applied: self.apply_all(&events), forced: true },
        }
    }

    /// Ends replay without a marker and applies whatever was held.
    pub fn flush_replay(&mut self) -> usize {
        let events = self.gate.force_complete();
        self.apply_all(&events)
    }

    fn apply_all(&mut self, events: &[ChatEvent]) -> usize {
        for event in events {
            let applied = self.transcript.apply(event);
            debug!(?applied, run_id = ?event.run_id, "applied chat event");
        }
        events.len()
    }
}

/// Parses one `data:` payload from the thread event stream.
pub fn parse_event(raw: &str) -> Result<ChatEvent> {
    serde_json::from_str(raw).map_err(|e| ConsoleError::malformed(raw, e))
}
