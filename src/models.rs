use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Upstream event stream ─────────────────────────────────────────────────────

/// One event pushed by the upstream thread event stream.
///
/// Every payload field is optional; an event with none of them set carries no
/// renderable content and only updates the running flag.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<Prompt>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call: Option<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(rename = "runID", default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    #[serde(rename = "contentID", default, skip_serializing_if = "Option::is_none")]
    pub content_id: Option<String>,
    #[serde(default)]
    pub replay_complete: bool,
    #[serde(default)]
    pub run_complete: bool,
}

impl ChatEvent {
    /// The content id, if present and non-empty.
    pub fn content_key(&self) -> Option<&str> {
        non_empty(&self.content_id)
    }
}

/// Treats `Some("")` the same as `None`.
pub(crate) fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCall {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub input: String,
    #[serde(default)]
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, String>>,
}

/// A request from a running tool for information from the user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prompt {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub fields: Vec<String>,
    #[serde(default)]
    pub sensitive: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, String>>,
}

// ── Display model ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Agent,
}

impl Sender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sender::User => "user",
            Sender::Agent => "agent",
        }
    }
}

impl std::fmt::Display for Sender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A display-ready transcript entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub sender: Sender,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    #[serde(rename = "contentID", default, skip_serializing_if = "Option::is_none")]
    pub content_id: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub error: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call: Option<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<Prompt>,
}

impl Message {
    pub fn new(sender: Sender, text: impl Into<String>) -> Self {
        Self {
            sender,
            text: text.into(),
            run_id: None,
            content_id: None,
            error: false,
            tool_call: None,
            prompt: None,
        }
    }

    pub fn with_run(mut self, run_id: Option<&str>) -> Self {
        self.run_id = run_id.map(str::to_string);
        self
    }

    pub fn with_content_id(mut self, content_id: Option<&str>) -> Self {
        self.content_id = content_id.map(str::to_string);
        self
    }
}

// ── Snapshots ─────────────────────────────────────────────────────────────────

/// Connection state of a followed thread.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamStatus {
    /// No subscription.
    #[default]
    Idle,
    /// Subscribed, waiting for the replay marker.
    Replaying,
    /// Replay flushed; events are applied as they arrive.
    Live,
    /// Upstream ended the stream or the subscription was dropped.
    Closed,
    /// The stream was torn down because of an error.
    Failed,
}

/// Read-only view of one transcript, published to readers after every change.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptSnapshot {
    pub thread_id: Option<String>,
    pub messages: Vec<Message>,
    pub is_running: bool,
    pub status: StreamStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ── Console HTTP API ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatMode {
    #[default]
    Agent,
    Workflow,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvokeBody {
    pub prompt: String,
    #[serde(default)]
    pub thread: Option<String>,
    #[serde(default)]
    pub mode: ChatMode,
    #[serde(default)]
    pub read_only: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvokeReply {
    pub thread_id: Option<String>,
    pub created: bool,
    pub skipped: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentStatus {
    pub agent_id: String,
    pub invoking: bool,
}

/// A thread as listed by the upstream API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Thread {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
    #[serde(rename = "agentID", default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThreadList {
    #[serde(default)]
    pub items: Vec<Thread>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_event_uses_upstream_field_names() {
        let event: ChatEvent = serde_json::from_str(
            r#"{"content":"hi","runID":"r1","contentID":"c1","runComplete":true,"time":"2024-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(event.content.as_deref(), Some("hi"));
        assert_eq!(event.run_id.as_deref(), Some("r1"));
        assert_eq!(event.content_key(), Some("c1"));
        assert!(event.run_complete);
        assert!(!event.replay_complete);
    }

    #[test]
    fn empty_content_id_is_not_a_key() {
        let event = ChatEvent { content_id: Some(String::new()), ..Default::default() };
        assert_eq!(event.content_key(), None);
    }

    #[test]
    fn message_omits_unset_fields() {
        let msg = Message::new(Sender::Agent, "hello").with_run(Some("r1"));
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json, serde_json::json!({"sender": "agent", "text": "hello", "runId": "r1"}));
    }

    #[test]
    fn snapshot_serializes_status_lowercase() {
        let snapshot = TranscriptSnapshot { status: StreamStatus::Replaying, ..Default::default() };
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["status"], "replaying");
        assert_eq!(json["isRunning"], false);
    }
}
