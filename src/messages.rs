//! Builds display messages from structured event payloads.

use crate::models::{Message, Prompt, Sender, ToolCall};

/// Agent message announcing a tool call, e.g. `Tool call: search -> Searches the web`.
pub fn tool_call_message(tool_call: &ToolCall) -> Message {
    let label = [tool_call.name.as_str(), tool_call.description.as_str()]
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" -> ");

    Message {
        tool_call: Some(tool_call.clone()),
        ..Message::new(Sender::Agent, format!("Tool call: {label}"))
    }
}

/// Agent message asking the user for input on behalf of a run.
pub fn prompt_message(prompt: &Prompt, run_id: Option<&str>) -> Message {
    Message {
        prompt: Some(prompt.clone()),
        ..Message::new(Sender::Agent, prompt.message.clone()).with_run(run_id)
    }
}
