use async_trait::async_trait;
use tracing::{error, info};

use crate::errors::{ConsoleError, Result};

/// Response header carrying the id of a thread created by an invocation.
pub const THREAD_ID_HEADER: &str = "x-otto-thread-id";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvokeRequest {
    /// Agent id.
    pub id: String,
    pub prompt: String,
    /// Thread to continue; `None` starts a new one.
    pub thread: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvokeResponse {
    pub thread_id: Option<String>,
}

/// Starts agent runs. New run output shows up on the thread event stream.
#[async_trait]
pub trait AgentInvoker: Send + Sync {
    async fn invoke(&self, request: &InvokeRequest) -> Result<InvokeResponse>;
}

/// Invokes agents through `POST {base_url}/api/invoke/{id}`.
#[derive(Clone)]
pub struct HttpAgentInvoker {
    client: reqwest::Client,
    base_url: String,
}

impl HttpAgentInvoker {
    pub fn new(client: reqwest::Client, base_url: &str) -> Self {
        Self { client, base_url: base_url.trim_end_matches('/').to_string() }
    }
}

#[async_trait]
impl AgentInvoker for HttpAgentInvoker {
    async fn invoke(&self, request: &InvokeRequest) -> Result<InvokeResponse> {
        let url = format!("{}/api/invoke/{}", self.base_url, request.id);

        let mut builder = self.client.post(&url).body(request.prompt.clone());
        if let Some(thread) = &request.thread {
            builder = builder.query(&[("thread", thread)]);
        }

        let resp = builder.send().await.map_err(|e| {
            error!(agent_id = %request.id, "agent invocation failed: {e}");
            ConsoleError::connection(&url, e)
        })?;

        if !resp.status().is_success() {
            return Err(ConsoleError::Upstream { status: resp.status().as_u16(), url });
        }

        let thread_id = resp
            .headers()
            .get(THREAD_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(str::to_string);

        info!(agent_id = %request.id, thread_id = ?thread_id, "invoked agent");
        Ok(InvokeResponse { thread_id })
    }
}
