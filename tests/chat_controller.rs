mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use agent_console::cache::{CacheInvalidator, Revalidator, THREADS_KEY};
use agent_console::chat::{ChatController, InvokeOutcome};
use agent_console::errors::Result;
use agent_console::models::ChatMode;
use async_trait::async_trait;
use common::MockInvoker;
use parking_lot::Mutex;

#[derive(Default)]
struct RecordingInvalidator {
    keys: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

#[async_trait]
impl CacheInvalidator for RecordingInvalidator {
    async fn revalidate(&self, key: &str) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.keys.lock().push(key.to_string());
        Ok(())
    }
}

fn controller(invoker: Arc<MockInvoker>) -> (ChatController, Arc<RecordingInvalidator>) {
    let invalidator = Arc::new(RecordingInvalidator::default());
    let revalidator = Arc::new(Revalidator::new(invalidator.clone()));
    (ChatController::new("agent-1", invoker, revalidator), invalidator)
}

#[tokio::test]
async fn new_thread_revalidates_thread_list() {
    let invoker = Arc::new(MockInvoker { thread_id: Some("t-new".into()), ..Default::default() });
    let (chat, invalidator) = controller(invoker.clone());

    let outcome = chat.invoke(Some("hello"), None).await.unwrap();

    assert_eq!(outcome, InvokeOutcome::Created("t-new".into()));
    assert_eq!(*invalidator.keys.lock(), [THREADS_KEY]);
    let requests = invoker.requests.lock();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].id, "agent-1");
    assert_eq!(requests[0].prompt, "hello");
    assert_eq!(requests[0].thread, None);
    assert!(!chat.is_invoking());
}

#[tokio::test]
async fn existing_thread_is_not_revalidated() {
    let invoker = Arc::new(MockInvoker { thread_id: Some("t1".into()), ..Default::default() });
    let (chat, invalidator) = controller(invoker.clone());

    let outcome = chat.process_user_message("again", Some("t1")).await.unwrap();

    assert_eq!(outcome, InvokeOutcome::Invoked { thread_id: Some("t1".into()) });
    assert_eq!(invalidator.calls.load(Ordering::SeqCst), 0);
    assert_eq!(invoker.requests.lock()[0].thread.as_deref(), Some("t1"));
}

#[tokio::test]
async fn workflow_and_read_only_chats_skip_invocation() {
    let invoker = Arc::new(MockInvoker::default());

    let (chat, _) = controller(invoker.clone());
    let chat = chat.with_mode(ChatMode::Workflow);
    assert_eq!(chat.invoke(Some("hi"), None).await.unwrap(), InvokeOutcome::Skipped);

    let (chat, _) = controller(invoker.clone());
    let chat = chat.read_only(true);
    assert_eq!(chat.process_user_message("hi", Some("t1")).await.unwrap(), InvokeOutcome::Skipped);

    assert!(invoker.requests.lock().is_empty());
}

#[tokio::test]
async fn empty_prompt_is_skipped() {
    let invoker = Arc::new(MockInvoker::default());
    let (chat, _) = controller(invoker.clone());

    assert_eq!(chat.invoke(None, None).await.unwrap(), InvokeOutcome::Skipped);
    assert_eq!(chat.invoke(Some(""), None).await.unwrap(), InvokeOutcome::Skipped);
    assert!(invoker.requests.lock().is_empty());
}

#[tokio::test]
async fn invoker_failure_propagates_and_clears_invoking() {
    let invoker = Arc::new(MockInvoker { fail: true, ..Default::default() });
    let (chat, invalidator) = controller(invoker);

    let err = chat.invoke(Some("hello"), None).await.unwrap_err();

    assert!(err.is_connection());
    assert!(!chat.is_invoking());
    assert_eq!(invalidator.calls.load(Ordering::SeqCst), 0);
}
