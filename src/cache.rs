//! Cache revalidation.
//!
//! Callers never refresh caches directly; they ask a [`Revalidator`], which
//! forwards to an injected [`CacheInvalidator`] and keeps at most one
//! revalidation per key in flight.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info};

use crate::errors::{ConsoleError, Result};
use crate::models::ThreadList;

/// Cache key of the thread list.
pub const THREADS_KEY: &str = "threads";

#[async_trait]
pub trait CacheInvalidator: Send + Sync {
    /// Refreshes whatever is cached under `key`.
    async fn revalidate(&self, key: &str) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Revalidation {
    Completed,
    /// A revalidation of the same key was already running.
    Coalesced,
}

pub struct Revalidator {
    invalidator: Arc<dyn CacheInvalidator>,
    in_flight: Mutex<HashSet<String>>,
}

struct InFlight<'a> {
    keys: &'a Mutex<HashSet<String>>,
    key: &'a str,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.keys.lock().remove(self.key);
    }
}

impl Revalidator {
    pub fn new(invalidator: Arc<dyn CacheInvalidator>) -> Self {
        Self { invalidator, in_flight: Mutex::new(HashSet::new()) }
    }

    pub async fn revalidate(&self, key: &str) -> Result<Revalidation> {
        if !self.in_flight.lock().insert(key.to_string()) {
            debug!(key, "revalidation already in flight");
            return Ok(Revalidation::Coalesced);
        }
        let _in_flight = InFlight { keys: &self.in_flight, key };

        self.invalidator.revalidate(key).await?;
        Ok(Revalidation::Completed)
    }
}

/// Thread list fetched from `GET {base_url}/api/threads`, kept until revalidated.
pub struct ThreadListCache {
    client: reqwest::Client,
    base_url: String,
    threads: RwLock<Option<ThreadList>>,
}

impl ThreadListCache {
    pub fn new(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            threads: RwLock::new(None),
        }
    }

    /// Cached list, fetched on first use.
    pub async fn threads(&self) -> Result<ThreadList> {
        if let Some(threads) = self.threads.read().clone() {
            return Ok(threads);
        }
        self.refresh().await
    }

    async fn refresh(&self) -> Result<ThreadList> {
        let url = format!("{}/api/threads", self.base_url);
        let resp = self.client.get(&url).send().await.map_err(|e| {
            error!("Failed to fetch thread list: {e}");
            ConsoleError::connection(&url, e)
        })?;

        if !resp.status().is_success() {
            return Err(ConsoleError::Upstream { status: resp.status().as_u16(), url });
        }

        let threads: ThreadList = resp
            .json()
            .await
            .map_err(|e| ConsoleError::Unexpected(format!("Invalid thread list from {url}: {e}")))?;

        info!(count = threads.items.len(), "refreshed thread list");
        *self.threads.write() = Some(threads.clone());
        Ok(threads)
    }
}

#[async_trait]
impl CacheInvalidator for ThreadListCache {
    async fn revalidate(&self, key: &str) -> Result<()> {
        if key != THREADS_KEY {
            debug!(key, "no cache under key");
            return Ok(());
        }
        self.refresh().await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    struct Gated {
        calls: AtomicUsize,
        release: Notify,
    }

    #[async_trait]
    impl CacheInvalidator for Gated {
        async fn revalidate(&self, _key: &str) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.release.notified().await;
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl CacheInvalidator for Failing {
        async fn revalidate(&self, key: &str) -> Result<()> {
            Err(ConsoleError::Unexpected(format!("cannot refresh {key}")))
        }
    }

    #[tokio::test]
    async fn concurrent_revalidations_of_one_key_coalesce() {
        let gated = Arc::new(Gated { calls: AtomicUsize::new(0), release: Notify::new() });
        let revalidator = Arc::new(Revalidator::new(gated.clone()));

        let first = tokio::spawn({
            let revalidator = revalidator.clone();
            async move { revalidator.revalidate(THREADS_KEY).await }
        });
        while gated.calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }

        assert_eq!(revalidator.revalidate(THREADS_KEY).await.unwrap(), Revalidation::Coalesced);

        gated.release.notify_one();
        assert_eq!(first.await.unwrap().unwrap(), Revalidation::Completed);
        assert_eq!(gated.calls.load(Ordering::SeqCst), 1);

        gated.release.notify_one();
        assert_eq!(revalidator.revalidate(THREADS_KEY).await.unwrap(), Revalidation::Completed);
        assert_eq!(gated.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failed_revalidation_releases_the_key() {
        let revalidator = Revalidator::new(Arc::new(Failing));
        assert!(revalidator.revalidate(THREADS_KEY).await.is_err());
        assert!(revalidator.revalidate(THREADS_KEY).await.is_err());
        assert!(revalidator.in_flight.lock().is_empty());
    }
}
