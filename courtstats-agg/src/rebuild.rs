//! Cache rebuild submission queue
//!
//! Aggregates are the source of truth; standings and leaderboards are a
//! derived cache rebuilt by a downstream service. Callers submit a season id
//! through a [`RebuildHandle`] and never wait for (or fail on) the rebuild.
//! A single worker drains the queue, coalesces duplicate seasons, and
//! retries each rebuild with exponential backoff.

use async_trait::async_trait;
use courtstats_common::config::CacheRebuildConfig;
use courtstats_common::{Error, Result};
use serde_json::json;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Downstream collaborator that turns a season's aggregates into its cache
#[async_trait]
pub trait CacheRebuilder: Send + Sync {
    async fn rebuild(&self, season_id: &str) -> Result<()>;
}

// ========================================
// Webhook Rebuilder
// ========================================

/// POSTs `{"seasonId": ..}` to the configured endpoint
pub struct WebhookRebuilder {
    client: reqwest::Client,
    url: String,
}

impl WebhookRebuilder {
    pub fn new(url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl CacheRebuilder for WebhookRebuilder {
    async fn rebuild(&self, season_id: &str) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .json(&json!({ "seasonId": season_id }))
            .send()
            .await
            .map_err(|e| Error::Internal(format!("cache rebuild request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Internal(format!(
                "cache rebuild returned {}: {}",
                status, body
            )));
        }
        Ok(())
    }
}

// ========================================
// Submission Queue
// ========================================

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
}

impl From<&CacheRebuildConfig> for RetryPolicy {
    fn from(config: &CacheRebuildConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
        }
    }
}

/// Cheap, cloneable submission side of the rebuild queue
#[derive(Debug, Clone)]
pub struct RebuildHandle {
    tx: Option<mpsc::Sender<String>>,
}

impl RebuildHandle {
    /// A handle that drops every request (no rebuild endpoint configured)
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.tx.is_some()
    }

    /// Enqueue a rebuild without waiting; returns whether it was queued
    pub fn request(&self, season_id: &str) -> bool {
        let Some(tx) = &self.tx else {
            debug!(season_id = %season_id, "Cache rebuild disabled, skipping");
            return false;
        };
        match tx.try_send(season_id.to_string()) {
            Ok(()) => {
                debug!(season_id = %season_id, "Cache rebuild queued");
                true
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(season_id = %season_id, "Cache rebuild queue full, dropping request");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!(season_id = %season_id, "Cache rebuild worker stopped, dropping request");
                false
            }
        }
    }
}

/// Start the rebuild worker; the returned handle feeds it
pub fn spawn_worker(
    rebuilder: Arc<dyn CacheRebuilder>,
    policy: RetryPolicy,
    capacity: usize,
) -> (RebuildHandle, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<String>(capacity.max(1));

    let task = tokio::spawn(async move {
        while let Some(first) = rx.recv().await {
            for season_id in coalesce(first, &mut rx) {
                rebuild_with_retry(rebuilder.as_ref(), &season_id, policy).await;
            }
        }
        debug!("Cache rebuild worker exiting");
    });

    (RebuildHandle { tx: Some(tx) }, task)
}

/// `first` plus everything already waiting, deduplicated
fn coalesce(first: String, rx: &mut mpsc::Receiver<String>) -> BTreeSet<String> {
    let mut pending = BTreeSet::from([first]);
    while let Ok(more) = rx.try_recv() {
        pending.insert(more);
    }
    pending
}

/// Build the queue from configuration (disabled without a webhook URL)
pub fn from_config(config: &CacheRebuildConfig) -> (RebuildHandle, Option<JoinHandle<()>>) {
    match &config.webhook_url {
        Some(url) if !url.trim().is_empty() => {
            info!(url = %url, "Cache rebuild webhook enabled");
            let rebuilder: Arc<dyn CacheRebuilder> = Arc::new(WebhookRebuilder::new(url.trim()));
            let (handle, task) =
                spawn_worker(rebuilder, RetryPolicy::from(config), config.queue_capacity);
            (handle, Some(task))
        }
        _ => {
            info!("No cache rebuild webhook configured, rebuild requests will be dropped");
            (RebuildHandle::disabled(), None)
        }
    }
}

async fn rebuild_with_retry(rebuilder: &dyn CacheRebuilder, season_id: &str, policy: RetryPolicy) {
    let mut backoff = policy.initial_backoff;
    for attempt in 1..=policy.max_attempts {
        match rebuilder.rebuild(season_id).await {
            Ok(()) => {
                info!(season_id = %season_id, attempt, "Cache rebuild complete");
                return;
            }
            Err(e) if attempt < policy.max_attempts => {
                warn!(
                    season_id = %season_id,
                    attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %e,
                    "Cache rebuild failed, retrying"
                );
                tokio::time::sleep(backoff).await;
                backoff = backoff.saturating_mul(2);
            }
            Err(e) => {
                error!(
                    season_id = %season_id,
                    attempts = policy.max_attempts,
                    error = %e,
                    "Cache rebuild failed, giving up"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Records calls; fails the first `failures` of them
    struct Recording {
        calls: Mutex<Vec<String>>,
        failures: Mutex<u32>,
    }

    impl Recording {
        fn new(failures: u32) -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                failures: Mutex::new(failures),
            })
        }
    }

    #[async_trait]
    impl CacheRebuilder for Recording {
        async fn rebuild(&self, season_id: &str) -> Result<()> {
            self.calls.lock().unwrap().push(season_id.to_string());
            let mut failures = self.failures.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(Error::Internal("boom".into()));
            }
            Ok(())
        }
    }

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_backoff: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn test_disabled_handle_drops_requests() {
        let handle = RebuildHandle::disabled();
        assert!(!handle.is_enabled());
        assert!(!handle.request("s1"));
    }

    #[tokio::test]
    async fn test_worker_retries_until_success() {
        let rec = Recording::new(2);
        let (handle, task) = spawn_worker(rec.clone(), fast_policy(3), 8);
        assert!(handle.request("s1"));
        drop(handle);
        task.await.unwrap();
        assert_eq!(*rec.calls.lock().unwrap(), vec!["s1", "s1", "s1"]);
    }

    #[tokio::test]
    async fn test_worker_gives_up_after_max_attempts() {
        let rec = Recording::new(10);
        let (handle, task) = spawn_worker(rec.clone(), fast_policy(2), 8);
        handle.request("s1");
        drop(handle);
        task.await.unwrap();
        assert_eq!(rec.calls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_coalesce_drains_waiting_duplicates() {
        let (tx, mut rx) = mpsc::channel::<String>(8);
        for season in ["s1", "s2", "s1", "s1"] {
            tx.try_send(season.to_string()).unwrap();
        }
        let first = rx.recv().await.unwrap();
        let pending: Vec<String> = coalesce(first, &mut rx).into_iter().collect();
        assert_eq!(pending, vec!["s1", "s2"]);
    }

    #[tokio::test]
    async fn test_worker_rebuilds_each_queued_season_once() {
        let rec = Recording::new(0);
        let (handle, task) = spawn_worker(rec.clone(), fast_policy(1), 8);
        // The worker cannot run until this test yields, so all four are queued
        for season in ["s1", "s2", "s1", "s1"] {
            assert!(handle.request(season));
        }
        drop(handle);
        task.await.unwrap();
        assert_eq!(*rec.calls.lock().unwrap(), vec!["s1", "s2"]);
    }

    #[tokio::test]
    async fn test_full_queue_drops_without_blocking() {
        let (tx, _rx) = mpsc::channel::<String>(1);
        let handle = RebuildHandle { tx: Some(tx) };
        assert!(handle.request("s1"));
        assert!(!handle.request("s2"));
    }
}
