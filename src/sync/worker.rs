//! Background sync processor.
//!
//! A single task drains ready queue items every 60 seconds and on
//! explicit `sync_now`. The processor is non-reentrant: a tick that
//! fires while a drain is in flight is skipped.

use crate::sync::client::{SyncClient, SyncFailure};
use crate::sync::credentials::CredentialStore;
use crate::sync::queue::SyncQueue;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, Notify};
use tracing::{info, warn};

/// Interval between automatic processor runs.
const TICK_INTERVAL: Duration = Duration::from_secs(60);

/// Observable sync state, surfaced by the `sync_status` tool.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncStatus {
    pub queued: usize,
    pub last_run_at: Option<i64>,
    pub last_error: Option<String>,
    /// Set when the remote rejected our credentials; the user must sign
    /// in again before sync can resume.
    pub needs_reauth: bool,
    pub remote_configured: bool,
}

/// The sync worker: queue, client, and processor state.
pub struct SyncWorker {
    queue: Arc<Mutex<SyncQueue>>,
    client: Option<SyncClient>,
    credentials: CredentialStore,
    status: Mutex<SyncStatus>,
    /// Non-reentrancy guard for the processor.
    running: AtomicBool,
    /// Wakes the loop for `sync_now`.
    kick: Notify,
}

impl SyncWorker {
    /// Create a worker around a loaded queue.
    #[must_use]
    pub fn new(queue: SyncQueue, client: Option<SyncClient>, credentials: CredentialStore) -> Self {
        let remote_configured = client.is_some();
        Self {
            queue: Arc::new(Mutex::new(queue)),
            client,
            credentials,
            status: Mutex::new(SyncStatus {
                remote_configured,
                ..SyncStatus::default()
            }),
            running: AtomicBool::new(false),
            kick: Notify::new(),
        }
    }

    /// Shared handle to the queue (for enqueue on session-affecting
    /// writes).
    #[must_use]
    pub fn queue(&self) -> Arc<Mutex<SyncQueue>> {
        Arc::clone(&self.queue)
    }

    /// True when a remote endpoint is configured.
    #[must_use]
    pub fn remote_configured(&self) -> bool {
        self.client.is_some()
    }

    /// Snapshot of the observable state.
    pub async fn status(&self) -> SyncStatus {
        let mut status = self.status.lock().await.clone();
        status.queued = self.queue.lock().await.len();
        status
    }

    /// Request an immediate drain: everything becomes ready and the
    /// loop wakes up.
    pub async fn sync_now(&self) {
        {
            let mut queue = self.queue.lock().await;
            if let Err(e) = queue.make_all_ready() {
                warn!(error = %e, "Failed to reschedule queue for sync_now");
            }
        }
        self.kick.notify_one();
    }

    /// Run the processor loop until shutdown.
    pub async fn run(self: Arc<Self>, mut cancel: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                () = tokio::time::sleep(TICK_INTERVAL) => {}
                () = self.kick.notified() => {}
                _ = cancel.changed() => {
                    if *cancel.borrow() {
                        return;
                    }
                }
            }

            self.process().await;
        }
    }

    /// Drain ready items once. Skips silently when a drain is already
    /// in flight or no remote is configured.
    pub async fn process(&self) {
        let Some(client) = self.client.as_ref() else {
            return;
        };

        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        let ready = {
            let queue = self.queue.lock().await;
            queue.ready_items(crate::now_ms())
        };

        if !ready.is_empty() {
            info!(count = ready.len(), "Processing sync queue");
        }

        let mut last_error = None;
        let mut needs_reauth = false;

        for item in ready {
            match client.upload(&item.payload, &self.credentials).await {
                Ok(()) => {
                    let mut queue = self.queue.lock().await;
                    if let Err(e) = queue.remove(&item.id) {
                        warn!(item = %item.id, error = %e, "Failed to remove synced item");
                    }
                }
                Err(SyncFailure::Retry(msg)) => {
                    last_error = Some(msg.clone());
                    let mut queue = self.queue.lock().await;
                    let _ = queue.mark_failed(&item.id, &msg);
                }
                Err(SyncFailure::Drop(msg)) => {
                    warn!(item = %item.id, error = %msg, "Dropping unsyncable item");
                    last_error = Some(msg);
                    let mut queue = self.queue.lock().await;
                    let _ = queue.remove(&item.id);
                }
                Err(SyncFailure::Auth(msg)) => {
                    warn!(item = %item.id, error = %msg, "Sync rejected: sign in again");
                    last_error = Some(msg);
                    needs_reauth = true;
                    let mut queue = self.queue.lock().await;
                    let _ = queue.remove(&item.id);
                }
            }
        }

        {
            let mut status = self.status.lock().await;
            status.last_run_at = Some(crate::now_ms());
            status.last_error = last_error;
            if needs_reauth {
                status.needs_reauth = true;
            }
        }

        self.running.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn worker_without_remote(dir: &TempDir) -> Arc<SyncWorker> {
        let queue = SyncQueue::load(dir.path().join("sync-queue.json"));
        let credentials = CredentialStore::File(crate::sync::credentials::FileBackend::new(
            dir.path().join("credentials.json"),
        ));
        Arc::new(SyncWorker::new(queue, None, credentials))
    }

    #[tokio::test]
    async fn test_status_reflects_queue() {
        let dir = TempDir::new().unwrap();
        let worker = worker_without_remote(&dir);

        {
            let queue = worker.queue();
            let mut guard = queue.lock().await;
            guard.enqueue(serde_json::json!({"s": 1})).unwrap();
            guard.enqueue(serde_json::json!({"s": 2})).unwrap();
        }

        let status = worker.status().await;
        assert_eq!(status.queued, 2);
        assert!(!status.remote_configured);
        assert!(!status.needs_reauth);
    }

    #[tokio::test]
    async fn test_process_without_remote_is_noop() {
        let dir = TempDir::new().unwrap();
        let worker = worker_without_remote(&dir);
        {
            let queue = worker.queue();
            queue.lock().await.enqueue(serde_json::json!({})).unwrap();
        }

        worker.process().await;

        // Nothing uploaded, nothing dropped
        assert_eq!(worker.status().await.queued, 1);
    }

    #[tokio::test]
    async fn test_sync_now_makes_items_ready() {
        let dir = TempDir::new().unwrap();
        let worker = worker_without_remote(&dir);
        {
            let queue = worker.queue();
            queue.lock().await.enqueue(serde_json::json!({})).unwrap();
        }

        worker.sync_now().await;

        let queue = worker.queue();
        let guard = queue.lock().await;
        assert_eq!(guard.ready_items(crate::now_ms()).len(), 1);
    }
}
