//! Durable sync queue.
//!
//! A JSON file at `~/.savecontext/sync-queue.json` is the source of
//! truth; the in-memory mirror is re-persisted atomically
//! (write-temp-then-rename) after every mutation. Items back off
//! exponentially and are dropped after too many retries.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Base backoff delay in milliseconds (60s).
pub const BACKOFF_BASE_MS: i64 = 60_000;

/// Backoff cap in milliseconds (1h).
pub const BACKOFF_CAP_MS: i64 = 3_600_000;

/// Items at or beyond this retry count are dropped.
pub const MAX_RETRIES: u32 = 5;

/// One queued upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncItem {
    pub id: String,
    /// The session payload to upload, pre-serialized.
    pub payload: serde_json::Value,
    pub retries: u32,
    /// Epoch-ms after which the item is eligible for an attempt.
    pub next_retry_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub created_at: i64,
}

/// Backoff delay for a given retry count: `min(base × 2^retries, cap)`.
#[must_use]
pub fn backoff_delay_ms(retries: u32) -> i64 {
    let factor = 2i64.saturating_pow(retries.min(16));
    (BACKOFF_BASE_MS.saturating_mul(factor)).min(BACKOFF_CAP_MS)
}

/// The durable queue: file path plus in-memory mirror.
#[derive(Debug)]
pub struct SyncQueue {
    path: PathBuf,
    items: Vec<SyncItem>,
}

impl SyncQueue {
    /// Load the queue from disk, starting empty when the file is
    /// missing or unreadable (a corrupt queue should not take the
    /// server down).
    #[must_use]
    pub fn load(path: PathBuf) -> Self {
        let items = fs::read_to_string(&path)
            .ok()
            .and_then(|content| serde_json::from_str(&content).ok())
            .unwrap_or_default();

        Self { path, items }
    }

    /// Number of queued items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True when nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// All items (for status display).
    #[must_use]
    pub fn items(&self) -> &[SyncItem] {
        &self.items
    }

    /// Enqueue a payload. The first attempt becomes eligible one
    /// backoff period out.
    ///
    /// # Errors
    ///
    /// Returns an error if the queue file cannot be persisted.
    pub fn enqueue(&mut self, payload: serde_json::Value) -> Result<SyncItem> {
        let now = crate::now_ms();
        let item = SyncItem {
            id: crate::new_id("sync"),
            payload,
            retries: 0,
            next_retry_at: now + backoff_delay_ms(0),
            last_error: None,
            created_at: now,
        };

        self.items.push(item.clone());
        self.persist()?;
        Ok(item)
    }

    /// Items eligible for an attempt (`next_retry_at <= now`).
    #[must_use]
    pub fn ready_items(&self, now: i64) -> Vec<SyncItem> {
        self.items
            .iter()
            .filter(|item| item.next_retry_at <= now)
            .cloned()
            .collect()
    }

    /// Remove a completed (or dropped) item.
    ///
    /// # Errors
    ///
    /// Returns an error if the queue file cannot be persisted.
    pub fn remove(&mut self, id: &str) -> Result<()> {
        self.items.retain(|item| item.id != id);
        self.persist()
    }

    /// Record a failed attempt: bump the retry count and schedule the
    /// next attempt. Items reaching the retry ceiling are dropped and
    /// logged.
    ///
    /// Returns `true` when the item was kept, `false` when dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the queue file cannot be persisted.
    pub fn mark_failed(&mut self, id: &str, error: &str) -> Result<bool> {
        let now = crate::now_ms();
        let mut kept = false;

        if let Some(item) = self.items.iter_mut().find(|item| item.id == id) {
            item.retries += 1;
            item.last_error = Some(error.to_string());

            if item.retries >= MAX_RETRIES {
                warn!(item = %item.id, retries = item.retries, error, "Dropping sync item after repeated failures");
            } else {
                item.next_retry_at = now + backoff_delay_ms(item.retries);
                kept = true;
            }
        }

        if !kept {
            self.items.retain(|item| item.id != id);
        }

        self.persist()?;
        Ok(kept)
    }

    /// Make every item immediately eligible (explicit `sync_now`).
    ///
    /// # Errors
    ///
    /// Returns an error if the queue file cannot be persisted.
    pub fn make_all_ready(&mut self) -> Result<()> {
        let now = crate::now_ms();
        for item in &mut self.items {
            item.next_retry_at = now;
        }
        self.persist()
    }

    /// Atomically write the queue file: temp file, flush+sync, rename.
    fn persist(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let temp_path = self.path.with_extension("json.tmp");
        {
            let file = File::create(&temp_path)?;
            let mut writer = BufWriter::new(file);
            let content = serde_json::to_string_pretty(&self.items)?;
            writer.write_all(content.as_bytes())?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        fs::rename(&temp_path, &self.path)?;

        Ok(())
    }

    /// The queue file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn queue_in(dir: &TempDir) -> SyncQueue {
        SyncQueue::load(dir.path().join("sync-queue.json"))
    }

    #[test]
    fn test_backoff_schedule() {
        assert_eq!(backoff_delay_ms(0), 60_000);
        assert_eq!(backoff_delay_ms(1), 120_000);
        assert_eq!(backoff_delay_ms(2), 240_000);
        assert_eq!(backoff_delay_ms(5), 1_920_000);
        assert_eq!(backoff_delay_ms(6), 3_600_000);
        assert_eq!(backoff_delay_ms(30), 3_600_000, "cap holds for huge retry counts");
    }

    #[test]
    fn test_enqueue_persists_and_survives_reload() {
        let dir = TempDir::new().unwrap();
        let payload = serde_json::json!({"session": "sess_1"});

        let before = crate::now_ms();
        {
            let mut queue = queue_in(&dir);
            let item = queue.enqueue(payload.clone()).unwrap();
            assert_eq!(item.retries, 0);
            assert!(item.next_retry_at >= before + BACKOFF_BASE_MS);
        }

        // Simulated restart: same ready set
        let queue = queue_in(&dir);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.items()[0].payload, payload);
        assert!(queue.ready_items(crate::now_ms()).is_empty());
        assert_eq!(
            queue.ready_items(crate::now_ms() + BACKOFF_BASE_MS + 1000).len(),
            1
        );
    }

    #[test]
    fn test_mark_failed_backs_off_then_drops() {
        let dir = TempDir::new().unwrap();
        let mut queue = queue_in(&dir);
        let item = queue.enqueue(serde_json::json!({})).unwrap();

        for attempt in 1..MAX_RETRIES {
            let kept = queue.mark_failed(&item.id, "connection refused").unwrap();
            assert!(kept, "attempt {attempt} should keep the item");
            assert_eq!(queue.items()[0].retries, attempt);
        }

        let kept = queue.mark_failed(&item.id, "connection refused").unwrap();
        assert!(!kept, "fifth failure drops the item");
        assert!(queue.is_empty());

        // The drop persisted: file shrank to []
        let reloaded = queue_in(&dir);
        assert!(reloaded.is_empty());
    }

    #[test]
    fn test_remove_shrinks_file() {
        let dir = TempDir::new().unwrap();
        let mut queue = queue_in(&dir);
        let item = queue.enqueue(serde_json::json!({"n": 1})).unwrap();
        queue.enqueue(serde_json::json!({"n": 2})).unwrap();

        queue.remove(&item.id).unwrap();
        assert_eq!(queue.len(), 1);

        let reloaded = queue_in(&dir);
        assert_eq!(reloaded.len(), 1);
    }

    #[test]
    fn test_make_all_ready() {
        let dir = TempDir::new().unwrap();
        let mut queue = queue_in(&dir);
        queue.enqueue(serde_json::json!({})).unwrap();
        assert!(queue.ready_items(crate::now_ms()).is_empty());

        queue.make_all_ready().unwrap();
        assert_eq!(queue.ready_items(crate::now_ms()).len(), 1);
    }

    #[test]
    fn test_corrupt_file_starts_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sync-queue.json");
        std::fs::write(&path, "{not json").unwrap();

        let queue = SyncQueue::load(path);
        assert!(queue.is_empty());
    }
}
