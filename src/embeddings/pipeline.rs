//! Embedding generation pipeline.
//!
//! Fire-and-forget generation on save, startup reconciliation of the
//! vector table dimension, and background backfill. Failures never
//! propagate to the RPC path; they land in each item's
//! `embedding_status`.

use crate::embeddings::chunking::{chunk_text, prepare_item_text};
use crate::embeddings::factory::create_embedding_provider;
use crate::embeddings::provider::BoxedProvider;
use crate::error::Result;
use crate::model::{ContextItem, EmbeddingStatus};
use crate::storage::SqliteStorage;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, RwLock};
use tracing::{debug, info, warn};

/// Storage handle shared across the server, pipeline, and workers.
pub type SharedStorage = Arc<Mutex<SqliteStorage>>;

/// Per-embedding-call budget. Exceeding it marks the item `error`.
const EMBED_TIMEOUT: Duration = Duration::from_secs(15);

/// Items processed per backfill batch.
const BACKFILL_BATCH: u32 = 50;

/// Pause between backfill batches so interactive traffic wins the lock.
const BACKFILL_PAUSE: Duration = Duration::from_millis(250);

/// The embedding pipeline: provider handle plus scheduling entry points.
#[derive(Clone)]
pub struct EmbeddingPipeline {
    storage: SharedStorage,
    provider: Arc<RwLock<Option<BoxedProvider>>>,
    cancel: watch::Receiver<bool>,
}

impl EmbeddingPipeline {
    /// Create a pipeline around shared storage. `cancel` flips to true
    /// on shutdown; generation stops between chunks.
    #[must_use]
    pub fn new(storage: SharedStorage, cancel: watch::Receiver<bool>) -> Self {
        Self {
            storage,
            provider: Arc::new(RwLock::new(None)),
            cancel,
        }
    }

    /// The active provider handle (for search and status tools).
    #[must_use]
    pub fn provider(&self) -> Arc<RwLock<Option<BoxedProvider>>> {
        Arc::clone(&self.provider)
    }

    /// Swap the active provider (config tool path). The caller is
    /// responsible for the dimension reconciliation that follows.
    pub async fn set_provider(&self, provider: Option<BoxedProvider>) {
        *self.provider.write().await = provider;
    }

    /// Startup sequence: detect the provider, reconcile the vector
    /// table dimension, then backfill in the background.
    ///
    /// # Errors
    ///
    /// Returns an error if the dimension reconciliation fails; provider
    /// absence is not an error.
    pub async fn initialize(&self) -> Result<()> {
        let Some(provider) = create_embedding_provider().await else {
            info!("No embedding provider available; semantic search will use keyword fallback");
            return Ok(());
        };

        let info = provider.info();
        info!(provider = %info.name, model = %info.model, dimensions = info.dimensions, "Embedding provider active");

        let recreated = {
            let mut storage = self.storage.lock().await;
            let recreated = storage.ensure_vector_dim(info.dimensions, &info.name)?;
            storage.resync_embedding_status()?;
            recreated
        };
        if recreated {
            info!("Vector table dimension changed; all items queued for re-embedding");
        }

        *self.provider.write().await = Some(provider);

        let pipeline = self.clone();
        tokio::spawn(async move {
            pipeline.backfill().await;
        });

        Ok(())
    }

    /// Schedule asynchronous embedding for a just-saved item.
    ///
    /// Marks the item `pending` and returns immediately; the spawned
    /// task does the work. Without a provider the item stays `none` for
    /// a later backfill.
    pub async fn schedule(&self, item: ContextItem) {
        {
            let mut storage = self.storage.lock().await;
            if let Err(e) = storage.set_embedding_status(&item.id, EmbeddingStatus::Pending) {
                warn!(item = %item.id, error = %e, "Failed to mark item pending");
                return;
            }
        }

        let pipeline = self.clone();
        tokio::spawn(async move {
            pipeline.embed_item(&item).await;
        });
    }

    /// Embed one item: chunk, generate per chunk, upsert, mark `ok`.
    ///
    /// Provider unavailability resets the item to `none` (backfill will
    /// retry); generation errors and timeouts mark it `error`.
    async fn embed_item(&self, item: &ContextItem) {
        let provider_guard = self.provider.read().await;
        let Some(provider) = provider_guard.as_ref() else {
            let mut storage = self.storage.lock().await;
            let _ = storage.set_embedding_status(&item.id, EmbeddingStatus::None);
            return;
        };

        // Re-verify readiness: the provider may have gone away since startup
        if !provider.is_available().await {
            let mut storage = self.storage.lock().await;
            let _ = storage.set_embedding_status(&item.id, EmbeddingStatus::None);
            return;
        }

        let info = provider.info();
        let text = prepare_item_text(&item.key, &item.value, item.category.as_str());
        let chunks: Vec<_> = chunk_text(&text, info.max_chars).collect();

        let mut stored = 0i64;
        for chunk in &chunks {
            if *self.cancel.borrow() {
                debug!(item = %item.id, "Embedding cancelled mid-item");
                return;
            }

            let embedding =
                match tokio::time::timeout(EMBED_TIMEOUT, provider.generate_embedding(&chunk.text))
                    .await
                {
                    Ok(Ok(vector)) => vector,
                    Ok(Err(e)) => {
                        warn!(item = %item.id, chunk = chunk.index, error = %e, "Embedding failed");
                        let mut storage = self.storage.lock().await;
                        let _ = storage.set_embedding_status(&item.id, EmbeddingStatus::Error);
                        return;
                    }
                    Err(_) => {
                        warn!(item = %item.id, chunk = chunk.index, "Embedding timed out");
                        let mut storage = self.storage.lock().await;
                        let _ = storage.set_embedding_status(&item.id, EmbeddingStatus::Error);
                        return;
                    }
                };

            let mut storage = self.storage.lock().await;
            if let Err(e) = storage.upsert_chunk(
                &item.id,
                chunk.index as i32,
                &chunk.text,
                &embedding,
                &info.name,
                &info.model,
            ) {
                warn!(item = %item.id, error = %e, "Failed to store chunk");
                let _ = storage.set_embedding_status(&item.id, EmbeddingStatus::Error);
                return;
            }
            stored += 1;
        }

        let mut storage = self.storage.lock().await;
        if let Err(e) = storage.mark_embedded(&item.id, &info.name, &info.model, stored) {
            warn!(item = %item.id, error = %e, "Failed to finalize embedding");
        }
    }

    /// Backfill loop: embed items with status `none`/`error` in batches
    /// until the queue drains or shutdown is signalled.
    pub async fn backfill(&self) {
        loop {
            if *self.cancel.borrow() {
                return;
            }

            let candidates = {
                let storage = self.storage.lock().await;
                match storage.get_backfill_candidates(BACKFILL_BATCH) {
                    Ok(items) => items,
                    Err(e) => {
                        warn!(error = %e, "Backfill query failed");
                        return;
                    }
                }
            };

            if candidates.is_empty() {
                debug!("Embedding backfill drained");
                return;
            }

            info!(count = candidates.len(), "Backfilling embeddings");
            for item in candidates {
                if *self.cancel.borrow() {
                    return;
                }
                self.embed_item(&item).await;
            }

            tokio::time::sleep(BACKFILL_PAUSE).await;
        }
    }

    /// Embed a search query with the per-call budget.
    ///
    /// Returns `None` when no provider is active, unreachable, or slow;
    /// the caller falls back to keyword search.
    pub async fn embed_query(&self, query: &str) -> Option<Vec<f32>> {
        let provider_guard = self.provider.read().await;
        let provider = provider_guard.as_ref()?;

        match tokio::time::timeout(EMBED_TIMEOUT, provider.generate_embedding(query)).await {
            Ok(Ok(vector)) => Some(vector),
            Ok(Err(e)) => {
                warn!(error = %e, "Query embedding failed");
                None
            }
            Err(_) => {
                warn!("Query embedding timed out");
                None
            }
        }
    }
}
