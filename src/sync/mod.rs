//! Offline sync: a durable, exponential-backoff upload queue.
//!
//! Session-affecting writes enqueue payloads when a remote is
//! configured; a single background worker drains the queue every 60
//! seconds and on explicit `sync_now`. The queue file is the source of
//! truth and survives restarts. Sync failures never surface to agents;
//! state is visible through the `sync_status` tool.

pub mod client;
pub mod credentials;
pub mod queue;
pub mod worker;

pub use client::{build_session_payload, resolve_sync_url, SessionPayload, SyncClient, SyncFailure, API_KEY_CREDENTIAL};
pub use credentials::{CredentialStore, FileBackend, KeychainBackend};
pub use queue::{backoff_delay_ms, SyncItem, SyncQueue, BACKOFF_BASE_MS, BACKOFF_CAP_MS, MAX_RETRIES};
pub use worker::{SyncStatus, SyncWorker};
