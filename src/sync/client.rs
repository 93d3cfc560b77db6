//! Sync upload client.
//!
//! Builds session payloads and uploads them to the remote service.
//! Failures classify into retry / drop / re-auth per the queue policy.

use crate::error::Result;
use crate::storage::SqliteStorage;
use crate::sync::credentials::CredentialStore;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::time::Duration;
use tokio::sync::Mutex;

/// HTTP budget for one upload attempt.
const SYNC_TIMEOUT: Duration = Duration::from_secs(20);

/// Credential key holding the sync API token.
pub const API_KEY_CREDENTIAL: &str = "sync_api_key";

/// How an upload attempt failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncFailure {
    /// Network error or 5xx: keep the item, back off.
    Retry(String),
    /// Non-auth 4xx: the payload will never succeed, drop it.
    Drop(String),
    /// 401/403: drop and tell the user to sign in again.
    Auth(String),
}

/// One session's sync payload.
#[derive(Debug, Clone, Serialize)]
pub struct SessionPayload {
    pub session: crate::model::Session,
    pub items: Vec<crate::model::ContextItem>,
    pub checkpoints: Vec<crate::model::Checkpoint>,
    pub project_paths: Vec<String>,
    /// SHA-256 over the serialized content, for server-side dedup.
    pub content_hash: String,
    pub exported_at: i64,
}

/// Build the upload payload for a session.
///
/// # Errors
///
/// Returns an error when the session is missing.
pub async fn build_session_payload(
    storage: &Mutex<SqliteStorage>,
    session_id: &str,
) -> Result<SessionPayload> {
    let guard = storage.lock().await;

    let session = guard.require_session(session_id)?;
    let items = guard.list_context_items(session_id, None, None, None, Some(10_000))?;
    let (checkpoints, _) = guard.list_checkpoints(session_id, Some(100))?;
    let project_paths = guard.get_session_paths(session_id)?;

    let mut hasher = Sha256::new();
    hasher.update(serde_json::to_vec(&session)?);
    hasher.update(serde_json::to_vec(&items)?);
    let content_hash = format!("{:x}", hasher.finalize());

    Ok(SessionPayload {
        session,
        items,
        checkpoints,
        project_paths,
        content_hash,
        exported_at: crate::now_ms(),
    })
}

/// HTTP client for the remote sync service.
pub struct SyncClient {
    http: reqwest::Client,
    base_url: String,
}

impl SyncClient {
    /// Create a client for the configured remote, `None` when no remote
    /// is configured.
    #[must_use]
    pub fn from_config() -> Option<Self> {
        let base_url = resolve_sync_url()?;
        let http = reqwest::Client::builder()
            .timeout(SYNC_TIMEOUT)
            .build()
            .ok()?;
        Some(Self { http, base_url })
    }

    /// Create a client against an explicit endpoint (tests).
    #[must_use]
    pub fn new(base_url: String) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(SYNC_TIMEOUT)
                .build()
                .unwrap_or_default(),
            base_url,
        }
    }

    /// Upload one queued payload.
    ///
    /// # Errors
    ///
    /// Returns the failure classification driving the queue policy.
    pub async fn upload(
        &self,
        payload: &serde_json::Value,
        credentials: &CredentialStore,
    ) -> std::result::Result<(), SyncFailure> {
        let url = format!("{}/v1/sessions", self.base_url.trim_end_matches('/'));

        let mut request = self.http.post(&url).json(payload);
        if let Ok(Some(token)) = credentials.get(API_KEY_CREDENTIAL) {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| SyncFailure::Retry(format!("network error: {e}")))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            Err(SyncFailure::Auth(format!("{status}: {body}")))
        } else if status.is_client_error() {
            Err(SyncFailure::Drop(format!("{status}: {body}")))
        } else {
            Err(SyncFailure::Retry(format!("{status}: {body}")))
        }
    }
}

/// Resolve the remote sync endpoint (env over config file).
#[must_use]
pub fn resolve_sync_url() -> Option<String> {
    if let Ok(url) = std::env::var("SAVECONTEXT_SYNC_URL") {
        if !url.trim().is_empty() {
            return Some(url);
        }
    }

    crate::embeddings::load_config().ok()?.sync_url
}
