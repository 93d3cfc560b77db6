//! Sync and stats tool handlers.

use super::ToolOutput;
use crate::server::requests::{GetStatsRequest, SaveSessionRequest};
use crate::server::SaveContextServer;
use crate::sync::build_session_payload;

/// Queue a session for upload to the remote service.
pub async fn save_session(server: &SaveContextServer, req: SaveSessionRequest) -> ToolOutput {
    let session = match req.session_id {
        Some(ref id) => {
            let storage = server.storage.lock().await;
            storage.require_session(id)?
        }
        None => server.require_session().await?,
    };

    if !server.sync.remote_configured() {
        return Ok((
            serde_json::json!({ "queued": false, "session_id": session.id }),
            Some("No remote configured; session stays local".to_string()),
        ));
    }

    let payload = build_session_payload(&server.storage, &session.id).await?;
    let item = {
        let queue = server.sync.queue();
        let mut guard = queue.lock().await;
        guard.enqueue(serde_json::to_value(&payload)?)?
    };

    Ok((
        serde_json::json!({
            "queued": true,
            "session_id": session.id,
            "queue_item_id": item.id,
            "next_retry_at": item.next_retry_at,
        }),
        Some(format!("Session '{}' queued for sync", session.name)),
    ))
}

/// Trigger an immediate queue drain.
pub async fn sync_now(server: &SaveContextServer) -> ToolOutput {
    if !server.sync.remote_configured() {
        return Ok((
            serde_json::json!({ "triggered": false }),
            Some("No remote configured".to_string()),
        ));
    }

    server.sync.sync_now().await;
    let status = server.sync.status().await;

    Ok((
        serde_json::json!({ "triggered": true, "queued": status.queued }),
        Some("Sync triggered".to_string()),
    ))
}

/// Observable sync state.
pub async fn sync_status(server: &SaveContextServer) -> ToolOutput {
    let status = server.sync.status().await;

    let message = if status.needs_reauth {
        Some("Sync credentials were rejected; sign in again to resume uploads".to_string())
    } else {
        None
    };

    Ok((serde_json::to_value(&status)?, message))
}

/// Store-wide statistics.
pub async fn get_stats(server: &SaveContextServer, req: GetStatsRequest) -> ToolOutput {
    let project_path = match req.project_path {
        Some(ref p) => Some(crate::config::canonical_project_path(p)),
        None => server
            .current_session_project()
            .await,
    };

    let storage = server.storage.lock().await;
    let conn = storage.conn();

    let count = |sql: &str, param: Option<&str>| -> crate::Result<i64> {
        let n = match param {
            Some(p) => conn.query_row(sql, [p], |row| row.get(0))?,
            None => conn.query_row(sql, [], |row| row.get(0))?,
        };
        Ok(n)
    };

    let data = if let Some(ref path) = project_path {
        serde_json::json!({
            "project_path": path,
            "sessions": count(
                "SELECT COUNT(DISTINCT session_id) FROM session_projects WHERE project_path = ?1",
                Some(path),
            )?,
            "issues": count("SELECT COUNT(*) FROM issues WHERE project_path = ?1", Some(path))?,
            "open_issues": count(
                "SELECT COUNT(*) FROM issues WHERE project_path = ?1 AND status NOT IN ('closed', 'deferred')",
                Some(path),
            )?,
            "plans": count("SELECT COUNT(*) FROM plans WHERE project_path = ?1", Some(path))?,
            "memories": count(
                "SELECT COUNT(*) FROM project_memory WHERE project_path = ?1",
                Some(path),
            )?,
            "embeddings": storage.vector_stats(None)?,
        })
    } else {
        serde_json::json!({
            "sessions": count("SELECT COUNT(*) FROM sessions", None)?,
            "context_items": count("SELECT COUNT(*) FROM context_items", None)?,
            "checkpoints": count("SELECT COUNT(*) FROM checkpoints", None)?,
            "issues": count("SELECT COUNT(*) FROM issues", None)?,
            "plans": count("SELECT COUNT(*) FROM plans", None)?,
            "projects": count("SELECT COUNT(*) FROM projects", None)?,
            "memories": count("SELECT COUNT(*) FROM project_memory", None)?,
            "embeddings": storage.vector_stats(None)?,
        })
    };

    Ok((data, None))
}
