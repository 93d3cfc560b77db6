//! Dashboard HTTP API.
//!
//! A small read-mostly surface over the same store, sharing the RPC
//! envelope shape. Enabled with `--http <port>`; binds localhost only.

use crate::embeddings::SharedStorage;
use crate::error::Error;
use crate::model::{Category, Priority, SessionStatus};
use crate::server::envelope::Envelope;
use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use std::net::SocketAddr;
use tracing::info;

#[derive(Clone)]
struct AppState {
    storage: SharedStorage,
}

/// Build the dashboard router.
fn router(storage: SharedStorage) -> Router {
    Router::new()
        .route("/api/sessions", get(list_sessions))
        .route("/api/sessions/{id}", get(get_session))
        .route("/api/sessions/{id}/items", get(list_items).post(save_item))
        .route("/api/issues", get(list_issues))
        .route("/api/stats", get(stats))
        .with_state(AppState { storage })
}

/// Serve the dashboard API on `127.0.0.1:{port}` until shutdown.
///
/// # Errors
///
/// Returns an error if the listener cannot bind.
pub async fn serve(storage: SharedStorage, port: u16) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "Dashboard API listening");
    axum::serve(listener, router(storage)).await?;
    Ok(())
}

fn ok(data: serde_json::Value) -> Json<Envelope> {
    Json(Envelope::ok(data))
}

fn err(error: &Error) -> Json<Envelope> {
    Json(Envelope::err(error))
}

#[derive(Debug, Deserialize)]
struct SessionQuery {
    project_path: Option<String>,
    status: Option<String>,
    search: Option<String>,
    limit: Option<u32>,
}

async fn list_sessions(
    State(state): State<AppState>,
    Query(query): Query<SessionQuery>,
) -> Json<Envelope> {
    let status = query.status.as_deref().map(SessionStatus::parse);

    let storage = state.storage.lock().await;
    match storage.list_sessions(
        query.project_path.as_deref(),
        status,
        query.search.as_deref(),
        query.limit,
    ) {
        Ok(sessions) => ok(serde_json::json!({ "sessions": sessions })),
        Err(ref e) => err(e),
    }
}

async fn get_session(State(state): State<AppState>, Path(id): Path<String>) -> Json<Envelope> {
    let storage = state.storage.lock().await;
    match storage.require_session(&id) {
        Ok(session) => {
            let paths = storage.get_session_paths(&session.id).unwrap_or_default();
            ok(serde_json::json!({ "session": session, "project_paths": paths }))
        }
        Err(ref e) => err(e),
    }
}

#[derive(Debug, Deserialize)]
struct ItemQuery {
    category: Option<String>,
    priority: Option<String>,
    channel: Option<String>,
    limit: Option<u32>,
}

async fn list_items(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<ItemQuery>,
) -> Json<Envelope> {
    let category = query.category.as_deref().and_then(Category::parse);
    let priority = query.priority.as_deref().and_then(Priority::parse);

    let storage = state.storage.lock().await;
    match storage.list_context_items(&id, category, priority, query.channel.as_deref(), query.limit)
    {
        Ok(items) => ok(serde_json::json!({ "items": items })),
        Err(ref e) => err(e),
    }
}

#[derive(Debug, Deserialize)]
struct SaveItemBody {
    key: String,
    value: String,
    category: Option<String>,
    priority: Option<String>,
    channel: Option<String>,
    tags: Option<Vec<String>>,
}

/// The one write the dashboard gets: saving a context item.
async fn save_item(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<SaveItemBody>,
) -> Json<Envelope> {
    if let Err(ref e) = crate::validate::validate_value_size(&body.value) {
        return err(e);
    }

    let category = body.category.as_deref().and_then(Category::parse).unwrap_or_default();
    let priority = body.priority.as_deref().and_then(Priority::parse).unwrap_or_default();

    let mut storage = state.storage.lock().await;

    let channel = match body.channel {
        Some(channel) => channel,
        None => match storage.require_session(&id) {
            Ok(session) => session.channel,
            Err(ref e) => return err(e),
        },
    };

    match storage.save_context_item(
        &id,
        &body.key,
        &body.value,
        category,
        priority,
        &channel,
        &body.tags.unwrap_or_default(),
        "dashboard",
    ) {
        Ok(item) => ok(serde_json::json!({ "item": item })),
        Err(ref e) => err(e),
    }
}

#[derive(Debug, Deserialize)]
struct IssueQuery {
    project_path: String,
    status: Option<String>,
    limit: Option<u32>,
}

async fn list_issues(
    State(state): State<AppState>,
    Query(query): Query<IssueQuery>,
) -> Json<Envelope> {
    let filters = crate::storage::IssueFilters {
        status: query
            .status
            .as_deref()
            .and_then(crate::model::IssueStatus::parse),
        ..crate::storage::IssueFilters::default()
    };

    let storage = state.storage.lock().await;
    match storage.list_issues(
        &query.project_path,
        &filters,
        crate::storage::IssueSort::Priority,
        false,
        query.limit,
    ) {
        Ok(issues) => ok(serde_json::json!({ "issues": issues })),
        Err(ref e) => err(e),
    }
}

async fn stats(State(state): State<AppState>) -> Json<Envelope> {
    let storage = state.storage.lock().await;
    let conn = storage.conn();

    let count = |sql: &str| -> i64 {
        conn.query_row(sql, [], |row| row.get(0)).unwrap_or(0)
    };

    ok(serde_json::json!({
        "sessions": count("SELECT COUNT(*) FROM sessions"),
        "context_items": count("SELECT COUNT(*) FROM context_items"),
        "checkpoints": count("SELECT COUNT(*) FROM checkpoints"),
        "issues": count("SELECT COUNT(*) FROM issues"),
        "plans": count("SELECT COUNT(*) FROM plans"),
        "projects": count("SELECT COUNT(*) FROM projects"),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SqliteStorage;
    use std::sync::Arc;
    use tokio::sync::Mutex;

    #[test]
    fn test_router_builds() {
        let storage: SharedStorage = Arc::new(Mutex::new(SqliteStorage::open_memory().unwrap()));
        let _router = router(storage);
    }
}
