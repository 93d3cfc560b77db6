//! Context item tool handlers, including search and compaction
//! preparation.

use super::{parse_category, parse_item_priority, ToolOutput};
use crate::error::Error;
use crate::model::{Category, ContextItem, Priority};
use crate::search::{SearchRequest, DEFAULT_LIMIT, DEFAULT_THRESHOLD};
use crate::server::requests::{
    ContextDeleteRequest, ContextGetRequest, ContextListRequest, ContextSaveRequest,
    ContextSearchRequest, ContextTagRequest, ContextUpdateRequest, PrepareCompactionRequest,
};
use crate::server::SaveContextServer;
use crate::storage::{CheckpointFilters, TagAction};
use crate::validate;

fn item_json(item: &ContextItem) -> serde_json::Value {
    serde_json::json!({
        "id": item.id,
        "key": item.key,
        "value": item.value,
        "category": item.category.as_str(),
        "priority": item.priority.as_str(),
        "channel": item.channel,
        "tags": item.tags,
        "size": item.size,
        "created_at": item.created_at,
        "updated_at": item.updated_at,
        "embedding_status": item.embedding_status.as_str(),
    })
}

pub async fn save(server: &SaveContextServer, req: ContextSaveRequest) -> ToolOutput {
    validate::validate_key(&req.key)?;
    validate::validate_value_size(&req.value)?;

    let category = req.category.as_deref().map(parse_category).transpose()?.unwrap_or_default();
    let priority = req
        .priority
        .as_deref()
        .map(parse_item_priority)
        .transpose()?
        .unwrap_or_default();

    let session = server.require_session().await?;

    // Explicit channels are validated; omitted ones inherit the session's
    let channel = match req.channel {
        Some(ref channel) => {
            validate::validate_channel(channel)?;
            channel.clone()
        }
        None => session.channel.clone(),
    };

    let agent_id = server.agent_id().await;
    let tags = req.tags.unwrap_or_default();

    let item = {
        let mut storage = server.storage.lock().await;
        storage.save_context_item(
            &session.id,
            &req.key,
            &req.value,
            category,
            priority,
            &channel,
            &tags,
            &agent_id,
        )?
    };

    // Fire-and-forget embedding; status is the source of truth
    server.pipeline.schedule(item.clone()).await;

    Ok((
        item_json(&item),
        Some(format!("Saved '{}'", item.key)),
    ))
}

pub async fn get(server: &SaveContextServer, req: ContextGetRequest) -> ToolOutput {
    let session = server.require_session().await?;

    let item = {
        let storage = server.storage.lock().await;
        storage
            .get_context_item_by_key(&session.id, &req.key)?
            .ok_or(Error::ItemNotFound { key: req.key })?
    };

    Ok((item_json(&item), None))
}

pub async fn update(server: &SaveContextServer, req: ContextUpdateRequest) -> ToolOutput {
    if let Some(ref value) = req.value {
        validate::validate_value_size(value)?;
    }
    let category = req.category.as_deref().map(parse_category).transpose()?;
    let priority = req.priority.as_deref().map(parse_item_priority).transpose()?;
    if let Some(ref channel) = req.channel {
        validate::validate_channel(channel)?;
    }

    let session = server.require_session().await?;
    let agent_id = server.agent_id().await;

    let item = {
        let mut storage = server.storage.lock().await;
        storage.update_context_item(
            &session.id,
            &req.key,
            req.value.as_deref(),
            category,
            priority,
            req.channel.as_deref(),
            &agent_id,
        )?
    };

    if req.value.is_some() {
        server.pipeline.schedule(item.clone()).await;
    }

    Ok((item_json(&item), Some(format!("Updated '{}'", item.key))))
}

pub async fn delete(server: &SaveContextServer, req: ContextDeleteRequest) -> ToolOutput {
    let session = server.require_session().await?;
    let agent_id = server.agent_id().await;

    {
        let mut storage = server.storage.lock().await;
        storage.delete_context_item(&session.id, &req.key, &agent_id)?;
    }

    Ok((
        serde_json::json!({ "deleted": req.key }),
        Some("Context item deleted".to_string()),
    ))
}

pub async fn list(server: &SaveContextServer, req: ContextListRequest) -> ToolOutput {
    let category = req.category.as_deref().map(parse_category).transpose()?;
    let priority = req.priority.as_deref().map(parse_item_priority).transpose()?;

    let session = server.require_session().await?;

    let items = {
        let storage = server.storage.lock().await;
        storage.list_context_items(
            &session.id,
            category,
            priority,
            req.channel.as_deref(),
            req.limit,
        )?
    };

    let data = serde_json::json!({
        "session_id": session.id,
        "items": items.iter().map(item_json).collect::<Vec<_>>(),
        "count": items.len(),
    });

    Ok((data, None))
}

pub async fn tag(server: &SaveContextServer, req: ContextTagRequest) -> ToolOutput {
    let action = TagAction::parse(&req.action).ok_or_else(|| {
        Error::InvalidArgument(format!("unknown tag action '{}'; use add or remove", req.action))
    })?;

    if req.keys.is_none() && req.key_pattern.is_none() {
        return Err(Error::InvalidArgument(
            "pass keys or key_pattern to select items".to_string(),
        ));
    }
    if req.tags.is_empty() {
        return Err(Error::InvalidArgument("tags must not be empty".to_string()));
    }

    let session = server.require_session().await?;
    let agent_id = server.agent_id().await;

    let affected = {
        let mut storage = server.storage.lock().await;
        storage.tag_context_items(
            &session.id,
            req.keys.as_deref(),
            req.key_pattern.as_deref(),
            &req.tags,
            action,
            &agent_id,
        )?
    };

    Ok((
        serde_json::json!({ "affected": affected }),
        Some(format!("{affected} item(s) updated")),
    ))
}

pub async fn search(server: &SaveContextServer, req: ContextSearchRequest) -> ToolOutput {
    let category = req.category.as_deref().map(parse_category).transpose()?;
    let priority = req.priority.as_deref().map(parse_item_priority).transpose()?;

    let all_sessions = req.all_sessions.unwrap_or(false);
    let session_id = if all_sessions {
        None
    } else {
        Some(server.require_session().await?.id)
    };

    let request = SearchRequest {
        query: req.query,
        session_id,
        category,
        priority,
        channel: req.channel,
        limit: req.limit.map_or(DEFAULT_LIMIT, |l| l as usize),
        threshold: req.threshold.unwrap_or(DEFAULT_THRESHOLD),
    };

    let response = crate::search::search(&server.storage, &server.pipeline, &request).await?;

    Ok((serde_json::to_value(&response)?, None))
}

// ── Compaction ───────────────────────────────────────────────

/// Limits for compaction context collection.
const HIGH_PRIORITY_LIMIT: u32 = 50;
const DECISION_LIMIT: u32 = 20;
const REMINDER_LIMIT: u32 = 20;
const PROGRESS_LIMIT: u32 = 10;

/// Prepare for conversation compaction: checkpoint everything, collect
/// the critical context, persist the summary for later retrieval, and
/// return it.
pub async fn prepare_compaction(
    server: &SaveContextServer,
    req: PrepareCompactionRequest,
) -> ToolOutput {
    let session = server.require_session().await?;
    let agent_id = server.agent_id().await;
    let include_git = req.include_git.unwrap_or(true);

    let git = if include_git {
        let cwd = session
            .project_path
            .clone()
            .unwrap_or_else(|| ".".to_string());
        Some(crate::git::git_status(std::path::Path::new(&cwd)))
    } else {
        None
    };

    let timestamp = chrono::Utc::now().format("%Y%m%d-%H%M%S");
    let checkpoint_name = format!("pre-compact-{timestamp}");

    let checkpoint = {
        let mut storage = server.storage.lock().await;
        storage.create_checkpoint(
            &session.id,
            &checkpoint_name,
            Some("Automatic checkpoint before context compaction"),
            git.as_ref().map(|g| g.to_porcelain()).as_deref(),
            git.as_ref().and_then(|g| g.branch.as_deref()),
            &CheckpointFilters::default(),
            &agent_id,
        )?
    };

    // Collect the critical context
    let (high_priority, decisions, reminders, progress) = {
        let storage = server.storage.lock().await;
        (
            storage.list_context_items(
                &session.id,
                None,
                Some(Priority::High),
                None,
                Some(HIGH_PRIORITY_LIMIT),
            )?,
            storage.list_context_items(
                &session.id,
                Some(Category::Decision),
                None,
                None,
                Some(DECISION_LIMIT),
            )?,
            storage.list_context_items(
                &session.id,
                Some(Category::Reminder),
                None,
                None,
                Some(REMINDER_LIMIT),
            )?,
            storage.list_context_items(
                &session.id,
                Some(Category::Progress),
                None,
                None,
                Some(PROGRESS_LIMIT),
            )?,
        )
    };

    // Unfinished reminders become next steps
    let next_steps: Vec<&ContextItem> = reminders
        .iter()
        .filter(|t| {
            let lower = t.value.to_lowercase();
            !lower.contains("completed") && !lower.contains("done") && !lower.contains("[completed]")
        })
        .take(5)
        .collect();

    let brief = |item: &ContextItem| {
        serde_json::json!({
            "key": item.key,
            "value": item.value,
            "category": item.category.as_str(),
            "priority": item.priority.as_str(),
        })
    };

    let summary = serde_json::json!({
        "checkpoint": {
            "id": checkpoint.id,
            "name": checkpoint.name,
            "session_id": session.id,
            "item_count": checkpoint.item_count,
            "created_at": checkpoint.created_at,
        },
        "stats": {
            "total_items_saved": checkpoint.item_count,
            "critical_items": high_priority.len(),
            "pending_tasks": next_steps.len(),
            "decisions_made": decisions.len(),
        },
        "git_context": git.as_ref().map(|g| serde_json::json!({
            "branch": g.branch,
            "files": g.changed_files(10),
        })),
        "critical_context": {
            "high_priority_items": high_priority.iter().take(5).map(brief).collect::<Vec<_>>(),
            "next_steps": next_steps.iter().map(|i| brief(i)).collect::<Vec<_>>(),
            "key_decisions": decisions.iter().take(10).map(brief).collect::<Vec<_>>(),
            "recent_progress": progress.iter().take(3).map(brief).collect::<Vec<_>>(),
        },
        "restore_instructions": {
            "tool": "checkpoint_restore",
            "checkpoint_id": checkpoint.id,
            "checkpoint_name": checkpoint.name,
            "message": format!("To continue this session, restore checkpoint '{}'", checkpoint.name),
        },
    });

    // Persist the summary for retrieval after the conversation resets
    let summary_key = format!("compaction_summary_{}", checkpoint.id);
    let summary_item = {
        let mut storage = server.storage.lock().await;
        storage.save_context_item(
            &session.id,
            &summary_key,
            &serde_json::to_string(&summary)?,
            Category::Note,
            Priority::High,
            &session.channel,
            &["compaction".to_string()],
            &agent_id,
        )?
    };
    server.pipeline.schedule(summary_item).await;

    server.enqueue_session_sync(&session.id).await;

    Ok((
        summary,
        Some(format!(
            "Compaction prepared: checkpoint '{}' with {} items",
            checkpoint.name, checkpoint.item_count
        )),
    ))
}
