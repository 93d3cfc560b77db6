//! Checkpoint tool handlers.

use super::{parse_category, ToolOutput};
use crate::error::Error;
use crate::model::{Category, Checkpoint};
use crate::server::requests::{
    CheckpointCreateRequest, CheckpointDeleteRequest, CheckpointGetRequest,
    CheckpointItemsRequest, CheckpointListRequest, CheckpointRestoreRequest,
    CheckpointSplitRequest,
};
use crate::server::SaveContextServer;
use crate::storage::{CheckpointFilters, SplitPart};

fn checkpoint_json(checkpoint: &Checkpoint) -> serde_json::Value {
    serde_json::json!({
        "id": checkpoint.id,
        "session_id": checkpoint.session_id,
        "name": checkpoint.name,
        "description": checkpoint.description,
        "git_branch": checkpoint.git_branch,
        "item_count": checkpoint.item_count,
        "total_size": checkpoint.total_size,
        "created_at": checkpoint.created_at,
    })
}

fn parse_categories(input: Option<Vec<String>>) -> crate::Result<Vec<Category>> {
    input
        .unwrap_or_default()
        .iter()
        .map(|c| parse_category(c))
        .collect()
}

pub async fn create(server: &SaveContextServer, req: CheckpointCreateRequest) -> ToolOutput {
    if req.name.trim().is_empty() {
        return Err(Error::InvalidArgument("checkpoint name must not be empty".to_string()));
    }

    let session = server.require_session().await?;
    let agent_id = server.agent_id().await;

    let filters = CheckpointFilters {
        include_tags: req.include_tags.unwrap_or_default(),
        include_keys: req.include_keys.unwrap_or_default(),
        include_categories: parse_categories(req.include_categories)?,
        exclude_tags: req.exclude_tags.unwrap_or_default(),
    };

    let git = if req.include_git.unwrap_or(false) {
        let cwd = session.project_path.clone().unwrap_or_else(|| ".".to_string());
        Some(crate::git::git_status(std::path::Path::new(&cwd)))
    } else {
        None
    };

    let checkpoint = {
        let mut storage = server.storage.lock().await;
        storage.create_checkpoint(
            &session.id,
            &req.name,
            req.description.as_deref(),
            git.as_ref().map(|g| g.to_porcelain()).as_deref(),
            git.as_ref().and_then(|g| g.branch.as_deref()),
            &filters,
            &agent_id,
        )?
    };

    Ok((
        checkpoint_json(&checkpoint),
        Some(format!(
            "Checkpoint '{}' captured {} item(s)",
            checkpoint.name, checkpoint.item_count
        )),
    ))
}

pub async fn restore(server: &SaveContextServer, req: CheckpointRestoreRequest) -> ToolOutput {
    let agent_id = server.agent_id().await;

    let target_session_id = match req.session_id {
        Some(id) => id,
        None => server.require_session().await?.id,
    };

    let restore_categories = match req.restore_categories {
        Some(raw) => Some(
            raw.iter()
                .map(|c| parse_category(c))
                .collect::<crate::Result<Vec<_>>>()?,
        ),
        None => None,
    };

    let restored = {
        let mut storage = server.storage.lock().await;
        storage.restore_checkpoint(
            &req.checkpoint_id,
            &req.checkpoint_name,
            &target_session_id,
            req.restore_tags.as_deref(),
            restore_categories.as_deref(),
            &agent_id,
        )?
    };

    Ok((
        serde_json::json!({
            "checkpoint_id": req.checkpoint_id,
            "session_id": target_session_id,
            "restored": restored,
        }),
        Some(format!("Restored {restored} item(s)")),
    ))
}

pub async fn list(server: &SaveContextServer, req: CheckpointListRequest) -> ToolOutput {
    let session = match req.session_id {
        Some(ref id) => {
            let storage = server.storage.lock().await;
            storage.require_session(id)?
        }
        None => server.require_session().await?,
    };

    let (checkpoints, total_matches) = {
        let storage = server.storage.lock().await;
        storage.list_checkpoints(&session.id, req.limit)?
    };

    // Deliberately lightweight rows
    let rows: Vec<serde_json::Value> = checkpoints
        .iter()
        .map(|c| {
            serde_json::json!({
                "id": c.id,
                "name": c.name,
                "session_name": session.name,
                "project_path": session.project_path,
                "item_count": c.item_count,
                "created_at": c.created_at,
            })
        })
        .collect();

    Ok((
        serde_json::json!({ "checkpoints": rows, "total_matches": total_matches }),
        None,
    ))
}

pub async fn get(server: &SaveContextServer, req: CheckpointGetRequest) -> ToolOutput {
    let storage = server.storage.lock().await;

    let checkpoint = storage
        .get_checkpoint(&req.checkpoint_id)?
        .ok_or(Error::CheckpointNotFound { id: req.checkpoint_id })?;

    let preview = storage.get_checkpoint_preview(&checkpoint.id, 5)?;

    let mut data = checkpoint_json(&checkpoint);
    data["git_status"] = serde_json::json!(checkpoint.git_status);
    data["preview"] = serde_json::json!(preview
        .iter()
        .map(|item| {
            serde_json::json!({
                "key": item.key,
                "value": item.value,
                "category": item.category.as_str(),
                "priority": item.priority.as_str(),
            })
        })
        .collect::<Vec<_>>());

    Ok((data, None))
}

pub async fn delete(server: &SaveContextServer, req: CheckpointDeleteRequest) -> ToolOutput {
    let agent_id = server.agent_id().await;
    {
        let mut storage = server.storage.lock().await;
        storage.delete_checkpoint(&req.checkpoint_id, &req.checkpoint_name, &agent_id)?;
    }

    Ok((
        serde_json::json!({ "deleted": req.checkpoint_id }),
        Some("Checkpoint deleted".to_string()),
    ))
}

pub async fn split(server: &SaveContextServer, req: CheckpointSplitRequest) -> ToolOutput {
    if req.splits.is_empty() {
        return Err(Error::InvalidArgument("splits must not be empty".to_string()));
    }

    let agent_id = server.agent_id().await;

    let parts = req
        .splits
        .into_iter()
        .map(|part| {
            Ok(SplitPart {
                name: part.name,
                description: part.description,
                include_tags: part.include_tags.unwrap_or_default(),
                include_categories: parse_categories(part.include_categories)?,
            })
        })
        .collect::<crate::Result<Vec<_>>>()?;

    let result = {
        let mut storage = server.storage.lock().await;
        storage.split_checkpoint(&req.checkpoint_id, &req.checkpoint_name, &parts, &agent_id)?
    };

    Ok((
        serde_json::json!({
            "checkpoints": result.checkpoints.iter().map(checkpoint_json).collect::<Vec<_>>(),
            "warnings": result.warnings,
        }),
        Some(format!("Split into {} checkpoint(s)", result.checkpoints.len())),
    ))
}

pub async fn add_items(server: &SaveContextServer, req: CheckpointItemsRequest) -> ToolOutput {
    let agent_id = server.agent_id().await;
    let added = {
        let mut storage = server.storage.lock().await;
        storage.add_checkpoint_items(&req.checkpoint_id, &req.keys, &agent_id)?
    };

    Ok((
        serde_json::json!({ "checkpoint_id": req.checkpoint_id, "added": added }),
        Some(format!("Added {added} item(s)")),
    ))
}

pub async fn remove_items(server: &SaveContextServer, req: CheckpointItemsRequest) -> ToolOutput {
    let agent_id = server.agent_id().await;
    let removed = {
        let mut storage = server.storage.lock().await;
        storage.remove_checkpoint_items(&req.checkpoint_id, &req.keys, &agent_id)?
    };

    Ok((
        serde_json::json!({ "checkpoint_id": req.checkpoint_id, "removed": removed }),
        Some(format!("Removed {removed} item(s)")),
    ))
}
