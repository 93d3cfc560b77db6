//! Project memory tool handlers.

use super::ToolOutput;
use crate::error::Error;
use crate::model::{Memory, MemoryCategory};
use crate::server::requests::{
    MemoryDeleteRequest, MemoryGetRequest, MemoryListRequest, MemorySaveRequest,
};
use crate::server::SaveContextServer;
use crate::validate;

fn memory_json(memory: &Memory) -> serde_json::Value {
    serde_json::json!({
        "id": memory.id,
        "project_path": memory.project_path,
        "key": memory.key,
        "value": memory.value,
        "category": memory.category.as_str(),
        "created_at": memory.created_at,
        "updated_at": memory.updated_at,
    })
}

fn parse_memory_category(input: &str) -> crate::Result<MemoryCategory> {
    MemoryCategory::parse(input).ok_or_else(|| {
        Error::InvalidArgument(format!(
            "unknown memory category '{input}'; use command, config, or note"
        ))
    })
}

pub async fn save(server: &SaveContextServer, req: MemorySaveRequest) -> ToolOutput {
    validate::validate_key(&req.key)?;
    validate::validate_value_size(&req.value)?;

    let category = req
        .category
        .as_deref()
        .map(parse_memory_category)
        .transpose()?
        .unwrap_or_default();

    let (project_path, _) = server.resolve_project(req.project_path).await?;
    let agent_id = server.agent_id().await;

    let memory = {
        let mut storage = server.storage.lock().await;
        storage.save_memory(&project_path, &req.key, &req.value, category, &agent_id)?
    };

    Ok((
        memory_json(&memory),
        Some(format!("Saved memory '{}'", memory.key)),
    ))
}

pub async fn get(server: &SaveContextServer, req: MemoryGetRequest) -> ToolOutput {
    let (project_path, _) = server.resolve_project(req.project_path).await?;

    let memory = {
        let storage = server.storage.lock().await;
        storage
            .get_memory(&project_path, &req.key)?
            .ok_or(Error::MemoryNotFound { key: req.key })?
    };

    Ok((memory_json(&memory), None))
}

pub async fn list(server: &SaveContextServer, req: MemoryListRequest) -> ToolOutput {
    let category = req
        .category
        .as_deref()
        .map(parse_memory_category)
        .transpose()?;

    let (project_path, _) = server.resolve_project(req.project_path).await?;

    let memories = {
        let storage = server.storage.lock().await;
        storage.list_memory(&project_path, category, req.limit)?
    };

    Ok((
        serde_json::json!({
            "project_path": project_path,
            "memories": memories.iter().map(memory_json).collect::<Vec<_>>(),
            "count": memories.len(),
        }),
        None,
    ))
}

pub async fn delete(server: &SaveContextServer, req: MemoryDeleteRequest) -> ToolOutput {
    let (project_path, _) = server.resolve_project(req.project_path).await?;
    let agent_id = server.agent_id().await;

    {
        let mut storage = server.storage.lock().await;
        storage.delete_memory(&project_path, &req.key, &agent_id)?;
    }

    Ok((
        serde_json::json!({ "deleted": req.key }),
        Some("Memory deleted".to_string()),
    ))
}
