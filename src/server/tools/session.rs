//! Session tool handlers.

use super::ToolOutput;
use crate::agent;
use crate::config::canonical_project_path;
use crate::error::Error;
use crate::model::{Session, SessionStatus};
use crate::server::requests::{
    SessionDeleteRequest, SessionEndRequest, SessionListRequest, SessionPathRequest,
    SessionPauseRequest, SessionRenameRequest, SessionResumeRequest, SessionStartRequest,
    SessionStatusRequest, SessionSwitchRequest,
};
use crate::server::SaveContextServer;

fn session_json(session: &Session) -> serde_json::Value {
    serde_json::json!({
        "id": session.id,
        "name": session.name,
        "description": session.description,
        "branch": session.branch,
        "channel": session.channel,
        "project_path": session.project_path,
        "status": session.status.as_str(),
        "created_at": session.created_at,
        "updated_at": session.updated_at,
        "ended_at": session.ended_at,
    })
}

pub async fn start(server: &SaveContextServer, req: SessionStartRequest) -> ToolOutput {
    if req.name.trim().is_empty() {
        return Err(Error::InvalidArgument("session name must not be empty".to_string()));
    }

    let project_path = match req.project_path {
        Some(ref p) => canonical_project_path(p),
        None => crate::config::cwd_project_path()?,
    };

    let branch = req.branch.clone().or_else(|| {
        crate::git::current_branch(std::path::Path::new(&project_path))
    });

    let provider = server.provider_name().await;
    let cached_agent_id = server.cached_agent_id().await;

    let args = agent::SessionStartArgs {
        name: req.name,
        description: req.description,
        project_path,
        branch,
        channel: req.channel,
        provider,
        agent_id: cached_agent_id,
        force_new: req.force_new.unwrap_or(false),
    };

    let outcome = {
        let mut storage = server.storage.lock().await;
        agent::start_session(&mut storage, &args)?
    };

    server.set_agent_id(&outcome.agent_id).await;

    let mut data = session_json(&outcome.session);
    data["resumed"] = serde_json::json!(outcome.resumed);
    data["path_added"] = serde_json::json!(outcome.path_added);
    data["agent_id"] = serde_json::json!(outcome.agent_id);
    if let Some(ref warning) = outcome.warning {
        data["warning"] = serde_json::json!(warning);
    }

    let message = if outcome.resumed {
        format!("Resumed session '{}'", outcome.session.name)
    } else {
        format!("Started session '{}'", outcome.session.name)
    };

    Ok((data, Some(message)))
}

pub async fn status(server: &SaveContextServer, req: SessionStatusRequest) -> ToolOutput {
    let storage = server.storage.lock().await;

    let session = match req.session_id {
        Some(ref id) => storage.require_session(id)?,
        None => {
            let agent_id = server.agent_id().await;
            agent::require_active_session(&storage, &agent_id)?
        }
    };

    let items = storage.list_context_items(&session.id, None, None, None, Some(10_000))?;
    let (_, checkpoint_count) = storage.list_checkpoints(&session.id, Some(1))?;
    let paths = storage.get_session_paths(&session.id)?;

    let total_size: i64 = items.iter().map(|i| i.size).sum();
    let mut data = session_json(&session);
    data["item_count"] = serde_json::json!(items.len());
    data["total_size"] = serde_json::json!(total_size);
    data["checkpoint_count"] = serde_json::json!(checkpoint_count);
    data["project_paths"] = serde_json::json!(paths);

    Ok((data, None))
}

pub async fn rename(server: &SaveContextServer, req: SessionRenameRequest) -> ToolOutput {
    let agent_id = server.agent_id().await;
    let session = {
        let mut storage = server.storage.lock().await;
        storage.rename_session(&req.session_id, &req.current_name, &req.new_name, &agent_id)?;
        storage.require_session(&req.session_id)?
    };

    Ok((
        session_json(&session),
        Some(format!("Renamed session to '{}'", req.new_name)),
    ))
}

pub async fn pause(server: &SaveContextServer, req: SessionPauseRequest) -> ToolOutput {
    let agent_id = server.agent_id().await;
    let session = {
        let mut storage = server.storage.lock().await;
        let session = match req.session_id {
            Some(ref id) => storage.require_session(id)?,
            None => agent::require_active_session(&storage, &agent_id)?,
        };
        storage.update_session_status(&session.id, SessionStatus::Paused, &agent_id)?;
        storage.require_session(&session.id)?
    };

    crate::config::clear_status_cache();

    Ok((
        session_json(&session),
        Some(format!("Paused session '{}'", session.name)),
    ))
}

pub async fn resume(server: &SaveContextServer, req: SessionResumeRequest) -> ToolOutput {
    let agent_id = server.agent_id().await;
    let session = {
        let mut storage = server.storage.lock().await;
        let session = storage.resume_session(&req.session_id, &req.session_name, &agent_id)?;

        // Rebind the agent to the resumed session
        let mut binding = storage
            .get_agent_binding(&agent_id)?
            .unwrap_or(crate::model::AgentBinding {
                agent_id: agent_id.clone(),
                current_session_id: None,
                last_project_path: session.project_path.clone(),
                last_branch: session.branch.clone(),
                provider: server.provider_name().await,
                last_active_at: crate::now_ms(),
            });
        binding.current_session_id = Some(session.id.clone());
        binding.last_active_at = crate::now_ms();
        storage.upsert_agent_binding(&binding)?;

        session
    };

    Ok((
        session_json(&session),
        Some(format!("Resumed session '{}'", session.name)),
    ))
}

pub async fn switch(server: &SaveContextServer, req: SessionSwitchRequest) -> ToolOutput {
    let agent_id = server.agent_id().await;
    let session = {
        let mut storage = server.storage.lock().await;
        storage.switch_session(&agent_id, &req.session_id, &agent_id)?
    };

    Ok((
        session_json(&session),
        Some(format!("Switched to session '{}'", session.name)),
    ))
}

pub async fn end(server: &SaveContextServer, req: SessionEndRequest) -> ToolOutput {
    let agent_id = server.agent_id().await;
    let session = {
        let mut storage = server.storage.lock().await;
        let session = match req.session_id {
            Some(ref id) => storage.require_session(id)?,
            None => agent::require_active_session(&storage, &agent_id)?,
        };
        storage.update_session_status(&session.id, SessionStatus::Completed, &agent_id)?;
        storage.require_session(&session.id)?
    };

    // Completed sessions upload when a remote is configured
    server.enqueue_session_sync(&session.id).await;
    crate::config::clear_status_cache();

    Ok((
        session_json(&session),
        Some(format!("Ended session '{}'", session.name)),
    ))
}

pub async fn delete(server: &SaveContextServer, req: SessionDeleteRequest) -> ToolOutput {
    let agent_id = server.agent_id().await;
    {
        let mut storage = server.storage.lock().await;
        let session = storage.require_session(&req.session_id)?;
        if session.name != req.session_name {
            return Err(Error::VerificationFailed {
                entity: "session",
                expected: session.name,
                provided: req.session_name,
            });
        }
        storage.delete_session(&req.session_id, &agent_id)?;
    }

    Ok((
        serde_json::json!({ "deleted": req.session_id }),
        Some("Session deleted".to_string()),
    ))
}

pub async fn list(server: &SaveContextServer, req: SessionListRequest) -> ToolOutput {
    let status = match req.status.as_deref() {
        Some(s) => Some(match s {
            "active" => SessionStatus::Active,
            "paused" => SessionStatus::Paused,
            "completed" => SessionStatus::Completed,
            other => {
                return Err(Error::InvalidArgument(format!(
                    "unknown session status '{other}'; use active, paused, or completed"
                )))
            }
        }),
        None => None,
    };

    let project_path = req.project_path.as_deref().map(canonical_project_path);

    let sessions = {
        let storage = server.storage.lock().await;
        storage.list_sessions(project_path.as_deref(), status, req.search.as_deref(), req.limit)?
    };

    let data = serde_json::json!({
        "sessions": sessions.iter().map(session_json).collect::<Vec<_>>(),
        "count": sessions.len(),
    });

    Ok((data, None))
}

pub async fn add_path(server: &SaveContextServer, req: SessionPathRequest) -> ToolOutput {
    let agent_id = server.agent_id().await;
    let path = canonical_project_path(&req.project_path);

    let (session, added) = {
        let mut storage = server.storage.lock().await;
        let session = match req.session_id {
            Some(ref id) => storage.require_session(id)?,
            None => agent::require_active_session(&storage, &agent_id)?,
        };
        let added = storage.add_session_path(&session.id, &path, &agent_id)?;
        (session, added)
    };

    let paths = {
        let storage = server.storage.lock().await;
        storage.get_session_paths(&session.id)?
    };

    let message = if added {
        format!("Added {path} to session '{}'", session.name)
    } else {
        format!("{path} was already attached")
    };

    Ok((
        serde_json::json!({ "session_id": session.id, "added": added, "project_paths": paths }),
        Some(message),
    ))
}

pub async fn remove_path(server: &SaveContextServer, req: SessionPathRequest) -> ToolOutput {
    let agent_id = server.agent_id().await;
    let path = canonical_project_path(&req.project_path);

    let session = {
        let mut storage = server.storage.lock().await;
        let session = match req.session_id {
            Some(ref id) => storage.require_session(id)?,
            None => agent::require_active_session(&storage, &agent_id)?,
        };
        storage.remove_session_path(&session.id, &path, &agent_id)?;
        session
    };

    let paths = {
        let storage = server.storage.lock().await;
        storage.get_session_paths(&session.id)?
    };

    Ok((
        serde_json::json!({ "session_id": session.id, "project_paths": paths }),
        Some(format!("Removed {path} from session '{}'", session.name)),
    ))
}
