//! Project tool handlers.

use super::ToolOutput;
use crate::config::canonical_project_path;
use crate::error::Error;
use crate::model::{project::is_valid_prefix, Project};
use crate::server::requests::{
    ProjectCreateRequest, ProjectDeleteRequest, ProjectGetRequest, ProjectListRequest,
    ProjectUpdateRequest,
};
use crate::server::SaveContextServer;

fn project_json(project: &Project) -> serde_json::Value {
    serde_json::json!({
        "id": project.id,
        "project_path": project.project_path,
        "name": project.name,
        "description": project.description,
        "issue_prefix": project.issue_prefix,
        "next_issue_number": project.next_issue_number,
        "created_at": project.created_at,
        "updated_at": project.updated_at,
    })
}

pub async fn create(server: &SaveContextServer, req: ProjectCreateRequest) -> ToolOutput {
    let path = canonical_project_path(&req.project_path);

    let name = req.name.unwrap_or_else(|| {
        std::path::Path::new(&path)
            .file_name()
            .map_or_else(|| path.clone(), |n| n.to_string_lossy().to_string())
    });

    let mut project = Project::new(path, name);
    project.description = req.description;
    if let Some(prefix) = req.issue_prefix {
        let prefix = prefix.to_uppercase();
        if !is_valid_prefix(&prefix) {
            return Err(Error::InvalidArgument(
                "issue prefix must be 1-8 alphanumeric characters".to_string(),
            ));
        }
        project.issue_prefix = prefix;
    }

    let agent_id = server.agent_id().await;
    {
        let mut storage = server.storage.lock().await;
        storage.create_project(&project, &agent_id)?;
    }

    Ok((
        project_json(&project),
        Some(format!("Registered project '{}'", project.name)),
    ))
}

pub async fn get(server: &SaveContextServer, req: ProjectGetRequest) -> ToolOutput {
    let project = {
        let storage = server.storage.lock().await;
        storage
            .get_project(&req.project)?
            .ok_or(Error::ProjectNotFound { path: req.project })?
    };

    Ok((project_json(&project), None))
}

pub async fn list(server: &SaveContextServer, req: ProjectListRequest) -> ToolOutput {
    let projects = {
        let storage = server.storage.lock().await;
        storage.list_projects(req.limit.unwrap_or(50) as usize)?
    };

    Ok((
        serde_json::json!({
            "projects": projects.iter().map(project_json).collect::<Vec<_>>(),
            "count": projects.len(),
        }),
        None,
    ))
}

pub async fn update(server: &SaveContextServer, req: ProjectUpdateRequest) -> ToolOutput {
    if let Some(ref prefix) = req.issue_prefix {
        if !is_valid_prefix(&prefix.to_uppercase()) {
            return Err(Error::InvalidArgument(
                "issue prefix must be 1-8 alphanumeric characters".to_string(),
            ));
        }
    }

    let path = canonical_project_path(&req.project_path);
    let agent_id = server.agent_id().await;
    let prefix = req.issue_prefix.map(|p| p.to_uppercase());

    let project = {
        let mut storage = server.storage.lock().await;
        storage.update_project(
            &path,
            req.name.as_deref(),
            req.description.as_deref(),
            prefix.as_deref(),
            &agent_id,
        )?
    };

    Ok((
        project_json(&project),
        Some(format!("Updated project '{}'", project.name)),
    ))
}

pub async fn delete(server: &SaveContextServer, req: ProjectDeleteRequest) -> ToolOutput {
    let path = canonical_project_path(&req.project_path);
    let agent_id = server.agent_id().await;

    {
        let mut storage = server.storage.lock().await;
        let project = storage.require_project(&path)?;
        if project.name != req.project_name {
            return Err(Error::VerificationFailed {
                entity: "project",
                expected: project.name,
                provided: req.project_name,
            });
        }
        storage.delete_project(&path, &agent_id)?;
    }

    Ok((
        serde_json::json!({ "deleted": path }),
        Some("Project deleted; sessions were unlinked, issues/plans/memory removed".to_string()),
    ))
}
