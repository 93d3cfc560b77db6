//! Issue tool handlers.

use super::{parse_issue_priority, parse_issue_status, parse_issue_type, ToolOutput};
use crate::error::Error;
use crate::model::{DependencyType, Issue};
use crate::server::requests::{
    GetNextBlockRequest, GetReadyRequest, IssueClaimRequest, IssueCompleteRequest,
    IssueCreateBatchRequest, IssueCreateRequest, IssueDeleteRequest, IssueDependencyRequest,
    IssueLabelsRequest, IssueListRequest, IssueUpdateRequest,
};
use crate::server::SaveContextServer;
use crate::storage::{BatchDependency, BatchIssueSpec, IssueFilters, IssueSort};

fn issue_json(issue: &Issue) -> serde_json::Value {
    serde_json::json!({
        "id": issue.id,
        "short_id": issue.short_id,
        "project_path": issue.project_path,
        "title": issue.title,
        "description": issue.description,
        "details": issue.details,
        "status": issue.status.as_str(),
        "priority": issue.priority,
        "issue_type": issue.issue_type.as_str(),
        "parent_id": issue.parent_id,
        "plan_id": issue.plan_id,
        "labels": issue.labels,
        "assigned_to_agent": issue.assigned_to_agent,
        "created_at": issue.created_at,
        "updated_at": issue.updated_at,
        "closed_at": issue.closed_at,
    })
}

fn parse_dep_type(input: Option<&str>) -> crate::Result<DependencyType> {
    match input {
        None => Ok(DependencyType::Blocks),
        Some(raw) => DependencyType::parse(raw).ok_or_else(|| {
            Error::InvalidArgument(format!(
                "unknown dependency type '{raw}'; use blocks, related, parent-child, \
                 discovered-from, or duplicate-of"
            ))
        }),
    }
}

pub async fn create(server: &SaveContextServer, req: IssueCreateRequest) -> ToolOutput {
    if req.title.trim().is_empty() {
        return Err(Error::InvalidArgument("issue title must not be empty".to_string()));
    }

    let issue_type = req.issue_type.as_deref().map(parse_issue_type).transpose()?.unwrap_or_default();
    let priority = req
        .priority
        .as_deref()
        .map(parse_issue_priority)
        .transpose()?
        .unwrap_or(2);

    let (project_path, session_id) = server.resolve_project(req.project_path).await?;
    let agent_id = server.agent_id().await;
    let labels = req.labels.unwrap_or_default();

    let issue = {
        let mut storage = server.storage.lock().await;
        storage.get_or_create_project(&project_path, &agent_id)?;
        storage.create_issue(
            &project_path,
            &req.title,
            req.description.as_deref(),
            req.details.as_deref(),
            issue_type,
            priority,
            req.parent_id.as_deref(),
            req.plan_id.as_deref(),
            &labels,
            session_id.as_deref(),
            &agent_id,
        )?
    };

    Ok((
        issue_json(&issue),
        Some(format!("Created {} '{}'", issue.short_id, issue.title)),
    ))
}

pub async fn update(server: &SaveContextServer, req: IssueUpdateRequest) -> ToolOutput {
    let status = req.status.as_deref().map(parse_issue_status).transpose()?;
    let priority = req.priority.as_deref().map(parse_issue_priority).transpose()?;
    let issue_type = req.issue_type.as_deref().map(parse_issue_type).transpose()?;

    let agent_id = server.agent_id().await;

    let issue = {
        let mut storage = server.storage.lock().await;
        storage.update_issue(
            &req.issue_id,
            &req.issue_title,
            req.title.as_deref(),
            req.description.as_deref(),
            req.details.as_deref(),
            status,
            priority,
            issue_type,
            req.parent_id.as_deref(),
            req.plan_id.as_deref(),
            &agent_id,
        )?
    };

    Ok((issue_json(&issue), Some(format!("Updated {}", issue.short_id))))
}

pub async fn list(server: &SaveContextServer, req: IssueListRequest) -> ToolOutput {
    let all_projects = req.all_projects.unwrap_or(false);
    let project_path = if all_projects {
        String::new()
    } else {
        server.resolve_project(req.project_path).await?.0
    };

    let filters = IssueFilters {
        status: req.status.as_deref().map(parse_issue_status).transpose()?,
        include_closed: req.include_closed.unwrap_or(false),
        priority: req.priority.as_deref().map(parse_issue_priority).transpose()?,
        priority_min: req.priority_min,
        priority_max: req.priority_max,
        issue_type: req.issue_type.as_deref().map(parse_issue_type).transpose()?,
        labels_all: req.labels.unwrap_or_default(),
        labels_any: req.labels_any.unwrap_or_default(),
        parent_id: req.parent_id,
        plan_id: req.plan_id,
        has_subtasks: req.has_subtasks,
        has_deps: req.has_deps,
        all_projects,
        assigned_to: None,
    };

    let sort = match req.sort.as_deref() {
        None => IssueSort::Priority,
        Some(raw) => IssueSort::parse(raw).ok_or_else(|| {
            Error::InvalidArgument(format!(
                "unknown sort '{raw}'; use priority, createdAt, or updatedAt"
            ))
        })?,
    };

    let issues = {
        let storage = server.storage.lock().await;
        storage.list_issues(
            &project_path,
            &filters,
            sort,
            req.ascending.unwrap_or(false),
            req.limit,
        )?
    };

    Ok((
        serde_json::json!({
            "issues": issues.iter().map(issue_json).collect::<Vec<_>>(),
            "count": issues.len(),
        }),
        None,
    ))
}

pub async fn complete(server: &SaveContextServer, req: IssueCompleteRequest) -> ToolOutput {
    let agent_id = server.agent_id().await;
    let session_id = server.current_session_id().await;

    let (issue, unblocked, plan_completed) = {
        let mut storage = server.storage.lock().await;
        storage.complete_issue(&req.issue_id, session_id.as_deref(), &agent_id)?
    };

    let mut message = format!("Completed {}", issue.short_id);
    if !unblocked.is_empty() {
        message.push_str(&format!("; unblocked {}", unblocked.join(", ")));
    }
    if plan_completed.is_some() {
        message.push_str("; plan completed");
    }

    let mut data = issue_json(&issue);
    data["unblocked"] = serde_json::json!(unblocked);
    data["plan_completed"] = serde_json::json!(plan_completed);

    Ok((data, Some(message)))
}

pub async fn delete(server: &SaveContextServer, req: IssueDeleteRequest) -> ToolOutput {
    let agent_id = server.agent_id().await;
    {
        let mut storage = server.storage.lock().await;
        let issue = storage.require_issue(&req.issue_id)?;
        if issue.title != req.issue_title {
            return Err(Error::VerificationFailed {
                entity: "issue",
                expected: issue.title,
                provided: req.issue_title,
            });
        }
        storage.delete_issue(&req.issue_id, &agent_id)?;
    }

    Ok((
        serde_json::json!({ "deleted": req.issue_id }),
        Some("Issue deleted".to_string()),
    ))
}

pub async fn dependency_add(server: &SaveContextServer, req: IssueDependencyRequest) -> ToolOutput {
    let dep_type = parse_dep_type(req.dep_type.as_deref())?;
    let agent_id = server.agent_id().await;

    {
        let mut storage = server.storage.lock().await;
        storage.add_issue_dependency(&req.issue_id, &req.depends_on_id, dep_type, &agent_id)?;
    }

    Ok((
        serde_json::json!({
            "issue_id": req.issue_id,
            "depends_on_id": req.depends_on_id,
            "dep_type": dep_type.as_str(),
        }),
        Some("Dependency added".to_string()),
    ))
}

pub async fn dependency_remove(
    server: &SaveContextServer,
    req: IssueDependencyRequest,
) -> ToolOutput {
    let agent_id = server.agent_id().await;
    {
        let mut storage = server.storage.lock().await;
        storage.remove_issue_dependency(&req.issue_id, &req.depends_on_id, &agent_id)?;
    }

    Ok((
        serde_json::json!({
            "issue_id": req.issue_id,
            "depends_on_id": req.depends_on_id,
        }),
        Some("Dependency removed".to_string()),
    ))
}

pub async fn labels(server: &SaveContextServer, req: IssueLabelsRequest) -> ToolOutput {
    if req.labels.is_empty() {
        return Err(Error::InvalidArgument("labels must not be empty".to_string()));
    }

    let agent_id = server.agent_id().await;
    let mut storage = server.storage.lock().await;

    let labels = match req.action.to_lowercase().as_str() {
        "add" => storage.add_issue_labels(&req.issue_id, &req.labels, &agent_id)?,
        "remove" => storage.remove_issue_labels(&req.issue_id, &req.labels, &agent_id)?,
        other => {
            return Err(Error::InvalidArgument(format!(
                "unknown label action '{other}'; use add or remove"
            )))
        }
    };

    Ok((
        serde_json::json!({ "issue_id": req.issue_id, "labels": labels }),
        None,
    ))
}

pub async fn claim(server: &SaveContextServer, req: IssueClaimRequest) -> ToolOutput {
    let agent_id = server.agent_id().await;
    let issue = {
        let mut storage = server.storage.lock().await;
        storage.claim_issue(&req.issue_id, &agent_id)?
    };

    Ok((
        issue_json(&issue),
        Some(format!("Claimed {}", issue.short_id)),
    ))
}

pub async fn release(server: &SaveContextServer, req: IssueClaimRequest) -> ToolOutput {
    let agent_id = server.agent_id().await;
    let issue = {
        let mut storage = server.storage.lock().await;
        storage.release_issue(&req.issue_id, &agent_id)?
    };

    Ok((
        issue_json(&issue),
        Some(format!("Released {}", issue.short_id)),
    ))
}

pub async fn get_ready(server: &SaveContextServer, req: GetReadyRequest) -> ToolOutput {
    let (project_path, _) = server.resolve_project(req.project_path).await?;

    let issues = {
        let storage = server.storage.lock().await;
        storage.get_ready_issues(&project_path, req.limit.unwrap_or(10))?
    };

    Ok((
        serde_json::json!({
            "issues": issues.iter().map(issue_json).collect::<Vec<_>>(),
            "count": issues.len(),
        }),
        None,
    ))
}

pub async fn get_next_block(server: &SaveContextServer, req: GetNextBlockRequest) -> ToolOutput {
    let (project_path, _) = server.resolve_project(req.project_path).await?;
    let agent_id = server.agent_id().await;
    let count = req.count.unwrap_or(1).clamp(1, 20);

    let issues = {
        let mut storage = server.storage.lock().await;
        storage.get_next_issue_block(&project_path, count, &agent_id)?
    };

    let message = if issues.is_empty() {
        "No ready issues".to_string()
    } else {
        format!(
            "Claimed {}",
            issues
                .iter()
                .map(|i| i.short_id.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        )
    };

    Ok((
        serde_json::json!({
            "issues": issues.iter().map(issue_json).collect::<Vec<_>>(),
            "count": issues.len(),
        }),
        Some(message),
    ))
}

pub async fn create_batch(server: &SaveContextServer, req: IssueCreateBatchRequest) -> ToolOutput {
    if req.issues.is_empty() {
        return Err(Error::InvalidArgument("issues must not be empty".to_string()));
    }

    let (project_path, session_id) = server.resolve_project(req.project_path).await?;
    let agent_id = server.agent_id().await;

    let specs = req
        .issues
        .into_iter()
        .map(|input| {
            Ok(BatchIssueSpec {
                title: input.title,
                description: input.description,
                details: input.details,
                issue_type: input
                    .issue_type
                    .as_deref()
                    .map(parse_issue_type)
                    .transpose()?
                    .unwrap_or_default(),
                priority: input
                    .priority
                    .as_deref()
                    .map(parse_issue_priority)
                    .transpose()?
                    .unwrap_or(2),
                labels: input.labels.unwrap_or_default(),
                parent_id: input.parent_id,
                plan_id: input.plan_id,
            })
        })
        .collect::<crate::Result<Vec<_>>>()?;

    let deps = req
        .dependencies
        .unwrap_or_default()
        .into_iter()
        .map(|edge| {
            Ok(BatchDependency {
                from_index: edge.from_index,
                on_index: edge.on_index,
                dep_type: parse_dep_type(edge.dep_type.as_deref())?,
            })
        })
        .collect::<crate::Result<Vec<_>>>()?;

    let issues = {
        let mut storage = server.storage.lock().await;
        storage.get_or_create_project(&project_path, &agent_id)?;
        storage.create_issue_batch(&project_path, &specs, &deps, session_id.as_deref(), &agent_id)?
    };

    Ok((
        serde_json::json!({
            "issues": issues.iter().map(issue_json).collect::<Vec<_>>(),
            "count": issues.len(),
        }),
        Some(format!("Created {} issue(s)", issues.len())),
    ))
}
