//! Plan tool handlers.

use super::ToolOutput;
use crate::error::Error;
use crate::model::{Plan, PlanStatus};
use crate::server::requests::{
    PlanCreateRequest, PlanGetRequest, PlanListRequest, PlanUpdateRequest,
};
use crate::server::SaveContextServer;

fn plan_json(plan: &Plan) -> serde_json::Value {
    serde_json::json!({
        "id": plan.id,
        "short_id": plan.short_id,
        "project_path": plan.project_path,
        "title": plan.title,
        "content": plan.content,
        "status": plan.status.as_str(),
        "success_criteria": plan.success_criteria,
        "created_at": plan.created_at,
        "updated_at": plan.updated_at,
        "completed_at": plan.completed_at,
    })
}

fn parse_plan_status(input: &str) -> crate::Result<PlanStatus> {
    match input.to_lowercase().as_str() {
        "draft" => Ok(PlanStatus::Draft),
        "active" => Ok(PlanStatus::Active),
        "completed" => Ok(PlanStatus::Completed),
        other => Err(Error::InvalidArgument(format!(
            "unknown plan status '{other}'; use draft, active, or completed"
        ))),
    }
}

pub async fn create(server: &SaveContextServer, req: PlanCreateRequest) -> ToolOutput {
    if req.title.trim().is_empty() {
        return Err(Error::InvalidArgument("plan title must not be empty".to_string()));
    }

    let status = req
        .status
        .as_deref()
        .map(parse_plan_status)
        .transpose()?
        .unwrap_or_default();

    let (project_path, _) = server.resolve_project(req.project_path).await?;
    let agent_id = server.agent_id().await;

    let mut plan = Plan::new(project_path.clone(), req.title);
    plan.status = status;
    if let Some(ref content) = req.content {
        plan = plan.with_content(content);
    }
    if let Some(ref criteria) = req.success_criteria {
        plan = plan.with_success_criteria(criteria);
    }

    let plan = {
        let mut storage = server.storage.lock().await;
        storage.get_or_create_project(&project_path, &agent_id)?;
        storage.create_plan(&plan, &agent_id)?
    };

    Ok((
        plan_json(&plan),
        Some(format!("Created plan {} '{}'", plan.short_id, plan.title)),
    ))
}

pub async fn get(server: &SaveContextServer, req: PlanGetRequest) -> ToolOutput {
    let (plan, issues) = {
        let storage = server.storage.lock().await;
        let plan = storage.require_plan(&req.plan_id)?;
        let issues = storage.get_plan_issues(&plan.id)?;
        (plan, issues)
    };

    let mut data = plan_json(&plan);
    data["issues"] = serde_json::json!(issues
        .iter()
        .map(|i| {
            serde_json::json!({
                "short_id": i.short_id,
                "title": i.title,
                "status": i.status.as_str(),
                "priority": i.priority,
            })
        })
        .collect::<Vec<_>>());

    Ok((data, None))
}

pub async fn list(server: &SaveContextServer, req: PlanListRequest) -> ToolOutput {
    let status = req.status.as_deref().map(parse_plan_status).transpose()?;
    let (project_path, _) = server.resolve_project(req.project_path).await?;

    let plans = {
        let storage = server.storage.lock().await;
        storage.list_plans(&project_path, status, req.limit.unwrap_or(20) as usize)?
    };

    Ok((
        serde_json::json!({
            "plans": plans.iter().map(plan_json).collect::<Vec<_>>(),
            "count": plans.len(),
        }),
        None,
    ))
}

pub async fn update(server: &SaveContextServer, req: PlanUpdateRequest) -> ToolOutput {
    let status = req.status.as_deref().map(parse_plan_status).transpose()?;
    let agent_id = server.agent_id().await;

    let project_path = req
        .project_path
        .as_deref()
        .map(crate::config::canonical_project_path);

    let plan = {
        let mut storage = server.storage.lock().await;
        storage.update_plan(
            &req.plan_id,
            req.title.as_deref(),
            req.content.as_deref(),
            status,
            req.success_criteria.as_deref(),
            project_path.as_deref(),
            &agent_id,
        )?
    };

    Ok((plan_json(&plan), Some(format!("Updated plan {}", plan.short_id))))
}
