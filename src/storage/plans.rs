//! Plan operations.
//!
//! Plan short-ids come from the per-project plan counter, allocated in
//! the inserting transaction like issue short-ids.

use crate::error::{Error, Result};
use crate::model::{Plan, PlanStatus};
use crate::storage::events::EventType;
use crate::storage::sqlite::SqliteStorage;
use rusqlite::{OptionalExtension, Row, Transaction};

fn map_plan_row(row: &Row<'_>) -> rusqlite::Result<Plan> {
    Ok(Plan {
        id: row.get(0)?,
        short_id: row.get(1)?,
        project_path: row.get(2)?,
        title: row.get(3)?,
        content: row.get(4)?,
        status: PlanStatus::parse(&row.get::<_, String>(5)?),
        success_criteria: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
        completed_at: row.get(9)?,
    })
}

const PLAN_COLUMNS: &str = "id, short_id, project_path, title, content, status, \
     success_criteria, created_at, updated_at, completed_at";

/// Allocate the next plan short-id for a project, bumping the counter.
fn allocate_plan_short_id(tx: &Transaction, project_path: &str) -> Result<String> {
    let n: Option<i64> = tx
        .query_row(
            "SELECT next_plan_number FROM projects WHERE project_path = ?1",
            [project_path],
            |row| row.get(0),
        )
        .optional()?;

    let n = n.ok_or_else(|| Error::ProjectNotFound {
        path: project_path.to_string(),
    })?;

    tx.execute(
        "UPDATE projects SET next_plan_number = next_plan_number + 1, updated_at = ?1
         WHERE project_path = ?2",
        rusqlite::params![crate::now_ms(), project_path],
    )?;

    Ok(format!("PLAN-{n}"))
}

impl SqliteStorage {
    // ======================
    // Plan Operations
    // ======================

    /// Create a plan, allocating its short-id in the same transaction.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when the project is not registered.
    pub fn create_plan(&mut self, plan: &Plan, actor: &str) -> Result<Plan> {
        self.mutate("create_plan", actor, |tx, ctx| {
            let short_id = allocate_plan_short_id(tx, &plan.project_path)?;

            tx.execute(
                "INSERT INTO plans (id, short_id, project_path, title, content, status,
                     success_criteria, created_at, updated_at, completed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                rusqlite::params![
                    plan.id,
                    short_id,
                    plan.project_path,
                    plan.title,
                    plan.content,
                    plan.status.as_str(),
                    plan.success_criteria,
                    plan.created_at,
                    plan.updated_at,
                    plan.completed_at,
                ],
            )?;

            ctx.record_event("plan", &plan.id, EventType::PlanCreated);
            Ok(())
        })?;

        self.require_plan(&plan.id)
    }

    /// Get a plan by id or short-id.
    pub fn get_plan(&self, id: &str) -> Result<Option<Plan>> {
        let sql = format!("SELECT {PLAN_COLUMNS} FROM plans WHERE id = ?1 OR short_id = ?1");
        let plan = self
            .conn()
            .prepare(&sql)?
            .query_row([id], map_plan_row)
            .optional()?;
        Ok(plan)
    }

    /// Get a plan, failing with `NotFound` on a miss.
    pub fn require_plan(&self, id: &str) -> Result<Plan> {
        self.get_plan(id)?
            .ok_or_else(|| Error::PlanNotFound { id: id.to_string() })
    }

    /// List plans for a project, optionally filtered by status.
    pub fn list_plans(
        &self,
        project_path: &str,
        status: Option<PlanStatus>,
        limit: usize,
    ) -> Result<Vec<Plan>> {
        let mut sql = format!("SELECT {PLAN_COLUMNS} FROM plans WHERE project_path = ?1");
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(project_path.to_string())];

        if let Some(st) = status {
            sql.push_str(" AND status = ?");
            params.push(Box::new(st.as_str().to_string()));
        }

        sql.push_str(" ORDER BY updated_at DESC LIMIT ?");
        params.push(Box::new(limit as i64));

        let mut stmt = self.conn().prepare(&sql)?;
        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
        let rows = stmt.query_map(param_refs.as_slice(), map_plan_row)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Error::from)
    }

    /// Update plan fields. Only fields passed as `Some` change.
    ///
    /// Changing `project_path` moves every linked issue to the new
    /// project in the same transaction. Moved issues keep their existing
    /// short-ids; only future allocations use the new project's counter.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for a missing plan or target project.
    #[allow(clippy::too_many_arguments)]
    pub fn update_plan(
        &mut self,
        id: &str,
        title: Option<&str>,
        content: Option<&str>,
        status: Option<PlanStatus>,
        success_criteria: Option<&str>,
        project_path: Option<&str>,
        actor: &str,
    ) -> Result<Plan> {
        let plan = self.require_plan(id)?;
        let now = crate::now_ms();

        if let Some(new_path) = project_path {
            if new_path != plan.project_path {
                self.require_project(new_path)?;
            }
        }

        self.mutate("update_plan", actor, |tx, ctx| {
            let mut set_clauses = vec!["updated_at = ?".to_string()];
            let mut params: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(now)];

            if let Some(t) = title {
                set_clauses.push("title = ?".to_string());
                params.push(Box::new(t.to_string()));
            }
            if let Some(c) = content {
                set_clauses.push("content = ?".to_string());
                params.push(Box::new(c.to_string()));
            }
            if let Some(st) = status {
                set_clauses.push("status = ?".to_string());
                params.push(Box::new(st.as_str().to_string()));
                if st == PlanStatus::Completed {
                    set_clauses.push("completed_at = ?".to_string());
                    params.push(Box::new(now));
                }
            }
            if let Some(sc) = success_criteria {
                set_clauses.push("success_criteria = ?".to_string());
                params.push(Box::new(sc.to_string()));
            }
            if let Some(path) = project_path {
                set_clauses.push("project_path = ?".to_string());
                params.push(Box::new(path.to_string()));
            }

            let sql = format!(
                "UPDATE plans SET {} WHERE id = ?{}",
                set_clauses.join(", "),
                params.len() + 1
            );
            params.push(Box::new(plan.id.clone()));

            let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
            tx.execute(&sql, param_refs.as_slice())?;

            // Cascade the project move to linked issues (short-ids kept)
            if let Some(new_path) = project_path {
                if new_path != plan.project_path {
                    tx.execute(
                        "UPDATE issues SET project_path = ?1, updated_at = ?2 WHERE plan_id = ?3",
                        rusqlite::params![new_path, now, plan.id],
                    )?;
                }
            }

            let event_type = if status == Some(PlanStatus::Completed) {
                EventType::PlanCompleted
            } else {
                EventType::PlanUpdated
            };
            ctx.record_event("plan", &plan.id, event_type);
            Ok(())
        })?;

        self.require_plan(&plan.id)
    }

    /// Issues linked to a plan.
    pub fn get_plan_issues(&self, plan_id: &str) -> Result<Vec<crate::model::Issue>> {
        let plan = self.require_plan(plan_id)?;
        let filters = crate::storage::IssueFilters {
            plan_id: Some(plan.id),
            include_closed: true,
            all_projects: true,
            ..crate::storage::IssueFilters::default()
        };
        self.list_issues("", &filters, crate::storage::IssueSort::Priority, false, Some(500))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{IssueType, Project};

    fn setup() -> SqliteStorage {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let project = Project::new("/p".to_string(), "SC Proj".to_string());
        storage.create_project(&project, "agent").unwrap();
        storage
    }

    #[test]
    fn test_plan_crud_and_short_ids() {
        let mut storage = setup();

        let first = storage
            .create_plan(&Plan::new("/p".to_string(), "Auth".to_string()), "agent")
            .unwrap();
        let second = storage
            .create_plan(&Plan::new("/p".to_string(), "Search".to_string()), "agent")
            .unwrap();

        assert_eq!(first.short_id, "PLAN-1");
        assert_eq!(second.short_id, "PLAN-2");

        let by_short = storage.get_plan("PLAN-2").unwrap().unwrap();
        assert_eq!(by_short.title, "Search");

        let listed = storage.list_plans("/p", None, 10).unwrap();
        assert_eq!(listed.len(), 2);

        let drafts = storage.list_plans("/p", Some(PlanStatus::Draft), 10).unwrap();
        assert_eq!(drafts.len(), 2);
    }

    #[test]
    fn test_update_plan_status_stamps_completion() {
        let mut storage = setup();
        let plan = storage
            .create_plan(&Plan::new("/p".to_string(), "T".to_string()), "agent")
            .unwrap();

        let updated = storage
            .update_plan(&plan.id, None, None, Some(PlanStatus::Completed), None, None, "agent")
            .unwrap();
        assert_eq!(updated.status, PlanStatus::Completed);
        assert!(updated.completed_at.is_some());
    }

    #[test]
    fn test_project_move_cascades_issues_keeps_short_ids() {
        let mut storage = setup();
        let other = Project::new("/q".to_string(), "Other".to_string());
        storage.create_project(&other, "agent").unwrap();

        let plan = storage
            .create_plan(&Plan::new("/p".to_string(), "Move me".to_string()), "agent")
            .unwrap();
        let issue = storage
            .create_issue(
                "/p",
                "Linked",
                None,
                None,
                IssueType::Task,
                2,
                None,
                Some(plan.id.as_str()),
                &[],
                None,
                "agent",
            )
            .unwrap();
        assert_eq!(issue.short_id, "SCPR-1");

        let moved = storage
            .update_plan(&plan.id, None, None, None, None, Some("/q"), "agent")
            .unwrap();
        assert_eq!(moved.project_path, "/q");

        let issue = storage.get_issue(&issue.id).unwrap().unwrap();
        assert_eq!(issue.project_path, "/q");
        // short-id survives the move
        assert_eq!(issue.short_id, "SCPR-1");
    }

    #[test]
    fn test_move_to_unregistered_project_rejected() {
        let mut storage = setup();
        let plan = storage
            .create_plan(&Plan::new("/p".to_string(), "T".to_string()), "agent")
            .unwrap();

        let err = storage
            .update_plan(&plan.id, None, None, None, None, Some("/nowhere"), "agent")
            .unwrap_err();
        assert!(matches!(err, Error::ProjectNotFound { .. }));
    }
}
