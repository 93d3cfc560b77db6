//! Issue operations: CRUD, labels, dependency graph, ready queue,
//! completion cascade, and batch creation.
//!
//! Everything that reads-then-writes multi-row state (short-id
//! allocation, cycle checks, cascade unblocks, batch creation) runs
//! inside a single `mutate` transaction.

use crate::error::{Error, Result};
use crate::model::{DependencyType, Issue, IssueDependency, IssueStatus, IssueType};
use crate::storage::events::EventType;
use crate::storage::sqlite::SqliteStorage;
use crate::validate::find_similar_ids;
use rusqlite::{OptionalExtension, Row, Transaction};
use std::collections::HashSet;

/// Upper bound on nodes visited by the cycle-check DFS.
const CYCLE_DFS_LIMIT: usize = 10_000;

/// Filters for issue listings.
#[derive(Debug, Clone, Default)]
pub struct IssueFilters {
    /// Exact status; `None` defaults to "everything but closed".
    pub status: Option<IssueStatus>,
    /// Include closed issues when no exact status is given.
    pub include_closed: bool,
    pub priority: Option<i32>,
    pub priority_min: Option<i32>,
    pub priority_max: Option<i32>,
    pub issue_type: Option<IssueType>,
    /// Issue must carry every one of these labels.
    pub labels_all: Vec<String>,
    /// Issue must carry at least one of these labels.
    pub labels_any: Vec<String>,
    pub parent_id: Option<String>,
    pub plan_id: Option<String>,
    pub has_subtasks: Option<bool>,
    pub has_deps: Option<bool>,
    /// Ignore the project scope and list across all projects.
    pub all_projects: bool,
    pub assigned_to: Option<String>,
}

/// Sort key for issue listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IssueSort {
    #[default]
    Priority,
    CreatedAt,
    UpdatedAt,
}

impl IssueSort {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "priority" => Some(Self::Priority),
            "createdAt" | "created_at" => Some(Self::CreatedAt),
            "updatedAt" | "updated_at" => Some(Self::UpdatedAt),
            _ => None,
        }
    }
}

/// One issue in a batch-create request.
#[derive(Debug, Clone)]
pub struct BatchIssueSpec {
    pub title: String,
    pub description: Option<String>,
    pub details: Option<String>,
    pub issue_type: IssueType,
    pub priority: i32,
    pub labels: Vec<String>,
    /// Either an existing issue id/short-id, or `$N` referencing the
    /// Nth issue of this batch.
    pub parent_id: Option<String>,
    pub plan_id: Option<String>,
}

/// One dependency edge in a batch-create request, by array index.
#[derive(Debug, Clone, Copy)]
pub struct BatchDependency {
    pub from_index: usize,
    pub on_index: usize,
    pub dep_type: DependencyType,
}

const ISSUE_COLUMNS: &str = "id, short_id, project_path, title, description, details, status, \
     priority, issue_type, parent_id, plan_id, created_by_agent, closed_by_agent, \
     created_in_session, closed_in_session, assigned_to_agent, created_at, updated_at, closed_at";

fn map_issue_row(row: &Row<'_>) -> rusqlite::Result<Issue> {
    Ok(Issue {
        id: row.get(0)?,
        short_id: row.get(1)?,
        project_path: row.get(2)?,
        title: row.get(3)?,
        description: row.get(4)?,
        details: row.get(5)?,
        status: IssueStatus::parse(&row.get::<_, String>(6)?).unwrap_or(IssueStatus::Open),
        priority: row.get(7)?,
        issue_type: IssueType::parse(&row.get::<_, String>(8)?).unwrap_or_default(),
        parent_id: row.get(9)?,
        plan_id: row.get(10)?,
        created_by_agent: row.get(11)?,
        closed_by_agent: row.get(12)?,
        created_in_session: row.get(13)?,
        closed_in_session: row.get(14)?,
        assigned_to_agent: row.get(15)?,
        labels: Vec::new(),
        created_at: row.get(16)?,
        updated_at: row.get(17)?,
        closed_at: row.get(18)?,
    })
}

/// Resolve an id or short-id to the full issue id, inside a transaction.
pub(crate) fn resolve_issue_id(tx: &Transaction, id: &str) -> Result<String> {
    tx.query_row(
        "SELECT id FROM issues WHERE id = ?1 OR short_id = ?1",
        [id],
        |row| row.get(0),
    )
    .optional()?
    .ok_or_else(|| Error::IssueNotFound { id: id.to_string() })
}

/// Allocate the next issue short-id for a project, bumping the counter.
///
/// Runs inside the inserting transaction so concurrent creates serialize
/// on the project row.
fn allocate_issue_short_id(tx: &Transaction, project_path: &str) -> Result<String> {
    let row: Option<(String, i64)> = tx
        .query_row(
            "SELECT issue_prefix, next_issue_number FROM projects WHERE project_path = ?1",
            [project_path],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    let (prefix, n) = row.ok_or_else(|| Error::ProjectNotFound {
        path: project_path.to_string(),
    })?;

    tx.execute(
        "UPDATE projects SET next_issue_number = next_issue_number + 1, updated_at = ?1
         WHERE project_path = ?2",
        rusqlite::params![crate::now_ms(), project_path],
    )?;

    Ok(format!("{prefix}-{n}"))
}

/// DFS over outbound `blocks` edges starting at `start`. Returns true
/// when `needle` is reachable.
fn blocks_reaches(tx: &Transaction, start: &str, needle: &str) -> Result<bool> {
    let mut stack = vec![start.to_string()];
    let mut visited: HashSet<String> = HashSet::new();

    while let Some(current) = stack.pop() {
        if current == needle {
            return Ok(true);
        }
        if !visited.insert(current.clone()) {
            continue;
        }
        if visited.len() > CYCLE_DFS_LIMIT {
            // Graph larger than any sane issue tracker; treat as cyclic
            // rather than walking forever.
            return Ok(true);
        }

        let next: Vec<String> = tx
            .prepare(
                "SELECT depends_on_id FROM issue_dependencies
                 WHERE issue_id = ?1 AND dependency_type = 'blocks'",
            )?
            .query_map([&current], |row| row.get(0))?
            .collect::<rusqlite::Result<_>>()?;
        stack.extend(next);
    }

    Ok(false)
}

/// Count still-open `blocks` blockers of an issue.
fn open_blocker_count(tx: &Transaction, issue_id: &str) -> Result<i64> {
    let count = tx.query_row(
        "SELECT COUNT(*) FROM issue_dependencies d
         JOIN issues b ON b.id = d.depends_on_id
         WHERE d.issue_id = ?1 AND d.dependency_type = 'blocks' AND b.status != 'closed'",
        [issue_id],
        |row| row.get(0),
    )?;
    Ok(count)
}

impl SqliteStorage {
    // ================
    // Issue Operations
    // ================

    /// Create a new issue, allocating its short-id from the project
    /// counter inside the same transaction.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when the project is not registered.
    #[allow(clippy::too_many_arguments)]
    pub fn create_issue(
        &mut self,
        project_path: &str,
        title: &str,
        description: Option<&str>,
        details: Option<&str>,
        issue_type: IssueType,
        priority: i32,
        parent_id: Option<&str>,
        plan_id: Option<&str>,
        labels: &[String],
        session_id: Option<&str>,
        actor: &str,
    ) -> Result<Issue> {
        let id = crate::new_id("issue");
        let now = crate::now_ms();

        self.mutate("create_issue", actor, |tx, ctx| {
            let short_id = allocate_issue_short_id(tx, project_path)?;

            let parent_full_id = match parent_id {
                Some(p) => Some(resolve_issue_id(tx, p)?),
                None => None,
            };

            tx.execute(
                "INSERT INTO issues (id, short_id, project_path, title, description, details, status,
                     priority, issue_type, parent_id, plan_id, created_by_agent, created_in_session,
                     created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'open', ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?13)",
                rusqlite::params![
                    id,
                    short_id,
                    project_path,
                    title,
                    description,
                    details,
                    priority,
                    issue_type.as_str(),
                    parent_full_id,
                    plan_id,
                    ctx.actor,
                    session_id,
                    now,
                ],
            )?;

            for label in labels {
                tx.execute(
                    "INSERT OR IGNORE INTO issue_labels (id, issue_id, label) VALUES (?1, ?2, ?3)",
                    rusqlite::params![crate::new_id("label"), id, label],
                )?;
            }

            ctx.record_event("issue", &id, EventType::IssueCreated);
            Ok(())
        })?;

        self.require_issue(&id)
    }

    /// Get an issue by ID (full ID or short ID), labels included.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_issue(&self, id: &str) -> Result<Option<Issue>> {
        let sql = format!("SELECT {ISSUE_COLUMNS} FROM issues WHERE id = ?1 OR short_id = ?1");
        let issue = self
            .conn()
            .prepare(&sql)?
            .query_row([id], map_issue_row)
            .optional()?;

        match issue {
            Some(mut issue) => {
                issue.labels = self.get_issue_labels(&issue.id)?;
                Ok(Some(issue))
            }
            None => Ok(None),
        }
    }

    /// Get an issue, enriching a miss with similar short-id suggestions.
    pub fn require_issue(&self, id: &str) -> Result<Issue> {
        if let Some(issue) = self.get_issue(id)? {
            return Ok(issue);
        }
        let existing: Vec<String> = self
            .conn()
            .prepare("SELECT short_id FROM issues")?
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<_>>()?;
        let similar = find_similar_ids(id, &existing, 3);
        if similar.is_empty() {
            Err(Error::IssueNotFound { id: id.to_string() })
        } else {
            Err(Error::IssueNotFoundSimilar { id: id.to_string(), similar })
        }
    }

    /// Labels attached to an issue.
    pub fn get_issue_labels(&self, issue_id: &str) -> Result<Vec<String>> {
        let labels = self
            .conn()
            .prepare("SELECT label FROM issue_labels WHERE issue_id = ?1 ORDER BY label")?
            .query_map([issue_id], |row| row.get(0))?
            .collect::<rusqlite::Result<_>>()?;
        Ok(labels)
    }

    /// List issues with rich filters and sorting.
    ///
    /// `project_path` scopes the listing unless `filters.all_projects`
    /// is set. Multi-project issues are matched through `issue_projects`
    /// as well as their primary path.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_issues(
        &self,
        project_path: &str,
        filters: &IssueFilters,
        sort: IssueSort,
        ascending: bool,
        limit: Option<u32>,
    ) -> Result<Vec<Issue>> {
        let limit = limit.unwrap_or(50);

        let mut sql = "SELECT DISTINCT \
             i.id, i.short_id, i.project_path, i.title, i.description, i.details, i.status, \
             i.priority, i.issue_type, i.parent_id, i.plan_id, i.created_by_agent, \
             i.closed_by_agent, i.created_in_session, i.closed_in_session, i.assigned_to_agent, \
             i.created_at, i.updated_at, i.closed_at FROM issues i"
            .to_string();
        let mut conditions: Vec<String> = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if !filters.all_projects {
            conditions.push(
                "(i.project_path = ? OR EXISTS (
                    SELECT 1 FROM issue_projects ip
                    WHERE ip.issue_id = i.id AND ip.project_path = ?))"
                    .to_string(),
            );
            params.push(Box::new(project_path.to_string()));
            params.push(Box::new(project_path.to_string()));
        }

        if let Some(status) = filters.status {
            conditions.push("i.status = ?".to_string());
            params.push(Box::new(status.as_str().to_string()));
        } else if !filters.include_closed {
            conditions.push("i.status != 'closed'".to_string());
        }

        if let Some(p) = filters.priority {
            conditions.push("i.priority = ?".to_string());
            params.push(Box::new(p));
        }
        if let Some(p) = filters.priority_min {
            conditions.push("i.priority >= ?".to_string());
            params.push(Box::new(p));
        }
        if let Some(p) = filters.priority_max {
            conditions.push("i.priority <= ?".to_string());
            params.push(Box::new(p));
        }

        if let Some(t) = filters.issue_type {
            conditions.push("i.issue_type = ?".to_string());
            params.push(Box::new(t.as_str().to_string()));
        }

        if let Some(ref parent) = filters.parent_id {
            conditions.push(
                "i.parent_id = (SELECT id FROM issues WHERE id = ? OR short_id = ?)".to_string(),
            );
            params.push(Box::new(parent.clone()));
            params.push(Box::new(parent.clone()));
        }

        if let Some(ref plan) = filters.plan_id {
            conditions.push("i.plan_id = ?".to_string());
            params.push(Box::new(plan.clone()));
        }

        if let Some(ref assigned) = filters.assigned_to {
            conditions.push("i.assigned_to_agent = ?".to_string());
            params.push(Box::new(assigned.clone()));
        }

        for label in &filters.labels_all {
            conditions.push(
                "EXISTS (SELECT 1 FROM issue_labels il WHERE il.issue_id = i.id AND il.label = ?)"
                    .to_string(),
            );
            params.push(Box::new(label.clone()));
        }

        if !filters.labels_any.is_empty() {
            let placeholders = vec!["?"; filters.labels_any.len()].join(", ");
            conditions.push(format!(
                "EXISTS (SELECT 1 FROM issue_labels il WHERE il.issue_id = i.id AND il.label IN ({placeholders}))"
            ));
            for label in &filters.labels_any {
                params.push(Box::new(label.clone()));
            }
        }

        if let Some(has_subtasks) = filters.has_subtasks {
            let clause = "EXISTS (SELECT 1 FROM issues c WHERE c.parent_id = i.id)";
            conditions.push(if has_subtasks {
                clause.to_string()
            } else {
                format!("NOT {clause}")
            });
        }

        if let Some(has_deps) = filters.has_deps {
            let clause = "EXISTS (SELECT 1 FROM issue_dependencies d WHERE d.issue_id = i.id)";
            conditions.push(if has_deps {
                clause.to_string()
            } else {
                format!("NOT {clause}")
            });
        }

        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }

        let direction = if ascending { "ASC" } else { "DESC" };
        let order = match sort {
            IssueSort::Priority => format!("i.priority {direction}, i.created_at ASC"),
            IssueSort::CreatedAt => format!("i.created_at {direction}"),
            IssueSort::UpdatedAt => format!("i.updated_at {direction}"),
        };
        sql.push_str(&format!(" ORDER BY {order} LIMIT ?"));
        params.push(Box::new(limit));

        let mut stmt = self.conn().prepare(&sql)?;
        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
        let rows = stmt.query_map(param_refs.as_slice(), map_issue_row)?;

        let mut issues: Vec<Issue> =
            rows.collect::<std::result::Result<Vec<_>, _>>()?;
        for issue in &mut issues {
            issue.labels = self.get_issue_labels(&issue.id)?;
        }
        Ok(issues)
    }

    /// Update issue fields after verifying the caller knows the title.
    ///
    /// Only fields passed as `Some` are touched.
    ///
    /// # Errors
    ///
    /// Returns `Validation` on title mismatch.
    #[allow(clippy::too_many_arguments)]
    pub fn update_issue(
        &mut self,
        id: &str,
        expected_title: &str,
        title: Option<&str>,
        description: Option<&str>,
        details: Option<&str>,
        status: Option<IssueStatus>,
        priority: Option<i32>,
        issue_type: Option<IssueType>,
        parent_id: Option<&str>,
        plan_id: Option<&str>,
        actor: &str,
    ) -> Result<Issue> {
        let issue = self.require_issue(id)?;
        if issue.title != expected_title {
            return Err(Error::VerificationFailed {
                entity: "issue",
                expected: issue.title,
                provided: expected_title.to_string(),
            });
        }

        let full_id = issue.id.clone();
        let now = crate::now_ms();

        self.mutate("update_issue", actor, |tx, ctx| {
            let mut set_clauses = vec!["updated_at = ?".to_string()];
            let mut params: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(now)];

            if let Some(t) = title {
                set_clauses.push("title = ?".to_string());
                params.push(Box::new(t.to_string()));
            }
            if let Some(d) = description {
                set_clauses.push("description = ?".to_string());
                params.push(Box::new(d.to_string()));
            }
            if let Some(dt) = details {
                set_clauses.push("details = ?".to_string());
                params.push(Box::new(dt.to_string()));
            }
            if let Some(st) = status {
                set_clauses.push("status = ?".to_string());
                params.push(Box::new(st.as_str().to_string()));
                if st == IssueStatus::Closed {
                    set_clauses.push("closed_at = ?".to_string());
                    params.push(Box::new(now));
                    set_clauses.push("closed_by_agent = ?".to_string());
                    params.push(Box::new(ctx.actor.clone()));
                }
            }
            if let Some(p) = priority {
                set_clauses.push("priority = ?".to_string());
                params.push(Box::new(p));
            }
            if let Some(it) = issue_type {
                set_clauses.push("issue_type = ?".to_string());
                params.push(Box::new(it.as_str().to_string()));
            }
            if let Some(pid) = plan_id {
                set_clauses.push("plan_id = ?".to_string());
                if pid.is_empty() {
                    params.push(Box::new(None::<String>));
                } else {
                    params.push(Box::new(pid.to_string()));
                }
            }
            if let Some(parent) = parent_id {
                set_clauses.push("parent_id = ?".to_string());
                if parent.is_empty() {
                    params.push(Box::new(None::<String>));
                } else {
                    params.push(Box::new(resolve_issue_id(tx, parent)?));
                }
            }

            let sql = format!(
                "UPDATE issues SET {} WHERE id = ?{}",
                set_clauses.join(", "),
                params.len() + 1
            );
            params.push(Box::new(full_id.clone()));

            let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
            tx.execute(&sql, param_refs.as_slice())?;

            ctx.record_event("issue", &full_id, EventType::IssueUpdated);
            Ok(())
        })?;

        self.require_issue(&full_id)
    }

    /// Complete an issue: close it, unblock dependents whose only open
    /// `blocks` blocker this was, and auto-complete the plan when this
    /// closed its last open issue (sub-issues included).
    ///
    /// The whole cascade runs in one transaction.
    ///
    /// Returns `(issue, unblocked_short_ids, plan_completed)`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for a missing id.
    pub fn complete_issue(
        &mut self,
        id: &str,
        session_id: Option<&str>,
        actor: &str,
    ) -> Result<(Issue, Vec<String>, Option<String>)> {
        let issue = self.require_issue(id)?;
        let full_id = issue.id.clone();
        let now = crate::now_ms();

        let (unblocked, plan_completed) =
            self.mutate("complete_issue", actor, |tx, ctx| {
                tx.execute(
                    "UPDATE issues SET status = 'closed', closed_at = ?1, closed_by_agent = ?2,
                         closed_in_session = ?3, updated_at = ?1
                     WHERE id = ?4",
                    rusqlite::params![now, ctx.actor, session_id, full_id],
                )?;
                ctx.record_event("issue", &full_id, EventType::IssueClosed);

                // Cascade: dependents blocked only by this issue open up
                let dependents: Vec<String> = tx
                    .prepare(
                        "SELECT issue_id FROM issue_dependencies
                         WHERE depends_on_id = ?1 AND dependency_type = 'blocks'",
                    )?
                    .query_map([&full_id], |row| row.get(0))?
                    .collect::<rusqlite::Result<_>>()?;

                let mut unblocked = Vec::new();
                for dependent in dependents {
                    let status: String = tx.query_row(
                        "SELECT status FROM issues WHERE id = ?1",
                        [&dependent],
                        |row| row.get(0),
                    )?;
                    if status != "blocked" {
                        continue;
                    }
                    if open_blocker_count(tx, &dependent)? == 0 {
                        tx.execute(
                            "UPDATE issues SET status = 'open', updated_at = ?1 WHERE id = ?2",
                            rusqlite::params![now, dependent],
                        )?;
                        let short: String = tx.query_row(
                            "SELECT short_id FROM issues WHERE id = ?1",
                            [&dependent],
                            |row| row.get(0),
                        )?;
                        ctx.record_event("issue", &dependent, EventType::IssueUpdated);
                        unblocked.push(short);
                    }
                }

                // Plan auto-complete: last open issue under the plan,
                // counting sub-issues of plan-linked issues.
                let mut plan_completed = None;
                if let Some(ref plan_id) = issue.plan_id {
                    let open_count: i64 = tx.query_row(
                        "WITH RECURSIVE plan_issues(iid) AS (
                             SELECT id FROM issues WHERE plan_id = ?1
                             UNION
                             SELECT i.id FROM issues i JOIN plan_issues p ON i.parent_id = p.iid
                         )
                         SELECT COUNT(*) FROM issues
                         WHERE id IN (SELECT iid FROM plan_issues) AND status != 'closed'",
                        [plan_id],
                        |row| row.get(0),
                    )?;

                    if open_count == 0 {
                        let changed = tx.execute(
                            "UPDATE plans SET status = 'completed', completed_at = ?1, updated_at = ?1
                             WHERE id = ?2 AND status != 'completed'",
                            rusqlite::params![now, plan_id],
                        )?;
                        if changed > 0 {
                            ctx.record_event("plan", plan_id, EventType::PlanCompleted);
                            plan_completed = Some(plan_id.clone());
                        }
                    }
                }

                Ok((unblocked, plan_completed))
            })?;

        Ok((self.require_issue(&full_id)?, unblocked, plan_completed))
    }

    /// Delete an issue; dependency edges and labels cascade.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for a missing id.
    pub fn delete_issue(&mut self, id: &str, actor: &str) -> Result<()> {
        let issue = self.require_issue(id)?;
        self.mutate("delete_issue", actor, |tx, ctx| {
            tx.execute("DELETE FROM issues WHERE id = ?1", [&issue.id])?;
            ctx.record_event("issue", &issue.id, EventType::IssueDeleted);
            Ok(())
        })
    }

    // ── Dependencies ─────────────────────────────────────────

    /// Add a dependency between issues.
    ///
    /// `blocks` edges are cycle-checked: a bounded DFS from `depends_on`
    /// over outbound `blocks` edges must not reach `issue`.
    ///
    /// # Errors
    ///
    /// Returns `Integrity` when the edge would close a cycle.
    pub fn add_issue_dependency(
        &mut self,
        issue_id: &str,
        depends_on_id: &str,
        dep_type: DependencyType,
        actor: &str,
    ) -> Result<()> {
        self.mutate("add_issue_dependency", actor, |tx, ctx| {
            let full_issue_id = resolve_issue_id(tx, issue_id)?;
            let full_depends_on_id = resolve_issue_id(tx, depends_on_id)?;

            if full_issue_id == full_depends_on_id {
                return Err(Error::CycleDetected {
                    from: issue_id.to_string(),
                    to: depends_on_id.to_string(),
                });
            }

            if dep_type == DependencyType::Blocks
                && blocks_reaches(tx, &full_depends_on_id, &full_issue_id)?
            {
                return Err(Error::CycleDetected {
                    from: issue_id.to_string(),
                    to: depends_on_id.to_string(),
                });
            }

            tx.execute(
                "INSERT OR IGNORE INTO issue_dependencies (id, issue_id, depends_on_id, dependency_type, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    crate::new_id("dep"),
                    full_issue_id,
                    full_depends_on_id,
                    dep_type.as_str(),
                    crate::now_ms(),
                ],
            )?;

            ctx.record_event("issue", &full_issue_id, EventType::IssueUpdated);
            Ok(())
        })
    }

    /// Remove a dependency between issues.
    pub fn remove_issue_dependency(
        &mut self,
        issue_id: &str,
        depends_on_id: &str,
        actor: &str,
    ) -> Result<()> {
        self.mutate("remove_issue_dependency", actor, |tx, ctx| {
            let full_issue_id = resolve_issue_id(tx, issue_id)?;
            let full_depends_on_id = resolve_issue_id(tx, depends_on_id)?;

            tx.execute(
                "DELETE FROM issue_dependencies WHERE issue_id = ?1 AND depends_on_id = ?2",
                rusqlite::params![full_issue_id, full_depends_on_id],
            )?;

            ctx.record_event("issue", &full_issue_id, EventType::IssueUpdated);
            Ok(())
        })
    }

    /// List dependency edges for an issue (outbound).
    pub fn get_issue_dependencies(&self, issue_id: &str) -> Result<Vec<IssueDependency>> {
        let issue = self.require_issue(issue_id)?;
        let deps = self
            .conn()
            .prepare(
                "SELECT issue_id, depends_on_id, dependency_type, created_at
                 FROM issue_dependencies WHERE issue_id = ?1",
            )?
            .query_map([&issue.id], |row| {
                Ok(IssueDependency {
                    issue_id: row.get(0)?,
                    depends_on_id: row.get(1)?,
                    dep_type: DependencyType::parse(&row.get::<_, String>(2)?)
                        .unwrap_or(DependencyType::Related),
                    created_at: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<_>>()?;
        Ok(deps)
    }

    // ── Labels ───────────────────────────────────────────────

    /// Add labels to an issue. Returns the full label set.
    pub fn add_issue_labels(&mut self, id: &str, labels: &[String], actor: &str) -> Result<Vec<String>> {
        let issue = self.require_issue(id)?;
        self.mutate("add_issue_labels", actor, |tx, ctx| {
            for label in labels {
                tx.execute(
                    "INSERT OR IGNORE INTO issue_labels (id, issue_id, label) VALUES (?1, ?2, ?3)",
                    rusqlite::params![crate::new_id("label"), issue.id, label],
                )?;
            }
            ctx.record_event("issue", &issue.id, EventType::IssueUpdated);
            Ok(())
        })?;
        self.get_issue_labels(&issue.id)
    }

    /// Remove labels from an issue. Returns the full label set.
    pub fn remove_issue_labels(
        &mut self,
        id: &str,
        labels: &[String],
        actor: &str,
    ) -> Result<Vec<String>> {
        let issue = self.require_issue(id)?;
        self.mutate("remove_issue_labels", actor, |tx, ctx| {
            for label in labels {
                tx.execute(
                    "DELETE FROM issue_labels WHERE issue_id = ?1 AND label = ?2",
                    rusqlite::params![issue.id, label],
                )?;
            }
            ctx.record_event("issue", &issue.id, EventType::IssueUpdated);
            Ok(())
        })?;
        self.get_issue_labels(&issue.id)
    }

    // ── Claiming and the ready queue ─────────────────────────

    /// Claim an issue for an agent (assign + in_progress).
    pub fn claim_issue(&mut self, id: &str, actor: &str) -> Result<Issue> {
        let issue = self.require_issue(id)?;
        let now = crate::now_ms();
        self.mutate("claim_issue", actor, |tx, ctx| {
            tx.execute(
                "UPDATE issues SET assigned_to_agent = ?1, assigned_at = ?2,
                     status = 'in_progress', updated_at = ?2
                 WHERE id = ?3",
                rusqlite::params![ctx.actor, now, issue.id],
            )?;
            ctx.record_event("issue", &issue.id, EventType::IssueClaimed);
            Ok(())
        })?;
        self.require_issue(&issue.id)
    }

    /// Release an issue (unassign + open).
    pub fn release_issue(&mut self, id: &str, actor: &str) -> Result<Issue> {
        let issue = self.require_issue(id)?;
        let now = crate::now_ms();
        self.mutate("release_issue", actor, |tx, ctx| {
            tx.execute(
                "UPDATE issues SET assigned_to_agent = NULL, assigned_at = NULL,
                     status = 'open', updated_at = ?1
                 WHERE id = ?2",
                rusqlite::params![now, issue.id],
            )?;
            ctx.record_event("issue", &issue.id, EventType::IssueReleased);
            Ok(())
        })?;
        self.require_issue(&issue.id)
    }

    /// Issues ready to work on: open, unassigned, no open `blocks`
    /// blockers, priority-ordered.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_ready_issues(&self, project_path: &str, limit: u32) -> Result<Vec<Issue>> {
        let sql = format!(
            "SELECT {ISSUE_COLUMNS} FROM issues
             WHERE project_path = ?1
               AND status = 'open'
               AND assigned_to_agent IS NULL
               AND NOT EXISTS (
                   SELECT 1 FROM issue_dependencies d
                   JOIN issues dep ON dep.id = d.depends_on_id
                   WHERE d.issue_id = issues.id
                     AND d.dependency_type = 'blocks'
                     AND dep.status != 'closed'
               )
             ORDER BY priority DESC, created_at ASC
             LIMIT ?2"
        );

        let mut stmt = self.conn().prepare(&sql)?;
        let mut issues: Vec<Issue> = stmt
            .query_map(rusqlite::params![project_path, limit], map_issue_row)?
            .collect::<rusqlite::Result<_>>()?;
        for issue in &mut issues {
            issue.labels = self.get_issue_labels(&issue.id)?;
        }
        Ok(issues)
    }

    /// Atomically take the next block of ready issues: select + claim in
    /// one transaction, so concurrent agents never claim the same issue.
    ///
    /// # Errors
    ///
    /// Returns an error if the operation fails.
    pub fn get_next_issue_block(
        &mut self,
        project_path: &str,
        count: u32,
        actor: &str,
    ) -> Result<Vec<Issue>> {
        let now = crate::now_ms();
        let ids = self.mutate("get_next_issue_block", actor, |tx, ctx| {
            let ids: Vec<String> = tx
                .prepare(
                    "SELECT id FROM issues
                     WHERE project_path = ?1
                       AND status = 'open'
                       AND assigned_to_agent IS NULL
                       AND NOT EXISTS (
                           SELECT 1 FROM issue_dependencies d
                           JOIN issues dep ON dep.id = d.depends_on_id
                           WHERE d.issue_id = issues.id
                             AND d.dependency_type = 'blocks'
                             AND dep.status != 'closed'
                       )
                     ORDER BY priority DESC, created_at ASC
                     LIMIT ?2",
                )?
                .query_map(rusqlite::params![project_path, count], |row| row.get(0))?
                .collect::<rusqlite::Result<_>>()?;

            for id in &ids {
                tx.execute(
                    "UPDATE issues SET assigned_to_agent = ?1, assigned_at = ?2,
                         status = 'in_progress', updated_at = ?2
                     WHERE id = ?3",
                    rusqlite::params![ctx.actor, now, id],
                )?;
                ctx.record_event("issue", id, EventType::IssueClaimed);
            }
            Ok(ids)
        })?;

        ids.iter().map(|id| self.require_issue(id)).collect()
    }

    // ── Batch creation ───────────────────────────────────────

    /// Create a batch of issues with dependency edges, all-or-nothing.
    ///
    /// Short-ids are allocated in order within the transaction. Parent
    /// references of the form `$N` resolve to the Nth created issue.
    /// Dependency edges are cycle-checked over the combined graph; any
    /// failure rolls back the whole batch.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for a bad `$N` reference, `Integrity` for a
    /// cycle.
    pub fn create_issue_batch(
        &mut self,
        project_path: &str,
        specs: &[BatchIssueSpec],
        deps: &[BatchDependency],
        session_id: Option<&str>,
        actor: &str,
    ) -> Result<Vec<Issue>> {
        let now = crate::now_ms();
        let ids: Vec<String> = specs.iter().map(|_| crate::new_id("issue")).collect();

        self.mutate("create_issue_batch", actor, |tx, ctx| {
            for (i, spec) in specs.iter().enumerate() {
                let short_id = allocate_issue_short_id(tx, project_path)?;

                let parent_full_id: Option<String> = match spec.parent_id.as_deref() {
                    Some(p) if p.starts_with('$') => {
                        let n: usize = p[1..].parse().map_err(|_| {
                            Error::InvalidArgument(format!("bad batch parent reference: {p}"))
                        })?;
                        let referenced = ids.get(n).ok_or_else(|| {
                            Error::InvalidArgument(format!(
                                "batch parent reference {p} out of range (batch has {} issues)",
                                specs.len()
                            ))
                        })?;
                        if n >= i {
                            return Err(Error::InvalidArgument(format!(
                                "batch parent reference {p} must point to an earlier issue"
                            )));
                        }
                        Some(referenced.clone())
                    }
                    Some(p) => Some(resolve_issue_id(tx, p)?),
                    None => None,
                };

                tx.execute(
                    "INSERT INTO issues (id, short_id, project_path, title, description, details,
                         status, priority, issue_type, parent_id, plan_id, created_by_agent,
                         created_in_session, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'open', ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?13)",
                    rusqlite::params![
                        ids[i],
                        short_id,
                        project_path,
                        spec.title,
                        spec.description,
                        spec.details,
                        spec.priority,
                        spec.issue_type.as_str(),
                        parent_full_id,
                        spec.plan_id,
                        ctx.actor,
                        session_id,
                        now,
                    ],
                )?;

                for label in &spec.labels {
                    tx.execute(
                        "INSERT OR IGNORE INTO issue_labels (id, issue_id, label) VALUES (?1, ?2, ?3)",
                        rusqlite::params![crate::new_id("label"), ids[i], label],
                    )?;
                }

                ctx.record_event("issue", &ids[i], EventType::IssueCreated);
            }

            for edge in deps {
                let from = ids.get(edge.from_index).ok_or_else(|| {
                    Error::InvalidArgument(format!(
                        "dependency index {} out of range",
                        edge.from_index
                    ))
                })?;
                let on = ids.get(edge.on_index).ok_or_else(|| {
                    Error::InvalidArgument(format!("dependency index {} out of range", edge.on_index))
                })?;

                if edge.dep_type == DependencyType::Blocks && blocks_reaches(tx, on, from)? {
                    return Err(Error::CycleDetected {
                        from: from.clone(),
                        to: on.clone(),
                    });
                }

                tx.execute(
                    "INSERT OR IGNORE INTO issue_dependencies (id, issue_id, depends_on_id, dependency_type, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    rusqlite::params![crate::new_id("dep"), from, on, edge.dep_type.as_str(), now],
                )?;
            }

            Ok(())
        })?;

        ids.iter().map(|id| self.require_issue(id)).collect()
    }

    /// Attach an issue to an additional project.
    pub fn add_issue_project(&mut self, id: &str, project_path: &str, actor: &str) -> Result<()> {
        let issue = self.require_issue(id)?;
        self.mutate("add_issue_project", actor, |tx, ctx| {
            tx.execute(
                "INSERT OR IGNORE INTO issue_projects (issue_id, project_path, added_at)
                 VALUES (?1, ?2, ?3)",
                rusqlite::params![issue.id, project_path, crate::now_ms()],
            )?;
            ctx.record_event("issue", &issue.id, EventType::IssueUpdated);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Project;

    fn open_with_project(path: &str, name: &str) -> SqliteStorage {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let project = Project::new(path.to_string(), name.to_string());
        storage.create_project(&project, "test-agent").unwrap();
        storage
    }

    fn quick_issue(storage: &mut SqliteStorage, path: &str, title: &str, priority: i32) -> Issue {
        storage
            .create_issue(
                path,
                title,
                None,
                None,
                IssueType::Task,
                priority,
                None,
                None,
                &[],
                None,
                "test-agent",
            )
            .unwrap()
    }

    #[test]
    fn test_short_id_allocation_sequence() {
        let mut storage = open_with_project("/p", "Save Context");

        let a = quick_issue(&mut storage, "/p", "A", 2);
        let b = quick_issue(&mut storage, "/p", "B", 2);

        assert_eq!(a.short_id, "SAVE-1");
        assert_eq!(b.short_id, "SAVE-2");
    }

    #[test]
    fn test_create_issue_requires_project() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let err = storage
            .create_issue(
                "/nowhere",
                "T",
                None,
                None,
                IssueType::Task,
                2,
                None,
                None,
                &[],
                None,
                "a",
            )
            .unwrap_err();
        assert!(matches!(err, Error::ProjectNotFound { .. }));
    }

    #[test]
    fn test_get_by_short_id() {
        let mut storage = open_with_project("/p", "Proj");
        let issue = quick_issue(&mut storage, "/p", "Find me", 1);

        let found = storage.get_issue(&issue.short_id).unwrap().unwrap();
        assert_eq!(found.id, issue.id);
    }

    #[test]
    fn test_update_requires_title_verification() {
        let mut storage = open_with_project("/p", "Proj");
        let issue = quick_issue(&mut storage, "/p", "Original", 1);

        let err = storage
            .update_issue(
                &issue.id,
                "Wrong title",
                None,
                None,
                None,
                None,
                Some(4),
                None,
                None,
                None,
                "a",
            )
            .unwrap_err();
        assert!(matches!(err, Error::VerificationFailed { .. }));

        let updated = storage
            .update_issue(
                &issue.id,
                "Original",
                None,
                None,
                None,
                None,
                Some(4),
                None,
                None,
                None,
                "a",
            )
            .unwrap();
        assert_eq!(updated.priority, 4);
    }

    #[test]
    fn test_dependency_cycle_rejected() {
        let mut storage = open_with_project("/p", "Proj");
        let a = quick_issue(&mut storage, "/p", "A", 2);
        let b = quick_issue(&mut storage, "/p", "B", 2);
        let c = quick_issue(&mut storage, "/p", "C", 2);

        // a depends on b, b depends on c
        storage
            .add_issue_dependency(&a.id, &b.id, DependencyType::Blocks, "x")
            .unwrap();
        storage
            .add_issue_dependency(&b.id, &c.id, DependencyType::Blocks, "x")
            .unwrap();

        // c depends on a closes the loop
        let err = storage
            .add_issue_dependency(&c.id, &a.id, DependencyType::Blocks, "x")
            .unwrap_err();
        assert!(matches!(err, Error::CycleDetected { .. }));

        // self-dependency is a degenerate cycle
        let err = storage
            .add_issue_dependency(&a.id, &a.id, DependencyType::Blocks, "x")
            .unwrap_err();
        assert!(matches!(err, Error::CycleDetected { .. }));

        // non-blocks edges don't participate in the cycle check
        storage
            .add_issue_dependency(&c.id, &a.id, DependencyType::Related, "x")
            .unwrap();
    }

    #[test]
    fn test_ready_queue_excludes_blocked() {
        let mut storage = open_with_project("/p", "SC");
        let one = quick_issue(&mut storage, "/p", "one", 3);
        let two = quick_issue(&mut storage, "/p", "two", 2);
        let three = quick_issue(&mut storage, "/p", "three", 4);

        // one is blocked by two
        storage
            .add_issue_dependency(&one.id, &two.id, DependencyType::Blocks, "x")
            .unwrap();

        let ready = storage.get_ready_issues("/p", 10).unwrap();
        let titles: Vec<&str> = ready.iter().map(|i| i.title.as_str()).collect();
        // priority order: three (4) then two (2); one excluded
        assert_eq!(titles, vec!["three", "two"]);
    }

    #[test]
    fn test_next_block_claims_atomically() {
        let mut storage = open_with_project("/p", "SC");
        quick_issue(&mut storage, "/p", "t1", 3);
        quick_issue(&mut storage, "/p", "t2", 2);

        let block_a = storage.get_next_issue_block("/p", 1, "agent-a").unwrap();
        assert_eq!(block_a.len(), 1);
        assert_eq!(block_a[0].title, "t1");
        assert_eq!(block_a[0].status, IssueStatus::InProgress);
        assert_eq!(block_a[0].assigned_to_agent.as_deref(), Some("agent-a"));

        let block_b = storage.get_next_issue_block("/p", 1, "agent-b").unwrap();
        assert_eq!(block_b.len(), 1);
        assert_eq!(block_b[0].title, "t2");

        assert!(storage.get_ready_issues("/p", 10).unwrap().is_empty());
    }

    #[test]
    fn test_complete_cascades_unblock() {
        let mut storage = open_with_project("/p", "SC");
        let blocker = quick_issue(&mut storage, "/p", "blocker", 2);
        let blocked = quick_issue(&mut storage, "/p", "blocked", 2);

        storage
            .add_issue_dependency(&blocked.id, &blocker.id, DependencyType::Blocks, "x")
            .unwrap();
        storage
            .update_issue(
                &blocked.id,
                "blocked",
                None,
                None,
                None,
                Some(IssueStatus::Blocked),
                None,
                None,
                None,
                None,
                "x",
            )
            .unwrap();

        let (_, unblocked, plan) = storage.complete_issue(&blocker.id, None, "x").unwrap();
        assert_eq!(unblocked, vec![blocked.short_id.clone()]);
        assert!(plan.is_none());

        let reloaded = storage.get_issue(&blocked.id).unwrap().unwrap();
        assert_eq!(reloaded.status, IssueStatus::Open);
    }

    #[test]
    fn test_complete_keeps_blocked_with_remaining_blockers() {
        let mut storage = open_with_project("/p", "SC");
        let b1 = quick_issue(&mut storage, "/p", "b1", 2);
        let b2 = quick_issue(&mut storage, "/p", "b2", 2);
        let target = quick_issue(&mut storage, "/p", "target", 2);

        for blocker in [&b1, &b2] {
            storage
                .add_issue_dependency(&target.id, &blocker.id, DependencyType::Blocks, "x")
                .unwrap();
        }
        storage
            .update_issue(
                &target.id,
                "target",
                None,
                None,
                None,
                Some(IssueStatus::Blocked),
                None,
                None,
                None,
                None,
                "x",
            )
            .unwrap();

        let (_, unblocked, _) = storage.complete_issue(&b1.id, None, "x").unwrap();
        assert!(unblocked.is_empty());
        assert_eq!(
            storage.get_issue(&target.id).unwrap().unwrap().status,
            IssueStatus::Blocked
        );

        let (_, unblocked, _) = storage.complete_issue(&b2.id, None, "x").unwrap();
        assert_eq!(unblocked, vec![target.short_id]);
    }

    #[test]
    fn test_batch_create_with_parent_refs_and_deps() {
        let mut storage = open_with_project("/p", "SC");

        let specs = vec![
            BatchIssueSpec {
                title: "epic".to_string(),
                description: None,
                details: None,
                issue_type: IssueType::Epic,
                priority: 3,
                labels: vec!["planning".to_string()],
                parent_id: None,
                plan_id: None,
            },
            BatchIssueSpec {
                title: "child-a".to_string(),
                description: None,
                details: None,
                issue_type: IssueType::Task,
                priority: 2,
                labels: vec![],
                parent_id: Some("$0".to_string()),
                plan_id: None,
            },
            BatchIssueSpec {
                title: "child-b".to_string(),
                description: None,
                details: None,
                issue_type: IssueType::Task,
                priority: 2,
                labels: vec![],
                parent_id: Some("$0".to_string()),
                plan_id: None,
            },
        ];
        let deps = vec![BatchDependency {
            from_index: 2,
            on_index: 1,
            dep_type: DependencyType::Blocks,
        }];

        let created = storage
            .create_issue_batch("/p", &specs, &deps, None, "agent")
            .unwrap();
        assert_eq!(created.len(), 3);
        assert_eq!(created[0].short_id, "SC-1");
        assert_eq!(created[1].parent_id.as_deref(), Some(created[0].id.as_str()));
        assert_eq!(created[2].parent_id.as_deref(), Some(created[0].id.as_str()));

        let edges = storage.get_issue_dependencies(&created[2].id).unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].depends_on_id, created[1].id);
    }

    #[test]
    fn test_batch_rolls_back_on_bad_reference() {
        let mut storage = open_with_project("/p", "SC");

        let specs = vec![
            BatchIssueSpec {
                title: "ok".to_string(),
                description: None,
                details: None,
                issue_type: IssueType::Task,
                priority: 2,
                labels: vec![],
                parent_id: None,
                plan_id: None,
            },
            BatchIssueSpec {
                title: "bad-parent".to_string(),
                description: None,
                details: None,
                issue_type: IssueType::Task,
                priority: 2,
                labels: vec![],
                parent_id: Some("$9".to_string()),
                plan_id: None,
            },
        ];

        let err = storage
            .create_issue_batch("/p", &specs, &[], None, "agent")
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));

        // Nothing committed, counter untouched
        let next = quick_issue(&mut storage, "/p", "after", 2);
        assert_eq!(next.short_id, "SC-1");
    }

    #[test]
    fn test_list_filters_labels_and_parent() {
        let mut storage = open_with_project("/p", "SC");
        let epic = quick_issue(&mut storage, "/p", "epic", 3);
        let child = storage
            .create_issue(
                "/p",
                "child",
                None,
                None,
                IssueType::Task,
                2,
                Some(epic.id.as_str()),
                None,
                &["auth".to_string(), "backend".to_string()],
                None,
                "a",
            )
            .unwrap();
        quick_issue(&mut storage, "/p", "other", 1);

        let filters = IssueFilters {
            labels_all: vec!["auth".to_string(), "backend".to_string()],
            ..IssueFilters::default()
        };
        let found = storage
            .list_issues("/p", &filters, IssueSort::Priority, false, None)
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, child.id);

        let filters = IssueFilters {
            parent_id: Some(epic.short_id.clone()),
            ..IssueFilters::default()
        };
        let found = storage
            .list_issues("/p", &filters, IssueSort::Priority, false, None)
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, child.id);

        let filters = IssueFilters {
            has_subtasks: Some(true),
            ..IssueFilters::default()
        };
        let found = storage
            .list_issues("/p", &filters, IssueSort::Priority, false, None)
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, epic.id);
    }

    #[test]
    fn test_claim_release_round_trip() {
        let mut storage = open_with_project("/p", "SC");
        let issue = quick_issue(&mut storage, "/p", "T", 2);

        let claimed = storage.claim_issue(&issue.id, "agent-1").unwrap();
        assert_eq!(claimed.status, IssueStatus::InProgress);
        assert_eq!(claimed.assigned_to_agent.as_deref(), Some("agent-1"));

        let released = storage.release_issue(&issue.id, "agent-1").unwrap();
        assert_eq!(released.status, IssueStatus::Open);
        assert!(released.assigned_to_agent.is_none());
    }

    #[test]
    fn test_short_id_counter_large_values() {
        let mut storage = open_with_project("/p", "SC");
        storage
            .conn()
            .execute(
                "UPDATE projects SET next_issue_number = 1000000000 WHERE project_path = '/p'",
                [],
            )
            .unwrap();

        let issue = quick_issue(&mut storage, "/p", "big", 2);
        assert_eq!(issue.short_id, "SC-1000000000");
        let next = quick_issue(&mut storage, "/p", "bigger", 2);
        assert_eq!(next.short_id, "SC-1000000001");
    }
}
