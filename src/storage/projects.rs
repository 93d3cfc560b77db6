//! Project registry operations.

use crate::error::{Error, Result};
use crate::model::Project;
use crate::storage::events::EventType;
use crate::storage::sqlite::SqliteStorage;
use rusqlite::{OptionalExtension, Row};

fn map_project_row(row: &Row<'_>) -> rusqlite::Result<Project> {
    Ok(Project {
        id: row.get(0)?,
        project_path: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        issue_prefix: row.get(4)?,
        next_issue_number: row.get(5)?,
        next_plan_number: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

const PROJECT_COLUMNS: &str = "id, project_path, name, description, issue_prefix, \
     next_issue_number, next_plan_number, created_at, updated_at";

impl SqliteStorage {
    // ======================
    // Project Operations
    // ======================

    /// Register a project.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` when the path is already registered.
    pub fn create_project(&mut self, project: &Project, actor: &str) -> Result<()> {
        self.mutate("create_project", actor, |tx, ctx| {
            let result = tx.execute(
                "INSERT INTO projects (id, project_path, name, description, issue_prefix,
                     next_issue_number, next_plan_number, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                rusqlite::params![
                    project.id,
                    project.project_path,
                    project.name,
                    project.description,
                    project.issue_prefix,
                    project.next_issue_number,
                    project.next_plan_number,
                    project.created_at,
                    project.updated_at,
                ],
            );

            match result {
                Ok(_) => {
                    ctx.record_event("project", &project.id, EventType::ProjectCreated);
                    Ok(())
                }
                Err(rusqlite::Error::SqliteFailure(err, _))
                    if err.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    Err(Error::InvalidArgument(format!(
                        "project already registered at {}",
                        project.project_path
                    )))
                }
                Err(e) => Err(e.into()),
            }
        })
    }

    /// Get a project by id or path.
    pub fn get_project(&self, id_or_path: &str) -> Result<Option<Project>> {
        let sql = format!(
            "SELECT {PROJECT_COLUMNS} FROM projects WHERE id = ?1 OR project_path = ?1"
        );
        let project = self
            .conn()
            .prepare(&sql)?
            .query_row([id_or_path], map_project_row)
            .optional()?;
        Ok(project)
    }

    /// Get a project by path, failing with `NotFound` on a miss.
    pub fn require_project(&self, project_path: &str) -> Result<Project> {
        self.get_project(project_path)?
            .ok_or_else(|| Error::ProjectNotFound {
                path: project_path.to_string(),
            })
    }

    /// List registered projects, most recently updated first.
    pub fn list_projects(&self, limit: usize) -> Result<Vec<Project>> {
        let sql = format!(
            "SELECT {PROJECT_COLUMNS} FROM projects ORDER BY updated_at DESC LIMIT ?1"
        );
        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt.query_map([limit], map_project_row)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Error::from)
    }

    /// Update project metadata. Only fields passed as `Some` change.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for a missing project.
    pub fn update_project(
        &mut self,
        project_path: &str,
        name: Option<&str>,
        description: Option<&str>,
        issue_prefix: Option<&str>,
        actor: &str,
    ) -> Result<Project> {
        let project = self.require_project(project_path)?;
        let now = crate::now_ms();

        self.mutate("update_project", actor, |tx, ctx| {
            let mut set_clauses = vec!["updated_at = ?".to_string()];
            let mut params: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(now)];

            if let Some(n) = name {
                set_clauses.push("name = ?".to_string());
                params.push(Box::new(n.to_string()));
            }
            if let Some(d) = description {
                set_clauses.push("description = ?".to_string());
                params.push(Box::new(d.to_string()));
            }
            if let Some(p) = issue_prefix {
                set_clauses.push("issue_prefix = ?".to_string());
                params.push(Box::new(p.to_string()));
            }

            let sql = format!(
                "UPDATE projects SET {} WHERE id = ?{}",
                set_clauses.join(", "),
                params.len() + 1
            );
            params.push(Box::new(project.id.clone()));

            let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
            tx.execute(&sql, param_refs.as_slice())?;

            ctx.record_event("project", &project.id, EventType::ProjectUpdated);
            Ok(())
        })?;

        self.require_project(project_path)
    }

    /// Delete a project. Issues, plans, and memory cascade; sessions are
    /// unlinked (primary path cleared), not deleted.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for a missing project.
    pub fn delete_project(&mut self, project_path: &str, actor: &str) -> Result<()> {
        let project = self.require_project(project_path)?;

        self.mutate("delete_project", actor, |tx, ctx| {
            tx.execute(
                "DELETE FROM issues WHERE project_path = ?1",
                [project_path],
            )?;
            tx.execute("DELETE FROM plans WHERE project_path = ?1", [project_path])?;
            tx.execute(
                "DELETE FROM project_memory WHERE project_path = ?1",
                [project_path],
            )?;

            // Unlink sessions rather than deleting them
            tx.execute(
                "UPDATE sessions SET project_path = NULL WHERE project_path = ?1",
                [project_path],
            )?;
            tx.execute(
                "DELETE FROM session_projects WHERE project_path = ?1",
                [project_path],
            )?;

            tx.execute("DELETE FROM projects WHERE id = ?1", [&project.id])?;

            ctx.record_event("project", &project.id, EventType::ProjectDeleted);
            Ok(())
        })
    }

    /// Get the project at a path, registering it (basename as name) when
    /// absent. Used by issue tooling that runs before explicit setup.
    pub fn get_or_create_project(&mut self, project_path: &str, actor: &str) -> Result<Project> {
        if let Some(project) = self.get_project(project_path)? {
            return Ok(project);
        }

        let name = std::path::Path::new(project_path)
            .file_name()
            .map_or_else(|| project_path.to_string(), |n| n.to_string_lossy().to_string());

        let project = Project::new(project_path.to_string(), name);
        self.create_project(&project, actor)?;
        Ok(project)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Session;

    #[test]
    fn test_project_crud() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let project = Project::new("/home/u/proj".to_string(), "My Proj".to_string());
        storage.create_project(&project, "agent").unwrap();

        let by_path = storage.get_project("/home/u/proj").unwrap().unwrap();
        assert_eq!(by_path.name, "My Proj");
        assert_eq!(by_path.issue_prefix, "MYPR");

        let by_id = storage.get_project(&project.id).unwrap().unwrap();
        assert_eq!(by_id.project_path, "/home/u/proj");

        let updated = storage
            .update_project("/home/u/proj", None, Some("desc"), Some("MP"), "agent")
            .unwrap();
        assert_eq!(updated.description.as_deref(), Some("desc"));
        assert_eq!(updated.issue_prefix, "MP");
    }

    #[test]
    fn test_duplicate_path_rejected() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let project = Project::new("/p".to_string(), "P".to_string());
        storage.create_project(&project, "agent").unwrap();

        let dup = Project::new("/p".to_string(), "Other".to_string());
        assert!(storage.create_project(&dup, "agent").is_err());
    }

    #[test]
    fn test_delete_cascades_but_unlinks_sessions() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let project = Project::new("/p".to_string(), "P".to_string());
        storage.create_project(&project, "agent").unwrap();

        storage
            .create_issue(
                "/p",
                "T",
                None,
                None,
                crate::model::IssueType::Task,
                2,
                None,
                None,
                &[],
                None,
                "agent",
            )
            .unwrap();
        storage
            .save_memory("/p", "build", "cargo build", crate::model::MemoryCategory::Command, "agent")
            .unwrap();

        let session = Session::new("S".to_string(), Some("/p".to_string()), "general".to_string());
        storage.create_session(&session, "agent").unwrap();

        storage.delete_project("/p", "agent").unwrap();

        assert!(storage.get_project("/p").unwrap().is_none());
        let issues = storage
            .list_issues("/p", &crate::storage::IssueFilters::default(), crate::storage::IssueSort::Priority, false, None)
            .unwrap();
        assert!(issues.is_empty());
        assert!(storage.get_memory("/p", "build").unwrap().is_none());

        // Session survives, unlinked
        let survived = storage.get_session(&session.id).unwrap().unwrap();
        assert!(survived.project_path.is_none());
    }

    #[test]
    fn test_get_or_create_uses_basename() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let project = storage.get_or_create_project("/repo/dashboard", "agent").unwrap();
        assert_eq!(project.name, "dashboard");

        let again = storage.get_or_create_project("/repo/dashboard", "agent").unwrap();
        assert_eq!(again.id, project.id);
    }
}
