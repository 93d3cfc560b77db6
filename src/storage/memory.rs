//! Project memory operations (project-level persistent storage).

use crate::error::{Error, Result};
use crate::model::{Memory, MemoryCategory};
use crate::storage::events::EventType;
use crate::storage::sqlite::SqliteStorage;
use rusqlite::{OptionalExtension, Row};

fn map_memory_row(row: &Row<'_>) -> rusqlite::Result<Memory> {
    Ok(Memory {
        id: row.get(0)?,
        project_path: row.get(1)?,
        key: row.get(2)?,
        value: row.get(3)?,
        category: MemoryCategory::parse(&row.get::<_, String>(4)?).unwrap_or_default(),
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

const MEMORY_COLUMNS: &str = "id, project_path, key, value, category, created_at, updated_at";

impl SqliteStorage {
    // =================
    // Memory Operations
    // =================

    /// Save a memory entry (upsert by `(project_path, key)`).
    ///
    /// # Errors
    ///
    /// Returns an error if the operation fails.
    pub fn save_memory(
        &mut self,
        project_path: &str,
        key: &str,
        value: &str,
        category: MemoryCategory,
        actor: &str,
    ) -> Result<Memory> {
        let id = crate::new_id("mem");
        let now = crate::now_ms();

        self.mutate("save_memory", actor, |tx, ctx| {
            tx.execute(
                "INSERT INTO project_memory (id, project_path, key, value, category, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
                 ON CONFLICT(project_path, key) DO UPDATE SET
                   value = excluded.value,
                   category = excluded.category,
                   updated_at = excluded.updated_at",
                rusqlite::params![id, project_path, key, value, category.as_str(), now],
            )?;

            let stored_id: String = tx.query_row(
                "SELECT id FROM project_memory WHERE project_path = ?1 AND key = ?2",
                rusqlite::params![project_path, key],
                |row| row.get(0),
            )?;
            ctx.record_event("memory", &stored_id, EventType::MemorySaved);
            Ok(())
        })?;

        self.get_memory(project_path, key)?
            .ok_or_else(|| Error::MemoryNotFound { key: key.to_string() })
    }

    /// Get a memory entry by key.
    pub fn get_memory(&self, project_path: &str, key: &str) -> Result<Option<Memory>> {
        let sql = format!(
            "SELECT {MEMORY_COLUMNS} FROM project_memory WHERE project_path = ?1 AND key = ?2"
        );
        let memory = self
            .conn()
            .prepare(&sql)?
            .query_row(rusqlite::params![project_path, key], map_memory_row)
            .optional()?;
        Ok(memory)
    }

    /// List memory entries for a project, optionally by category.
    pub fn list_memory(
        &self,
        project_path: &str,
        category: Option<MemoryCategory>,
        limit: Option<u32>,
    ) -> Result<Vec<Memory>> {
        let limit = limit.unwrap_or(100);

        let mut sql = format!(
            "SELECT {MEMORY_COLUMNS} FROM project_memory WHERE project_path = ?1"
        );
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(project_path.to_string())];

        if let Some(cat) = category {
            sql.push_str(" AND category = ?");
            params.push(Box::new(cat.as_str().to_string()));
        }

        sql.push_str(" ORDER BY updated_at DESC LIMIT ?");
        params.push(Box::new(limit));

        let mut stmt = self.conn().prepare(&sql)?;
        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
        let rows = stmt.query_map(param_refs.as_slice(), map_memory_row)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Error::from)
    }

    /// Delete a memory entry.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the key is missing.
    pub fn delete_memory(&mut self, project_path: &str, key: &str, actor: &str) -> Result<()> {
        self.mutate("delete_memory", actor, |tx, ctx| {
            let id: Option<String> = tx
                .query_row(
                    "SELECT id FROM project_memory WHERE project_path = ?1 AND key = ?2",
                    rusqlite::params![project_path, key],
                    |row| row.get(0),
                )
                .optional()?;

            let Some(id) = id else {
                return Err(Error::MemoryNotFound { key: key.to_string() });
            };

            tx.execute("DELETE FROM project_memory WHERE id = ?1", [&id])?;
            ctx.record_event("memory", &id, EventType::MemoryDeleted);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_upsert_is_project_scoped() {
        let mut storage = SqliteStorage::open_memory().unwrap();

        storage
            .save_memory("/p", "build", "cargo build", MemoryCategory::Command, "agent")
            .unwrap();
        storage
            .save_memory("/q", "build", "make", MemoryCategory::Command, "agent")
            .unwrap();

        let p = storage.get_memory("/p", "build").unwrap().unwrap();
        let q = storage.get_memory("/q", "build").unwrap().unwrap();
        assert_eq!(p.value, "cargo build");
        assert_eq!(q.value, "make");

        // Upsert overwrites within the project
        let updated = storage
            .save_memory("/p", "build", "cargo build --release", MemoryCategory::Command, "agent")
            .unwrap();
        assert_eq!(updated.id, p.id);
        assert_eq!(updated.value, "cargo build --release");
    }

    #[test]
    fn test_memory_list_by_category() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        storage
            .save_memory("/p", "build", "cargo build", MemoryCategory::Command, "a")
            .unwrap();
        storage
            .save_memory("/p", "editor", "zed", MemoryCategory::Config, "a")
            .unwrap();

        let commands = storage
            .list_memory("/p", Some(MemoryCategory::Command), None)
            .unwrap();
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].key, "build");

        let all = storage.list_memory("/p", None, None).unwrap();
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn test_memory_delete() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        storage
            .save_memory("/p", "k", "v", MemoryCategory::Note, "a")
            .unwrap();

        storage.delete_memory("/p", "k", "a").unwrap();
        assert!(storage.get_memory("/p", "k").unwrap().is_none());

        let err = storage.delete_memory("/p", "k", "a").unwrap_err();
        assert!(matches!(err, Error::MemoryNotFound { .. }));
    }
}
