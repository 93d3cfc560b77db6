//! SQLite storage implementation: core protocol, sessions, agent
//! bindings, and context items.
//!
//! Follows the MutationContext pattern for transaction discipline and
//! audit logging: every mutating operation runs inside one IMMEDIATE
//! transaction, records audit events, and commits or rolls back as a
//! unit.

use crate::error::{Error, Result};
use crate::model::{
    AgentBinding, Category, ContextItem, EmbeddingStatus, Priority, Session, SessionStatus,
};
use crate::storage::events::{insert_event, Event, EventType};
use crate::storage::schema::apply_schema;
use crate::validate::glob_match;
use rusqlite::{Connection, OptionalExtension, Row, Transaction};
use std::path::Path;
use std::time::Duration;

/// SQLite-based storage backend.
#[derive(Debug)]
pub struct SqliteStorage {
    conn: Connection,
}

/// Context for a mutation operation, tracking side effects.
///
/// Passed to mutation closures to record audit events and carry the
/// acting agent through nested helpers.
pub struct MutationContext {
    /// Name of the operation being performed.
    pub op_name: String,
    /// Actor performing the operation (agent ID).
    pub actor: String,
    /// Events to write at the end of the transaction.
    pub events: Vec<Event>,
}

impl MutationContext {
    /// Create a new mutation context.
    #[must_use]
    pub fn new(op_name: &str, actor: &str) -> Self {
        Self {
            op_name: op_name.to_string(),
            actor: actor.to_string(),
            events: Vec::new(),
        }
    }

    /// Record an event for this operation.
    pub fn record_event(&mut self, entity_type: &str, entity_id: &str, event_type: EventType) {
        self.events
            .push(Event::new(entity_type, entity_id, event_type, &self.actor));
    }

    /// Record an event with old/new values for field tracking.
    pub fn record_change(
        &mut self,
        entity_type: &str,
        entity_id: &str,
        event_type: EventType,
        old_value: Option<String>,
        new_value: Option<String>,
    ) {
        self.events.push(
            Event::new(entity_type, entity_id, event_type, &self.actor)
                .with_values(old_value, new_value),
        );
    }
}

/// Tag mutation direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagAction {
    Add,
    Remove,
}

impl TagAction {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "add" => Some(Self::Add),
            "remove" => Some(Self::Remove),
            _ => None,
        }
    }
}

// ── Row mappers (shared across the storage impl blocks) ──────

pub(crate) fn map_session_row(row: &Row<'_>) -> rusqlite::Result<Session> {
    Ok(Session {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        branch: row.get(3)?,
        channel: row.get(4)?,
        project_path: row.get(5)?,
        status: SessionStatus::parse(&row.get::<_, String>(6)?),
        ended_at: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

pub(crate) const SESSION_COLUMNS: &str =
    "id, name, description, branch, channel, project_path, status, ended_at, created_at, updated_at";

pub(crate) fn map_item_row(row: &Row<'_>) -> rusqlite::Result<ContextItem> {
    Ok(ContextItem {
        id: row.get(0)?,
        session_id: row.get(1)?,
        key: row.get(2)?,
        value: row.get(3)?,
        category: Category::parse(&row.get::<_, String>(4)?).unwrap_or_default(),
        priority: Priority::parse(&row.get::<_, String>(5)?).unwrap_or_default(),
        channel: row.get(6)?,
        tags: ContextItem::parse_tags(row.get::<_, Option<String>>(7)?.as_deref()),
        size: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
        embedding_status: EmbeddingStatus::parse(&row.get::<_, String>(11)?),
        embedding_provider: row.get(12)?,
        embedding_model: row.get(13)?,
        chunk_count: row.get(14)?,
        embedded_at: row.get(15)?,
    })
}

pub(crate) const ITEM_COLUMNS: &str = "id, session_id, key, value, category, priority, channel, \
     tags, size, created_at, updated_at, embedding_status, embedding_provider, embedding_model, \
     chunk_count, embedded_at";

impl SqliteStorage {
    /// Open a database at the given file path.
    ///
    /// Creates the database and applies schema if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or schema fails.
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_timeout(path, None)
    }

    /// Open the database under a data directory, creating the directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or open fails.
    pub fn open_data_dir(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        Self::open(&data_dir.join("savecontext.db"))
    }

    /// Open a database with an optional busy timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or schema fails.
    pub fn open_with_timeout(path: &Path, timeout_ms: Option<u64>) -> Result<Self> {
        let conn = Connection::open(path)?;

        if let Some(timeout) = timeout_ms {
            conn.busy_timeout(Duration::from_millis(timeout))?;
        } else {
            // Default 5 second timeout
            conn.busy_timeout(Duration::from_secs(5))?;
        }

        apply_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        apply_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Get a reference to the underlying connection (for read operations).
    #[must_use]
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Copy the live database to `dest` using the SQLite backup API.
    ///
    /// Used before destructive embedding-provider switches.
    ///
    /// # Errors
    ///
    /// Returns an error if the backup fails.
    pub fn backup_to(&self, dest: &Path) -> Result<()> {
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut dst = Connection::open(dest)?;
        let backup = rusqlite::backup::Backup::new(&self.conn, &mut dst)?;
        backup.run_to_completion(64, Duration::from_millis(50), None)?;
        Ok(())
    }

    /// Execute a mutation with the transaction protocol.
    ///
    /// This method:
    /// 1. Begins an IMMEDIATE transaction (for write locking)
    /// 2. Executes the mutation closure
    /// 3. Writes audit events
    /// 4. Commits (or rolls back on error)
    ///
    /// # Errors
    ///
    /// Returns an error if any step fails. The transaction is rolled back on error.
    pub fn mutate<F, R>(&mut self, op: &str, actor: &str, f: F) -> Result<R>
    where
        F: FnOnce(&Transaction, &mut MutationContext) -> Result<R>,
    {
        let tx = self
            .conn
            .transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;

        let mut ctx = MutationContext::new(op, actor);

        let result = f(&tx, &mut ctx)?;

        for event in &ctx.events {
            insert_event(&tx, event)?;
        }

        tx.commit()?;

        Ok(result)
    }

    // ==================
    // Session Operations
    // ==================

    /// Create a new session with its primary project path row.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn create_session(&mut self, session: &Session, actor: &str) -> Result<()> {
        self.mutate("create_session", actor, |tx, ctx| {
            tx.execute(
                "INSERT INTO sessions (id, name, description, branch, channel, project_path, status, ended_at, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                rusqlite::params![
                    session.id,
                    session.name,
                    session.description,
                    session.branch,
                    session.channel,
                    session.project_path,
                    session.status.as_str(),
                    session.ended_at,
                    session.created_at,
                    session.updated_at,
                ],
            )?;

            if let Some(ref path) = session.project_path {
                tx.execute(
                    "INSERT INTO session_projects (session_id, project_path, is_primary, added_at)
                     VALUES (?1, ?2, 1, ?3)",
                    rusqlite::params![session.id, path, session.created_at],
                )?;
            }

            ctx.record_event("session", &session.id, EventType::SessionCreated);
            Ok(())
        })
    }

    /// Get a session by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_session(&self, id: &str) -> Result<Option<Session>> {
        let sql = format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?1");
        let session = self
            .conn
            .prepare(&sql)?
            .query_row([id], map_session_row)
            .optional()?;
        Ok(session)
    }

    /// Get a session by ID, enriching a miss with similar-ID suggestions.
    pub fn require_session(&self, id: &str) -> Result<Session> {
        if let Some(session) = self.get_session(id)? {
            return Ok(session);
        }
        let existing: Vec<String> = self
            .conn
            .prepare("SELECT id FROM sessions")?
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<_>>()?;
        let similar = crate::validate::find_similar_ids(id, &existing, 3);
        if similar.is_empty() {
            Err(Error::SessionNotFound { id: id.to_string() })
        } else {
            Err(Error::SessionNotFoundSimilar { id: id.to_string(), similar })
        }
    }

    /// List sessions with optional filters and search.
    ///
    /// Uses the `session_projects` junction table for project path
    /// filtering so multi-path sessions are found from any attached path.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_sessions(
        &self,
        project_path: Option<&str>,
        status: Option<SessionStatus>,
        search: Option<&str>,
        limit: Option<u32>,
    ) -> Result<Vec<Session>> {
        let limit = limit.unwrap_or(50);

        let mut conditions: Vec<String> = Vec::new();
        let mut params: Vec<String> = Vec::new();
        let mut param_idx = 1;

        let (from_clause, select_distinct) = if let Some(path) = project_path {
            conditions.push(format!("sp.project_path = ?{param_idx}"));
            params.push(path.to_string());
            param_idx += 1;
            (
                "sessions s JOIN session_projects sp ON s.id = sp.session_id",
                "DISTINCT ",
            )
        } else {
            ("sessions s", "")
        };

        if let Some(st) = status {
            conditions.push(format!("s.status = ?{param_idx}"));
            params.push(st.as_str().to_string());
            param_idx += 1;
        }

        if let Some(search_term) = search {
            conditions.push(format!(
                "(s.name LIKE ?{param_idx} COLLATE NOCASE OR s.description LIKE ?{param_idx} COLLATE NOCASE)"
            ));
            params.push(format!("%{search_term}%"));
            param_idx += 1;
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conditions.join(" AND "))
        };

        let sql = format!(
            "SELECT {select_distinct}s.id, s.name, s.description, s.branch, s.channel, \
             s.project_path, s.status, s.ended_at, s.created_at, s.updated_at
             FROM {from_clause}{where_clause}
             ORDER BY s.updated_at DESC LIMIT ?{param_idx}"
        );
        params.push(limit.to_string());

        let mut stmt = self.conn.prepare(&sql)?;
        let params_refs: Vec<&dyn rusqlite::ToSql> =
            params.iter().map(|s| s as &dyn rusqlite::ToSql).collect();

        let rows = stmt.query_map(params_refs.as_slice(), map_session_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    /// Update session status, stamping `ended_at` for pause/complete.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails or session not found.
    pub fn update_session_status(
        &mut self,
        id: &str,
        status: SessionStatus,
        actor: &str,
    ) -> Result<()> {
        let now = crate::now_ms();
        let ended_at = match status {
            SessionStatus::Active => None,
            SessionStatus::Paused | SessionStatus::Completed => Some(now),
        };

        self.mutate("update_session_status", actor, |tx, ctx| {
            let rows = tx.execute(
                "UPDATE sessions SET status = ?1, ended_at = ?2, updated_at = ?3 WHERE id = ?4",
                rusqlite::params![status.as_str(), ended_at, now, id],
            )?;

            if rows == 0 {
                return Err(Error::SessionNotFound { id: id.to_string() });
            }

            let event_type = match status {
                SessionStatus::Active => EventType::SessionResumed,
                SessionStatus::Paused => EventType::SessionPaused,
                SessionStatus::Completed => EventType::SessionCompleted,
            };
            ctx.record_event("session", id, event_type);
            Ok(())
        })
    }

    /// Rename a session after verifying the caller knows its current name.
    ///
    /// # Errors
    ///
    /// Returns `Validation` on name mismatch, `NotFound` for a missing id.
    pub fn rename_session(
        &mut self,
        id: &str,
        current_name: &str,
        new_name: &str,
        actor: &str,
    ) -> Result<()> {
        let session = self.require_session(id)?;
        if session.name != current_name {
            return Err(Error::VerificationFailed {
                entity: "session",
                expected: session.name,
                provided: current_name.to_string(),
            });
        }

        let now = crate::now_ms();
        self.mutate("rename_session", actor, |tx, ctx| {
            tx.execute(
                "UPDATE sessions SET name = ?1, updated_at = ?2 WHERE id = ?3",
                rusqlite::params![new_name, now, id],
            )?;
            ctx.record_change(
                "session",
                id,
                EventType::SessionUpdated,
                Some(current_name.to_string()),
                Some(new_name.to_string()),
            );
            Ok(())
        })
    }

    /// Resume a paused session after verifying its name.
    ///
    /// # Errors
    ///
    /// Returns `Validation` on name mismatch; cannot resume a completed
    /// session.
    pub fn resume_session(&mut self, id: &str, expected_name: &str, actor: &str) -> Result<Session> {
        let session = self.require_session(id)?;
        if session.name != expected_name {
            return Err(Error::VerificationFailed {
                entity: "session",
                expected: session.name,
                provided: expected_name.to_string(),
            });
        }
        if session.status == SessionStatus::Completed {
            return Err(Error::InvalidSessionStatus {
                expected: "active or paused".to_string(),
                actual: "completed".to_string(),
            });
        }

        self.update_session_status(id, SessionStatus::Active, actor)?;
        self.require_session(id)
    }

    /// Delete a session and all related data.
    ///
    /// An `active` session is never deleted; the caller must pause or end
    /// it first. Cascades (via foreign keys) to context items, their
    /// embedding chunks, checkpoints, and session paths.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` for an active session, `NotFound` for a missing id.
    pub fn delete_session(&mut self, id: &str, actor: &str) -> Result<()> {
        let session = self.require_session(id)?;
        if session.status == SessionStatus::Active {
            return Err(Error::SessionStillActive { id: id.to_string() });
        }

        self.mutate("delete_session", actor, |tx, ctx| {
            tx.execute("DELETE FROM sessions WHERE id = ?1", [id])?;
            ctx.record_event("session", id, EventType::SessionDeleted);
            Ok(())
        })
    }

    /// Switch an agent to another session atomically: pause the agent's
    /// current session (if active), activate the target, rebind the agent.
    ///
    /// # Errors
    ///
    /// Returns an error if the target is completed or missing.
    pub fn switch_session(&mut self, agent_id: &str, target_id: &str, actor: &str) -> Result<Session> {
        let target = self.require_session(target_id)?;
        if target.status == SessionStatus::Completed {
            return Err(Error::InvalidSessionStatus {
                expected: "active or paused".to_string(),
                actual: "completed".to_string(),
            });
        }

        let now = crate::now_ms();
        self.mutate("switch_session", actor, |tx, ctx| {
            let current: Option<String> = tx
                .query_row(
                    "SELECT current_session_id FROM agent_bindings WHERE agent_id = ?1",
                    [agent_id],
                    |row| row.get(0),
                )
                .optional()?
                .flatten();

            if let Some(ref current_id) = current {
                if current_id != target_id {
                    tx.execute(
                        "UPDATE sessions SET status = 'paused', ended_at = ?1, updated_at = ?1
                         WHERE id = ?2 AND status = 'active'",
                        rusqlite::params![now, current_id],
                    )?;
                    ctx.record_event("session", current_id, EventType::SessionPaused);
                }
            }

            tx.execute(
                "UPDATE sessions SET status = 'active', ended_at = NULL, updated_at = ?1 WHERE id = ?2",
                rusqlite::params![now, target_id],
            )?;

            tx.execute(
                "INSERT INTO agent_bindings (agent_id, current_session_id, last_active_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(agent_id) DO UPDATE SET
                   current_session_id = excluded.current_session_id,
                   last_active_at = excluded.last_active_at",
                rusqlite::params![agent_id, target_id, now],
            )?;

            ctx.record_event("session", target_id, EventType::SessionResumed);
            Ok(())
        })?;

        self.require_session(target_id)
    }

    // ── Session paths ────────────────────────────────────────

    /// Get all project paths for a session, primary first.
    pub fn get_session_paths(&self, session_id: &str) -> Result<Vec<String>> {
        self.require_session(session_id)?;

        let mut stmt = self.conn.prepare(
            "SELECT project_path FROM session_projects
             WHERE session_id = ?1
             ORDER BY is_primary DESC, added_at ASC",
        )?;

        let paths: Vec<String> = stmt
            .query_map([session_id], |row| row.get(0))?
            .collect::<rusqlite::Result<_>>()?;

        Ok(paths)
    }

    /// Add a project path to a session (for multi-path sessions).
    ///
    /// Returns `false` when the path was already attached.
    ///
    /// # Errors
    ///
    /// Returns an error if the session doesn't exist.
    pub fn add_session_path(
        &mut self,
        session_id: &str,
        project_path: &str,
        actor: &str,
    ) -> Result<bool> {
        self.require_session(session_id)?;
        let now = crate::now_ms();

        self.mutate("add_session_path", actor, |tx, ctx| {
            let inserted = tx.execute(
                "INSERT OR IGNORE INTO session_projects (session_id, project_path, is_primary, added_at)
                 VALUES (?1, ?2, 0, ?3)",
                rusqlite::params![session_id, project_path, now],
            )?;

            if inserted > 0 {
                ctx.record_event("session", session_id, EventType::SessionPathAdded);
            }
            Ok(inserted > 0)
        })
    }

    /// Remove a project path from a session.
    ///
    /// Removing the last remaining path is rejected with `Conflict`.
    /// Removing the primary path promotes the oldest remaining path.
    ///
    /// # Errors
    ///
    /// Returns an error if the session doesn't exist or the path is absent.
    pub fn remove_session_path(
        &mut self,
        session_id: &str,
        project_path: &str,
        actor: &str,
    ) -> Result<()> {
        self.require_session(session_id)?;

        self.mutate("remove_session_path", actor, |tx, ctx| {
            let count: i64 = tx.query_row(
                "SELECT COUNT(*) FROM session_projects WHERE session_id = ?1",
                [session_id],
                |row| row.get(0),
            )?;
            if count <= 1 {
                return Err(Error::LastProjectPath { id: session_id.to_string() });
            }

            let was_primary: Option<i64> = tx
                .query_row(
                    "SELECT is_primary FROM session_projects
                     WHERE session_id = ?1 AND project_path = ?2",
                    rusqlite::params![session_id, project_path],
                    |row| row.get(0),
                )
                .optional()?;

            let Some(was_primary) = was_primary else {
                return Err(Error::InvalidArgument(format!(
                    "path not attached to session: {project_path}"
                )));
            };

            tx.execute(
                "DELETE FROM session_projects WHERE session_id = ?1 AND project_path = ?2",
                rusqlite::params![session_id, project_path],
            )?;

            if was_primary == 1 {
                // Promote the oldest remaining path
                tx.execute(
                    "UPDATE session_projects SET is_primary = 1
                     WHERE session_id = ?1 AND project_path = (
                         SELECT project_path FROM session_projects
                         WHERE session_id = ?1 ORDER BY added_at ASC LIMIT 1
                     )",
                    [session_id],
                )?;
                tx.execute(
                    "UPDATE sessions SET project_path = (
                         SELECT project_path FROM session_projects
                         WHERE session_id = ?1 AND is_primary = 1
                     ) WHERE id = ?1",
                    [session_id],
                )?;
            }

            ctx.record_event("session", session_id, EventType::SessionPathRemoved);
            Ok(())
        })
    }

    // ======================
    // Agent Binding Operations
    // ======================

    /// Get an agent binding.
    pub fn get_agent_binding(&self, agent_id: &str) -> Result<Option<AgentBinding>> {
        let binding = self
            .conn
            .prepare(
                "SELECT agent_id, current_session_id, last_project_path, last_branch, provider, last_active_at
                 FROM agent_bindings WHERE agent_id = ?1",
            )?
            .query_row([agent_id], |row| {
                Ok(AgentBinding {
                    agent_id: row.get(0)?,
                    current_session_id: row.get(1)?,
                    last_project_path: row.get(2)?,
                    last_branch: row.get(3)?,
                    provider: row.get(4)?,
                    last_active_at: row.get(5)?,
                })
            })
            .optional()?;
        Ok(binding)
    }

    /// Upsert an agent binding (full row).
    pub fn upsert_agent_binding(&mut self, binding: &AgentBinding) -> Result<()> {
        self.conn.execute(
            "INSERT INTO agent_bindings
               (agent_id, current_session_id, last_project_path, last_branch, provider, last_active_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(agent_id) DO UPDATE SET
               current_session_id = excluded.current_session_id,
               last_project_path = excluded.last_project_path,
               last_branch = excluded.last_branch,
               provider = excluded.provider,
               last_active_at = excluded.last_active_at",
            rusqlite::params![
                binding.agent_id,
                binding.current_session_id,
                binding.last_project_path,
                binding.last_branch,
                binding.provider,
                binding.last_active_at,
            ],
        )?;
        Ok(())
    }

    /// Refresh an agent's `last_active_at`; inserts a stub row for an
    /// agent seen for the first time.
    pub fn touch_agent(&mut self, agent_id: &str, provider: &str) -> Result<()> {
        let now = crate::now_ms();
        self.conn.execute(
            "INSERT INTO agent_bindings (agent_id, provider, last_active_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(agent_id) DO UPDATE SET
               provider = excluded.provider,
               last_active_at = excluded.last_active_at",
            rusqlite::params![agent_id, provider, now],
        )?;
        Ok(())
    }

    /// The session an agent is currently bound to, if it is still active.
    pub fn current_session_for_agent(&self, agent_id: &str) -> Result<Option<Session>> {
        let Some(binding) = self.get_agent_binding(agent_id)? else {
            return Ok(None);
        };
        let Some(session_id) = binding.current_session_id else {
            return Ok(None);
        };
        self.get_session(&session_id)
    }

    // =======================
    // Context Item Operations
    // =======================

    /// Save a context item (upsert by `(session_id, key)`).
    ///
    /// An existing key keeps its `created_at` and row id; the embedding
    /// status is reset to `none` so the pipeline re-embeds the new value.
    ///
    /// Returns the stored item.
    ///
    /// # Errors
    ///
    /// Returns an error if the session is missing or the insert fails.
    #[allow(clippy::too_many_arguments)]
    pub fn save_context_item(
        &mut self,
        session_id: &str,
        key: &str,
        value: &str,
        category: Category,
        priority: Priority,
        channel: &str,
        tags: &[String],
        actor: &str,
    ) -> Result<ContextItem> {
        self.require_session(session_id)?;

        let id = crate::new_id("item");
        let now = crate::now_ms();
        let size = value.len() as i64;
        let tags_json = serde_json::to_string(tags).unwrap_or_else(|_| "[]".to_string());

        self.mutate("save_context_item", actor, |tx, ctx| {
            let exists: bool = tx
                .prepare("SELECT 1 FROM context_items WHERE session_id = ?1 AND key = ?2")?
                .exists(rusqlite::params![session_id, key])?;

            tx.execute(
                "INSERT INTO context_items
                   (id, session_id, key, value, category, priority, channel, tags, size, created_at, updated_at, embedding_status)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10, 'none')
                 ON CONFLICT(session_id, key) DO UPDATE SET
                   value = excluded.value,
                   category = excluded.category,
                   priority = excluded.priority,
                   channel = excluded.channel,
                   tags = excluded.tags,
                   size = excluded.size,
                   updated_at = excluded.updated_at,
                   embedding_status = 'none'",
                rusqlite::params![
                    id,
                    session_id,
                    key,
                    value,
                    category.as_str(),
                    priority.as_str(),
                    channel,
                    tags_json,
                    size,
                    now,
                ],
            )?;

            // ON CONFLICT keeps the original row id; read it back
            let stored_id: String = tx.query_row(
                "SELECT id FROM context_items WHERE session_id = ?1 AND key = ?2",
                rusqlite::params![session_id, key],
                |row| row.get(0),
            )?;

            let event_type = if exists { EventType::ItemUpdated } else { EventType::ItemCreated };
            ctx.record_event("context_item", &stored_id, event_type);

            Ok(())
        })?;

        self.get_context_item_by_key(session_id, key)?
            .ok_or_else(|| Error::ItemNotFound { key: key.to_string() })
    }

    /// Get a context item by session + key.
    pub fn get_context_item_by_key(&self, session_id: &str, key: &str) -> Result<Option<ContextItem>> {
        let sql = format!(
            "SELECT {ITEM_COLUMNS} FROM context_items WHERE session_id = ?1 AND key = ?2"
        );
        let item = self
            .conn
            .prepare(&sql)?
            .query_row(rusqlite::params![session_id, key], map_item_row)
            .optional()?;
        Ok(item)
    }

    /// Get a context item by row id.
    pub fn get_context_item(&self, id: &str) -> Result<Option<ContextItem>> {
        let sql = format!("SELECT {ITEM_COLUMNS} FROM context_items WHERE id = ?1");
        let item = self
            .conn
            .prepare(&sql)?
            .query_row([id], map_item_row)
            .optional()?;
        Ok(item)
    }

    /// List context items for a session with optional filters.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_context_items(
        &self,
        session_id: &str,
        category: Option<Category>,
        priority: Option<Priority>,
        channel: Option<&str>,
        limit: Option<u32>,
    ) -> Result<Vec<ContextItem>> {
        let limit = limit.unwrap_or(100);

        let mut sql = format!("SELECT {ITEM_COLUMNS} FROM context_items WHERE session_id = ?1");
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(session_id.to_string())];

        if let Some(cat) = category {
            sql.push_str(" AND category = ?");
            params.push(Box::new(cat.as_str().to_string()));
        }

        if let Some(pri) = priority {
            sql.push_str(" AND priority = ?");
            params.push(Box::new(pri.as_str().to_string()));
        }

        if let Some(ch) = channel {
            sql.push_str(" AND channel = ?");
            params.push(Box::new(ch.to_string()));
        }

        sql.push_str(" ORDER BY created_at DESC LIMIT ?");
        params.push(Box::new(limit));

        let mut stmt = self.conn.prepare(&sql)?;
        let params_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|b| b.as_ref()).collect();

        let rows = stmt.query_map(params_refs.as_slice(), map_item_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    /// Update a context item's value, category, priority, or channel.
    ///
    /// Only fields passed as `Some` are touched. A value change resets
    /// the embedding status for re-embedding.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the key is missing from the session.
    pub fn update_context_item(
        &mut self,
        session_id: &str,
        key: &str,
        value: Option<&str>,
        category: Option<Category>,
        priority: Option<Priority>,
        channel: Option<&str>,
        actor: &str,
    ) -> Result<ContextItem> {
        self.mutate("update_context_item", actor, |tx, ctx| {
            let now = crate::now_ms();

            let item_id: Option<String> = tx
                .query_row(
                    "SELECT id FROM context_items WHERE session_id = ?1 AND key = ?2",
                    rusqlite::params![session_id, key],
                    |row| row.get(0),
                )
                .optional()?;

            let Some(item_id) = item_id else {
                return Err(Error::ItemNotFound { key: key.to_string() });
            };

            let mut set_parts: Vec<&str> = vec!["updated_at"];
            let mut params: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(now)];

            if let Some(v) = value {
                set_parts.push("value");
                set_parts.push("size");
                set_parts.push("embedding_status");
                params.push(Box::new(v.to_string()));
                params.push(Box::new(v.len() as i64));
                params.push(Box::new("none".to_string()));
            }
            if let Some(c) = category {
                set_parts.push("category");
                params.push(Box::new(c.as_str().to_string()));
            }
            if let Some(p) = priority {
                set_parts.push("priority");
                params.push(Box::new(p.as_str().to_string()));
            }
            if let Some(ch) = channel {
                set_parts.push("channel");
                params.push(Box::new(ch.to_string()));
            }

            let set_clause: String = set_parts
                .iter()
                .enumerate()
                .map(|(i, field)| format!("{} = ?{}", field, i + 1))
                .collect::<Vec<_>>()
                .join(", ");

            let param_count = params.len();
            let query = format!(
                "UPDATE context_items SET {} WHERE session_id = ?{} AND key = ?{}",
                set_clause,
                param_count + 1,
                param_count + 2
            );

            params.push(Box::new(session_id.to_string()));
            params.push(Box::new(key.to_string()));

            let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
            tx.execute(&query, param_refs.as_slice())?;

            ctx.record_event("context_item", &item_id, EventType::ItemUpdated);
            Ok(())
        })?;

        self.get_context_item_by_key(session_id, key)?
            .ok_or_else(|| Error::ItemNotFound { key: key.to_string() })
    }

    /// Delete a context item by key.
    ///
    /// Embedding chunks and checkpoint references cascade via foreign
    /// keys; counts of affected checkpoints are recomputed.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the key is missing from the session.
    pub fn delete_context_item(&mut self, session_id: &str, key: &str, actor: &str) -> Result<()> {
        self.mutate("delete_context_item", actor, |tx, ctx| {
            let item_id: Option<String> = tx
                .query_row(
                    "SELECT id FROM context_items WHERE session_id = ?1 AND key = ?2",
                    rusqlite::params![session_id, key],
                    |row| row.get(0),
                )
                .optional()?;

            let Some(item_id) = item_id else {
                return Err(Error::ItemNotFound { key: key.to_string() });
            };

            let affected: Vec<String> = tx
                .prepare("SELECT DISTINCT checkpoint_id FROM checkpoint_items WHERE context_item_id = ?1")?
                .query_map([&item_id], |row| row.get(0))?
                .collect::<rusqlite::Result<_>>()?;

            tx.execute("DELETE FROM context_items WHERE id = ?1", [&item_id])?;

            for checkpoint_id in affected {
                crate::storage::checkpoints::recompute_checkpoint_counts(tx, &checkpoint_id)?;
            }

            ctx.record_event("context_item", &item_id, EventType::ItemDeleted);
            Ok(())
        })
    }

    /// Apply a tag mutation to items selected by explicit keys or a glob
    /// pattern. Returns the number of items affected.
    ///
    /// # Errors
    ///
    /// Returns an error if the session is missing or the update fails.
    pub fn tag_context_items(
        &mut self,
        session_id: &str,
        keys: Option<&[String]>,
        key_pattern: Option<&str>,
        tags: &[String],
        action: TagAction,
        actor: &str,
    ) -> Result<usize> {
        self.require_session(session_id)?;

        let items = self.list_context_items(session_id, None, None, None, Some(10_000))?;
        let selected: Vec<&ContextItem> = items
            .iter()
            .filter(|item| {
                if let Some(keys) = keys {
                    keys.iter().any(|k| k == &item.key)
                } else if let Some(pattern) = key_pattern {
                    glob_match(pattern, &item.key)
                } else {
                    false
                }
            })
            .collect();

        let now = crate::now_ms();
        let mut affected = 0;

        self.mutate("tag_context_items", actor, |tx, ctx| {
            for item in &selected {
                let mut new_tags = item.tags.clone();
                match action {
                    TagAction::Add => {
                        for tag in tags {
                            if !new_tags.contains(tag) {
                                new_tags.push(tag.clone());
                            }
                        }
                    }
                    TagAction::Remove => {
                        new_tags.retain(|t| !tags.contains(t));
                    }
                }

                if new_tags != item.tags {
                    let tags_json =
                        serde_json::to_string(&new_tags).unwrap_or_else(|_| "[]".to_string());
                    tx.execute(
                        "UPDATE context_items SET tags = ?1, updated_at = ?2 WHERE id = ?3",
                        rusqlite::params![tags_json, now, item.id],
                    )?;
                    ctx.record_event("context_item", &item.id, EventType::ItemUpdated);
                    affected += 1;
                }
            }
            Ok(())
        })?;

        Ok(affected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Session;

    fn open() -> SqliteStorage {
        SqliteStorage::open_memory().unwrap()
    }

    fn make_session(storage: &mut SqliteStorage, name: &str, path: Option<&str>) -> Session {
        let session = Session::new(
            name.to_string(),
            path.map(ToString::to_string),
            "general".to_string(),
        );
        storage.create_session(&session, "test-agent").unwrap();
        session
    }

    #[test]
    fn test_session_crud() {
        let mut storage = open();
        let session = make_session(&mut storage, "Test Session", Some("/test/project"));

        let loaded = storage.get_session(&session.id).unwrap().unwrap();
        assert_eq!(loaded.name, "Test Session");
        assert_eq!(loaded.status, SessionStatus::Active);

        let sessions = storage
            .list_sessions(Some("/test/project"), None, None, None)
            .unwrap();
        assert_eq!(sessions.len(), 1);

        storage
            .update_session_status(&session.id, SessionStatus::Completed, "test-agent")
            .unwrap();
        let loaded = storage.get_session(&session.id).unwrap().unwrap();
        assert_eq!(loaded.status, SessionStatus::Completed);
        assert!(loaded.ended_at.is_some());
    }

    #[test]
    fn test_session_search() {
        let mut storage = open();
        make_session(&mut storage, "auth refactor", Some("/p"));
        make_session(&mut storage, "ui polish", Some("/p"));

        let found = storage
            .list_sessions(Some("/p"), None, Some("AUTH"), None)
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "auth refactor");
    }

    #[test]
    fn test_delete_active_session_rejected() {
        let mut storage = open();
        let session = make_session(&mut storage, "S", Some("/p"));

        let err = storage.delete_session(&session.id, "agent").unwrap_err();
        assert!(matches!(err, Error::SessionStillActive { .. }));

        storage
            .update_session_status(&session.id, SessionStatus::Paused, "agent")
            .unwrap();
        storage.delete_session(&session.id, "agent").unwrap();
        assert!(storage.get_session(&session.id).unwrap().is_none());
    }

    #[test]
    fn test_rename_requires_current_name() {
        let mut storage = open();
        let session = make_session(&mut storage, "old-name", Some("/p"));

        let err = storage
            .rename_session(&session.id, "wrong-name", "new-name", "agent")
            .unwrap_err();
        assert!(matches!(err, Error::VerificationFailed { .. }));

        storage
            .rename_session(&session.id, "old-name", "new-name", "agent")
            .unwrap();
        assert_eq!(storage.get_session(&session.id).unwrap().unwrap().name, "new-name");
    }

    #[test]
    fn test_session_paths_primary_and_last() {
        let mut storage = open();
        let session = make_session(&mut storage, "S", Some("/repo/app"));

        assert!(storage
            .add_session_path(&session.id, "/repo/dashboard", "agent")
            .unwrap());
        // Re-adding is a no-op
        assert!(!storage
            .add_session_path(&session.id, "/repo/dashboard", "agent")
            .unwrap());

        let paths = storage.get_session_paths(&session.id).unwrap();
        assert_eq!(paths, vec!["/repo/app", "/repo/dashboard"]);

        storage
            .remove_session_path(&session.id, "/repo/dashboard", "agent")
            .unwrap();

        // Removing the last path is rejected
        let err = storage
            .remove_session_path(&session.id, "/repo/app", "agent")
            .unwrap_err();
        assert!(matches!(err, Error::LastProjectPath { .. }));
    }

    #[test]
    fn test_remove_primary_promotes_next() {
        let mut storage = open();
        let session = make_session(&mut storage, "S", Some("/a"));
        storage.add_session_path(&session.id, "/b", "agent").unwrap();

        storage.remove_session_path(&session.id, "/a", "agent").unwrap();

        let paths = storage.get_session_paths(&session.id).unwrap();
        assert_eq!(paths, vec!["/b"]);
        let loaded = storage.get_session(&session.id).unwrap().unwrap();
        assert_eq!(loaded.project_path.as_deref(), Some("/b"));
    }

    #[test]
    fn test_switch_session_pauses_current() {
        let mut storage = open();
        let first = make_session(&mut storage, "first", Some("/p"));
        let second = make_session(&mut storage, "second", Some("/p"));
        storage
            .update_session_status(&second.id, SessionStatus::Paused, "agent")
            .unwrap();

        let binding = AgentBinding {
            agent_id: "p-main-claude-code".to_string(),
            current_session_id: Some(first.id.clone()),
            last_project_path: Some("/p".to_string()),
            last_branch: Some("main".to_string()),
            provider: "claude-code".to_string(),
            last_active_at: crate::now_ms(),
        };
        storage.upsert_agent_binding(&binding).unwrap();

        let switched = storage
            .switch_session("p-main-claude-code", &second.id, "agent")
            .unwrap();
        assert_eq!(switched.status, SessionStatus::Active);

        let first_loaded = storage.get_session(&first.id).unwrap().unwrap();
        assert_eq!(first_loaded.status, SessionStatus::Paused);

        let binding = storage
            .get_agent_binding("p-main-claude-code")
            .unwrap()
            .unwrap();
        assert_eq!(binding.current_session_id.as_deref(), Some(second.id.as_str()));
    }

    #[test]
    fn test_switch_to_completed_rejected() {
        let mut storage = open();
        let done = make_session(&mut storage, "done", Some("/p"));
        storage
            .update_session_status(&done.id, SessionStatus::Completed, "agent")
            .unwrap();

        let err = storage.switch_session("agent-1", &done.id, "agent").unwrap_err();
        assert!(matches!(err, Error::InvalidSessionStatus { .. }));
    }

    #[test]
    fn test_context_item_upsert_preserves_created_at() {
        let mut storage = open();
        let session = make_session(&mut storage, "S", Some("/p"));

        let first = storage
            .save_context_item(
                &session.id,
                "auth-decision",
                "Use JWT",
                Category::Decision,
                Priority::High,
                "general",
                &[],
                "agent",
            )
            .unwrap();

        let second = storage
            .save_context_item(
                &session.id,
                "auth-decision",
                "Use PASETO",
                Category::Decision,
                Priority::High,
                "general",
                &[],
                "agent",
            )
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(first.created_at, second.created_at);
        assert_eq!(second.value, "Use PASETO");
        assert!(second.updated_at >= first.updated_at);

        let items = storage
            .list_context_items(&session.id, None, None, None, None)
            .unwrap();
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn test_context_item_filters() {
        let mut storage = open();
        let session = make_session(&mut storage, "S", Some("/p"));

        for (key, category, priority) in [
            ("a", Category::Decision, Priority::High),
            ("b", Category::Note, Priority::Low),
            ("c", Category::Decision, Priority::Normal),
        ] {
            storage
                .save_context_item(&session.id, key, "v", category, priority, "general", &[], "agent")
                .unwrap();
        }

        let decisions = storage
            .list_context_items(&session.id, Some(Category::Decision), None, None, None)
            .unwrap();
        assert_eq!(decisions.len(), 2);

        let high = storage
            .list_context_items(&session.id, None, Some(Priority::High), None, None)
            .unwrap();
        assert_eq!(high.len(), 1);
        assert_eq!(high[0].key, "a");
    }

    #[test]
    fn test_update_context_item_partial() {
        let mut storage = open();
        let session = make_session(&mut storage, "S", Some("/p"));
        storage
            .save_context_item(
                &session.id,
                "k",
                "v1",
                Category::Note,
                Priority::Normal,
                "general",
                &[],
                "agent",
            )
            .unwrap();

        let updated = storage
            .update_context_item(&session.id, "k", None, None, Some(Priority::High), None, "agent")
            .unwrap();
        assert_eq!(updated.value, "v1");
        assert_eq!(updated.priority, Priority::High);

        let err = storage
            .update_context_item(&session.id, "missing", Some("x"), None, None, None, "agent")
            .unwrap_err();
        assert!(matches!(err, Error::ItemNotFound { .. }));
    }

    #[test]
    fn test_tag_by_keys_and_pattern() {
        let mut storage = open();
        let session = make_session(&mut storage, "S", Some("/p"));

        for key in ["auth-token", "auth-flow", "ui-theme"] {
            storage
                .save_context_item(&session.id, key, "v", Category::Note, Priority::Normal, "general", &[], "agent")
                .unwrap();
        }

        let n = storage
            .tag_context_items(
                &session.id,
                None,
                Some("auth-*"),
                &["auth".to_string()],
                TagAction::Add,
                "agent",
            )
            .unwrap();
        assert_eq!(n, 2);

        let item = storage
            .get_context_item_by_key(&session.id, "auth-token")
            .unwrap()
            .unwrap();
        assert_eq!(item.tags, vec!["auth"]);

        let n = storage
            .tag_context_items(
                &session.id,
                Some(&["auth-token".to_string()]),
                None,
                &["auth".to_string()],
                TagAction::Remove,
                "agent",
            )
            .unwrap();
        assert_eq!(n, 1);
    }

    #[test]
    fn test_agent_binding_touch() {
        let mut storage = open();
        storage.touch_agent("repo-main-claude-code", "claude-code").unwrap();

        let binding = storage
            .get_agent_binding("repo-main-claude-code")
            .unwrap()
            .unwrap();
        assert_eq!(binding.provider, "claude-code");
        assert!(binding.current_session_id.is_none());
    }
}
