//! Database schema definitions.
//!
//! The complete SQLite schema for the SaveContext store. Timestamps are
//! stored as INTEGER Unix milliseconds.

use rusqlite::{Connection, Result};

/// Current schema version for migration tracking.
pub const CURRENT_SCHEMA_VERSION: i32 = 2;

/// The complete SQL schema for the SaveContext database.
pub const SCHEMA_SQL: &str = r#"
-- ====================
-- Schema Version Tracking
-- ====================

CREATE TABLE IF NOT EXISTS schema_migrations (
    version TEXT PRIMARY KEY,
    applied_at INTEGER NOT NULL
);

-- ====================
-- Core Tables
-- ====================

-- Projects: registry for ID generation and metadata
CREATE TABLE IF NOT EXISTS projects (
    id TEXT PRIMARY KEY,
    project_path TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    description TEXT,
    issue_prefix TEXT NOT NULL,
    next_issue_number INTEGER NOT NULL DEFAULT 1,
    next_plan_number INTEGER NOT NULL DEFAULT 1,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_projects_path ON projects(project_path);

-- Sessions: bounded work units
CREATE TABLE IF NOT EXISTS sessions (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    description TEXT,
    branch TEXT,
    channel TEXT NOT NULL DEFAULT 'general',
    project_path TEXT,
    status TEXT NOT NULL DEFAULT 'active',
    ended_at INTEGER,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_sessions_project_path ON sessions(project_path);
CREATE INDEX IF NOT EXISTS idx_sessions_status ON sessions(status);
CREATE INDEX IF NOT EXISTS idx_sessions_project_status ON sessions(project_path, status);

-- Session Projects: many-to-many for multi-path (monorepo) sessions.
-- Every session has at least one row; exactly one has is_primary = 1.
CREATE TABLE IF NOT EXISTS session_projects (
    session_id TEXT NOT NULL,
    project_path TEXT NOT NULL,
    is_primary INTEGER NOT NULL DEFAULT 0,
    added_at INTEGER NOT NULL,
    PRIMARY KEY (session_id, project_path),
    FOREIGN KEY (session_id) REFERENCES sessions(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_session_projects_path ON session_projects(project_path);
CREATE INDEX IF NOT EXISTS idx_session_projects_session ON session_projects(session_id);

-- Agent Bindings: agent identity -> current session, refreshed on
-- every mutating RPC.
CREATE TABLE IF NOT EXISTS agent_bindings (
    agent_id TEXT PRIMARY KEY,
    current_session_id TEXT,
    last_project_path TEXT,
    last_branch TEXT,
    provider TEXT NOT NULL DEFAULT 'unknown',
    last_active_at INTEGER NOT NULL,
    FOREIGN KEY (current_session_id) REFERENCES sessions(id) ON DELETE SET NULL
);

CREATE INDEX IF NOT EXISTS idx_agent_bindings_session ON agent_bindings(current_session_id);
CREATE INDEX IF NOT EXISTS idx_agent_bindings_active ON agent_bindings(last_active_at DESC);

-- Context Items: keyed working memory
CREATE TABLE IF NOT EXISTS context_items (
    id TEXT PRIMARY KEY,
    session_id TEXT NOT NULL,
    key TEXT NOT NULL,
    value TEXT NOT NULL,
    category TEXT NOT NULL DEFAULT 'note',
    priority TEXT NOT NULL DEFAULT 'normal',
    channel TEXT NOT NULL DEFAULT 'general',
    tags TEXT NOT NULL DEFAULT '[]',
    size INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    embedding_status TEXT NOT NULL DEFAULT 'none',
    embedding_provider TEXT,
    embedding_model TEXT,
    chunk_count INTEGER NOT NULL DEFAULT 0,
    embedded_at INTEGER,
    FOREIGN KEY (session_id) REFERENCES sessions(id) ON DELETE CASCADE,
    UNIQUE(session_id, key)
);

CREATE INDEX IF NOT EXISTS idx_context_items_session ON context_items(session_id);
CREATE INDEX IF NOT EXISTS idx_context_items_category ON context_items(category);
CREATE INDEX IF NOT EXISTS idx_context_items_priority ON context_items(priority);
CREATE INDEX IF NOT EXISTS idx_context_items_channel ON context_items(channel);
CREATE INDEX IF NOT EXISTS idx_context_items_session_created ON context_items(session_id, created_at DESC);
CREATE INDEX IF NOT EXISTS idx_context_items_embedding_status ON context_items(embedding_status);

-- Checkpoints: named snapshots of session state
CREATE TABLE IF NOT EXISTS checkpoints (
    id TEXT PRIMARY KEY,
    session_id TEXT NOT NULL,
    name TEXT NOT NULL,
    description TEXT,
    git_status TEXT,
    git_branch TEXT,
    item_count INTEGER NOT NULL DEFAULT 0,
    total_size INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL,
    FOREIGN KEY (session_id) REFERENCES sessions(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_checkpoints_session ON checkpoints(session_id);
CREATE INDEX IF NOT EXISTS idx_checkpoints_created ON checkpoints(created_at DESC);

-- Checkpoint Items: link checkpoints to context items
CREATE TABLE IF NOT EXISTS checkpoint_items (
    id TEXT PRIMARY KEY,
    checkpoint_id TEXT NOT NULL,
    context_item_id TEXT NOT NULL,
    group_name TEXT,
    group_order INTEGER NOT NULL DEFAULT 0,
    FOREIGN KEY (checkpoint_id) REFERENCES checkpoints(id) ON DELETE CASCADE,
    FOREIGN KEY (context_item_id) REFERENCES context_items(id) ON DELETE CASCADE,
    UNIQUE(checkpoint_id, context_item_id)
);

CREATE INDEX IF NOT EXISTS idx_checkpoint_items_checkpoint ON checkpoint_items(checkpoint_id);
CREATE INDEX IF NOT EXISTS idx_checkpoint_items_item ON checkpoint_items(context_item_id);

-- Plans: implementation plans (PRDs/specs)
CREATE TABLE IF NOT EXISTS plans (
    id TEXT PRIMARY KEY,
    short_id TEXT NOT NULL,
    project_path TEXT NOT NULL,
    title TEXT NOT NULL,
    content TEXT,
    status TEXT NOT NULL DEFAULT 'draft',
    success_criteria TEXT,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    completed_at INTEGER
);

CREATE INDEX IF NOT EXISTS idx_plans_project_path ON plans(project_path);
CREATE INDEX IF NOT EXISTS idx_plans_status ON plans(status);
CREATE INDEX IF NOT EXISTS idx_plans_short_id ON plans(project_path, short_id);

-- Issues: task/bug/feature tracking
CREATE TABLE IF NOT EXISTS issues (
    id TEXT PRIMARY KEY,
    short_id TEXT NOT NULL,
    project_path TEXT NOT NULL,
    title TEXT NOT NULL,
    description TEXT,
    details TEXT,
    status TEXT NOT NULL DEFAULT 'open',
    priority INTEGER NOT NULL DEFAULT 2,
    issue_type TEXT NOT NULL DEFAULT 'task',
    parent_id TEXT,
    plan_id TEXT,
    created_by_agent TEXT,
    closed_by_agent TEXT,
    created_in_session TEXT,
    closed_in_session TEXT,
    assigned_to_agent TEXT,
    assigned_at INTEGER,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    closed_at INTEGER,
    FOREIGN KEY (plan_id) REFERENCES plans(id) ON DELETE SET NULL,
    FOREIGN KEY (parent_id) REFERENCES issues(id) ON DELETE SET NULL,
    UNIQUE(project_path, short_id),
    CHECK (priority >= 0 AND priority <= 4)
);

CREATE INDEX IF NOT EXISTS idx_issues_project ON issues(project_path);
CREATE INDEX IF NOT EXISTS idx_issues_status ON issues(status);
CREATE INDEX IF NOT EXISTS idx_issues_priority ON issues(priority);
CREATE INDEX IF NOT EXISTS idx_issues_type ON issues(issue_type);
CREATE INDEX IF NOT EXISTS idx_issues_plan ON issues(plan_id);
CREATE INDEX IF NOT EXISTS idx_issues_parent ON issues(parent_id);
CREATE INDEX IF NOT EXISTS idx_issues_assigned ON issues(assigned_to_agent);

-- Issue Projects: many-to-many for multi-project issues
CREATE TABLE IF NOT EXISTS issue_projects (
    issue_id TEXT NOT NULL,
    project_path TEXT NOT NULL,
    added_at INTEGER NOT NULL,
    PRIMARY KEY (issue_id, project_path),
    FOREIGN KEY (issue_id) REFERENCES issues(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_issue_projects_path ON issue_projects(project_path);

-- Issue Labels: tags for categorizing issues
CREATE TABLE IF NOT EXISTS issue_labels (
    id TEXT PRIMARY KEY,
    issue_id TEXT NOT NULL,
    label TEXT NOT NULL,
    FOREIGN KEY (issue_id) REFERENCES issues(id) ON DELETE CASCADE,
    UNIQUE(issue_id, label)
);

CREATE INDEX IF NOT EXISTS idx_issue_labels_label ON issue_labels(label);

-- Issue Dependencies: relationships between issues.
-- The 'blocks' sub-graph must stay acyclic (checked at write time).
CREATE TABLE IF NOT EXISTS issue_dependencies (
    id TEXT PRIMARY KEY,
    issue_id TEXT NOT NULL,
    depends_on_id TEXT NOT NULL,
    dependency_type TEXT NOT NULL DEFAULT 'blocks',
    created_at INTEGER NOT NULL,
    FOREIGN KEY (issue_id) REFERENCES issues(id) ON DELETE CASCADE,
    FOREIGN KEY (depends_on_id) REFERENCES issues(id) ON DELETE CASCADE,
    UNIQUE(issue_id, depends_on_id)
);

CREATE INDEX IF NOT EXISTS idx_issue_deps_depends ON issue_dependencies(depends_on_id);

-- Project Memory: project-specific commands, configs, notes
CREATE TABLE IF NOT EXISTS project_memory (
    id TEXT PRIMARY KEY,
    project_path TEXT NOT NULL,
    key TEXT NOT NULL,
    value TEXT NOT NULL,
    category TEXT NOT NULL DEFAULT 'command',
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    UNIQUE(project_path, key)
);

CREATE INDEX IF NOT EXISTS idx_memory_project ON project_memory(project_path);
CREATE INDEX IF NOT EXISTS idx_memory_category ON project_memory(category);

-- ====================
-- Embeddings Support (BLOB-based)
-- ====================

-- Embeddings configuration metadata (active dimension, provider)
CREATE TABLE IF NOT EXISTS embeddings_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at INTEGER NOT NULL
);

-- Vector storage using regular SQLite BLOB columns.
-- Embeddings are binary f32 arrays (4 bytes per dimension, little-endian).
-- Large text items chunk into multiple rows.
CREATE TABLE IF NOT EXISTS embedding_chunks (
    id TEXT PRIMARY KEY,
    item_id TEXT NOT NULL,
    chunk_index INTEGER NOT NULL DEFAULT 0,
    chunk_text TEXT NOT NULL,
    embedding BLOB NOT NULL,
    dimensions INTEGER NOT NULL,
    provider TEXT NOT NULL,
    model TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    FOREIGN KEY (item_id) REFERENCES context_items(id) ON DELETE CASCADE,
    UNIQUE(item_id, chunk_index)
);

CREATE INDEX IF NOT EXISTS idx_embedding_chunks_item ON embedding_chunks(item_id);
CREATE INDEX IF NOT EXISTS idx_embedding_chunks_provider ON embedding_chunks(provider, model);

-- ====================
-- Audit Events
-- ====================

CREATE TABLE IF NOT EXISTS events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    entity_type TEXT NOT NULL,
    entity_id TEXT NOT NULL,
    event_type TEXT NOT NULL,
    actor TEXT NOT NULL,
    old_value TEXT,
    new_value TEXT,
    comment TEXT,
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id);
CREATE INDEX IF NOT EXISTS idx_events_created ON events(created_at DESC);
CREATE INDEX IF NOT EXISTS idx_events_actor ON events(actor);

-- ====================
-- Triggers
-- ====================

-- Auto-update session timestamps when context items change
CREATE TRIGGER IF NOT EXISTS update_session_timestamp
AFTER INSERT ON context_items
BEGIN
    UPDATE sessions
    SET updated_at = (strftime('%s', 'now') * 1000)
    WHERE id = NEW.session_id;
END;

-- ====================
-- Views
-- ====================

-- Recent sessions with item counts
CREATE VIEW IF NOT EXISTS recent_sessions AS
SELECT
    s.id,
    s.name,
    s.description,
    s.branch,
    s.channel,
    s.status,
    s.project_path,
    s.created_at,
    s.updated_at,
    COUNT(DISTINCT ci.id) as item_count,
    COALESCE(SUM(ci.size), 0) as total_size
FROM sessions s
LEFT JOIN context_items ci ON s.id = ci.session_id
GROUP BY s.id
ORDER BY s.updated_at DESC;

-- Open issues with label and dependency counts
CREATE VIEW IF NOT EXISTS open_issues AS
SELECT
    i.*,
    COUNT(DISTINCT il.label) as label_count,
    COUNT(DISTINCT id.depends_on_id) as dependency_count
FROM issues i
LEFT JOIN issue_labels il ON i.id = il.issue_id
LEFT JOIN issue_dependencies id ON i.id = id.issue_id
WHERE i.status NOT IN ('closed', 'deferred')
GROUP BY i.id
ORDER BY i.priority DESC, i.created_at ASC;
"#;

/// Apply the schema to the database.
///
/// This uses `execute_batch` to run the entire DDL script.
/// It is idempotent because all statements use `IF NOT EXISTS`.
///
/// # Errors
///
/// Returns an error if the SQL execution fails or pragmas cannot be set.
pub fn apply_schema(conn: &Connection) -> Result<()> {
    // Set pragmas before schema creation
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "cache_size", "-64000")?; // 64MB cache
    conn.pragma_update(None, "temp_store", "MEMORY")?;

    // Apply schema
    conn.execute_batch(SCHEMA_SQL)?;

    // Run migrations for existing databases
    super::migrations::run_migrations(conn)?;

    // Record schema version
    conn.execute(
        "INSERT OR IGNORE INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
        rusqlite::params![
            format!("v{CURRENT_SCHEMA_VERSION}"),
            chrono::Utc::now().timestamp_millis()
        ],
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_schema() {
        let conn = Connection::open_in_memory().unwrap();
        apply_schema(&conn).expect("Failed to apply schema");

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();

        for expected in [
            "sessions",
            "session_projects",
            "agent_bindings",
            "context_items",
            "issues",
            "issue_dependencies",
            "issue_labels",
            "issue_projects",
            "checkpoints",
            "checkpoint_items",
            "plans",
            "projects",
            "project_memory",
            "events",
            "embedding_chunks",
            "embeddings_meta",
        ] {
            assert!(tables.contains(&expected.to_string()), "missing table {expected}");
        }
    }

    #[test]
    fn test_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        apply_schema(&conn).expect("First apply failed");
        apply_schema(&conn).expect("Second apply failed");
    }

    #[test]
    fn test_foreign_keys_enabled() {
        let conn = Connection::open_in_memory().unwrap();
        apply_schema(&conn).unwrap();

        let fk_enabled: i32 = conn
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .unwrap();
        assert_eq!(fk_enabled, 1);
    }

    #[test]
    fn test_priority_constraint() {
        let conn = Connection::open_in_memory().unwrap();
        apply_schema(&conn).unwrap();

        let result = conn.execute(
            "INSERT INTO issues (id, short_id, project_path, title, priority, created_at, updated_at)
             VALUES ('test1', 'T-1', '/test', 'Test', 2, 0, 0)",
            [],
        );
        assert!(result.is_ok());

        let result = conn.execute(
            "INSERT INTO issues (id, short_id, project_path, title, priority, created_at, updated_at)
             VALUES ('test2', 'T-2', '/test', 'Test', 5, 0, 0)",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_short_id_unique_per_project() {
        let conn = Connection::open_in_memory().unwrap();
        apply_schema(&conn).unwrap();

        conn.execute(
            "INSERT INTO issues (id, short_id, project_path, title, created_at, updated_at)
             VALUES ('a', 'SC-1', '/p', 'A', 0, 0)",
            [],
        )
        .unwrap();

        // Same short_id under another project is fine
        conn.execute(
            "INSERT INTO issues (id, short_id, project_path, title, created_at, updated_at)
             VALUES ('b', 'SC-1', '/q', 'B', 0, 0)",
            [],
        )
        .unwrap();

        // Duplicate within the project is rejected
        let dup = conn.execute(
            "INSERT INTO issues (id, short_id, project_path, title, created_at, updated_at)
             VALUES ('c', 'SC-1', '/p', 'C', 0, 0)",
            [],
        );
        assert!(dup.is_err());
    }

    #[test]
    fn test_checkpoint_item_pair_unique() {
        let conn = Connection::open_in_memory().unwrap();
        apply_schema(&conn).unwrap();

        conn.execute_batch(
            "INSERT INTO sessions (id, name, created_at, updated_at) VALUES ('s', 'S', 0, 0);
             INSERT INTO context_items (id, session_id, key, value, created_at, updated_at)
               VALUES ('i', 's', 'k', 'v', 0, 0);
             INSERT INTO checkpoints (id, session_id, name, created_at) VALUES ('c', 's', 'v1', 0);
             INSERT INTO checkpoint_items (id, checkpoint_id, context_item_id) VALUES ('ci1', 'c', 'i');",
        )
        .unwrap();

        let dup = conn.execute(
            "INSERT INTO checkpoint_items (id, checkpoint_id, context_item_id) VALUES ('ci2', 'c', 'i')",
            [],
        );
        assert!(dup.is_err());
    }
}
