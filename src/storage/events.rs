//! Audit event storage and retrieval.
//!
//! Events track all mutations in the database for debugging and history.

use rusqlite::{Connection, Result};

/// Event types for audit logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    // Session events
    SessionCreated,
    SessionUpdated,
    SessionPaused,
    SessionResumed,
    SessionCompleted,
    SessionDeleted,
    SessionPathAdded,
    SessionPathRemoved,

    // Context item events
    ItemCreated,
    ItemUpdated,
    ItemDeleted,

    // Issue events
    IssueCreated,
    IssueUpdated,
    IssueClosed,
    IssueClaimed,
    IssueReleased,
    IssueDeleted,

    // Checkpoint events
    CheckpointCreated,
    CheckpointRestored,
    CheckpointSplit,
    CheckpointDeleted,

    // Plan events
    PlanCreated,
    PlanUpdated,
    PlanCompleted,

    // Memory events
    MemorySaved,
    MemoryDeleted,

    // Project events
    ProjectCreated,
    ProjectUpdated,
    ProjectDeleted,
}

impl EventType {
    /// Get the string representation for storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::SessionCreated => "session_created",
            Self::SessionUpdated => "session_updated",
            Self::SessionPaused => "session_paused",
            Self::SessionResumed => "session_resumed",
            Self::SessionCompleted => "session_completed",
            Self::SessionDeleted => "session_deleted",
            Self::SessionPathAdded => "session_path_added",
            Self::SessionPathRemoved => "session_path_removed",
            Self::ItemCreated => "item_created",
            Self::ItemUpdated => "item_updated",
            Self::ItemDeleted => "item_deleted",
            Self::IssueCreated => "issue_created",
            Self::IssueUpdated => "issue_updated",
            Self::IssueClosed => "issue_closed",
            Self::IssueClaimed => "issue_claimed",
            Self::IssueReleased => "issue_released",
            Self::IssueDeleted => "issue_deleted",
            Self::CheckpointCreated => "checkpoint_created",
            Self::CheckpointRestored => "checkpoint_restored",
            Self::CheckpointSplit => "checkpoint_split",
            Self::CheckpointDeleted => "checkpoint_deleted",
            Self::PlanCreated => "plan_created",
            Self::PlanUpdated => "plan_updated",
            Self::PlanCompleted => "plan_completed",
            Self::MemorySaved => "memory_saved",
            Self::MemoryDeleted => "memory_deleted",
            Self::ProjectCreated => "project_created",
            Self::ProjectUpdated => "project_updated",
            Self::ProjectDeleted => "project_deleted",
        }
    }
}

/// An audit event record.
#[derive(Debug, Clone)]
pub struct Event {
    pub id: i64,
    pub entity_type: String,
    pub entity_id: String,
    pub event_type: EventType,
    pub actor: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub comment: Option<String>,
    pub created_at: i64,
}

impl Event {
    /// Create a new event (id will be assigned by database).
    #[must_use]
    pub fn new(entity_type: &str, entity_id: &str, event_type: EventType, actor: &str) -> Self {
        Self {
            id: 0,
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            event_type,
            actor: actor.to_string(),
            old_value: None,
            new_value: None,
            comment: None,
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Add old/new values for field change tracking.
    #[must_use]
    pub fn with_values(mut self, old: Option<String>, new: Option<String>) -> Self {
        self.old_value = old;
        self.new_value = new;
        self
    }

    /// Add a comment to the event.
    #[must_use]
    pub fn with_comment(mut self, comment: &str) -> Self {
        self.comment = Some(comment.to_string());
        self
    }
}

/// Insert an event into the database.
///
/// # Errors
///
/// Returns an error if the insert fails.
pub fn insert_event(conn: &Connection, event: &Event) -> Result<i64> {
    conn.execute(
        "INSERT INTO events (entity_type, entity_id, event_type, actor, old_value, new_value, comment, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        rusqlite::params![
            event.entity_type,
            event.entity_id,
            event.event_type.as_str(),
            event.actor,
            event.old_value,
            event.new_value,
            event.comment,
            event.created_at,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}
