//! Session model.

use serde::{Deserialize, Serialize};

/// Session lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Paused,
    Completed,
}

impl SessionStatus {
    /// Get the string representation for storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Completed => "completed",
        }
    }

    /// Parse from a storage string. Unknown values read as `Paused`,
    /// the safest state for a session we no longer understand.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "active" => Self::Active,
            "completed" => Self::Completed,
            _ => Self::Paused,
        }
    }
}

/// A bounded unit of work attached to one or more project paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Unique identifier (`sess_` prefix)
    pub id: String,

    /// Human-readable name
    pub name: String,

    /// Optional description
    pub description: Option<String>,

    /// Git branch the session was started on
    pub branch: Option<String>,

    /// Channel slug partitioning context items (≤20 chars)
    pub channel: String,

    /// Primary project path
    pub project_path: Option<String>,

    /// Lifecycle state
    pub status: SessionStatus,

    /// Set when the session is paused or completed
    pub ended_at: Option<i64>,

    pub created_at: i64,
    pub updated_at: i64,
}

impl Session {
    /// Create a new active session.
    #[must_use]
    pub fn new(name: String, project_path: Option<String>, channel: String) -> Self {
        let now = crate::now_ms();
        Self {
            id: crate::new_id("sess"),
            name,
            description: None,
            branch: None,
            channel,
            project_path,
            status: SessionStatus::Active,
            ended_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[must_use]
    pub fn with_branch(mut self, branch: Option<String>) -> Self {
        self.branch = branch;
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [SessionStatus::Active, SessionStatus::Paused, SessionStatus::Completed] {
            assert_eq!(SessionStatus::parse(status.as_str()), status);
        }
    }

    #[test]
    fn test_unknown_status_reads_as_paused() {
        assert_eq!(SessionStatus::parse("archived"), SessionStatus::Paused);
    }

    #[test]
    fn test_new_session_is_active() {
        let s = Session::new("refactor".into(), Some("/repo".into()), "general".into());
        assert!(s.id.starts_with("sess_"));
        assert_eq!(s.status, SessionStatus::Active);
        assert!(s.ended_at.is_none());
    }
}
