//! Plan model.
//!
//! Plans represent PRDs, specs, or feature documentation linked to issues
//! for implementation tracking.

use serde::{Deserialize, Serialize};

/// Plan status values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanStatus {
    Draft,
    Active,
    Completed,
}

impl PlanStatus {
    /// Get the string representation for storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Active => "active",
            Self::Completed => "completed",
        }
    }

    /// Parse from string; unknown values read as `Draft`.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "active" => Self::Active,
            "completed" => Self::Completed,
            _ => Self::Draft,
        }
    }
}

impl Default for PlanStatus {
    fn default() -> Self {
        Self::Draft
    }
}

/// A markdown PRD/spec scoped to a project; groups issues via `plan_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    /// Unique identifier (`plan_` prefix)
    pub id: String,

    /// Short ID for easy reference (e.g., "PLAN-1")
    pub short_id: String,

    /// Project path this plan belongs to
    pub project_path: String,

    /// Plan title
    pub title: String,

    /// Plan content (markdown PRD/spec)
    pub content: Option<String>,

    /// Current status
    pub status: PlanStatus,

    /// Success criteria for completion
    pub success_criteria: Option<String>,

    pub created_at: i64,
    pub updated_at: i64,
    pub completed_at: Option<i64>,
}

impl Plan {
    /// Create a new draft plan. `short_id` is allocated by storage.
    #[must_use]
    pub fn new(project_path: String, title: String) -> Self {
        let now = crate::now_ms();
        Self {
            id: crate::new_id("plan"),
            short_id: String::new(),
            project_path,
            title,
            content: None,
            status: PlanStatus::Draft,
            success_criteria: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    /// Set the plan content.
    #[must_use]
    pub fn with_content(mut self, content: &str) -> Self {
        self.content = Some(content.to_string());
        self
    }

    /// Set the success criteria.
    #[must_use]
    pub fn with_success_criteria(mut self, criteria: &str) -> Self {
        self.success_criteria = Some(criteria.to_string());
        self
    }
}
