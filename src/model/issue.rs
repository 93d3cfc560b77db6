//! Issue model: hierarchical task tracking with a dependency graph.
//!
//! Parent-child is a column (`parent_id`); every other relationship is an
//! edge in `issue_dependencies`. The `blocks` sub-graph stays acyclic; the
//! storage layer enforces that at write time.

use serde::{Deserialize, Serialize};

/// Issue lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueStatus {
    Open,
    InProgress,
    Blocked,
    Closed,
    Deferred,
}

impl IssueStatus {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::InProgress => "in_progress",
            Self::Blocked => "blocked",
            Self::Closed => "closed",
            Self::Deferred => "deferred",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "open" => Some(Self::Open),
            "in_progress" => Some(Self::InProgress),
            "blocked" => Some(Self::Blocked),
            "closed" => Some(Self::Closed),
            "deferred" => Some(Self::Deferred),
            _ => None,
        }
    }
}

/// Issue classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueType {
    Task,
    Bug,
    Feature,
    Epic,
    Chore,
}

impl IssueType {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Task => "task",
            Self::Bug => "bug",
            Self::Feature => "feature",
            Self::Epic => "epic",
            Self::Chore => "chore",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "task" => Some(Self::Task),
            "bug" => Some(Self::Bug),
            "feature" => Some(Self::Feature),
            "epic" => Some(Self::Epic),
            "chore" => Some(Self::Chore),
            _ => None,
        }
    }
}

impl Default for IssueType {
    fn default() -> Self {
        Self::Task
    }
}

/// Relationship kinds between issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DependencyType {
    Blocks,
    Related,
    ParentChild,
    DiscoveredFrom,
    DuplicateOf,
}

impl DependencyType {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Blocks => "blocks",
            Self::Related => "related",
            Self::ParentChild => "parent-child",
            Self::DiscoveredFrom => "discovered-from",
            Self::DuplicateOf => "duplicate-of",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "blocks" => Some(Self::Blocks),
            "related" => Some(Self::Related),
            "parent-child" => Some(Self::ParentChild),
            "discovered-from" => Some(Self::DiscoveredFrom),
            "duplicate-of" => Some(Self::DuplicateOf),
            _ => None,
        }
    }
}

/// A tracked unit of work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub id: String,
    /// Human-friendly per-project id, e.g. `SC-42`.
    pub short_id: String,
    pub project_path: String,
    pub title: String,
    pub description: Option<String>,
    pub details: Option<String>,
    pub status: IssueStatus,
    /// 0 (lowest) .. 4 (critical).
    pub priority: i32,
    pub issue_type: IssueType,
    /// Parent issue (epics and sub-tasks).
    pub parent_id: Option<String>,
    pub plan_id: Option<String>,
    pub labels: Vec<String>,
    pub assigned_to_agent: Option<String>,
    pub created_in_session: Option<String>,
    pub closed_in_session: Option<String>,
    pub created_by_agent: Option<String>,
    pub closed_by_agent: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
    pub closed_at: Option<i64>,
}

/// A dependency edge between two issues.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueDependency {
    pub issue_id: String,
    pub depends_on_id: String,
    pub dep_type: DependencyType,
    pub created_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for s in [
            IssueStatus::Open,
            IssueStatus::InProgress,
            IssueStatus::Blocked,
            IssueStatus::Closed,
            IssueStatus::Deferred,
        ] {
            assert_eq!(IssueStatus::parse(s.as_str()), Some(s));
        }
        assert_eq!(IssueStatus::parse("done"), None);
    }

    #[test]
    fn test_dependency_type_round_trip() {
        for d in [
            DependencyType::Blocks,
            DependencyType::Related,
            DependencyType::ParentChild,
            DependencyType::DiscoveredFrom,
            DependencyType::DuplicateOf,
        ] {
            assert_eq!(DependencyType::parse(d.as_str()), Some(d));
        }
    }
}
