//! Project model.
//!
//! Projects represent distinct codebases/directories that can have their
//! own issue prefixes, plans, and memory.

use crate::MAX_ISSUE_PREFIX_LEN;
use serde::{Deserialize, Serialize};

/// A registered project.
///
/// Projects provide:
/// - Issue ID prefixes (e.g., "SC" -> SC-1, SC-2)
/// - Plan tracking
/// - Project-level memory
/// - Session grouping
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    /// Unique identifier (`proj_` prefix)
    pub id: String,

    /// Canonical absolute path to the project directory
    pub project_path: String,

    /// Display name for the project
    pub name: String,

    /// Optional description
    pub description: Option<String>,

    /// Prefix for issue short IDs (e.g., "SC" creates SC-1, SC-2)
    pub issue_prefix: String,

    /// Next issue number to assign
    #[serde(default = "default_one")]
    pub next_issue_number: i64,

    /// Next plan number to assign
    #[serde(default = "default_one")]
    pub next_plan_number: i64,

    /// Creation timestamp (Unix milliseconds)
    pub created_at: i64,

    /// Last update timestamp (Unix milliseconds)
    pub updated_at: i64,
}

fn default_one() -> i64 {
    1
}

impl Project {
    /// Create a new project with default values.
    ///
    /// The issue prefix defaults to the first 4 alphanumeric characters
    /// of the name, upper-cased.
    #[must_use]
    pub fn new(project_path: String, name: String) -> Self {
        let now = crate::now_ms();
        Self {
            id: crate::new_id("proj"),
            project_path,
            issue_prefix: derive_prefix(&name),
            name,
            description: None,
            next_issue_number: 1,
            next_plan_number: 1,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Derive a default issue prefix from a project name.
///
/// First 4 alphanumerics, upper-cased; "SC" when the name has none.
#[must_use]
pub fn derive_prefix(name: &str) -> String {
    let prefix: String = name
        .chars()
        .filter(|c| c.is_alphanumeric())
        .take(4)
        .collect::<String>()
        .to_uppercase();

    if prefix.is_empty() {
        "SC".to_string()
    } else {
        prefix
    }
}

/// Validate a caller-supplied issue prefix (≤8 chars, alphanumeric).
#[must_use]
pub fn is_valid_prefix(prefix: &str) -> bool {
    !prefix.is_empty()
        && prefix.len() <= MAX_ISSUE_PREFIX_LEN
        && prefix.chars().all(char::is_alphanumeric)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_project() {
        let project = Project::new("/home/user/myproject".to_string(), "My Project".to_string());

        assert!(project.id.starts_with("proj_"));
        assert_eq!(project.project_path, "/home/user/myproject");
        assert_eq!(project.issue_prefix, "MYPR");
        assert_eq!(project.next_issue_number, 1);
        assert_eq!(project.next_plan_number, 1);
    }

    #[test]
    fn test_derive_prefix() {
        assert_eq!(derive_prefix("savecontext"), "SAVE");
        assert_eq!(derive_prefix("My Project"), "MYPR");
        assert_eq!(derive_prefix("a"), "A");
        assert_eq!(derive_prefix("---"), "SC");
    }

    #[test]
    fn test_prefix_validation() {
        assert!(is_valid_prefix("SC"));
        assert!(is_valid_prefix("PROJ2024"));
        assert!(!is_valid_prefix(""));
        assert!(!is_valid_prefix("TOOLONGPFX"));
        assert!(!is_valid_prefix("NO-DASH"));
    }
}
