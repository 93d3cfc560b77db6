//! Project memory model: commands, configs, and notes shared across
//! all sessions of a project.

use serde::{Deserialize, Serialize};

/// Memory categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryCategory {
    Command,
    Config,
    Note,
}

impl MemoryCategory {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Command => "command",
            Self::Config => "config",
            Self::Note => "note",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "command" => Some(Self::Command),
            "config" => Some(Self::Config),
            "note" => Some(Self::Note),
            _ => None,
        }
    }
}

impl Default for MemoryCategory {
    fn default() -> Self {
        Self::Command
    }
}

/// A project-scoped memory entry. `(project_path, key)` is unique.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    pub id: String,
    pub project_path: String,
    pub key: String,
    pub value: String,
    pub category: MemoryCategory,
    pub created_at: i64,
    pub updated_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_parse() {
        assert_eq!(MemoryCategory::parse("command"), Some(MemoryCategory::Command));
        assert_eq!(MemoryCategory::parse("CONFIG"), Some(MemoryCategory::Config));
        assert_eq!(MemoryCategory::parse("reminder"), None);
    }
}
