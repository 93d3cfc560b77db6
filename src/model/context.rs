//! Context item model: keyed working memory inside a session.

use serde::{Deserialize, Serialize};

/// What kind of context an item carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Reminder,
    Decision,
    Progress,
    Note,
}

impl Category {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Reminder => "reminder",
            Self::Decision => "decision",
            Self::Progress => "progress",
            Self::Note => "note",
        }
    }

    /// Parse from a storage or argument string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "reminder" => Some(Self::Reminder),
            "decision" => Some(Self::Decision),
            "progress" => Some(Self::Progress),
            "note" => Some(Self::Note),
            _ => None,
        }
    }
}

impl Default for Category {
    fn default() -> Self {
        Self::Note
    }
}

/// Item priority, used for compaction triage and checkpoint previews.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Normal,
    Low,
}

impl Priority {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Normal => "normal",
            Self::Low => "low",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "high" => Some(Self::High),
            "normal" => Some(Self::Normal),
            "low" => Some(Self::Low),
            _ => None,
        }
    }

    /// Sort rank, highest first.
    #[must_use]
    pub const fn rank(&self) -> i32 {
        match self {
            Self::High => 2,
            Self::Normal => 1,
            Self::Low => 0,
        }
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self::Normal
    }
}

/// Embedding lifecycle for an item's vector chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingStatus {
    /// No embedding and none scheduled (backfill candidate).
    None,
    /// Generation scheduled or running.
    Pending,
    /// Vector chunks present and current.
    Ok,
    /// Last generation attempt failed.
    Error,
}

impl EmbeddingStatus {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Pending => "pending",
            Self::Ok => "ok",
            Self::Error => "error",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "pending" => Self::Pending,
            "ok" => Self::Ok,
            "error" => Self::Error,
            _ => Self::None,
        }
    }
}

/// A keyed piece of working memory inside a session.
///
/// `(session_id, key)` is unique; saving an existing key overwrites the
/// value but preserves `created_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextItem {
    pub id: String,
    pub session_id: String,
    pub key: String,
    pub value: String,
    pub category: Category,
    pub priority: Priority,
    pub channel: String,
    /// Tag set, persisted as a JSON array string.
    pub tags: Vec<String>,
    /// Value size in bytes.
    pub size: i64,
    pub created_at: i64,
    pub updated_at: i64,

    // Embedding metadata
    pub embedding_status: EmbeddingStatus,
    pub embedding_provider: Option<String>,
    pub embedding_model: Option<String>,
    pub chunk_count: i64,
    pub embedded_at: Option<i64>,
}

impl ContextItem {
    /// Serialize tags for storage.
    #[must_use]
    pub fn tags_json(&self) -> String {
        serde_json::to_string(&self.tags).unwrap_or_else(|_| "[]".to_string())
    }

    /// Parse a stored tags column (JSON array string, possibly NULL).
    #[must_use]
    pub fn parse_tags(raw: Option<&str>) -> Vec<String> {
        raw.and_then(|s| serde_json::from_str(s).ok()).unwrap_or_default()
    }

    /// True when any of `tags` appears in this item's tag set.
    #[must_use]
    pub fn has_any_tag(&self, tags: &[String]) -> bool {
        tags.iter().any(|t| self.tags.contains(t))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_parse() {
        assert_eq!(Category::parse("decision"), Some(Category::Decision));
        assert_eq!(Category::parse("DECISION"), Some(Category::Decision));
        assert_eq!(Category::parse("task"), None);
    }

    #[test]
    fn test_priority_rank_order() {
        assert!(Priority::High.rank() > Priority::Normal.rank());
        assert!(Priority::Normal.rank() > Priority::Low.rank());
    }

    #[test]
    fn test_embedding_status_round_trip() {
        for s in [
            EmbeddingStatus::None,
            EmbeddingStatus::Pending,
            EmbeddingStatus::Ok,
            EmbeddingStatus::Error,
        ] {
            assert_eq!(EmbeddingStatus::parse(s.as_str()), s);
        }
        // Unknown strings degrade to None (re-embed candidate)
        assert_eq!(EmbeddingStatus::parse("complete"), EmbeddingStatus::None);
    }

    #[test]
    fn test_parse_tags() {
        assert_eq!(
            ContextItem::parse_tags(Some(r#"["auth","ui"]"#)),
            vec!["auth".to_string(), "ui".to_string()]
        );
        assert!(ContextItem::parse_tags(Some("not json")).is_empty());
        assert!(ContextItem::parse_tags(None).is_empty());
    }
}
