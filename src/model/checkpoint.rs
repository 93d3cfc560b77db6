//! Checkpoint model: named snapshots of session state.

use serde::{Deserialize, Serialize};

/// A named snapshot of selected context items in a session.
///
/// Identity is immutable; membership may change, and `item_count` /
/// `total_size` are recomputed on every membership change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: String,
    pub session_id: String,
    pub name: String,
    pub description: Option<String>,
    /// Porcelain-style working tree snapshot at capture time.
    pub git_status: Option<String>,
    pub git_branch: Option<String>,
    pub item_count: i64,
    pub total_size: i64,
    pub created_at: i64,
}

/// Membership row linking a checkpoint to a context item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointItemRef {
    pub checkpoint_id: String,
    pub context_item_id: String,
    pub group_name: Option<String>,
    pub group_order: i64,
}
