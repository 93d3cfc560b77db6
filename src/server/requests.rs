//! Typed request structs for every tool.
//!
//! One struct per tool; enums and ranges are validated in the handlers
//! so mismatches come back as envelope errors, not schema rejections.
//! The `schemars` descriptions feed the tool schemas agents see.

use schemars::JsonSchema;
use serde::Deserialize;

// ── Sessions ─────────────────────────────────────────────────

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SessionStartRequest {
    #[schemars(description = "Session name")]
    pub name: String,
    #[schemars(description = "Optional description")]
    pub description: Option<String>,
    #[schemars(description = "Project path; defaults to the server's working directory")]
    pub project_path: Option<String>,
    #[schemars(description = "Git branch; detected when omitted")]
    pub branch: Option<String>,
    #[schemars(description = "Channel slug (lowercase, dashes, max 20 chars)")]
    pub channel: Option<String>,
    #[schemars(description = "Always create a fresh session, pausing the current one")]
    pub force_new: Option<bool>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SessionStatusRequest {
    #[schemars(description = "Session ID; defaults to the agent's current session")]
    pub session_id: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SessionRenameRequest {
    #[schemars(description = "Session ID")]
    pub session_id: String,
    #[schemars(description = "Current name, verified before renaming")]
    pub current_name: String,
    #[schemars(description = "New name")]
    pub new_name: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SessionPauseRequest {
    #[schemars(description = "Session ID; defaults to the agent's current session")]
    pub session_id: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SessionResumeRequest {
    #[schemars(description = "Session ID to resume")]
    pub session_id: String,
    #[schemars(description = "Session name, verified before resuming")]
    pub session_name: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SessionSwitchRequest {
    #[schemars(description = "Target session ID")]
    pub session_id: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SessionEndRequest {
    #[schemars(description = "Session ID; defaults to the agent's current session")]
    pub session_id: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SessionDeleteRequest {
    #[schemars(description = "Session ID")]
    pub session_id: String,
    #[schemars(description = "Session name, verified before deleting")]
    pub session_name: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SessionListRequest {
    #[schemars(description = "Filter by project path")]
    pub project_path: Option<String>,
    #[schemars(description = "Filter by status: active, paused, completed")]
    pub status: Option<String>,
    #[schemars(description = "Search over name and description")]
    pub search: Option<String>,
    #[schemars(description = "Max results (default 50)")]
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SessionPathRequest {
    #[schemars(description = "Session ID; defaults to the agent's current session")]
    pub session_id: Option<String>,
    #[schemars(description = "Project path to add or remove")]
    pub project_path: String,
}

// ── Context items ────────────────────────────────────────────

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ContextSaveRequest {
    #[schemars(description = "Unique key within the session")]
    pub key: String,
    #[schemars(description = "Value (max 100KB)")]
    pub value: String,
    #[schemars(description = "Category: reminder, decision, progress, note (default note)")]
    pub category: Option<String>,
    #[schemars(description = "Priority: high, normal, low (default normal)")]
    pub priority: Option<String>,
    #[schemars(description = "Channel slug; inherits the session channel when omitted")]
    pub channel: Option<String>,
    #[schemars(description = "Tags to attach")]
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ContextGetRequest {
    #[schemars(description = "Exact key to fetch")]
    pub key: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ContextUpdateRequest {
    #[schemars(description = "Key of the item to update")]
    pub key: String,
    #[schemars(description = "New value")]
    pub value: Option<String>,
    #[schemars(description = "New category")]
    pub category: Option<String>,
    #[schemars(description = "New priority")]
    pub priority: Option<String>,
    #[schemars(description = "New channel")]
    pub channel: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ContextDeleteRequest {
    #[schemars(description = "Key of the item to delete")]
    pub key: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ContextListRequest {
    #[schemars(description = "Filter by category")]
    pub category: Option<String>,
    #[schemars(description = "Filter by priority")]
    pub priority: Option<String>,
    #[schemars(description = "Filter by channel")]
    pub channel: Option<String>,
    #[schemars(description = "Max results (default 100)")]
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ContextTagRequest {
    #[schemars(description = "Explicit keys to tag")]
    pub keys: Option<Vec<String>>,
    #[schemars(description = "Glob pattern over keys (* wildcard), alternative to keys")]
    pub key_pattern: Option<String>,
    #[schemars(description = "Tags to add or remove")]
    pub tags: Vec<String>,
    #[schemars(description = "Action: add or remove")]
    pub action: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ContextSearchRequest {
    #[schemars(description = "Search query")]
    pub query: String,
    #[schemars(description = "Search across all sessions instead of the current one")]
    pub all_sessions: Option<bool>,
    #[schemars(description = "Filter by category")]
    pub category: Option<String>,
    #[schemars(description = "Filter by priority")]
    pub priority: Option<String>,
    #[schemars(description = "Filter by channel")]
    pub channel: Option<String>,
    #[schemars(description = "Max results (default 10)")]
    pub limit: Option<u32>,
    #[schemars(description = "Similarity threshold 0..1 (default 0.5)")]
    pub threshold: Option<f32>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct PrepareCompactionRequest {
    #[schemars(description = "Include git status in the checkpoint (default true)")]
    pub include_git: Option<bool>,
}

// ── Checkpoints ──────────────────────────────────────────────

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CheckpointCreateRequest {
    #[schemars(description = "Checkpoint name")]
    pub name: String,
    #[schemars(description = "Optional description")]
    pub description: Option<String>,
    #[schemars(description = "Capture git branch and status (default false)")]
    pub include_git: Option<bool>,
    #[schemars(description = "Only items carrying one of these tags")]
    pub include_tags: Option<Vec<String>>,
    #[schemars(description = "Only items whose key matches one of these globs")]
    pub include_keys: Option<Vec<String>>,
    #[schemars(description = "Only items in these categories")]
    pub include_categories: Option<Vec<String>>,
    #[schemars(description = "Drop items carrying any of these tags")]
    pub exclude_tags: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CheckpointRestoreRequest {
    #[schemars(description = "Checkpoint ID")]
    pub checkpoint_id: String,
    #[schemars(description = "Checkpoint name, verified before restoring")]
    pub checkpoint_name: String,
    #[schemars(description = "Target session; defaults to the agent's current session")]
    pub session_id: Option<String>,
    #[schemars(description = "Restore only items carrying one of these tags")]
    pub restore_tags: Option<Vec<String>>,
    #[schemars(description = "Restore only items in these categories")]
    pub restore_categories: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CheckpointListRequest {
    #[schemars(description = "Session ID; defaults to the agent's current session")]
    pub session_id: Option<String>,
    #[schemars(description = "Max results (default 20)")]
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CheckpointGetRequest {
    #[schemars(description = "Checkpoint ID")]
    pub checkpoint_id: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CheckpointDeleteRequest {
    #[schemars(description = "Checkpoint ID")]
    pub checkpoint_id: String,
    #[schemars(description = "Checkpoint name, verified before deleting")]
    pub checkpoint_name: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CheckpointSplitPart {
    #[schemars(description = "Name of the new checkpoint")]
    pub name: String,
    #[schemars(description = "Optional description")]
    pub description: Option<String>,
    #[schemars(description = "Items carrying one of these tags")]
    pub include_tags: Option<Vec<String>>,
    #[schemars(description = "Items in these categories")]
    pub include_categories: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CheckpointSplitRequest {
    #[schemars(description = "Source checkpoint ID")]
    pub checkpoint_id: String,
    #[schemars(description = "Source checkpoint name, verified before splitting")]
    pub checkpoint_name: String,
    #[schemars(description = "Parts to split into; each needs include_tags or include_categories")]
    pub splits: Vec<CheckpointSplitPart>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CheckpointItemsRequest {
    #[schemars(description = "Checkpoint ID")]
    pub checkpoint_id: String,
    #[schemars(description = "Context item keys")]
    pub keys: Vec<String>,
}

// ── Issues ───────────────────────────────────────────────────

#[derive(Debug, Deserialize, JsonSchema)]
pub struct IssueCreateRequest {
    #[schemars(description = "Issue title")]
    pub title: String,
    #[schemars(description = "Short description")]
    pub description: Option<String>,
    #[schemars(description = "Implementation details")]
    pub details: Option<String>,
    #[schemars(description = "Type: task, bug, feature, epic, chore (default task)")]
    pub issue_type: Option<String>,
    #[schemars(description = "Priority 0-4, P-notation, or name (default 2)")]
    pub priority: Option<String>,
    #[schemars(description = "Parent issue ID or short ID")]
    pub parent_id: Option<String>,
    #[schemars(description = "Plan ID to link")]
    pub plan_id: Option<String>,
    #[schemars(description = "Labels to attach")]
    pub labels: Option<Vec<String>>,
    #[schemars(description = "Project path; defaults to the current session's project")]
    pub project_path: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct IssueUpdateRequest {
    #[schemars(description = "Issue ID or short ID")]
    pub issue_id: String,
    #[schemars(description = "Current title, verified before updating")]
    pub issue_title: String,
    #[schemars(description = "New title")]
    pub title: Option<String>,
    #[schemars(description = "New description")]
    pub description: Option<String>,
    #[schemars(description = "New details")]
    pub details: Option<String>,
    #[schemars(description = "New status: open, in_progress, blocked, closed, deferred")]
    pub status: Option<String>,
    #[schemars(description = "New priority")]
    pub priority: Option<String>,
    #[schemars(description = "New type")]
    pub issue_type: Option<String>,
    #[schemars(description = "New parent (empty string clears)")]
    pub parent_id: Option<String>,
    #[schemars(description = "New plan link (empty string clears)")]
    pub plan_id: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct IssueListRequest {
    #[schemars(description = "Filter by status; omit to exclude closed")]
    pub status: Option<String>,
    #[schemars(description = "Include closed issues (default false)")]
    pub include_closed: Option<bool>,
    #[schemars(description = "Exact priority")]
    pub priority: Option<String>,
    #[schemars(description = "Minimum priority")]
    pub priority_min: Option<i32>,
    #[schemars(description = "Maximum priority")]
    pub priority_max: Option<i32>,
    #[schemars(description = "Filter by type")]
    pub issue_type: Option<String>,
    #[schemars(description = "Issue must carry all of these labels")]
    pub labels: Option<Vec<String>>,
    #[schemars(description = "Issue must carry at least one of these labels")]
    pub labels_any: Option<Vec<String>>,
    #[schemars(description = "Filter by parent issue")]
    pub parent_id: Option<String>,
    #[schemars(description = "Filter by plan")]
    pub plan_id: Option<String>,
    #[schemars(description = "Only issues with (or without) subtasks")]
    pub has_subtasks: Option<bool>,
    #[schemars(description = "Only issues with (or without) dependencies")]
    pub has_deps: Option<bool>,
    #[schemars(description = "Sort: priority, createdAt, updatedAt (default priority)")]
    pub sort: Option<String>,
    #[schemars(description = "Ascending order (default false)")]
    pub ascending: Option<bool>,
    #[schemars(description = "List across all projects")]
    pub all_projects: Option<bool>,
    #[schemars(description = "Project path; defaults to the current session's project")]
    pub project_path: Option<String>,
    #[schemars(description = "Max results (default 50)")]
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct IssueCompleteRequest {
    #[schemars(description = "Issue ID or short ID")]
    pub issue_id: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct IssueDeleteRequest {
    #[schemars(description = "Issue ID or short ID")]
    pub issue_id: String,
    #[schemars(description = "Issue title, verified before deleting")]
    pub issue_title: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct IssueDependencyRequest {
    #[schemars(description = "Dependent issue ID or short ID")]
    pub issue_id: String,
    #[schemars(description = "Issue it depends on (ID or short ID)")]
    pub depends_on_id: String,
    #[schemars(
        description = "Type: blocks, related, parent-child, discovered-from, duplicate-of (default blocks)"
    )]
    pub dep_type: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct IssueLabelsRequest {
    #[schemars(description = "Issue ID or short ID")]
    pub issue_id: String,
    #[schemars(description = "Labels to add or remove")]
    pub labels: Vec<String>,
    #[schemars(description = "Action: add or remove")]
    pub action: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct IssueClaimRequest {
    #[schemars(description = "Issue ID or short ID")]
    pub issue_id: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GetReadyRequest {
    #[schemars(description = "Project path; defaults to the current session's project")]
    pub project_path: Option<String>,
    #[schemars(description = "Max results (default 10)")]
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GetNextBlockRequest {
    #[schemars(description = "How many issues to claim (default 1)")]
    pub count: Option<u32>,
    #[schemars(description = "Project path; defaults to the current session's project")]
    pub project_path: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct BatchIssueInput {
    #[schemars(description = "Issue title")]
    pub title: String,
    #[schemars(description = "Short description")]
    pub description: Option<String>,
    #[schemars(description = "Implementation details")]
    pub details: Option<String>,
    #[schemars(description = "Type (default task)")]
    pub issue_type: Option<String>,
    #[schemars(description = "Priority (default 2)")]
    pub priority: Option<String>,
    #[schemars(description = "Labels")]
    pub labels: Option<Vec<String>>,
    #[schemars(description = "Parent: existing ID, or $N for the Nth issue of this batch")]
    pub parent_id: Option<String>,
    #[schemars(description = "Plan ID to link")]
    pub plan_id: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct BatchDependencyInput {
    #[schemars(description = "Index of the dependent issue in this batch")]
    pub from_index: usize,
    #[schemars(description = "Index of the issue it depends on")]
    pub on_index: usize,
    #[schemars(description = "Dependency type (default blocks)")]
    pub dep_type: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct IssueCreateBatchRequest {
    #[schemars(description = "Issues to create, in order")]
    pub issues: Vec<BatchIssueInput>,
    #[schemars(description = "Dependency edges between batch issues, by index")]
    pub dependencies: Option<Vec<BatchDependencyInput>>,
    #[schemars(description = "Project path; defaults to the current session's project")]
    pub project_path: Option<String>,
}

// ── Memory ───────────────────────────────────────────────────

#[derive(Debug, Deserialize, JsonSchema)]
pub struct MemorySaveRequest {
    #[schemars(description = "Memory key")]
    pub key: String,
    #[schemars(description = "Memory value")]
    pub value: String,
    #[schemars(description = "Category: command, config, note (default command)")]
    pub category: Option<String>,
    #[schemars(description = "Project path; defaults to the current session's project")]
    pub project_path: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct MemoryGetRequest {
    #[schemars(description = "Memory key")]
    pub key: String,
    #[schemars(description = "Project path; defaults to the current session's project")]
    pub project_path: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct MemoryListRequest {
    #[schemars(description = "Filter by category")]
    pub category: Option<String>,
    #[schemars(description = "Project path; defaults to the current session's project")]
    pub project_path: Option<String>,
    #[schemars(description = "Max results (default 100)")]
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct MemoryDeleteRequest {
    #[schemars(description = "Memory key")]
    pub key: String,
    #[schemars(description = "Project path; defaults to the current session's project")]
    pub project_path: Option<String>,
}

// ── Plans ────────────────────────────────────────────────────

#[derive(Debug, Deserialize, JsonSchema)]
pub struct PlanCreateRequest {
    #[schemars(description = "Plan title")]
    pub title: String,
    #[schemars(description = "Markdown content (PRD/spec)")]
    pub content: Option<String>,
    #[schemars(description = "Success criteria")]
    pub success_criteria: Option<String>,
    #[schemars(description = "Initial status: draft, active (default draft)")]
    pub status: Option<String>,
    #[schemars(description = "Project path; defaults to the current session's project")]
    pub project_path: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct PlanGetRequest {
    #[schemars(description = "Plan ID or short ID")]
    pub plan_id: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct PlanListRequest {
    #[schemars(description = "Filter by status: draft, active, completed")]
    pub status: Option<String>,
    #[schemars(description = "Project path; defaults to the current session's project")]
    pub project_path: Option<String>,
    #[schemars(description = "Max results (default 20)")]
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct PlanUpdateRequest {
    #[schemars(description = "Plan ID or short ID")]
    pub plan_id: String,
    #[schemars(description = "New title")]
    pub title: Option<String>,
    #[schemars(description = "New content")]
    pub content: Option<String>,
    #[schemars(description = "New status")]
    pub status: Option<String>,
    #[schemars(description = "New success criteria")]
    pub success_criteria: Option<String>,
    #[schemars(description = "Move the plan (and its issues) to this project path")]
    pub project_path: Option<String>,
}

// ── Projects ─────────────────────────────────────────────────

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ProjectCreateRequest {
    #[schemars(description = "Absolute project path")]
    pub project_path: String,
    #[schemars(description = "Display name; defaults to the path basename")]
    pub name: Option<String>,
    #[schemars(description = "Description")]
    pub description: Option<String>,
    #[schemars(description = "Issue prefix (max 8 alphanumerics); derived from the name when omitted")]
    pub issue_prefix: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ProjectGetRequest {
    #[schemars(description = "Project ID or path")]
    pub project: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ProjectListRequest {
    #[schemars(description = "Max results (default 50)")]
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ProjectUpdateRequest {
    #[schemars(description = "Project path")]
    pub project_path: String,
    #[schemars(description = "New name")]
    pub name: Option<String>,
    #[schemars(description = "New description")]
    pub description: Option<String>,
    #[schemars(description = "New issue prefix")]
    pub issue_prefix: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ProjectDeleteRequest {
    #[schemars(description = "Project path")]
    pub project_path: String,
    #[schemars(description = "Project name, verified before deleting")]
    pub project_name: String,
}

// ── Sync & stats ─────────────────────────────────────────────

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SaveSessionRequest {
    #[schemars(description = "Session ID; defaults to the agent's current session")]
    pub session_id: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GetStatsRequest {
    #[schemars(description = "Project path; defaults to the current session's project")]
    pub project_path: Option<String>,
}
