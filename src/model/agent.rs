//! Agent binding model.
//!
//! An agent is a stable identity derived from (project, branch, client
//! tool). The binding row maps that identity to its current session and
//! is refreshed on every mutating RPC.

use serde::{Deserialize, Serialize};

/// The persistent state of one agent identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentBinding {
    /// Derived identity (see `agent::derive_agent_id`).
    pub agent_id: String,
    /// Session the agent is currently bound to, if any.
    pub current_session_id: Option<String>,
    /// Project path last seen from this agent.
    pub last_project_path: Option<String>,
    /// Branch last seen from this agent.
    pub last_branch: Option<String>,
    /// Normalized client tool name (claude-code, cursor, ...).
    pub provider: String,
    /// Last mutating RPC timestamp (epoch ms).
    pub last_active_at: i64,
}
