//! The MCP tool surface.
//!
//! `SaveContextServer` carries the shared state (storage, embedding
//! pipeline, sync worker, per-connection agent identity) and exposes one
//! `#[tool]` per operation. Every call runs through `call_tool`, which
//! captures client info on first contact, enforces the per-RPC
//! deadline, refreshes the agent binding, and updates the status cache
//! best-effort.

pub mod envelope;
pub mod requests;
pub mod tools;

use crate::agent;
use crate::config::CompactionConfig;
use crate::embeddings::{EmbeddingPipeline, SharedStorage};
use crate::error::Result;
use crate::model::Session;
use crate::server::envelope::{respond, Envelope};
use crate::server::requests::*;
use crate::sync::SyncWorker;
use rmcp::{
    handler::server::{router::tool::ToolRouter, tool::ToolCallContext, wrapper::Parameters},
    model::{
        CallToolRequestParam, CallToolResult, ListToolsResult, PaginatedRequestParam,
        ServerCapabilities, ServerInfo,
    },
    service::{RequestContext, RoleServer},
    tool, tool_router, ErrorData, ServerHandler,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Per-RPC deadline.
const RPC_DEADLINE: Duration = Duration::from_secs(30);

/// Per-connection agent state.
///
/// The provider comes from the RPC handshake; the agent identity is
/// cached on the first `session_start` so it stays stable when the
/// agent moves between monorepo paths.
#[derive(Debug, Default)]
pub struct ConnectionState {
    pub provider: Option<String>,
    pub agent_id: Option<String>,
}

/// MCP server state.
#[derive(Clone)]
pub struct SaveContextServer {
    pub storage: SharedStorage,
    pub pipeline: EmbeddingPipeline,
    pub sync: Arc<SyncWorker>,
    pub compaction: CompactionConfig,
    pub connection: Arc<RwLock<ConnectionState>>,
    tool_router: ToolRouter<Self>,
}

impl SaveContextServer {
    /// Assemble the server around its collaborators.
    #[must_use]
    pub fn new(
        storage: SharedStorage,
        pipeline: EmbeddingPipeline,
        sync: Arc<SyncWorker>,
        compaction: CompactionConfig,
    ) -> Self {
        Self {
            storage,
            pipeline,
            sync,
            compaction,
            connection: Arc::new(RwLock::new(ConnectionState::default())),
            tool_router: Self::tool_router(),
        }
    }

    /// Normalized client provider for this connection.
    pub async fn provider_name(&self) -> String {
        self.connection
            .read()
            .await
            .provider
            .clone()
            .unwrap_or_else(|| "unknown".to_string())
    }

    /// The agent identity cached on this connection, if any.
    pub async fn cached_agent_id(&self) -> Option<String> {
        self.connection.read().await.agent_id.clone()
    }

    /// The effective agent identity: cached, else a global fallback
    /// keyed by provider.
    pub async fn agent_id(&self) -> String {
        if let Some(id) = self.cached_agent_id().await {
            return id;
        }
        format!("global-{}", self.provider_name().await)
    }

    /// Cache the agent identity for this connection.
    pub async fn set_agent_id(&self, agent_id: &str) {
        self.connection.write().await.agent_id = Some(agent_id.to_string());
    }

    /// The agent's current active session (required by session-scoped
    /// tools).
    pub async fn require_session(&self) -> Result<Session> {
        let agent_id = self.agent_id().await;
        let storage = self.storage.lock().await;
        agent::require_active_session(&storage, &agent_id)
    }

    /// The agent's current session id, when one is active.
    pub async fn current_session_id(&self) -> Option<String> {
        self.require_session().await.ok().map(|s| s.id)
    }

    /// The current session's primary project path, when one is active.
    pub async fn current_session_project(&self) -> Option<String> {
        self.require_session().await.ok().and_then(|s| s.project_path)
    }

    /// Resolve the project scope for project-scoped tools: an explicit
    /// path wins, else the current session's primary path.
    ///
    /// Returns `(project_path, session_id)`.
    pub async fn resolve_project(
        &self,
        explicit: Option<String>,
    ) -> Result<(String, Option<String>)> {
        if let Some(path) = explicit {
            let session_id = self.current_session_id().await;
            return Ok((crate::config::canonical_project_path(&path), session_id));
        }

        let session = self.require_session().await?;
        let path = session.project_path.clone().ok_or_else(|| {
            crate::error::Error::InvalidArgument(
                "current session has no project path; pass project_path explicitly".to_string(),
            )
        })?;
        Ok((path, Some(session.id)))
    }

    /// Queue the session for upload when a remote is configured.
    /// Best-effort: failures log and move on.
    pub async fn enqueue_session_sync(&self, session_id: &str) {
        if !self.sync.remote_configured() {
            return;
        }

        match crate::sync::build_session_payload(&self.storage, session_id).await {
            Ok(payload) => match serde_json::to_value(&payload) {
                Ok(value) => {
                    let queue = self.sync.queue();
                    let mut guard = queue.lock().await;
                    if let Err(e) = guard.enqueue(value) {
                        warn!(session = session_id, error = %e, "Failed to enqueue sync payload");
                    }
                }
                Err(e) => warn!(session = session_id, error = %e, "Failed to serialize sync payload"),
            },
            Err(e) => warn!(session = session_id, error = %e, "Failed to build sync payload"),
        }
    }

    /// Refresh the agent binding and the terminal status cache after a
    /// tool call. Best-effort by design.
    async fn after_tool_call(&self) {
        let agent_id = self.agent_id().await;
        let provider = self.provider_name().await;

        let session = {
            let mut storage = self.storage.lock().await;
            if let Err(e) = storage.touch_agent(&agent_id, &provider) {
                debug!(error = %e, "Failed to touch agent binding");
            }
            storage.current_session_for_agent(&agent_id).ok().flatten()
        };

        if let Some(session) = session {
            let item_count = {
                let storage = self.storage.lock().await;
                storage
                    .list_context_items(&session.id, None, None, None, Some(10_000))
                    .map(|items| items.len() as u32)
                    .ok()
            };
            crate::config::bind_session_to_terminal(
                &session.id,
                &session.name,
                session.project_path.as_deref().unwrap_or(""),
                session.status.as_str(),
                Some(provider.as_str()),
                item_count,
            );
        }
    }

    /// The handshake instructions, parameterized by compaction mode.
    #[must_use]
    pub fn instructions(&self) -> String {
        let threshold = self.compaction.threshold;
        let guidance = match self.compaction.mode {
            crate::config::CompactionMode::Auto => format!(
                "When your context window reaches {threshold}% full, call \
                 context_prepare_compaction immediately, then compact your conversation and \
                 restore from the returned checkpoint."
            ),
            crate::config::CompactionMode::Remind => format!(
                "When your context window reaches {threshold}% full, remind the user that \
                 compaction is due and offer to call context_prepare_compaction before \
                 continuing."
            ),
            crate::config::CompactionMode::Manual => {
                "Call context_prepare_compaction only when the user asks you to compact."
                    .to_string()
            }
        };

        format!(
            "SaveContext persists working memory for AI coding agents: sessions, context \
             items, checkpoints, issues, plans, and project memory shared across agents.\n\
             Start every conversation with session_start. Save decisions, reminders, and \
             progress as you work; they survive the conversation.\n{guidance}"
        )
    }
}

#[tool_router]
impl SaveContextServer {
    // ── Sessions ─────────────────────────────────────────────

    #[tool(description = "Start or resume a session for this agent. Resumes the agent's active session when one exists, attaching the current project path.")]
    async fn session_start(
        &self,
        Parameters(req): Parameters<SessionStartRequest>,
    ) -> std::result::Result<String, String> {
        respond(tools::session::start(self, req).await)
    }

    #[tool(description = "Current session status: items, checkpoints, attached paths.")]
    async fn session_status(
        &self,
        Parameters(req): Parameters<SessionStatusRequest>,
    ) -> std::result::Result<String, String> {
        respond(tools::session::status(self, req).await)
    }

    #[tool(description = "Rename a session. Requires the current name for verification.")]
    async fn session_rename(
        &self,
        Parameters(req): Parameters<SessionRenameRequest>,
    ) -> std::result::Result<String, String> {
        respond(tools::session::rename(self, req).await)
    }

    #[tool(description = "Pause a session.")]
    async fn session_pause(
        &self,
        Parameters(req): Parameters<SessionPauseRequest>,
    ) -> std::result::Result<String, String> {
        respond(tools::session::pause(self, req).await)
    }

    #[tool(description = "Resume a paused session. Requires the session name for verification.")]
    async fn session_resume(
        &self,
        Parameters(req): Parameters<SessionResumeRequest>,
    ) -> std::result::Result<String, String> {
        respond(tools::session::resume(self, req).await)
    }

    #[tool(description = "Switch to another session atomically: pauses the current one, activates the target, rebinds this agent.")]
    async fn session_switch(
        &self,
        Parameters(req): Parameters<SessionSwitchRequest>,
    ) -> std::result::Result<String, String> {
        respond(tools::session::switch(self, req).await)
    }

    #[tool(description = "End (complete) a session.")]
    async fn session_end(
        &self,
        Parameters(req): Parameters<SessionEndRequest>,
    ) -> std::result::Result<String, String> {
        respond(tools::session::end(self, req).await)
    }

    #[tool(description = "Delete a session and its data. The session must not be active; requires the session name for verification.")]
    async fn session_delete(
        &self,
        Parameters(req): Parameters<SessionDeleteRequest>,
    ) -> std::result::Result<String, String> {
        respond(tools::session::delete(self, req).await)
    }

    #[tool(description = "List sessions with optional project/status filters and name search.")]
    async fn session_list(
        &self,
        Parameters(req): Parameters<SessionListRequest>,
    ) -> std::result::Result<String, String> {
        respond(tools::session::list(self, req).await)
    }

    #[tool(description = "Attach an additional project path to a session (monorepo support).")]
    async fn session_add_path(
        &self,
        Parameters(req): Parameters<SessionPathRequest>,
    ) -> std::result::Result<String, String> {
        respond(tools::session::add_path(self, req).await)
    }

    #[tool(description = "Detach a project path from a session. The last path cannot be removed.")]
    async fn session_remove_path(
        &self,
        Parameters(req): Parameters<SessionPathRequest>,
    ) -> std::result::Result<String, String> {
        respond(tools::session::remove_path(self, req).await)
    }

    // ── Context items ────────────────────────────────────────

    #[tool(description = "Save a context item (decision, reminder, progress, note) under a key. Same key overwrites.")]
    async fn context_save(
        &self,
        Parameters(req): Parameters<ContextSaveRequest>,
    ) -> std::result::Result<String, String> {
        respond(tools::context::save(self, req).await)
    }

    #[tool(description = "Get a context item by exact key.")]
    async fn context_get(
        &self,
        Parameters(req): Parameters<ContextGetRequest>,
    ) -> std::result::Result<String, String> {
        respond(tools::context::get(self, req).await)
    }

    #[tool(description = "Update fields of an existing context item.")]
    async fn context_update(
        &self,
        Parameters(req): Parameters<ContextUpdateRequest>,
    ) -> std::result::Result<String, String> {
        respond(tools::context::update(self, req).await)
    }

    #[tool(description = "Delete a context item by key.")]
    async fn context_delete(
        &self,
        Parameters(req): Parameters<ContextDeleteRequest>,
    ) -> std::result::Result<String, String> {
        respond(tools::context::delete(self, req).await)
    }

    #[tool(description = "List context items in the current session with optional filters.")]
    async fn context_list(
        &self,
        Parameters(req): Parameters<ContextListRequest>,
    ) -> std::result::Result<String, String> {
        respond(tools::context::list(self, req).await)
    }

    #[tool(description = "Add or remove tags on items selected by keys or a glob pattern.")]
    async fn context_tag(
        &self,
        Parameters(req): Parameters<ContextTagRequest>,
    ) -> std::result::Result<String, String> {
        respond(tools::context::tag(self, req).await)
    }

    #[tool(description = "Search context semantically (keyword fallback when no embedding provider is available).")]
    async fn context_search(
        &self,
        Parameters(req): Parameters<ContextSearchRequest>,
    ) -> std::result::Result<String, String> {
        respond(tools::context::search(self, req).await)
    }

    #[tool(description = "Prepare for conversation compaction: checkpoint the session, collect critical context, and return a restorable summary.")]
    async fn context_prepare_compaction(
        &self,
        Parameters(req): Parameters<PrepareCompactionRequest>,
    ) -> std::result::Result<String, String> {
        respond(tools::context::prepare_compaction(self, req).await)
    }

    // ── Checkpoints ──────────────────────────────────────────

    #[tool(description = "Create a checkpoint of the current session, optionally filtered by tags, key globs, or categories.")]
    async fn checkpoint_create(
        &self,
        Parameters(req): Parameters<CheckpointCreateRequest>,
    ) -> std::result::Result<String, String> {
        respond(tools::checkpoint::create(self, req).await)
    }

    #[tool(description = "Restore checkpoint items into a session. Same-key items are overwritten. Requires the checkpoint name for verification.")]
    async fn checkpoint_restore(
        &self,
        Parameters(req): Parameters<CheckpointRestoreRequest>,
    ) -> std::result::Result<String, String> {
        respond(tools::checkpoint::restore(self, req).await)
    }

    #[tool(description = "List checkpoints of a session (lightweight rows).")]
    async fn checkpoint_list(
        &self,
        Parameters(req): Parameters<CheckpointListRequest>,
    ) -> std::result::Result<String, String> {
        respond(tools::checkpoint::list(self, req).await)
    }

    #[tool(description = "Get a checkpoint with a preview of its highest-priority items.")]
    async fn checkpoint_get(
        &self,
        Parameters(req): Parameters<CheckpointGetRequest>,
    ) -> std::result::Result<String, String> {
        respond(tools::checkpoint::get(self, req).await)
    }

    #[tool(description = "Delete a checkpoint. Requires the checkpoint name for verification.")]
    async fn checkpoint_delete(
        &self,
        Parameters(req): Parameters<CheckpointDeleteRequest>,
    ) -> std::result::Result<String, String> {
        respond(tools::checkpoint::delete(self, req).await)
    }

    #[tool(description = "Split a checkpoint into new checkpoints by tag/category filters. Each part needs include_tags or include_categories.")]
    async fn checkpoint_split(
        &self,
        Parameters(req): Parameters<CheckpointSplitRequest>,
    ) -> std::result::Result<String, String> {
        respond(tools::checkpoint::split(self, req).await)
    }

    #[tool(description = "Add current-session items to a checkpoint by key.")]
    async fn checkpoint_add_items(
        &self,
        Parameters(req): Parameters<CheckpointItemsRequest>,
    ) -> std::result::Result<String, String> {
        respond(tools::checkpoint::add_items(self, req).await)
    }

    #[tool(description = "Remove items from a checkpoint by key.")]
    async fn checkpoint_remove_items(
        &self,
        Parameters(req): Parameters<CheckpointItemsRequest>,
    ) -> std::result::Result<String, String> {
        respond(tools::checkpoint::remove_items(self, req).await)
    }

    // ── Issues ───────────────────────────────────────────────

    #[tool(description = "Create an issue. Short IDs like SC-42 are allocated per project.")]
    async fn issue_create(
        &self,
        Parameters(req): Parameters<IssueCreateRequest>,
    ) -> std::result::Result<String, String> {
        respond(tools::issue::create(self, req).await)
    }

    #[tool(description = "Update an issue. Requires the current title for verification.")]
    async fn issue_update(
        &self,
        Parameters(req): Parameters<IssueUpdateRequest>,
    ) -> std::result::Result<String, String> {
        respond(tools::issue::update(self, req).await)
    }

    #[tool(description = "List issues with rich filters (status, priority range, type, labels, parent, plan, subtasks, dependencies) and sorting.")]
    async fn issue_list(
        &self,
        Parameters(req): Parameters<IssueListRequest>,
    ) -> std::result::Result<String, String> {
        respond(tools::issue::list(self, req).await)
    }

    #[tool(description = "Complete an issue: closes it, unblocks dependents whose last blocker it was, and auto-completes the plan when this was its last open issue.")]
    async fn issue_complete(
        &self,
        Parameters(req): Parameters<IssueCompleteRequest>,
    ) -> std::result::Result<String, String> {
        respond(tools::issue::complete(self, req).await)
    }

    #[tool(description = "Delete an issue and its dependency edges. Requires the title for verification.")]
    async fn issue_delete(
        &self,
        Parameters(req): Parameters<IssueDeleteRequest>,
    ) -> std::result::Result<String, String> {
        respond(tools::issue::delete(self, req).await)
    }

    #[tool(description = "Add a dependency between issues. Cycles in the blocks graph are rejected.")]
    async fn issue_dependency_add(
        &self,
        Parameters(req): Parameters<IssueDependencyRequest>,
    ) -> std::result::Result<String, String> {
        respond(tools::issue::dependency_add(self, req).await)
    }

    #[tool(description = "Remove a dependency between issues.")]
    async fn issue_dependency_remove(
        &self,
        Parameters(req): Parameters<IssueDependencyRequest>,
    ) -> std::result::Result<String, String> {
        respond(tools::issue::dependency_remove(self, req).await)
    }

    #[tool(description = "Add or remove labels on an issue.")]
    async fn issue_labels(
        &self,
        Parameters(req): Parameters<IssueLabelsRequest>,
    ) -> std::result::Result<String, String> {
        respond(tools::issue::labels(self, req).await)
    }

    #[tool(description = "Claim an issue for this agent (assign + in_progress).")]
    async fn issue_claim(
        &self,
        Parameters(req): Parameters<IssueClaimRequest>,
    ) -> std::result::Result<String, String> {
        respond(tools::issue::claim(self, req).await)
    }

    #[tool(description = "Release a claimed issue (unassign + open).")]
    async fn issue_release(
        &self,
        Parameters(req): Parameters<IssueClaimRequest>,
    ) -> std::result::Result<String, String> {
        respond(tools::issue::release(self, req).await)
    }

    #[tool(description = "Issues ready to work on: open, unassigned, no open blockers, priority-ordered.")]
    async fn get_ready(
        &self,
        Parameters(req): Parameters<GetReadyRequest>,
    ) -> std::result::Result<String, String> {
        respond(tools::issue::get_ready(self, req).await)
    }

    #[tool(description = "Atomically claim the next block of ready issues for this agent. Safe under concurrent agents.")]
    async fn get_next_block(
        &self,
        Parameters(req): Parameters<GetNextBlockRequest>,
    ) -> std::result::Result<String, String> {
        respond(tools::issue::get_next_block(self, req).await)
    }

    #[tool(description = "Create a batch of issues with dependency edges in one transaction. Parents may reference batch members as $N.")]
    async fn issue_create_batch(
        &self,
        Parameters(req): Parameters<IssueCreateBatchRequest>,
    ) -> std::result::Result<String, String> {
        respond(tools::issue::create_batch(self, req).await)
    }

    // ── Memory ───────────────────────────────────────────────

    #[tool(description = "Save project memory (command, config, or note) shared across sessions.")]
    async fn memory_save(
        &self,
        Parameters(req): Parameters<MemorySaveRequest>,
    ) -> std::result::Result<String, String> {
        respond(tools::memory::save(self, req).await)
    }

    #[tool(description = "Get a project memory entry by key.")]
    async fn memory_get(
        &self,
        Parameters(req): Parameters<MemoryGetRequest>,
    ) -> std::result::Result<String, String> {
        respond(tools::memory::get(self, req).await)
    }

    #[tool(description = "List project memory, optionally by category.")]
    async fn memory_list(
        &self,
        Parameters(req): Parameters<MemoryListRequest>,
    ) -> std::result::Result<String, String> {
        respond(tools::memory::list(self, req).await)
    }

    #[tool(description = "Delete a project memory entry.")]
    async fn memory_delete(
        &self,
        Parameters(req): Parameters<MemoryDeleteRequest>,
    ) -> std::result::Result<String, String> {
        respond(tools::memory::delete(self, req).await)
    }

    // ── Plans ────────────────────────────────────────────────

    #[tool(description = "Create a plan (PRD/spec) for a project.")]
    async fn plan_create(
        &self,
        Parameters(req): Parameters<PlanCreateRequest>,
    ) -> std::result::Result<String, String> {
        respond(tools::plan::create(self, req).await)
    }

    #[tool(description = "Get a plan with its linked issues.")]
    async fn plan_get(
        &self,
        Parameters(req): Parameters<PlanGetRequest>,
    ) -> std::result::Result<String, String> {
        respond(tools::plan::get(self, req).await)
    }

    #[tool(description = "List plans for a project.")]
    async fn plan_list(
        &self,
        Parameters(req): Parameters<PlanListRequest>,
    ) -> std::result::Result<String, String> {
        respond(tools::plan::list(self, req).await)
    }

    #[tool(description = "Update a plan. Moving it to another project moves its linked issues too.")]
    async fn plan_update(
        &self,
        Parameters(req): Parameters<PlanUpdateRequest>,
    ) -> std::result::Result<String, String> {
        respond(tools::plan::update(self, req).await)
    }

    // ── Projects ─────────────────────────────────────────────

    #[tool(description = "Register a project with its issue prefix.")]
    async fn project_create(
        &self,
        Parameters(req): Parameters<ProjectCreateRequest>,
    ) -> std::result::Result<String, String> {
        respond(tools::project::create(self, req).await)
    }

    #[tool(description = "Get a project by ID or path.")]
    async fn project_get(
        &self,
        Parameters(req): Parameters<ProjectGetRequest>,
    ) -> std::result::Result<String, String> {
        respond(tools::project::get(self, req).await)
    }

    #[tool(description = "List registered projects.")]
    async fn project_list(
        &self,
        Parameters(req): Parameters<ProjectListRequest>,
    ) -> std::result::Result<String, String> {
        respond(tools::project::list(self, req).await)
    }

    #[tool(description = "Update project metadata.")]
    async fn project_update(
        &self,
        Parameters(req): Parameters<ProjectUpdateRequest>,
    ) -> std::result::Result<String, String> {
        respond(tools::project::update(self, req).await)
    }

    #[tool(description = "Delete a project: issues, plans, and memory are removed; sessions are unlinked. Requires the project name for verification.")]
    async fn project_delete(
        &self,
        Parameters(req): Parameters<ProjectDeleteRequest>,
    ) -> std::result::Result<String, String> {
        respond(tools::project::delete(self, req).await)
    }

    // ── Sync & stats ─────────────────────────────────────────

    #[tool(description = "Queue a session for upload to the configured remote.")]
    async fn save_session(
        &self,
        Parameters(req): Parameters<SaveSessionRequest>,
    ) -> std::result::Result<String, String> {
        respond(tools::sync::save_session(self, req).await)
    }

    #[tool(description = "Trigger an immediate sync queue drain.")]
    async fn sync_now(&self) -> std::result::Result<String, String> {
        respond(tools::sync::sync_now(self).await)
    }

    #[tool(description = "Sync queue status: queued count, last error, re-auth flag.")]
    async fn sync_status(&self) -> std::result::Result<String, String> {
        respond(tools::sync::sync_status(self).await)
    }

    #[tool(description = "Store statistics, scoped to a project or global.")]
    async fn get_stats(
        &self,
        Parameters(req): Parameters<GetStatsRequest>,
    ) -> std::result::Result<String, String> {
        respond(tools::sync::get_stats(self, req).await)
    }
}

impl ServerHandler for SaveContextServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: Default::default(),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: rmcp::model::Implementation {
                name: "savecontext".into(),
                title: Some("SaveContext - persistent memory for AI coding agents".into()),
                version: env!("CARGO_PKG_VERSION").into(),
                icons: None,
                website_url: None,
            },
            instructions: Some(self.instructions()),
        }
    }

    fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> impl std::future::Future<Output = std::result::Result<ListToolsResult, ErrorData>> + Send + '_
    {
        std::future::ready(Ok(ListToolsResult {
            tools: self.tool_router.list_all(),
            next_cursor: None,
            meta: None,
        }))
    }

    #[allow(clippy::manual_async_fn)]
    fn call_tool(
        &self,
        request: CallToolRequestParam,
        context: RequestContext<RoleServer>,
    ) -> impl std::future::Future<Output = std::result::Result<CallToolResult, ErrorData>> + Send + '_
    {
        async move {
            let tool_name = request.name.to_string();

            // Capture client info on first contact; the normalized
            // provider feeds agent-id derivation.
            {
                let needs_provider = self.connection.read().await.provider.is_none();
                if needs_provider {
                    if let Some(info) = context.peer.peer_info() {
                        let provider = agent::normalize_provider(&info.client_info.name);
                        debug!(client = %info.client_info.name, provider = %provider, "Captured client info");
                        self.connection.write().await.provider = Some(provider);
                    }
                }
            }

            let ctx = ToolCallContext::new(self, request, context);
            let result = match tokio::time::timeout(RPC_DEADLINE, self.tool_router.call(ctx)).await
            {
                Ok(result) => result,
                Err(_) => {
                    warn!(tool = %tool_name, "Tool call exceeded the deadline");
                    let envelope = Envelope::err_code(
                        "DEADLINE_EXCEEDED",
                        "unavailable",
                        format!("{tool_name} did not finish within {}s", RPC_DEADLINE.as_secs()),
                    );
                    return Ok(CallToolResult {
                        content: vec![rmcp::model::Content::text(envelope.to_json_string())],
                        structured_content: None,
                        is_error: Some(true),
                        meta: None,
                    });
                }
            };

            self.after_tool_call().await;

            result
        }
    }
}

/// Run the MCP server over stdio until the client disconnects.
///
/// # Errors
///
/// Returns an error if the transport fails.
pub async fn serve_stdio(server: SaveContextServer) -> anyhow::Result<()> {
    let transport = rmcp::transport::io::stdio();
    let service = rmcp::serve_server(server, transport).await?;
    service.waiting().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SqliteStorage;
    use tokio::sync::{watch, Mutex};

    fn test_server() -> SaveContextServer {
        let storage: SharedStorage = Arc::new(Mutex::new(SqliteStorage::open_memory().unwrap()));
        let (_tx, rx) = watch::channel(false);
        let pipeline = EmbeddingPipeline::new(Arc::clone(&storage), rx);

        let dir = std::env::temp_dir().join(format!("scs-test-{}", crate::new_id("t")));
        let queue = crate::sync::SyncQueue::load(dir.join("sync-queue.json"));
        let credentials = crate::sync::CredentialStore::File(crate::sync::FileBackend::new(
            dir.join("credentials.json"),
        ));
        let sync = Arc::new(SyncWorker::new(queue, None, credentials));

        SaveContextServer::new(storage, pipeline, sync, CompactionConfig::default())
    }

    #[tokio::test]
    async fn test_agent_id_falls_back_to_global() {
        let server = test_server();
        assert_eq!(server.agent_id().await, "global-unknown");

        server.connection.write().await.provider = Some("claude-code".to_string());
        assert_eq!(server.agent_id().await, "global-claude-code");

        server.set_agent_id("app-main-claude-code").await;
        assert_eq!(server.agent_id().await, "app-main-claude-code");
    }

    #[test]
    fn test_instructions_parameterized_by_mode() {
        let mut server = test_server();
        server.compaction = CompactionConfig {
            mode: crate::config::CompactionMode::Auto,
            threshold: 70,
        };
        let text = server.instructions();
        assert!(text.contains("70%"));
        assert!(text.contains("context_prepare_compaction"));

        server.compaction.mode = crate::config::CompactionMode::Manual;
        assert!(server.instructions().contains("only when the user asks"));
    }

    #[tokio::test]
    async fn test_require_session_without_binding_fails() {
        let server = test_server();
        let err = server.require_session().await.unwrap_err();
        assert!(matches!(err, crate::error::Error::NoActiveSession { .. }));
    }
}
