//! End-to-end scenarios against the state engine.
//!
//! These mirror the multi-agent flows the server exists for: concurrent
//! ready-queue claiming, cascade unblocking with plan completion,
//! checkpoint splitting, vector dimension changes, monorepo session
//! resume, and sync queue durability.

use scs::agent::{start_session, SessionStartArgs};
use scs::model::{Category, DependencyType, IssueStatus, IssueType, PlanStatus, Priority, Project, SessionStatus};
use scs::storage::{CheckpointFilters, IssueFilters, IssueSort, SplitPart, SqliteStorage, TagAction};
use scs::sync::{SyncQueue, BACKOFF_BASE_MS, MAX_RETRIES};

fn storage_with_project(path: &str, name: &str) -> SqliteStorage {
    let mut storage = SqliteStorage::open_memory().unwrap();
    let project = Project::new(path.to_string(), name.to_string());
    storage.create_project(&project, "setup").unwrap();
    storage
}

fn create_issue(
    storage: &mut SqliteStorage,
    path: &str,
    title: &str,
    priority: i32,
    issue_type: IssueType,
    parent: Option<&str>,
    plan: Option<&str>,
) -> scs::model::Issue {
    storage
        .create_issue(
            path, title, None, None, issue_type, priority, parent, plan, &[], None, "setup",
        )
        .unwrap()
}

/// Scenario 1: two agents pull from the ready queue concurrently; each
/// gets a distinct issue and the blocked one stays out of reach.
#[test]
fn multi_agent_concurrent_ready_queue() {
    let mut storage = storage_with_project("/p", "SC");

    let sc1 = create_issue(&mut storage, "/p", "one", 3, IssueType::Task, None, None);
    let sc2 = create_issue(&mut storage, "/p", "two", 2, IssueType::Task, None, None);
    let sc3 = create_issue(&mut storage, "/p", "three", 4, IssueType::Task, None, None);
    assert_eq!((sc1.short_id.as_str(), sc2.short_id.as_str(), sc3.short_id.as_str()),
               ("SC-1", "SC-2", "SC-3"));

    // SC-2 blocks SC-1
    storage
        .add_issue_dependency(&sc1.id, &sc2.id, DependencyType::Blocks, "setup")
        .unwrap();

    // Agent A claims first: gets SC-3 (highest priority ready issue)
    let block_a = storage.get_next_issue_block("/p", 1, "agent-a").unwrap();
    assert_eq!(block_a.len(), 1);
    assert_eq!(block_a[0].short_id, "SC-3");
    assert_eq!(block_a[0].assigned_to_agent.as_deref(), Some("agent-a"));

    // Agent B claims next: gets SC-2 (SC-1 is blocked, SC-3 is taken)
    let block_b = storage.get_next_issue_block("/p", 1, "agent-b").unwrap();
    assert_eq!(block_b.len(), 1);
    assert_eq!(block_b[0].short_id, "SC-2");
    assert_eq!(block_b[0].assigned_to_agent.as_deref(), Some("agent-b"));

    // Nothing ready remains: SC-1 still waits on SC-2
    assert!(storage.get_ready_issues("/p", 10).unwrap().is_empty());
}

/// Scenario 2: completing issues cascades unblocks, and closing the
/// last open issue under a plan completes the plan.
#[test]
fn cascade_unblock_and_plan_complete() {
    let mut storage = storage_with_project("/p", "SC");

    let plan = storage
        .create_plan(
            &scs::model::Plan::new("/p".to_string(), "PL-1".to_string()),
            "setup",
        )
        .unwrap();
    storage
        .update_plan(&plan.id, None, None, Some(PlanStatus::Active), None, None, "setup")
        .unwrap();

    let epic = create_issue(&mut storage, "/p", "epic", 3, IssueType::Epic, None, Some(plan.id.as_str()));
    let sub_a = create_issue(&mut storage, "/p", "sub-a", 2, IssueType::Task, Some(epic.id.as_str()), None);
    let sub_b = create_issue(&mut storage, "/p", "sub-b", 2, IssueType::Task, Some(epic.id.as_str()), None);

    // sub-a blocks sub-b; sub-b marked blocked
    storage
        .add_issue_dependency(&sub_b.id, &sub_a.id, DependencyType::Blocks, "setup")
        .unwrap();
    storage
        .update_issue(
            &sub_b.id, "sub-b", None, None, None,
            Some(IssueStatus::Blocked), None, None, None, None, "setup",
        )
        .unwrap();

    // Complete sub-a: sub-b transitions blocked -> open
    let (_, unblocked, plan_done) = storage.complete_issue(&sub_a.id, None, "agent").unwrap();
    assert_eq!(unblocked, vec![sub_b.short_id.clone()]);
    assert!(plan_done.is_none());
    assert_eq!(
        storage.get_issue(&sub_b.id).unwrap().unwrap().status,
        IssueStatus::Open
    );

    // Complete sub-b: epic still open, plan still active
    let (_, _, plan_done) = storage.complete_issue(&sub_b.id, None, "agent").unwrap();
    assert!(plan_done.is_none());
    assert_eq!(
        storage.get_plan(&plan.id).unwrap().unwrap().status,
        PlanStatus::Active
    );

    // Complete the epic: last open issue under the plan -> plan completed
    let (_, _, plan_done) = storage.complete_issue(&epic.id, None, "agent").unwrap();
    assert_eq!(plan_done.as_deref(), Some(plan.id.as_str()));
    let plan = storage.get_plan(&plan.id).unwrap().unwrap();
    assert_eq!(plan.status, PlanStatus::Completed);
    assert!(plan.completed_at.is_some());
}

/// Scenario 3: a full checkpoint splits cleanly by tag with no
/// warnings.
#[test]
fn checkpoint_split_by_tag() {
    let mut storage = SqliteStorage::open_memory().unwrap();
    let session = scs::model::Session::new("S".to_string(), Some("/p".to_string()), "general".to_string());
    storage.create_session(&session, "agent").unwrap();

    for i in 0..4 {
        storage
            .save_context_item(
                &session.id, &format!("auth-{i}"), "v",
                Category::Note, Priority::Normal, "general", &[], "agent",
            )
            .unwrap();
    }
    for i in 0..6 {
        storage
            .save_context_item(
                &session.id, &format!("ui-{i}"), "v",
                Category::Note, Priority::Normal, "general", &[], "agent",
            )
            .unwrap();
    }

    // Tag by pattern, like the tag tool does
    let tagged = storage
        .tag_context_items(&session.id, None, Some("auth-*"), &["auth".to_string()], TagAction::Add, "agent")
        .unwrap();
    assert_eq!(tagged, 4);
    storage
        .tag_context_items(&session.id, None, Some("ui-*"), &["ui".to_string()], TagAction::Add, "agent")
        .unwrap();

    let source = storage
        .create_checkpoint(&session.id, "v1", None, None, None, &CheckpointFilters::default(), "agent")
        .unwrap();
    assert_eq!(source.item_count, 10);

    let parts = vec![
        SplitPart {
            name: "auth".to_string(),
            description: None,
            include_tags: vec!["auth".to_string()],
            include_categories: vec![],
        },
        SplitPart {
            name: "ui".to_string(),
            description: None,
            include_tags: vec!["ui".to_string()],
            include_categories: vec![],
        },
    ];

    let result = storage.split_checkpoint(&source.id, "v1", &parts, "agent").unwrap();
    assert!(result.warnings.is_empty());
    assert_eq!(result.checkpoints[0].item_count, 4);
    assert_eq!(result.checkpoints[1].item_count, 6);
}

/// Scenario 4: switching to a provider with another dimensionality
/// recreates the vector table and resets every item for re-embedding.
#[test]
fn embedding_dimension_change_resets_items() {
    let mut storage = SqliteStorage::open_memory().unwrap();
    let session = scs::model::Session::new("S".to_string(), Some("/p".to_string()), "general".to_string());
    storage.create_session(&session, "agent").unwrap();

    storage.ensure_vector_dim(384, "huggingface").unwrap();

    // 50 items embedded at 384 dimensions
    let fake_vec: Vec<f32> = (0..384).map(|i| i as f32 / 384.0).collect();
    for i in 0..50 {
        let item = storage
            .save_context_item(
                &session.id, &format!("k{i}"), "v",
                Category::Note, Priority::Normal, "general", &[], "agent",
            )
            .unwrap();
        storage
            .upsert_chunk(&item.id, 0, "v", &fake_vec, "huggingface", "all-MiniLM-L6-v2")
            .unwrap();
        storage
            .mark_embedded(&item.id, "huggingface", "all-MiniLM-L6-v2", 1)
            .unwrap();
    }
    assert_eq!(storage.vector_stats(None).unwrap().ok, 50);

    // Switch to a 768-dimension provider
    let recreated = storage.ensure_vector_dim(768, "ollama").unwrap();
    assert!(recreated);

    let stats = storage.vector_stats(None).unwrap();
    assert_eq!(stats.ok, 0);
    assert_eq!(stats.none, 50);
    assert_eq!(stats.chunks, 0);
    assert_eq!(storage.stored_vector_dim().unwrap(), Some(768));

    // Until backfill completes, the vector table has nothing to offer;
    // a semantic query over it returns no matches (keyword fallback
    // territory for the search layer)
    let query: Vec<f32> = vec![0.5; 768];
    let hits = storage
        .semantic_search(&query, Some(session.id.as_str()), 10, 0.5, None, None, None)
        .unwrap();
    assert!(hits.is_empty());
}

/// Scenario 5: an agent resuming from a new monorepo path attaches the
/// path to its existing session and keeps the session name.
#[test]
fn agent_resume_with_new_path() {
    let mut storage = storage_with_project("/repo/app", "App");
    let dash = Project::new("/repo/dashboard".to_string(), "Dashboard".to_string());
    storage.create_project(&dash, "setup").unwrap();

    let first = start_session(
        &mut storage,
        &SessionStartArgs {
            name: "auth work".to_string(),
            description: None,
            project_path: "/repo/app".to_string(),
            branch: Some("main".to_string()),
            channel: None,
            provider: "claude-code".to_string(),
            agent_id: None,
            force_new: false,
        },
    )
    .unwrap();
    assert!(!first.resumed);

    // Same agent (identity cached on the connection) starts from the
    // dashboard path with a different name
    let resumed = start_session(
        &mut storage,
        &SessionStartArgs {
            name: "whatever".to_string(),
            description: None,
            project_path: "/repo/dashboard".to_string(),
            branch: Some("main".to_string()),
            channel: None,
            provider: "claude-code".to_string(),
            agent_id: Some(first.agent_id.clone()),
            force_new: false,
        },
    )
    .unwrap();

    assert!(resumed.resumed);
    assert!(resumed.path_added);
    assert_eq!(resumed.session.id, first.session.id);
    assert_eq!(resumed.session.name, "auth work");
    assert!(resumed.warning.unwrap().contains("whatever"));

    let paths = storage.get_session_paths(&first.session.id).unwrap();
    assert_eq!(paths, vec!["/repo/app", "/repo/dashboard"]);

    // The session stayed active throughout
    assert_eq!(resumed.session.status, SessionStatus::Active);
}

/// Scenario 6: queue items survive a restart with the same ready set,
/// back off across failures, and the file shrinks to [] once drained.
#[test]
fn sync_queue_offline_then_online() {
    let dir = tempfile::TempDir::new().unwrap();
    let queue_path = dir.path().join("sync-queue.json");

    // Remote unreachable: the payload queues with retries=0 and the
    // first attempt one backoff period out
    let item_id = {
        let mut queue = SyncQueue::load(queue_path.clone());
        let before = scs::now_ms();
        let item = queue.enqueue(serde_json::json!({"session": "sess_1"})).unwrap();
        assert_eq!(item.retries, 0);
        assert!(item.next_retry_at >= before + BACKOFF_BASE_MS);
        item.id
    };

    // Process restart: the same ready set comes back from disk
    let mut queue = SyncQueue::load(queue_path.clone());
    assert_eq!(queue.len(), 1);
    assert!(queue.ready_items(scs::now_ms()).is_empty());

    // Three failed attempts back off without dropping
    for attempt in 1..=3u32 {
        let kept = queue.mark_failed(&item_id, "connect refused").unwrap();
        assert!(kept);
        assert_eq!(queue.items()[0].retries, attempt);
        assert!(attempt < MAX_RETRIES);
    }

    // Remote comes back: the item uploads and the queue empties
    queue.remove(&item_id).unwrap();
    assert!(queue.is_empty());

    let on_disk = std::fs::read_to_string(&queue_path).unwrap();
    let parsed: Vec<serde_json::Value> = serde_json::from_str(&on_disk).unwrap();
    assert!(parsed.is_empty(), "queue file shrank to []");
}

/// Invariant: session_projects always has >= 1 row per session, exactly
/// one primary.
#[test]
fn session_paths_invariant() {
    let mut storage = SqliteStorage::open_memory().unwrap();
    let session = scs::model::Session::new("S".to_string(), Some("/a".to_string()), "general".to_string());
    storage.create_session(&session, "agent").unwrap();
    storage.add_session_path(&session.id, "/b", "agent").unwrap();
    storage.add_session_path(&session.id, "/c", "agent").unwrap();
    storage.remove_session_path(&session.id, "/a", "agent").unwrap();

    let (rows, primaries): (i64, i64) = storage
        .conn()
        .query_row(
            "SELECT COUNT(*), SUM(is_primary) FROM session_projects WHERE session_id = ?1",
            [&session.id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .unwrap();
    assert!(rows >= 1);
    assert_eq!(primaries, 1);
}

/// Round-trip: full checkpoint of one session restores into a fresh
/// session with the same (key, value, category, priority, channel,
/// tags) set.
#[test]
fn checkpoint_full_round_trip() {
    let mut storage = SqliteStorage::open_memory().unwrap();
    let source = scs::model::Session::new("src".to_string(), Some("/p".to_string()), "general".to_string());
    storage.create_session(&source, "agent").unwrap();

    let fixtures = [
        ("k1", "v1", Category::Decision, Priority::High, vec!["auth".to_string()]),
        ("k2", "v2", Category::Reminder, Priority::Normal, vec![]),
        ("k3", "v3", Category::Note, Priority::Low, vec!["ui".to_string(), "polish".to_string()]),
    ];
    for (key, value, category, priority, tags) in &fixtures {
        storage
            .save_context_item(&source.id, key, value, *category, *priority, "general", tags, "agent")
            .unwrap();
    }

    let checkpoint = storage
        .create_checkpoint(&source.id, "full", None, None, None, &CheckpointFilters::default(), "agent")
        .unwrap();

    let target = scs::model::Session::new("dst".to_string(), Some("/p".to_string()), "general".to_string());
    storage.create_session(&target, "agent").unwrap();

    let restored = storage
        .restore_checkpoint(&checkpoint.id, "full", &target.id, None, None, "agent")
        .unwrap();
    assert_eq!(restored, fixtures.len());

    for (key, value, category, priority, tags) in &fixtures {
        let item = storage.get_context_item_by_key(&target.id, key).unwrap().unwrap();
        assert_eq!(&item.value, value);
        assert_eq!(&item.category, category);
        assert_eq!(&item.priority, priority);
        assert_eq!(item.channel, "general");
        assert_eq!(&item.tags, tags);
    }
}

/// Boundary: deleting an issue with dependents cascades its edges; the
/// dependency listing never sees dangling ids.
#[test]
fn issue_delete_cascades_edges() {
    let mut storage = storage_with_project("/p", "SC");
    let a = create_issue(&mut storage, "/p", "a", 2, IssueType::Task, None, None);
    let b = create_issue(&mut storage, "/p", "b", 2, IssueType::Task, None, None);
    storage
        .add_issue_dependency(&b.id, &a.id, DependencyType::Blocks, "x")
        .unwrap();

    storage.delete_issue(&a.id, "x").unwrap();

    let edges: i64 = storage
        .conn()
        .query_row("SELECT COUNT(*) FROM issue_dependencies", [], |row| row.get(0))
        .unwrap();
    assert_eq!(edges, 0);

    // b is ready again (its only blocker edge went with a)
    let ready = storage.get_ready_issues("/p", 10).unwrap();
    assert_eq!(ready.len(), 1);
    assert_eq!(ready[0].id, b.id);
}

/// Sorting and filtering across the issue listing surface.
#[test]
fn issue_list_sorting() {
    let mut storage = storage_with_project("/p", "SC");
    create_issue(&mut storage, "/p", "low", 0, IssueType::Task, None, None);
    create_issue(&mut storage, "/p", "critical", 4, IssueType::Bug, None, None);
    create_issue(&mut storage, "/p", "medium", 2, IssueType::Task, None, None);

    let by_priority = storage
        .list_issues("/p", &IssueFilters::default(), IssueSort::Priority, false, None)
        .unwrap();
    assert_eq!(by_priority[0].title, "critical");
    assert_eq!(by_priority[2].title, "low");

    let ascending = storage
        .list_issues("/p", &IssueFilters::default(), IssueSort::Priority, true, None)
        .unwrap();
    assert_eq!(ascending[0].title, "low");

    let bugs_only = storage
        .list_issues(
            "/p",
            &IssueFilters {
                issue_type: Some(IssueType::Bug),
                ..IssueFilters::default()
            },
            IssueSort::Priority,
            false,
            None,
        )
        .unwrap();
    assert_eq!(bugs_only.len(), 1);
    assert_eq!(bugs_only[0].title, "critical");
}
