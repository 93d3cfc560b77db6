//! Agent identity and session binding.
//!
//! An agent is a stable identity derived from (project path, branch,
//! client tool). This module owns the derivation rules, the client-name
//! normalization table, channel slug derivation, and the session
//! start/resume/attach algorithm.

use crate::error::{Error, Result};
use crate::model::{AgentBinding, Session, SessionStatus};
use crate::storage::SqliteStorage;
use crate::MAX_CHANNEL_LEN;
use std::path::Path;

/// Environment override for agent identity.
pub const AGENT_ID_ENV: &str = "SAVECONTEXT_AGENT_ID";

/// Known AI coding clients and their canonical provider names.
///
/// Matching is case-insensitive on a normalized form of the client name;
/// unknown clients fall through to generic sanitization.
const KNOWN_PROVIDERS: &[(&str, &str)] = &[
    ("claude-code", "claude-code"),
    ("claude code", "claude-code"),
    ("claude", "claude-code"),
    ("cursor", "cursor"),
    ("windsurf", "windsurf"),
    ("codex-cli", "codex-cli"),
    ("codex", "codex-cli"),
    ("gemini-cli", "gemini-cli"),
    ("gemini", "gemini-cli"),
    ("zed", "zed"),
    ("cline", "cline"),
    ("aider", "aider"),
    ("copilot", "copilot"),
    ("github-copilot", "copilot"),
    ("continue", "continue"),
    ("amp", "amp"),
];

/// Normalize an RPC client name to a provider slug.
///
/// Known tools map to their canonical name; anything else is lowercased
/// with whitespace collapsed to hyphens.
#[must_use]
pub fn normalize_provider(client_name: &str) -> String {
    let cleaned = client_name.trim().to_lowercase();

    for (pattern, canonical) in KNOWN_PROVIDERS {
        if cleaned == *pattern || cleaned.starts_with(&format!("{pattern} ")) {
            return (*canonical).to_string();
        }
    }

    let sanitized: String = cleaned
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_' || *c == '.')
        .collect();

    if sanitized.is_empty() {
        "unknown".to_string()
    } else {
        sanitized
    }
}

/// Derive a stable agent identity.
///
/// Priority:
/// 1. `SAVECONTEXT_AGENT_ID` environment override
/// 2. `global-{provider}` when no project path is known
/// 3. `{project_basename}-{branch}-{provider}`
#[must_use]
pub fn derive_agent_id(
    project_path: Option<&str>,
    branch: Option<&str>,
    provider: &str,
) -> String {
    if let Ok(id) = std::env::var(AGENT_ID_ENV) {
        if !id.trim().is_empty() {
            return id;
        }
    }

    let Some(path) = project_path else {
        return format!("global-{provider}");
    };

    let basename = Path::new(path)
        .file_name()
        .map_or_else(|| path.to_string(), |n| n.to_string_lossy().to_string());

    let branch = branch.unwrap_or("main");
    format!("{basename}-{branch}-{provider}")
}

// ── Channel derivation ───────────────────────────────────────

/// Normalize free text into a channel slug.
///
/// Lower-cases, maps non-alphanumerics to `-`, collapses repeats, trims
/// leading/trailing dashes, truncates to 20 chars. Fixed-point: feeding
/// the output back in returns it unchanged.
#[must_use]
pub fn normalize_channel(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut last_dash = true; // suppress leading dash

    for c in input.to_lowercase().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c);
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }

    // Truncate before trimming so a cut can't leave a trailing dash
    slug.truncate(MAX_CHANNEL_LEN);
    let trimmed = slug.trim_matches('-').to_string();

    if trimmed.is_empty() {
        "general".to_string()
    } else {
        trimmed
    }
}

/// Derive a channel from a branch name.
///
/// `main` and `master` map to `general`; other branches slug down.
#[must_use]
pub fn derive_channel_from_branch(branch: &str) -> String {
    match branch {
        "main" | "master" => "general".to_string(),
        other => normalize_channel(other),
    }
}

// ── Session start ────────────────────────────────────────────

/// Arguments to the session start algorithm.
#[derive(Debug, Clone)]
pub struct SessionStartArgs {
    pub name: String,
    pub description: Option<String>,
    /// Canonicalized project path.
    pub project_path: String,
    pub branch: Option<String>,
    pub channel: Option<String>,
    pub provider: String,
    /// Identity cached on the connection from a previous call. The first
    /// derivation sticks, so an agent that moves between monorepo paths
    /// keeps resuming its session.
    pub agent_id: Option<String>,
    pub force_new: bool,
}

/// What `start_session` did.
#[derive(Debug, Clone)]
pub struct SessionStartOutcome {
    pub session: Session,
    pub agent_id: String,
    /// True when an existing active session was resumed.
    pub resumed: bool,
    /// True when the caller's path was newly attached to the session.
    pub path_added: bool,
    /// Set when the caller's requested name was ignored on resume.
    pub warning: Option<String>,
}

/// The session start algorithm.
///
/// 1. Require a registered project at the path (`NotFound` otherwise).
/// 2. Compute the agent identity.
/// 3. `force_new` pauses the agent's current active session, then a
///    fresh session is created. Earlier paused sessions stay paused.
/// 4. Otherwise an active current session is resumed: the caller's path
///    attaches to it and a warning is returned when the requested name
///    differs from the resumed session's name.
/// 5. Else a new session is created with channel =
///    requested | branch-derived | name-derived | "general".
///
/// # Errors
///
/// Returns `NotFound` for an unregistered project, `Validation` for a
/// malformed explicit channel.
pub fn start_session(
    storage: &mut SqliteStorage,
    args: &SessionStartArgs,
) -> Result<SessionStartOutcome> {
    storage.require_project(&args.project_path)?;

    let agent_id = args.agent_id.clone().unwrap_or_else(|| {
        derive_agent_id(Some(args.project_path.as_str()), args.branch.as_deref(), &args.provider)
    });
    let now = crate::now_ms();

    if let Some(ref channel) = args.channel {
        crate::validate::validate_channel(channel)?;
    }

    if !args.force_new {
        if let Some(current) = storage.current_session_for_agent(&agent_id)? {
            if current.status == SessionStatus::Active {
                let path_added =
                    storage.add_session_path(&current.id, &args.project_path, &agent_id)?;

                let warning = (current.name != args.name).then(|| {
                    format!(
                        "resumed existing session '{}'; requested name '{}' was ignored",
                        current.name, args.name
                    )
                });

                storage.upsert_agent_binding(&AgentBinding {
                    agent_id: agent_id.clone(),
                    current_session_id: Some(current.id.clone()),
                    last_project_path: Some(args.project_path.clone()),
                    last_branch: args.branch.clone(),
                    provider: args.provider.clone(),
                    last_active_at: now,
                })?;

                let session = storage.require_session(&current.id)?;
                return Ok(SessionStartOutcome {
                    session,
                    agent_id,
                    resumed: true,
                    path_added,
                    warning,
                });
            }
        }
    } else if let Some(current) = storage.current_session_for_agent(&agent_id)? {
        if current.status == SessionStatus::Active {
            storage.update_session_status(&current.id, SessionStatus::Paused, &agent_id)?;
        }
    }

    let channel = args
        .channel
        .clone()
        .map(|c| normalize_channel(&c))
        .or_else(|| args.branch.as_deref().map(derive_channel_from_branch))
        .unwrap_or_else(|| {
            let from_name = normalize_channel(&args.name);
            if from_name.is_empty() {
                "general".to_string()
            } else {
                from_name
            }
        });

    let session = Session::new(args.name.clone(), Some(args.project_path.clone()), channel)
        .with_branch(args.branch.clone())
        .with_description(args.description.clone());

    storage.create_session(&session, &agent_id)?;
    storage.upsert_agent_binding(&AgentBinding {
        agent_id: agent_id.clone(),
        current_session_id: Some(session.id.clone()),
        last_project_path: Some(args.project_path.clone()),
        last_branch: args.branch.clone(),
        provider: args.provider.clone(),
        last_active_at: now,
    })?;

    Ok(SessionStartOutcome {
        session,
        agent_id,
        resumed: false,
        path_added: false,
        warning: None,
    })
}

/// Resolve the session an agent must operate on, failing when none is
/// bound or the bound session is not active.
pub fn require_active_session(storage: &SqliteStorage, agent_id: &str) -> Result<Session> {
    let session = storage
        .current_session_for_agent(agent_id)?
        .ok_or_else(|| Error::NoActiveSession {
            agent_id: agent_id.to_string(),
        })?;

    if session.status != SessionStatus::Active {
        return Err(Error::NoActiveSession {
            agent_id: agent_id.to_string(),
        });
    }

    Ok(session)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Project;

    fn setup(path: &str) -> SqliteStorage {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let project = Project::new(path.to_string(), "App".to_string());
        storage.create_project(&project, "test").unwrap();
        storage
    }

    fn args(path: &str, name: &str) -> SessionStartArgs {
        SessionStartArgs {
            name: name.to_string(),
            description: None,
            project_path: path.to_string(),
            branch: Some("main".to_string()),
            channel: None,
            provider: "claude-code".to_string(),
            agent_id: None,
            force_new: false,
        }
    }

    #[test]
    fn test_normalize_provider() {
        assert_eq!(normalize_provider("Claude Code"), "claude-code");
        assert_eq!(normalize_provider("claude"), "claude-code");
        assert_eq!(normalize_provider("Cursor"), "cursor");
        assert_eq!(normalize_provider("codex"), "codex-cli");
        assert_eq!(normalize_provider("My Custom Tool"), "my-custom-tool");
        assert_eq!(normalize_provider("  "), "unknown");
    }

    #[test]
    fn test_derive_agent_id() {
        assert_eq!(
            derive_agent_id(Some("/repo/app"), Some("main"), "claude-code"),
            "app-main-claude-code"
        );
        assert_eq!(derive_agent_id(None, None, "cursor"), "global-cursor");
        assert_eq!(
            derive_agent_id(Some("/repo/app"), None, "cursor"),
            "app-main-cursor"
        );
    }

    #[test]
    fn test_normalize_channel() {
        assert_eq!(normalize_channel("Feature/Auth Tokens"), "feature-auth-tokens");
        assert_eq!(normalize_channel("--weird---input--"), "weird-input");
        assert_eq!(normalize_channel(""), "general");
        assert_eq!(
            normalize_channel("a-very-long-branch-name-that-keeps-going"),
            "a-very-long-branch-n"
        );
        assert!(normalize_channel("x".repeat(50).as_str()).len() <= MAX_CHANNEL_LEN);
    }

    #[test]
    fn test_channel_normalization_fixed_point() {
        for input in ["Feature/Auth", "main", "bugfix_JIRA-123", "--x--", "general"] {
            let once = normalize_channel(input);
            assert_eq!(normalize_channel(&once), once, "not a fixed point: {input}");
        }
    }

    #[test]
    fn test_derive_channel_from_branch() {
        assert_eq!(derive_channel_from_branch("main"), "general");
        assert_eq!(derive_channel_from_branch("master"), "general");
        assert_eq!(derive_channel_from_branch("feature/JWT-auth"), "feature-jwt-auth");
    }

    #[test]
    fn test_start_requires_project() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let err = start_session(&mut storage, &args("/nowhere", "S")).unwrap_err();
        assert!(matches!(err, Error::ProjectNotFound { .. }));
    }

    #[test]
    fn test_start_creates_with_branch_channel() {
        let mut storage = setup("/repo/app");
        let mut a = args("/repo/app", "auth work");
        a.branch = Some("feature/auth".to_string());

        let outcome = start_session(&mut storage, &a).unwrap();
        assert!(!outcome.resumed);
        assert_eq!(outcome.session.channel, "feature-auth");
        assert_eq!(outcome.agent_id, "app-feature/auth-claude-code");

        let binding = storage.get_agent_binding(&outcome.agent_id).unwrap().unwrap();
        assert_eq!(
            binding.current_session_id.as_deref(),
            Some(outcome.session.id.as_str())
        );
    }

    #[test]
    fn test_start_resumes_same_path() {
        let mut storage = setup("/repo/app");

        let first = start_session(&mut storage, &args("/repo/app", "session one")).unwrap();
        assert!(!first.resumed);

        let resumed = start_session(&mut storage, &args("/repo/app", "whatever")).unwrap();
        assert!(resumed.resumed);
        assert_eq!(resumed.session.id, first.session.id);
        assert!(resumed.warning.is_some());
        assert!(!resumed.path_added, "same path is already attached");
    }

    #[test]
    fn test_start_from_new_path_attaches_with_cached_identity() {
        let mut storage = setup("/repo/app");
        let other = Project::new("/repo/dashboard".to_string(), "Dash".to_string());
        storage.create_project(&other, "test").unwrap();

        let first = start_session(&mut storage, &args("/repo/app", "session one")).unwrap();

        // The connection carries the agent identity from the first call,
        // so starting from another monorepo path resumes and attaches.
        let mut again = args("/repo/dashboard", "whatever");
        again.agent_id = Some(first.agent_id.clone());
        let resumed = start_session(&mut storage, &again).unwrap();

        assert!(resumed.resumed);
        assert!(resumed.path_added);
        assert!(resumed.warning.is_some());
        let paths = storage.get_session_paths(&first.session.id).unwrap();
        assert_eq!(paths, vec!["/repo/app", "/repo/dashboard"]);
    }

    #[test]
    fn test_force_new_pauses_current_only() {
        let mut storage = setup("/repo/app");

        let first = start_session(&mut storage, &args("/repo/app", "one")).unwrap();

        let mut forced = args("/repo/app", "two");
        forced.force_new = true;
        let second = start_session(&mut storage, &forced).unwrap();
        assert!(!second.resumed);
        assert_ne!(second.session.id, first.session.id);

        let first_reloaded = storage.get_session(&first.session.id).unwrap().unwrap();
        assert_eq!(first_reloaded.status, SessionStatus::Paused);

        // A second force_new pauses only `second`; `first` stays paused
        let mut forced2 = args("/repo/app", "three");
        forced2.force_new = true;
        start_session(&mut storage, &forced2).unwrap();
        let first_again = storage.get_session(&first.session.id).unwrap().unwrap();
        assert_eq!(first_again.status, SessionStatus::Paused);
    }

    #[test]
    fn test_explicit_channel_validated() {
        let mut storage = setup("/repo/app");
        let mut a = args("/repo/app", "S");
        a.channel = Some("Bad Channel!".to_string());

        let err = start_session(&mut storage, &a).unwrap_err();
        assert!(matches!(err, Error::InvalidChannel(_)));
    }

    #[test]
    fn test_require_active_session() {
        let mut storage = setup("/repo/app");
        let outcome = start_session(&mut storage, &args("/repo/app", "S")).unwrap();

        let session = require_active_session(&storage, &outcome.agent_id).unwrap();
        assert_eq!(session.id, outcome.session.id);

        storage
            .update_session_status(&outcome.session.id, SessionStatus::Paused, "test")
            .unwrap();
        let err = require_active_session(&storage, &outcome.agent_id).unwrap_err();
        assert!(matches!(err, Error::NoActiveSession { .. }));
    }
}
