//! Configuration: filesystem layout, environment, compaction settings.
//!
//! Everything lives under `~/.savecontext/`:
//! - `data/savecontext.db` - the database
//! - `backups/` - pre-switch database backups
//! - `sync-queue.json` - durable sync queue
//! - `status-cache/` - per-terminal status snapshots
//! - `config.json` - provider and feature flags
//! - `credentials.json` - file-backend credentials

mod status_cache;

pub use status_cache::{
    bind_session_to_terminal, clear_status_cache, read_status_cache, write_status_cache,
    StatusCacheEntry,
};

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

/// Compaction guidance mode for server instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompactionMode {
    /// The agent should compact automatically at the threshold.
    Auto,
    /// The agent should be reminded at the threshold (default).
    Remind,
    /// The agent compacts only when asked.
    Manual,
}

impl CompactionMode {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Remind => "remind",
            Self::Manual => "manual",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "auto" => Self::Auto,
            "manual" => Self::Manual,
            _ => Self::Remind,
        }
    }
}

/// Compaction settings resolved from the environment.
#[derive(Debug, Clone, Copy)]
pub struct CompactionConfig {
    pub mode: CompactionMode,
    /// Context-fill percentage at which to act, clamped to 50..=95.
    pub threshold: u8,
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            mode: CompactionMode::Remind,
            threshold: 80,
        }
    }
}

impl CompactionConfig {
    /// Read `SAVECONTEXT_COMPACTION_MODE` / `SAVECONTEXT_COMPACTION_THRESHOLD`.
    #[must_use]
    pub fn from_env() -> Self {
        let mode = std::env::var("SAVECONTEXT_COMPACTION_MODE")
            .map(|v| CompactionMode::parse(&v))
            .unwrap_or(CompactionMode::Remind);

        let threshold = std::env::var("SAVECONTEXT_COMPACTION_THRESHOLD")
            .ok()
            .and_then(|v| v.parse::<u8>().ok())
            .map_or(80, |t| t.clamp(50, 95));

        Self { mode, threshold }
    }
}

/// The root SaveContext directory: `~/.savecontext`.
///
/// # Errors
///
/// Returns `Config` when the home directory cannot be determined.
pub fn savecontext_dir() -> Result<PathBuf> {
    directories::BaseDirs::new()
        .map(|b| b.home_dir().join(".savecontext"))
        .ok_or_else(|| Error::Config("Could not determine home directory".into()))
}

/// The data directory holding the database.
pub fn data_dir() -> Result<PathBuf> {
    Ok(savecontext_dir()?.join("data"))
}

/// Resolve the database path.
///
/// Priority:
/// 1. Explicit path (CLI flag)
/// 2. `SAVECONTEXT_DB` environment variable
/// 3. `~/.savecontext/data/savecontext.db`
pub fn resolve_db_path(explicit_path: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit_path {
        return Ok(path.to_path_buf());
    }

    if let Ok(db_path) = std::env::var("SAVECONTEXT_DB") {
        if !db_path.trim().is_empty() {
            return Ok(PathBuf::from(db_path));
        }
    }

    Ok(data_dir()?.join("savecontext.db"))
}

/// Directory for pre-switch database backups.
pub fn backups_dir() -> Result<PathBuf> {
    Ok(savecontext_dir()?.join("backups"))
}

/// Timestamped backup path for the database.
pub fn backup_path() -> Result<PathBuf> {
    let stamp = chrono::Utc::now().format("%Y%m%d-%H%M%S");
    Ok(backups_dir()?.join(format!("savecontext-{stamp}.db")))
}

/// The durable sync queue file.
pub fn sync_queue_path() -> Result<PathBuf> {
    Ok(savecontext_dir()?.join("sync-queue.json"))
}

/// Directory of per-terminal status snapshots.
pub fn status_cache_dir() -> Result<PathBuf> {
    Ok(savecontext_dir()?.join("status-cache"))
}

/// The configuration file.
pub fn config_file_path() -> Result<PathBuf> {
    Ok(savecontext_dir()?.join("config.json"))
}

/// The file-backend credential store.
pub fn credentials_path() -> Result<PathBuf> {
    Ok(savecontext_dir()?.join("credentials.json"))
}

/// The status-line script the installer writes.
pub fn statusline_script_path() -> Result<PathBuf> {
    Ok(savecontext_dir()?.join("statusline.sh"))
}

/// Canonicalize a project path, falling back to the input when the
/// directory does not resolve (it may not exist yet).
#[must_use]
pub fn canonical_project_path(path: &str) -> String {
    std::fs::canonicalize(path)
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_else(|_| path.to_string())
}

/// The current working directory as a canonical project path.
pub fn cwd_project_path() -> Result<String> {
    let cwd = std::env::current_dir()?;
    Ok(canonical_project_path(&cwd.to_string_lossy()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compaction_mode_parse() {
        assert_eq!(CompactionMode::parse("auto"), CompactionMode::Auto);
        assert_eq!(CompactionMode::parse("MANUAL"), CompactionMode::Manual);
        assert_eq!(CompactionMode::parse("remind"), CompactionMode::Remind);
        assert_eq!(CompactionMode::parse("bogus"), CompactionMode::Remind);
    }

    #[test]
    fn test_compaction_defaults() {
        let config = CompactionConfig::default();
        assert_eq!(config.mode, CompactionMode::Remind);
        assert_eq!(config.threshold, 80);
    }

    #[test]
    fn test_resolve_db_path_with_explicit() {
        let explicit = PathBuf::from("/custom/path/db.sqlite");
        let result = resolve_db_path(Some(explicit.as_path())).unwrap();
        assert_eq!(result, explicit);
    }

    #[test]
    fn test_layout_hangs_off_savecontext_dir() {
        let root = savecontext_dir().unwrap();
        assert!(sync_queue_path().unwrap().starts_with(&root));
        assert!(status_cache_dir().unwrap().starts_with(&root));
        assert!(config_file_path().unwrap().starts_with(&root));
        assert!(backups_dir().unwrap().starts_with(&root));
    }

    #[test]
    fn test_canonical_path_fallback() {
        assert_eq!(
            canonical_project_path("/definitely/not/a/real/path"),
            "/definitely/not/a/real/path"
        );
    }
}
