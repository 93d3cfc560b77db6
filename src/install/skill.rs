//! Skill installer.
//!
//! Writes a SaveContext usage guide ("skill") into the configuration
//! directory of supported agent tools. Installed targets are recorded in
//! `~/.savecontext/skills.json` so `--sync` can re-apply updated content
//! everywhere at once.

use crate::error::{Error, Result};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// The skill content written for each tool.
const SKILL_MD: &str = r"# SaveContext

Persistent memory across coding sessions. Use the `mcp__savecontext__*`
tools to keep state that survives conversation resets.

## Session discipline

- Call `session_start` at the beginning of every conversation. It
  resumes your previous session automatically.
- Save decisions (`category: decision`), reminders (`reminder`), and
  progress notes (`progress`) as you work, with stable keys.
- Before your context fills up, call `context_prepare_compaction`; after
  compacting, restore with `checkpoint_restore`.

## Task flow

- `get_next_block` claims the next ready issue atomically; safe with
  other agents working the same project.
- `issue_complete` cascades: it unblocks dependents and completes plans.

## Retrieval

- `context_get` for exact keys, `context_search` for everything else.
- `memory_*` tools hold project-level commands and configs shared by
  every session.
";

/// Options for the skill installer.
#[derive(Debug, Clone, Default)]
pub struct SkillOptions {
    /// Target tool (claude-code, cursor, windsurf, ...). Defaults to
    /// claude-code.
    pub tool: Option<String>,
    /// Explicit directory, overriding the per-tool default.
    pub path: Option<PathBuf>,
    /// Re-apply the skill to every previously configured target.
    pub sync: bool,
}

/// Installed-target registry at `~/.savecontext/skills.json`.
#[derive(Debug, Default, Serialize, Deserialize)]
struct SkillRegistry {
    targets: Vec<SkillTarget>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct SkillTarget {
    tool: String,
    path: PathBuf,
}

fn registry_path() -> Result<PathBuf> {
    Ok(crate::config::savecontext_dir()?.join("skills.json"))
}

fn load_registry() -> SkillRegistry {
    registry_path()
        .ok()
        .and_then(|p| fs::read_to_string(p).ok())
        .and_then(|content| serde_json::from_str(&content).ok())
        .unwrap_or_default()
}

fn save_registry(registry: &SkillRegistry) -> Result<()> {
    let path = registry_path()?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&path, serde_json::to_string_pretty(registry)?)?;
    Ok(())
}

/// Default skill directory for a tool.
fn default_skill_dir(tool: &str) -> Result<PathBuf> {
    let home = directories::BaseDirs::new()
        .map(|b| b.home_dir().to_path_buf())
        .ok_or_else(|| Error::Config("Could not determine home directory".into()))?;

    let dir = match tool {
        "claude-code" | "claude" => home.join(".claude").join("skills").join("savecontext"),
        "cursor" => home.join(".cursor").join("rules").join("savecontext"),
        "windsurf" => home.join(".windsurf").join("rules").join("savecontext"),
        "codex-cli" | "codex" => home.join(".codex").join("skills").join("savecontext"),
        "gemini-cli" | "gemini" => home.join(".gemini").join("skills").join("savecontext"),
        other => {
            return Err(Error::InvalidArgument(format!(
                "no default skill location for '{other}'; pass --path"
            )))
        }
    };
    Ok(dir)
}

fn write_skill(dir: &PathBuf) -> Result<()> {
    fs::create_dir_all(dir)?;
    fs::write(dir.join("SKILL.md"), SKILL_MD)?;
    Ok(())
}

/// Install the skill.
///
/// With `--sync`, re-applies the current content to every recorded
/// target; otherwise installs to the requested (or default) target and
/// records it.
///
/// # Errors
///
/// Returns an error if writing fails or the tool is unknown without an
/// explicit path.
pub fn setup_skill(options: &SkillOptions) -> Result<()> {
    let mut registry = load_registry();

    if options.sync {
        if registry.targets.is_empty() {
            println!("No previously configured skill targets; nothing to sync.");
            return Ok(());
        }
        for target in &registry.targets {
            write_skill(&target.path)?;
            println!("{} {} ({})", "synced".green(), target.path.display(), target.tool);
        }
        return Ok(());
    }

    let tool = options.tool.clone().unwrap_or_else(|| "claude-code".to_string());
    let dir = match options.path {
        Some(ref path) => path.clone(),
        None => default_skill_dir(&tool)?,
    };

    write_skill(&dir)?;
    println!("{} {} ({tool})", "installed".green(), dir.display());

    let target = SkillTarget { tool, path: dir };
    if !registry.targets.contains(&target) {
        registry.targets.push(target);
        save_registry(&registry)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_skill_creates_file() {
        let dir = TempDir::new().unwrap();
        let skill_dir = dir.path().join("savecontext");
        write_skill(&skill_dir).unwrap();

        let content = fs::read_to_string(skill_dir.join("SKILL.md")).unwrap();
        assert!(content.contains("session_start"));
        assert!(content.contains("context_prepare_compaction"));
    }

    #[test]
    fn test_unknown_tool_needs_path() {
        let err = default_skill_dir("some-new-tool").unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_explicit_path_wins() {
        let dir = TempDir::new().unwrap();
        let options = SkillOptions {
            tool: Some("some-new-tool".to_string()),
            path: Some(dir.path().join("custom")),
            sync: false,
        };
        // Unknown tool is fine with an explicit path
        setup_skill(&options).unwrap();
        assert!(dir.path().join("custom").join("SKILL.md").exists());
    }
}
