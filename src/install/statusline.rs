//! Status-line installer.
//!
//! Writes the status-line script under `~/.savecontext/` and merges a
//! `statusLine` command plus a `hooks.PostToolUse` matcher for
//! `mcp__savecontext__.*` into `~/.claude/settings.json`, preserving
//! every other key in that file.

use crate::error::{Error, Result};
use colored::Colorize;
use std::fs;
use std::path::PathBuf;

/// The status-line script: reads this terminal's status cache entry and
/// prints a one-line summary for the prompt.
const STATUSLINE_SCRIPT: &str = r#"#!/bin/sh
# SaveContext status line: prints the active session for this terminal.
CACHE_DIR="$HOME/.savecontext/status-cache"
KEY="${SAVECONTEXT_STATUS_KEY:-tty-$(ps -o tty= -p $PPID 2>/dev/null | tr -d ' ')}"
KEY=$(printf '%s' "$KEY" | tr '/\\:*?"<>| ' '__________')
FILE="$CACHE_DIR/$KEY.json"

[ -f "$FILE" ] || exit 0

NAME=$(sed -n 's/.*"sessionName": *"\([^"]*\)".*/\1/p' "$FILE")
COUNT=$(sed -n 's/.*"itemCount": *\([0-9]*\).*/\1/p' "$FILE")
STATUS=$(sed -n 's/.*"sessionStatus": *"\([^"]*\)".*/\1/p' "$FILE")

[ -n "$NAME" ] || exit 0
printf '[sc: %s%s%s]' "$NAME" "${COUNT:+ ($COUNT items)}" "${STATUS:+ $STATUS}"
"#;

/// Install the status line: write the script and wire it into
/// `~/.claude/settings.json`.
///
/// # Errors
///
/// Returns an error if the script or settings cannot be written.
pub fn setup_statusline() -> Result<()> {
    let script_path = crate::config::statusline_script_path()?;
    write_script(&script_path)?;
    println!("{} {}", "wrote".green(), script_path.display());

    let settings_path = claude_settings_path()?;
    merge_claude_settings(&settings_path, &script_path)?;
    println!("{} {}", "updated".green(), settings_path.display());

    println!(
        "\nRestart your agent to pick up the status line and the post-tool refresh hook."
    );
    Ok(())
}

fn write_script(path: &PathBuf) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, STATUSLINE_SCRIPT)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o755))?;
    }

    Ok(())
}

fn claude_settings_path() -> Result<PathBuf> {
    directories::BaseDirs::new()
        .map(|b| b.home_dir().join(".claude").join("settings.json"))
        .ok_or_else(|| Error::Config("Could not determine home directory".into()))
}

/// Merge our keys into the settings file, leaving everything else as-is.
fn merge_claude_settings(settings_path: &PathBuf, script_path: &PathBuf) -> Result<()> {
    let mut settings: serde_json::Value = if settings_path.exists() {
        let content = fs::read_to_string(settings_path)?;
        serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("~/.claude/settings.json is not valid JSON: {e}")))?
    } else {
        serde_json::json!({})
    };

    let Some(root) = settings.as_object_mut() else {
        return Err(Error::Config(
            "~/.claude/settings.json must contain a JSON object".to_string(),
        ));
    };

    root.insert(
        "statusLine".to_string(),
        serde_json::json!({
            "type": "command",
            "command": script_path.to_string_lossy(),
        }),
    );

    // hooks.PostToolUse: append our matcher unless it is already there
    let hooks = root
        .entry("hooks")
        .or_insert_with(|| serde_json::json!({}));
    let post_tool = hooks
        .as_object_mut()
        .ok_or_else(|| Error::Config("settings.json 'hooks' must be an object".to_string()))?
        .entry("PostToolUse")
        .or_insert_with(|| serde_json::json!([]));

    let entries = post_tool
        .as_array_mut()
        .ok_or_else(|| Error::Config("settings.json 'hooks.PostToolUse' must be an array".to_string()))?;

    let matcher = "mcp__savecontext__.*";
    let already_installed = entries.iter().any(|entry| {
        entry.get("matcher").and_then(|m| m.as_str()) == Some(matcher)
    });

    if !already_installed {
        entries.push(serde_json::json!({
            "matcher": matcher,
            "hooks": [{
                "type": "command",
                "command": script_path.to_string_lossy(),
            }],
        }));
    }

    if let Some(parent) = settings_path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(settings_path, serde_json::to_string_pretty(&settings)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_merge_preserves_other_keys() {
        let dir = TempDir::new().unwrap();
        let settings_path = dir.path().join("settings.json");
        let script_path = dir.path().join("statusline.sh");

        fs::write(
            &settings_path,
            r#"{"model": "opus", "hooks": {"PreToolUse": [{"matcher": "Bash"}]}}"#,
        )
        .unwrap();

        merge_claude_settings(&settings_path, &script_path).unwrap();

        let merged: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&settings_path).unwrap()).unwrap();

        assert_eq!(merged["model"], "opus");
        assert!(merged["hooks"]["PreToolUse"].is_array(), "unrelated hooks preserved");
        assert_eq!(merged["statusLine"]["type"], "command");
        assert_eq!(
            merged["hooks"]["PostToolUse"][0]["matcher"],
            "mcp__savecontext__.*"
        );
    }

    #[test]
    fn test_merge_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let settings_path = dir.path().join("settings.json");
        let script_path = dir.path().join("statusline.sh");

        merge_claude_settings(&settings_path, &script_path).unwrap();
        merge_claude_settings(&settings_path, &script_path).unwrap();

        let merged: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&settings_path).unwrap()).unwrap();
        assert_eq!(merged["hooks"]["PostToolUse"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_script_is_executable() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("statusline.sh");
        write_script(&path).unwrap();

        assert!(path.exists());
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o111, 0o111);
        }
    }
}
