//! Status cache: per-terminal session snapshots.
//!
//! The server refreshes a small JSON file after every mutating RPC; the
//! status-line script reads it to show the active session in the
//! terminal prompt. Writes are atomic (temp file + rename) so the
//! script never sees a partial file.
//!
//! # Terminal key resolution
//!
//! 1. `SAVECONTEXT_STATUS_KEY` env var (explicit override)
//! 2. Controlling TTY found by walking ancestor processes
//! 3. `TERM_SESSION_ID` (macOS Terminal.app)
//! 4. `ITERM_SESSION_ID` (iTerm2)
//! 5. None — caching is skipped

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;
use std::process::Command;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Cache TTL: 2 hours.
const CACHE_TTL_MS: u64 = 2 * 60 * 60 * 1000;

/// Status cache entry.
#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusCacheEntry {
    pub session_id: String,
    pub session_name: String,
    pub project_path: String,
    pub timestamp: u64,
    pub provider: Option<String>,
    pub item_count: Option<u32>,
    pub session_status: Option<String>,
}

/// Sanitize a key for use as a filename.
fn sanitize_key(key: &str) -> Option<String> {
    let sanitized: String = key
        .trim()
        .chars()
        .map(|c| {
            if c == '/'
                || c == '\\'
                || c == ':'
                || c == '*'
                || c == '?'
                || c == '"'
                || c == '<'
                || c == '>'
                || c == '|'
                || c.is_whitespace()
            {
                '_'
            } else {
                c
            }
        })
        .take(100)
        .collect();

    if sanitized.is_empty() {
        None
    } else {
        Some(sanitized)
    }
}

/// Walk the process tree to find the controlling terminal.
///
/// Agent-spawned processes (agent → shell → server) often have no TTY
/// on themselves or their immediate parent; the real terminal sits
/// further up. Walk up to 5 ancestors.
fn find_tty_from_ancestors() -> Option<String> {
    let mut current_pid = std::process::id().to_string();

    for _ in 0..5 {
        if let Ok(output) = Command::new("ps")
            .args(["-o", "tty=", "-p", &current_pid])
            .output()
        {
            if output.status.success() {
                let tty = String::from_utf8_lossy(&output.stdout).trim().to_string();
                if !tty.is_empty() && tty != "?" && tty != "??" {
                    return Some(tty);
                }
            }
        }

        let Ok(output) = Command::new("ps")
            .args(["-o", "ppid=", "-p", &current_pid])
            .output()
        else {
            break;
        };

        if !output.status.success() {
            break;
        }

        let ppid = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if ppid.is_empty() || ppid == "0" || ppid == "1" || ppid == current_pid {
            break;
        }
        current_pid = ppid;
    }

    None
}

/// Get the status key for this terminal.
fn get_status_key() -> Option<String> {
    if let Ok(key) = std::env::var("SAVECONTEXT_STATUS_KEY") {
        if !key.is_empty() {
            return sanitize_key(&key);
        }
    }

    if let Some(tty) = find_tty_from_ancestors() {
        return sanitize_key(&format!("tty-{tty}"));
    }

    if let Ok(term_id) = std::env::var("TERM_SESSION_ID") {
        if !term_id.is_empty() {
            return sanitize_key(&format!("term-{term_id}"));
        }
    }

    if let Ok(iterm_id) = std::env::var("ITERM_SESSION_ID") {
        if !iterm_id.is_empty() {
            return sanitize_key(&format!("iterm-{iterm_id}"));
        }
    }

    None
}

/// Read the status cache entry for this terminal.
///
/// Returns `None` when no key resolves, the file is missing or
/// corrupt, or the entry is older than the TTL (stale entries are
/// removed).
#[must_use]
pub fn read_status_cache() -> Option<StatusCacheEntry> {
    let key = get_status_key()?;
    let cache_path = crate::config::status_cache_dir().ok()?.join(format!("{key}.json"));

    if !cache_path.exists() {
        return None;
    }

    let content = fs::read_to_string(&cache_path).ok()?;
    let entry: StatusCacheEntry = serde_json::from_str(&content).ok()?;

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64;

    if now.saturating_sub(entry.timestamp) > CACHE_TTL_MS {
        let _ = fs::remove_file(&cache_path);
        return None;
    }

    Some(entry)
}

/// Write a status cache entry for this terminal.
///
/// Returns `true` when the cache was written.
pub fn write_status_cache(entry: &StatusCacheEntry) -> bool {
    let Some(key) = get_status_key() else {
        return false;
    };

    let Ok(dir) = crate::config::status_cache_dir() else {
        return false;
    };

    if fs::create_dir_all(&dir).is_err() {
        return false;
    }

    let file_path = dir.join(format!("{key}.json"));
    let temp_path = dir.join(format!("{key}.json.tmp"));

    let Ok(json) = serde_json::to_string_pretty(entry) else {
        return false;
    };

    let result = (|| -> std::io::Result<()> {
        {
            let mut opts = fs::OpenOptions::new();
            opts.write(true).create(true).truncate(true);
            #[cfg(unix)]
            opts.mode(0o600);
            let mut file = opts.open(&temp_path)?;
            file.write_all(json.as_bytes())?;
            file.flush()?;
        }
        fs::rename(&temp_path, &file_path)?;
        Ok(())
    })();

    result.is_ok()
}

/// Clear the status cache for this terminal.
///
/// Called when a session is paused or ended to unbind the terminal.
pub fn clear_status_cache() -> bool {
    let Some(key) = get_status_key() else {
        return false;
    };

    let Ok(dir) = crate::config::status_cache_dir() else {
        return false;
    };

    let file_path = dir.join(format!("{key}.json"));

    if file_path.exists() {
        fs::remove_file(&file_path).is_ok()
    } else {
        true
    }
}

/// Build and write a status entry binding this terminal to a session.
pub fn bind_session_to_terminal(
    session_id: &str,
    session_name: &str,
    project_path: &str,
    status: &str,
    provider: Option<&str>,
    item_count: Option<u32>,
) -> bool {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64;

    let entry = StatusCacheEntry {
        session_id: session_id.to_string(),
        session_name: session_name.to_string(),
        project_path: project_path.to_string(),
        timestamp: now,
        provider: provider.map(ToString::to_string),
        item_count,
        session_status: Some(status.to_string()),
    };

    write_status_cache(&entry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_key() {
        assert_eq!(sanitize_key("simple"), Some("simple".to_string()));
        assert_eq!(sanitize_key("with/slash"), Some("with_slash".to_string()));
        assert_eq!(sanitize_key("with spaces"), Some("with_spaces".to_string()));
        assert_eq!(sanitize_key(""), None);
        assert_eq!(sanitize_key("   "), None);
    }

    #[test]
    fn test_entry_serialization_is_camel_case() {
        let entry = StatusCacheEntry {
            session_id: "sess_1".to_string(),
            session_name: "S".to_string(),
            project_path: "/p".to_string(),
            timestamp: 1,
            provider: None,
            item_count: Some(4),
            session_status: Some("active".to_string()),
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert!(json.get("sessionId").is_some());
        assert!(json.get("itemCount").is_some());
    }
}
