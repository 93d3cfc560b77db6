//! Git introspection via the `git` binary.
//!
//! The engine treats git as an external collaborator: a single
//! [`git_status`] call returns everything checkpoints and compaction need.
//! Every function degrades to `None`/empty outside a repository.

use serde::Serialize;
use std::path::Path;
use std::process::Command;

/// Snapshot of the working tree for checkpoint/compaction capture.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GitStatus {
    pub branch: Option<String>,
    pub modified: Vec<String>,
    pub added: Vec<String>,
    pub deleted: Vec<String>,
    pub untracked: Vec<String>,
    pub staged_diff: Option<String>,
}

impl GitStatus {
    /// Flat list of changed paths, porcelain order, capped at `limit`.
    #[must_use]
    pub fn changed_files(&self, limit: usize) -> Vec<String> {
        self.modified
            .iter()
            .chain(&self.added)
            .chain(&self.deleted)
            .chain(&self.untracked)
            .take(limit)
            .cloned()
            .collect()
    }

    /// Compact one-line-per-file rendering for checkpoint storage.
    #[must_use]
    pub fn to_porcelain(&self) -> String {
        let mut out = String::new();
        for f in &self.modified {
            out.push_str(&format!(" M {f}\n"));
        }
        for f in &self.added {
            out.push_str(&format!("A  {f}\n"));
        }
        for f in &self.deleted {
            out.push_str(&format!(" D {f}\n"));
        }
        for f in &self.untracked {
            out.push_str(&format!("?? {f}\n"));
        }
        out
    }
}

/// Gather git state for `cwd`.
///
/// Returns a default (empty) status when `cwd` is not inside a repository
/// or the `git` binary is unavailable.
#[must_use]
pub fn git_status(cwd: &Path) -> GitStatus {
    let mut status = GitStatus {
        branch: current_branch(cwd),
        ..GitStatus::default()
    };

    if let Some(porcelain) = run_git(cwd, &["status", "--porcelain"]) {
        for line in porcelain.lines() {
            if line.len() < 4 {
                continue;
            }
            let (code, path) = line.split_at(3);
            let path = path.trim().to_string();
            match code.trim_end() {
                "??" => status.untracked.push(path),
                c if c.contains('A') => status.added.push(path),
                c if c.contains('D') => status.deleted.push(path),
                _ => status.modified.push(path),
            }
        }
    }

    status.staged_diff = run_git(cwd, &["diff", "--cached", "--stat"])
        .filter(|d| !d.trim().is_empty());

    status
}

/// Get the current git branch name for `cwd`.
///
/// Returns `None` outside a repository or on a detached HEAD named "HEAD".
#[must_use]
pub fn current_branch(cwd: &Path) -> Option<String> {
    run_git(cwd, &["rev-parse", "--abbrev-ref", "HEAD"]).filter(|b| !b.is_empty())
}

fn run_git(cwd: &Path, args: &[&str]) -> Option<String> {
    Command::new("git")
        .current_dir(cwd)
        .args(args)
        .output()
        .ok()
        .filter(|output| output.status.success())
        .map(|output| String::from_utf8_lossy(&output.stdout).trim_end().to_string())
}
