//! SaveContext server - persistent memory for AI coding agents.
//!
//! This crate is the state engine behind the `savecontext` MCP server.
//! Multiple agents (editor plugins, CLI tools) connect over stdio and share
//! project state: working context, checkpoints, issues, plans, and memory.
//!
//! # Architecture
//!
//! - [`server`] - MCP tool surface (rmcp) and response envelopes
//! - [`model`] - Data types (Session, Issue, ContextItem, Checkpoint, Plan)
//! - [`storage`] - SQLite database layer with vector index
//! - [`agent`] - Agent identity and session binding
//! - [`embeddings`] - Embedding providers and the generation pipeline
//! - [`search`] - Semantic search with keyword fallback
//! - [`sync`] - Durable upload queue for the remote service
//! - [`config`] - Paths, environment, status cache
//! - [`web`] - Optional dashboard HTTP API
//! - [`install`] - Status-line and skill installers
//! - [`error`] - Error types and handling

#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod agent;
pub mod cli;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod git;
pub mod install;
pub mod model;
pub mod search;
pub mod server;
pub mod storage;
pub mod sync;
pub mod validate;
pub mod web;

pub use error::{Error, Result};

/// Hard upper bound for a context item value, in bytes.
pub const MAX_VALUE_BYTES: usize = 100_000;

/// Maximum channel slug length.
pub const MAX_CHANNEL_LEN: usize = 20;

/// Maximum issue prefix length.
pub const MAX_ISSUE_PREFIX_LEN: usize = 8;

/// Current epoch milliseconds.
///
/// Single timestamp source so tests can reason about ordering.
#[inline]
#[must_use]
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Generate a prefixed entity id (`sess_a1b2c3d4e5f6` style).
#[must_use]
pub fn new_id(prefix: &str) -> String {
    format!("{}_{}", prefix, &uuid::Uuid::new_v4().simple().to_string()[..12])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_id_shape() {
        let id = new_id("sess");
        assert!(id.starts_with("sess_"));
        assert_eq!(id.len(), "sess_".len() + 12);
    }

    #[test]
    fn test_new_id_unique() {
        assert_ne!(new_id("item"), new_id("item"));
    }
}
