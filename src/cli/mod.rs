//! Command-line interface for the server binary.
//!
//! The default action serves MCP over stdio. The rest of the surface is
//! the installer (`--setup-statusline`, `--setup-skill`) and embedding
//! pipeline management (`embeddings ...`).

pub mod embeddings_cmd;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// SaveContext MCP server.
#[derive(Debug, Parser)]
#[command(name = "sc-server", version, about = "SaveContext MCP server - persistent memory for AI coding agents")]
pub struct Cli {
    /// Database path (default: ~/.savecontext/data/savecontext.db)
    #[arg(long, global = true, env = "SAVECONTEXT_DB")]
    pub db: Option<PathBuf>,

    /// Also serve the dashboard HTTP API on this port
    #[arg(long)]
    pub http: Option<u16>,

    /// Install the status-line script and Claude Code hook
    #[arg(long)]
    pub setup_statusline: bool,

    /// Install the SaveContext skill for an agent tool
    #[arg(long)]
    pub setup_skill: bool,

    /// Target tool for --setup-skill (default: claude-code)
    #[arg(long, requires = "setup_skill")]
    pub tool: Option<String>,

    /// Explicit skill directory for --setup-skill
    #[arg(long, requires = "setup_skill")]
    pub path: Option<PathBuf>,

    /// Re-apply the skill to all previously configured tools
    #[arg(long, requires = "setup_skill")]
    pub sync: bool,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    /// Serve MCP over stdio (the default when no command is given)
    Serve,

    /// Manage the embedding pipeline
    Embeddings {
        #[command(subcommand)]
        action: EmbeddingsAction,
    },
}

#[derive(Debug, Clone, Subcommand)]
pub enum EmbeddingsAction {
    /// Show embedding coverage and the active provider
    Status,

    /// Embed items that are missing embeddings
    Backfill,

    /// Detect reachable providers
    Providers,

    /// List known models with their dimensions
    Models,

    /// Delete all stored embeddings (with confirmation)
    Reset {
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },

    /// Show or change the embedding configuration
    Config {
        /// Provider: ollama, huggingface, model2vec
        #[arg(long)]
        provider: Option<String>,

        /// Clear the configured provider (return to auto-detect)
        #[arg(long, conflicts_with = "provider")]
        clear_provider: bool,

        /// API token (HuggingFace)
        #[arg(long)]
        token: Option<String>,

        /// Model name for the selected provider
        #[arg(long)]
        model: Option<String>,

        /// Endpoint URL (Ollama or HuggingFace)
        #[arg(long)]
        endpoint: Option<String>,

        /// Remove all embedding settings
        #[arg(long)]
        reset: bool,

        /// Skip the provider-switch confirmation prompt
        #[arg(long)]
        yes: bool,
    },
}
