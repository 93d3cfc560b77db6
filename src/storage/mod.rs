//! SQLite storage layer.
//!
//! `SqliteStorage` is the single storage backend. Domain operations are
//! grouped by entity: sessions/agents/context in [`sqlite`], and issues,
//! checkpoints, plans, projects, memory, and vectors in their own modules
//! (all `impl SqliteStorage` blocks over the same handle).

pub mod checkpoints;
pub mod events;
pub mod issues;
pub mod memory;
pub mod migrations;
pub mod plans;
pub mod projects;
pub mod schema;
pub mod sqlite;
pub mod vectors;

pub use checkpoints::{CheckpointFilters, SplitPart, SplitResult};
pub use issues::{BatchDependency, BatchIssueSpec, IssueFilters, IssueSort};
pub use sqlite::{MutationContext, SqliteStorage, TagAction};
pub use vectors::{SemanticMatch, VectorStats};
