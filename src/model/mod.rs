//! Domain data types.
//!
//! These structs are shared by the storage layer, the MCP tool surface,
//! the dashboard API, and the sync exporter, so they live here rather
//! than inside `storage`.

pub mod agent;
pub mod checkpoint;
pub mod context;
pub mod issue;
pub mod memory;
pub mod plan;
pub mod project;
pub mod session;

pub use agent::AgentBinding;
pub use checkpoint::{Checkpoint, CheckpointItemRef};
pub use context::{Category, ContextItem, EmbeddingStatus, Priority};
pub use issue::{DependencyType, Issue, IssueDependency, IssueStatus, IssueType};
pub use memory::{Memory, MemoryCategory};
pub use plan::{Plan, PlanStatus};
pub use project::Project;
pub use session::{Session, SessionStatus};
