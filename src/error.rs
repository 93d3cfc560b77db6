//! Error types for the SaveContext server.
//!
//! Provides structured error handling with:
//! - Machine-readable error codes (`ErrorCode`)
//! - Six error kinds mapped onto RPC envelope codes
//!   (validation, not-found, conflict, integrity, unavailable, internal)
//! - Retryability flags for agent self-correction
//! - Context-aware recovery hints
//! - Structured JSON output for envelopes and non-TTY consumers

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for SaveContext operations.
pub type Result<T> = std::result::Result<T, Error>;

// ── Error Code ────────────────────────────────────────────────

/// Machine-readable error codes grouped by kind.
///
/// Each code maps to a SCREAMING_SNAKE string. Agents match on the
/// string; the `kind` groups codes for envelope consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Validation
    InvalidArgument,
    InvalidStatus,
    InvalidType,
    InvalidPriority,
    InvalidChannel,
    ValueTooLarge,
    VerificationFailed,
    RequiredField,

    // Not found
    SessionNotFound,
    IssueNotFound,
    CheckpointNotFound,
    ProjectNotFound,
    PlanNotFound,
    ItemNotFound,
    MemoryNotFound,
    NoActiveSession,

    // Conflict
    SessionActive,
    LastProjectPath,
    DuplicateKey,

    // Integrity
    CycleDetected,
    ShortIdRace,

    // Unavailable
    ProviderUnavailable,
    SyncUnreachable,

    // Internal
    DatabaseError,
    IoError,
    JsonError,
    ConfigError,
    EmbeddingError,
    InternalError,
}

/// The six envelope-level error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    Integrity,
    Unavailable,
    Internal,
}

impl ErrorKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::Integrity => "integrity",
            Self::Unavailable => "unavailable",
            Self::Internal => "internal",
        }
    }
}

impl ErrorCode {
    /// Machine-readable SCREAMING_SNAKE code string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::InvalidStatus => "INVALID_STATUS",
            Self::InvalidType => "INVALID_TYPE",
            Self::InvalidPriority => "INVALID_PRIORITY",
            Self::InvalidChannel => "INVALID_CHANNEL",
            Self::ValueTooLarge => "VALUE_TOO_LARGE",
            Self::VerificationFailed => "VERIFICATION_FAILED",
            Self::RequiredField => "REQUIRED_FIELD",
            Self::SessionNotFound => "SESSION_NOT_FOUND",
            Self::IssueNotFound => "ISSUE_NOT_FOUND",
            Self::CheckpointNotFound => "CHECKPOINT_NOT_FOUND",
            Self::ProjectNotFound => "PROJECT_NOT_FOUND",
            Self::PlanNotFound => "PLAN_NOT_FOUND",
            Self::ItemNotFound => "ITEM_NOT_FOUND",
            Self::MemoryNotFound => "MEMORY_NOT_FOUND",
            Self::NoActiveSession => "NO_ACTIVE_SESSION",
            Self::SessionActive => "SESSION_ACTIVE",
            Self::LastProjectPath => "LAST_PROJECT_PATH",
            Self::DuplicateKey => "DUPLICATE_KEY",
            Self::CycleDetected => "CYCLE_DETECTED",
            Self::ShortIdRace => "SHORT_ID_RACE",
            Self::ProviderUnavailable => "PROVIDER_UNAVAILABLE",
            Self::SyncUnreachable => "SYNC_UNREACHABLE",
            Self::DatabaseError => "DATABASE_ERROR",
            Self::IoError => "IO_ERROR",
            Self::JsonError => "JSON_ERROR",
            Self::ConfigError => "CONFIG_ERROR",
            Self::EmbeddingError => "EMBEDDING_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Which of the six envelope kinds this code belongs to.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument
            | Self::InvalidStatus
            | Self::InvalidType
            | Self::InvalidPriority
            | Self::InvalidChannel
            | Self::ValueTooLarge
            | Self::VerificationFailed
            | Self::RequiredField => ErrorKind::Validation,
            Self::SessionNotFound
            | Self::IssueNotFound
            | Self::CheckpointNotFound
            | Self::ProjectNotFound
            | Self::PlanNotFound
            | Self::ItemNotFound
            | Self::MemoryNotFound
            | Self::NoActiveSession => ErrorKind::NotFound,
            Self::SessionActive | Self::LastProjectPath | Self::DuplicateKey => {
                ErrorKind::Conflict
            }
            Self::CycleDetected | Self::ShortIdRace => ErrorKind::Integrity,
            Self::ProviderUnavailable | Self::SyncUnreachable => ErrorKind::Unavailable,
            Self::DatabaseError
            | Self::IoError
            | Self::JsonError
            | Self::ConfigError
            | Self::EmbeddingError
            | Self::InternalError => ErrorKind::Internal,
        }
    }

    /// Whether an agent should retry with corrected input.
    ///
    /// True for validation errors and transient unavailability.
    /// False for not-found, conflict, or internal errors.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Validation | ErrorKind::Unavailable)
    }
}

// ── Error Enum ────────────────────────────────────────────────

/// Errors that can occur in SaveContext server operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Session not found: {id}")]
    SessionNotFound { id: String },

    #[error("Session not found: {id} (did you mean: {}?)", similar.join(", "))]
    SessionNotFoundSimilar { id: String, similar: Vec<String> },

    #[error("No active session for agent {agent_id}")]
    NoActiveSession { agent_id: String },

    #[error("Session is '{actual}', expected '{expected}'")]
    InvalidSessionStatus { expected: String, actual: String },

    #[error("Cannot delete session {id} while it is active; pause or end it first")]
    SessionStillActive { id: String },

    #[error("Cannot remove the last project path from session {id}")]
    LastProjectPath { id: String },

    #[error("Issue not found: {id}")]
    IssueNotFound { id: String },

    #[error("Issue not found: {id} (did you mean: {}?)", similar.join(", "))]
    IssueNotFoundSimilar { id: String, similar: Vec<String> },

    #[error("Checkpoint not found: {id}")]
    CheckpointNotFound { id: String },

    #[error("Plan not found: {id}")]
    PlanNotFound { id: String },

    #[error("Context item not found: {key}")]
    ItemNotFound { key: String },

    #[error("Memory not found: {key}")]
    MemoryNotFound { key: String },

    #[error("No project registered at {path}")]
    ProjectNotFound { path: String },

    #[error("{entity} name mismatch: expected '{expected}', got '{provided}'")]
    VerificationFailed {
        entity: &'static str,
        expected: String,
        provided: String,
    },

    #[error("Dependency cycle: {to} already blocks {from}")]
    CycleDetected { from: String, to: String },

    #[error("Value exceeds {limit} bytes (got {actual})")]
    ValueTooLarge { limit: usize, actual: usize },

    #[error("Invalid channel '{0}': must match [a-z0-9]+(-[a-z0-9]+)* and be at most 20 chars")]
    InvalidChannel(String),

    #[error("Embedding provider not available")]
    ProviderUnavailable,

    #[error("Sync target unreachable: {0}")]
    SyncUnreachable(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Data directory not found: {path}")]
    DataDirMissing { path: PathBuf },

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Map this error to its structured `ErrorCode`.
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::SessionNotFound { .. } | Self::SessionNotFoundSimilar { .. } => {
                ErrorCode::SessionNotFound
            }
            Self::NoActiveSession { .. } => ErrorCode::NoActiveSession,
            Self::InvalidSessionStatus { .. } => ErrorCode::InvalidStatus,
            Self::SessionStillActive { .. } => ErrorCode::SessionActive,
            Self::LastProjectPath { .. } => ErrorCode::LastProjectPath,
            Self::IssueNotFound { .. } | Self::IssueNotFoundSimilar { .. } => {
                ErrorCode::IssueNotFound
            }
            Self::CheckpointNotFound { .. } => ErrorCode::CheckpointNotFound,
            Self::PlanNotFound { .. } => ErrorCode::PlanNotFound,
            Self::ItemNotFound { .. } => ErrorCode::ItemNotFound,
            Self::MemoryNotFound { .. } => ErrorCode::MemoryNotFound,
            Self::ProjectNotFound { .. } => ErrorCode::ProjectNotFound,
            Self::VerificationFailed { .. } => ErrorCode::VerificationFailed,
            Self::CycleDetected { .. } => ErrorCode::CycleDetected,
            Self::ValueTooLarge { .. } => ErrorCode::ValueTooLarge,
            Self::InvalidChannel(_) => ErrorCode::InvalidChannel,
            Self::ProviderUnavailable => ErrorCode::ProviderUnavailable,
            Self::SyncUnreachable(_) => ErrorCode::SyncUnreachable,
            Self::Database(_) => ErrorCode::DatabaseError,
            Self::Io(_) | Self::DataDirMissing { .. } => ErrorCode::IoError,
            Self::Json(_) => ErrorCode::JsonError,
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Self::Config(_) => ErrorCode::ConfigError,
            Self::Embedding(_) => ErrorCode::EmbeddingError,
            Self::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Envelope kind, delegating to the `ErrorCode`.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.error_code().kind()
    }

    /// CLI exit code per the installer contract:
    /// 0 success, 1 recoverable error, 2 user-cancelled.
    ///
    /// Cancellation never surfaces as an `Error`, so this is always 1.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        1
    }

    /// Context-aware recovery hint for agents and humans.
    ///
    /// Returns `None` if no actionable suggestion exists.
    #[must_use]
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::NoActiveSession { .. } => Some(
                "No session bound to this agent.\n  \
                 Start one with the session_start tool."
                    .to_string(),
            ),

            Self::SessionNotFound { id } => Some(format!(
                "No session with ID '{id}'. Use session_list to see available sessions."
            )),
            Self::SessionNotFoundSimilar { similar, .. }
            | Self::IssueNotFoundSimilar { similar, .. } => {
                Some(format!("Did you mean: {}?", similar.join(", ")))
            }

            Self::SessionStillActive { id } => {
                Some(format!("Pause or end session {id} before deleting it."))
            }

            Self::IssueNotFound { id } => Some(format!(
                "No issue with ID '{id}'. Use issue_list to see available issues."
            )),

            Self::CheckpointNotFound { id } => Some(format!(
                "No checkpoint with ID '{id}'. Use checkpoint_list to see available checkpoints."
            )),

            Self::ProjectNotFound { path } => Some(format!(
                "No project registered at '{path}'. Create one with project_create."
            )),

            Self::VerificationFailed { entity, expected, .. } => Some(format!(
                "Pass the current {entity} name ('{expected}') to confirm this operation. \
                 Your context may be stale; re-read the {entity} first."
            )),

            Self::InvalidSessionStatus { expected, actual } => Some(format!(
                "Session is '{actual}' but needs to be '{expected}'. \
                 Use session_list to check session states."
            )),

            Self::InvalidArgument(msg) => {
                if msg.contains("status") {
                    Some(
                        "Valid statuses: open, in_progress, blocked, closed, deferred. \
                         Synonyms: done→closed, wip→in_progress, todo→open"
                            .to_string(),
                    )
                } else if msg.contains("type") {
                    Some(
                        "Valid types: task, bug, feature, epic, chore. \
                         Synonyms: story→feature, defect→bug, cleanup→chore"
                            .to_string(),
                    )
                } else if msg.contains("priority") {
                    Some(
                        "Valid priorities: 0-4, P0-P4, or names: critical, high, medium, low, backlog"
                            .to_string(),
                    )
                } else {
                    None
                }
            }

            Self::ProviderUnavailable => Some(
                "No embedding provider is reachable. Install Ollama with an embedding \
                 model, or configure one via `sc-server embeddings config`."
                    .to_string(),
            ),

            _ => None,
        }
    }

    /// Structured JSON representation for machine consumption.
    ///
    /// Includes error code, kind, message, retryability, and optional
    /// recovery hint. Agents parse this instead of stderr text.
    #[must_use]
    pub fn to_structured_json(&self) -> serde_json::Value {
        let code = self.error_code();
        let mut obj = serde_json::json!({
            "error": {
                "code": code.as_str(),
                "kind": code.kind().as_str(),
                "message": self.to_string(),
                "retryable": code.is_retryable(),
            }
        });

        if let Some(hint) = self.hint() {
            obj["error"]["hint"] = serde_json::Value::String(hint);
        }

        obj
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_group_into_kinds() {
        assert_eq!(ErrorCode::VerificationFailed.kind(), ErrorKind::Validation);
        assert_eq!(ErrorCode::SessionNotFound.kind(), ErrorKind::NotFound);
        assert_eq!(ErrorCode::SessionActive.kind(), ErrorKind::Conflict);
        assert_eq!(ErrorCode::CycleDetected.kind(), ErrorKind::Integrity);
        assert_eq!(ErrorCode::ProviderUnavailable.kind(), ErrorKind::Unavailable);
        assert_eq!(ErrorCode::DatabaseError.kind(), ErrorKind::Internal);
    }

    #[test]
    fn test_retryable() {
        assert!(ErrorCode::InvalidArgument.is_retryable());
        assert!(ErrorCode::ProviderUnavailable.is_retryable());
        assert!(!ErrorCode::SessionNotFound.is_retryable());
        assert!(!ErrorCode::CycleDetected.is_retryable());
    }

    #[test]
    fn test_structured_json_shape() {
        let err = Error::VerificationFailed {
            entity: "checkpoint",
            expected: "v1".to_string(),
            provided: "v2".to_string(),
        };
        let json = err.to_structured_json();
        assert_eq!(json["error"]["code"], "VERIFICATION_FAILED");
        assert_eq!(json["error"]["kind"], "validation");
        assert!(json["error"]["hint"].is_string());
    }

    #[test]
    fn test_value_too_large_message() {
        let err = Error::ValueTooLarge { limit: 100_000, actual: 100_001 };
        assert!(err.to_string().contains("100000"));
        assert_eq!(err.error_code(), ErrorCode::ValueTooLarge);
    }
}
