//! Tool handler implementations.
//!
//! One module per domain; every handler returns
//! `Result<(data, message)>` which the envelope layer shapes into the
//! uniform response.

pub mod checkpoint;
pub mod context;
pub mod issue;
pub mod memory;
pub mod plan;
pub mod project;
pub mod session;
pub mod sync;

use crate::error::{Error, Result};
use crate::model::{Category, IssueStatus, IssueType, Priority};
use crate::validate;

/// Handler result: response data plus optional human message.
pub type ToolOutput = Result<(serde_json::Value, Option<String>)>;

/// Parse a category argument.
pub(crate) fn parse_category(input: &str) -> Result<Category> {
    Category::parse(input).ok_or_else(|| {
        Error::InvalidArgument(format!(
            "unknown category '{input}'; use reminder, decision, progress, or note"
        ))
    })
}

/// Parse a priority argument (high/normal/low).
pub(crate) fn parse_item_priority(input: &str) -> Result<Priority> {
    Priority::parse(input).ok_or_else(|| {
        Error::InvalidArgument(format!(
            "unknown priority '{input}'; use high, normal, or low"
        ))
    })
}

/// Parse an issue status with synonym normalization.
pub(crate) fn parse_issue_status(input: &str) -> Result<IssueStatus> {
    let normalized = validate::normalize_status(input)
        .map_err(|(input, suggestion)| bad_value("status", &input, suggestion))?;
    IssueStatus::parse(&normalized)
        .ok_or_else(|| Error::InvalidArgument(format!("unknown status '{input}'")))
}

/// Parse an issue type with synonym normalization.
pub(crate) fn parse_issue_type(input: &str) -> Result<IssueType> {
    let normalized = validate::normalize_type(input)
        .map_err(|(input, suggestion)| bad_value("type", &input, suggestion))?;
    IssueType::parse(&normalized)
        .ok_or_else(|| Error::InvalidArgument(format!("unknown type '{input}'")))
}

/// Parse an issue priority (0-4, P-notation, names).
pub(crate) fn parse_issue_priority(input: &str) -> Result<i32> {
    validate::normalize_priority(input)
        .map_err(|(input, suggestion)| bad_value("priority", &input, suggestion))
}

fn bad_value(field: &str, input: &str, suggestion: Option<String>) -> Error {
    match suggestion {
        Some(s) => Error::InvalidArgument(format!(
            "invalid {field} '{input}' (did you mean '{s}'?)"
        )),
        None => Error::InvalidArgument(format!("invalid {field} '{input}'")),
    }
}
