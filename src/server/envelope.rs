//! Uniform RPC response envelope.
//!
//! Every tool returns `{success, data?, message?, error?}` JSON-encoded
//! into the MCP text content. Domain errors map to stable codes; stack
//! traces never leak to callers.

use crate::error::Error;
use serde::Serialize;

/// Envelope error payload.
#[derive(Debug, Clone, Serialize)]
pub struct EnvelopeError {
    /// Stable SCREAMING_SNAKE code, e.g. `VERIFICATION_FAILED`.
    pub code: String,
    /// One of the six error kinds.
    pub kind: String,
    /// Human-readable message.
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

/// The uniform tool response envelope.
#[derive(Debug, Clone, Serialize)]
pub struct Envelope {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<EnvelopeError>,
}

impl Envelope {
    /// Success with data.
    #[must_use]
    pub fn ok(data: serde_json::Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            error: None,
        }
    }

    /// Success with data and a human message.
    #[must_use]
    pub fn ok_with_message(data: serde_json::Value, message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: Some(message.into()),
            error: None,
        }
    }

    /// Failure from a domain error.
    #[must_use]
    pub fn err(error: &Error) -> Self {
        let code = error.error_code();
        Self {
            success: false,
            data: None,
            message: None,
            error: Some(EnvelopeError {
                code: code.as_str().to_string(),
                kind: code.kind().as_str().to_string(),
                message: error.to_string(),
                hint: error.hint(),
            }),
        }
    }

    /// Failure with an explicit code (infrastructure-level errors like
    /// deadline expiry that have no domain error value).
    #[must_use]
    pub fn err_code(code: &str, kind: &str, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            message: None,
            error: Some(EnvelopeError {
                code: code.to_string(),
                kind: kind.to_string(),
                message: message.into(),
                hint: None,
            }),
        }
    }

    /// Serialize for the MCP text content.
    #[must_use]
    pub fn to_json_string(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            r#"{"success":false,"error":{"code":"INTERNAL_ERROR","kind":"internal","message":"envelope serialization failed"}}"#
                .to_string()
        })
    }
}

/// Shape a handler result into the envelope string every tool returns.
///
/// `Ok((data, message))` becomes a success envelope; `Err` becomes a
/// failure envelope. The outer `Result` is always `Ok`: tool-level
/// failures are data, not protocol errors.
pub fn respond(
    result: crate::Result<(serde_json::Value, Option<String>)>,
) -> std::result::Result<String, String> {
    let envelope = match result {
        Ok((data, Some(message))) => Envelope::ok_with_message(data, message),
        Ok((data, None)) => Envelope::ok(data),
        Err(ref e) => Envelope::err(e),
    };
    Ok(envelope.to_json_string())
}
