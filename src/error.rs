//! Typed error taxonomy for the skill pipeline.
//!
//! Every failure that can cross the `execute` boundary carries a
//! machine-readable [`ErrorCode`] and a human-readable message, so the
//! conversational caller can always render something instead of crashing the
//! turn. The `details` bag (attempted base URL, attempt number, body preview)
//! is meant for logs and tool-result metadata, never for end users.

use serde_json::{json, Value};
use std::fmt;
use thiserror::Error;

/// Machine-readable failure codes surfaced in result envelopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Schema or constraint violation — caller error, never retried.
    InvalidToolInput,
    /// The planner needs a clarification from the end user.
    MissingRequired,
    /// Network-level failure (DNS, connect, timeout).
    UpstreamUnreachable,
    /// Upstream returned a non-2xx status.
    UpstreamHttpError,
    /// Upstream returned a malformed (non-JSON) body.
    UpstreamInvalidResponse,
    /// Valid request, zero results after hard filtering.
    ConstraintNoMatch,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidToolInput => "invalid_tool_input",
            ErrorCode::MissingRequired => "missing_required",
            ErrorCode::UpstreamUnreachable => "upstream_unreachable",
            ErrorCode::UpstreamHttpError => "upstream_http_error",
            ErrorCode::UpstreamInvalidResponse => "upstream_invalid_response",
            ErrorCode::ConstraintNoMatch => "constraint_no_match",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A structured pipeline error.
#[derive(Debug, Clone, Error)]
#[error("{code}: {message}")]
pub struct SkillError {
    pub code: ErrorCode,
    pub message: String,
    /// HTTP status, when the error came from an upstream response.
    pub status: Option<u16>,
    /// Diagnostic bag for logs; not rendered to end users.
    pub details: Option<Value>,
}

impl SkillError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            status: None,
            details: None,
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidToolInput, message)
    }

    pub fn unreachable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::UpstreamUnreachable, message)
    }

    pub fn http_error(message: impl Into<String>, status: u16) -> Self {
        Self::new(ErrorCode::UpstreamHttpError, message).with_status(status)
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::UpstreamInvalidResponse, message)
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Render as the `kind: "error"` envelope returned to the caller.
    /// The details bag is intentionally left out.
    pub fn to_envelope(&self) -> Value {
        json!({
            "kind": "error",
            "error": {
                "code": self.code.as_str(),
                "message": self.message,
            },
        })
    }
}

pub type SkillResult<T> = Result<T, SkillError>;
