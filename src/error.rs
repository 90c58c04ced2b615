//! Error types shared with the embedding recipe application.
//!
//! # Error Handling Philosophy
//!
//! Errors should be:
//! 1. **Actionable**: Tell the caller what went wrong in terms it can act on
//! 2. **Safe**: Never leak credentials or raw internal diagnostics
//! 3. **Explicit**: Callers branch on enum variants, not on string probing
//!
//! Every public operation in this crate returns [`Result`]; nothing here is
//! fatal to the process. Raw transport and decode detail is logged via
//! `tracing` where it occurs.

use std::collections::HashMap;
use thiserror::Error;

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, LlmError>;

/// Errors produced by the chat-completion client.
///
/// The variant set mirrors the error convention of the surrounding recipe
/// application. `NotFound` and `Forbidden` are part of that shared
/// convention; the client itself maps no remote condition onto them, but
/// callers embedding this crate construct them for their own surfaces.
#[derive(Debug, Error)]
pub enum LlmError {
    /// Missing/blank credential at construction, or remote HTTP 401.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Request rejected before any network call, or remote HTTP 400.
    ///
    /// `details` maps offending fields to per-field messages when the
    /// failure was a local pre-flight check.
    #[error("validation error: {message}")]
    Validation {
        message: String,
        details: Option<HashMap<String, String>>,
    },

    /// Server-side or unexpected failure. Deliberately generic so internal
    /// diagnostics never reach end users; the message identifies what
    /// failed without exposing internals.
    #[error("internal error: {0}")]
    Internal(String),

    /// Requested entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Caller is not allowed to perform this operation.
    #[error("forbidden: {0}")]
    Forbidden(String),
}

impl LlmError {
    /// Build a validation error with a field-level details map.
    pub fn validation(message: impl Into<String>, details: HashMap<String, String>) -> Self {
        Self::Validation {
            message: message.into(),
            details: Some(details),
        }
    }

    /// Build a validation error carrying only a message.
    pub fn validation_message(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            details: None,
        }
    }

    /// True when the caller could fix the request and resubmit.
    pub fn is_caller_fault(&self) -> bool {
        matches!(self, Self::Validation { .. } | Self::Unauthorized(_))
    }
}
