//! Error types for the gslink protocol layer
//!
//! This module contains all error types used throughout the crate: session
//! sequencing errors, ticket validation errors, request failures, and the
//! main GsError type that unifies them all.

use core::time::Duration;

use crate::types::{AppId, ResultCode};

// ----------------------------------------------------------------------------
// Session Errors
// ----------------------------------------------------------------------------

/// Caller-misuse errors raised synchronously by the session manager
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("already logged on, cannot log on again")]
    AlreadyLoggedOn,
    #[error("missing required logon field: {field}")]
    MissingField { field: &'static str },
    #[error("no previous logon identity to repeat")]
    NoPreviousIdentity,
    #[error("not logged on")]
    NotLoggedOn,
}

// ----------------------------------------------------------------------------
// Ticket Errors
// ----------------------------------------------------------------------------

/// Validation failures for a ticket activation batch.
///
/// The index identifies which ticket in the batch was rejected; the whole
/// batch is rejected atomically.
#[derive(Debug, thiserror::Error)]
pub enum TicketError {
    #[error("ticket {index} is invalid: {reason}")]
    Malformed { index: usize, reason: String },
    #[error("ticket {index} is expired")]
    Expired { index: usize },
    #[error("ticket {index} has no signature")]
    Unsigned { index: usize },
    #[error("ticket {index} has an invalid signature")]
    BadSignature { index: usize },
    #[error("ticket {index} is for the wrong app: {actual} (expected {expected})")]
    WrongApp {
        index: usize,
        expected: AppId,
        actual: AppId,
    },
}

// ----------------------------------------------------------------------------
// Request Errors
// ----------------------------------------------------------------------------

/// Failure of a single-shot (or streamed) correlated request.
///
/// `Timeout` and `ConnectionClosed` are distinguishable from a
/// backend-reported failure (`Backend`) so callers can tell "no answer"
/// apart from "answered no".
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("connection closed before a reply arrived")]
    ConnectionClosed,
    #[error("backend returned {0}")]
    Backend(ResultCode),
    #[error("failed to decode reply: {0}")]
    Decode(String),
}

// ----------------------------------------------------------------------------
// Unified Error Type
// ----------------------------------------------------------------------------

/// Core error type for the gslink protocol layer
#[derive(Debug, thiserror::Error)]
pub enum GsError {
    #[error("transport error: {reason}")]
    Transport { reason: String },

    #[error("session error: {0}")]
    Session(#[from] SessionError),

    #[error("ticket error: {0}")]
    Ticket(#[from] TicketError),

    #[error("request error: {0}")]
    Request(#[from] RequestError),

    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("storage error: {reason}")]
    Storage { reason: String },
}

impl GsError {
    /// Create a transport error with a reason
    pub fn transport<R: Into<String>>(reason: R) -> Self {
        GsError::Transport {
            reason: reason.into(),
        }
    }

    /// Create a storage error with a reason
    pub fn storage<R: Into<String>>(reason: R) -> Self {
        GsError::Storage {
            reason: reason.into(),
        }
    }
}

// ----------------------------------------------------------------------------
// Type Aliases
// ----------------------------------------------------------------------------

pub type Result<T> = core::result::Result<T, GsError>;
