//! Error taxonomy shared by the gateway, the worker, and every backing store.

use crate::model::SmsStatus;

/// Convenience alias used across the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Typed failures surfaced by the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Caller input was malformed.
    #[error("invalid {field}: {reason}")]
    Validation {
        /// Which input field was rejected.
        field: &'static str,
        /// Human-readable reason.
        reason: String,
    },

    /// No request exists with the given id.
    #[error("sms request {0} not found")]
    NotFound(String),

    /// A record with the same id already exists.
    #[error("sms request {0} already exists")]
    Conflict(String),

    /// The record is already terminal and the write would change its status.
    #[error("sms request {id} is already {from}, refusing transition to {to}")]
    InvalidTransition {
        /// Request id.
        id: String,
        /// Current terminal status.
        from: SmsStatus,
        /// Rejected target status.
        to: SmsStatus,
    },

    /// The store, blacklist, or channel is unavailable or failed.
    #[error("dependency error ({component}): {source}")]
    Dependency {
        /// Which collaborator failed.
        component: &'static str,
        /// Underlying cause.
        #[source]
        source: sqlx::Error,
    },

    /// Envelope or payload could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// External delivery failed.
    #[error(transparent)]
    Send(#[from] SendError),
}

impl Error {
    /// Build a validation error for `field`.
    pub fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field,
            reason: reason.into(),
        }
    }

    /// Returns a closure mapping a `sqlx` error into [`Error::Dependency`].
    pub fn dependency(component: &'static str) -> impl FnOnce(sqlx::Error) -> Self {
        move |source| Self::Dependency { component, source }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Failure reported by an [`SmsSender`](crate::sender::SmsSender).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("send failed [{code}]: {comments}")]
pub struct SendError {
    /// Short machine-readable failure code, persisted as `failure_code`.
    pub code: String,
    /// Free-form detail, persisted as `failure_comments`.
    pub comments: String,
}

impl SendError {
    /// Create a send error with the given code and comments.
    pub fn new(code: impl Into<String>, comments: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            comments: comments.into(),
        }
    }
}
