//! Request lifecycle records and status transitions.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Lifecycle status of an [`SmsRequest`].
///
/// `Pending` is the only non-terminal state. The dispatch worker moves a
/// request to exactly one terminal state and nothing moves it back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SmsStatus {
    /// Persisted and waiting for the worker.
    Pending,
    /// Handed to the sender successfully.
    Sent,
    /// The sender reported a failure or the deadline was exceeded.
    Failed,
    /// The phone number was blacklisted when the envelope was consumed.
    Blocked,
}

impl SmsStatus {
    /// Returns the string representation stored in SQLite.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Sent => "Sent",
            Self::Failed => "Failed",
            Self::Blocked => "Blocked",
        }
    }

    /// Parse from a SQLite text value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialization`] if the value is not a known status.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "Pending" => Ok(Self::Pending),
            "Sent" => Ok(Self::Sent),
            "Failed" => Ok(Self::Failed),
            "Blocked" => Ok(Self::Blocked),
            other => Err(Error::Serialization(format!(
                "invalid status value: {other:?}"
            ))),
        }
    }

    /// Whether no further transition is permitted from this status.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for SmsStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One send attempt, as persisted in the request store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmsRequest {
    /// Globally unique id assigned at ingestion.
    pub id: String,
    /// Destination number.
    pub phone_number: String,
    /// Message body.
    pub message: String,
    /// Current lifecycle status.
    pub status: SmsStatus,
    /// Populated only when `status` is [`SmsStatus::Failed`].
    pub failure_code: Option<String>,
    /// Populated only when `status` is [`SmsStatus::Failed`].
    pub failure_comments: Option<String>,
    /// When the request was accepted.
    pub created_at: DateTime<Utc>,
    /// Refreshed on every status write.
    pub updated_at: DateTime<Utc>,
}

impl SmsRequest {
    /// A fresh `Pending` record with both timestamps set to `now`.
    pub fn pending(
        id: impl Into<String>,
        phone_number: impl Into<String>,
        message: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            phone_number: phone_number.into(),
            message: message.into(),
            status: SmsStatus::Pending,
            failure_code: None,
            failure_comments: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// The mutable subset of an [`SmsRequest`], written by the dispatch worker.
///
/// Built through [`StatusUpdate::sent`], [`StatusUpdate::blocked`] or
/// [`StatusUpdate::failed`] so failure fields only ever accompany `Failed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    /// Target status.
    pub status: SmsStatus,
    /// Failure code, `Some` only for `Failed`.
    pub failure_code: Option<String>,
    /// Failure detail, `Some` only for `Failed`.
    pub failure_comments: Option<String>,
    /// New `updated_at`.
    pub updated_at: DateTime<Utc>,
}

impl StatusUpdate {
    /// Transition to `Sent`.
    pub fn sent(now: DateTime<Utc>) -> Self {
        Self::terminal(SmsStatus::Sent, now)
    }

    /// Transition to `Blocked`.
    pub fn blocked(now: DateTime<Utc>) -> Self {
        Self::terminal(SmsStatus::Blocked, now)
    }

    /// Transition to `Failed` with the given code and comments.
    pub fn failed(
        code: impl Into<String>,
        comments: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            status: SmsStatus::Failed,
            failure_code: Some(code.into()),
            failure_comments: Some(comments.into()),
            updated_at: now,
        }
    }

    fn terminal(status: SmsStatus, now: DateTime<Utc>) -> Self {
        Self {
            status,
            failure_code: None,
            failure_comments: None,
            updated_at: now,
        }
    }
}
