//! Request store: durable keyed storage of [`SmsRequest`] lifecycle records.
//!
//! The store is the single enforcement point for the monotonic status
//! invariant: an [`RequestStore::update`] against a terminal record either
//! repeats the current status (no-op) or fails with
//! [`Error::InvalidTransition`](crate::error::Error::InvalidTransition).

pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::model::{SmsRequest, StatusUpdate};

pub use self::sqlite::SqliteRequestStore;

/// Read/write contract over the request records.
#[async_trait]
pub trait RequestStore: Send + Sync {
    /// Insert a new record.
    ///
    /// # Errors
    ///
    /// [`Error::Conflict`](crate::error::Error::Conflict) if the id already
    /// exists; existing records are never overwritten.
    async fn create(&self, record: &SmsRequest) -> Result<()>;

    /// Fetch a record by id.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`](crate::error::Error::NotFound) if absent.
    async fn read(&self, id: &str) -> Result<SmsRequest>;

    /// Apply a status write and return the resulting record.
    ///
    /// # Errors
    ///
    /// - [`Error::Validation`](crate::error::Error::Validation) if the target status is `Pending`.
    /// - [`Error::NotFound`](crate::error::Error::NotFound) if absent.
    /// - [`Error::InvalidTransition`](crate::error::Error::InvalidTransition) if the record is
    ///   terminal with a different status.
    async fn update(&self, id: &str, update: &StatusUpdate) -> Result<SmsRequest>;

    /// Pending records created strictly before `created_before`, oldest first.
    async fn list_pending(
        &self,
        created_before: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<SmsRequest>>;
}
