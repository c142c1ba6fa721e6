//! Blacklist filter: a set of phone numbers that must never be sent to.
//!
//! Membership lives in the `blacklist` table, scoped by a set key.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::store::sqlite::format_ts;

const COMPONENT: &str = "blacklist";

/// Default key of the blacklisted-numbers set.
pub const DEFAULT_SET_KEY: &str = "blacklisted_numbers_set";

/// Set-membership contract for blacklisted numbers.
#[async_trait]
pub trait Blacklist: Send + Sync {
    /// Add numbers to the set. Already-present numbers are ignored.
    ///
    /// Returns how many numbers were newly added.
    async fn add(&self, numbers: &[String]) -> Result<u64>;

    /// Remove a number; returns 0 when it was not present.
    async fn remove(&self, number: &str) -> Result<u64>;

    /// Whether `number` is in the set.
    async fn contains(&self, number: &str) -> Result<bool>;

    /// Snapshot of current membership, sorted.
    async fn list_all(&self) -> Result<Vec<String>>;
}

/// [`Blacklist`] stored in SQLite.
#[derive(Debug, Clone)]
pub struct SqliteBlacklist {
    pool: SqlitePool,
    set_key: String,
}

impl SqliteBlacklist {
    /// Blacklist over the default set key.
    pub fn new(pool: SqlitePool) -> Self {
        Self::with_set_key(pool, DEFAULT_SET_KEY)
    }

    /// Blacklist over a custom set key.
    pub fn with_set_key(pool: SqlitePool, set_key: impl Into<String>) -> Self {
        Self {
            pool,
            set_key: set_key.into(),
        }
    }
}

#[async_trait]
impl Blacklist for SqliteBlacklist {
    async fn add(&self, numbers: &[String]) -> Result<u64> {
        let added_at = format_ts(&Utc::now());
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(Error::dependency(COMPONENT))?;

        let mut added: u64 = 0;
        for number in numbers {
            let result = sqlx::query(
                "INSERT OR IGNORE INTO blacklist (set_key, phone_number, added_at) VALUES (?1, ?2, ?3)",
            )
            .bind(&self.set_key)
            .bind(number)
            .bind(&added_at)
            .execute(&mut *tx)
            .await
            .map_err(Error::dependency(COMPONENT))?;
            added = added.saturating_add(result.rows_affected());
        }

        tx.commit().await.map_err(Error::dependency(COMPONENT))?;
        info!(requested = numbers.len(), added, "numbers added to blacklist");
        Ok(added)
    }

    async fn remove(&self, number: &str) -> Result<u64> {
        let removed = sqlx::query("DELETE FROM blacklist WHERE set_key = ?1 AND phone_number = ?2")
            .bind(&self.set_key)
            .bind(number)
            .execute(&self.pool)
            .await
            .map_err(Error::dependency(COMPONENT))?
            .rows_affected();
        info!(phone_number = %number, removed, "blacklist removal completed");
        Ok(removed)
    }

    async fn contains(&self, number: &str) -> Result<bool> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT 1 FROM blacklist WHERE set_key = ?1 AND phone_number = ?2")
                .bind(&self.set_key)
                .bind(number)
                .fetch_optional(&self.pool)
                .await
                .map_err(Error::dependency(COMPONENT))?;
        let present = row.is_some();
        debug!(phone_number = %number, is_blacklisted = present, "blacklist check completed");
        Ok(present)
    }

    async fn list_all(&self) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT phone_number FROM blacklist WHERE set_key = ?1 ORDER BY phone_number ASC",
        )
        .bind(&self.set_key)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::dependency(COMPONENT))?;
        Ok(rows.into_iter().map(|(n,)| n).collect())
    }
}
