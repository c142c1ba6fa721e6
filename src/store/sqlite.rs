//! SQLite-backed [`RequestStore`].

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::SqlitePool;
use tracing::{debug, info};

use super::RequestStore;
use crate::error::{Error, Result};
use crate::model::{SmsRequest, SmsStatus, StatusUpdate};

const COMPONENT: &str = "request_store";

type RequestRow = (
    String,
    String,
    String,
    String,
    Option<String>,
    Option<String>,
    String,
    String,
);

/// Request records in the `sms_requests` table.
#[derive(Debug, Clone)]
pub struct SqliteRequestStore {
    pool: SqlitePool,
}

impl SqliteRequestStore {
    /// Wrap an already-migrated pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

/// Fixed-width RFC 3339 so text ordering matches time ordering.
pub(crate) fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_ts(field: &'static str, value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Serialization(format!("invalid {field} timestamp {value:?}: {e}")))
}

fn from_row(row: RequestRow) -> Result<SmsRequest> {
    let (id, phone_number, message, status, failure_code, failure_comments, created, updated) =
        row;
    Ok(SmsRequest {
        id,
        phone_number,
        message,
        status: SmsStatus::parse(&status)?,
        failure_code,
        failure_comments,
        created_at: parse_ts("created_at", &created)?,
        updated_at: parse_ts("updated_at", &updated)?,
    })
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

#[async_trait]
impl RequestStore for SqliteRequestStore {
    async fn create(&self, record: &SmsRequest) -> Result<()> {
        let result = sqlx::query(
            "INSERT INTO sms_requests
                (id, phone_number, message, status, failure_code, failure_comments, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )
        .bind(&record.id)
        .bind(&record.phone_number)
        .bind(&record.message)
        .bind(record.status.as_str())
        .bind(&record.failure_code)
        .bind(&record.failure_comments)
        .bind(format_ts(&record.created_at))
        .bind(format_ts(&record.updated_at))
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {
                debug!(request_id = %record.id, status = %record.status, "sms request inserted");
                Ok(())
            }
            Err(e) if is_unique_violation(&e) => Err(Error::Conflict(record.id.clone())),
            Err(e) => Err(Error::dependency(COMPONENT)(e)),
        }
    }

    async fn read(&self, id: &str) -> Result<SmsRequest> {
        let row: Option<RequestRow> = sqlx::query_as(
            "SELECT id, phone_number, message, status, failure_code, failure_comments, created_at, updated_at
             FROM sms_requests
             WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::dependency(COMPONENT))?;

        match row {
            Some(row) => from_row(row),
            None => Err(Error::NotFound(id.to_owned())),
        }
    }

    async fn update(&self, id: &str, update: &StatusUpdate) -> Result<SmsRequest> {
        if !update.status.is_terminal() {
            return Err(Error::validation(
                "status",
                "status writes must move to a terminal state",
            ));
        }

        // Conditional on Pending: concurrent writers cannot both win.
        let affected = sqlx::query(
            "UPDATE sms_requests SET
                status = ?2,
                failure_code = ?3,
                failure_comments = ?4,
                updated_at = ?5
             WHERE id = ?1 AND status = 'Pending'",
        )
        .bind(id)
        .bind(update.status.as_str())
        .bind(&update.failure_code)
        .bind(&update.failure_comments)
        .bind(format_ts(&update.updated_at))
        .execute(&self.pool)
        .await
        .map_err(Error::dependency(COMPONENT))?
        .rows_affected();

        let current = self.read(id).await?;
        if affected > 0 {
            info!(request_id = %id, status = %current.status, "sms request status updated");
            return Ok(current);
        }

        if current.status == update.status {
            debug!(request_id = %id, status = %current.status, "status already applied, ignoring");
            Ok(current)
        } else {
            Err(Error::InvalidTransition {
                id: id.to_owned(),
                from: current.status,
                to: update.status,
            })
        }
    }

    async fn list_pending(
        &self,
        created_before: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<SmsRequest>> {
        let rows: Vec<RequestRow> = sqlx::query_as(
            "SELECT id, phone_number, message, status, failure_code, failure_comments, created_at, updated_at
             FROM sms_requests
             WHERE status = 'Pending' AND created_at < ?1
             ORDER BY created_at ASC
             LIMIT ?2",
        )
        .bind(format_ts(&created_before))
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(Error::dependency(COMPONENT))?;

        rows.into_iter().map(from_row).collect()
    }
}
