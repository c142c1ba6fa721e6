//! [`MessageChannel`] backed by the `channel_messages` table.
//!
//! Publishers in the same process wake the consumer through a [`Notify`];
//! publishers in other processes (e.g. the `submit` subcommand) are picked up
//! by the poll interval.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use tokio::sync::Notify;
use tracing::debug;

use super::{Delivery, Envelope, MessageChannel};
use crate::error::{Error, Result};
use crate::store::sqlite::format_ts;

const COMPONENT: &str = "message_channel";

/// Durable single-topic queue in SQLite.
#[derive(Debug, Clone)]
pub struct SqliteChannel {
    pool: SqlitePool,
    topic: String,
    poll_interval: Duration,
    notify: Arc<Notify>,
}

impl SqliteChannel {
    /// Channel over `topic`, re-checking the table every `poll_interval` while idle.
    pub fn new(pool: SqlitePool, topic: impl Into<String>, poll_interval: Duration) -> Self {
        Self {
            pool,
            topic: topic.into(),
            poll_interval,
            notify: Arc::new(Notify::new()),
        }
    }

    /// Topic this channel publishes to and consumes from.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Number of messages not yet acknowledged.
    pub async fn pending_count(&self) -> Result<u64> {
        let row: (i64,) = sqlx::query_as(
            "SELECT count(*) FROM channel_messages WHERE topic = ?1 AND acked_at IS NULL",
        )
        .bind(&self.topic)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::dependency(COMPONENT))?;
        Ok(u64::try_from(row.0).unwrap_or(0))
    }

    /// Mark the oldest outstanding message as handed out and return it.
    async fn claim_next(&self) -> Result<Option<Delivery>> {
        let row: Option<(i64, Vec<u8>, i64)> = sqlx::query_as(
            "UPDATE channel_messages
             SET attempts = attempts + 1, last_delivered_at = ?2
             WHERE seq = (
                 SELECT seq FROM channel_messages
                 WHERE topic = ?1 AND acked_at IS NULL
                 ORDER BY seq ASC
                 LIMIT 1
             )
             RETURNING seq, payload, attempts",
        )
        .bind(&self.topic)
        .bind(format_ts(&Utc::now()))
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::dependency(COMPONENT))?;

        Ok(row.map(|(id, payload, attempts)| Delivery {
            id,
            payload,
            attempt: u32::try_from(attempts).unwrap_or(u32::MAX),
        }))
    }
}

#[async_trait]
impl MessageChannel for SqliteChannel {
    async fn publish(&self, envelope: &Envelope) -> Result<()> {
        let payload = envelope.encode()?;
        let size = payload.len();
        sqlx::query(
            "INSERT INTO channel_messages (topic, payload, published_at) VALUES (?1, ?2, ?3)",
        )
        .bind(&self.topic)
        .bind(payload)
        .bind(format_ts(&Utc::now()))
        .execute(&self.pool)
        .await
        .map_err(Error::dependency(COMPONENT))?;

        debug!(topic = %self.topic, payload_type = %envelope.kind, payload_size = size, "envelope published");
        // Stores a permit if the consumer is mid-query, so the wakeup is not lost.
        self.notify.notify_one();
        Ok(())
    }

    async fn pull(&self) -> Result<Delivery> {
        loop {
            if let Some(delivery) = self.claim_next().await? {
                return Ok(delivery);
            }
            tokio::select! {
                () = self.notify.notified() => {}
                () = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }

    async fn ack(&self, delivery: &Delivery) -> Result<()> {
        sqlx::query("UPDATE channel_messages SET acked_at = ?2 WHERE seq = ?1 AND acked_at IS NULL")
            .bind(delivery.id)
            .bind(format_ts(&Utc::now()))
            .execute(&self.pool)
            .await
            .map_err(Error::dependency(COMPONENT))?;
        Ok(())
    }
}
