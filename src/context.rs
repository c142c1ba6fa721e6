//! Service context: the collaborators every component talks to.
//!
//! Built once at startup and cloned into the gateway, the worker, and the
//! HTTP layer. Nothing in the crate reaches for process-wide globals.

use std::sync::Arc;

use anyhow::Context;
use sqlx::SqlitePool;
use tracing::info;

use crate::blacklist::{Blacklist, SqliteBlacklist};
use crate::channel::{MessageChannel, SqliteChannel};
use crate::config::Config;
use crate::db;
use crate::sender::{LogSender, SmsSender};
use crate::store::{RequestStore, SqliteRequestStore};

/// Shared handles to the request store, blacklist, channel, and sender.
#[derive(Clone)]
pub struct ServiceContext {
    /// Request lifecycle records.
    pub store: Arc<dyn RequestStore>,
    /// Blacklisted phone numbers.
    pub blacklist: Arc<dyn Blacklist>,
    /// Dispatch notification topic.
    pub channel: Arc<dyn MessageChannel>,
    /// Send side effect.
    pub sender: Arc<dyn SmsSender>,
}

impl std::fmt::Debug for ServiceContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceContext").finish_non_exhaustive()
    }
}

impl ServiceContext {
    /// Assemble a context from explicit collaborators.
    pub fn new(
        store: Arc<dyn RequestStore>,
        blacklist: Arc<dyn Blacklist>,
        channel: Arc<dyn MessageChannel>,
        sender: Arc<dyn SmsSender>,
    ) -> Self {
        Self {
            store,
            blacklist,
            channel,
            sender,
        }
    }

    /// Build the SQLite-backed collaborators over an existing pool.
    pub fn from_pool(pool: SqlitePool, config: &Config) -> Self {
        Self::new(
            Arc::new(SqliteRequestStore::new(pool.clone())),
            Arc::new(SqliteBlacklist::with_set_key(
                pool.clone(),
                config.channel.blacklist_set_key.clone(),
            )),
            Arc::new(SqliteChannel::new(
                pool,
                config.channel.topic.clone(),
                config.channel.poll_interval(),
            )),
            Arc::new(LogSender),
        )
    }

    /// Open the configured database and build the context.
    ///
    /// # Errors
    ///
    /// Fails if the database cannot be opened or migrated; the process must
    /// not start against a partially initialised dependency.
    pub async fn connect(config: &Config) -> anyhow::Result<Self> {
        let pool = db::open(&config.database.path, config.database.max_connections)
            .await
            .context("failed to initialise storage")?;
        info!(
            path = %config.database.path.display(),
            topic = %config.channel.topic,
            "storage, blacklist and channel initialised"
        );
        Ok(Self::from_pool(pool, config))
    }
}
