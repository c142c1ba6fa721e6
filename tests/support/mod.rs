//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use sqlx::SqlitePool;

use smsrelay::blacklist::SqliteBlacklist;
use smsrelay::channel::{Delivery, Envelope, SqliteChannel, DEFAULT_TOPIC};
use smsrelay::config::LimitsConfig;
use smsrelay::context::ServiceContext;
use smsrelay::gateway::Gateway;
use smsrelay::model::{SmsRequest, SmsStatus};
use smsrelay::sender::SmsSender;
use smsrelay::store::SqliteRequestStore;
use smsrelay::worker::DispatchWorker;
use smsrelay::SendError;

/// Sender double that records every request it was asked to deliver.
#[derive(Debug, Default)]
pub struct RecordingSender {
    sent: Mutex<Vec<String>>,
    fail_with: Option<SendError>,
}

impl RecordingSender {
    pub fn failing(code: &str, comments: &str) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail_with: Some(SendError::new(code, comments)),
        }
    }

    pub fn sent_ids(&self) -> Vec<String> {
        self.sent.lock().expect("sender lock").clone()
    }

    pub fn count_for(&self, request_id: &str) -> usize {
        self.sent_ids().iter().filter(|id| *id == request_id).count()
    }
}

#[async_trait]
impl SmsSender for RecordingSender {
    async fn send(&self, request: &SmsRequest) -> Result<(), SendError> {
        self.sent
            .lock()
            .expect("sender lock")
            .push(request.id.clone());
        match &self.fail_with {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

/// Fully wired pipeline over a private in-memory database.
pub struct Harness {
    pub pool: SqlitePool,
    pub ctx: ServiceContext,
    pub gateway: Gateway,
    pub channel: Arc<SqliteChannel>,
    pub sender: Arc<RecordingSender>,
}

impl Harness {
    pub fn worker(&self) -> DispatchWorker {
        DispatchWorker::new(self.ctx.clone(), Duration::from_secs(5))
    }
}

pub async fn open_pool() -> SqlitePool {
    smsrelay::db::open_in_memory()
        .await
        .expect("in-memory database should open")
}

pub async fn harness() -> Harness {
    harness_with_sender(RecordingSender::default()).await
}

pub async fn harness_with_sender(sender: RecordingSender) -> Harness {
    let pool = open_pool().await;
    let channel = Arc::new(SqliteChannel::new(
        pool.clone(),
        DEFAULT_TOPIC,
        Duration::from_millis(20),
    ));
    let sender = Arc::new(sender);
    let ctx = ServiceContext::new(
        Arc::new(SqliteRequestStore::new(pool.clone())),
        Arc::new(SqliteBlacklist::new(pool.clone())),
        channel.clone(),
        sender.clone(),
    );
    let gateway = Gateway::new(ctx.clone(), &LimitsConfig::default());
    Harness {
        pool,
        ctx,
        gateway,
        channel,
        sender,
    }
}

pub fn delivery_for(request_id: &str, attempt: u32) -> Delivery {
    Delivery {
        id: 1,
        payload: Envelope::sms_request(request_id)
            .encode()
            .expect("envelope should encode"),
        attempt,
    }
}

/// Poll until the request leaves `Pending`, failing the test after ~5s.
pub async fn wait_for_terminal(gateway: &Gateway, request_id: &str) -> SmsRequest {
    for _ in 0..500 {
        let record = gateway
            .get_status(request_id)
            .await
            .expect("request should be readable");
        if record.status != SmsStatus::Pending {
            return record;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("request {request_id} never reached a terminal status");
}
