//! Message channel: durable, at-least-once topic carrying dispatch envelopes.
//!
//! A delivery stays outstanding until [`MessageChannel::ack`] is called for
//! it. Anything pulled but never acknowledged (crash, cancellation) is handed
//! out again by the next [`MessageChannel::pull`].

pub mod envelope;
pub mod sqlite;

use async_trait::async_trait;

use crate::error::Result;

pub use self::envelope::{DispatchMessage, Envelope, SmsRequestData, SMS_REQUEST};
pub use self::sqlite::SqliteChannel;

/// Default topic name for SMS dispatch notifications.
pub const DEFAULT_TOPIC: &str = "notification.send_sms";

/// One message handed to a consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Channel-assigned position, used to acknowledge.
    pub id: i64,
    /// Raw envelope bytes.
    pub payload: Vec<u8>,
    /// How many times this message has been handed out, including this one.
    pub attempt: u32,
}

/// Publish/consume contract over a single topic.
#[async_trait]
pub trait MessageChannel: Send + Sync {
    /// Append an envelope to the topic.
    async fn publish(&self, envelope: &Envelope) -> Result<()>;

    /// Wait for the oldest unacknowledged message.
    ///
    /// Blocks while the topic is empty; callers race it against a
    /// cancellation signal. Dropping the future loses nothing.
    async fn pull(&self) -> Result<Delivery>;

    /// Commit a delivery so it is never handed out again.
    async fn ack(&self, delivery: &Delivery) -> Result<()>;
}
