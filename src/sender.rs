//! The send side effect.
//!
//! There is no carrier integration: [`LogSender`] records the message in the
//! log and always succeeds. The trait still reports failures so a real
//! carrier can plug in and have its errors persisted on the request.

use async_trait::async_trait;
use tracing::info;

use crate::error::SendError;
use crate::model::SmsRequest;

/// Delivers a request to its destination.
#[async_trait]
pub trait SmsSender: Send + Sync {
    /// Attempt delivery of `request`.
    ///
    /// # Errors
    ///
    /// Returns a [`SendError`] whose code and comments are persisted on the
    /// request as its failure reason.
    async fn send(&self, request: &SmsRequest) -> Result<(), SendError>;
}

/// Stand-in sender that logs instead of talking to a carrier.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSender;

#[async_trait]
impl SmsSender for LogSender {
    async fn send(&self, request: &SmsRequest) -> Result<(), SendError> {
        info!(
            target: "sms_gateway",
            request_id = %request.id,
            phone_number = %request.phone_number,
            message = %request.message,
            "sending sms via external gateway"
        );
        Ok(())
    }
}
