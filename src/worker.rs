//! Dispatch worker: the single consumer of the dispatch topic.
//!
//! Each delivery is processed to completion before the next pull:
//! decode, re-read the request, check the blacklist, send, persist the
//! terminal status, acknowledge. Per-message failures are logged and
//! acknowledged; they never stop the loop. There is no retry counter and no
//! dead-letter path.
//!
//! Acknowledgement happens only after processing, so a crash mid-message
//! leads to redelivery. Redelivery is safe because a request that is already
//! terminal is skipped without sending.

use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::channel::{Delivery, DispatchMessage, Envelope};
use crate::context::ServiceContext;
use crate::error::{Error, Result};
use crate::model::{SmsStatus, StatusUpdate};

/// Failure code persisted when the per-message deadline elapses.
pub const DEADLINE_EXCEEDED: &str = "DEADLINE_EXCEEDED";

/// Pause after a failed pull before trying again.
const PULL_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Why a delivery was dropped without touching any request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Payload was not a well-formed envelope.
    Undecodable,
    /// Envelope type tag is not handled by this worker.
    UnknownType(String),
    /// The referenced request does not exist.
    RequestNotFound,
}

/// What processing one delivery did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// This pass moved the request to the given terminal status.
    Completed(SmsStatus),
    /// The request was already terminal; nothing was sent.
    AlreadyTerminal(SmsStatus),
    /// The delivery was dropped.
    Skipped(SkipReason),
    /// A dependency failed; the request was left as it was.
    Errored(String),
}

/// Long-lived consumer turning dispatch envelopes into terminal statuses.
#[derive(Debug, Clone)]
pub struct DispatchWorker {
    ctx: ServiceContext,
    deadline: Duration,
}

impl DispatchWorker {
    /// Worker over `ctx`, bounding each message's downstream calls by `deadline`.
    pub fn new(ctx: ServiceContext, deadline: Duration) -> Self {
        Self { ctx, deadline }
    }

    /// Consume until `cancel` fires.
    ///
    /// Cancellation interrupts a pending pull immediately; a message already
    /// being processed is finished and acknowledged first.
    ///
    /// # Errors
    ///
    /// Currently never fails; per-message and pull errors are logged.
    pub async fn run(&self, cancel: CancellationToken) -> anyhow::Result<()> {
        info!(deadline_ms = self.deadline.as_millis(), "dispatch worker started");

        loop {
            let pulled = tokio::select! {
                () = cancel.cancelled() => break,
                pulled = self.ctx.channel.pull() => pulled,
            };

            let delivery = match pulled {
                Ok(delivery) => delivery,
                Err(e) => {
                    error!(error = %e, "failed to pull from channel");
                    tokio::select! {
                        () = cancel.cancelled() => break,
                        () = tokio::time::sleep(PULL_ERROR_BACKOFF) => continue,
                    }
                }
            };

            let outcome = self.process(&delivery).await;
            debug!(delivery_id = delivery.id, ?outcome, "delivery processed");

            if let Err(e) = self.ctx.channel.ack(&delivery).await {
                error!(delivery_id = delivery.id, error = %e, "failed to acknowledge delivery");
            }
        }

        info!("dispatch worker stopped");
        Ok(())
    }

    /// Process one delivery without acknowledging it.
    pub async fn process(&self, delivery: &Delivery) -> DispatchOutcome {
        if delivery.attempt > 1 {
            warn!(delivery_id = delivery.id, attempt = delivery.attempt, "processing redelivered envelope");
        }

        let message = match Envelope::decode(&delivery.payload).and_then(DispatchMessage::from_envelope)
        {
            Ok(message) => message,
            Err(e) => {
                error!(
                    delivery_id = delivery.id,
                    error = %e,
                    raw_message = %String::from_utf8_lossy(&delivery.payload),
                    "failed to decode envelope"
                );
                return DispatchOutcome::Skipped(SkipReason::Undecodable);
            }
        };

        match message {
            DispatchMessage::SmsRequest(data) => self.dispatch_within_deadline(&data.message_id).await,
            DispatchMessage::Unknown { kind } => {
                warn!(delivery_id = delivery.id, message_type = %kind, "received unknown message type");
                DispatchOutcome::Skipped(SkipReason::UnknownType(kind))
            }
        }
    }

    async fn dispatch_within_deadline(&self, request_id: &str) -> DispatchOutcome {
        match tokio::time::timeout(self.deadline, self.dispatch(request_id)).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                error!(request_id = %request_id, error = %e, "failed to process sms request");
                DispatchOutcome::Errored(e.to_string())
            }
            Err(_) => self.mark_deadline_exceeded(request_id).await,
        }
    }

    async fn dispatch(&self, request_id: &str) -> Result<DispatchOutcome> {
        let request = match self.ctx.store.read(request_id).await {
            Ok(request) => request,
            Err(Error::NotFound(_)) => {
                warn!(request_id = %request_id, "sms request not found, dropping envelope");
                return Ok(DispatchOutcome::Skipped(SkipReason::RequestNotFound));
            }
            Err(e) => return Err(e),
        };

        if request.status.is_terminal() {
            info!(request_id = %request_id, status = %request.status, "sms request already terminal, skipping");
            return Ok(DispatchOutcome::AlreadyTerminal(request.status));
        }

        let update = if self.ctx.blacklist.contains(&request.phone_number).await? {
            warn!(
                request_id = %request_id,
                phone_number = %request.phone_number,
                "sms blocked, phone number is blacklisted"
            );
            StatusUpdate::blocked(Utc::now())
        } else {
            match self.ctx.sender.send(&request).await {
                Ok(()) => StatusUpdate::sent(Utc::now()),
                Err(e) => {
                    warn!(request_id = %request_id, failure_code = %e.code, error = %e, "sms send failed");
                    StatusUpdate::failed(e.code, e.comments, Utc::now())
                }
            }
        };

        self.persist(request_id, &update).await
    }

    async fn persist(&self, request_id: &str, update: &StatusUpdate) -> Result<DispatchOutcome> {
        match self.ctx.store.update(request_id, update).await {
            Ok(record) => {
                info!(request_id = %request_id, status = %record.status, "sms request processed");
                Ok(DispatchOutcome::Completed(record.status))
            }
            Err(Error::InvalidTransition { from, .. }) => {
                warn!(request_id = %request_id, status = %from, "sms request reached a terminal state concurrently");
                Ok(DispatchOutcome::AlreadyTerminal(from))
            }
            Err(e) => Err(e),
        }
    }

    async fn mark_deadline_exceeded(&self, request_id: &str) -> DispatchOutcome {
        error!(
            request_id = %request_id,
            deadline_ms = self.deadline.as_millis(),
            "sms request processing exceeded deadline"
        );
        let update = StatusUpdate::failed(
            DEADLINE_EXCEEDED,
            format!("processing exceeded {} ms", self.deadline.as_millis()),
            Utc::now(),
        );
        match tokio::time::timeout(self.deadline, self.persist(request_id, &update)).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                error!(request_id = %request_id, error = %e, "failed to record deadline failure");
                DispatchOutcome::Errored(e.to_string())
            }
            Err(_) => {
                error!(request_id = %request_id, "recording deadline failure also timed out");
                DispatchOutcome::Errored(format!("{DEADLINE_EXCEEDED}: status not recorded"))
            }
        }
    }
}
