//! Ingestion gateway: the synchronous API surface of the pipeline.
//!
//! `submit` persists before it publishes. A publish failure after a
//! successful insert leaves an orphaned `Pending` record; the receipt reports
//! it through `enqueued = false` and [`Gateway::reconcile`] re-publishes it.

use std::collections::BTreeSet;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::channel::Envelope;
use crate::config::LimitsConfig;
use crate::context::ServiceContext;
use crate::error::{Error, Result};
use crate::model::SmsRequest;

const MIN_PHONE_DIGITS: usize = 3;
const MAX_PHONE_DIGITS: usize = 15;

/// Outcome of a successful [`Gateway::submit`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmitReceipt {
    /// Id of the persisted request.
    pub request_id: String,
    /// Whether the dispatch envelope was published. `false` means the request
    /// is durable but waits for reconciliation.
    pub enqueued: bool,
}

/// Entry point for submitting requests, reading their status, and managing
/// the blacklist.
#[derive(Debug, Clone)]
pub struct Gateway {
    ctx: ServiceContext,
    max_message_chars: usize,
}

impl Gateway {
    /// Gateway over `ctx` enforcing `limits`.
    pub fn new(ctx: ServiceContext, limits: &LimitsConfig) -> Self {
        Self {
            ctx,
            max_message_chars: limits.max_message_chars,
        }
    }

    /// Persist a new `Pending` request and enqueue its dispatch envelope.
    ///
    /// # Errors
    ///
    /// - [`Error::Validation`] for a malformed phone number or message.
    /// - [`Error::Dependency`] if the request cannot be persisted; nothing is
    ///   published in that case.
    pub async fn submit(&self, phone_number: &str, message: &str) -> Result<SubmitReceipt> {
        let phone_number = normalize_phone(phone_number)?;
        let message = self.validate_message(message)?;

        let request_id = Uuid::new_v4().to_string();
        let record = SmsRequest::pending(&request_id, &phone_number, message, Utc::now());

        if let Err(e) = self.ctx.store.create(&record).await {
            error!(request_id = %request_id, phone_number = %phone_number, error = %e, "failed to persist sms request");
            return Err(e);
        }

        let enqueued = match self
            .ctx
            .channel
            .publish(&Envelope::sms_request(&request_id))
            .await
        {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    request_id = %request_id,
                    error = %e,
                    "sms request persisted but not enqueued, awaiting reconciliation"
                );
                false
            }
        };

        info!(request_id = %request_id, phone_number = %phone_number, enqueued, "sms request accepted");
        Ok(SubmitReceipt {
            request_id,
            enqueued,
        })
    }

    /// Current record for `request_id`.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] if absent, [`Error::Dependency`] on store failure.
    pub async fn get_status(&self, request_id: &str) -> Result<SmsRequest> {
        let request_id = request_id.trim();
        if request_id.is_empty() {
            return Err(Error::validation("request_id", "must not be empty"));
        }
        self.ctx.store.read(request_id).await
    }

    /// All blacklisted numbers.
    ///
    /// # Errors
    ///
    /// [`Error::Dependency`] on blacklist failure.
    pub async fn list_blacklist(&self) -> Result<Vec<String>> {
        self.ctx.blacklist.list_all().await
    }

    /// Blacklist every number in `numbers`; returns how many were new.
    ///
    /// # Errors
    ///
    /// [`Error::Validation`] if the list is empty or any number is malformed
    /// (nothing is added then).
    pub async fn add_to_blacklist(&self, numbers: &[String]) -> Result<u64> {
        let normalized = numbers
            .iter()
            .map(|n| normalize_phone(n))
            .collect::<Result<BTreeSet<String>>>()?;
        if normalized.is_empty() {
            return Err(Error::validation("phone_numbers", "at least one number is required"));
        }
        let normalized: Vec<String> = normalized.into_iter().collect();
        self.ctx.blacklist.add(&normalized).await
    }

    /// Remove `number` from the blacklist; `false` when it was not present.
    ///
    /// # Errors
    ///
    /// [`Error::Dependency`] on blacklist failure.
    pub async fn remove_from_blacklist(&self, number: &str) -> Result<bool> {
        let removed = self.ctx.blacklist.remove(number.trim()).await?;
        Ok(removed > 0)
    }

    /// Re-publish envelopes for requests still `Pending` after `older_than`.
    ///
    /// Returns how many envelopes were published. Requests whose envelope is
    /// merely slow get a duplicate, which the worker treats as a no-op once
    /// the first copy has been handled.
    ///
    /// # Errors
    ///
    /// [`Error::Dependency`] if the store cannot be scanned or the channel
    /// rejects a publish.
    pub async fn reconcile(&self, older_than: Duration, limit: u32) -> Result<usize> {
        let age = TimeDelta::from_std(older_than).unwrap_or(TimeDelta::MAX);
        let cutoff = Utc::now()
            .checked_sub_signed(age)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        let stale = self.ctx.store.list_pending(cutoff, limit).await?;
        let mut republished: usize = 0;
        for record in &stale {
            if let Err(e) = self
                .ctx
                .channel
                .publish(&Envelope::sms_request(&record.id))
                .await
            {
                error!(
                    request_id = %record.id,
                    republished,
                    remaining = stale.len().saturating_sub(republished),
                    error = %e,
                    "reconciliation aborted on publish failure"
                );
                return Err(e);
            }
            republished = republished.saturating_add(1);
            info!(request_id = %record.id, created_at = %record.created_at, "re-enqueued pending sms request");
        }
        info!(republished, cutoff = %cutoff, "reconciliation pass complete");
        Ok(republished)
    }

    fn validate_message<'a>(&self, message: &'a str) -> Result<&'a str> {
        if message.trim().is_empty() {
            return Err(Error::validation("message", "must not be empty"));
        }
        let chars = message.chars().count();
        if chars > self.max_message_chars {
            return Err(Error::validation(
                "message",
                format!("{chars} characters exceeds limit of {}", self.max_message_chars),
            ));
        }
        Ok(message)
    }
}

/// Trim and validate a phone number: optional leading `+`, then 3–15 digits.
///
/// # Errors
///
/// [`Error::Validation`] when the number does not match that shape.
pub fn normalize_phone(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    let digits = trimmed.strip_prefix('+').unwrap_or(trimmed);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::validation(
            "phone_number",
            format!("{trimmed:?} is not a phone number"),
        ));
    }
    if !(MIN_PHONE_DIGITS..=MAX_PHONE_DIGITS).contains(&digits.len()) {
        return Err(Error::validation(
            "phone_number",
            format!("expected {MIN_PHONE_DIGITS}-{MAX_PHONE_DIGITS} digits, got {}", digits.len()),
        ));
    }
    Ok(trimmed.to_owned())
}

/// Split a comma- or whitespace-separated list of numbers.
pub fn split_numbers(raw: &str) -> Vec<String> {
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}
