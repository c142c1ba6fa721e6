//! Wire format of dispatch notifications.
//!
//! ```json
//! { "type": "SMS_REQUEST", "data": { "message_id": "<request id>" } }
//! ```
//!
//! The envelope carries a reference to the request, never a copy of it.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Type tag of an SMS dispatch notification.
pub const SMS_REQUEST: &str = "SMS_REQUEST";

/// Tagged wire unit published on the message channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Discriminator selecting the shape of `data`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Variant-specific body.
    pub data: serde_json::Value,
}

/// Body of an [`SMS_REQUEST`] envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmsRequestData {
    /// Id of the request to dispatch.
    pub message_id: String,
}

impl Envelope {
    /// Envelope announcing that request `message_id` is ready for dispatch.
    pub fn sms_request(message_id: &str) -> Self {
        Self {
            kind: SMS_REQUEST.to_owned(),
            data: serde_json::json!({ "message_id": message_id }),
        }
    }

    /// Serialize to JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialization`](crate::error::Error::Serialization) on encode failure.
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parse JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialization`](crate::error::Error::Serialization) if the bytes are
    /// not a well-formed envelope.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Decoded envelope, one variant per known type tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchMessage {
    /// A request is ready to be sent.
    SmsRequest(SmsRequestData),
    /// A type tag this build does not understand; consumers log and drop it.
    Unknown {
        /// The unrecognised tag.
        kind: String,
    },
}

impl DispatchMessage {
    /// Interpret an envelope's body according to its tag.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialization`](crate::error::Error::Serialization) when a known tag
    /// carries a body of the wrong shape.
    pub fn from_envelope(envelope: Envelope) -> Result<Self> {
        match envelope.kind.as_str() {
            SMS_REQUEST => Ok(Self::SmsRequest(serde_json::from_value(envelope.data)?)),
            _ => Ok(Self::Unknown {
                kind: envelope.kind,
            }),
        }
    }
}
