//! smsrelay: SMS request ingestion with durable, asynchronous dispatch.
//!
//! A request is persisted as `Pending`, announced on a durable channel, and
//! picked up by a single dispatch worker that checks the blacklist, performs
//! the send, and records a terminal status (`Sent`, `Failed`, `Blocked`).
//!
//! See `DESIGN.md` for the delivery guarantees and their trade-offs.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod api;
pub mod blacklist;
pub mod channel;
pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod model;
pub mod sender;
pub mod store;
pub mod worker;

pub use error::{Error, Result, SendError};
