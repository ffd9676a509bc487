//! # Rollcall Channels
//!
//! Delivery providers behind a uniform [`Provider`] trait: SMTP email via
//! lettre and Twilio-compatible SMS over REST. The dispatcher treats every
//! provider the same way and never sees transport details.

use async_trait::async_trait;

use rollcall_core::types::ChannelKind;

pub mod email;
pub mod sms;

pub use email::EmailProvider;
pub use sms::SmsProvider;

/// A rendered message ready for one recipient. `subject` is only used by
/// channels that have one; SMS providers ignore it.
#[derive(Debug, Clone)]
pub struct Message {
    pub subject: String,
    pub body: String,
}

/// Why a send did not succeed. The dispatcher maps `Unavailable` to a
/// skipped delivery and the other two to a failed one.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    /// The provider is not configured or its service is unreachable.
    #[error("provider unavailable")]
    Unavailable,
    /// Worth retrying on a later batch (network hiccup, 5xx).
    #[error("transient send failure: {0}")]
    Transient(String),
    /// Retrying the same message cannot succeed (bad address, 4xx).
    #[error("permanent send failure: {0}")]
    Permanent(String),
}

/// One delivery channel. `send` returns an opaque provider reference
/// (SMTP response code, message SID) for the audit log.
#[async_trait]
pub trait Provider: Send + Sync {
    fn name(&self) -> &'static str;

    fn channel(&self) -> ChannelKind;

    /// Is the provider configured well enough to attempt sends at all?
    async fn available(&self) -> bool;

    async fn send(&self, to: &str, message: &Message) -> Result<String, SendError>;
}
