//! Transport trait: delivers one message to one recipient.

use async_trait::async_trait;

use crate::error::Result;

/// A message ready to leave the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    /// HTML body.
    pub body: String,
}

impl OutgoingMail {
    pub fn new(to: &str, subject: &str, body: &str) -> Self {
        Self {
            to: to.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        }
    }
}

/// Outcome of a successful `send`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Handed to a real mail server.
    Sent,
    /// Logged only; nothing left the process.
    Simulated,
}

/// Outbound transport.
///
/// Implementations must be safe to call again for the same message: the
/// dispatch worker does not deduplicate, so a retry after a partial success
/// may deliver twice.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Transport name for logging.
    fn name(&self) -> &str;

    /// Deliver a message. Any `Err` is recorded as a failed attempt.
    async fn send(&self, mail: &OutgoingMail) -> Result<Delivery>;
}
