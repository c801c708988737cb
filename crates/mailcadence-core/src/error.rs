//! Error types for MailCadence.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, MailCadenceError>;

#[derive(Debug, Error)]
pub enum MailCadenceError {
    /// Scheduler input rejected before any timestamp was produced.
    #[error("Invalid schedule parameters: {0}")]
    InvalidScheduleParameters(String),

    /// The durable store could not be read or written.
    #[error("Queue store unavailable: {0}")]
    StoreUnavailable(String),

    /// The durable store exists but its contents cannot be parsed.
    #[error("Queue store corrupt: {0}")]
    StoreCorrupt(String),

    /// A transport refused or failed to deliver a message.
    #[error("Delivery failed: {0}")]
    Delivery(String),

    /// An error escaped the per-item boundary of the dispatch loop.
    #[error("Dispatch worker stopped: {0}")]
    CriticalLoopFailure(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Compose error: {0}")]
    Compose(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_prefixes() {
        let err = MailCadenceError::InvalidScheduleParameters("daily limit must be positive".into());
        assert_eq!(
            err.to_string(),
            "Invalid schedule parameters: daily limit must be positive"
        );
        let err = MailCadenceError::StoreCorrupt("line 1".into());
        assert!(err.to_string().starts_with("Queue store corrupt"));
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk gone");
        let err: MailCadenceError = io.into();
        assert!(matches!(err, MailCadenceError::Io(_)));
    }
}
