//! # MailCadence Core
//!
//! Shared data model, collaborator traits, configuration and the error
//! taxonomy used by every other MailCadence crate.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::MailCadenceConfig;
pub use error::{MailCadenceError, Result};
pub use types::{QueueItem, QueueItemPatch, QueueStatus};
