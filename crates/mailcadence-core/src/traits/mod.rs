//! Collaborator traits: the core only talks to the outside world through these.

pub mod composer;
pub mod transport;

pub use composer::{ComposeRequest, Composer, DraftContent, Recipient, Signature};
pub use transport::{Delivery, OutgoingMail, Transport};
