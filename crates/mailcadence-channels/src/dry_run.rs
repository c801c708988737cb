//! Dry-run transport: logs the message and reports a simulated delivery.

use async_trait::async_trait;
use mailcadence_core::error::Result;
use mailcadence_core::traits::{Delivery, OutgoingMail, Transport};

#[derive(Debug, Default, Clone, Copy)]
pub struct DryRunTransport;

impl DryRunTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for DryRunTransport {
    fn name(&self) -> &str {
        "dry-run"
    }

    async fn send(&self, mail: &OutgoingMail) -> Result<Delivery> {
        tracing::info!("🧪 [DRY RUN] Would send to {}: {}", mail.to, mail.subject);
        tracing::debug!("🧪 [DRY RUN] Body ({} bytes)", mail.body.len());
        Ok(Delivery::Simulated)
    }
}
