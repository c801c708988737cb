//! # MailCadence Channels
//! Outbound transports behind the `Transport` trait.

pub mod dry_run;
pub mod email;

use std::sync::Arc;

use mailcadence_core::config::MailCadenceConfig;
use mailcadence_core::error::Result;
use mailcadence_core::traits::Transport;

pub use dry_run::DryRunTransport;
pub use email::SmtpTransport;

/// Pick the transport for this configuration: dry run when enabled, SMTP otherwise.
pub fn build_transport(config: &MailCadenceConfig) -> Result<Arc<dyn Transport>> {
    if config.worker.dry_run {
        tracing::info!("🧪 Dry run enabled: no mail will leave this machine");
        return Ok(Arc::new(DryRunTransport::new()));
    }
    Ok(Arc::new(SmtpTransport::from_config(&config.smtp)?))
}
