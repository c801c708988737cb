//! SMTP transport: async lettre over STARTTLS (Gmail by default).
//!
//! Bodies are sent as HTML. When an attachment path is configured the file
//! is read on every send, so replacing it takes effect without a restart; a
//! missing file only logs a warning and the message goes out without it.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use mailcadence_core::config::{SmtpConfig, expand_path};
use mailcadence_core::error::{MailCadenceError, Result};
use mailcadence_core::traits::{Delivery, OutgoingMail, Transport};

/// SMTP transport built once from `[smtp]`.
pub struct SmtpTransport {
    from: Mailbox,
    attachment: Option<PathBuf>,
    mailer: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpTransport {
    pub fn from_config(config: &SmtpConfig) -> Result<Self> {
        if !config.has_credentials() {
            return Err(MailCadenceError::Config(
                "SMTP sender email and password are required unless dry run is enabled".into(),
            ));
        }
        let from = sender_mailbox(config)?;

        let creds = Credentials::new(config.sender_email.clone(), config.password.clone());
        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            .map_err(|e| MailCadenceError::Config(format!("SMTP relay: {e}")))?
            .port(config.port)
            .credentials(creds)
            .timeout(Some(Duration::from_secs(config.timeout_secs)))
            .build();

        tracing::info!("📧 SMTP transport: {}:{} as {}", config.host, config.port, from);
        Ok(Self {
            from,
            attachment: config.attachment_path.as_deref().map(expand_path),
            mailer,
        })
    }

    /// Build the MIME message, with the attachment when one is given.
    pub fn build_message(
        &self,
        mail: &OutgoingMail,
        attachment: Option<(String, Vec<u8>)>,
    ) -> Result<Message> {
        let to: Mailbox = mail
            .to
            .parse()
            .map_err(|e| MailCadenceError::Delivery(format!("Invalid to '{}': {e}", mail.to)))?;

        let builder = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(mail.subject.as_str());

        let built = match attachment {
            Some((filename, bytes)) => {
                let content_type = ContentType::parse(content_type_for(&filename))
                    .map_err(|e| MailCadenceError::Delivery(format!("Attachment type: {e}")))?;
                builder.multipart(
                    MultiPart::mixed()
                        .singlepart(SinglePart::html(mail.body.clone()))
                        .singlepart(Attachment::new(filename).body(bytes, content_type)),
                )
            }
            None => builder
                .header(ContentType::TEXT_HTML)
                .body(mail.body.clone()),
        };
        built.map_err(|e| MailCadenceError::Delivery(format!("Build email: {e}")))
    }

    async fn load_attachment(&self) -> Option<(String, Vec<u8>)> {
        let path = self.attachment.as_deref()?;
        match tokio::fs::read(path).await {
            Ok(bytes) => Some((attachment_name(path), bytes)),
            Err(e) => {
                tracing::warn!(
                    "⚠️ Attachment {} not readable ({e}), sending without it",
                    path.display()
                );
                None
            }
        }
    }
}

#[async_trait]
impl Transport for SmtpTransport {
    fn name(&self) -> &str {
        "smtp"
    }

    async fn send(&self, mail: &OutgoingMail) -> Result<Delivery> {
        let attachment = self.load_attachment().await;
        let message = self.build_message(mail, attachment)?;
        self.mailer
            .send(message)
            .await
            .map_err(|e| MailCadenceError::Delivery(format!("SMTP send: {e}")))?;
        tracing::info!("📤 Email sent to: {}", mail.to);
        Ok(Delivery::Sent)
    }
}

fn sender_mailbox(config: &SmtpConfig) -> Result<Mailbox> {
    let raw = match config.display_name.as_deref().filter(|n| !n.trim().is_empty()) {
        Some(name) => format!("{name} <{}>", config.sender_email),
        None => config.sender_email.clone(),
    };
    raw.parse()
        .map_err(|e| MailCadenceError::Config(format!("Invalid sender '{raw}': {e}")))
}

fn attachment_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "attachment".into())
}

fn content_type_for(filename: &str) -> &'static str {
    let lower = filename.to_ascii_lowercase();
    if lower.ends_with(".pdf") {
        "application/pdf"
    } else if lower.ends_with(".txt") {
        "text/plain"
    } else {
        "application/octet-stream"
    }
}
