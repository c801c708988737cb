//! MailCadence configuration system.
//!
//! Loaded from `~/.mailcadence/config.toml` (or an explicit path), then
//! overlaid with environment variables for secrets and scheduling knobs.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{MailCadenceError, Result};
use crate::traits::composer::Signature;

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MailCadenceConfig {
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub smtp: SmtpConfig,
    #[serde(default)]
    pub compose: ComposeConfig,
}

impl MailCadenceConfig {
    /// Load config from the default path, falling back to defaults when absent.
    pub fn load() -> Result<Self> {
        Self::load_with(|key| std::env::var(key).ok())
    }

    /// Same as [`load`](Self::load) with an explicit environment lookup.
    pub fn load_with<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let path = Self::default_path();
        let mut config = if path.exists() {
            Self::load_from(&path)?
        } else {
            Self::default()
        };
        config.apply_overrides(lookup)?;
        config.validate()?;
        Ok(config)
    }

    /// Load config from a specific path (no environment overlay).
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| MailCadenceError::Config(format!("Failed to read config: {e}")))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw)
            .map_err(|e| MailCadenceError::Config(format!("Failed to parse config: {e}")))
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the MailCadence home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".mailcadence")
    }

    /// Overlay values from the environment. `lookup` is `std::env::var` in
    /// production and a map in tests.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("GEMINI_API_KEY") {
            self.compose.api_key = v;
        }
        if let Some(v) = get("SENDER_EMAIL") {
            self.smtp.sender_email = v;
        }
        if let Some(v) = get("GMAIL_APP_PASSWORD") {
            self.smtp.password = v;
        }
        if let Some(v) = get("DAILY_LIMIT") {
            self.schedule.daily_limit = v
                .trim()
                .parse()
                .map_err(|e| MailCadenceError::Config(format!("DAILY_LIMIT '{v}': {e}")))?;
        }
        if let Some(v) = get("START_DATE") {
            self.schedule.start_date = Some(v);
        }
        if let Some(v) = get("SEND_WINDOW_START") {
            self.schedule.window_start = v;
        }
        if let Some(v) = get("SEND_WINDOW_END") {
            self.schedule.window_end = v;
        }
        if let Some(v) = get("DRY_RUN") {
            self.worker.dry_run = v.trim().eq_ignore_ascii_case("true");
        }
        if let Some(v) = get("MAILCADENCE_QUEUE") {
            self.queue.path = v;
        }
        Ok(())
    }

    /// Reject settings the worker cannot run with. Schedule parameters are
    /// validated by the slot scheduler itself.
    pub fn validate(&self) -> Result<()> {
        if self.worker.jitter_min_secs > self.worker.jitter_max_secs {
            return Err(MailCadenceError::Config(format!(
                "worker.jitter_min_secs ({}) exceeds worker.jitter_max_secs ({})",
                self.worker.jitter_min_secs, self.worker.jitter_max_secs
            )));
        }
        if self.worker.idle_secs == 0 {
            return Err(MailCadenceError::Config(
                "worker.idle_secs must be at least 1".into(),
            ));
        }
        if self.compose.api_key.is_empty() {
            tracing::warn!("⚠️ GEMINI_API_KEY is not set, composing drafts will fail");
        }
        if !self.worker.dry_run && !self.smtp.has_credentials() {
            tracing::warn!("⚠️ SENDER_EMAIL or GMAIL_APP_PASSWORD is not set");
        }
        Ok(())
    }
}

/// Expand `~` in a configured path.
pub fn expand_path(p: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(p).to_string())
}

/// Slot scheduler defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// `YYYY-MM-DD`; `None` means today.
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default = "default_window_start")]
    pub window_start: String,
    #[serde(default = "default_window_end")]
    pub window_end: String,
    #[serde(default = "default_daily_limit")]
    pub daily_limit: u32,
}

fn default_window_start() -> String { "09:00".into() }
fn default_window_end() -> String { "18:00".into() }
fn default_daily_limit() -> u32 { 30 }

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            start_date: None,
            window_start: default_window_start(),
            window_end: default_window_end(),
            daily_limit: default_daily_limit(),
        }
    }
}

/// Dispatch worker pacing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    #[serde(default = "default_jitter_min")]
    pub jitter_min_secs: u64,
    #[serde(default = "default_jitter_max")]
    pub jitter_max_secs: u64,
    #[serde(default = "default_idle")]
    pub idle_secs: u64,
    /// Log messages instead of sending them; items end as `dry-run`.
    #[serde(default)]
    pub dry_run: bool,
}

fn default_jitter_min() -> u64 { 30 }
fn default_jitter_max() -> u64 { 50 }
fn default_idle() -> u64 { 30 }

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            jitter_min_secs: default_jitter_min(),
            jitter_max_secs: default_jitter_max(),
            idle_secs: default_idle(),
            dry_run: false,
        }
    }
}

/// Which snapshot backend holds the queue.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum QueueBackendKind {
    #[default]
    Json,
    Sqlite,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    #[serde(default = "default_queue_path")]
    pub path: String,
    #[serde(default)]
    pub backend: QueueBackendKind,
}

fn default_queue_path() -> String { "~/.mailcadence/queue.json".into() }

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            path: default_queue_path(),
            backend: QueueBackendKind::default(),
        }
    }
}

impl QueueConfig {
    pub fn resolved_path(&self) -> PathBuf {
        expand_path(&self.path)
    }
}

/// SMTP transport settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    #[serde(default = "default_smtp_host")]
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    #[serde(default)]
    pub sender_email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub display_name: Option<String>,
    /// File attached to every message (e.g. a résumé PDF). Missing file is a warning.
    #[serde(default)]
    pub attachment_path: Option<String>,
    #[serde(default = "default_smtp_timeout")]
    pub timeout_secs: u64,
}

fn default_smtp_host() -> String { "smtp.gmail.com".into() }
fn default_smtp_port() -> u16 { 587 }
fn default_smtp_timeout() -> u64 { 60 }

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: default_smtp_host(),
            port: default_smtp_port(),
            sender_email: String::new(),
            password: String::new(),
            display_name: None,
            attachment_path: None,
            timeout_secs: default_smtp_timeout(),
        }
    }
}

impl SmtpConfig {
    pub fn has_credentials(&self) -> bool {
        !self.sender_email.is_empty() && !self.password.is_empty()
    }
}

/// Content composer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComposeConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default)]
    pub prompt_template_path: Option<String>,
    /// Résumé (PDF or plain text) injected as `{{resumeText}}`.
    #[serde(default)]
    pub resume_text_path: Option<String>,
    #[serde(default)]
    pub signature: Signature,
    /// Pause between composer calls while enqueueing.
    #[serde(default = "default_compose_delay")]
    pub delay_ms: u64,
}

fn default_model() -> String { "gemini-flash-latest".into() }
fn default_endpoint() -> String { "https://generativelanguage.googleapis.com/v1beta".into() }
fn default_compose_delay() -> u64 { 1000 }

impl Default for ComposeConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: default_model(),
            endpoint: default_endpoint(),
            prompt_template_path: None,
            resume_text_path: None,
            signature: Signature::default(),
            delay_ms: default_compose_delay(),
        }
    }
}
