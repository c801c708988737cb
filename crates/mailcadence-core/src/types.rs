//! Queue data model: one `QueueItem` per scheduled message.

use serde::{Deserialize, Serialize};

/// Lifecycle status of a queued message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum QueueStatus {
    /// Created by the orchestrator, waiting for approval. Content is editable.
    Draft,
    /// Approved and waiting for its slot (or for a retry).
    Queued,
    /// Delivered by a real transport.
    Sent,
    /// Retry ceiling reached.
    Error,
    /// Completed by a transport that only simulates delivery.
    DryRun,
}

impl QueueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Queued => "queued",
            Self::Sent => "sent",
            Self::Error => "error",
            Self::DryRun => "dry-run",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(Self::Draft),
            "queued" => Some(Self::Queued),
            "sent" => Some(Self::Sent),
            "error" => Some(Self::Error),
            "dry-run" => Some(Self::DryRun),
            _ => None,
        }
    }
}

impl std::fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One scheduled outbound message.
///
/// `send_at`, `created_at` and `sent_at` are epoch milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct QueueItem {
    pub id: String,
    pub recipient: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    pub subject: String,
    pub body: String,
    pub send_at: i64,
    pub status: QueueStatus,
    #[serde(default)]
    pub retries: u32,
    pub created_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sent_at: Option<i64>,
    /// Most recent delivery failure, kept for audit only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl QueueItem {
    /// Create a new draft with a fresh id.
    pub fn draft(
        recipient: &str,
        name: &str,
        company: Option<&str>,
        subject: &str,
        body: &str,
        send_at: i64,
        created_at: i64,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            recipient: recipient.to_string(),
            name: name.to_string(),
            company: company.map(str::to_string),
            subject: subject.to_string(),
            body: body.to_string(),
            send_at,
            status: QueueStatus::Draft,
            retries: 0,
            created_at,
            sent_at: None,
            last_error: None,
        }
    }

    /// Queued and its slot has passed.
    pub fn is_due(&self, now_ms: i64) -> bool {
        self.status == QueueStatus::Queued && self.send_at <= now_ms
    }

    /// Merge a partial update into this item.
    pub fn apply(&mut self, patch: &QueueItemPatch) {
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(retries) = patch.retries {
            self.retries = retries;
        }
        if let Some(sent_at) = patch.sent_at {
            self.sent_at = Some(sent_at);
        }
        if let Some(subject) = &patch.subject {
            self.subject = subject.clone();
        }
        if let Some(body) = &patch.body {
            self.body = body.clone();
        }
        if let Some(last_error) = &patch.last_error {
            self.last_error = Some(last_error.clone());
        }
    }
}

/// Partial update keyed by item id. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueItemPatch {
    pub status: Option<QueueStatus>,
    pub retries: Option<u32>,
    pub sent_at: Option<i64>,
    pub subject: Option<String>,
    pub body: Option<String>,
    pub last_error: Option<String>,
}

impl QueueItemPatch {
    /// Successful delivery through a real transport.
    pub fn sent(at_ms: i64) -> Self {
        Self {
            status: Some(QueueStatus::Sent),
            sent_at: Some(at_ms),
            ..Default::default()
        }
    }

    /// Delivery that was only simulated.
    pub fn dry_run() -> Self {
        Self {
            status: Some(QueueStatus::DryRun),
            ..Default::default()
        }
    }

    /// Failed delivery: new retry count, resulting status and the reason.
    pub fn failed(retries: u32, status: QueueStatus, reason: &str) -> Self {
        Self {
            status: Some(status),
            retries: Some(retries),
            last_error: Some(reason.to_string()),
            ..Default::default()
        }
    }
}

/// Current wall-clock time in epoch milliseconds.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
