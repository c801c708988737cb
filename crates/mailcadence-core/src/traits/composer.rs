//! Composer trait: produces subject and body for one recipient.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// One input row of an enqueue batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Recipient {
    #[serde(alias = "email")]
    pub recipient: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
}

impl Recipient {
    pub fn new(recipient: &str) -> Self {
        Self {
            recipient: recipient.to_string(),
            ..Default::default()
        }
    }

    /// Trimmed address, `None` when blank.
    pub fn address(&self) -> Option<&str> {
        let trimmed = self.recipient.trim();
        if trimmed.is_empty() { None } else { Some(trimmed) }
    }
}

/// Sender signature appended under every generated body.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Signature {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub portfolio: String,
    #[serde(default)]
    pub linkedin: String,
    #[serde(default)]
    pub github: String,
}

impl Signature {
    pub fn is_empty(&self) -> bool {
        self.name.is_empty() && self.role.is_empty()
    }
}

/// Batch-wide composition settings.
#[derive(Debug, Clone, Default)]
pub struct ComposeRequest {
    /// Prompt template; `None` uses the composer's built-in template.
    pub prompt_template: Option<String>,
    pub signature: Signature,
}

/// Generated message content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftContent {
    pub subject: String,
    /// HTML body.
    pub body: String,
}

#[async_trait]
pub trait Composer: Send + Sync {
    fn name(&self) -> &str;

    async fn compose(&self, recipient: &Recipient, request: &ComposeRequest) -> Result<DraftContent>;
}
