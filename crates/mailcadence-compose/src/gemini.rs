//! Gemini composer: one `generateContent` call per recipient.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mailcadence_core::config::{ComposeConfig, expand_path};
use mailcadence_core::error::{MailCadenceError, Result};
use mailcadence_core::traits::{ComposeRequest, Composer, DraftContent, Recipient, Signature};
use serde_json::{Value, json};

use crate::cache::ContentCache;
use crate::prompt::{DEFAULT_TEMPLATE, infer_company, infer_name, parse_reply, render};
use crate::resume::{
    extract_text, parse_signature, parse_suggestion, signature_prompt, suggestion_prompt,
};
use crate::signature::finish_body;

pub struct GeminiComposer {
    client: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
    resume_path: Option<PathBuf>,
    cache: Arc<ContentCache>,
}

impl GeminiComposer {
    pub fn from_config(config: &ComposeConfig, cache: Arc<ContentCache>) -> Result<Self> {
        if config.api_key.trim().is_empty() {
            return Err(MailCadenceError::Config(
                "GEMINI_API_KEY (compose.api_key) is missing".into(),
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| MailCadenceError::Config(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            resume_path: config.resume_text_path.as_deref().map(expand_path),
            cache,
        })
    }

    fn url(&self) -> String {
        format!("{}/models/{}:generateContent", self.endpoint, self.model)
    }

    /// Résumé text for `{{resumeText}}`; empty when unset or unreadable.
    pub async fn resume_text(&self) -> String {
        let Some(path) = self.resume_path.as_deref() else {
            return String::new();
        };
        match tokio::fs::read(path).await {
            Ok(bytes) => self.cache.get_or_derive(&bytes, |b| {
                extract_text(b).unwrap_or_else(|e| {
                    tracing::warn!("⚠️ Résumé {}: {e}", path.display());
                    String::new()
                })
            }),
            Err(e) => {
                tracing::warn!("⚠️ Résumé {} not readable: {e}", path.display());
                String::new()
            }
        }
    }

    /// Ask the model for the contact details in a résumé.
    pub async fn extract_signature(&self, resume_text: &str) -> Result<Signature> {
        let reply = self.generate(&signature_prompt(resume_text)).await?;
        let sig = parse_signature(&reply)?;
        tracing::info!("🪪 Signature extracted ({} / {})", sig.name, sig.role);
        Ok(sig)
    }

    /// Ask the model for a prompt template tailored to a résumé.
    pub async fn suggest_prompt(&self, resume_text: &str) -> Result<String> {
        let reply = self.generate(&suggestion_prompt(resume_text)).await?;
        parse_suggestion(&reply)
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }]
        });
        let resp = self
            .client
            .post(self.url())
            .header("Content-Type", "application/json")
            .header("x-goog-api-key", self.api_key.as_str())
            .json(&body)
            .send()
            .await
            .map_err(|e| MailCadenceError::Compose(format!("gemini connection failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(MailCadenceError::Compose(format!(
                "gemini API error {status}: {text}"
            )));
        }

        let json: Value = resp
            .json()
            .await
            .map_err(|e| MailCadenceError::Compose(e.to_string()))?;
        reply_text(&json)
    }
}

#[async_trait]
impl Composer for GeminiComposer {
    fn name(&self) -> &str {
        &self.model
    }

    async fn compose(&self, recipient: &Recipient, request: &ComposeRequest) -> Result<DraftContent> {
        let name = infer_name(recipient);
        let company = infer_company(recipient);
        let resume = self.resume_text().await;
        let template = request.prompt_template.as_deref().unwrap_or(DEFAULT_TEMPLATE);
        let prompt = render(template, &name, &company, &resume);

        tracing::debug!("🤖 Prompt for {} ({} chars)", recipient.recipient, prompt.len());
        let reply = self.generate(&prompt).await?;
        let draft = parse_reply(&reply)?;
        Ok(DraftContent {
            subject: draft.subject,
            body: finish_body(&draft.body, &request.signature),
        })
    }
}

/// Concatenated text parts of the first candidate.
fn reply_text(json: &Value) -> Result<String> {
    let parts = json["candidates"][0]["content"]["parts"]
        .as_array()
        .ok_or_else(|| {
            let reason = json["promptFeedback"]["blockReason"]
                .as_str()
                .or_else(|| json["candidates"][0]["finishReason"].as_str())
                .unwrap_or("no candidates");
            MailCadenceError::Compose(format!("empty gemini response: {reason}"))
        })?;
    let text: String = parts.iter().filter_map(|p| p["text"].as_str()).collect();
    if text.trim().is_empty() {
        return Err(MailCadenceError::Compose("gemini returned no text".into()));
    }
    Ok(text)
}
