//! Prompt templates and the model's JSON reply.

use std::path::Path;

use mailcadence_core::error::{MailCadenceError, Result};
use mailcadence_core::traits::{DraftContent, Recipient};
use serde::Deserialize;

pub const NAME_PLACEHOLDER: &str = "{{inferredName}}";
pub const COMPANY_PLACEHOLDER: &str = "{{inferredCompany}}";
pub const RESUME_PLACEHOLDER: &str = "{{resumeText}}";

/// Built-in template used when no custom one is configured.
pub const DEFAULT_TEMPLATE: &str = r#"You are a professional software engineer reaching out to a recruiter.
I have provided my resume content below to help you personalize the email.
RESUME CONTENT:
---
{{resumeText}}
---

Create a highly personalized, professional, and concise email (under 150 words) for a recruiter.
CRITICAL INSTRUCTIONS:
1. You MUST start the email with exactly "Hi {{inferredName}}," or "Dear {{inferredName}}," and NEVER use placeholders like [Name] or [Hiring Manager].
2. You MUST explicitly reference {{inferredCompany}} in the body of the email.
3. Use specific details from my resume (skills, projects, or experience) that would be relevant to {{inferredCompany}} to make the email stand out.
4. DO NOT include any sign-off, closing, or signature (like "Best regards", "Sincerely", or your name) at the end of the email. A custom HTML signature will be automatically appended.

Return the output strictly in JSON format as follows:
{
  "subject": "Compelling subject line",
  "htmlBody": "<p>Hi {{inferredName}},</p><p>...rest of the email HTML...</p>"
}
No markdown formatting for the json, just raw JSON string."#;

/// Greeting name: the row's name, else the address local part split on
/// `. _ + -` with each piece capitalized.
pub fn infer_name(recipient: &Recipient) -> String {
    if let Some(name) = recipient.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
        return name.to_string();
    }
    let address = recipient.recipient.trim();
    let local = address.split('@').next().unwrap_or(address);
    local
        .split(['.', '_', '+', '-'])
        .map(capitalize)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Company: the row's company, else the first domain label upper-cased,
/// else "your company".
pub fn infer_company(recipient: &Recipient) -> String {
    if let Some(company) = recipient.company.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
        return company.to_string();
    }
    recipient
        .recipient
        .trim()
        .split_once('@')
        .and_then(|(_, domain)| domain.split('.').next())
        .filter(|label| !label.is_empty())
        .map(str::to_uppercase)
        .unwrap_or_else(|| "your company".into())
}

fn capitalize(part: &str) -> String {
    let mut chars = part.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Substitute every placeholder occurrence.
pub fn render(template: &str, name: &str, company: &str, resume_text: &str) -> String {
    template
        .replace(NAME_PLACEHOLDER, name)
        .replace(COMPANY_PLACEHOLDER, company)
        .replace(RESUME_PLACEHOLDER, resume_text)
}

/// Read a template file; missing placeholders are only worth a warning.
pub fn load_template(path: &Path) -> Result<String> {
    let template = std::fs::read_to_string(path).map_err(|e| {
        MailCadenceError::Config(format!("prompt template {}: {e}", path.display()))
    })?;
    for placeholder in [NAME_PLACEHOLDER, COMPANY_PLACEHOLDER] {
        if !template.contains(placeholder) {
            tracing::warn!("⚠️ Prompt template {} has no {placeholder}", path.display());
        }
    }
    Ok(template)
}

/// Strip a leading ```lang fence and a trailing ``` fence.
pub fn strip_code_fence(text: &str) -> &str {
    let mut s = text.trim();
    if let Some(rest) = s.strip_prefix("```") {
        let lang_len = rest
            .find(|c: char| !c.is_ascii_lowercase())
            .unwrap_or(rest.len());
        s = rest[lang_len..].trim_start();
    }
    if let Some(rest) = s.strip_suffix("```") {
        s = rest.trim_end();
    }
    s
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModelReply {
    subject: String,
    html_body: String,
}

/// Parse the model's `{"subject", "htmlBody"}` reply.
pub fn parse_reply(text: &str) -> Result<DraftContent> {
    let reply: ModelReply = serde_json::from_str(strip_code_fence(text)).map_err(|e| {
        MailCadenceError::Compose(format!("unparseable model reply ({e}): {}", preview(text)))
    })?;
    if reply.subject.trim().is_empty() {
        return Err(MailCadenceError::Compose("model reply has an empty subject".into()));
    }
    Ok(DraftContent {
        subject: reply.subject.trim().to_string(),
        body: reply.html_body,
    })
}

fn preview(text: &str) -> String {
    text.chars().take(120).collect()
}
