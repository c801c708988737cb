//! Résumé text: PDF or plain-text extraction, plus the prompts that turn a
//! résumé into a `[compose.signature]` block and a starter prompt template.

use std::path::Path;

use mailcadence_core::error::{MailCadenceError, Result};
use mailcadence_core::traits::Signature;

use crate::prompt::{
    COMPANY_PLACEHOLDER, NAME_PLACEHOLDER, RESUME_PLACEHOLDER, strip_code_fence,
};

/// Longest résumé excerpt injected into a prompt, in characters.
pub const RESUME_CHAR_LIMIT: usize = 12_000;

const PDF_MAGIC: &[u8] = b"%PDF";

/// Read a résumé file and extract its text.
pub fn read_resume(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)?;
    extract_text(&bytes)
}

/// Text of a PDF (detected by its `%PDF` header) or of a UTF-8 file,
/// whitespace-normalised and capped at [`RESUME_CHAR_LIMIT`].
pub fn extract_text(bytes: &[u8]) -> Result<String> {
    if bytes.starts_with(PDF_MAGIC) {
        // pdf-extract panics on some malformed files.
        let text = std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem(bytes))
            .map_err(|_| MailCadenceError::Compose("PDF text extraction aborted".into()))?
            .map_err(|e| MailCadenceError::Compose(format!("PDF text extraction: {e}")))?;
        Ok(normalize(&text))
    } else {
        Ok(normalize(&String::from_utf8_lossy(bytes)))
    }
}

/// Collapse whitespace runs, drop blank lines and cap the length.
pub fn normalize(text: &str) -> String {
    let lines: Vec<String> = text
        .lines()
        .map(|l| l.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|l| !l.is_empty())
        .collect();
    lines.join("\n").chars().take(RESUME_CHAR_LIMIT).collect()
}

/// Prompt asking for the contact details as a flat JSON object.
pub fn signature_prompt(resume_text: &str) -> String {
    format!(
        r#"Extract the following contact details strictly from the resume below.
Return the output strictly in JSON format with exactly these keys: "name", "role", "phone", "portfolio", "linkedin", "github".
If a value is not found, use an empty string. Make "role" a concise professional title (e.g. "Software Engineer").
RESUME CONTENT:
---
{resume_text}
---
Ensure no markdown formatting or extra text, just raw JSON string."#
    )
}

/// Parse the model's signature reply. Missing keys stay empty.
pub fn parse_signature(text: &str) -> Result<Signature> {
    let mut sig: Signature = serde_json::from_str(strip_code_fence(text)).map_err(|e| {
        MailCadenceError::Compose(format!("unparseable signature reply ({e})"))
    })?;
    for field in [
        &mut sig.name,
        &mut sig.role,
        &mut sig.phone,
        &mut sig.portfolio,
        &mut sig.linkedin,
        &mut sig.github,
    ] {
        *field = field.trim().to_string();
    }
    Ok(sig)
}

/// Meta-prompt asking the model to write a prompt template for this candidate.
pub fn suggestion_prompt(resume_text: &str) -> String {
    format!(
        r#"Analyze the following resume and write a highly effective SYSTEM PROMPT TEMPLATE.
This template will be used to instruct an AI to write personalized cold emails to recruiters on behalf of this candidate.

CRITICAL INSTRUCTIONS FOR THE TEMPLATE YOU GENERATE:
1. It MUST include the following literal variables EXACTLY as written: {NAME_PLACEHOLDER}, {COMPANY_PLACEHOLDER}, and {RESUME_PLACEHOLDER}.
2. It MUST explicitly instruct the AI to use exactly "Hi {NAME_PLACEHOLDER}," or "Dear {NAME_PLACEHOLDER}," as the greeting. Tell the AI it is FORBIDDEN to use placeholders like [Name] or [Hiring Manager].
3. It MUST explicitly instruct the AI to reference {COMPANY_PLACEHOLDER} in the body of the email.
4. It MUST define the persona (e.g., "You are a [Job Title] with expertise in [Skills]") and provide email guidelines (under 150 words, compelling CTA, professional tone).
5. It MUST instruct the AI to NOT include any sign-off, closing, or signature (like "Best regards", "Sincerely", or the candidate's name) as a custom signature will be appended automatically.
6. It MUST end with instructions to return the output STRICTLY in JSON format with "subject" and "htmlBody" string keys.
7. Do not include any greeting, preamble, or markdown formatting in your response. Output ONLY the raw prompt template text.

RESUME:
---
{resume_text}
---
"#
    )
}

/// Clean up a suggested template. Missing placeholders only warn, the same
/// as a hand-written template file.
pub fn parse_suggestion(text: &str) -> Result<String> {
    let template = strip_code_fence(text).to_string();
    if template.is_empty() {
        return Err(MailCadenceError::Compose("model suggested an empty template".into()));
    }
    for placeholder in [NAME_PLACEHOLDER, COMPANY_PLACEHOLDER, RESUME_PLACEHOLDER] {
        if !template.contains(placeholder) {
            tracing::warn!("⚠️ Suggested template has no {placeholder}");
        }
    }
    Ok(template)
}
