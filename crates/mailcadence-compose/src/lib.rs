//! # MailCadence Compose
//! Personalized subject + HTML body per recipient.
//!
//! ```text
//! Recipient ──► infer name / company ──► render prompt template
//!                                          │   ({{inferredName}}, {{inferredCompany}}, {{resumeText}})
//!                                          ▼
//!                              Gemini generateContent (REST)
//!                                          │
//!                  strip ``` fences ──► parse {subject, htmlBody}
//!                                          │
//!                  strip sign-off ──► append HTML signature ──► DraftContent
//! ```

pub mod cache;
pub mod gemini;
pub mod prompt;
pub mod resume;
pub mod signature;

pub use cache::ContentCache;
pub use gemini::GeminiComposer;
