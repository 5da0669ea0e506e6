//! Reply generator. Asks the backend for a draft and falls back to templates.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::ReplyTemplates;
use crate::error::LlmError;
use crate::llm::provider::{ChatMessage, CompletionRequest, LlmProvider};
use crate::pipeline::types::{Category, InboundMessage, ReplySource};

/// Replies shorter than this are treated as a failed generation.
const MIN_REPLY_CHARS: usize = 10;

/// Appended when the backend's reply has no closing.
const SIGN_OFF: &str = "\n\nRegards,";

/// Smallest reply budget that fits a minimal reply plus the sign-off.
pub const MIN_REPLY_BUDGET: usize = MIN_REPLY_CHARS + SIGN_OFF.len();

/// Words that count as a closing.
const CLOSINGS: &[&str] = &["regards", "thank", "best", "sincerely"];

/// Configuration for reply generation.
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// Max tokens for the backend response.
    pub max_tokens: u32,
    /// Backend sampling temperature.
    pub temperature: f32,
    /// Upper bound on the returned reply, in characters.
    pub max_reply_chars: usize,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            max_tokens: 150,
            temperature: 0.7,
            max_reply_chars: 600,
        }
    }
}

/// A reply and where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedReply {
    pub text: String,
    pub source: ReplySource,
}

/// Produces a short reply for a message.
///
/// Uses the backend when one is configured. Any backend failure, or no
/// backend at all, yields the category's template unchanged.
pub struct ReplyGenerator {
    backend: Option<Arc<dyn LlmProvider>>,
    templates: ReplyTemplates,
    config: GeneratorConfig,
}

impl ReplyGenerator {
    /// Create a new reply generator.
    pub fn new(
        backend: Option<Arc<dyn LlmProvider>>,
        templates: ReplyTemplates,
        config: GeneratorConfig,
    ) -> Self {
        Self {
            backend,
            templates,
            config,
        }
    }

    /// Generator that only ever uses templates.
    pub fn templates_only(templates: ReplyTemplates) -> Self {
        Self::new(None, templates, GeneratorConfig::default())
    }

    /// Whether a backend is configured.
    pub fn has_backend(&self) -> bool {
        self.backend.is_some()
    }

    /// Generate a reply for `message` in `category`.
    pub async fn generate(&self, message: &InboundMessage, category: Category) -> GeneratedReply {
        let Some(ref backend) = self.backend else {
            debug!(id = %message.id, "No reply backend configured, using template");
            return self.template_reply(category);
        };

        match self.generate_with_backend(backend.as_ref(), message).await {
            Ok(text) => {
                info!(
                    id = %message.id,
                    model = backend.model_name(),
                    "Generated reply with backend"
                );
                GeneratedReply {
                    text,
                    source: ReplySource::Backend {
                        model: backend.model_name().to_string(),
                    },
                }
            }
            Err(e) => {
                warn!(
                    id = %message.id,
                    error = %e,
                    "Reply backend failed, falling back to template"
                );
                self.template_reply(category)
            }
        }
    }

    async fn generate_with_backend(
        &self,
        backend: &dyn LlmProvider,
        message: &InboundMessage,
    ) -> Result<String, LlmError> {
        let request = CompletionRequest::new(vec![
            ChatMessage::system("You are a helpful, professional assistant."),
            ChatMessage::user(build_reply_prompt(message)),
        ])
        .with_temperature(self.config.temperature)
        .with_max_tokens(self.config.max_tokens);

        let response = backend.complete(request).await?;
        clean_backend_reply(&response.content, self.config.max_reply_chars)
    }

    fn template_reply(&self, category: Category) -> GeneratedReply {
        let template = self.templates.for_category(category);
        let text = if template.trim().is_empty() {
            // Unvalidated templates: keep the non-empty guarantee.
            ReplyTemplates::default().for_category(category).to_string()
        } else {
            template.to_string()
        };
        GeneratedReply {
            text,
            source: ReplySource::Template,
        }
    }
}

/// Build the user prompt for a reply.
fn build_reply_prompt(message: &InboundMessage) -> String {
    format!(
        "Write a concise reply email to {sender} about the following message.\n\n\
         Subject: {subject}\n\n\
         Message: {body}\n\n\
         Reply:",
        sender = message.display_sender(),
        subject = message.subject,
        body = message.body,
    )
}

/// Turn raw backend output into a usable reply.
///
/// Keeps the text after the last `Reply:` marker, then only its first
/// paragraph. Adds a sign-off if the reply has no closing and caps the
/// length at `max_chars`.
fn clean_backend_reply(raw: &str, max_chars: usize) -> Result<String, LlmError> {
    let after_marker = raw.rsplit("Reply:").next().unwrap_or(raw);
    let first_paragraph = after_marker
        .trim()
        .split("\n\n")
        .next()
        .unwrap_or_default()
        .trim();

    if first_paragraph.chars().count() < MIN_REPLY_CHARS {
        return Err(LlmError::Rejected(format!(
            "reply too short ({} chars)",
            first_paragraph.chars().count()
        )));
    }

    let lower = first_paragraph.to_lowercase();
    let needs_sign_off = !CLOSINGS.iter().any(|c| lower.contains(c));
    let budget = if needs_sign_off {
        max_chars.saturating_sub(SIGN_OFF.chars().count())
    } else {
        max_chars
    };

    let mut reply = truncate_chars(first_paragraph, budget);
    if reply.chars().count() < MIN_REPLY_CHARS {
        return Err(LlmError::Rejected(format!(
            "reply does not fit in {max_chars} chars"
        )));
    }
    if needs_sign_off {
        reply.push_str(SIGN_OFF);
    }
    Ok(reply)
}

/// Cut `text` to at most `max` characters, preferring a word boundary.
fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let cut: String = text.chars().take(max).collect();
    match cut.rfind(char::is_whitespace) {
        Some(pos) if pos > 0 => cut[..pos].trim_end().to_string(),
        _ => cut,
    }
}
