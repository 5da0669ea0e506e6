//! Shared types for the triage pipeline.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::drafts::model::Draft;
use crate::error::MailError;

// ── Inbound message ─────────────────────────────────────────────────

/// An unread message pulled from the mail source.
///
/// Immutable once fetched. Identity is the server-assigned id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Server-assigned id (IMAP UID).
    pub id: String,
    /// Sender address.
    pub sender: String,
    /// Human-readable sender name (if available).
    pub sender_name: Option<String>,
    /// Subject line, empty when the message has none.
    pub subject: String,
    /// Plain-text body, possibly truncated.
    pub body: String,
    /// When the message was received.
    pub received_at: DateTime<Utc>,
}

impl InboundMessage {
    /// Text the classifier looks at.
    pub fn classification_text(&self) -> String {
        format!("{} {}", self.subject, self.body)
    }

    /// Name to address a reply to.
    pub fn display_sender(&self) -> &str {
        self.sender_name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or(&self.sender)
    }
}

// ── Category ────────────────────────────────────────────────────────

/// Priority category assigned by the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Urgent,
    NeedsReply,
    Informational,
}

impl Category {
    /// All categories in priority order.
    pub const ALL: [Category; 3] = [Self::Urgent, Self::NeedsReply, Self::Informational];

    /// Stable key used in storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Urgent => "urgent",
            Self::NeedsReply => "needs_reply",
            Self::Informational => "informational",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Urgent => write!(f, "Urgent"),
            Self::NeedsReply => write!(f, "Needs Reply"),
            Self::Informational => write!(f, "Informational"),
        }
    }
}

impl std::str::FromStr for Category {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "urgent" => Ok(Self::Urgent),
            "needs_reply" => Ok(Self::NeedsReply),
            "informational" => Ok(Self::Informational),
            _ => Err(format!("Unknown category: {}", s)),
        }
    }
}

// ── Reply provenance ────────────────────────────────────────────────

/// How a draft reply was produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum ReplySource {
    /// Generated by the language-model backend.
    Backend { model: String },
    /// Fixed per-category template.
    Template,
}

impl ReplySource {
    /// Short label for logging and display.
    pub fn label(&self) -> &str {
        match self {
            Self::Backend { model } => model,
            Self::Template => "template",
        }
    }
}

// ── Triaged message ─────────────────────────────────────────────────

/// A message after classification and draft generation.
#[derive(Debug, Clone)]
pub struct TriagedMessage {
    pub message: InboundMessage,
    pub category: Category,
    /// Keywords of the winning category found in the message.
    pub matched_keywords: Vec<String>,
    /// Editable draft reply.
    pub draft: Draft,
    pub reply_source: ReplySource,
}

// ── Mail source trait ───────────────────────────────────────────────

/// Pull-based source of unread messages.
#[async_trait]
pub trait MailSource: Send + Sync {
    /// Source name for logging.
    fn name(&self) -> &str;

    /// Fetch up to `limit` unread messages, newest first.
    async fn fetch_unread(&self, limit: usize) -> Result<Vec<InboundMessage>, MailError>;
}
