//! Draft data model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DraftError;
use crate::pipeline::types::{Category, InboundMessage};

/// An editable reply to one fetched message.
///
/// Created on generation, mutated by user edits, persisted on save.
/// Drafts are never deleted automatically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Draft {
    /// Id of the message this draft answers.
    pub message_id: String,
    /// Current reply text.
    pub reply_text: String,
    /// When the draft was first generated.
    pub created_at: DateTime<Utc>,
    /// When the draft was last changed.
    pub updated_at: DateTime<Utc>,
    /// Whether the user changed the generated text.
    pub edited: bool,
    /// Sender of the original message.
    pub sender: String,
    /// Subject of the original message.
    pub subject: String,
    /// Category the message had when the draft was generated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,
}

impl Draft {
    /// Create a fresh draft for a fetched message.
    pub fn for_message(
        message: &InboundMessage,
        category: Category,
        reply_text: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            message_id: message.id.clone(),
            reply_text: reply_text.into(),
            created_at: now,
            updated_at: now,
            edited: false,
            sender: message.sender.clone(),
            subject: message.subject.clone(),
            category: Some(category),
        }
    }

    /// Replace the reply text with a user edit.
    ///
    /// An edit that leaves the text unchanged does not mark the draft edited.
    pub fn edit(&mut self, new_text: impl Into<String>) {
        let new_text = new_text.into();
        if new_text == self.reply_text {
            return;
        }
        self.reply_text = new_text;
        self.edited = true;
        self.updated_at = Utc::now();
    }

    /// Replace the reply text with a freshly generated one.
    pub fn regenerate(&mut self, reply_text: impl Into<String>, category: Category) {
        self.reply_text = reply_text.into();
        self.category = Some(category);
        self.edited = false;
        self.updated_at = Utc::now();
    }

    /// Check the draft can be persisted.
    pub fn validate(&self) -> Result<(), DraftError> {
        if self.reply_text.trim().is_empty() {
            return Err(DraftError::Empty {
                message_id: self.message_id.clone(),
            });
        }
        Ok(())
    }
}
