//! Triage pipeline: fetch, classify and draft a reply for each message.
//!
//! Flow:
//! 1. Mail source → unread messages, newest first
//! 2. Classifier (keyword rules, no backend) → category
//! 3. Reply generator → draft, with template fallback
//!
//! Messages are processed one at a time in fetch order. Only mail source
//! failures propagate; backend failures end in a template reply.

use std::sync::Arc;

use tracing::{debug, info};

use crate::drafts::generator::ReplyGenerator;
use crate::drafts::model::Draft;
use crate::error::PipelineError;
use crate::pipeline::rules::Classifier;
use crate::pipeline::types::{InboundMessage, MailSource, TriagedMessage};

/// Runs messages through classification and reply generation.
pub struct TriagePipeline {
    source: Arc<dyn MailSource>,
    classifier: Classifier,
    generator: ReplyGenerator,
}

impl TriagePipeline {
    /// Create a new pipeline.
    pub fn new(
        source: Arc<dyn MailSource>,
        classifier: Classifier,
        generator: ReplyGenerator,
    ) -> Self {
        Self {
            source,
            classifier,
            generator,
        }
    }

    /// The classifier, for keyword highlighting.
    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    /// Whether replies can come from a backend.
    pub fn has_backend(&self) -> bool {
        self.generator.has_backend()
    }

    /// Fetch up to `limit` unread messages and triage each of them.
    ///
    /// Results keep the source's order.
    pub async fn fetch_and_triage(
        &self,
        limit: usize,
    ) -> Result<Vec<TriagedMessage>, PipelineError> {
        info!(source = self.source.name(), limit, "Fetching unread messages");
        let messages = self.source.fetch_unread(limit).await?;
        Ok(self.triage_batch(messages).await)
    }

    /// Triage a batch of already-fetched messages, sequentially.
    pub async fn triage_batch(&self, messages: Vec<InboundMessage>) -> Vec<TriagedMessage> {
        let count = messages.len();
        let mut results = Vec::with_capacity(count);
        for message in messages {
            results.push(self.triage(message).await);
        }
        info!(count, "Triage complete");
        results
    }

    /// Classify one message and draft a reply for it.
    pub async fn triage(&self, message: InboundMessage) -> TriagedMessage {
        let category = self.classifier.classify(&message);
        let matched_keywords = self
            .classifier
            .matched_keywords(&message.classification_text(), category);
        let reply = self.generator.generate(&message, category).await;

        debug!(
            id = %message.id,
            category = category.as_str(),
            source = reply.source.label(),
            "Message triaged"
        );

        let draft = Draft::for_message(&message, category, reply.text);
        TriagedMessage {
            message,
            category,
            matched_keywords,
            draft,
            reply_source: reply.source,
        }
    }

    /// Generate a fresh draft for an already-triaged message.
    ///
    /// Replaces any edits the user made.
    pub async fn regenerate(&self, triaged: &mut TriagedMessage) {
        let reply = self
            .generator
            .generate(&triaged.message, triaged.category)
            .await;
        triaged.draft.regenerate(reply.text, triaged.category);
        triaged.reply_source = reply.source;
        info!(
            id = %triaged.message.id,
            source = triaged.reply_source.label(),
            "Draft regenerated"
        );
    }
}
