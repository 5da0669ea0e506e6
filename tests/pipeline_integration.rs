//! End-to-end: stub mailbox → triage → drafts persisted in libSQL.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use inbox_triage::config::{KeywordConfig, ReplyTemplates};
use inbox_triage::drafts::{GeneratorConfig, ReplyGenerator};
use inbox_triage::error::{DraftError, LlmError, MailError};
use inbox_triage::llm::{CompletionRequest, CompletionResponse, FinishReason, LlmProvider};
use inbox_triage::pipeline::{
    Category, Classifier, InboundMessage, MailSource, ReplySource, TriagePipeline,
};
use inbox_triage::store::{DraftStore, LibSqlBackend};

struct Mailbox {
    messages: Vec<InboundMessage>,
}

#[async_trait]
impl MailSource for Mailbox {
    fn name(&self) -> &str {
        "mailbox"
    }

    async fn fetch_unread(&self, limit: usize) -> Result<Vec<InboundMessage>, MailError> {
        Ok(self.messages.iter().take(limit).cloned().collect())
    }
}

/// Backend that is always down.
struct OfflineLlm;

#[async_trait]
impl LlmProvider for OfflineLlm {
    fn model_name(&self) -> &str {
        "offline"
    }

    async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        Err(LlmError::RequestFailed {
            provider: "offline".into(),
            reason: "connection refused".into(),
        })
    }
}

/// Backend that wraps its answer in prompt echo and rambling.
struct ChattyLlm;

#[async_trait]
impl LlmProvider for ChattyLlm {
    fn model_name(&self) -> &str {
        "chatty"
    }

    async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        Ok(CompletionResponse {
            content: "Subject: Lunch\n\nReply: Friday at noon works for me.\n\nAlso, unrelated thoughts."
                .into(),
            input_tokens: 40,
            output_tokens: 20,
            finish_reason: FinishReason::Stop,
        })
    }
}

fn message(id: &str, subject: &str, body: &str) -> InboundMessage {
    InboundMessage {
        id: id.into(),
        sender: "alice@example.com".into(),
        sender_name: Some("Alice".into()),
        subject: subject.into(),
        body: body.into(),
        received_at: Utc::now(),
    }
}

fn inbox() -> Mailbox {
    Mailbox {
        messages: vec![
            message("103", "URGENT: server down", "Can you look at it?"),
            message("102", "Lunch", "Could you do Friday?"),
            message("101", "Newsletter", "This month in review."),
        ],
    }
}

fn pipeline(llm: Option<Arc<dyn LlmProvider>>) -> TriagePipeline {
    TriagePipeline::new(
        Arc::new(inbox()),
        Classifier::new(&KeywordConfig::default()).unwrap(),
        ReplyGenerator::new(llm, ReplyTemplates::default(), GeneratorConfig::default()),
    )
}

#[tokio::test]
async fn triage_without_backend_uses_templates() {
    let results = pipeline(None).fetch_and_triage(30).await.unwrap();

    let categories: Vec<Category> = results.iter().map(|t| t.category).collect();
    assert_eq!(
        categories,
        vec![Category::Urgent, Category::NeedsReply, Category::Informational]
    );
    assert_eq!(
        results[0].draft.reply_text,
        "Acknowledged, looking into this immediately."
    );
    assert!(results.iter().all(|t| t.reply_source == ReplySource::Template));
    assert!(results.iter().all(|t| !t.draft.reply_text.trim().is_empty()));
}

#[tokio::test]
async fn offline_backend_falls_back_to_templates() {
    let results = pipeline(Some(Arc::new(OfflineLlm)))
        .fetch_and_triage(30)
        .await
        .unwrap();
    assert_eq!(
        results[1].draft.reply_text,
        ReplyTemplates::default().for_category(Category::NeedsReply)
    );
    assert_eq!(results[1].reply_source, ReplySource::Template);
}

#[tokio::test]
async fn backend_reply_is_cleaned() {
    let results = pipeline(Some(Arc::new(ChattyLlm)))
        .fetch_and_triage(1)
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(
        results[0].draft.reply_text,
        "Friday at noon works for me.\n\nRegards,"
    );
}

#[tokio::test]
async fn edited_draft_persists_and_overwrites() {
    let store = LibSqlBackend::new_memory().await.unwrap();
    let mut results = pipeline(None).fetch_and_triage(30).await.unwrap();

    store.save_draft(&results[0].draft).await.unwrap();
    results[0].draft.edit("Restarting the API now, ETA 10 minutes.");
    store.save_draft(&results[0].draft).await.unwrap();

    assert_eq!(store.count_drafts().await.unwrap(), 1);
    let loaded = store.load_draft("103").await.unwrap().unwrap();
    assert_eq!(loaded.reply_text, "Restarting the API now, ETA 10 minutes.");
    assert!(loaded.edited);
    assert_eq!(loaded.category, Some(Category::Urgent));
}

#[tokio::test]
async fn empty_draft_never_stored() {
    let store = LibSqlBackend::new_memory().await.unwrap();
    let mut results = pipeline(None).fetch_and_triage(30).await.unwrap();

    results[2].draft.edit("");
    let err = store.save_draft(&results[2].draft).await.unwrap_err();
    assert!(matches!(err, DraftError::Empty { .. }));
    assert!(store.load_draft("101").await.unwrap().is_none());
}

#[tokio::test]
async fn drafts_survive_restart() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("drafts.db");

    {
        let store = LibSqlBackend::new_local(&path).await.unwrap();
        let results = pipeline(None).fetch_and_triage(2).await.unwrap();
        for triaged in &results {
            store.save_draft(&triaged.draft).await.unwrap();
        }
    }

    let store = LibSqlBackend::new_local(&path).await.unwrap();
    let drafts = store.list_drafts().await.unwrap();
    assert_eq!(drafts.len(), 2);
    let loaded = store.load_draft("102").await.unwrap().unwrap();
    assert_eq!(
        loaded.reply_text,
        ReplyTemplates::default().for_category(Category::NeedsReply)
    );
}
