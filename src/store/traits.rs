//! `DraftStore` trait: the async interface for draft persistence.

use async_trait::async_trait;

use crate::drafts::model::Draft;
use crate::error::{DatabaseError, DraftError};

/// Key-value store of drafts, keyed by message id.
#[async_trait]
pub trait DraftStore: Send + Sync {
    /// Run all pending schema migrations.
    async fn run_migrations(&self) -> Result<(), DatabaseError>;

    /// Persist `draft`, overwriting any stored draft for the same message.
    ///
    /// Empty replies are rejected. The first save's `created_at` is kept.
    async fn save_draft(&self, draft: &Draft) -> Result<(), DraftError>;

    /// Get the stored draft for a message, if any.
    async fn load_draft(&self, message_id: &str) -> Result<Option<Draft>, DatabaseError>;

    /// All stored drafts, most recently updated first.
    async fn list_drafts(&self) -> Result<Vec<Draft>, DatabaseError>;

    /// Number of stored drafts.
    async fn count_drafts(&self) -> Result<usize, DatabaseError>;
}
