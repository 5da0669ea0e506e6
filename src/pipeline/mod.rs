//! Triage pipeline.
//!
//! Unread messages flow through:
//! 1. `MailSource::fetch_unread()`: mailbox I/O
//! 2. `Classifier::classify()`: keyword rules, first matching category wins
//! 3. `ReplyGenerator::generate()`: backend draft or category template
//!
//! Nothing is sent. Drafts are only persisted when the user saves them.

pub mod processor;
pub mod rules;
pub mod types;

pub use processor::TriagePipeline;
pub use rules::Classifier;
pub use types::{Category, InboundMessage, MailSource, ReplySource, TriagedMessage};
