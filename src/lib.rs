//! Inbox triage: fetch unread mail, classify it, draft replies.

pub mod cli;
pub mod config;
pub mod drafts;
pub mod error;
pub mod llm;
pub mod mail;
pub mod pipeline;
pub mod store;
