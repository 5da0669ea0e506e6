//! Mail source: IMAP fetching and RFC 822 parsing.

pub mod imap;
pub mod message;

pub use imap::{EmailConfig, ImapMailSource};
pub use message::parse_raw_message;
