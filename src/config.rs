//! Configuration types.

use std::path::PathBuf;

use crate::drafts::generator::MIN_REPLY_BUDGET;
use crate::error::ConfigError;
use crate::pipeline::types::Category;

/// Default cap on messages pulled per fetch.
pub const DEFAULT_FETCH_LIMIT: usize = 30;

/// Keywords that mark a message as urgent.
pub const DEFAULT_URGENT_KEYWORDS: &[&str] = &[
    "urgent",
    "asap",
    "immediately",
    "deadline",
    "important",
    "critical",
    "server down",
    "outage",
];

/// Keywords that mark a message as needing a reply.
pub const DEFAULT_NEEDS_REPLY_KEYWORDS: &[&str] = &[
    "question",
    "inquire",
    "could you",
    "can you",
    "please",
    "request",
    "action required",
    "follow up",
];

/// Keyword lists per category, checked in priority order by the classifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordConfig {
    pub urgent: Vec<String>,
    pub needs_reply: Vec<String>,
}

impl Default for KeywordConfig {
    fn default() -> Self {
        Self {
            urgent: DEFAULT_URGENT_KEYWORDS.iter().map(|s| s.to_string()).collect(),
            needs_reply: DEFAULT_NEEDS_REPLY_KEYWORDS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// Fixed replies used when the backend is unavailable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyTemplates {
    pub urgent: String,
    pub needs_reply: String,
    pub informational: String,
}

impl ReplyTemplates {
    /// Template for a category.
    pub fn for_category(&self, category: Category) -> &str {
        match category {
            Category::Urgent => &self.urgent,
            Category::NeedsReply => &self.needs_reply,
            Category::Informational => &self.informational,
        }
    }
}

impl Default for ReplyTemplates {
    fn default() -> Self {
        Self {
            urgent: "Acknowledged, looking into this immediately.".to_string(),
            needs_reply:
                "Thanks for your message. I'll look into this and get back to you shortly."
                    .to_string(),
            informational: "Thanks for the update. I've noted this for reference.".to_string(),
        }
    }
}

/// Triage configuration.
#[derive(Debug, Clone)]
pub struct TriageConfig {
    /// Maximum number of unread messages per fetch.
    pub fetch_limit: usize,
    /// Message bodies longer than this are truncated for display and prompting.
    pub body_preview_chars: usize,
    /// Upper bound on generated reply length.
    pub max_reply_chars: usize,
    /// Keyword lists for the classifier.
    pub keywords: KeywordConfig,
    /// Per-category fallback replies.
    pub templates: ReplyTemplates,
    /// Path of the draft database file.
    pub drafts_db_path: PathBuf,
}

impl Default for TriageConfig {
    fn default() -> Self {
        Self {
            fetch_limit: DEFAULT_FETCH_LIMIT,
            body_preview_chars: 2000,
            max_reply_chars: 600,
            keywords: KeywordConfig::default(),
            templates: ReplyTemplates::default(),
            drafts_db_path: PathBuf::from("./data/drafts.db"),
        }
    }
}

impl TriageConfig {
    /// Build config from environment variables, falling back to defaults.
    ///
    /// - `TRIAGE_FETCH_LIMIT`, `TRIAGE_BODY_PREVIEW_CHARS`, `TRIAGE_MAX_REPLY_CHARS`
    /// - `TRIAGE_URGENT_KEYWORDS`, `TRIAGE_NEEDS_REPLY_KEYWORDS` (comma-separated)
    /// - `TRIAGE_TEMPLATE_URGENT`, `TRIAGE_TEMPLATE_NEEDS_REPLY`, `TRIAGE_TEMPLATE_INFORMATIONAL`
    /// - `TRIAGE_DB_PATH`
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let config = Self {
            fetch_limit: parse_env::<usize>("TRIAGE_FETCH_LIMIT")?.unwrap_or(defaults.fetch_limit),
            body_preview_chars: parse_env::<usize>("TRIAGE_BODY_PREVIEW_CHARS")?
                .unwrap_or(defaults.body_preview_chars),
            max_reply_chars: parse_env::<usize>("TRIAGE_MAX_REPLY_CHARS")?
                .unwrap_or(defaults.max_reply_chars),
            keywords: KeywordConfig {
                urgent: list_env("TRIAGE_URGENT_KEYWORDS").unwrap_or(defaults.keywords.urgent),
                needs_reply: list_env("TRIAGE_NEEDS_REPLY_KEYWORDS")
                    .unwrap_or(defaults.keywords.needs_reply),
            },
            templates: ReplyTemplates {
                urgent: std::env::var("TRIAGE_TEMPLATE_URGENT")
                    .unwrap_or(defaults.templates.urgent),
                needs_reply: std::env::var("TRIAGE_TEMPLATE_NEEDS_REPLY")
                    .unwrap_or(defaults.templates.needs_reply),
                informational: std::env::var("TRIAGE_TEMPLATE_INFORMATIONAL")
                    .unwrap_or(defaults.templates.informational),
            },
            drafts_db_path: std::env::var("TRIAGE_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.drafts_db_path),
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject values the pipeline cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fetch_limit == 0 {
            return Err(ConfigError::InvalidValue {
                key: "TRIAGE_FETCH_LIMIT".into(),
                message: "must be at least 1".into(),
            });
        }
        if self.max_reply_chars < MIN_REPLY_BUDGET {
            return Err(ConfigError::InvalidValue {
                key: "TRIAGE_MAX_REPLY_CHARS".into(),
                message: format!("must be at least {MIN_REPLY_BUDGET}"),
            });
        }
        for (key, template) in [
            ("TRIAGE_TEMPLATE_URGENT", &self.templates.urgent),
            ("TRIAGE_TEMPLATE_NEEDS_REPLY", &self.templates.needs_reply),
            ("TRIAGE_TEMPLATE_INFORMATIONAL", &self.templates.informational),
        ] {
            if template.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    key: key.into(),
                    message: "template must not be empty".into(),
                });
            }
        }
        Ok(())
    }
}

/// Parse an optional numeric environment variable.
pub(crate) fn parse_env<T>(key: &str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            }),
        Err(_) => Ok(None),
    }
}

/// Split a comma-separated environment variable, dropping blank entries.
fn list_env(key: &str) -> Option<Vec<String>> {
    let raw = std::env::var(key).ok()?;
    Some(
        raw.split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
    )
}
