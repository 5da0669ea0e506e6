//! Keyword classifier.
//!
//! Assigns every message exactly one [`Category`]:
//! - any urgent keyword → Urgent
//! - else any needs-reply keyword → Needs Reply
//! - else → Informational
//!
//! Keywords match case-insensitively as literal substrings. When a message
//! carries keywords from several categories the higher-priority category
//! wins; how many keywords matched never matters.

use regex::{Regex, RegexSet};
use tracing::debug;

use crate::config::KeywordConfig;
use crate::error::ConfigError;
use crate::pipeline::types::{Category, InboundMessage};

/// Compiled keyword list for one category.
#[derive(Debug, Clone)]
struct KeywordRule {
    category: Category,
    keywords: Vec<String>,
    set: RegexSet,
}

impl KeywordRule {
    fn compile(category: Category, raw: &[String]) -> Result<Self, ConfigError> {
        let keywords: Vec<String> = raw
            .iter()
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();

        let patterns = keywords
            .iter()
            .map(|k| format!("(?i){}", regex::escape(k)));
        let set = RegexSet::new(patterns)?;

        Ok(Self {
            category,
            keywords,
            set,
        })
    }
}

/// Deterministic, side-effect-free keyword classifier.
#[derive(Debug, Clone)]
pub struct Classifier {
    /// Rules in priority order. Informational is the fallthrough.
    rules: Vec<KeywordRule>,
}

impl Classifier {
    /// Build a classifier from configured keyword lists.
    pub fn new(keywords: &KeywordConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            rules: vec![
                KeywordRule::compile(Category::Urgent, &keywords.urgent)?,
                KeywordRule::compile(Category::NeedsReply, &keywords.needs_reply)?,
            ],
        })
    }

    /// Classifier with the built-in keyword lists.
    pub fn default_rules() -> Self {
        // Default keywords are escaped literals, so compilation cannot fail.
        Self::new(&KeywordConfig::default()).unwrap_or_else(|_| Self::empty())
    }

    /// Classifier with no keywords (for testing): everything is Informational.
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// Classify free text.
    pub fn classify_text(&self, text: &str) -> Category {
        self.rules
            .iter()
            .find(|rule| rule.set.is_match(text))
            .map(|rule| rule.category)
            .unwrap_or(Category::Informational)
    }

    /// Classify a message by its subject and body.
    pub fn classify(&self, message: &InboundMessage) -> Category {
        let category = self.classify_text(&message.classification_text());
        debug!(id = %message.id, category = %category, "Message classified");
        category
    }

    /// Keywords of `category` present in `text`, in configured order.
    ///
    /// Informational has no keywords, so it always yields an empty list.
    pub fn matched_keywords(&self, text: &str, category: Category) -> Vec<String> {
        let Some(rule) = self.rules.iter().find(|r| r.category == category) else {
            return Vec::new();
        };
        rule.set
            .matches(text)
            .into_iter()
            .map(|i| rule.keywords[i].clone())
            .collect()
    }

    /// Byte ranges of every keyword occurrence for `category` in `text`.
    ///
    /// Ranges are sorted and non-overlapping, ready for highlighting.
    pub fn keyword_spans(&self, text: &str, category: Category) -> Vec<(usize, usize)> {
        let keywords = self.matched_keywords(text, category);
        if keywords.is_empty() {
            return Vec::new();
        }

        // Longest first so "server down" wins over a shorter overlapping keyword.
        let mut sorted = keywords;
        sorted.sort_by_key(|k| std::cmp::Reverse(k.len()));
        let alternation = sorted
            .iter()
            .map(|k| regex::escape(k))
            .collect::<Vec<_>>()
            .join("|");

        match Regex::new(&format!("(?i){alternation}")) {
            Ok(re) => re.find_iter(text).map(|m| (m.start(), m.end())).collect(),
            Err(_) => Vec::new(),
        }
    }
}
