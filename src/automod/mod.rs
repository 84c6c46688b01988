//! Automod pipeline for warden
//!
//! The evaluator composes a fixed chain of stateless message predicates and
//! returns the first rule a message violates. Predicates operate on plain
//! [`MessageRecord`] snapshots so the whole pipeline can be exercised without
//! a live gateway connection.

mod evaluator;
mod history;
mod predicates;

pub use evaluator::{Exemption, Violation, evaluate};
pub use history::MessageHistory;
pub use predicates::{
    badwords, caps, duptext, emojis, invites, levenshtein, links, mentions, slowmode,
};

use chrono::{DateTime, Utc};

/// Snapshot of one inbound message, detached from the chat framework.
#[derive(Debug, Clone)]
pub struct MessageRecord {
    pub author_id: u64,
    pub author_is_bot: bool,
    /// Raw content as received, mention and emoji tokens intact.
    pub content: String,
    /// Content as displayed to users (mentions resolved to names).
    pub clean_content: String,
    pub created_at: DateTime<Utc>,
}

impl MessageRecord {
    #[must_use]
    pub fn new(
        author_id: u64,
        content: impl Into<String>,
        clean_content: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            author_id,
            author_is_bot: false,
            content: content.into(),
            clean_content: clean_content.into(),
            created_at,
        }
    }
}
