//! Bounded recent-message history per channel
//!
//! The duptext and slowmode predicates need the channel's recent messages.
//! Rather than round-tripping to the API on every inbound message, the
//! message handler records each message here and the buffer is consulted
//! locally. Buffers are keyed by (guild, channel) so a guild purge can
//! drop every channel it owned.

use std::collections::VecDeque;
use std::sync::Arc;

use dashmap::DashMap;

use super::MessageRecord;

/// Messages retained per channel. Generous enough for the duptext window at
/// chat speed without growing unbounded.
const PER_CHANNEL_CAP: usize = 64;

/// Per-channel ring buffers of recent messages, oldest first.
#[derive(Debug, Clone, Default)]
pub struct MessageHistory {
    channels: Arc<DashMap<(u64, u64), VecDeque<MessageRecord>>>,
}

impl MessageHistory {
    #[must_use]
    pub fn new() -> Self {
        Self {
            channels: Arc::new(DashMap::new()),
        }
    }

    /// Record a message after it has been evaluated, evicting the oldest
    /// entry once the channel buffer is full.
    pub fn record(&self, guild_id: u64, channel_id: u64, msg: MessageRecord) {
        let mut buf = self.channels.entry((guild_id, channel_id)).or_default();
        if buf.len() == PER_CHANNEL_CAP {
            buf.pop_front();
        }
        buf.push_back(msg);
    }

    /// Snapshot of a channel's recent messages, oldest first.
    #[must_use]
    pub fn recent(&self, guild_id: u64, channel_id: u64) -> Vec<MessageRecord> {
        self.channels
            .get(&(guild_id, channel_id))
            .map(|buf| buf.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Drop one channel's buffer (channel deleted).
    pub fn remove_channel(&self, guild_id: u64, channel_id: u64) {
        self.channels.remove(&(guild_id, channel_id));
    }

    /// Drop every buffer a guild owned (bot left the guild).
    pub fn remove_guild(&self, guild_id: u64) {
        self.channels.retain(|(guild, _), _| *guild != guild_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn msg(author_id: u64, content: &str) -> MessageRecord {
        MessageRecord::new(author_id, content, content, Utc::now())
    }

    #[test]
    fn test_record_and_recent() {
        let history = MessageHistory::new();
        assert!(history.recent(1, 5).is_empty());

        history.record(1, 5, msg(1, "one"));
        history.record(1, 5, msg(2, "two"));
        history.record(1, 6, msg(1, "elsewhere"));

        let recent = history.recent(1, 5);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].content, "one");
        assert_eq!(recent[1].content, "two");
        assert_eq!(history.recent(1, 6).len(), 1);
    }

    #[test]
    fn test_cap_evicts_oldest() {
        let history = MessageHistory::new();
        for i in 0..(PER_CHANNEL_CAP + 10) {
            history.record(1, 5, msg(1, &format!("m{i}")));
        }

        let recent = history.recent(1, 5);
        assert_eq!(recent.len(), PER_CHANNEL_CAP);
        assert_eq!(recent[0].content, "m10");
    }

    #[test]
    fn test_remove_channel() {
        let history = MessageHistory::new();
        history.record(1, 5, msg(1, "one"));
        history.remove_channel(1, 5);
        assert!(history.recent(1, 5).is_empty());
    }

    #[test]
    fn test_remove_guild_drops_all_its_channels() {
        let history = MessageHistory::new();
        history.record(1, 5, msg(1, "one"));
        history.record(1, 6, msg(1, "two"));
        history.record(2, 7, msg(1, "other guild"));

        history.remove_guild(1);

        assert!(history.recent(1, 5).is_empty());
        assert!(history.recent(1, 6).is_empty());
        assert_eq!(history.recent(2, 7).len(), 1);
    }
}
