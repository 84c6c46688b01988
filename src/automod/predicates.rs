//! Message-content heuristics
//!
//! Each predicate inspects a single message (plus the channel's recent
//! history where needed) against guild-supplied thresholds and answers
//! "should this message be removed". Predicates are pure and never fail;
//! exemption checks live in the evaluator.

use std::sync::LazyLock;

use chrono::Duration;
use regex::Regex;

use super::MessageRecord;

static URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)https?://[^\s]+").expect("invalid URL regex"));

static INVITE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:discord\.gg|discordapp\.com/invite)").expect("invalid invite regex")
});

static MENTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<@[!&]?\d+>").expect("invalid mention regex"));

static CUSTOM_EMOJI_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<a?:\w+:\d+>").expect("invalid emoji regex"));

/// Domains belonging to the platform itself, exempt from the link filter.
const OWN_DOMAINS: [&str; 2] = ["discordapp.com", "discord.gg"];

/// Fraction of alphabetic characters that are uppercase, 0.0 for a message
/// with no letters at all.
fn caps_ratio(text: &str) -> f64 {
    let mut letters = 0usize;
    let mut upper = 0usize;
    for c in text.chars() {
        if c.is_alphabetic() {
            letters += 1;
            if c.is_uppercase() {
                upper += 1;
            }
        }
    }
    if letters == 0 {
        return 0.0;
    }
    upper as f64 / letters as f64
}

/// Count emoji-like tokens in raw content: custom `<:name:id>` tokens plus
/// Unicode emoji scalars.
fn count_emojis(content: &str) -> usize {
    let custom = CUSTOM_EMOJI_RE.find_iter(content).count();
    let stripped = CUSTOM_EMOJI_RE.replace_all(content, "");
    let unicode = stripped.chars().filter(|c| is_emoji_char(*c)).count();
    custom + unicode
}

fn is_emoji_char(c: char) -> bool {
    matches!(u32::from(c),
        0x1F300..=0x1FAFF // symbols, pictographs, supplemental
        | 0x2600..=0x27BF // misc symbols and dingbats
        | 0x1F1E6..=0x1F1FF // regional indicators
        | 0x2B00..=0x2BFF)
}

/// Caps predicate: message is long enough and mostly uppercase.
#[must_use]
pub fn caps(msg: &MessageRecord, threshold: f64, minlength: usize) -> bool {
    msg.clean_content.chars().count() >= minlength && caps_ratio(&msg.clean_content) >= threshold
}

/// Emoji predicate: message is long enough and carries too many emoji tokens.
#[must_use]
pub fn emojis(msg: &MessageRecord, threshold: usize, minlength: usize) -> bool {
    msg.clean_content.chars().count() >= minlength && count_emojis(&msg.content) >= threshold
}

/// Mention predicate: too many user/role mention tokens.
#[must_use]
pub fn mentions(msg: &MessageRecord, threshold: usize) -> bool {
    MENTION_RE.find_iter(&msg.content).count() >= threshold
}

/// Banned-words predicate: any configured substring occurs in raw content.
#[must_use]
pub fn badwords(msg: &MessageRecord, words: &[String]) -> bool {
    words.iter().any(|w| !w.is_empty() && msg.content.contains(w.as_str()))
}

/// Link predicate: any URL pointing outside the platform's own domains.
/// The regex crate has no lookahead, so hosts are checked explicitly.
#[must_use]
pub fn links(msg: &MessageRecord) -> bool {
    URL_RE.find_iter(&msg.content).any(|m| {
        let after_scheme = m
            .as_str()
            .splitn(2, "://")
            .nth(1)
            .unwrap_or_default()
            .to_ascii_lowercase();
        !OWN_DOMAINS.iter().any(|d| after_scheme.starts_with(d))
    })
}

/// Invite predicate: invite-link pattern anywhere in raw content.
#[must_use]
pub fn invites(msg: &MessageRecord) -> bool {
    INVITE_RE.is_match(&msg.content)
}

/// Duplicate-text predicate: within the last `within` minutes of channel
/// history, collect the author's own messages (the current one included);
/// once strictly more than `equals` exist, the two most recent are compared
/// and flagged when their edit distance is at most `distance`.
#[must_use]
pub fn duptext(
    msg: &MessageRecord,
    history: &[MessageRecord],
    within: i64,
    equals: usize,
    distance: usize,
) -> bool {
    let cutoff = msg.created_at - Duration::minutes(within);
    let mut own: Vec<&MessageRecord> = history
        .iter()
        .filter(|m| m.author_id == msg.author_id && m.created_at >= cutoff)
        .collect();
    own.push(msg);

    if own.len() <= equals {
        return false;
    }

    own.sort_by(|x, y| y.created_at.cmp(&x.created_at));
    levenshtein(&own[0].clean_content, &own[1].clean_content) <= distance
}

/// Slow-mode predicate: the author already sent a message within `within`
/// seconds of this one.
#[must_use]
pub fn slowmode(msg: &MessageRecord, history: &[MessageRecord], within: i64) -> bool {
    let cutoff = msg.created_at - Duration::seconds(within);
    history
        .iter()
        .any(|m| m.author_id == msg.author_id && m.created_at >= cutoff && m.created_at <= msg.created_at)
}

/// Levenshtein edit distance over Unicode scalar values.
#[must_use]
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn msg(author_id: u64, content: &str) -> MessageRecord {
        MessageRecord::new(author_id, content, content, Utc::now())
    }

    #[test]
    fn test_levenshtein() {
        assert_eq!(levenshtein("", ""), 0);
        assert_eq!(levenshtein("abc", ""), 3);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("same text", "same text"), 0);
        assert_eq!(levenshtein("héllo", "hello"), 1);
    }

    #[test]
    fn test_caps_all_upper_flags_for_any_threshold_up_to_one() {
        let m = msg(1, "THIS IS ALL CAPS TEXT");
        for threshold in [0.1, 0.5, 0.9, 1.0] {
            assert!(caps(&m, threshold, 10), "threshold {threshold}");
        }
    }

    #[test]
    fn test_caps_all_lower_never_flags_above_zero() {
        let m = msg(1, "this is all lowercase");
        for threshold in [0.01, 0.5, 1.0] {
            assert!(!caps(&m, threshold, 10), "threshold {threshold}");
        }
    }

    #[test]
    fn test_caps_respects_minlength() {
        let m = msg(1, "LOUD");
        assert!(!caps(&m, 0.5, 10));
        assert!(caps(&m, 0.5, 4));
    }

    #[test]
    fn test_caps_ignores_non_alphabetic() {
        // digits and punctuation don't count towards the ratio
        let m = msg(1, "AAAA 1234 !!!! aaaa");
        assert!(caps(&m, 0.5, 5));
        assert!(!caps(&m, 0.6, 5));
    }

    #[test]
    fn test_emojis_counts_custom_and_unicode() {
        let m = msg(1, "look <:pog:1234> 🎉🎉 <a:dance:5678> padding text");
        assert!(emojis(&m, 4, 10));
        assert!(!emojis(&m, 5, 10));
    }

    #[test]
    fn test_mentions_counts_user_and_role_tokens() {
        let m = msg(1, "<@111> <@!222> <@&333> hello");
        assert!(mentions(&m, 3));
        assert!(!mentions(&m, 4));
    }

    #[test]
    fn test_badwords_substring_match() {
        let m = msg(1, "well frickle my sticks");
        assert!(badwords(&m, &["frickle".to_string()]));
        assert!(!badwords(&m, &["darn".to_string()]));
        assert!(!badwords(&m, &[]));
        // empty configured word must not match everything
        assert!(!badwords(&m, &[String::new()]));
    }

    #[test]
    fn test_links_excludes_own_domains() {
        assert!(links(&msg(1, "see https://example.com/page")));
        assert!(links(&msg(1, "HTTP://EXAMPLE.COM shouting")));
        assert!(!links(&msg(1, "join https://discord.gg/abcdef")));
        assert!(!links(&msg(1, "https://discordapp.com/invite/xyz")));
        assert!(!links(&msg(1, "no links here")));
        // one foreign link among platform links still flags
        assert!(links(&msg(1, "https://discord.gg/a and https://evil.example")));
    }

    #[test]
    fn test_invites() {
        assert!(invites(&msg(1, "join discord.gg/abcdef now")));
        assert!(invites(&msg(1, "https://discordapp.com/invite/xyz")));
        assert!(!invites(&msg(1, "nothing to see")));
    }

    #[test]
    fn test_duptext_identical_consecutive_messages_flag() {
        let now = Utc::now();
        let earlier = MessageRecord::new(7, "spam spam", "spam spam", now - Duration::seconds(30));
        let current = MessageRecord::new(7, "spam spam", "spam spam", now);
        // equals=1: two messages within the window is one too many
        assert!(duptext(&current, &[earlier], 3, 1, 0));
    }

    #[test]
    fn test_duptext_disjoint_content_does_not_flag() {
        let now = Utc::now();
        let earlier = MessageRecord::new(
            7,
            "completely different words",
            "completely different words",
            now - Duration::seconds(30),
        );
        let current = MessageRecord::new(7, "zzzzz", "zzzzz", now);
        assert!(!duptext(&current, &[earlier], 3, 1, 3));
    }

    #[test]
    fn test_duptext_needs_more_than_equals_messages() {
        let now = Utc::now();
        let current = MessageRecord::new(7, "spam", "spam", now);
        // only the current message exists; equals=1 not exceeded
        assert!(!duptext(&current, &[], 3, 1, 0));
    }

    #[test]
    fn test_duptext_ignores_messages_outside_window() {
        let now = Utc::now();
        let stale = MessageRecord::new(7, "spam", "spam", now - Duration::minutes(10));
        let current = MessageRecord::new(7, "spam", "spam", now);
        assert!(!duptext(&current, &[stale], 3, 1, 0));
    }

    #[test]
    fn test_duptext_ignores_other_authors() {
        let now = Utc::now();
        let other = MessageRecord::new(8, "spam", "spam", now - Duration::seconds(5));
        let current = MessageRecord::new(7, "spam", "spam", now);
        assert!(!duptext(&current, &[other], 3, 1, 0));
    }

    #[test]
    fn test_slowmode_within_window_flags() {
        let now = Utc::now();
        let first = MessageRecord::new(7, "one", "one", now - Duration::seconds(1));
        let second = MessageRecord::new(7, "two", "two", now);
        assert!(slowmode(&second, &[first], 10));
    }

    #[test]
    fn test_slowmode_outside_window_does_not_flag() {
        let now = Utc::now();
        let first = MessageRecord::new(7, "one", "one", now - Duration::seconds(11));
        let second = MessageRecord::new(7, "two", "two", now);
        assert!(!slowmode(&second, &[first], 10));
    }

    #[test]
    fn test_slowmode_other_author_does_not_flag() {
        let now = Utc::now();
        let first = MessageRecord::new(8, "one", "one", now - Duration::seconds(1));
        let second = MessageRecord::new(7, "two", "two", now);
        assert!(!slowmode(&second, &[first], 10));
    }
}
