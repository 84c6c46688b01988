//! Automod evaluator
//!
//! Composes the individual predicates into the per-message deletion decision:
//! exemptions first, then a fixed-order chain that stops at the first rule a
//! message violates.

use tracing::debug;

use crate::AUTOMOD_TARGET;
use crate::settings::AutomodRules;

use super::{MessageRecord, predicates};

/// Why the evaluator skipped a message entirely.
///
/// The author's standing is resolved by the caller (it needs guild and
/// permission state) and handed in as plain booleans so the evaluator stays
/// framework-free.
#[derive(Debug, Clone, Copy, Default)]
pub struct Exemption {
    /// Message was sent by this bot or any other bot account.
    pub is_bot: bool,
    /// Author is a configured bot owner.
    pub is_owner: bool,
    /// Author holds the manage-messages permission in the channel.
    pub can_manage_messages: bool,
    /// Author holds one of the guild's configured filter roles.
    pub has_filter_role: bool,
}

impl Exemption {
    #[must_use]
    pub fn applies(&self) -> bool {
        self.is_bot || self.is_owner || self.can_manage_messages || self.has_filter_role
    }
}

/// The rule a message violated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Violation {
    Caps,
    DupText,
    Emojis,
    BadWords,
    Invites,
    Links,
    Mentions,
    SlowMode,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Caps => write!(f, "excessive caps"),
            Self::DupText => write!(f, "duplicated text"),
            Self::Emojis => write!(f, "excessive emojis"),
            Self::BadWords => write!(f, "banned words"),
            Self::Invites => write!(f, "invite link"),
            Self::Links => write!(f, "external link"),
            Self::Mentions => write!(f, "excessive mentions"),
            Self::SlowMode => write!(f, "slow mode"),
        }
    }
}

/// Evaluate a message against a guild's automod rules.
///
/// Returns the first violated rule in the fixed order caps, duptext, emojis,
/// badwords, invites, links, mentions, slowmode. The first verdict wins and
/// later predicates are not consulted; this mirrors the sequential deletion
/// chain the bot has always had and is kept deliberately (see DESIGN.md).
#[must_use]
pub fn evaluate(
    msg: &MessageRecord,
    history: &[MessageRecord],
    rules: &AutomodRules,
    exemption: Exemption,
) -> Option<Violation> {
    if !rules.enabled {
        return None;
    }
    if exemption.applies() {
        debug!(
            target: AUTOMOD_TARGET,
            author_id = %msg.author_id,
            "Author exempt from automod"
        );
        return None;
    }

    if rules.caps.enabled
        && predicates::caps(msg, rules.caps.threshold, rules.caps.minlength)
    {
        return Some(Violation::Caps);
    }
    if rules.duptext.enabled
        && predicates::duptext(
            msg,
            history,
            rules.duptext.within,
            rules.duptext.equals,
            rules.duptext.distance,
        )
    {
        return Some(Violation::DupText);
    }
    if rules.emojis.enabled
        && predicates::emojis(msg, rules.emojis.threshold, rules.emojis.minlength)
    {
        return Some(Violation::Emojis);
    }
    if rules.badwords.enabled && predicates::badwords(msg, &rules.badwords.words) {
        return Some(Violation::BadWords);
    }
    if rules.invites && predicates::invites(msg) {
        return Some(Violation::Invites);
    }
    if rules.links && predicates::links(msg) {
        return Some(Violation::Links);
    }
    if rules.mentions.enabled && predicates::mentions(msg, rules.mentions.threshold) {
        return Some(Violation::Mentions);
    }
    if rules.slowmode.enabled && predicates::slowmode(msg, history, rules.slowmode.within) {
        return Some(Violation::SlowMode);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{BadwordsRule, CapsRule, MentionsRule};
    use chrono::Utc;

    fn msg(content: &str) -> MessageRecord {
        MessageRecord::new(1, content, content, Utc::now())
    }

    fn caps_rules() -> AutomodRules {
        AutomodRules {
            enabled: true,
            caps: CapsRule {
                enabled: true,
                threshold: 0.5,
                minlength: 10,
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_disabled_master_switch_short_circuits() {
        let mut rules = caps_rules();
        rules.enabled = false;
        let verdict = evaluate(&msg("THIS IS ALL CAPS TEXT"), &[], &rules, Exemption::default());
        assert_eq!(verdict, None);
    }

    #[test]
    fn test_caps_scenario_end_to_end() {
        // caps.enabled=true, threshold=0.5, minlength=10, 20-char all-caps message
        let verdict = evaluate(&msg("THIS IS ALL CAPS TEXT"), &[], &caps_rules(), Exemption::default());
        assert_eq!(verdict, Some(Violation::Caps));
    }

    #[test]
    fn test_exempt_authors_never_flag() {
        let rules = caps_rules();
        let loud = msg("THIS IS ALL CAPS TEXT");
        let exemptions = [
            Exemption { is_bot: true, ..Default::default() },
            Exemption { is_owner: true, ..Default::default() },
            Exemption { can_manage_messages: true, ..Default::default() },
            Exemption { has_filter_role: true, ..Default::default() },
        ];
        for exemption in exemptions {
            assert_eq!(evaluate(&loud, &[], &rules, exemption), None, "{exemption:?}");
        }
    }

    #[test]
    fn test_first_verdict_wins() {
        // A message that violates both caps and badwords reports only caps,
        // the earlier rule in the chain.
        let mut rules = caps_rules();
        rules.badwords = BadwordsRule {
            enabled: true,
            words: vec!["CAPS".to_string()],
        };

        let verdict = evaluate(&msg("THIS IS ALL CAPS TEXT"), &[], &rules, Exemption::default());
        assert_eq!(verdict, Some(Violation::Caps));
    }

    #[test]
    fn test_later_rule_fires_when_earlier_disabled() {
        let mut rules = caps_rules();
        rules.caps.enabled = false;
        rules.badwords = BadwordsRule {
            enabled: true,
            words: vec!["CAPS".to_string()],
        };

        let verdict = evaluate(&msg("THIS IS ALL CAPS TEXT"), &[], &rules, Exemption::default());
        assert_eq!(verdict, Some(Violation::BadWords));
    }

    #[test]
    fn test_mentions_rule() {
        let rules = AutomodRules {
            enabled: true,
            mentions: MentionsRule {
                enabled: true,
                threshold: 2,
            },
            ..Default::default()
        };

        assert_eq!(
            evaluate(&msg("<@1> <@2> hi"), &[], &rules, Exemption::default()),
            Some(Violation::Mentions)
        );
        assert_eq!(evaluate(&msg("<@1> hi"), &[], &rules, Exemption::default()), None);
    }

    #[test]
    fn test_clean_message_passes_everything() {
        let mut rules = caps_rules();
        rules.invites = true;
        rules.links = true;
        let verdict = evaluate(
            &msg("just a perfectly ordinary message"),
            &[],
            &rules,
            Exemption::default(),
        );
        assert_eq!(verdict, None);
    }
}
