//! Per-guild settings repository
//!
//! Every option a guild can configure lives here as a typed field rather than
//! an ad hoc key/value lookup. Missing or malformed configuration always
//! deserializes to the disabled default, so a broken settings file can never
//! take the message pipeline down with it.

use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Caps-ratio rule: flag messages of at least `minlength` characters whose
/// uppercase fraction meets `threshold` (0.0 to 1.0).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CapsRule {
    pub enabled: bool,
    pub threshold: f64,
    pub minlength: usize,
}

impl Default for CapsRule {
    fn default() -> Self {
        Self {
            enabled: false,
            threshold: 0.6,
            minlength: 10,
        }
    }
}

/// Duplicate-text rule: look back `within` minutes of channel history and
/// flag once the author has more than `equals` messages whose two most
/// recent bodies are within `distance` edits of each other.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DuptextRule {
    pub enabled: bool,
    /// History window in minutes.
    pub within: i64,
    /// Number of prior equal-ish messages tolerated.
    pub equals: usize,
    /// Maximum Levenshtein distance still considered a duplicate.
    pub distance: usize,
}

impl Default for DuptextRule {
    fn default() -> Self {
        Self {
            enabled: false,
            within: 3,
            equals: 2,
            distance: 20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmojisRule {
    pub enabled: bool,
    pub threshold: usize,
    pub minlength: usize,
}

impl Default for EmojisRule {
    fn default() -> Self {
        Self {
            enabled: false,
            threshold: 5,
            minlength: 10,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BadwordsRule {
    pub enabled: bool,
    pub words: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MentionsRule {
    pub enabled: bool,
    pub threshold: usize,
}

impl Default for MentionsRule {
    fn default() -> Self {
        Self {
            enabled: false,
            threshold: 5,
        }
    }
}

/// Slow-mode rule: flag a second message from the same author within
/// `within` seconds of their previous one.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SlowmodeRule {
    pub enabled: bool,
    /// Throttle window in seconds.
    pub within: i64,
}

impl Default for SlowmodeRule {
    fn default() -> Self {
        Self {
            enabled: false,
            within: 10,
        }
    }
}

/// The full automod rule set for one guild.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AutomodRules {
    /// Master switch; no predicate runs while this is off.
    pub enabled: bool,
    /// Role ids whose holders are exempt from all predicates.
    pub filter_roles: Vec<u64>,
    pub caps: CapsRule,
    pub duptext: DuptextRule,
    pub emojis: EmojisRule,
    pub badwords: BadwordsRule,
    pub invites: bool,
    pub links: bool,
    pub mentions: MentionsRule,
    pub slowmode: SlowmodeRule,
}

/// Guild configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GuildSettings {
    // The ID of the guild
    pub guild_id: u64,
    pub automod: AutomodRules,
    // Role automatically assigned to new members
    pub default_role: Option<u64>,
    // Channel for member join/leave log embeds
    pub member_log_channel: Option<u64>,
    // Channel for automod deletion log embeds
    pub modlog_channel: Option<u64>,
}

/// Repository of per-guild settings, created lazily on first configuration
/// and injected into both the evaluator and the job runner.
#[derive(Debug, Clone, Default)]
pub struct SettingsStore {
    guilds: Arc<DashMap<u64, GuildSettings>>,
}

impl SettingsStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            guilds: Arc::new(DashMap::new()),
        }
    }

    /// Get a guild's settings, or the defaults if it has never been configured.
    #[must_use]
    pub fn get(&self, guild_id: u64) -> GuildSettings {
        self.guilds
            .get(&guild_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_else(|| GuildSettings {
                guild_id,
                ..Default::default()
            })
    }

    /// Automod rules for a guild; unconfigured guilds get the all-disabled default.
    #[must_use]
    pub fn automod(&self, guild_id: u64) -> AutomodRules {
        self.get(guild_id).automod
    }

    /// Update a guild's settings in place, creating the row on first use.
    pub fn update<F>(&self, guild_id: u64, mutate: F)
    where
        F: FnOnce(&mut GuildSettings),
    {
        let mut entry = self.guilds.entry(guild_id).or_insert_with(|| GuildSettings {
            guild_id,
            ..Default::default()
        });
        mutate(entry.value_mut());
    }

    /// Drop every setting for a guild the bot has left.
    pub fn remove_guild(&self, guild_id: u64) {
        self.guilds.remove(&guild_id);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.guilds.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.guilds.is_empty()
    }

    /// Load settings from a YAML file, returning an empty store if the file
    /// does not exist or fails to parse.
    pub async fn load(path: &str) -> Self {
        let store = Self::new();

        if let Ok(file_content) = tokio::fs::read_to_string(path).await {
            if let Ok(settings) = serde_yaml::from_str::<Vec<GuildSettings>>(&file_content) {
                for guild in settings {
                    store.guilds.insert(guild.guild_id, guild);
                }
            }
        }

        info!("Loaded settings for {} guild(s)", store.len());
        store
    }

    /// Save all guild settings to a YAML file.
    ///
    /// # Errors
    /// Returns an error if serialization or the file write fails.
    pub async fn save(&self, path: &str) -> Result<(), crate::Error> {
        let settings: Vec<GuildSettings> = self
            .guilds
            .iter()
            .map(|entry| entry.value().clone())
            .collect();

        let yaml = serde_yaml::to_string(&settings)?;
        tokio::fs::write(path, yaml).await?;

        Ok(())
    }
}
