use std::{
    ops::Deref,
    sync::Arc,
};

use poise::serenity_prelude as serenity;
use serenity::prelude::TypeMapKey;
use tokio::sync::mpsc::Sender;
use tracing::error;

use crate::automod::MessageHistory;
use crate::casino::CasinoStore;
use crate::scheduler::{JobStore, SchedulerRequest};
use crate::settings::SettingsStore;

const SETTINGS_FILE: &str = "data/settings.yaml";
const JOBS_FILE: &str = "data/jobs.yaml";
const CASINO_FILE: &str = "data/casino.yaml";

/// Centralized data structure for the bot
#[derive(Clone)]
pub struct Data(pub Arc<DataInner>);

// Implement TypeMapKey for Data to allow storing it in Serenity's data map
impl TypeMapKey for Data {
    type Value = Data;
}

impl Default for Data {
    fn default() -> Self {
        Self::new()
    }
}

impl Deref for Data {
    type Target = DataInner;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl std::fmt::Debug for Data {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Data")
            .field("settings", &self.settings)
            .field("jobs", &self.jobs)
            .field("casino", &self.casino)
            .field("history", &self.history)
            .finish_non_exhaustive()
    }
}

impl Data {
    /// Create a new empty Data instance
    #[must_use]
    pub fn new() -> Self {
        Self(Arc::new(DataInner::new()))
    }

    /// Load every store from its YAML file
    pub async fn load() -> Self {
        Self(Arc::new(DataInner::load().await))
    }

    /// Save every store to its YAML file
    ///
    /// # Errors
    /// Returns an error if the data directory cannot be created or any store
    /// fails to serialize or write.
    pub async fn save(&self) -> Result<(), crate::Error> {
        self.0.save().await
    }

    /// Hand the scheduler's control sender to command handlers
    pub fn set_scheduler_tx(&self, tx: Sender<SchedulerRequest>) {
        let mut guard = self.0.scheduler_tx.write().expect("scheduler_tx poisoned");
        *guard = Some(tx);
    }

    /// Ask the scheduler for an out-of-band tick
    pub async fn request_tick(&self, request: SchedulerRequest) {
        let tx = {
            let guard = self.0.scheduler_tx.read().expect("scheduler_tx poisoned");
            guard.clone()
        };
        if let Some(tx) = tx {
            if let Err(err) = tx.send(request).await {
                error!("Failed to send scheduler request: {err}");
            }
        }
    }

    /// Purge every row a guild owns: settings, job rows, casino accounts,
    /// history buffers. Called when the platform reports the guild is gone.
    pub fn purge_guild(&self, guild_id: u64) {
        self.settings.remove_guild(guild_id);
        self.jobs.remove_guild(guild_id);
        self.casino.remove_guild(guild_id);
        self.history.remove_guild(guild_id);
    }
}

/// Main centralized data structure for the bot
#[derive(Debug)]
pub struct DataInner {
    // Per-guild typed settings
    pub settings: SettingsStore,
    // Scheduled job rows
    pub jobs: JobStore,
    // Casino chip accounts
    pub casino: CasinoStore,
    // Recent messages per channel, for the history-based predicates
    pub history: MessageHistory,
    // Control channel into the scheduler task
    scheduler_tx: std::sync::RwLock<Option<Sender<SchedulerRequest>>>,
}

impl Default for DataInner {
    fn default() -> Self {
        Self::new()
    }
}

impl DataInner {
    #[must_use]
    pub fn new() -> Self {
        Self {
            settings: SettingsStore::new(),
            jobs: JobStore::new(),
            casino: CasinoStore::new(),
            history: MessageHistory::new(),
            scheduler_tx: std::sync::RwLock::new(None),
        }
    }

    /// Load each store from its YAML file; missing files yield empty stores.
    pub async fn load() -> Self {
        Self {
            settings: SettingsStore::load(SETTINGS_FILE).await,
            jobs: JobStore::load(JOBS_FILE).await,
            casino: CasinoStore::load(CASINO_FILE).await,
            history: MessageHistory::new(),
            scheduler_tx: std::sync::RwLock::new(None),
        }
    }

    /// Save each store to its YAML file, creating the data directory first.
    ///
    /// # Errors
    /// Returns an error if the directory cannot be created or any store
    /// fails to serialize or write.
    pub async fn save(&self) -> Result<(), crate::Error> {
        const DATA_DIR: &str = "data";

        if !std::path::Path::new(DATA_DIR).exists() {
            tokio::fs::create_dir_all(DATA_DIR).await?;
        }

        self.settings.save(SETTINGS_FILE).await?;
        self.jobs.save(JOBS_FILE).await?;
        self.casino.save(CASINO_FILE).await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::{JobPayload, JobRecord};
    use chrono::Utc;

    #[test]
    fn test_data_new() {
        let data = Data::new();
        assert!(data.settings.is_empty());
        assert!(data.jobs.is_empty());
        assert!(data.casino.guilds().is_empty());
    }

    // poise's FrameworkError is logged with its Debug form, which needs
    // Debug all the way down through Data.
    #[test]
    fn test_data_is_debug() {
        fn assert_debug<T: std::fmt::Debug>() {}
        assert_debug::<Data>();

        let rendered = format!("{:?}", Data::new());
        assert!(rendered.contains("Data"));
        assert!(rendered.contains("settings"));
    }

    #[test]
    fn test_purge_guild_cascades() {
        let data = Data::new();
        let now = Utc::now();

        data.settings.update(9, |s| s.automod.enabled = true);
        data.jobs.add(JobRecord::new(
            9,
            JobPayload::TimedMessage {
                channel_id: 1,
                content: "x".to_string(),
                interval_secs: 60,
                last_sent: now,
            },
        ));
        data.casino.daily_topup(9, 2, now);
        data.history.record(
            9,
            1,
            crate::automod::MessageRecord::new(2, "hello", "hello", now),
        );
        // A different guild stays untouched
        data.casino.daily_topup(10, 2, now);

        data.purge_guild(9);

        assert!(!data.settings.automod(9).enabled);
        assert!(data.jobs.is_empty());
        assert!(data.casino.get(9, 2).is_err());
        assert!(data.history.recent(9, 1).is_empty());
        assert!(data.casino.get(10, 2).is_ok());
    }
}
