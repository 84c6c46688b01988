//! Casino chip accounts
//!
//! Per-guild per-user balances with the daily top-up gate and the lottery
//! draw the daily scheduler tick runs. One map keyed by (guild, user)
//! replaces the per-guild tables of the old schema; "no row yet" is an
//! explicit [`StoreError::RowStoreNotInitialized`] outcome, created on
//! demand by the callers that want one.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

/// Chips granted by the daily top-up command.
pub const DAILY_TOPUP: i64 = 500;
/// Chips granted to the daily lottery winner.
pub const LOTTO_PRIZE: i64 = 2000;
/// Hours between allowed top-ups.
const TOPUP_COOLDOWN_HOURS: i64 = 24;

/// Errors from the casino row store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No row exists yet for this guild/user pair; callers create on demand.
    #[error("no casino row for user {user_id} in guild {guild_id}")]
    RowStoreNotInitialized { guild_id: u64, user_id: u64 },

    /// The guild has no accounts at all, so there is nothing to draw from.
    #[error("no casino accounts in guild {0}")]
    NoAccounts(u64),
}

/// One user's chip balance in one guild.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChipAccount {
    pub guild_id: u64,
    pub user_id: u64,
    pub balance: i64,
    pub last_topup: DateTime<Utc>,
}

/// Outcome of a daily top-up attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopupOutcome {
    /// First ever top-up: account created with the starting chips.
    FirstGrant { balance: i64 },
    /// Balance credited.
    Credited { previous: i64, balance: i64 },
    /// Cooldown not elapsed; `ready_in` until the next grant.
    NotYetDue { balance: i64, ready_in: Duration },
}

/// Winner of a lottery draw.
#[derive(Debug, Clone)]
pub struct LottoWinner {
    pub guild_id: u64,
    pub user_id: u64,
    pub previous_balance: i64,
    pub balance: i64,
}

#[derive(Debug, Clone, Default)]
pub struct CasinoStore {
    accounts: Arc<DashMap<String, ChipAccount>>,
}

fn key(guild_id: u64, user_id: u64) -> String {
    format!("{guild_id}:{user_id}")
}

impl CasinoStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            accounts: Arc::new(DashMap::new()),
        }
    }

    /// Look up an account.
    ///
    /// # Errors
    /// Returns [`StoreError::RowStoreNotInitialized`] when no row exists yet.
    pub fn get(&self, guild_id: u64, user_id: u64) -> Result<ChipAccount, StoreError> {
        self.accounts
            .get(&key(guild_id, user_id))
            .map(|entry| entry.value().clone())
            .ok_or(StoreError::RowStoreNotInitialized { guild_id, user_id })
    }

    /// Apply the daily top-up for a user, creating the account on demand.
    pub fn daily_topup(&self, guild_id: u64, user_id: u64, now: DateTime<Utc>) -> TopupOutcome {
        match self.get(guild_id, user_id) {
            Ok(account) => {
                let due_at = account.last_topup + Duration::hours(TOPUP_COOLDOWN_HOURS);
                if due_at <= now {
                    let previous = account.balance;
                    let balance = previous + DAILY_TOPUP;
                    self.accounts.insert(
                        key(guild_id, user_id),
                        ChipAccount {
                            guild_id,
                            user_id,
                            balance,
                            last_topup: now,
                        },
                    );
                    TopupOutcome::Credited { previous, balance }
                } else {
                    TopupOutcome::NotYetDue {
                        balance: account.balance,
                        ready_in: due_at - now,
                    }
                }
            }
            Err(StoreError::RowStoreNotInitialized { .. }) => {
                self.accounts.insert(
                    key(guild_id, user_id),
                    ChipAccount {
                        guild_id,
                        user_id,
                        balance: DAILY_TOPUP,
                        last_topup: now,
                    },
                );
                TopupOutcome::FirstGrant { balance: DAILY_TOPUP }
            }
            Err(StoreError::NoAccounts(_)) => unreachable!("get never reports NoAccounts"),
        }
    }

    /// Credit or debit a balance, creating the account on demand. Used by the
    /// game commands; the returned value is the new balance.
    pub fn adjust(&self, guild_id: u64, user_id: u64, delta: i64, now: DateTime<Utc>) -> i64 {
        let mut entry = self
            .accounts
            .entry(key(guild_id, user_id))
            .or_insert_with(|| ChipAccount {
                guild_id,
                user_id,
                balance: 0,
                last_topup: now - Duration::hours(TOPUP_COOLDOWN_HOURS),
            });
        entry.balance += delta;
        entry.balance
    }

    /// Guild ids that have at least one account, deduplicated.
    #[must_use]
    pub fn guilds(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.accounts.iter().map(|e| e.value().guild_id).collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    /// Draw the daily lottery for one guild: pick one random account and
    /// credit the prize.
    ///
    /// # Errors
    /// Returns [`StoreError::NoAccounts`] when the guild has no accounts.
    pub fn lotto_draw(&self, guild_id: u64) -> Result<LottoWinner, StoreError> {
        let candidates: Vec<String> = self
            .accounts
            .iter()
            .filter(|e| e.value().guild_id == guild_id)
            .map(|e| e.key().clone())
            .collect();

        if candidates.is_empty() {
            return Err(StoreError::NoAccounts(guild_id));
        }

        let pick = rand::rng().random_range(0..candidates.len());
        let mut entry = self
            .accounts
            .get_mut(&candidates[pick])
            .ok_or(StoreError::NoAccounts(guild_id))?;

        let previous_balance = entry.balance;
        entry.balance += LOTTO_PRIZE;

        info!(
            guild_id = %guild_id,
            user_id = %entry.user_id,
            balance = %entry.balance,
            "Lottery prize credited"
        );

        Ok(LottoWinner {
            guild_id,
            user_id: entry.user_id,
            previous_balance,
            balance: entry.balance,
        })
    }

    /// Purge every account for a guild the bot has left.
    pub fn remove_guild(&self, guild_id: u64) {
        self.accounts.retain(|_, account| account.guild_id != guild_id);
    }

    /// Purge one member's account when they leave the guild.
    pub fn remove_user(&self, guild_id: u64, user_id: u64) {
        self.accounts.remove(&key(guild_id, user_id));
    }

    /// Load accounts from a YAML file, returning an empty store when the
    /// file is missing or unreadable.
    pub async fn load(path: &str) -> Self {
        let store = Self::new();

        if let Ok(file_content) = tokio::fs::read_to_string(path).await {
            if let Ok(accounts) = serde_yaml::from_str::<Vec<ChipAccount>>(&file_content) {
                for account in accounts {
                    store
                        .accounts
                        .insert(key(account.guild_id, account.user_id), account);
                }
            }
        }

        store
    }

    /// Save all accounts to a YAML file.
    ///
    /// # Errors
    /// Returns an error if serialization or the file write fails.
    pub async fn save(&self, path: &str) -> Result<(), crate::Error> {
        let accounts: Vec<ChipAccount> = self
            .accounts
            .iter()
            .map(|entry| entry.value().clone())
            .collect();

        let yaml = serde_yaml::to_string(&accounts)?;
        tokio::fs::write(path, yaml).await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_missing_row_is_explicit() {
        let store = CasinoStore::new();
        let err = store.get(1, 2).unwrap_err();
        assert!(matches!(
            err,
            StoreError::RowStoreNotInitialized { guild_id: 1, user_id: 2 }
        ));
    }

    #[test]
    fn test_first_topup_creates_account() {
        let store = CasinoStore::new();
        let now = Utc::now();

        let outcome = store.daily_topup(1, 2, now);
        assert_eq!(outcome, TopupOutcome::FirstGrant { balance: DAILY_TOPUP });

        let account = store.get(1, 2).unwrap();
        assert_eq!(account.balance, DAILY_TOPUP);
        assert_eq!(account.last_topup, now);
    }

    #[test]
    fn test_topup_gated_by_cooldown() {
        let store = CasinoStore::new();
        let now = Utc::now();
        store.daily_topup(1, 2, now);

        // One hour later: not due yet.
        let outcome = store.daily_topup(1, 2, now + Duration::hours(1));
        match outcome {
            TopupOutcome::NotYetDue { balance, ready_in } => {
                assert_eq!(balance, DAILY_TOPUP);
                assert_eq!(ready_in, Duration::hours(23));
            }
            other => panic!("Expected NotYetDue, got {other:?}"),
        }

        // 24 hours later: credited.
        let outcome = store.daily_topup(1, 2, now + Duration::hours(24));
        assert_eq!(
            outcome,
            TopupOutcome::Credited {
                previous: DAILY_TOPUP,
                balance: 2 * DAILY_TOPUP,
            }
        );
    }

    #[test]
    fn test_adjust_creates_and_mutates() {
        let store = CasinoStore::new();
        let now = Utc::now();

        assert_eq!(store.adjust(1, 2, 100, now), 100);
        assert_eq!(store.adjust(1, 2, -30, now), 70);
        assert_eq!(store.get(1, 2).unwrap().balance, 70);
    }

    #[test]
    fn test_lotto_draw_credits_prize() {
        let store = CasinoStore::new();
        let now = Utc::now();
        store.daily_topup(1, 2, now);

        let winner = store.lotto_draw(1).unwrap();
        assert_eq!(winner.guild_id, 1);
        assert_eq!(winner.user_id, 2);
        assert_eq!(winner.previous_balance, DAILY_TOPUP);
        assert_eq!(winner.balance, DAILY_TOPUP + LOTTO_PRIZE);
        assert_eq!(store.get(1, 2).unwrap().balance, DAILY_TOPUP + LOTTO_PRIZE);
    }

    #[test]
    fn test_lotto_draw_empty_guild() {
        let store = CasinoStore::new();
        assert!(matches!(store.lotto_draw(9), Err(StoreError::NoAccounts(9))));
    }

    #[test]
    fn test_guild_and_user_purge() {
        let store = CasinoStore::new();
        let now = Utc::now();
        store.daily_topup(1, 2, now);
        store.daily_topup(1, 3, now);
        store.daily_topup(2, 2, now);

        store.remove_user(1, 2);
        assert!(store.get(1, 2).is_err());
        assert!(store.get(1, 3).is_ok());

        store.remove_guild(1);
        assert!(store.get(1, 3).is_err());
        assert!(store.get(2, 2).is_ok());
        assert_eq!(store.guilds(), vec![2]);
    }
}
