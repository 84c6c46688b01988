//! Job row store
//!
//! One map holds every scheduled row regardless of type; ticks select by
//! category. Persisted as YAML next to the other stores.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use super::error::{SchedulerError, SchedulerResult};
use super::job::{FireOutcome, JobPayload, JobRecord, TickCategory};

#[derive(Debug, Clone, Default)]
pub struct JobStore {
    records: Arc<DashMap<String, JobRecord>>,
}

impl JobStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: Arc::new(DashMap::new()),
        }
    }

    /// Add a new job row.
    pub fn add(&self, record: JobRecord) {
        let id = record.id.clone();
        self.records.insert(id, record);
    }

    /// Get a job row by ID.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<JobRecord> {
        self.records.get(id).map(|entry| entry.value().clone())
    }

    /// Remove a job row by ID.
    pub fn remove(&self, id: &str) -> Option<JobRecord> {
        self.records.remove(id).map(|(_, record)| record)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// IDs of rows in `category` that are due at `now`.
    #[must_use]
    pub fn due(&self, category: TickCategory, now: DateTime<Utc>) -> Vec<String> {
        self.records
            .iter()
            .filter_map(|entry| {
                let record = entry.value();
                if record.payload.category() == category && record.is_due(now) {
                    Some(record.id.clone())
                } else {
                    None
                }
            })
            .collect()
    }

    /// Fire a row and apply its outcome: remove one-shots, advance and
    /// re-arm recurring rows. Returns the fired row as it was dispatched.
    ///
    /// # Errors
    /// Returns an error if the row does not exist or is not pending.
    pub fn fire(&self, id: &str, now: DateTime<Utc>) -> SchedulerResult<JobRecord> {
        let mut entry = self
            .records
            .get_mut(id)
            .ok_or_else(|| SchedulerError::NotFound(id.to_string()))?;

        let outcome = entry.fire(now)?;
        let fired = entry.clone();

        match outcome {
            FireOutcome::Reschedule => {
                entry.reschedule(now)?;
                drop(entry);
            }
            FireOutcome::Delete => {
                drop(entry);
                self.records.remove(id);
            }
        }

        Ok(fired)
    }

    /// All reminder rows owned by one user.
    #[must_use]
    pub fn reminders_for_user(&self, user_id: u64) -> Vec<JobRecord> {
        self.records
            .iter()
            .filter_map(|entry| {
                let record = entry.value();
                match record.payload {
                    JobPayload::Reminder { user_id: owner, .. } if owner == user_id => {
                        Some(record.clone())
                    }
                    _ => None,
                }
            })
            .collect()
    }

    /// Purge every row owned by a guild the bot has left.
    pub fn remove_guild(&self, guild_id: u64) {
        self.records.retain(|_, record| record.guild_id != guild_id);
    }

    /// Load rows from a YAML file, returning an empty store when the file is
    /// missing or unreadable.
    pub async fn load(path: &str) -> Self {
        let store = Self::new();

        if let Ok(file_content) = tokio::fs::read_to_string(path).await {
            if let Ok(records) = serde_yaml::from_str::<Vec<JobRecord>>(&file_content) {
                for record in records {
                    store.records.insert(record.id.clone(), record);
                }
            }
        }

        store
    }

    /// Save all rows to a YAML file.
    ///
    /// # Errors
    /// Returns an error if serialization or the file write fails.
    pub async fn save(&self, path: &str) -> Result<(), crate::Error> {
        let records: Vec<JobRecord> = self
            .records
            .iter()
            .map(|entry| entry.value().clone())
            .collect();

        let yaml = serde_yaml::to_string(&records)?;
        tokio::fs::write(path, yaml).await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::job::MentionTag;
    use chrono::Duration;

    fn due_reminder(user_id: u64, now: DateTime<Utc>) -> JobRecord {
        JobRecord::new(
            0,
            JobPayload::Reminder {
                user_id,
                remind_at: now - Duration::seconds(1),
                text: "ping".to_string(),
            },
        )
    }

    #[test]
    fn test_due_selects_by_category() {
        let now = Utc::now();
        let store = JobStore::new();

        let reminder = due_reminder(7, now);
        let timed = JobRecord::new(
            1,
            JobPayload::TimedMessage {
                channel_id: 2,
                content: "hi".to_string(),
                interval_secs: 60,
                last_sent: now - Duration::minutes(5),
            },
        );
        let reminder_id = reminder.id.clone();
        let timed_id = timed.id.clone();
        store.add(reminder);
        store.add(timed);

        assert_eq!(store.due(TickCategory::Reminders, now), vec![reminder_id]);
        assert_eq!(store.due(TickCategory::Fast, now), vec![timed_id]);
        assert!(store.due(TickCategory::Daily, now).is_empty());
    }

    #[test]
    fn test_fire_removes_one_shot() {
        let now = Utc::now();
        let store = JobStore::new();
        let reminder = due_reminder(7, now);
        let id = reminder.id.clone();
        store.add(reminder);

        let fired = store.fire(&id, now).unwrap();
        assert!(matches!(fired.payload, JobPayload::Reminder { .. }));
        assert!(store.get(&id).is_none());

        // Subsequent ticks find no row: firing again is NotFound
        assert!(matches!(
            store.fire(&id, now),
            Err(SchedulerError::NotFound(_))
        ));
        assert!(store.due(TickCategory::Reminders, now).is_empty());
    }

    #[test]
    fn test_fire_reschedules_recurring() {
        let now = Utc::now();
        let store = JobStore::new();
        let timed = JobRecord::new(
            1,
            JobPayload::TimedMessage {
                channel_id: 2,
                content: "hi".to_string(),
                interval_secs: 3600,
                last_sent: now - Duration::hours(2),
            },
        );
        let id = timed.id.clone();
        store.add(timed);

        store.fire(&id, now).unwrap();

        let row = store.get(&id).expect("recurring row kept");
        assert!(!row.is_due(now));
        match row.payload {
            JobPayload::TimedMessage { last_sent, .. } => assert_eq!(last_sent, now),
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn test_remove_guild_purges_rows() {
        let now = Utc::now();
        let store = JobStore::new();
        store.add(JobRecord::new(
            1,
            JobPayload::Countdown {
                channel_id: 2,
                content: "x".to_string(),
                event_at: now + Duration::hours(48),
                last_sent: now,
                tag: MentionTag::None,
            },
        ));
        store.add(due_reminder(7, now)); // guild 0

        store.remove_guild(1);
        assert_eq!(store.len(), 1);
        store.remove_guild(0);
        assert!(store.is_empty());
    }

    #[test]
    fn test_reminders_for_user() {
        let now = Utc::now();
        let store = JobStore::new();
        store.add(due_reminder(7, now));
        store.add(due_reminder(7, now));
        store.add(due_reminder(8, now));

        assert_eq!(store.reminders_for_user(7).len(), 2);
        assert_eq!(store.reminders_for_user(9).len(), 0);
    }
}
