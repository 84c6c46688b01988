//! Job rows and their lifecycle
//!
//! A job row describes one future scheduled side effect. Rows sit in
//! `Pending` until their due time, move to `Fired` when the side effect is
//! dispatched, and are then either removed (one-shot) or rescheduled with an
//! updated last-sent time (recurring).

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use super::error::{SchedulerError, SchedulerResult};

/// Hours between countdown reminder sends, and the threshold under which the
/// next send is the final one.
const COUNTDOWN_CADENCE_HOURS: i64 = 24;

/// Tick categories, each driven by its own timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TickCategory {
    /// ~3 minutes: timed messages, countdowns, stale-typing sweep.
    Fast,
    /// ~5 minutes: reminder delivery.
    Reminders,
    /// ~24 hours: lottery draw.
    Daily,
}

impl std::fmt::Display for TickCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fast => write!(f, "fast"),
            Self::Reminders => write!(f, "reminders"),
            Self::Daily => write!(f, "daily"),
        }
    }
}

/// Mention tag attached to the final countdown send.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MentionTag {
    #[default]
    None,
    Here,
    Everyone,
}

impl MentionTag {
    /// Message prefix for the final countdown send.
    #[must_use]
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Everyone => "@everyone ",
            Self::Here => "@here ",
            Self::None => "",
        }
    }
}

/// What a job row does when it fires.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum JobPayload {
    /// One-shot direct-message reminder.
    Reminder {
        user_id: u64,
        remind_at: DateTime<Utc>,
        text: String,
    },
    /// Daily countdown toward an event; final send mentions `tag`.
    Countdown {
        channel_id: u64,
        content: String,
        event_at: DateTime<Utc>,
        last_sent: DateTime<Utc>,
        tag: MentionTag,
    },
    /// Recurring announcement on a fixed interval.
    TimedMessage {
        channel_id: u64,
        content: String,
        interval_secs: i64,
        last_sent: DateTime<Utc>,
    },
}

impl JobPayload {
    /// The tick category that processes this payload.
    #[must_use]
    pub fn category(&self) -> TickCategory {
        match self {
            Self::Reminder { .. } => TickCategory::Reminders,
            Self::Countdown { .. } | Self::TimedMessage { .. } => TickCategory::Fast,
        }
    }

    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Reminder { .. } => "reminder",
            Self::Countdown { .. } => "countdown",
            Self::TimedMessage { .. } => "timed_message",
        }
    }

    fn due_at(&self) -> DateTime<Utc> {
        match self {
            Self::Reminder { remind_at, .. } => *remind_at,
            Self::Countdown { last_sent, .. } => {
                *last_sent + Duration::hours(COUNTDOWN_CADENCE_HOURS)
            }
            Self::TimedMessage {
                last_sent,
                interval_secs,
                ..
            } => *last_sent + Duration::seconds(*interval_secs),
        }
    }

    /// Whether a countdown firing at `now` is the final "it is time" send.
    #[must_use]
    pub fn is_final_countdown(&self, now: DateTime<Utc>) -> bool {
        match self {
            Self::Countdown { event_at, .. } => {
                *event_at - now < Duration::hours(COUNTDOWN_CADENCE_HOURS)
            }
            _ => false,
        }
    }
}

/// Job row lifecycle states.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    /// Waiting for its due time.
    #[default]
    Pending,
    /// Side effect dispatched; awaiting removal or reschedule.
    Fired,
}

/// A persisted record describing a future scheduled side effect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    /// Unique ID of this job row
    pub id: String,
    /// Guild that owns the row (0 for DM reminders created outside a guild)
    pub guild_id: u64,
    pub state: JobState,
    pub payload: JobPayload,
    pub created_at: DateTime<Utc>,
}

/// What the store does with a row after it fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FireOutcome {
    /// One-shot: remove the row.
    Delete,
    /// Recurring: update last-sent and return to `Pending`.
    Reschedule,
}

impl JobRecord {
    #[must_use]
    pub fn new(guild_id: u64, payload: JobPayload) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            guild_id,
            state: JobState::Pending,
            payload,
            created_at: Utc::now(),
        }
    }

    /// Check if this row is due at `now`.
    #[must_use]
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.state == JobState::Pending && self.payload.due_at() <= now
    }

    /// Mark the row fired and report what should happen to it.
    ///
    /// # Errors
    /// Returns an error if the row is not in the `Pending` state.
    pub fn fire(&mut self, now: DateTime<Utc>) -> SchedulerResult<FireOutcome> {
        if self.state != JobState::Pending {
            return Err(SchedulerError::InvalidStateTransition);
        }
        self.state = JobState::Fired;

        let outcome = match &self.payload {
            JobPayload::Reminder { .. } => FireOutcome::Delete,
            JobPayload::Countdown { .. } => {
                if self.payload.is_final_countdown(now) {
                    FireOutcome::Delete
                } else {
                    FireOutcome::Reschedule
                }
            }
            JobPayload::TimedMessage { .. } => FireOutcome::Reschedule,
        };

        info!(
            job_id = %self.id,
            guild_id = %self.guild_id,
            kind = %self.payload.kind(),
            outcome = ?outcome,
            "Job row fired"
        );

        Ok(outcome)
    }

    /// Return a fired recurring row to `Pending` with its last-sent time
    /// advanced to `now`.
    ///
    /// # Errors
    /// Returns an error if the row is not in the `Fired` state.
    pub fn reschedule(&mut self, now: DateTime<Utc>) -> SchedulerResult<()> {
        if self.state != JobState::Fired {
            return Err(SchedulerError::InvalidStateTransition);
        }
        match &mut self.payload {
            JobPayload::Countdown { last_sent, .. }
            | JobPayload::TimedMessage { last_sent, .. } => *last_sent = now,
            JobPayload::Reminder { .. } => return Err(SchedulerError::InvalidStateTransition),
        }
        self.state = JobState::Pending;
        Ok(())
    }
}
