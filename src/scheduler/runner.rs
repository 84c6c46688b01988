//! Periodic job runner
//!
//! One background task drives three independent cadences: the fast tick
//! (timed messages, countdowns, stale-typing sweep), the reminder tick and
//! the daily tick (lottery draw). Rows are marked processed before their
//! side effect is dispatched, so a delivery failure can never leave a
//! one-shot row behind to retry-storm. A failure in one row never aborts
//! the rest of the tick.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio::time::{Duration, Instant, interval_at};
use tracing::{error, info, warn};

use crate::SCHEDULER_TARGET;
use crate::casino::{CasinoStore, LOTTO_PRIZE, LottoWinner, StoreError};

use super::SchedulerRequest;
use super::delivery::{Delivery, LOTTO_COLOR, OutboundEmbed, REMINDER_COLOR, TIMER_COLOR};
use super::error::{DeliveryError, SchedulerError, SchedulerResult};
use super::job::{JobPayload, TickCategory};
use super::store::JobStore;

/// Tick cadences in seconds.
const FAST_TICK_SECS: u64 = 180;
const REMINDER_TICK_SECS: u64 = 300;
const DAILY_TICK_SECS: u64 = 86_400;

/// Service driving all scheduled side effects.
#[derive(Clone)]
pub struct Scheduler {
    jobs: JobStore,
    casino: CasinoStore,
    delivery: Arc<dyn Delivery>,
}

impl Scheduler {
    #[must_use]
    pub fn new(jobs: JobStore, casino: CasinoStore, delivery: Arc<dyn Delivery>) -> Self {
        Self {
            jobs,
            casino,
            delivery,
        }
    }

    /// Spawn the scheduler task and return its control sender.
    pub fn start(self) -> Sender<SchedulerRequest> {
        let (tx, rx) = mpsc::channel::<SchedulerRequest>(32);
        tokio::spawn(async move {
            self.scheduler_task(rx).await;
        });
        tx
    }

    /// The main loop: out-of-band requests interleaved with the three timers.
    async fn scheduler_task(&self, mut rx: Receiver<SchedulerRequest>) {
        info!(target: SCHEDULER_TARGET, "Starting scheduler task");

        let fast_period = Duration::from_secs(FAST_TICK_SECS);
        let reminder_period = Duration::from_secs(REMINDER_TICK_SECS);
        let daily_period = Duration::from_secs(DAILY_TICK_SECS);

        // interval_at so the first tick waits a full period instead of
        // firing at startup; a restart must not trigger an instant lottery.
        let mut fast = interval_at(Instant::now() + fast_period, fast_period);
        let mut reminders = interval_at(Instant::now() + reminder_period, reminder_period);
        let mut daily = interval_at(Instant::now() + daily_period, daily_period);

        loop {
            tokio::select! {
                Some(request) = rx.recv() => {
                    match request {
                        SchedulerRequest::RunCategory(category) => {
                            info!(target: SCHEDULER_TARGET, %category, "Received out-of-band tick request");
                            self.run_category(category, Utc::now()).await;
                        }
                        SchedulerRequest::Shutdown => {
                            info!(target: SCHEDULER_TARGET, "Received shutdown request");
                            break;
                        }
                    }
                },
                _ = fast.tick() => self.run_category(TickCategory::Fast, Utc::now()).await,
                _ = reminders.tick() => self.run_category(TickCategory::Reminders, Utc::now()).await,
                _ = daily.tick() => self.run_category(TickCategory::Daily, Utc::now()).await,
            }
        }

        info!(target: SCHEDULER_TARGET, "Scheduler task shut down");
    }

    /// Run one tick category to completion.
    pub async fn run_category(&self, category: TickCategory, now: DateTime<Utc>) {
        match category {
            TickCategory::Fast => {
                self.delivery.sweep_stale_typing();
                self.run_due_jobs(TickCategory::Fast, now).await;
            }
            TickCategory::Reminders => {
                self.run_due_jobs(TickCategory::Reminders, now).await;
            }
            TickCategory::Daily => {
                self.run_lotto().await;
            }
        }
    }

    /// Process every due row in a category, isolating failures per row.
    async fn run_due_jobs(&self, category: TickCategory, now: DateTime<Utc>) {
        let due = self.jobs.due(category, now);
        if due.is_empty() {
            return;
        }
        info!(target: SCHEDULER_TARGET, %category, rows = due.len(), "Processing due job rows");

        for id in due {
            if let Err(err) = self.process_row(&id, now).await {
                error!(target: SCHEDULER_TARGET, job_id = %id, error = %err, "Job row failed");
                self.delivery
                    .report_issue(format!(
                        "Error occurred processing scheduled job `{id}`!\n**Time:** {}\n**Error Message:** {err}",
                        now.format("%B %d %Y at %H:%M:%S UTC")
                    ))
                    .await;
            }
        }
    }

    /// Fire one row and dispatch its side effect. The store transition runs
    /// first: by the time anything can fail, the row is already removed or
    /// re-armed for its next occurrence.
    async fn process_row(&self, id: &str, now: DateTime<Utc>) -> SchedulerResult<()> {
        let fired = self.jobs.fire(id, now)?;

        let result = match &fired.payload {
            JobPayload::Reminder { user_id, text, .. } => {
                self.delivery
                    .dm_user(*user_id, reminder_embed(text))
                    .await
            }
            JobPayload::Countdown {
                channel_id,
                content,
                event_at,
                tag,
                ..
            } => {
                let embed = countdown_embed(content, *event_at, now);
                let lead = if fired.payload.is_final_countdown(now) {
                    format!("{}GET HYPE IT IS TIME!", tag.prefix())
                } else {
                    String::new()
                };
                self.delivery.send_channel(*channel_id, lead, embed).await
            }
            JobPayload::TimedMessage {
                channel_id,
                content,
                ..
            } => {
                self.delivery
                    .send_channel(*channel_id, String::new(), timer_embed(content))
                    .await
            }
        };

        match result {
            Ok(()) => Ok(()),
            // Target gone: the row is already processed, nothing to retry.
            Err(DeliveryError::TargetMissing(target)) => {
                warn!(
                    target: SCHEDULER_TARGET,
                    job_id = %fired.id,
                    %target,
                    "Delivery target gone; job row dropped"
                );
                Ok(())
            }
            Err(err) => Err(SchedulerError::Delivery(err)),
        }
    }

    /// Daily lottery: one random account per guild wins the prize.
    async fn run_lotto(&self) {
        for guild_id in self.casino.guilds() {
            let winner = match self.casino.lotto_draw(guild_id) {
                Ok(winner) => winner,
                Err(StoreError::NoAccounts(_)) => continue,
                Err(err) => {
                    error!(target: SCHEDULER_TARGET, guild_id = %guild_id, error = %err, "Lottery draw failed");
                    continue;
                }
            };

            let mention = format!("<@{}>", winner.user_id);
            if let Err(err) = self
                .delivery
                .send_system_channel(guild_id, mention, lotto_embed(&winner))
                .await
            {
                error!(target: SCHEDULER_TARGET, guild_id = %guild_id, error = %err, "Lottery payout notification failed");
                self.delivery
                    .report_issue(format!(
                        "Error occurred giving someone their lotto payout!\n**Guild:** {guild_id}\n**Error Message:** {err}"
                    ))
                    .await;
            }
        }
    }
}

fn reminder_embed(text: &str) -> OutboundEmbed {
    OutboundEmbed {
        author_name: Some("Warden Reminders".to_string()),
        description: text.to_string(),
        color: REMINDER_COLOR,
        ..Default::default()
    }
}

fn countdown_embed(content: &str, event_at: DateTime<Utc>, now: DateTime<Utc>) -> OutboundEmbed {
    let remaining = event_at - now;
    let days = remaining.num_days();
    let hours = remaining.num_hours() - days * 24;
    OutboundEmbed {
        author_name: Some("Countdown Reminder".to_string()),
        description: format!(
            "Event on: {}\nThat is in {} day(s) and {} hour(s)\n\n**__{}__**",
            event_at.format("%B %d %Y at %H:%M"),
            days.max(0),
            hours.max(0),
            content
        ),
        color: TIMER_COLOR,
        ..Default::default()
    }
}

fn timer_embed(content: &str) -> OutboundEmbed {
    OutboundEmbed {
        author_name: Some("Warden Timed Message".to_string()),
        description: content.to_string(),
        color: TIMER_COLOR,
        ..Default::default()
    }
}

fn lotto_embed(winner: &LottoWinner) -> OutboundEmbed {
    OutboundEmbed {
        description: format!(
            "Congratulations <@{}>! You won today's random lotto and were granted {} chips 🎉!",
            winner.user_id, LOTTO_PRIZE
        ),
        color: LOTTO_COLOR,
        fields: vec![(
            "Balance".to_string(),
            format!("{} ➡ {}", winner.previous_balance, winner.balance),
        )],
        ..Default::default()
    }
}
