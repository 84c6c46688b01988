//! Scheduled background jobs for warden
//!
//! A single service owns the persisted job rows (reminders, countdowns,
//! timed messages) and the casino lottery, ticking each category on its own
//! cadence and dispatching side effects through the [`Delivery`] boundary.

mod delivery;
mod error;
mod job;
mod runner;
mod store;

pub use delivery::{
    Delivery, LOTTO_COLOR, OutboundEmbed, REMINDER_COLOR, SerenityDelivery, TIMER_COLOR,
};
pub use error::{DeliveryError, SchedulerError};
pub use job::{FireOutcome, JobPayload, JobRecord, JobState, MentionTag, TickCategory};
pub use runner::Scheduler;
pub use store::JobStore;

/// Request type for the scheduler task
#[derive(Debug, Clone)]
pub enum SchedulerRequest {
    /// Run one tick category immediately, out of band
    RunCategory(TickCategory),
    /// Shutdown the scheduler task
    Shutdown,
}
