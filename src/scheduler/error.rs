//! Error types for the scheduler and its delivery boundary

use thiserror::Error;

/// Errors from dispatching a side effect to the chat platform.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The target (channel, user, guild) no longer exists or is unreachable.
    /// Rows whose delivery fails this way are still marked processed so they
    /// never retry-storm.
    #[error("delivery target missing: {0}")]
    TargetMissing(String),

    /// The outbound call did not complete within the defensive timeout.
    #[error("delivery timed out after {0} second(s)")]
    Timeout(u64),

    /// Discord API error
    #[error("Discord API error: {0}")]
    DiscordApi(#[from] Box<poise::serenity_prelude::Error>),

    /// Generic error
    #[error("delivery error: {0}")]
    Other(String),
}

impl From<poise::serenity_prelude::Error> for DeliveryError {
    fn from(error: poise::serenity_prelude::Error) -> Self {
        Self::DiscordApi(Box::new(error))
    }
}

/// Errors from scheduler bookkeeping.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Invalid job state transition attempted
    #[error("invalid job state transition")]
    InvalidStateTransition,

    /// Job record not found
    #[error("job not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Delivery(#[from] DeliveryError),

    /// Generic error
    #[error("scheduler error: {0}")]
    Other(String),
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = SchedulerError::InvalidStateTransition;
        assert_eq!(error.to_string(), "invalid job state transition");

        let error = SchedulerError::NotFound("job-1".to_string());
        assert_eq!(error.to_string(), "job not found: job-1");

        let error = DeliveryError::TargetMissing("channel 42".to_string());
        assert_eq!(error.to_string(), "delivery target missing: channel 42");

        let error: SchedulerError = DeliveryError::Timeout(30).into();
        assert_eq!(error.to_string(), "delivery timed out after 30 second(s)");
    }
}
