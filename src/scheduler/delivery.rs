//! Side-effect delivery boundary
//!
//! The job runner dispatches all of its outbound effects through the
//! [`Delivery`] trait so ticks can be tested against a mock. The live
//! implementation talks to Discord over serenity's `Http` and additionally
//! tracks typing indicators so stuck ones can be force-stopped by the fast
//! tick.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use dashmap::DashMap;
use poise::serenity_prelude as serenity;
use serenity::{
    ChannelId, CreateEmbed, CreateEmbedAuthor, CreateMessage, GuildId, Http, Typing, UserId,
};
use tracing::{error, warn};

use crate::SCHEDULER_TARGET;

use super::error::DeliveryError;

/// Embed accent colors, carried over from the bot this replaces.
pub const REMINDER_COLOR: u32 = 10_610_610;
pub const LOTTO_COLOR: u32 = 0x7CFC00;
pub const TIMER_COLOR: u32 = 0x7289DA;

/// Defensive cap on any single outbound call.
const DELIVERY_TIMEOUT_SECS: u64 = 30;

/// A typing indicator left running this long is considered stuck.
const STALE_TYPING_SECS: u64 = 10;

/// Structured message payload, framework-free so tests can assert on it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutboundEmbed {
    pub author_name: Option<String>,
    pub title: Option<String>,
    pub description: String,
    pub color: u32,
    pub fields: Vec<(String, String)>,
}

impl OutboundEmbed {
    fn render(&self) -> CreateEmbed {
        let mut embed = CreateEmbed::new()
            .description(self.description.clone())
            .colour(self.color);
        if let Some(author) = &self.author_name {
            embed = embed.author(CreateEmbedAuthor::new(author.clone()));
        }
        if let Some(title) = &self.title {
            embed = embed.title(title.clone());
        }
        for (name, value) in &self.fields {
            embed = embed.field(name.clone(), value.clone(), false);
        }
        embed
    }
}

/// Outbound effects the scheduler and event handlers can perform.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait Delivery: Send + Sync {
    /// Direct-message a user.
    async fn dm_user(&self, user_id: u64, embed: OutboundEmbed) -> Result<(), DeliveryError>;

    /// Send to a specific channel, optionally with leading plain content.
    async fn send_channel(
        &self,
        channel_id: u64,
        content: String,
        embed: OutboundEmbed,
    ) -> Result<(), DeliveryError>;

    /// Send to a guild's system channel.
    async fn send_system_channel(
        &self,
        guild_id: u64,
        content: String,
        embed: OutboundEmbed,
    ) -> Result<(), DeliveryError>;

    /// Report an operational problem to the issue-log channel. Never fails;
    /// problems reporting problems end up in the process log only.
    async fn report_issue(&self, report: String);

    /// Force-stop any typing indicator that has been running too long.
    fn sweep_stale_typing(&self);
}

/// Live delivery over the Discord HTTP API.
pub struct SerenityDelivery {
    http: Arc<Http>,
    issue_channel: Option<u64>,
    typing: DashMap<u64, (Instant, Typing)>,
}

impl SerenityDelivery {
    #[must_use]
    pub fn new(http: Arc<Http>, issue_channel: Option<u64>) -> Self {
        Self {
            http,
            issue_channel,
            typing: DashMap::new(),
        }
    }

    /// Start a typing indicator in a channel, tracked for the stale sweep.
    pub fn begin_typing(&self, channel_id: u64) {
        let typing = ChannelId::new(channel_id).start_typing(&self.http);
        self.typing.insert(channel_id, (Instant::now(), typing));
    }

    /// Number of typing indicators currently tracked.
    #[must_use]
    pub fn typing_count(&self) -> usize {
        self.typing.len()
    }

    /// Stop a tracked typing indicator.
    pub fn end_typing(&self, channel_id: u64) {
        if let Some((_, (_, typing))) = self.typing.remove(&channel_id) {
            typing.stop();
        }
    }

    /// Map serenity errors onto the delivery taxonomy: unknown targets are
    /// `TargetMissing`, everything else is a generic API failure.
    fn classify(err: serenity::Error) -> DeliveryError {
        if let serenity::Error::Http(serenity::HttpError::UnsuccessfulRequest(ref resp)) = err {
            if resp.status_code == serenity::StatusCode::NOT_FOUND
                || resp.status_code == serenity::StatusCode::FORBIDDEN
            {
                return DeliveryError::TargetMissing(format!(
                    "{} {}",
                    resp.status_code, resp.error.message
                ));
            }
        }
        err.into()
    }

    async fn with_timeout<T>(
        fut: impl Future<Output = Result<T, serenity::Error>> + Send,
    ) -> Result<T, DeliveryError> {
        match tokio::time::timeout(Duration::from_secs(DELIVERY_TIMEOUT_SECS), fut).await {
            Ok(result) => result.map_err(Self::classify),
            Err(_) => Err(DeliveryError::Timeout(DELIVERY_TIMEOUT_SECS)),
        }
    }
}

#[async_trait::async_trait]
impl Delivery for SerenityDelivery {
    async fn dm_user(&self, user_id: u64, embed: OutboundEmbed) -> Result<(), DeliveryError> {
        let http = Arc::clone(&self.http);
        Self::with_timeout(async move {
            let channel = UserId::new(user_id).create_dm_channel(&http).await?;
            channel
                .id
                .send_message(&http, CreateMessage::new().embed(embed.render()))
                .await?;
            Ok(())
        })
        .await
    }

    async fn send_channel(
        &self,
        channel_id: u64,
        content: String,
        embed: OutboundEmbed,
    ) -> Result<(), DeliveryError> {
        // Typing shows while the send is in flight; the fast tick reaps any
        // guard a cancelled send leaves behind.
        self.begin_typing(channel_id);
        let http = Arc::clone(&self.http);
        let result = Self::with_timeout(async move {
            ChannelId::new(channel_id)
                .send_message(
                    &http,
                    CreateMessage::new().content(content).embed(embed.render()),
                )
                .await?;
            Ok(())
        })
        .await;
        self.end_typing(channel_id);
        result
    }

    async fn send_system_channel(
        &self,
        guild_id: u64,
        content: String,
        embed: OutboundEmbed,
    ) -> Result<(), DeliveryError> {
        let guild = Self::with_timeout(GuildId::new(guild_id).to_partial_guild(&self.http)).await?;
        let Some(channel) = guild.system_channel_id else {
            return Err(DeliveryError::TargetMissing(format!(
                "guild {guild_id} has no system channel"
            )));
        };
        self.send_channel(channel.get(), content, embed).await
    }

    async fn report_issue(&self, report: String) {
        error!(target: SCHEDULER_TARGET, report = %report, "Operational issue");

        let Some(channel_id) = self.issue_channel else {
            return;
        };
        let send = ChannelId::new(channel_id)
            .send_message(&self.http, CreateMessage::new().content(report));
        if let Err(err) = Self::with_timeout(async move {
            send.await?;
            Ok(())
        })
        .await
        {
            warn!(target: SCHEDULER_TARGET, error = %err, "Failed to reach the issue-log channel");
        }
    }

    fn sweep_stale_typing(&self) {
        let stale = Duration::from_secs(STALE_TYPING_SECS);
        let stuck: Vec<u64> = self
            .typing
            .iter()
            .filter(|entry| entry.value().0.elapsed() > stale)
            .map(|entry| *entry.key())
            .collect();

        for channel_id in stuck {
            warn!(
                target: SCHEDULER_TARGET,
                channel_id = %channel_id,
                "Force-stopping stuck typing indicator"
            );
            self.end_typing(channel_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outbound_embed_render_smoke() {
        let embed = OutboundEmbed {
            author_name: Some("Warden Reminders".to_string()),
            title: None,
            description: "water the plants".to_string(),
            color: REMINDER_COLOR,
            fields: vec![("Balance".to_string(), "500 -> 2500".to_string())],
        };
        // render() builds without panicking and keeps the payload intact
        let _ = embed.render();
        assert_eq!(embed.description, "water the plants");
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_force_stops_only_stale_typing() {
        let delivery = SerenityDelivery::new(Arc::new(Http::new("")), None);

        delivery.begin_typing(100);
        delivery.sweep_stale_typing();
        assert_eq!(delivery.typing_count(), 1, "fresh indicator survives");

        tokio::time::advance(Duration::from_secs(STALE_TYPING_SECS + 1)).await;
        delivery.begin_typing(200);
        delivery.sweep_stale_typing();
        assert_eq!(delivery.typing_count(), 1, "stale indicator is reaped");
        assert!(delivery.typing.contains_key(&200));

        delivery.end_typing(200);
        assert_eq!(delivery.typing_count(), 0);
    }
}
