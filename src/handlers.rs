use poise::serenity_prelude::{
    self as serenity, ChannelId, Context, CreateEmbed, CreateEmbedAuthor, CreateEmbedFooter,
    CreateMessage, EventHandler, Guild, GuildChannel, GuildId, Member, Message, Ready, RoleId,
    UnavailableGuild, User,
};
use tracing::{error, info, warn};

use crate::automod::{self, Exemption, MessageRecord};
use crate::{AUTOMOD_TARGET, Data, EVENT_TARGET};

const JOIN_COLOR: u32 = 0x80F31F;
const LEAVE_COLOR: u32 = 0xF4BF42;
const DELETE_COLOR: u32 = 0xFF5733;

pub struct Handler {
    data: Data,
    owner_id: Option<u64>,
}

impl Handler {
    #[must_use]
    pub fn new(data: Data, owner_id: Option<u64>) -> Self {
        Self { data, owner_id }
    }

    /// Run the automod pipeline for one guild message. Never errors outward;
    /// every failure is logged and the gateway loop keeps going.
    async fn run_automod(&self, ctx: &Context, msg: &Message) {
        let Some(guild_id) = msg.guild_id else { return };

        let rules = self.data.settings.automod(guild_id.get());
        if !rules.enabled {
            return;
        }

        let record = MessageRecord {
            author_id: msg.author.id.get(),
            author_is_bot: msg.author.bot,
            content: msg.content.clone(),
            clean_content: msg.content_safe(&ctx.cache),
            created_at: *msg.timestamp,
        };

        let member = match guild_id.member(ctx, msg.author.id).await {
            Ok(member) => member,
            Err(err) => {
                warn!(target: AUTOMOD_TARGET, error = %err, "Could not resolve message author");
                return;
            }
        };

        // Cache refs are not Send; resolve permissions before any await.
        let can_manage_messages = msg
            .guild(&ctx.cache)
            .and_then(|guild| {
                guild
                    .channels
                    .get(&msg.channel_id)
                    .map(|channel| guild.user_permissions_in(channel, &member).manage_messages())
            })
            .unwrap_or(false);

        let exemption = Exemption {
            is_bot: record.author_is_bot,
            is_owner: self.owner_id == Some(record.author_id),
            can_manage_messages,
            has_filter_role: member
                .roles
                .iter()
                .any(|role| rules.filter_roles.contains(&role.get())),
        };

        let history = self.data.history.recent(guild_id.get(), msg.channel_id.get());
        let Some(violation) = automod::evaluate(&record, &history, &rules, exemption) else {
            self.data
                .history
                .record(guild_id.get(), msg.channel_id.get(), record);
            return;
        };

        info!(
            target: AUTOMOD_TARGET,
            guild_id = %guild_id,
            user_id = %record.author_id,
            rule = %violation,
            "Deleting message"
        );

        if let Err(err) = msg.delete(ctx).await {
            error!(target: AUTOMOD_TARGET, error = %err, "Failed to delete flagged message");
            return;
        }

        let settings = self.data.settings.get(guild_id.get());
        if let Some(modlog) = settings.modlog_channel {
            let embed = CreateEmbed::new()
                .author(CreateEmbedAuthor::new(format!(
                    "{} ({})",
                    msg.author.tag(),
                    msg.author.id
                )))
                .description(format!(
                    "Message removed by automod: {violation}\n```\n{}\n```",
                    record.clean_content
                ))
                .footer(CreateEmbedFooter::new("Automod deletion"))
                .colour(DELETE_COLOR)
                .timestamp(serenity::Timestamp::now());

            if let Err(err) = ChannelId::new(modlog)
                .send_message(ctx, CreateMessage::new().embed(embed))
                .await
            {
                warn!(target: AUTOMOD_TARGET, error = %err, "Failed to post the modlog embed");
            }
        }
    }

    async fn member_log(
        &self,
        ctx: &Context,
        guild_id: GuildId,
        user: &User,
        footer: &str,
        color: u32,
    ) {
        let Some(channel) = self.data.settings.get(guild_id.get()).member_log_channel else {
            return;
        };

        let embed = CreateEmbed::new()
            .author(CreateEmbedAuthor::new(format!("{} ({})", user.tag(), user.id)))
            .footer(CreateEmbedFooter::new(footer.to_string()))
            .colour(color)
            .timestamp(serenity::Timestamp::now());

        if let Err(err) = ChannelId::new(channel)
            .send_message(ctx, CreateMessage::new().embed(embed))
            .await
        {
            warn!(target: EVENT_TARGET, error = %err, "Failed to post the member log embed");
        }
    }
}

#[serenity::async_trait]
impl EventHandler for Handler {
    /// Called when the bot is ready, but the cache may not be fully populated yet.
    async fn ready(&self, ctx: Context, ready: Ready) {
        let user_name = ready.user.name.clone();
        let shard_id = ctx.shard_id;
        info!("Connected as {user_name}, shard {shard_id}");
    }

    /// Called when the cache is fully populated.
    async fn cache_ready(&self, ctx: Context, guilds: Vec<GuildId>) {
        let guild_count_cache = ctx.cache.guild_count();
        let guild_count = guilds.len();
        if guild_count != guild_count_cache {
            warn!(
                "Cache guild count mismatch: {guild_count_cache} (cache) vs {guild_count} (actual)"
            );
        }
        info!("Cache ready! The bot is in {guild_count} guild(s)");
    }

    async fn message(&self, ctx: Context, msg: Message) {
        self.run_automod(&ctx, &msg).await;
    }

    /// Channel deleted: its history buffer has nothing left to describe.
    async fn channel_delete(
        &self,
        _ctx: Context,
        channel: GuildChannel,
        _messages: Option<Vec<Message>>,
    ) {
        self.data
            .history
            .remove_channel(channel.guild_id.get(), channel.id.get());
    }

    /// Guild removed the bot (or was deleted): purge every row it owned.
    async fn guild_delete(&self, _ctx: Context, incomplete: UnavailableGuild, _full: Option<Guild>) {
        // `unavailable` means an outage, not a removal; rows must survive.
        if incomplete.unavailable {
            return;
        }

        let guild_id = incomplete.id.get();
        info!(target: EVENT_TARGET, guild_id = %guild_id, "Left guild; purging its rows");
        self.data.purge_guild(guild_id);

        if let Err(err) = self.data.save().await {
            error!(target: EVENT_TARGET, error = %err, "Failed to save after guild purge");
        }
    }

    async fn guild_member_addition(&self, ctx: Context, member: Member) {
        let settings = self.data.settings.get(member.guild_id.get());

        if let Some(role) = settings.default_role {
            if let Err(err) = member.add_role(&ctx, RoleId::new(role)).await {
                warn!(
                    target: EVENT_TARGET,
                    guild_id = %member.guild_id,
                    user_id = %member.user.id,
                    error = %err,
                    "Failed to assign the default role"
                );
            }
        }

        self.member_log(&ctx, member.guild_id, &member.user, "User joined", JOIN_COLOR)
            .await;
    }

    async fn guild_member_removal(
        &self,
        ctx: Context,
        guild_id: GuildId,
        user: User,
        _member: Option<Member>,
    ) {
        // A departed member's chips do not survive them.
        self.data.casino.remove_user(guild_id.get(), user.id.get());
        self.member_log(&ctx, guild_id, &user, "User left", LEAVE_COLOR)
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handler_implements_event_handler() {
        // This test verifies at compile time that Handler implements EventHandler
        fn assert_impl<T: EventHandler>() {}
        assert_impl::<Handler>();
    }
}
