use chrono::{Duration, NaiveDateTime, TimeZone, Utc};
use poise::serenity_prelude as serenity;
use poise::{CreateReply, command};
use serenity::{Colour, CreateEmbed, GuildChannel};
use tracing::error;

use crate::casino::TopupOutcome;
use crate::scheduler::{JobPayload, JobRecord, MentionTag, SchedulerRequest, TickCategory};
use crate::{Context, Error};

/// Basic ping command
/// This command is used to check if the bot is responsive.
#[command(prefix_command, slash_command, guild_only)]
pub async fn ping(ctx: Context<'_>) -> Result<(), Error> {
    ctx.say("Pong!").await?;
    Ok(())
}

/// Parse a reminder duration in the `50m` / `2h` / `3hr` / `1d` format.
#[must_use]
pub fn parse_duration(input: &str) -> Option<Duration> {
    let input = input.trim().to_ascii_lowercase();
    let digits: String = input.chars().take_while(char::is_ascii_digit).collect();
    let unit = &input[digits.len()..];
    if digits.is_empty() || digits.len() > 2 {
        return None;
    }
    let amount: i64 = digits.parse().ok()?;

    match unit {
        "m" => Some(Duration::minutes(amount)),
        "h" | "hr" => Some(Duration::hours(amount)),
        "d" => Some(Duration::days(amount)),
        _ => None,
    }
}

async fn save_data(ctx: Context<'_>) {
    if let Err(err) = ctx.data().save().await {
        error!("Failed to save data after command: {err}");
    }
}

/// Set a reminder and warden will DM you when it is due
#[command(prefix_command, slash_command)]
pub async fn remind(
    ctx: Context<'_>,
    #[description = "When to remind you, like 50m, 2h or 1d"] time: String,
    #[description = "What to remind you of"]
    #[rest]
    reminder: String,
) -> Result<(), Error> {
    let Some(duration) = parse_duration(&time) else {
        ctx.say(
            "Has to be in the pattern of `50m`, `2h`, `3hr` or `01d` wherein `m` would be \
             minutes, `h` (or `hr`) would be hours and `d` would be days",
        )
        .await?;
        return Ok(());
    };

    let remind_at = Utc::now() + duration;
    ctx.data().jobs.add(JobRecord::new(
        ctx.guild_id().map_or(0, |id| id.get()),
        JobPayload::Reminder {
            user_id: ctx.author().id.get(),
            remind_at,
            text: reminder,
        },
    ));
    save_data(ctx).await;

    let embed = CreateEmbed::new()
        .title("Reminder stored")
        .description(format!(
            "I will remind you about that on {}",
            remind_at.format("%B %d %Y at %H:%M UTC")
        ))
        .colour(Colour::new(crate::scheduler::REMINDER_COLOR));
    ctx.send(CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// List your pending reminders
#[command(prefix_command, slash_command)]
pub async fn reminders(ctx: Context<'_>) -> Result<(), Error> {
    let pending = ctx.data().jobs.reminders_for_user(ctx.author().id.get());
    if pending.is_empty() {
        ctx.say("You have no pending reminders").await?;
        return Ok(());
    }

    let mut lines = Vec::with_capacity(pending.len());
    for row in &pending {
        if let JobPayload::Reminder { remind_at, text, .. } = &row.payload {
            lines.push(format!(
                "• {} — {}",
                remind_at.format("%B %d %Y at %H:%M UTC"),
                text
            ));
        }
    }

    let embed = CreateEmbed::new()
        .title("Pending reminders")
        .description(lines.join("\n"))
        .colour(Colour::new(crate::scheduler::REMINDER_COLOR));
    ctx.send(CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Schedule a countdown: a daily reminder until the event, then a final ping
#[command(
    prefix_command,
    slash_command,
    guild_only,
    required_permissions = "MANAGE_MESSAGES"
)]
pub async fn countdown(
    ctx: Context<'_>,
    #[description = "Event time as YYYY-MM-DD HH:MM (UTC)"] datetime: String,
    #[description = "Channel to announce in"] channel: GuildChannel,
    #[description = "Mention tag for the final send"] tag: Option<String>,
    #[description = "What is being counted down to"]
    #[rest]
    content: String,
) -> Result<(), Error> {
    let Ok(naive) = NaiveDateTime::parse_from_str(&datetime, "%Y-%m-%d %H:%M") else {
        ctx.say("The event time has to look like `2024-12-31 20:00` (UTC)").await?;
        return Ok(());
    };
    let event_at = Utc.from_utc_datetime(&naive);
    if event_at <= Utc::now() {
        ctx.say("That event is already in the past").await?;
        return Ok(());
    }

    let tag = match tag.as_deref() {
        Some("everyone") => MentionTag::Everyone,
        Some("here") => MentionTag::Here,
        _ => MentionTag::None,
    };

    let guild_id = ctx.guild_id().expect("guild_only command");
    ctx.data().jobs.add(JobRecord::new(
        guild_id.get(),
        JobPayload::Countdown {
            channel_id: channel.id.get(),
            content,
            event_at,
            last_sent: Utc::now(),
            tag,
        },
    ));
    save_data(ctx).await;

    ctx.say(format!(
        "Counting down to {} in {}",
        event_at.format("%B %d %Y at %H:%M UTC"),
        channel
    ))
    .await?;
    Ok(())
}

/// Schedule a recurring announcement on a fixed interval
#[command(
    prefix_command,
    slash_command,
    guild_only,
    required_permissions = "MANAGE_MESSAGES"
)]
pub async fn timedmessage(
    ctx: Context<'_>,
    #[description = "Interval, like 30m, 12h or 1d"] interval: String,
    #[description = "Channel to announce in"] channel: GuildChannel,
    #[description = "The announcement body"]
    #[rest]
    content: String,
) -> Result<(), Error> {
    let Some(duration) = parse_duration(&interval) else {
        ctx.say("The interval has to look like `30m`, `12h` or `1d`").await?;
        return Ok(());
    };

    let guild_id = ctx.guild_id().expect("guild_only command");
    ctx.data().jobs.add(JobRecord::new(
        guild_id.get(),
        JobPayload::TimedMessage {
            channel_id: channel.id.get(),
            content,
            interval_secs: duration.num_seconds(),
            last_sent: Utc::now(),
        },
    ));
    save_data(ctx).await;

    ctx.say(format!("Timed message scheduled every {interval} in {channel}"))
        .await?;
    Ok(())
}

/// Receive your daily top up of 500 chips
#[command(prefix_command, slash_command, guild_only, aliases("topup", "bonus"))]
pub async fn daily(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx.guild_id().expect("guild_only command").get();
    let outcome = ctx
        .data()
        .casino
        .daily_topup(guild_id, ctx.author().id.get(), Utc::now());
    save_data(ctx).await;

    let (lead, body) = match outcome {
        TopupOutcome::FirstGrant { balance } => (
            "You didn't have any chips yet so here's your first 500. Spend them wisely!",
            format!("**Balance**\n{balance}\n**Daily Reset**\nin 24 hours"),
        ),
        TopupOutcome::Credited { previous, balance } => (
            "Topped up your balance with your daily 500 chips!",
            format!("**Balance**\n{previous} ➡ {balance}\n**Daily Reset**\nin 24 hours"),
        ),
        TopupOutcome::NotYetDue { balance, ready_in } => (
            "Sorry but you are not due to get your daily chips yet, here is your current balance",
            format!(
                "**Balance**\n{balance}\n**Daily Reset**\nin {} hour(s) and {} minute(s)",
                ready_in.num_hours(),
                ready_in.num_minutes() % 60
            ),
        ),
    };

    let embed = CreateEmbed::new()
        .description(body)
        .colour(Colour::new(crate::scheduler::LOTTO_COLOR));
    ctx.send(CreateReply::default().content(lead).embed(embed))
        .await?;
    Ok(())
}

/// Check your casino chip balance
#[command(prefix_command, slash_command, guild_only, aliases("balance"))]
pub async fn chips(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx.guild_id().expect("guild_only command").get();
    match ctx.data().casino.get(guild_id, ctx.author().id.get()) {
        Ok(account) => {
            let embed = CreateEmbed::new()
                .description(format!("**Balance**\n{}", account.balance))
                .colour(Colour::new(crate::scheduler::LOTTO_COLOR));
            ctx.send(CreateReply::default().embed(embed)).await?;
        }
        Err(_) => {
            ctx.say("You don't have any chips yet. Use `/daily` to claim your first 500!")
                .await?;
        }
    }
    Ok(())
}

/// Run a scheduler tick immediately instead of waiting for its timer
#[command(prefix_command, slash_command, owners_only, hide_in_help)]
pub async fn tick(
    ctx: Context<'_>,
    #[description = "Which tick to run: fast, reminders or daily"] category: String,
) -> Result<(), Error> {
    let category = match category.as_str() {
        "fast" => TickCategory::Fast,
        "reminders" => TickCategory::Reminders,
        "daily" => TickCategory::Daily,
        _ => {
            ctx.say("Category has to be `fast`, `reminders` or `daily`").await?;
            return Ok(());
        }
    };

    ctx.data()
        .request_tick(SchedulerRequest::RunCategory(category))
        .await;
    ctx.say(format!("Requested an immediate {category} tick")).await?;
    Ok(())
}

/// Configure the automod rules for this guild
#[command(
    prefix_command,
    slash_command,
    guild_only,
    required_permissions = "MANAGE_MESSAGES",
    subcommands(
        "toggle", "caps", "duptext", "emojis", "badwords", "mentions", "slowmode", "links",
        "invites", "filterrole"
    ),
    subcommand_required
)]
pub async fn automod(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

fn guild_of(ctx: Context<'_>) -> u64 {
    ctx.guild_id().expect("guild_only command").get()
}

/// Turn the whole automod pipeline on or off
#[command(prefix_command, slash_command, guild_only)]
pub async fn toggle(ctx: Context<'_>, enabled: bool) -> Result<(), Error> {
    ctx.data()
        .settings
        .update(guild_of(ctx), |s| s.automod.enabled = enabled);
    save_data(ctx).await;
    ctx.say(format!(
        "Automod is now {}",
        if enabled { "enabled" } else { "disabled" }
    ))
    .await?;
    Ok(())
}

/// Configure the excessive-caps rule
#[command(prefix_command, slash_command, guild_only)]
pub async fn caps(
    ctx: Context<'_>,
    enabled: bool,
    #[description = "Uppercase fraction that triggers deletion, 0.0 to 1.0"] threshold: Option<f64>,
    #[description = "Minimum message length the rule applies to"] minlength: Option<usize>,
) -> Result<(), Error> {
    ctx.data().settings.update(guild_of(ctx), |s| {
        s.automod.caps.enabled = enabled;
        if let Some(threshold) = threshold {
            s.automod.caps.threshold = threshold.clamp(0.0, 1.0);
        }
        if let Some(minlength) = minlength {
            s.automod.caps.minlength = minlength;
        }
    });
    save_data(ctx).await;
    ctx.say("Caps rule updated").await?;
    Ok(())
}

/// Configure the duplicate-text rule
#[command(prefix_command, slash_command, guild_only)]
pub async fn duptext(
    ctx: Context<'_>,
    enabled: bool,
    #[description = "History window in minutes"] within: Option<i64>,
    #[description = "Number of near-equal messages tolerated"] equals: Option<usize>,
    #[description = "Maximum edit distance still counted as a duplicate"] distance: Option<usize>,
) -> Result<(), Error> {
    ctx.data().settings.update(guild_of(ctx), |s| {
        s.automod.duptext.enabled = enabled;
        if let Some(within) = within {
            s.automod.duptext.within = within;
        }
        if let Some(equals) = equals {
            s.automod.duptext.equals = equals;
        }
        if let Some(distance) = distance {
            s.automod.duptext.distance = distance;
        }
    });
    save_data(ctx).await;
    ctx.say("Duplicate-text rule updated").await?;
    Ok(())
}

/// Configure the excessive-emoji rule
#[command(prefix_command, slash_command, guild_only)]
pub async fn emojis(
    ctx: Context<'_>,
    enabled: bool,
    threshold: Option<usize>,
    minlength: Option<usize>,
) -> Result<(), Error> {
    ctx.data().settings.update(guild_of(ctx), |s| {
        s.automod.emojis.enabled = enabled;
        if let Some(threshold) = threshold {
            s.automod.emojis.threshold = threshold;
        }
        if let Some(minlength) = minlength {
            s.automod.emojis.minlength = minlength;
        }
    });
    save_data(ctx).await;
    ctx.say("Emoji rule updated").await?;
    Ok(())
}

/// Configure the banned-words rule
#[command(prefix_command, slash_command, guild_only)]
pub async fn badwords(
    ctx: Context<'_>,
    enabled: bool,
    #[description = "Comma-separated list of banned words"] words: Option<String>,
) -> Result<(), Error> {
    ctx.data().settings.update(guild_of(ctx), |s| {
        s.automod.badwords.enabled = enabled;
        if let Some(words) = words {
            s.automod.badwords.words = words
                .split(',')
                .map(|w| w.trim().to_string())
                .filter(|w| !w.is_empty())
                .collect();
        }
    });
    save_data(ctx).await;
    ctx.say("Banned-words rule updated").await?;
    Ok(())
}

/// Configure the excessive-mentions rule
#[command(prefix_command, slash_command, guild_only)]
pub async fn mentions(
    ctx: Context<'_>,
    enabled: bool,
    threshold: Option<usize>,
) -> Result<(), Error> {
    ctx.data().settings.update(guild_of(ctx), |s| {
        s.automod.mentions.enabled = enabled;
        if let Some(threshold) = threshold {
            s.automod.mentions.threshold = threshold;
        }
    });
    save_data(ctx).await;
    ctx.say("Mentions rule updated").await?;
    Ok(())
}

/// Configure the slow-mode rule
#[command(prefix_command, slash_command, guild_only)]
pub async fn slowmode(
    ctx: Context<'_>,
    enabled: bool,
    #[description = "Seconds a user must wait between messages"] within: Option<i64>,
) -> Result<(), Error> {
    ctx.data().settings.update(guild_of(ctx), |s| {
        s.automod.slowmode.enabled = enabled;
        if let Some(within) = within {
            s.automod.slowmode.within = within;
        }
    });
    save_data(ctx).await;
    ctx.say("Slow-mode rule updated").await?;
    Ok(())
}

/// Toggle the external-link filter
#[command(prefix_command, slash_command, guild_only)]
pub async fn links(ctx: Context<'_>, enabled: bool) -> Result<(), Error> {
    ctx.data()
        .settings
        .update(guild_of(ctx), |s| s.automod.links = enabled);
    save_data(ctx).await;
    ctx.say("Link filter updated").await?;
    Ok(())
}

/// Toggle the invite-link filter
#[command(prefix_command, slash_command, guild_only)]
pub async fn invites(ctx: Context<'_>, enabled: bool) -> Result<(), Error> {
    ctx.data()
        .settings
        .update(guild_of(ctx), |s| s.automod.invites = enabled);
    save_data(ctx).await;
    ctx.say("Invite filter updated").await?;
    Ok(())
}

/// Add or remove a role that is exempt from all automod rules
#[command(prefix_command, slash_command, guild_only)]
pub async fn filterrole(
    ctx: Context<'_>,
    role: serenity::Role,
    #[description = "Remove the role from the exempt list instead"] remove: Option<bool>,
) -> Result<(), Error> {
    let role_id = role.id.get();
    let removing = remove.unwrap_or(false);
    ctx.data().settings.update(guild_of(ctx), |s| {
        if removing {
            s.automod.filter_roles.retain(|r| *r != role_id);
        } else if !s.automod.filter_roles.contains(&role_id) {
            s.automod.filter_roles.push(role_id);
        }
    });
    save_data(ctx).await;
    ctx.say(if removing {
        "Role removed from the automod exempt list"
    } else {
        "Role added to the automod exempt list"
    })
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration_grammar() {
        assert_eq!(parse_duration("5m"), Some(Duration::minutes(5)));
        assert_eq!(parse_duration("50m"), Some(Duration::minutes(50)));
        assert_eq!(parse_duration("2h"), Some(Duration::hours(2)));
        assert_eq!(parse_duration("3hr"), Some(Duration::hours(3)));
        assert_eq!(parse_duration("01d"), Some(Duration::days(1)));
        assert_eq!(parse_duration("2H"), Some(Duration::hours(2)));

        assert_eq!(parse_duration(""), None);
        assert_eq!(parse_duration("m"), None);
        assert_eq!(parse_duration("5"), None);
        assert_eq!(parse_duration("5w"), None);
        assert_eq!(parse_duration("500m"), None);
    }

    // Test that the ping command is properly defined
    #[test]
    fn test_ping_command_definition() {
        let cmd = ping();
        assert_eq!(cmd.name, "ping");
        assert!(cmd.guild_only);
    }

    #[test]
    fn test_remind_command_definition() {
        let cmd = remind();
        assert_eq!(cmd.name, "remind");
        assert!(!cmd.guild_only);
    }

    #[test]
    fn test_automod_is_a_command_group() {
        let cmd = automod();
        assert_eq!(cmd.name, "automod");
        assert!(cmd.guild_only);
        assert!(cmd.subcommand_required);
        assert_eq!(cmd.subcommands.len(), 10);
    }

    #[test]
    fn test_daily_aliases() {
        let cmd = daily();
        assert!(cmd.aliases.iter().any(|a| a == "topup"));
        assert!(cmd.aliases.iter().any(|a| a == "bonus"));
    }
}
