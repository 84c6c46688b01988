use std::env;
use std::sync::Arc;

use poise::serenity_prelude::{self as serenity};
use serenity::GatewayIntents;
use tracing::{error, info};

use warden::scheduler::{Scheduler, SchedulerRequest, SerenityDelivery};
use warden::{Data, Error, commands, handlers, logging};

/// Main function to run the bot
async fn async_main() -> Result<(), Error> {
    // Initialize logging
    logging::init()?;

    // Load environment variables
    let token = env::var("DISCORD_TOKEN").expect("DISCORD_TOKEN must be set");
    let owner_id = env::var("WARDEN_OWNER_ID")
        .ok()
        .and_then(|id| id.parse::<u64>().ok());
    let issue_channel = env::var("WARDEN_ISSUE_LOG_CHANNEL")
        .ok()
        .and_then(|id| id.parse::<u64>().ok());

    // Load persisted guild settings, job rows and casino balances
    let data = Data::load().await;

    // Configure the Poise framework
    let setup_data = data.clone();
    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: vec![
                commands::ping(),
                commands::remind(),
                commands::reminders(),
                commands::countdown(),
                commands::timedmessage(),
                commands::daily(),
                commands::chips(),
                commands::tick(),
                commands::automod(),
            ],
            pre_command: |ctx| {
                Box::pin(async move {
                    // Log the start of command execution
                    logging::log_command_start(ctx);
                })
            },
            post_command: |ctx| {
                Box::pin(async move {
                    // Log the end of command execution
                    logging::log_command_end(ctx);
                })
            },
            on_error: |error| {
                Box::pin(async move {
                    // Log the error using our logging system
                    warden::logging::log_command_error(&error);
                })
            },
            ..Default::default()
        })
        .setup(move |ctx, _ready, framework| {
            Box::pin(async move {
                logging::log_console("Registering commands globally".to_string());
                poise::builtins::register_globally(ctx, &framework.options().commands).await?;
                Ok(setup_data)
            })
        })
        .build();

    // Configure the Serenity client
    let intents = GatewayIntents::non_privileged()
        | GatewayIntents::MESSAGE_CONTENT
        | GatewayIntents::GUILD_MEMBERS;
    let mut client = serenity::ClientBuilder::new(token, intents)
        .event_handler(handlers::Handler::new(data.clone(), owner_id))
        .framework(framework)
        .await
        .expect("Failed to create client");

    // Start the background scheduler with the client's HTTP handle
    let delivery = Arc::new(SerenityDelivery::new(client.http.clone(), issue_channel));
    let scheduler = Scheduler::new(data.jobs.clone(), data.casino.clone(), delivery);
    let tx = scheduler.start();
    data.set_scheduler_tx(tx.clone());

    info!("Starting bot...");
    tokio::select! {
        result = client.start() => {
            if let Err(err) = result {
                error!("Error starting the bot: {err}");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
    }

    // Flush state and stop the scheduler before exit
    let _ = tx.send(SchedulerRequest::Shutdown).await;
    if let Err(err) = data.save().await {
        error!("Failed to save data on shutdown: {err}");
    }

    Ok(())
}

fn main() {
    // Run the async main function
    let result = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(async_main());

    // Handle any errors that occurred during execution
    if let Err(err) = result {
        eprintln!("Error: {err}");
    }
}
