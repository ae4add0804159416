mod blob;
mod channel_filter;
mod config;
mod context;
mod discord;
mod event;
mod handler;
mod helper;
mod logging;
mod metrics;
mod plugin;
mod rewards;
mod scheduler;
mod settings;
mod state;

use serenity::{all::GatewayIntents, Client};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = crate::config::Config::load().await?;
    let token = cfg.general.discord_token.clone();
    let state = Arc::new(crate::state::State::load(cfg).await?);
    let handler = handler::Handler::new(state.clone());

    // Things we want discord to tell us about.  Message content is not needed to count messages.
    let intents =
        GatewayIntents::GUILDS | GatewayIntents::GUILD_MEMBERS | GatewayIntents::GUILD_MESSAGES;

    let mut client = Client::builder(&token, intents)
        .event_handler(handler)
        .await?;

    tokio::select! {
        result = client.start() => result?,
        result = tokio::signal::ctrl_c() => {
            result?;
            log_internal!("Shutting down...");
        }
    }

    // Wait out a scheduled save that may be in flight, then catch anything newer.
    let _saving = state.jobs.begin(scheduler::Job::PersistMetrics).await;
    scheduler::persist_metrics(&state).await?;
    log_internal!("Bot stopped!");

    Ok(())
}
