mod config;
mod forwarding;
mod keep_alive;
mod platform;
mod scheduler;
mod store;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use teloxide::types::UserId;
use teloxide::Bot;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::forwarding::{Forwarder, ForwardingSettings};
use crate::platform::telegram::TelegramClient;
use crate::scheduler::Scheduler;
use crate::store::StateStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,relaybot=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    info!("Loading configuration from: {}", config_path.display());
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    info!("Configuration loaded successfully");
    info!("  Admin: {}", config.telegram.admin_id);
    info!("  State file: {}", config.forwarding.state_path.display());
    info!("  Default mode: {}", config.forwarding.default_mode);

    // Keep-alive endpoint; bind before connecting so a busy port fails fast.
    if config.keep_alive.enabled {
        let listener = keep_alive::bind(&config.keep_alive).await?;
        tokio::spawn(async move {
            if let Err(e) = keep_alive::serve(listener).await {
                error!("{:#}", e);
            }
        });
    }

    let store = StateStore::open(
        config.forwarding.state_path.clone(),
        config.forwarding.default_mode,
    )
    .await;

    let bot = Bot::new(&config.telegram.bot_token);
    let forwarder = Arc::new(Forwarder::new(
        Arc::new(TelegramClient::new(bot.clone())),
        store,
        UserId(config.telegram.admin_id),
        ForwardingSettings::from(&config.forwarding),
    ));

    let scheduler = Scheduler::new().await?;
    scheduler::tasks::register_heartbeat(
        &scheduler,
        &config.keep_alive.heartbeat_cron,
        forwarder.clone(),
    )
    .await?;
    scheduler.start().await?;

    info!("Bot is starting...");
    platform::telegram::run(forwarder, bot, &config.polling).await?;

    Ok(())
}
