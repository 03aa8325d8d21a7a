mod bot;
mod config;
mod feed;
mod gems;
mod platform;
mod plugins;
mod scheduler;
mod template;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::bot::Bot;
use crate::config::BotConfig;

async fn start_bot(config_path: &PathBuf) -> Result<Arc<Bot>> {
    let config = BotConfig::load(config_path)?;
    info!(
        "Starting {} on {}:{} (data in {})",
        config.username,
        config.base_url,
        config.port,
        config.data_dir().display()
    );

    let bot = Arc::new(Bot::start(config, plugins::default_plugins()).await?);
    info!("  Plugins: {:?}", bot.plugin_names());

    // Bind before reporting success so a port clash fails this bot only.
    let addr = format!("{}:{}", bot.config().base_url, bot.config().port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("{} is available on {}", bot.config().username, addr);

    let server_bot = bot.clone();
    tokio::spawn(async move {
        if let Err(e) = platform::webhook::serve_on(listener, server_bot).await {
            error!("Webhook server stopped: {:#}", e);
        }
    });

    Ok(bot)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,retrobot=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // One bot per config file on the command line
    let config_paths: Vec<PathBuf> = std::env::args().skip(1).map(PathBuf::from).collect();
    if config_paths.is_empty() {
        anyhow::bail!("Usage: retrobot <bot-config.toml>...");
    }

    let mut bots = Vec::new();
    for path in &config_paths {
        info!("Loading configuration from: {}", path.display());
        match start_bot(path).await {
            Ok(bot) => bots.push(bot),
            Err(e) => warn!("Failed to start bot with config {}: {:#}", path.display(), e),
        }
    }

    if bots.is_empty() {
        warn!("Terminating as zero bots are running...");
        return Ok(());
    }

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutting down {} bot(s)", bots.len());
    for bot in &bots {
        bot.done().await;
    }

    Ok(())
}
