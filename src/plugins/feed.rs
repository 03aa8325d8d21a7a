use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info};

use super::{Plugin, PluginContext};
use crate::config::FeedPluginConfig;
use crate::feed::http::HttpClient;
use crate::feed::{FeedPoller, FeedSource, FeedState, WebhookSink};
use crate::platform::{Attachment, AttachmentField, BotRequest, BotResponse};

const COLOR: &str = "#ff0000";

/// RSS/Atom relay. Polls on the scheduler's minute tick and answers `feed`
/// with the configured feeds.
///
/// The poller belongs to the tick job; `feed` only reads the snapshot it
/// publishes.
pub struct FeedPlugin {
    config_path: PathBuf,
    status: Option<watch::Receiver<Vec<FeedState>>>,
    source: Arc<dyn FeedSource>,
    sink: Arc<dyn WebhookSink>,
}

impl FeedPlugin {
    pub fn new() -> Self {
        let client = Arc::new(HttpClient::new());
        Self::with_transport(client.clone(), client)
    }

    pub fn with_transport(source: Arc<dyn FeedSource>, sink: Arc<dyn WebhookSink>) -> Self {
        Self {
            config_path: PathBuf::new(),
            status: None,
            source,
            sink,
        }
    }
}

/// One scheduled broadcast poll. Returns false when the previous poll is
/// still running, in which case this tick is skipped.
async fn poll_tick(poller: &Mutex<FeedPoller>) -> bool {
    let Ok(mut poller) = poller.try_lock() else {
        debug!("Previous feed poll still running, skipping tick");
        return false;
    };
    poller.poll(true, Utc::now()).await;
    true
}

#[async_trait]
impl Plugin for FeedPlugin {
    fn name(&self) -> &'static str {
        "Feed"
    }

    async fn init(&mut self, ctx: &PluginContext<'_>) -> Result<()> {
        info!("Init for plugin {}", self.name());
        self.config_path = ctx.config_path.clone();

        let path = self.config_path.join("config.toml");
        let config = FeedPluginConfig::load(&path)?;
        info!("Parsed feed config and got {} feeds", config.feeds.len());

        let mut poller = FeedPoller::new(
            config.feeds,
            self.source.clone(),
            self.sink.clone(),
            ctx.username.clone(),
            ctx.icon_url.clone(),
        );
        // Baseline: remember what is already published without posting it.
        poller.poll(false, Utc::now()).await;
        let status = poller.subscribe();

        let poller = Arc::new(Mutex::new(poller));
        ctx.scheduler
            .every_minute("feed-poll", move || {
                let poller = poller.clone();
                Box::pin(async move {
                    poll_tick(&poller).await;
                })
            })
            .await
            .context("Failed to schedule feed polling")?;

        self.status = Some(status);
        Ok(())
    }

    fn config_path(&self) -> &Path {
        &self.config_path
    }

    async fn handle(&self, req: &BotRequest) -> Option<BotResponse> {
        let (command, _) = req.command_and_args(0);
        if command != "feed" {
            return None;
        }

        let mut attachment = Attachment::new(COLOR, "Feeds", "");
        let feeds = self
            .status
            .as_ref()
            .map(|status| status.borrow().clone())
            .unwrap_or_default();
        if feeds.is_empty() {
            attachment.text = "No feeds configured.".to_string();
        }
        for feed in &feeds {
            let seen = feed
                .last_updated
                .map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
                .unwrap_or_else(|| "never".to_string());
            attachment.fields.push(AttachmentField {
                short: false,
                title: feed.config.name.clone(),
                value: format!(
                    "{} every {} min, {} hook(s), newest item {}",
                    feed.config.url,
                    feed.config.check_minutes,
                    feed.config.hooks.len(),
                    seen
                ),
            });
        }
        Some(BotResponse::with_attachment(attachment))
    }
}
