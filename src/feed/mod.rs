pub mod http;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::FeedConfig;
use crate::platform::BotResponse;
use crate::template;

pub const DEFAULT_TEMPLATE: &str = "${feed.name}: ${item.link}";

/// One entry of a fetched feed, in provider order.
#[derive(Debug, Clone, Default)]
pub struct FeedItem {
    pub title: String,
    pub link: String,
    pub description: String,
    pub published: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<FeedItem>>;
}

/// Outgoing webhook delivery. Errors are reported, never retried.
#[async_trait]
pub trait WebhookSink: Send + Sync {
    async fn post(&self, url: &str, payload: &BotResponse) -> Result<()>;
}

/// A configured feed plus its polling cursor.
#[derive(Debug, Clone)]
pub struct FeedState {
    pub config: FeedConfig,
    /// Timestamp of the newest item already seen
    pub last_updated: Option<DateTime<Utc>>,
    /// Last fetch attempt, successful or not
    pub last_time: Option<DateTime<Utc>>,
}

impl FeedState {
    fn new(config: FeedConfig) -> Self {
        Self {
            config,
            last_updated: None,
            last_time: None,
        }
    }

    /// Due once `check_minutes` have passed since the last attempt. Inclusive,
    /// so a one-minute feed is not skipped by tick jitter.
    fn is_due(&self, now: DateTime<Utc>) -> bool {
        match self.last_time {
            None => true,
            Some(t) => now - t >= Duration::minutes(i64::from(self.config.check_minutes)),
        }
    }

    /// Walk `items` oldest first and return those newer than the watermark,
    /// advancing it as we go. Items matching the ignore prefix move the
    /// watermark but are not returned, so the watermark is the newest item
    /// seen rather than the newest one delivered.
    fn take_new(&mut self, items: Vec<FeedItem>) -> Vec<FeedItem> {
        let prefix = self
            .config
            .ignore_title_prefix
            .as_deref()
            .filter(|p| !p.is_empty())
            .map(str::to_lowercase);

        let mut updates = Vec::new();
        for item in items.into_iter().rev() {
            let Some(published) = item.published else {
                continue;
            };
            if self.last_updated.is_some_and(|w| published <= w) {
                continue;
            }
            self.last_updated = Some(published);

            if let Some(prefix) = &prefix {
                if item.title.to_lowercase().starts_with(prefix) {
                    debug!("Ignoring '{}' in {}", item.title, self.config.name);
                    continue;
                }
            }
            info!("Update found: {}", item.title);
            updates.push(item);
        }
        updates
    }

    fn render(&self, item: &FeedItem) -> String {
        let vars: HashMap<&str, String> = HashMap::from([
            ("feed.name", self.config.name.clone()),
            ("item.link", item.link.clone()),
            ("item.title", item.title.clone()),
            ("item.description", item.description.clone()),
        ]);
        let text = self
            .config
            .template
            .as_deref()
            .filter(|t| !t.is_empty())
            .unwrap_or(DEFAULT_TEMPLATE);
        template::expand(text, &vars)
    }
}

/// Polls every configured feed and fans new items out to the feed's hooks.
pub struct FeedPoller {
    feeds: Vec<FeedState>,
    source: Arc<dyn FeedSource>,
    sink: Arc<dyn WebhookSink>,
    username: String,
    icon_url: String,
    status: watch::Sender<Vec<FeedState>>,
}

impl FeedPoller {
    /// `username` and `icon_url` are stamped on every outgoing post.
    pub fn new(
        configs: Vec<FeedConfig>,
        source: Arc<dyn FeedSource>,
        sink: Arc<dyn WebhookSink>,
        username: String,
        icon_url: String,
    ) -> Self {
        let feeds: Vec<FeedState> = configs.into_iter().map(FeedState::new).collect();
        let (status, _) = watch::channel(feeds.clone());
        Self {
            feeds,
            source,
            sink,
            username,
            icon_url,
            status,
        }
    }

    /// Snapshot of the feed states, republished after each feed is polled.
    /// Readers never wait on a poll in progress.
    pub fn subscribe(&self) -> watch::Receiver<Vec<FeedState>> {
        self.status.subscribe()
    }

    /// Check every due feed once. When `broadcast` is false the watermark is
    /// advanced silently. Returns the number of new items found.
    pub async fn poll(&mut self, broadcast: bool, now: DateTime<Utc>) -> usize {
        let mut found = 0;
        for i in 0..self.feeds.len() {
            if !self.feeds[i].is_due(now) {
                continue;
            }
            found += self.poll_feed(i, broadcast, now).await;
            self.status.send_replace(self.feeds.clone());
        }
        found
    }

    async fn poll_feed(&mut self, index: usize, broadcast: bool, now: DateTime<Utc>) -> usize {
        let feed = &mut self.feeds[index];
        feed.last_time = Some(now);

        let items = match self.source.fetch(&feed.config.url).await {
            Ok(items) => items,
            Err(e) => {
                warn!("Fetching feed {} failed: {:#}", feed.config.name, e);
                return 0;
            }
        };
        info!("Updating feed {}", feed.config.name);

        let updates = feed.take_new(items);
        info!("Got {} updates for {}", updates.len(), feed.config.name);
        if !broadcast {
            return updates.len();
        }

        for item in &updates {
            let payload = BotResponse {
                username: self.username.clone(),
                icon_url: self.icon_url.clone(),
                text: feed.render(item),
                ..Default::default()
            };
            for hook in &feed.config.hooks {
                debug!("POST {}", hook);
                if let Err(e) = self.sink.post(hook, &payload).await {
                    warn!("POST to {} failed: {:#}", hook, e);
                }
            }
        }
        updates.len()
    }
}
