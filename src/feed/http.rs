use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::debug;

use super::{FeedItem, FeedSource, WebhookSink};
use crate::platform::BotResponse;

/// reqwest-backed feed fetcher and webhook poster.
#[derive(Clone, Default)]
pub struct HttpClient {
    client: reqwest::Client,
}

impl HttpClient {
    pub fn new() -> Self {
        Self::default()
    }
}

impl From<feed_rs::model::Entry> for FeedItem {
    fn from(entry: feed_rs::model::Entry) -> Self {
        Self {
            title: entry.title.map(|t| t.content).unwrap_or_default(),
            link: entry
                .links
                .into_iter()
                .next()
                .map(|l| l.href)
                .unwrap_or_default(),
            description: entry.summary.map(|t| t.content).unwrap_or_default(),
            published: entry.published.or(entry.updated),
        }
    }
}

/// Parse an RSS or Atom document into items, keeping document order.
pub fn parse_feed(body: &[u8]) -> Result<Vec<FeedItem>> {
    let feed = feed_rs::parser::parse(body).context("Failed to parse feed")?;
    Ok(feed.entries.into_iter().map(FeedItem::from).collect())
}

#[async_trait]
impl FeedSource for HttpClient {
    async fn fetch(&self, url: &str) -> Result<Vec<FeedItem>> {
        debug!("GET {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Failed to fetch feed {}", url))?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("Feed {} returned {}", url, status);
        }

        let body = response
            .bytes()
            .await
            .with_context(|| format!("Failed to read feed body from {}", url))?;
        parse_feed(&body).with_context(|| format!("Feed {} is not valid RSS/Atom", url))
    }
}

#[async_trait]
impl WebhookSink for HttpClient {
    async fn post(&self, url: &str, payload: &BotResponse) -> Result<()> {
        let response = self
            .client
            .post(url)
            .json(payload)
            .send()
            .await
            .with_context(|| format!("Failed to POST to {}", url))?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("Non 2xx response code returned: {}", status);
        }
        Ok(())
    }
}
