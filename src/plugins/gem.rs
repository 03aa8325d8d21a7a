use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

use super::{Plugin, PluginContext};
use crate::gems::{Gem, GemError, GemStore};
use crate::platform::{Attachment, BotRequest, BotResponse};

const COLOR: &str = "#0000ff";
const SEARCH_LIMIT: usize = 10;

const HELP: &str = "```Help:\n\
/gem add <text>       Adds a gem.\n\
/gem remove <id>      Remove a gem if you own it.\n\
/gem search <term>    Find gems by text or author.\n\
/gem count            Number of gems in this channel.\n\
/gem <id>             Show specific gem.\n\
/gem                  Show a random gem.```\n";

const NO_GEMS: &str = "No gems for this channel.  Add one with /gem add ...";
const NO_SUCH_GEM: &str = "No such gem.  Add one with /gem add ...";

/// Channel quotes: `gem`, `gem <id>`, `gem add|remove|search|count|help`.
pub struct GemPlugin {
    config_path: PathBuf,
    store: Option<GemStore>,
}

impl GemPlugin {
    pub fn new() -> Self {
        Self {
            config_path: PathBuf::new(),
            store: None,
        }
    }
}

fn gem_title(gem: &Gem) -> String {
    format!(
        "#{} (posted by {} on {})",
        gem.id,
        gem.creator,
        gem.date.format("%Y-%m-%d %H:%M UTC")
    )
}

/// Reply title and text for one `gem` invocation.
async fn run(store: &GemStore, req: &BotRequest, args: &[String]) -> (String, String) {
    let channel = req.channel_id.as_str();
    let show = |gem: Option<Gem>| match gem {
        Some(g) => (gem_title(&g), g.text),
        None => ("Gems".to_string(), NO_SUCH_GEM.to_string()),
    };
    let rest = args.get(1).map(|s| s.trim()).unwrap_or_default();

    let Some(sub) = args.first() else {
        return match store.random(channel).await {
            Some(g) => (gem_title(&g), g.text),
            None => ("Gems".to_string(), NO_GEMS.to_string()),
        };
    };

    match sub.as_str() {
        "help" => ("Gems".to_string(), HELP.to_string()),
        "add" => {
            if rest.is_empty() {
                return ("Gems".to_string(), "Nothing to add.  Usage: /gem add <text>".to_string());
            }
            let now = Utc::now();
            match store.add(channel, &req.user_name, now, rest).await {
                Ok(id) => {
                    let gem = Gem {
                        id,
                        creator: req.user_name.clone(),
                        date: now,
                        text: rest.to_string(),
                    };
                    (gem_title(&gem), gem.text)
                }
                Err(e) => {
                    error!("Failed to add gem: {}", e);
                    ("Gems".to_string(), "Failed to add gem.".to_string())
                }
            }
        }
        "remove" => {
            let Ok(id) = rest.parse::<u64>() else {
                return ("Gems".to_string(), NO_SUCH_GEM.to_string());
            };
            let text = match store.get(channel, id).await {
                None => NO_SUCH_GEM.to_string(),
                Some(g) if g.creator != req.user_name => "Not owner of gem.".to_string(),
                Some(_) => match store.remove(channel, id).await {
                    Ok(()) => "Removed gem.".to_string(),
                    Err(GemError::NotFound(_)) => NO_SUCH_GEM.to_string(),
                    Err(e) => format!("Failed to remove gem: {}", e),
                },
            };
            ("Gems".to_string(), text)
        }
        "search" => {
            if rest.is_empty() {
                return ("Gems".to_string(), "Usage: /gem search <term>".to_string());
            }
            let hits = store.search(channel, rest, Some(SEARCH_LIMIT)).await;
            let text = if hits.is_empty() {
                format!("No gems matching '{}'.", rest)
            } else {
                hits.iter()
                    .map(|g| format!("#{} {}: {}", g.id, g.creator, g.text))
                    .collect::<Vec<_>>()
                    .join("\n")
            };
            (format!("Gems matching '{}'", rest), text)
        }
        "count" => {
            let n = store.count(channel).await;
            ("Gems".to_string(), format!("{} gems in this channel.", n))
        }
        other => match other.parse::<u64>() {
            Ok(id) => show(store.get(channel, id).await),
            Err(_) => show(None),
        },
    }
}

#[async_trait]
impl Plugin for GemPlugin {
    fn name(&self) -> &'static str {
        "Gem"
    }

    async fn init(&mut self, ctx: &PluginContext<'_>) -> Result<()> {
        info!("Init for plugin {}", self.name());
        self.config_path = ctx.config_path.clone();
        let datafile = self.config_path.join("gems.yml");
        let store = GemStore::open(&datafile)
            .await
            .with_context(|| format!("Failed to load gems from {}", datafile.display()))?;
        self.store = Some(store);
        Ok(())
    }

    fn config_path(&self) -> &Path {
        &self.config_path
    }

    async fn handle(&self, req: &BotRequest) -> Option<BotResponse> {
        let (command, args) = req.command_and_args(2);
        if command != "gem" {
            return None;
        }
        debug!("Command: {}, Args: {:?}", command, args);

        let store = self.store.as_ref()?;
        let (title, text) = run(store, req, &args).await;
        Some(BotResponse::with_attachment(Attachment::new(COLOR, title, text)))
    }
}
