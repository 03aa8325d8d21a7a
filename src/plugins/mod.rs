pub mod dice;
pub mod feed;
pub mod gem;

use anyhow::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::platform::{BotRequest, BotResponse};
use crate::scheduler::Scheduler;

/// What a plugin gets to see of its bot during `init`.
pub struct PluginContext<'a> {
    /// Per-plugin data directory, `<data_dir>/<plugin name>`; already created
    pub config_path: PathBuf,
    /// Display name used for unsolicited posts
    pub username: String,
    /// Icon URL with bot placeholders already expanded
    pub icon_url: String,
    pub scheduler: &'a Scheduler,
}

/// A command handler in the bot's chain.
///
/// `handle` returns `None` to pass the request on to the next plugin.
#[async_trait]
pub trait Plugin: Send + Sync {
    fn name(&self) -> &'static str;

    /// Prepare state. An error removes the plugin from the chain.
    async fn init(&mut self, ctx: &PluginContext<'_>) -> Result<()>;

    /// Called once at shutdown.
    async fn done(&self) {}

    /// Set by `init`; empty before.
    fn config_path(&self) -> &Path;

    async fn handle(&self, req: &BotRequest) -> Option<BotResponse>;
}

/// Built-in plugins in dispatch order.
pub fn default_plugins() -> Vec<Box<dyn Plugin>> {
    vec![
        Box::new(feed::FeedPlugin::new()),
        Box::new(dice::DicePlugin::new()),
        Box::new(gem::GemPlugin::new()),
    ]
}
