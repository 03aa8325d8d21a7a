use std::collections::HashMap;
use std::panic::AssertUnwindSafe;

use anyhow::Result;
use futures::FutureExt;
use tracing::{debug, error, info, warn};

use crate::config::BotConfig;
use crate::platform::{BotRequest, BotResponse};
use crate::plugins::{Plugin, PluginContext};
use crate::scheduler::Scheduler;
use crate::template;

/// One bot instance: its configuration and its ordered plugin chain.
pub struct Bot {
    config: BotConfig,
    plugins: Vec<Box<dyn Plugin>>,
    // Kept alive for the lifetime of the bot; jobs stop when the process does.
    _scheduler: Scheduler,
}

impl Bot {
    /// Initialise `plugins` in order and start the background scheduler.
    ///
    /// A plugin whose init fails is logged and dropped from the chain; the
    /// rest of the bot still starts.
    pub async fn start(config: BotConfig, plugins: Vec<Box<dyn Plugin>>) -> Result<Self> {
        let scheduler = Scheduler::new(&config.username).await?;
        let icon_url = expand_bot_vars(&config, &config.icon_url);

        let mut active: Vec<Box<dyn Plugin>> = Vec::with_capacity(plugins.len());
        for mut plugin in plugins {
            let config_path = config.data_path(plugin.name());
            if let Err(e) = tokio::fs::create_dir_all(&config_path).await {
                warn!(
                    "Plugin {} disabled, cannot create {}: {}",
                    plugin.name(),
                    config_path.display(),
                    e
                );
                continue;
            }

            let ctx = PluginContext {
                config_path,
                username: config.username.clone(),
                icon_url: icon_url.clone(),
                scheduler: &scheduler,
            };
            match plugin.init(&ctx).await {
                Ok(()) => {
                    info!(
                        "Registered plugin {} ({})",
                        plugin.name(),
                        plugin.config_path().display()
                    );
                    active.push(plugin);
                }
                Err(e) => warn!("Plugin {} disabled: {:#}", plugin.name(), e),
            }
        }

        scheduler.start().await?;

        Ok(Self {
            config,
            plugins: active,
            _scheduler: scheduler,
        })
    }

    pub fn config(&self) -> &BotConfig {
        &self.config
    }

    pub fn plugin_names(&self) -> Vec<&'static str> {
        self.plugins.iter().map(|p| p.name()).collect()
    }

    /// Expand `${baseurl}` and `${port}` in `value`.
    pub fn expand(&self, value: &str) -> String {
        expand_bot_vars(&self.config, value)
    }

    /// Offer `req` to each plugin in order; the first response wins.
    ///
    /// A plugin that panics is skipped. Blank username and icon are filled
    /// in from the bot config.
    pub async fn handle(&self, req: &BotRequest) -> Option<BotResponse> {
        for plugin in &self.plugins {
            let outcome = AssertUnwindSafe(plugin.handle(req)).catch_unwind().await;
            let mut resp = match outcome {
                Ok(Some(resp)) => resp,
                Ok(None) => continue,
                Err(_) => {
                    error!("Plugin {} panicked handling {:?}", plugin.name(), req.text);
                    continue;
                }
            };
            debug!("Plugin {} claimed request", plugin.name());

            if resp.username.is_empty() {
                resp.username = self.config.username.clone();
            }
            if resp.icon_url.is_empty() {
                resp.icon_url = self.expand(&self.config.icon_url);
            }
            return Some(resp);
        }
        None
    }

    /// Tear down every plugin.
    pub async fn done(&self) {
        for plugin in &self.plugins {
            plugin.done().await;
        }
    }
}

fn expand_bot_vars(config: &BotConfig, value: &str) -> String {
    let vars: HashMap<&str, String> = HashMap::from([
        ("baseurl", config.base_url.clone()),
        ("port", config.port.to_string()),
    ]);
    template::expand(value, &vars)
}
