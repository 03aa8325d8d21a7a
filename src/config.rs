use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Per-bot settings, one TOML file per bot instance.
#[derive(Debug, Deserialize, Clone)]
pub struct BotConfig {
    /// Display name used for replies and outgoing webhook posts
    #[serde(default)]
    pub username: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Icon template; may reference `${baseurl}` and `${port}`
    #[serde(default)]
    pub icon_url: String,
    #[serde(default)]
    pub port: u16,
    /// Token expected on `/message` requests
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub slash_strict_tokens: bool,
    #[serde(default)]
    pub slash_tokens: Vec<String>,
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

/// Contents of the feed plugin's `config.toml`.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct FeedPluginConfig {
    #[serde(default)]
    pub feeds: Vec<FeedConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FeedConfig {
    pub name: String,
    pub url: String,
    #[serde(default = "default_check_minutes")]
    pub check_minutes: u32,
    /// Outgoing webhook URLs that receive every new item
    #[serde(default)]
    pub hooks: Vec<String>,
    #[serde(default)]
    pub ignore_title_prefix: Option<String>,
    #[serde(default)]
    pub template: Option<String>,
}

fn default_base_url() -> String {
    "localhost".to_string()
}

fn default_check_minutes() -> u32 {
    5
}

impl BotConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let mut config = Self::parse(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))?;

        let data_dir = config.data_dir();
        if !data_dir.exists() {
            std::fs::create_dir_all(&data_dir).with_context(|| {
                format!("Failed to create data directory: {}", data_dir.display())
            })?;
        }
        config.data_dir = Some(data_dir);

        Ok(config)
    }

    /// Parse and validate without touching the filesystem.
    pub fn parse(content: &str) -> Result<Self> {
        let config: BotConfig = toml::from_str(content).context("Failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.username.is_empty() {
            anyhow::bail!("username required");
        }
        if self.token.is_empty() {
            anyhow::bail!("webhook token required");
        }
        if self.port == 0 {
            anyhow::bail!("port required");
        }
        Ok(())
    }

    /// Data directory, defaulting to `./data/<username>`.
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("./data").join(&self.username))
    }

    pub fn data_path(&self, name: &str) -> PathBuf {
        self.data_dir().join(name)
    }

    /// `/message` needs the bot token; `/slash` accepts anything unless strict.
    pub fn is_token_valid(&self, is_slash: bool, token: &str) -> bool {
        if !is_slash {
            return token == self.token;
        }
        if !self.slash_strict_tokens {
            return true;
        }
        self.slash_tokens.iter().any(|t| t == token)
    }
}

impl FeedPluginConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read feed config: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse feed config: {}", path.display()))
    }
}
