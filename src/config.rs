//! Bot configuration.
//!
//! Resolution order for the file: `--config` flag, then `SEQBOT_CONFIG`, then
//! `<config_dir>/seqbot/config.toml`, then built-in defaults. Environment
//! overrides are applied on top of whatever was loaded.

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use crate::app::transport::UserId;
use crate::paths::{database_file_path, default_config_file_path};

const CONFIG_ENV: &str = "SEQBOT_CONFIG";
const TOKEN_ENV: &str = "SEQBOT_BOT_TOKEN";
const OWNER_ENV: &str = "SEQBOT_OWNER_ID";
const DATABASE_ENV: &str = "SEQBOT_DATABASE";

const DEFAULT_START_TEXT: &str = "Hi {first}!\n\nI put your episodes back in order. \
Use /startsequence, send me your files, then /endsequence and I will send them back sorted.";

const DEFAULT_HELP_TEXT: &str = "How to use me, {first}:\n\n\
/startsequence - start collecting files\n\
/endsequence - send the collected files back in order\n\
/sequencemode - sort by episode first or by resolution first\n\
/setresolution - choose which resolution comes first\n\
/settings - show your current ordering settings\n\
/leaderboard - top users";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub bot_token: Option<String>,
    pub owner_id: Option<UserId>,
    pub database_path: Option<PathBuf>,
    pub delivery_delay_ms: u64,
    pub poll_timeout_secs: u64,
    pub leaderboard_limit: usize,
    pub start_text: String,
    pub help_text: String,
    pub start_photo: Option<String>,
    pub owner_url: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bot_token: None,
            owner_id: None,
            database_path: None,
            delivery_delay_ms: 1000,
            poll_timeout_secs: 30,
            leaderboard_limit: 10,
            start_text: DEFAULT_START_TEXT.to_string(),
            help_text: DEFAULT_HELP_TEXT.to_string(),
            start_photo: None,
            owner_url: None,
        }
    }
}

impl Config {
    pub fn load(cli_path: Option<&Path>) -> Result<Self> {
        let explicit = cli_path
            .map(Path::to_path_buf)
            .or_else(|| env::var_os(CONFIG_ENV).map(PathBuf::from));

        let mut config = match explicit {
            Some(path) => Self::from_file(&path)?,
            None => match default_config_file_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };
        config.apply_overrides(|key| env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_toml(&raw)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(token) = lookup(TOKEN_ENV).filter(|value| !value.trim().is_empty()) {
            self.bot_token = Some(token.trim().to_string());
        }
        if let Some(raw) = lookup(OWNER_ENV) {
            let owner = raw
                .trim()
                .parse::<UserId>()
                .with_context(|| format!("{OWNER_ENV} must be a numeric user id, got '{raw}'"))?;
            self.owner_id = Some(owner);
        }
        if let Some(path) = lookup(DATABASE_ENV).filter(|value| !value.trim().is_empty()) {
            self.database_path = Some(PathBuf::from(path));
        }
        Ok(())
    }

    pub fn require_token(&self) -> Result<&str> {
        match self.bot_token.as_deref() {
            Some(token) if !token.is_empty() => Ok(token),
            _ => bail!("no bot token configured; set bot_token in the config file or {TOKEN_ENV}"),
        }
    }

    pub fn database_path(&self) -> Result<PathBuf> {
        match &self.database_path {
            Some(path) => Ok(path.clone()),
            None => database_file_path(),
        }
    }

    pub fn delivery_delay(&self) -> Duration {
        Duration::from_millis(self.delivery_delay_ms)
    }

    pub fn is_owner(&self, user: UserId) -> bool {
        self.owner_id == Some(user)
    }
}
