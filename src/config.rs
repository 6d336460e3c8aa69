//! Configuration loading and validation.
//!
//! A single human-owned `config.toml`. Every section and field has a
//! default, so a missing file yields a working configuration; the bot token
//! itself never lives in the file, only the name of the environment variable
//! holding it.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::gateway::TextFormat;
use crate::render::MAX_MEDIA_GROUP;
use crate::validation::{ValidationSettings, DEFAULT_PROMPT_TEXT};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Telegram connection settings.
    #[serde(default)]
    pub telegram: TelegramConfig,

    /// Validation prompt settings.
    #[serde(default)]
    pub validation: ValidationConfig,

    /// Log output settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Telegram-specific configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct TelegramConfig {
    /// Environment variable name holding the bot token.
    #[serde(default = "default_bot_token_env")]
    pub bot_token_env: String,

    /// Parse mode tried first for plain sends.
    #[serde(default)]
    pub parse_mode: ParseModeSetting,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token_env: default_bot_token_env(),
            parse_mode: ParseModeSetting::default(),
        }
    }
}

impl TelegramConfig {
    /// Read the bot token from the configured environment variable.
    ///
    /// # Errors
    ///
    /// Returns an error if the variable is unset or empty.
    pub fn bot_token(&self) -> anyhow::Result<String> {
        self.bot_token_with(|key| std::env::var(key).ok())
    }

    /// Read the bot token through a custom env resolver (for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the variable is unset or empty.
    pub fn bot_token_with(&self, env: impl Fn(&str) -> Option<String>) -> anyhow::Result<String> {
        match env(&self.bot_token_env) {
            Some(token) if !token.trim().is_empty() => Ok(token),
            _ => Err(anyhow::anyhow!(
                "bot token not found: set the {} environment variable",
                self.bot_token_env
            )),
        }
    }
}

/// Rich formatting mode for plain sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseModeSetting {
    /// HTML parse mode.
    #[default]
    Html,
    /// MarkdownV2 parse mode.
    MarkdownV2,
    /// No rich formatting.
    Plain,
}

impl From<ParseModeSetting> for TextFormat {
    fn from(mode: ParseModeSetting) -> Self {
        match mode {
            ParseModeSetting::Html => TextFormat::Html,
            ParseModeSetting::MarkdownV2 => TextFormat::MarkdownV2,
            ParseModeSetting::Plain => TextFormat::Plain,
        }
    }
}

/// Validation prompt settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ValidationConfig {
    /// Prompt text used when a request carries none.
    #[serde(default = "default_prompt_text")]
    pub default_text: String,

    /// Resolve unanswered prompts as `stop` after this many seconds.
    /// Unset waits indefinitely.
    #[serde(default)]
    pub prompt_timeout_secs: Option<u64>,

    /// Photos rendered per media group (capped at the platform limit).
    #[serde(default = "default_max_media_group")]
    pub max_media_group: usize,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            default_text: default_prompt_text(),
            prompt_timeout_secs: None,
            max_media_group: default_max_media_group(),
        }
    }
}

impl ValidationConfig {
    /// Runtime settings derived from this section.
    pub fn settings(&self) -> ValidationSettings {
        ValidationSettings {
            default_text: self.default_text.clone(),
            timeout: self.prompt_timeout_secs.map(Duration::from_secs),
            max_media: self.max_media_group.clamp(1, MAX_MEDIA_GROUP),
        }
    }
}

/// Log output settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
    /// Directory for rotating JSON logs. Unset logs to stderr only.
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

// Default value functions for serde

fn default_bot_token_env() -> String {
    "TELEGRAM_BOT_TOKEN".to_owned()
}
fn default_prompt_text() -> String {
    DEFAULT_PROMPT_TEXT.to_owned()
}
fn default_max_media_group() -> usize {
    MAX_MEDIA_GROUP
}

impl Config {
    /// Check invariants serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first invalid field.
    pub fn check(&self) -> anyhow::Result<()> {
        if self.telegram.bot_token_env.trim().is_empty() {
            anyhow::bail!("telegram.bot_token_env must not be empty");
        }
        if self.validation.default_text.trim().is_empty() {
            anyhow::bail!("validation.default_text must not be empty");
        }
        if self.validation.prompt_timeout_secs == Some(0) {
            anyhow::bail!("validation.prompt_timeout_secs must be positive when set");
        }
        Ok(())
    }
}

/// Load the config from a TOML file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, or fails
/// [`Config::check`].
pub fn load_config(path: &Path) -> anyhow::Result<Config> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read config at {}: {e}", path.display()))?;
    let config: Config = toml::from_str(&contents)
        .map_err(|e| anyhow::anyhow!("failed to parse config at {}: {e}", path.display()))?;
    config.check()?;
    Ok(config)
}

/// Load the config at `path`, falling back to defaults if it does not exist.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_config_or_default(path: &Path) -> anyhow::Result<Config> {
    if !path.exists() {
        tracing::info!(path = %path.display(), "no config file found, using defaults");
        return Ok(Config::default());
    }
    load_config(path)
}

/// Resolve the default config directory (`~/.telegram-activities/`).
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined.
pub fn config_dir() -> anyhow::Result<PathBuf> {
    let home = directories::BaseDirs::new()
        .ok_or_else(|| anyhow::anyhow!("cannot determine home directory"))?;
    Ok(home.home_dir().join(".telegram-activities"))
}

/// Default config file path (`~/.telegram-activities/config.toml`).
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined.
pub fn default_config_path() -> anyhow::Result<PathBuf> {
    Ok(config_dir()?.join("config.toml"))
}
