//! Configuration loading, validation, and management for lmgram.
//!
//! Loads configuration from `~/.lmgram/config.toml` (or an explicit path) with
//! environment variable overrides. A missing file is populated with defaults
//! on first run. Validates all settings at startup.

pub mod localization;

pub use localization::{LocaleError, Translations};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Base URL of the OpenAI-compatible inference server
    #[serde(default = "default_api_address")]
    pub api_address: String,

    /// Model identifier sent with every request
    #[serde(default)]
    pub model: String,

    /// Token budget for stored conversations and request windows
    #[serde(default = "default_token_limit")]
    pub token_limit: usize,

    /// System message placed at the head of every conversation
    #[serde(default = "default_system_role")]
    pub system_role: String,

    /// Keep the system message in every request window even under a tight budget
    #[serde(default)]
    pub pin_system_prompt: bool,

    /// How replies are produced: streamed into an edited message, or sent whole
    #[serde(default)]
    pub response_mode: ResponseMode,

    /// Language of user-facing messages (`locales/<language>.json`)
    #[serde(default = "default_language")]
    pub language: String,

    /// Telegram bot settings
    #[serde(default)]
    pub telegram: TelegramConfig,

    /// Push-delivery settings (used when `telegram.update_method = "webhook"`)
    #[serde(default)]
    pub webhook: WebhookConfig,

    /// Locations of the users file, log file and locale catalogs
    #[serde(default)]
    pub paths: PathsConfig,
}

fn default_api_address() -> String {
    "http://localhost:1234/v1".into()
}
fn default_token_limit() -> usize {
    2048
}
fn default_system_role() -> String {
    "You are a helpful assistant.".into()
}
fn default_language() -> String {
    "en".into()
}

/// Selects between the two reply flows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseMode {
    /// Stream deltas into a placeholder message edited in place.
    Stream,
    /// Wait for the complete reply and send it as one message.
    #[default]
    Full,
}

impl std::str::FromStr for ResponseMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "stream" => Ok(Self::Stream),
            "full" => Ok(Self::Full),
            other => Err(format!("unknown response mode '{other}' (expected stream or full)")),
        }
    }
}

/// How inbound updates reach the bot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateMethod {
    #[default]
    Polling,
    Webhook,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default = "default_bot_token")]
    pub bot_token: String,

    #[serde(default)]
    pub update_method: UpdateMethod,

    /// Long-poll timeout in seconds
    #[serde(default = "default_polling_timeout")]
    pub polling_timeout: u64,
}

fn default_bot_token() -> String {
    "YOUR_TELEGRAM_BOT_TOKEN".into()
}
fn default_polling_timeout() -> u64 {
    60
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: default_bot_token(),
            update_method: UpdateMethod::default(),
            polling_timeout: default_polling_timeout(),
        }
    }
}

impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("bot_token", &"[REDACTED]")
            .field("update_method", &self.update_method)
            .field("polling_timeout", &self.polling_timeout)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Public domain Telegram delivers to (scheme optional)
    #[serde(default = "default_webhook_domain")]
    pub domain: String,

    /// Public port; empty means the scheme default
    #[serde(default = "default_webhook_port")]
    pub port: String,

    /// Local interface the listener binds to
    #[serde(default = "default_listen_host")]
    pub listen_host: String,

    /// Certificate uploaded to Telegram when it exists (self-signed setups)
    #[serde(default = "default_cert_file")]
    pub cert_file: String,

    #[serde(default = "default_key_file")]
    pub key_file: String,
}

fn default_webhook_domain() -> String {
    "mybot.domain.com".into()
}
fn default_webhook_port() -> String {
    "443".into()
}
fn default_listen_host() -> String {
    "0.0.0.0".into()
}
fn default_cert_file() -> String {
    "cert.pem".into()
}
fn default_key_file() -> String {
    "key.pem".into()
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            domain: default_webhook_domain(),
            port: default_webhook_port(),
            listen_host: default_listen_host(),
            cert_file: default_cert_file(),
            key_file: default_key_file(),
        }
    }
}

impl WebhookConfig {
    /// The public URL Telegram should deliver updates to.
    ///
    /// Any scheme and leading slashes on `domain` are dropped; the port is
    /// appended only when set.
    pub fn public_url(&self) -> String {
        let domain = self
            .domain
            .trim_start_matches("http://")
            .trim_start_matches("https://")
            .trim_start_matches('/');
        if self.port.is_empty() {
            format!("https://{domain}/webhook")
        } else {
            format!("https://{domain}:{}/webhook", self.port)
        }
    }

    /// Local socket address for the listener.
    pub fn listen_addr(&self) -> String {
        let port = if self.port.is_empty() { "443" } else { &self.port };
        format!("{}:{port}", self.listen_host)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_users_file")]
    pub users_file: String,

    #[serde(default = "default_log_file")]
    pub log_file: String,

    #[serde(default = "default_locales_dir")]
    pub locales_dir: String,
}

fn default_users_file() -> String {
    "users.json".into()
}
fn default_log_file() -> String {
    "requests.log".into()
}
fn default_locales_dir() -> String {
    "locales".into()
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            users_file: default_users_file(),
            log_file: default_log_file(),
            locales_dir: default_locales_dir(),
        }
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_address", &self.api_address)
            .field("model", &self.model)
            .field("token_limit", &self.token_limit)
            .field("system_role", &self.system_role)
            .field("pin_system_prompt", &self.pin_system_prompt)
            .field("response_mode", &self.response_mode)
            .field("language", &self.language)
            .field("telegram", &self.telegram)
            .field("webhook", &self.webhook)
            .field("paths", &self.paths)
            .finish()
    }
}

impl AppConfig {
    /// Load configuration from `path`, writing defaults there first if the
    /// file does not exist yet.
    ///
    /// Environment variables override file values:
    /// - `LMGRAM_BOT_TOKEN`
    /// - `LMGRAM_API_ADDRESS`
    /// - `LMGRAM_MODEL`
    pub fn init(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            Self::load_from(path)?
        } else {
            tracing::info!("No config file found at {}, writing defaults", path.display());
            let config = Self::default();
            config.save(path)?;
            config
        };

        if let Ok(token) = std::env::var("LMGRAM_BOT_TOKEN") {
            config.telegram.bot_token = token;
        }
        if let Ok(address) = std::env::var("LMGRAM_API_ADDRESS") {
            config.api_address = address;
        }
        if let Ok(model) = std::env::var("LMGRAM_MODEL") {
            config.model = model;
        }

        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Persist the configuration as pretty TOML, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let write_err = |reason: String| ConfigError::WriteError {
            path: path.to_path_buf(),
            reason,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| write_err(e.to_string()))?;
        }
        let content = toml::to_string_pretty(self).map_err(|e| write_err(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| write_err(e.to_string()))
    }

    /// Get the default configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".lmgram")
    }

    /// Get the default configuration file path.
    pub fn default_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Resolve a configured file path: absolute paths are kept, relative ones
    /// are placed next to the config file.
    pub fn resolve(config_path: &Path, configured: &str) -> PathBuf {
        let configured = Path::new(configured);
        if configured.is_absolute() {
            return configured.to_path_buf();
        }
        match config_path.parent() {
            Some(dir) => dir.join(configured),
            None => configured.to_path_buf(),
        }
    }

    /// Directory holding the locale catalogs: next to the config file when it
    /// exists there, otherwise relative to the working directory.
    pub fn locales_dir(&self, config_path: &Path) -> PathBuf {
        let beside_config = Self::resolve(config_path, &self.paths.locales_dir);
        if beside_config.is_dir() {
            beside_config
        } else {
            PathBuf::from(&self.paths.locales_dir)
        }
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.token_limit == 0 {
            return Err(ConfigError::ValidationError(
                "token_limit must be greater than 0".into(),
            ));
        }

        if self.telegram.polling_timeout > 600 {
            return Err(ConfigError::ValidationError(
                "telegram.polling_timeout must be at most 600 seconds".into(),
            ));
        }

        if self.telegram.update_method == UpdateMethod::Webhook
            && self.webhook.domain.trim().is_empty()
        {
            return Err(ConfigError::ValidationError(
                "webhook.domain is required when update_method = \"webhook\"".into(),
            ));
        }

        Ok(())
    }

    /// Whether a real bot token has been configured.
    pub fn has_bot_token(&self) -> bool {
        !self.telegram.bot_token.is_empty() && self.telegram.bot_token != default_bot_token()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_address: default_api_address(),
            model: String::new(),
            token_limit: default_token_limit(),
            system_role: default_system_role(),
            pin_system_prompt: false,
            response_mode: ResponseMode::default(),
            language: default_language(),
            telegram: TelegramConfig::default(),
            webhook: WebhookConfig::default(),
            paths: PathsConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Failed to write config file at {path}: {reason}")]
    WriteError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
