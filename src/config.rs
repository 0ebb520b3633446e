//! # Configuration Module
//!
//! Runtime configuration read from the environment (and `.env` via `dotenv`).
//! Defaults match the production Frosala deployment.

use std::env;
use std::time::Duration;

use crate::errors::ConfigError;

/// Default completion model
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4";

/// Default completion service endpoint
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Default payment gateway endpoint
pub const DEFAULT_XENDIT_BASE_URL: &str = "https://api.xendit.co";

/// Bot username used in deep links
pub const DEFAULT_BOT_USERNAME: &str = "firmAi_bot";

/// Number of messages kept per chat history
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// Circuit breaker settings for the completion service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryConfig {
    /// Consecutive failures before the circuit opens
    pub circuit_breaker_threshold: u32,
    /// Time the circuit stays open before a trial request, in seconds
    pub circuit_breaker_reset_secs: u64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            circuit_breaker_threshold: 5,
            circuit_breaker_reset_secs: 60, // 1 minute
        }
    }
}

/// Completion service credentials
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
}

/// Payment gateway credentials
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XenditConfig {
    pub secret_key: String,
    pub base_url: String,
    /// Expected `x-callback-token` on webhook calls; unchecked when `None`
    pub callback_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub telegram_token: String,
    pub bot_username: String,
    pub openai: OpenAiConfig,
    pub xendit: XenditConfig,
    /// Webhook listen host
    pub host: String,
    /// Webhook listen port
    pub port: u16,
    pub database_url: Option<String>,
    pub catalog_path: Option<String>,
    /// `None` keeps the whole history
    pub history_limit: Option<usize>,
    pub completion_timeout: Duration,
    pub slow_reply_notice: Duration,
    pub http_timeout: Duration,
    pub menu_tool_enabled: bool,
    pub default_language: String,
    pub recovery: RecoveryConfig,
}

impl AppConfig {
    /// Read configuration from process environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from any key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let required = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));

        let history_limit = match parse_or(&get, "HISTORY_LIMIT", DEFAULT_HISTORY_LIMIT)? {
            0 => None,
            limit => Some(limit),
        };

        Ok(Self {
            telegram_token: required("TELEGRAM_BOT_TOKEN")?,
            bot_username: get("BOT_USERNAME").unwrap_or_else(|| DEFAULT_BOT_USERNAME.to_string()),
            openai: OpenAiConfig {
                api_key: required("OPEN_AI_API_KEY")?,
                model: get("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
                base_url: get("OPENAI_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
            },
            xendit: XenditConfig {
                secret_key: required("XENDIT_SECRET_KEY")?,
                base_url: get("XENDIT_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_XENDIT_BASE_URL.to_string()),
                callback_token: get("XENDIT_CALLBACK_TOKEN"),
            },
            host: get("HOST").unwrap_or_else(|| "localhost".to_string()),
            port: parse_or(&get, "PORT", 3000)?,
            database_url: get("DATABASE_URL"),
            catalog_path: get("CATALOG_PATH"),
            history_limit,
            completion_timeout: Duration::from_secs(parse_or(&get, "COMPLETION_TIMEOUT_SECS", 60)?),
            slow_reply_notice: Duration::from_secs(parse_or(&get, "SLOW_REPLY_NOTICE_SECS", 8)?),
            http_timeout: Duration::from_secs(parse_or(&get, "HTTP_TIMEOUT_SECS", 30)?),
            menu_tool_enabled: parse_flag(&get, "ENABLE_PRODUCT_MENU_TOOL")?,
            default_language: get("DEFAULT_LANGUAGE").unwrap_or_else(|| "id".to_string()),
            recovery: RecoveryConfig::default(),
        })
    }

    /// Address the webhook server binds to
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_or<T, G>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(default),
        Some(value) => value
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
    }
}

fn parse_flag<G>(get: &G, key: &'static str) -> Result<bool, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    match get(key).map(|value| value.to_lowercase()) {
        None => Ok(false),
        Some(value) => match value.as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::Invalid { key, value }),
        },
    }
}
