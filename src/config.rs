//! Configuration module for WatchPost.
//!
//! Loads configuration from environment variables with sensible defaults.

use std::env;

use crate::alert::ChannelSecrets;

/// Daemon configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Path to the SQLite database file (default: "watchpost.db")
    pub db_path: String,
    /// Path to the hot-state JSON blob (default: "watchpost-state.json")
    pub state_path: String,
    /// Seconds between evaluation cycles (default: 300)
    pub interval_secs: u64,
    /// Telegram bot token for the chat channel
    pub telegram_token: Option<String>,
    /// HTTP mail API endpoint for the email channel
    pub mail_api_url: Option<String>,
    /// API key for the mail endpoint
    pub mail_api_key: Option<String>,
    /// Sender address for alert emails
    pub mail_from: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            db_path: "watchpost.db".to_string(),
            state_path: "watchpost-state.json".to_string(),
            interval_secs: 300,
            telegram_token: None,
            mail_api_url: None,
            mail_api_key: None,
            mail_from: "monitor@watchpost.local".to_string(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `WATCHPOST_DB_PATH`: database file path
    /// - `WATCHPOST_STATE_PATH`: hot-state file path
    /// - `WATCHPOST_INTERVAL_SECS`: seconds between cycles
    /// - `WATCHPOST_TELEGRAM_TOKEN`: telegram bot token
    /// - `WATCHPOST_MAIL_API_URL`: mail API endpoint
    /// - `WATCHPOST_MAIL_API_KEY`: mail API key
    /// - `WATCHPOST_MAIL_FROM`: alert email sender
    pub fn load() -> Self {
        let mut cfg = Self::default();

        if let Ok(path) = env::var("WATCHPOST_DB_PATH") {
            cfg.db_path = path;
        }
        if let Ok(path) = env::var("WATCHPOST_STATE_PATH") {
            cfg.state_path = path;
        }
        if let Ok(secs) = env::var("WATCHPOST_INTERVAL_SECS") {
            if let Ok(secs) = secs.parse() {
                cfg.interval_secs = secs;
            }
        }
        if let Ok(token) = env::var("WATCHPOST_TELEGRAM_TOKEN") {
            cfg.telegram_token = Some(token);
        }
        if let Ok(url) = env::var("WATCHPOST_MAIL_API_URL") {
            cfg.mail_api_url = Some(url);
        }
        if let Ok(key) = env::var("WATCHPOST_MAIL_API_KEY") {
            cfg.mail_api_key = Some(key);
        }
        if let Ok(from) = env::var("WATCHPOST_MAIL_FROM") {
            cfg.mail_from = from;
        }

        cfg
    }

    /// Channel credentials handed to the alert router.
    pub fn channel_secrets(&self) -> ChannelSecrets {
        ChannelSecrets {
            telegram_token: self.telegram_token.clone(),
            mail_api_url: self.mail_api_url.clone(),
            mail_api_key: self.mail_api_key.clone(),
            mail_from: self.mail_from.clone(),
        }
    }
}
