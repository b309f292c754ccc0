//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

/// Which channel to run the bot on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    Telegram,
    Cli,
}

/// Bot configuration, read from the environment.
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Telegram Bot API token (required unless running on the CLI channel).
    pub telegram_token: Option<String>,
    /// Base URL of the Ollama instance.
    pub ollama_host: String,
    /// Model name passed to Ollama.
    pub ollama_model: String,
    /// Operator identity for /broadcast and /stats. None disables both.
    pub admin_user_id: Option<String>,
    /// Path of the durable user-record collection.
    pub users_path: PathBuf,
    /// Optional JSON file overriding the built-in question catalog.
    pub questions_path: Option<PathBuf>,
    /// Delay inserted between consecutive broadcast sends.
    pub broadcast_delay: Duration,
    /// Channel to serve.
    pub channel: ChannelKind,
}

impl BotConfig {
    /// Read configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let channel = match std::env::var("CINE_ASSIST_CHANNEL").as_deref() {
            Ok("cli") => ChannelKind::Cli,
            Ok("telegram") | Err(_) => ChannelKind::Telegram,
            Ok(other) => {
                return Err(ConfigError::InvalidValue {
                    key: "CINE_ASSIST_CHANNEL".into(),
                    message: format!("unknown channel: {other}"),
                });
            }
        };

        let telegram_token = std::env::var("TELEGRAM_BOT_TOKEN").ok();
        if channel == ChannelKind::Telegram && telegram_token.is_none() {
            return Err(ConfigError::MissingEnvVar("TELEGRAM_BOT_TOKEN".into()));
        }

        let broadcast_delay_ms = match std::env::var("CINE_ASSIST_BROADCAST_DELAY_MS") {
            Ok(raw) => raw.parse::<u64>().map_err(|_| ConfigError::InvalidValue {
                key: "CINE_ASSIST_BROADCAST_DELAY_MS".into(),
                message: format!("not a number: {raw}"),
            })?,
            Err(_) => 100,
        };

        Ok(Self {
            telegram_token,
            ollama_host: std::env::var("OLLAMA_HOST")
                .unwrap_or_else(|_| "http://localhost:11434".to_string()),
            ollama_model: std::env::var("OLLAMA_MODEL").unwrap_or_else(|_| "llama2".to_string()),
            admin_user_id: std::env::var("ADMIN_USER_ID").ok(),
            users_path: std::env::var("CINE_ASSIST_USERS_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./data/users.json")),
            questions_path: std::env::var("CINE_ASSIST_QUESTIONS_PATH")
                .ok()
                .map(PathBuf::from),
            broadcast_delay: Duration::from_millis(broadcast_delay_ms),
            channel,
        })
    }
}
