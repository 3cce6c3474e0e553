//! Application settings loaded from environment variables.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Bot configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// Telegram API ID (obtain from <https://my.telegram.org>).
    pub api_id: i32,

    /// Telegram API hash (obtain from <https://my.telegram.org>).
    pub api_hash: String,

    /// Channel every authenticated account joins, e.g. `@mychannel`.
    pub channel_owner: String,

    /// Path to the user data JSON file.
    #[serde(default = "default_data_path")]
    pub data_path: PathBuf,

    /// Directory holding transient login session databases.
    #[serde(default = "default_sessions_dir")]
    pub sessions_dir: PathBuf,
}

fn default_data_path() -> PathBuf {
    PathBuf::from("userdata.json")
}

fn default_sessions_dir() -> PathBuf {
    PathBuf::from("sessions")
}

impl BotConfig {
    /// Creates configuration from environment variables.
    ///
    /// Expects `API_ID`, `API_HASH` and `CHANNEL_OWNER` to be set.
    /// `DATA_FILE` and `SESSIONS_DIR` are optional.
    ///
    /// # Errors
    ///
    /// Returns an error if required environment variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_id: i32 = std::env::var("API_ID")
            .map_err(|_| ConfigError::MissingEnvVar("API_ID"))?
            .parse()
            .map_err(|_| ConfigError::InvalidApiId)?;

        let api_hash =
            std::env::var("API_HASH").map_err(|_| ConfigError::MissingEnvVar("API_HASH"))?;

        let channel_owner = std::env::var("CHANNEL_OWNER")
            .map_err(|_| ConfigError::MissingEnvVar("CHANNEL_OWNER"))?;

        let data_path = std::env::var("DATA_FILE").map_or_else(|_| default_data_path(), PathBuf::from);

        let sessions_dir =
            std::env::var("SESSIONS_DIR").map_or_else(|_| default_sessions_dir(), PathBuf::from);

        Ok(Self {
            api_id,
            api_hash,
            channel_owner,
            data_path,
            sessions_dir,
        })
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(&'static str),

    #[error("Invalid API ID format (must be a positive integer)")]
    InvalidApiId,
}
