//! Configuration module for the keyword reply bot.
//!
//! Loads Telegram API credentials and bot settings from the environment.

mod settings;

pub use settings::{BotConfig, ConfigError};

/// How long a login stays active before the account expires.
pub const LOGIN_VALIDITY_DAYS: i64 = 30;
