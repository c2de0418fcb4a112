//! Error types for the Telegram bot.

use std::time::Duration;

use thiserror::Error;
use timebot_persistence::PersistenceError;

use crate::link::LinkError;

/// Errors that can occur in the Telegram bot.
#[derive(Debug, Error)]
pub enum BotError {
    /// Bot token not provided.
    #[error("Telegram bot token not set. Set TELEGRAM_BOT_TOKEN environment variable.")]
    NoToken,

    /// Invalid configuration value.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data store or session store failure.
    #[error("Store error: {0}")]
    Store(#[from] PersistenceError),

    /// Session blob could not be handled.
    #[error("Session error: {0}")]
    Session(String),

    /// Outbound Telegram call failed.
    #[error("Delivery error: {0}")]
    Delivery(#[from] DeliveryError),

    /// An external call did not finish in time.
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    /// The sender has no linked account.
    #[error("Telegram account is not linked")]
    NotLinked,

    /// Command table is inconsistent.
    #[error("Command registry error: {0}")]
    Registry(String),

    /// Deep-link token rejected.
    #[error("Link error: {0}")]
    Link(#[from] LinkError),

    /// Failed to start the bot.
    #[error("Failed to start bot: {0}")]
    Startup(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failure to deliver a message through the Bot API.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// The user blocked the bot or the chat is gone. Never retried.
    #[error("chat {chat_id} is unreachable")]
    Blocked { chat_id: i64 },

    #[error("Telegram API error: {0}")]
    Failed(String),

    #[error("Telegram API call timed out")]
    Timeout,
}

impl DeliveryError {
    pub fn is_blocked(&self) -> bool {
        matches!(self, DeliveryError::Blocked { .. })
    }
}

/// Result type for bot operations.
pub type Result<T> = std::result::Result<T, BotError>;
