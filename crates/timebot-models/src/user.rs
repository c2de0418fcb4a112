//! Accounts known to the time tracker.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::UserId;

/// An account in the external data store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Account identifier.
    pub id: UserId,

    /// Display name.
    pub name: String,

    /// Login handle, used by `/adduser`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// Linked Telegram user id, once the account has been linked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telegram_id: Option<i64>,

    /// Operators allowed to run developer-only commands.
    #[serde(default)]
    pub developer: bool,

    /// When the account was created.
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Creates a plain (non-developer, unlinked) account.
    pub fn new(id: impl Into<UserId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            username: None,
            telegram_id: None,
            developer: false,
            created_at: Utc::now(),
        }
    }

    /// Sets the login handle.
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Links the account to a Telegram user.
    pub fn with_telegram_id(mut self, telegram_id: i64) -> Self {
        self.telegram_id = Some(telegram_id);
        self
    }

    /// Marks the account as a developer.
    pub fn as_developer(mut self) -> Self {
        self.developer = true;
        self
    }

    /// Returns the handle if set, otherwise the display name.
    pub fn handle(&self) -> &str {
        self.username.as_deref().unwrap_or(&self.name)
    }
}
