//! Outbound Bot API calls.
//!
//! The dispatcher only talks to [`BotClient`]; [`TeloxideClient`] is the
//! production implementation and tests substitute a recorder.

use std::future::IntoFuture;
use std::time::Duration;

use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{
    BotCommand, InlineKeyboardButton, InlineKeyboardMarkup, MessageId, ParseMode,
};
use teloxide::{ApiError, RequestError};
use tracing::debug;

use crate::error::DeliveryError;
use crate::reply::{Button, Keyboard};
use crate::update::MessageRef;

/// The Bot API operations the core needs. Text is always HTML.
#[async_trait]
pub trait BotClient: Send + Sync {
    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<MessageRef, DeliveryError>;

    async fn edit_message_text(
        &self,
        message: MessageRef,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<(), DeliveryError>;

    async fn answer_callback_query(
        &self,
        callback_id: &str,
        text: Option<&str>,
        show_alert: bool,
    ) -> Result<(), DeliveryError>;

    /// Publishes the command menu as `(command, description)` pairs.
    async fn set_my_commands(&self, commands: &[(String, String)]) -> Result<(), DeliveryError>;
}

/// [`BotClient`] backed by a teloxide [`Bot`].
#[derive(Clone)]
pub struct TeloxideClient {
    bot: Bot,
    timeout: Duration,
}

impl TeloxideClient {
    pub fn new(bot: Bot, timeout: Duration) -> Self {
        Self { bot, timeout }
    }

    pub fn bot(&self) -> &Bot {
        &self.bot
    }

    async fn call<F, T>(&self, chat_id: i64, request: F) -> Result<T, DeliveryError>
    where
        F: IntoFuture<Output = Result<T, RequestError>>,
    {
        match tokio::time::timeout(self.timeout, request.into_future()).await {
            Ok(result) => result.map_err(|e| classify(chat_id, e)),
            Err(_) => Err(DeliveryError::Timeout),
        }
    }
}

#[async_trait]
impl BotClient for TeloxideClient {
    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<MessageRef, DeliveryError> {
        let mut req = self
            .bot
            .send_message(ChatId(chat_id), text)
            .parse_mode(ParseMode::Html);
        if let Some(kb) = keyboard {
            req = req.reply_markup(to_markup(kb));
        }
        let sent = self.call(chat_id, req).await?;
        Ok(MessageRef {
            chat_id: sent.chat.id.0,
            message_id: sent.id.0,
        })
    }

    async fn edit_message_text(
        &self,
        message: MessageRef,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<(), DeliveryError> {
        let mut req = self
            .bot
            .edit_message_text(ChatId(message.chat_id), MessageId(message.message_id), text)
            .parse_mode(ParseMode::Html);
        if let Some(kb) = keyboard {
            req = req.reply_markup(to_markup(kb));
        }
        match self.call(message.chat_id, req).await {
            Ok(_) => Ok(()),
            Err(DeliveryError::Failed(reason)) if reason == NOT_MODIFIED => {
                debug!(chat_id = message.chat_id, "Edit left message unchanged");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn answer_callback_query(
        &self,
        callback_id: &str,
        text: Option<&str>,
        show_alert: bool,
    ) -> Result<(), DeliveryError> {
        let mut req = self.bot.answer_callback_query(callback_id.to_string());
        if let Some(text) = text {
            req = req.text(text).show_alert(show_alert);
        }
        self.call(0, req).await.map(|_| ())
    }

    async fn set_my_commands(&self, commands: &[(String, String)]) -> Result<(), DeliveryError> {
        let commands: Vec<BotCommand> = commands
            .iter()
            .map(|(name, description)| BotCommand::new(name, description))
            .collect();
        self.call(0, self.bot.set_my_commands(commands)).await.map(|_| ())
    }
}

const NOT_MODIFIED: &str = "message is not modified";

fn to_markup(keyboard: &Keyboard) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(keyboard.rows.iter().map(|row| {
        row.iter()
            .map(|button| match button {
                Button::Callback { text, data } => InlineKeyboardButton::callback(text, data),
                Button::Url { text, url } => InlineKeyboardButton::url(text, url.clone()),
            })
            .collect::<Vec<_>>()
    }))
}

/// Maps a Bot API failure onto the delivery taxonomy.
fn classify(chat_id: i64, err: RequestError) -> DeliveryError {
    match err {
        RequestError::Api(api) => match api {
            ApiError::BotBlocked
            | ApiError::BotKicked
            | ApiError::BotKickedFromSupergroup
            | ApiError::UserDeactivated
            | ApiError::CantInitiateConversation
            | ApiError::CantTalkWithBots
            | ApiError::ChatNotFound => DeliveryError::Blocked { chat_id },
            ApiError::MessageNotModified => DeliveryError::Failed(NOT_MODIFIED.to_string()),
            other => DeliveryError::Failed(other.to_string()),
        },
        RequestError::Network(e) if e.is_timeout() => DeliveryError::Timeout,
        other => DeliveryError::Failed(other.to_string()),
    }
}
