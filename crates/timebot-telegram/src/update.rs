//! Inbound updates, reduced to what the dispatcher needs.
//!
//! Both transports (webhook and long polling) convert teloxide's update type
//! into [`Update`] and feed the same dispatcher.

use std::sync::OnceLock;

use regex::Regex;
use teloxide::types::{MaybeInaccessibleMessage, UpdateKind as TgUpdateKind};

/// The Telegram user behind an update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sender {
    pub telegram_id: i64,
    pub username: Option<String>,
    pub first_name: String,
}

impl Sender {
    pub fn new(telegram_id: i64, first_name: impl Into<String>) -> Self {
        Self {
            telegram_id,
            username: None,
            first_name: first_name.into(),
        }
    }
}

/// A message that can be edited in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageRef {
    pub chat_id: i64,
    pub message_id: i32,
}

/// What arrived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateKind {
    /// `/name arg1 arg2`. The name is lowercased and stripped of `@botname`.
    Command { name: String, args: Vec<String> },
    /// An inline button press.
    CallbackQuery {
        id: String,
        data: String,
        message_ref: Option<MessageRef>,
    },
    /// Any other text.
    PlainMessage { text: String },
}

/// One inbound update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Update {
    /// Telegram's update id, used to drop re-deliveries.
    pub update_id: Option<u32>,
    pub chat_id: i64,
    pub from: Sender,
    pub kind: UpdateKind,
}

fn command_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^/([A-Za-z0-9_]+)(?:@[A-Za-z0-9_]+)?(?:\s+([\s\S]*))?$")
            .expect("valid command regex")
    })
}

/// Splits `/name@bot a b` into `("name", ["a", "b"])`.
pub fn parse_command(text: &str) -> Option<(String, Vec<String>)> {
    let caps = command_pattern().captures(text.trim())?;
    let name = caps[1].to_lowercase();
    let args = caps
        .get(2)
        .map(|m| m.as_str().split_whitespace().map(String::from).collect())
        .unwrap_or_default();
    Some((name, args))
}

impl Update {
    /// A text message: a command if it parses as one, plain text otherwise.
    pub fn text(chat_id: i64, from: Sender, text: &str) -> Self {
        let kind = match parse_command(text) {
            Some((name, args)) => UpdateKind::Command { name, args },
            None => UpdateKind::PlainMessage {
                text: text.to_string(),
            },
        };
        Self {
            update_id: None,
            chat_id,
            from,
            kind,
        }
    }

    /// A button press on `message_ref`.
    pub fn callback(
        chat_id: i64,
        from: Sender,
        id: impl Into<String>,
        data: impl Into<String>,
        message_ref: Option<MessageRef>,
    ) -> Self {
        Self {
            update_id: None,
            chat_id,
            from,
            kind: UpdateKind::CallbackQuery {
                id: id.into(),
                data: data.into(),
                message_ref,
            },
        }
    }

    pub fn with_update_id(mut self, id: u32) -> Self {
        self.update_id = Some(id);
        self
    }

    /// Short label for logs.
    pub fn label(&self) -> &'static str {
        match self.kind {
            UpdateKind::Command { .. } => "command",
            UpdateKind::CallbackQuery { .. } => "callback",
            UpdateKind::PlainMessage { .. } => "message",
        }
    }

    /// Converts a teloxide update. Updates the bot does not act on
    /// (stickers, edits, channel posts, ...) yield `None`.
    pub fn from_telegram(update: &teloxide::types::Update) -> Option<Self> {
        let update_id = Some(update.id.0);
        match &update.kind {
            TgUpdateKind::Message(msg) => {
                let user = msg.from.as_ref()?;
                let text = msg.text()?;
                let mut converted = Update::text(msg.chat.id.0, sender_of(user), text);
                converted.update_id = update_id;
                Some(converted)
            }
            TgUpdateKind::CallbackQuery(q) => {
                let message_ref = q.message.as_ref().map(|m: &MaybeInaccessibleMessage| MessageRef {
                    chat_id: m.chat().id.0,
                    message_id: m.id().0,
                });
                let chat_id = message_ref
                    .map(|r| r.chat_id)
                    .unwrap_or(q.from.id.0 as i64);
                Some(Self {
                    update_id,
                    chat_id,
                    from: sender_of(&q.from),
                    kind: UpdateKind::CallbackQuery {
                        id: q.id.clone(),
                        data: q.data.clone().unwrap_or_default(),
                        message_ref,
                    },
                })
            }
            _ => None,
        }
    }
}

fn sender_of(user: &teloxide::types::User) -> Sender {
    Sender {
        telegram_id: user.id.0 as i64,
        username: user.username.clone(),
        first_name: user.first_name.clone(),
    }
}
