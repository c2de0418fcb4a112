//! Outgoing messages and the result of one dialog step.

use url::Url;

use crate::session::Session;

/// An inline keyboard button.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Button {
    /// Sends `data` back as a callback query.
    Callback { text: String, data: String },
    /// Opens a URL.
    Url { text: String, url: Url },
}

impl Button {
    pub fn callback(text: impl Into<String>, data: impl Into<String>) -> Self {
        Button::Callback {
            text: text.into(),
            data: data.into(),
        }
    }

    pub fn url(text: impl Into<String>, url: Url) -> Self {
        Button::Url {
            text: text.into(),
            url,
        }
    }

    pub fn text(&self) -> &str {
        match self {
            Button::Callback { text, .. } | Button::Url { text, .. } => text,
        }
    }

    /// Callback payload, if this is a callback button.
    pub fn data(&self) -> Option<&str> {
        match self {
            Button::Callback { data, .. } => Some(data),
            Button::Url { .. } => None,
        }
    }
}

/// Rows of inline buttons.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Keyboard {
    pub rows: Vec<Vec<Button>>,
}

impl Keyboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a row (builder style). Empty rows are skipped.
    pub fn row(mut self, buttons: Vec<Button>) -> Self {
        if !buttons.is_empty() {
            self.rows.push(buttons);
        }
        self
    }

    /// One button per row.
    pub fn column(buttons: impl IntoIterator<Item = Button>) -> Self {
        Self {
            rows: buttons.into_iter().map(|b| vec![b]).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// All callback payloads, row by row.
    pub fn callback_data(&self) -> Vec<&str> {
        self.rows
            .iter()
            .flatten()
            .filter_map(Button::data)
            .collect()
    }
}

/// How a reply is delivered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReplyMode {
    /// A new message.
    #[default]
    Send,
    /// Replace the message whose button was pressed; falls back to a new
    /// message when there is none.
    EditOrigin,
}

/// A message to the user, always in HTML parse mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub keyboard: Option<Keyboard>,
    pub mode: ReplyMode,
}

impl Reply {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            keyboard: None,
            mode: ReplyMode::Send,
        }
    }

    pub fn with_keyboard(mut self, keyboard: Keyboard) -> Self {
        self.keyboard = (!keyboard.is_empty()).then_some(keyboard);
        self
    }

    /// Deliver by editing the pressed message.
    pub fn editing(mut self) -> Self {
        self.mode = ReplyMode::EditOrigin;
        self
    }
}

/// What to do with the stored session after a step.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionChange {
    /// Leave whatever is stored untouched.
    Keep,
    /// Overwrite with this session.
    Save(Session),
    /// Delete the stored session.
    Clear,
}

/// The outcome of one dialog step.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub session: SessionChange,
    pub replies: Vec<Reply>,
    /// Short toast shown when answering a callback query.
    pub notice: Option<String>,
}

impl Transition {
    /// No state change, no message.
    pub fn none() -> Self {
        Self {
            session: SessionChange::Keep,
            replies: Vec::new(),
            notice: None,
        }
    }

    /// Replies without touching the session.
    pub fn reply(reply: Reply) -> Self {
        Self {
            replies: vec![reply],
            ..Self::none()
        }
    }

    /// Stores `session` and replies.
    pub fn save(session: Session, reply: Reply) -> Self {
        Self {
            session: SessionChange::Save(session),
            replies: vec![reply],
            notice: None,
        }
    }

    /// Ends the dialog and replies.
    pub fn clear(reply: Reply) -> Self {
        Self {
            session: SessionChange::Clear,
            replies: vec![reply],
            notice: None,
        }
    }

    pub fn with_notice(mut self, notice: impl Into<String>) -> Self {
        self.notice = Some(notice.into());
        self
    }

    pub fn and_reply(mut self, reply: Reply) -> Self {
        self.replies.push(reply);
        self
    }
}
