//! Conversation state persisted between updates.
//!
//! A [`Session`] is the only memory the bot has of an ongoing dialog. It is
//! stored as JSON in a [`SessionStore`] under a [`SessionKey`] and rebuilt on
//! every update. Each dialog kind carries its own typed payload; the `kind`
//! tag is written explicitly so blobs from different dialogs never mix.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use timebot_models::{EditField, FieldValue, ProjectId, Role, TimeEntryId, UserId};
use timebot_persistence::SessionStore;
use tracing::{debug, warn};

use crate::error::Result;

/// Hex characters in a confirmation token; keeps button data well under
/// Telegram's 64-byte limit.
const CONFIRM_TOKEN_LEN: usize = 8;

/// Identifies one conversation: a user talking to a bot in a chat.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub bot: String,
    pub chat_id: i64,
    pub user_id: i64,
}

impl SessionKey {
    pub fn new(bot: impl Into<String>, chat_id: i64, user_id: i64) -> Self {
        Self {
            bot: bot.into(),
            chat_id,
            user_id,
        }
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.bot, self.chat_id, self.user_id)
    }
}

/// Which free-text handler receives the next plain message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AwaitingInput {
    /// Registered command name.
    pub command: String,
    /// Context entry point declared by that command.
    pub entry: String,
}

/// An in-progress dialog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub dialog: Dialog,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub awaiting: Option<AwaitingInput>,
    /// Identifies the confirmation prompt currently on screen. Save/Cancel
    /// buttons carry it so buttons from older prompts can be told apart.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirm_token: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn new(dialog: impl Into<Dialog>) -> Self {
        Self {
            dialog: dialog.into(),
            awaiting: None,
            confirm_token: None,
            created_at: Utc::now(),
        }
    }

    /// Routes the next plain message to `command`'s `entry` context handler.
    pub fn awaiting(mut self, command: &str, entry: &str) -> Self {
        self.awaiting = Some(AwaitingInput {
            command: command.to_string(),
            entry: entry.to_string(),
        });
        self
    }

    /// Marks the session as showing a fresh confirmation prompt.
    pub fn confirming(mut self) -> Self {
        let mut token = uuid::Uuid::new_v4().simple().to_string();
        token.truncate(CONFIRM_TOKEN_LEN);
        self.confirm_token = Some(token);
        self
    }

    /// Replaces the dialog payload, keeping the creation time.
    pub fn advance(&self, dialog: impl Into<Dialog>) -> Self {
        Self {
            dialog: dialog.into(),
            awaiting: None,
            confirm_token: None,
            created_at: self.created_at,
        }
    }
}

/// One variant per dialog, each with its own payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Dialog {
    Edit(EditDialog),
    AddUser(AddUserDialog),
    AddTime(AddTimeDialog),
    Rename(RenameDialog),
}

impl Dialog {
    pub fn kind(&self) -> &'static str {
        match self {
            Dialog::Edit(_) => "edit",
            Dialog::AddUser(_) => "add_user",
            Dialog::AddTime(_) => "add_time",
            Dialog::Rename(_) => "rename",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditStep {
    SelectEntry,
    SelectField,
    InputProject,
    InputHours,
    InputDescription,
    Confirm,
}

/// Editing one field of one time entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditDialog {
    pub step: EditStep,
    /// Set once an entry has been selected.
    #[serde(default)]
    pub time_entry_id: Option<TimeEntryId>,
    /// Version of the entry when it was selected.
    #[serde(default)]
    pub entry_version: u64,
    #[serde(default)]
    pub field: Option<EditField>,
    /// Value waiting for confirmation.
    #[serde(default)]
    pub pending: Option<FieldValue>,
    /// Page count committed when the entry list was last rendered.
    #[serde(default)]
    pub total_pages: usize,
    #[serde(default)]
    pub page: usize,
}

impl EditDialog {
    /// The entry list is showing `page` of `total_pages`.
    pub fn selecting(page: usize, total_pages: usize) -> Self {
        Self {
            step: EditStep::SelectEntry,
            time_entry_id: None,
            entry_version: 0,
            field: None,
            pending: None,
            total_pages,
            page,
        }
    }

    /// An entry has been chosen; a field comes next.
    pub fn selected(id: TimeEntryId, version: u64) -> Self {
        Self {
            step: EditStep::SelectField,
            time_entry_id: Some(id),
            entry_version: version,
            ..Self::selecting(0, 0)
        }
    }
}

impl From<EditDialog> for Dialog {
    fn from(d: EditDialog) -> Self {
        Dialog::Edit(d)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddUserStep {
    InputUsername,
    SelectRole,
    Confirm,
}

/// Adding a member to a managed project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddUserDialog {
    pub step: AddUserStep,
    pub project_id: ProjectId,
    pub project_slug: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub member_id: Option<UserId>,
    #[serde(default)]
    pub role: Option<Role>,
}

impl From<AddUserDialog> for Dialog {
    fn from(d: AddUserDialog) -> Self {
        Dialog::AddUser(d)
    }
}

/// Booking time on a chosen project; waiting for the hours.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddTimeDialog {
    pub project_id: ProjectId,
    pub project_slug: String,
}

impl From<AddTimeDialog> for Dialog {
    fn from(d: AddTimeDialog) -> Self {
        Dialog::AddTime(d)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenameStep {
    InputName,
    Confirm,
}

/// Renaming a managed project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenameDialog {
    pub step: RenameStep,
    pub entity_id: ProjectId,
    /// Name when the dialog started; the commit only applies if unchanged.
    pub current_name: String,
    #[serde(default)]
    pub new_name: Option<String>,
}

impl From<RenameDialog> for Dialog {
    fn from(d: RenameDialog) -> Self {
        Dialog::Rename(d)
    }
}

/// Typed access to the session store.
#[derive(Clone)]
pub struct Sessions {
    store: Arc<dyn SessionStore>,
    ttl: Duration,
}

impl Sessions {
    pub fn new(store: Arc<dyn SessionStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Loads the session for `key`. Storage failures and undecodable blobs
    /// are logged and treated as "no session".
    pub async fn load(&self, key: &SessionKey) -> Option<Session> {
        let id = key.to_string();
        let blob = match self.store.get(&id).await {
            Ok(blob) => blob?,
            Err(e) => {
                warn!(key = %id, error = %e, "Session store read failed, treating as absent");
                return None;
            }
        };

        match serde_json::from_str::<Session>(&blob) {
            Ok(session) => {
                debug!(key = %id, kind = session.dialog.kind(), "Loaded session");
                Some(session)
            }
            Err(e) => {
                warn!(key = %id, error = %e, "Discarding undecodable session");
                if let Err(e) = self.store.delete(&id).await {
                    warn!(key = %id, error = %e, "Failed to delete undecodable session");
                }
                None
            }
        }
    }

    pub async fn save(&self, key: &SessionKey, session: &Session) -> Result<()> {
        let blob = serde_json::to_string(session)?;
        self.store.put(&key.to_string(), blob, self.ttl).await?;
        Ok(())
    }

    pub async fn clear(&self, key: &SessionKey) -> Result<()> {
        self.store.delete(&key.to_string()).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use timebot_models::Hours;
    use timebot_persistence::{FileSessionStore, MemorySessionStore};

    fn key() -> SessionKey {
        SessionKey::new("timebot", 1001, 1001)
    }

    fn sessions() -> (Arc<MemorySessionStore>, Sessions) {
        let store = Arc::new(MemorySessionStore::new());
        let sessions = Sessions::new(store.clone(), Duration::from_secs(3600));
        (store, sessions)
    }

    #[test]
    fn test_round_trip_keeps_kind_and_payload() {
        let mut edit = EditDialog::selected(TimeEntryId::new(42), 3);
        edit.step = EditStep::Confirm;
        edit.field = Some(EditField::Hours);
        edit.pending = Some(FieldValue::Hours(Hours::from_tenths(105)));
        let session = Session::new(edit).awaiting("edit", "confirm");

        let json = serde_json::to_string(&session).unwrap();
        let back: Session = serde_json::from_str(&json).unwrap();
        assert_eq!(back, session);
        assert_eq!(back.dialog.kind(), "edit");
    }

    #[test]
    fn test_confirm_token_is_fresh_per_prompt() {
        let first = Session::new(EditDialog::selected(TimeEntryId::new(42), 0)).confirming();
        let second = first.advance(EditDialog::selected(TimeEntryId::new(42), 0));
        assert!(second.confirm_token.is_none());

        let second = second.confirming();
        let (a, b) = (first.confirm_token.unwrap(), second.confirm_token.unwrap());
        assert_eq!(a.len(), 8);
        assert_ne!(a, b);
    }

    #[test]
    fn test_tag_is_explicit() {
        let session = Session::new(RenameDialog {
            step: RenameStep::InputName,
            entity_id: ProjectId::new(10),
            current_name: "Alpha".into(),
            new_name: None,
        });
        let value = serde_json::to_value(&session).unwrap();
        assert_eq!(value["dialog"]["kind"], "rename");
        assert_eq!(value["dialog"]["entity_id"], 10);
        assert!(value["dialog"].get("time_entry_id").is_none());
    }

    #[test]
    fn test_key_display() {
        assert_eq!(SessionKey::new("tb", -100, 7).to_string(), "tb:-100:7");
    }

    #[tokio::test]
    async fn test_save_load_clear() {
        let (_, sessions) = sessions();
        let session = Session::new(AddTimeDialog {
            project_id: ProjectId::new(1),
            project_slug: "alpha".into(),
        })
        .awaiting("add", "hours");

        sessions.save(&key(), &session).await.unwrap();
        assert_eq!(sessions.load(&key()).await, Some(session));

        sessions.clear(&key()).await.unwrap();
        assert_eq!(sessions.load(&key()).await, None);
    }

    #[tokio::test]
    async fn test_corrupt_blob_is_absent_and_removed() {
        let (store, sessions) = sessions();
        store
            .put(&key().to_string(), "{\"dialog\":{\"kind\":\"nope\"}}".into(), Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(sessions.load(&key()).await, None);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_file_store_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let session = Session::new(EditDialog::selecting(2, 3)).awaiting("edit", "entry");

        let first = Sessions::new(
            Arc::new(FileSessionStore::new(dir.path())),
            Duration::from_secs(3600),
        );
        first.save(&key(), &session).await.unwrap();

        let second = Sessions::new(
            Arc::new(FileSessionStore::new(dir.path())),
            Duration::from_secs(3600),
        );
        assert_eq!(second.load(&key()).await, Some(session));
    }
}
