//! Shared fixtures: a seeded store and a client that records every call.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicI32, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use timebot_models::{Hours, Project, Role, TimeEntry, TimeEntryId, User, UserId};
use timebot_persistence::{DbStore, MemorySessionStore};
use timebot_telegram::{
    builtin_registry, BotClient, Context, DeliveryError, DispatchOutcome, DispatchSettings,
    Dispatcher, Keyboard, LinkTokens, MessageRef, Sender, Sessions, Update,
};
use url::Url;

pub const LINK_SECRET: &str = "test-link-secret-0123456789abcdef";

pub const ALICE: UserId = UserId::new(1);
pub const BOB: UserId = UserId::new(2);
pub const DEV: UserId = UserId::new(3);

pub const ALICE_TG: i64 = 1001;
pub const BOB_TG: i64 = 1002;
pub const DEV_TG: i64 = 1003;
pub const STRANGER_TG: i64 = 4004;

pub fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 14).unwrap()
}

/// One recorded Bot API call.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Sent {
        chat_id: i64,
        text: String,
        buttons: Vec<String>,
    },
    Edited {
        message_id: i32,
        text: String,
        buttons: Vec<String>,
    },
    Answered {
        id: String,
        text: Option<String>,
    },
    Commands(Vec<String>),
}

#[derive(Default)]
pub struct RecordingClient {
    calls: Mutex<Vec<Call>>,
    blocked: Mutex<HashSet<i64>>,
    next_message: AtomicI32,
}

impl RecordingClient {
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn block(&self, chat_id: i64) {
        self.blocked.lock().unwrap().insert(chat_id);
    }

    /// Texts of sent and edited messages, in order.
    pub fn texts(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Sent { text, .. } | Call::Edited { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn last_text(&self) -> String {
        self.texts().pop().unwrap_or_default()
    }

    /// Callback data of every button offered so far.
    pub fn buttons(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .flat_map(|c| match c {
                Call::Sent { buttons, .. } | Call::Edited { buttons, .. } => buttons,
                _ => Vec::new(),
            })
            .collect()
    }

    /// The most recently offered button whose data starts with `prefix`.
    pub fn last_button(&self, prefix: &str) -> String {
        self.buttons()
            .into_iter()
            .rev()
            .find(|data| data.starts_with(prefix))
            .unwrap_or_else(|| panic!("no button starting with {prefix:?}"))
    }

    pub fn notices(&self) -> Vec<Option<String>> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Answered { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

fn button_data(keyboard: Option<&Keyboard>) -> Vec<String> {
    keyboard
        .map(|k| k.callback_data().into_iter().map(str::to_string).collect())
        .unwrap_or_default()
}

#[async_trait]
impl BotClient for RecordingClient {
    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<MessageRef, DeliveryError> {
        if self.blocked.lock().unwrap().contains(&chat_id) {
            return Err(DeliveryError::Blocked { chat_id });
        }
        self.record(Call::Sent {
            chat_id,
            text: text.to_string(),
            buttons: button_data(keyboard),
        });
        Ok(MessageRef {
            chat_id,
            message_id: self.next_message.fetch_add(1, Ordering::SeqCst) + 1,
        })
    }

    async fn edit_message_text(
        &self,
        message: MessageRef,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<(), DeliveryError> {
        self.record(Call::Edited {
            message_id: message.message_id,
            text: text.to_string(),
            buttons: button_data(keyboard),
        });
        Ok(())
    }

    async fn answer_callback_query(
        &self,
        callback_id: &str,
        text: Option<&str>,
        _show_alert: bool,
    ) -> Result<(), DeliveryError> {
        self.record(Call::Answered {
            id: callback_id.to_string(),
            text: text.map(str::to_string),
        });
        Ok(())
    }

    async fn set_my_commands(&self, commands: &[(String, String)]) -> Result<(), DeliveryError> {
        self.record(Call::Commands(
            commands.iter().map(|(name, _)| name.clone()).collect(),
        ));
        Ok(())
    }
}

pub fn entry(id: u64, user_id: UserId, project: &Project, day: u32, tenths: u32, description: &str) -> TimeEntry {
    TimeEntry {
        id: TimeEntryId::new(id),
        user_id,
        project_id: project.id,
        project_slug: project.slug.clone(),
        date: NaiveDate::from_ymd_opt(2026, 10, day).unwrap(),
        hours: Hours::from_tenths(tenths),
        description: Some(description.to_string()),
        version: 1,
        created_at: Utc::now(),
        updated_at: None,
    }
}

/// Alice owns `alpha` and tracks on `beta`; Bob owns `beta`; entry 42 is
/// Alice's 8h on `alpha`, entry 43 is Bob's.
pub async fn seeded_store() -> DbStore {
    let store = DbStore::in_memory();
    store
        .insert_user(User::new(ALICE, "Alice").with_username("alice").with_telegram_id(ALICE_TG))
        .await
        .unwrap();
    store
        .insert_user(User::new(BOB, "Bob").with_username("bob").with_telegram_id(BOB_TG))
        .await
        .unwrap();
    store
        .insert_user(
            User::new(DEV, "Dana")
                .with_username("dana")
                .with_telegram_id(DEV_TG)
                .as_developer(),
        )
        .await
        .unwrap();

    let alpha = Project::new(10u64, "alpha", "Alpha", ALICE);
    let beta = Project::new(11u64, "beta", "Beta", BOB).with_member(ALICE, Role::Member);
    store.insert_project(alpha.clone()).await.unwrap();
    store.insert_project(beta.clone()).await.unwrap();

    store
        .insert_time_entry(entry(42, ALICE, &alpha, 13, 80, "planning"))
        .await
        .unwrap();
    store
        .insert_time_entry(entry(43, BOB, &beta, 13, 30, "review"))
        .await
        .unwrap();
    store
}

pub struct Harness {
    pub store: Arc<DbStore>,
    pub client: Arc<RecordingClient>,
    pub dispatcher: Arc<Dispatcher>,
    next_update: AtomicU32,
    next_callback: AtomicU32,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_settings(DispatchSettings {
            bot_id: "testbot".to_string(),
            ..DispatchSettings::default()
        })
        .await
    }

    pub async fn with_settings(settings: DispatchSettings) -> Self {
        let store = Arc::new(seeded_store().await);
        let client = Arc::new(RecordingClient::default());
        let links = Arc::new(
            LinkTokens::new(
                LINK_SECRET,
                Duration::from_secs(120),
                Url::parse("https://time.example.com/telegram/link").unwrap(),
            )
            .unwrap(),
        );
        let registry = Arc::new(builtin_registry().unwrap());
        let ctx = Context::new(store.clone(), settings, links, registry).with_today(today());
        let sessions = Sessions::new(Arc::new(MemorySessionStore::new()), Duration::from_secs(3600));
        let dispatcher = Arc::new(Dispatcher::new(Arc::new(ctx), sessions, client.clone()));
        Self {
            store,
            client,
            dispatcher,
            next_update: AtomicU32::new(1),
            next_callback: AtomicU32::new(1),
        }
    }

    fn update_id(&self) -> u32 {
        self.next_update.fetch_add(1, Ordering::SeqCst)
    }

    /// Sends `text` from `telegram_id` in their private chat.
    pub async fn say(&self, telegram_id: i64, text: &str) -> DispatchOutcome {
        let update = Update::text(telegram_id, Sender::new(telegram_id, "Tester"), text)
            .with_update_id(self.update_id());
        self.dispatcher.dispatch(update).await
    }

    /// Presses a button carrying `data` on message 1 of the private chat.
    pub async fn press(&self, telegram_id: i64, data: &str) -> DispatchOutcome {
        let callback_id = format!("cb{}", self.next_callback.fetch_add(1, Ordering::SeqCst));
        let update = Update::callback(
            telegram_id,
            Sender::new(telegram_id, "Tester"),
            &callback_id,
            data,
            Some(MessageRef {
                chat_id: telegram_id,
                message_id: 1,
            }),
        )
        .with_update_id(self.update_id());
        self.dispatcher.dispatch(update).await
    }

    pub async fn entry(&self, id: u64) -> TimeEntry {
        self.store.time_entry(TimeEntryId::new(id)).await.unwrap()
    }

    pub async fn session(&self, telegram_id: i64) -> Option<timebot_telegram::Session> {
        let key = self.dispatcher.session_key(telegram_id, telegram_id);
        self.dispatcher.sessions().load(&key).await
    }
}
