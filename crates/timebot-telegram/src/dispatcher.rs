//! Per-update processing.
//!
//! [`Dispatcher::dispatch`] is the single place where failures are caught.
//! Everything below it returns `Result`; here errors are reported, the user
//! gets a generic apology, and the transport still acknowledges the update.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::client::BotClient;
use crate::commands::link_prompt;
use crate::error::{BotError, DeliveryError, Result};
use crate::registry::{Context, Input, Principal, Step};
use crate::reply::{Reply, ReplyMode, SessionChange, Transition};
use crate::router::{CallbackPayload, CallbackRouter, RouteOutcome};
use crate::session::{Session, SessionKey, Sessions};
use crate::update::{MessageRef, Sender, Update, UpdateKind};

/// Sent when processing fails for any unexpected reason.
pub const FAILURE_MESSAGE: &str = "⚠️ Something went wrong. Please try again in a moment.";
pub const NOT_UNDERSTOOD: &str = "🤔 I didn't understand that. Try /help.";
pub const ACCESS_DENIED: &str = "⛔ Access denied.";
pub const EXPIRED_BUTTON: &str = "This button has expired.";

/// How many recent update ids are remembered for duplicate detection.
const RECENT_UPDATES: usize = 1024;

/// Upper bound on one update, in multiples of the external call timeout.
const UPDATE_TIMEOUT_FACTOR: u32 = 3;

/// Where the dispatcher sends failures it caught.
pub trait ErrorReporter: Send + Sync {
    fn report(&self, error: &BotError, context: &ErrorContext<'_>);
}

/// Who and what was being processed when an error happened.
#[derive(Debug, Clone, Copy)]
pub struct ErrorContext<'a> {
    pub chat_id: i64,
    pub telegram_id: i64,
    pub update: &'static str,
    pub detail: Option<&'a str>,
}

/// Logs reported errors.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn report(&self, error: &BotError, context: &ErrorContext<'_>) {
        error!(
            chat_id = context.chat_id,
            telegram_id = context.telegram_id,
            update = context.update,
            detail = context.detail.unwrap_or(""),
            error = %error,
            "Update processing failed"
        );
    }
}

/// What happened to an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Processed,
    /// Same `update_id` seen recently; skipped.
    Duplicate,
    /// An error was caught and reported.
    Failed,
}

/// Remembers the last [`RECENT_UPDATES`] update ids.
#[derive(Debug, Default)]
struct RecentUpdates {
    order: VecDeque<u32>,
    seen: HashSet<u32>,
}

impl RecentUpdates {
    /// Returns false if `id` was already recorded.
    fn insert(&mut self, id: u32) -> bool {
        if !self.seen.insert(id) {
            return false;
        }
        self.order.push_back(id);
        if self.order.len() > RECENT_UPDATES {
            if let Some(old) = self.order.pop_front() {
                self.seen.remove(&old);
            }
        }
        true
    }
}

/// One async lock per session key, dropped when nobody holds it.
#[derive(Debug, Default)]
struct KeyLocks {
    locks: StdMutex<HashMap<SessionKey, Arc<Mutex<()>>>>,
}

impl KeyLocks {
    fn get(&self, key: &SessionKey) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(key.clone()).or_default().clone()
    }

    fn release(&self, key: &SessionKey) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if locks.get(key).is_some_and(|l| Arc::strong_count(l) <= 1) {
            locks.remove(key);
        }
    }

    fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Routes updates to commands, callbacks and dialogs.
pub struct Dispatcher {
    ctx: Arc<Context>,
    sessions: Sessions,
    client: Arc<dyn BotClient>,
    router: CallbackRouter,
    reporter: Arc<dyn ErrorReporter>,
    locks: KeyLocks,
    recent: StdMutex<RecentUpdates>,
}

impl Dispatcher {
    pub fn new(ctx: Arc<Context>, sessions: Sessions, client: Arc<dyn BotClient>) -> Self {
        let router = CallbackRouter::new(ctx.registry.clone());
        Self {
            ctx,
            sessions,
            client,
            router,
            reporter: Arc::new(TracingReporter),
            locks: KeyLocks::default(),
            recent: StdMutex::new(RecentUpdates::default()),
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn context(&self) -> &Arc<Context> {
        &self.ctx
    }

    pub fn client(&self) -> &Arc<dyn BotClient> {
        &self.client
    }

    pub fn sessions(&self) -> &Sessions {
        &self.sessions
    }

    pub fn session_key(&self, chat_id: i64, telegram_id: i64) -> SessionKey {
        SessionKey::new(self.ctx.settings.bot_id.clone(), chat_id, telegram_id)
    }

    /// Processes one update. Never fails; errors are reported and answered
    /// with [`FAILURE_MESSAGE`].
    pub async fn dispatch(&self, update: Update) -> DispatchOutcome {
        if let Some(id) = update.update_id {
            let fresh = self
                .recent
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(id);
            if !fresh {
                debug!(update_id = id, "Dropping re-delivered update");
                return DispatchOutcome::Duplicate;
            }
        }

        let key = self.session_key(update.chat_id, update.from.telegram_id);
        let lock = self.locks.get(&key);
        let outcome = {
            let _guard = lock.lock().await;
            let limit = self.ctx.settings.external_timeout * UPDATE_TIMEOUT_FACTOR;
            let result = match tokio::time::timeout(limit, self.process(&key, &update)).await {
                Ok(result) => result,
                Err(_) => Err(BotError::Timeout {
                    operation: "update processing",
                    after: limit,
                }),
            };
            match result {
                Ok(()) => DispatchOutcome::Processed,
                Err(e) => {
                    self.fail(&update, &e).await;
                    DispatchOutcome::Failed
                }
            }
        };
        drop(lock);
        self.locks.release(&key);
        outcome
    }

    async fn process(&self, key: &SessionKey, update: &Update) -> Result<()> {
        let principal = self.authenticate(&update.from).await?;
        let session = self.sessions.load(key).await;
        debug!(
            chat_id = update.chat_id,
            kind = update.label(),
            linked = principal.user().is_some(),
            session = session.as_ref().map(|s| s.dialog.kind()).unwrap_or("none"),
            "Dispatching update"
        );

        match &update.kind {
            UpdateKind::Command { name, args } => {
                let transition = self
                    .on_command(&principal, &update.from, update.chat_id, session.as_ref(), name, args)
                    .await?;
                self.apply(key, update.chat_id, None, transition).await?;
            }
            UpdateKind::CallbackQuery {
                id,
                data,
                message_ref,
            } => {
                let transition = self
                    .on_callback(&principal, &update.from, update.chat_id, session.as_ref(), data)
                    .await?;
                let notice = transition.notice.clone();
                self.apply(key, update.chat_id, *message_ref, transition).await?;
                if let Err(e) = self
                    .client
                    .answer_callback_query(id, notice.as_deref(), false)
                    .await
                {
                    warn!(chat_id = update.chat_id, error = %e, "Failed to answer callback query");
                }
            }
            UpdateKind::PlainMessage { text } => {
                let step = Step {
                    ctx: &self.ctx,
                    principal: &principal,
                    sender: &update.from,
                    chat_id: update.chat_id,
                    session: session.as_ref(),
                    input: Input::Text(text.as_str()),
                };
                let transition = match self.resume(step).await? {
                    Some(transition) => transition,
                    None => Transition::reply(Reply::new(NOT_UNDERSTOOD)),
                };
                self.apply(key, update.chat_id, None, transition).await?;
            }
        }
        Ok(())
    }

    async fn authenticate(&self, from: &Sender) -> Result<Principal> {
        let limit = self.ctx.settings.external_timeout;
        let lookup = self.ctx.store.find_user_by_telegram_id(from.telegram_id);
        let user = tokio::time::timeout(limit, lookup)
            .await
            .map_err(|_| BotError::Timeout {
                operation: "user lookup",
                after: limit,
            })??;
        Ok(match user {
            Some(user) => Principal::User(user),
            None => Principal::Anonymous {
                telegram_id: from.telegram_id,
            },
        })
    }

    async fn on_command(
        &self,
        principal: &Principal,
        sender: &Sender,
        chat_id: i64,
        session: Option<&Session>,
        name: &str,
        args: &[String],
    ) -> Result<Transition> {
        let Some(command) = self.ctx.registry.resolve(name) else {
            debug!(command = name, "Unknown command");
            return Ok(Transition::reply(Reply::new(format!(
                "❓ Unknown command /{name}. Try /help."
            ))));
        };
        let descriptor = &command.descriptor;

        if descriptor.requires_auth && principal.user().is_none() {
            info!(chat_id, command = name, "Unlinked sender, sending link prompt");
            return Ok(Transition::reply(link_prompt(&self.ctx, sender.telegram_id, chat_id)?));
        }
        if descriptor.developer_only && !principal.is_developer() {
            warn!(chat_id, command = name, telegram_id = sender.telegram_id, "Developer command refused");
            return Ok(Transition::reply(Reply::new(ACCESS_DENIED)));
        }

        let step = Step {
            ctx: &self.ctx,
            principal,
            sender,
            chat_id,
            session,
            input: Input::Command { args },
        };
        let mut transition = (command.call())(step).await?;

        // A new command ends whatever dialog was active.
        if transition.session == SessionChange::Keep && session.is_some() {
            transition.session = SessionChange::Clear;
        }
        Ok(transition)
    }

    async fn on_callback(
        &self,
        principal: &Principal,
        sender: &Sender,
        chat_id: i64,
        session: Option<&Session>,
        data: &str,
    ) -> Result<Transition> {
        let payload = CallbackPayload::parse(data);

        if let Some(command) = self.router.target(&payload) {
            let descriptor = &command.descriptor;
            if descriptor.requires_auth && principal.user().is_none() {
                return Ok(Transition::reply(link_prompt(&self.ctx, sender.telegram_id, chat_id)?)
                    .with_notice("Please link your account first."));
            }
            if descriptor.developer_only && !principal.is_developer() {
                return Ok(Transition::none().with_notice(ACCESS_DENIED));
            }
        }

        let step = Step {
            ctx: &self.ctx,
            principal,
            sender,
            chat_id,
            session,
            input: Input::Callback(payload),
        };
        if let RouteOutcome::Handled(transition) = self.router.route(step).await {
            return Ok(transition);
        }

        match self.resume(step).await? {
            Some(transition) => Ok(transition),
            None => {
                debug!(chat_id, callback = data, "Unroutable callback");
                Ok(Transition::none().with_notice(EXPIRED_BUTTON))
            }
        }
    }

    /// Hands `step` to the context entry point the session is waiting on.
    async fn resume(&self, step: Step<'_>) -> Result<Option<Transition>> {
        let Some(awaiting) = step.session.and_then(|s| s.awaiting.as_ref()) else {
            return Ok(None);
        };
        let Some(command) = self.ctx.registry.resolve(&awaiting.command) else {
            warn!(command = %awaiting.command, "Session awaits input for an unknown command");
            return Ok(None);
        };
        let Some(entry) = command.context(&awaiting.entry) else {
            warn!(
                command = %awaiting.command,
                entry = %awaiting.entry,
                "Session awaits input for an unknown entry point"
            );
            return Ok(None);
        };
        debug!(command = %awaiting.command, entry = %awaiting.entry, "Resuming dialog");
        entry(step).await.map(Some)
    }

    async fn apply(
        &self,
        key: &SessionKey,
        chat_id: i64,
        origin: Option<MessageRef>,
        transition: Transition,
    ) -> Result<()> {
        match &transition.session {
            SessionChange::Keep => {}
            SessionChange::Save(session) => {
                debug!(key = %key, kind = session.dialog.kind(), "Saving session");
                self.sessions.save(key, session).await?;
            }
            SessionChange::Clear => {
                debug!(key = %key, "Clearing session");
                self.sessions.clear(key).await?;
            }
        }

        for reply in &transition.replies {
            match self.deliver(chat_id, origin, reply).await {
                Ok(()) => {}
                Err(e @ DeliveryError::Blocked { .. }) => {
                    warn!(chat_id, "Chat unreachable, dropping remaining replies");
                    self.reporter.report(
                        &BotError::Delivery(e),
                        &ErrorContext {
                            chat_id,
                            telegram_id: key.user_id,
                            update: "reply",
                            detail: None,
                        },
                    );
                    break;
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    async fn deliver(
        &self,
        chat_id: i64,
        origin: Option<MessageRef>,
        reply: &Reply,
    ) -> std::result::Result<(), DeliveryError> {
        match (reply.mode, origin) {
            (ReplyMode::EditOrigin, Some(message)) => {
                self.client
                    .edit_message_text(message, &reply.text, reply.keyboard.as_ref())
                    .await
            }
            _ => self
                .client
                .send_message(chat_id, &reply.text, reply.keyboard.as_ref())
                .await
                .map(|_| ()),
        }
    }

    async fn fail(&self, update: &Update, error: &BotError) {
        let detail = match &update.kind {
            UpdateKind::Command { name, .. } => Some(name.as_str()),
            UpdateKind::CallbackQuery { data, .. } => Some(data.as_str()),
            UpdateKind::PlainMessage { .. } => None,
        };
        self.reporter.report(
            error,
            &ErrorContext {
                chat_id: update.chat_id,
                telegram_id: update.from.telegram_id,
                update: update.label(),
                detail,
            },
        );

        if let UpdateKind::CallbackQuery { id, .. } = &update.kind {
            if let Err(e) = self.client.answer_callback_query(id, None, false).await {
                debug!(chat_id = update.chat_id, error = %e, "Failed to answer callback after error");
            }
        }
        if matches!(error, BotError::Delivery(e) if e.is_blocked()) {
            return;
        }
        if let Err(e) = self
            .client
            .send_message(update.chat_id, FAILURE_MESSAGE, None)
            .await
        {
            warn!(chat_id = update.chat_id, error = %e, "Failed to send failure notice");
        }
    }

    /// Number of session keys currently being processed.
    pub fn active_keys(&self) -> usize {
        self.locks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recent_updates_window() {
        let mut recent = RecentUpdates::default();
        assert!(recent.insert(1));
        assert!(!recent.insert(1));
        for id in 2..=(RECENT_UPDATES as u32 + 1) {
            assert!(recent.insert(id));
        }
        // 1 fell out of the window
        assert!(recent.insert(1));
    }

    #[test]
    fn test_key_locks_are_released() {
        let locks = KeyLocks::default();
        let key = SessionKey::new("tb", 1, 1);
        let lock = locks.get(&key);
        let again = locks.get(&key);
        assert!(Arc::ptr_eq(&lock, &again));
        drop(again);
        locks.release(&key);
        assert_eq!(locks.len(), 1);
        drop(lock);
        locks.release(&key);
        assert_eq!(locks.len(), 0);
    }
}
