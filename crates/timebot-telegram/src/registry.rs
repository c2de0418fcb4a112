//! Command table and the inputs handed to command handlers.
//!
//! The registry is assembled once at startup from explicit [`Command`]
//! values and never mutated afterwards. Each command has a main entry point
//! plus named sub-entry points: *context* entries receive free-text replies
//! while a dialog awaits input, *callback* entries receive button presses.
//! Declared names must match the implemented ones exactly; a mismatch fails
//! registration.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Local, NaiveDate, Utc};
use futures::future::BoxFuture;
use timebot_models::User;
use timebot_persistence::DataStore;

use crate::config::DispatchSettings;
use crate::error::{BotError, Result};
use crate::link::LinkTokens;
use crate::reply::Transition;
use crate::router::CallbackPayload;
use crate::session::Session;
use crate::update::Sender;

/// A handler entry point.
pub type EntryFn = for<'a> fn(Step<'a>) -> BoxFuture<'a, Result<Transition>>;

/// Wraps an `async fn(Step<'_>) -> Result<Transition>` as an [`EntryFn`].
macro_rules! entry {
    ($handler:path) => {{
        fn boxed(
            step: $crate::registry::Step<'_>,
        ) -> ::futures::future::BoxFuture<'_, $crate::error::Result<$crate::reply::Transition>> {
            ::std::boxed::Box::pin($handler(step))
        }
        boxed as $crate::registry::EntryFn
    }};
}
pub(crate) use entry;

/// Static metadata for one command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandDescriptor {
    /// Unique, lowercase, without the leading slash.
    pub name: &'static str,
    /// One line for the command menu and `/help`.
    pub description: &'static str,
    pub developer_only: bool,
    /// Left out of the command menu and `/help`.
    pub hidden: bool,
    /// Anonymous senders get a link prompt instead of the handler.
    pub requires_auth: bool,
    pub context_entry_points: &'static [&'static str],
    pub callback_entry_points: &'static [&'static str],
}

impl CommandDescriptor {
    pub const fn new(name: &'static str, description: &'static str) -> Self {
        Self {
            name,
            description,
            developer_only: false,
            hidden: false,
            requires_auth: true,
            context_entry_points: &[],
            callback_entry_points: &[],
        }
    }

    pub const fn developer_only(mut self) -> Self {
        self.developer_only = true;
        self
    }

    pub const fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    pub const fn public(mut self) -> Self {
        self.requires_auth = false;
        self
    }

    pub const fn contexts(mut self, names: &'static [&'static str]) -> Self {
        self.context_entry_points = names;
        self
    }

    pub const fn callbacks(mut self, names: &'static [&'static str]) -> Self {
        self.callback_entry_points = names;
        self
    }
}

/// A command implementation: its descriptor and entry points.
#[derive(Clone)]
pub struct Command {
    pub descriptor: CommandDescriptor,
    call: EntryFn,
    contexts: BTreeMap<&'static str, EntryFn>,
    callbacks: BTreeMap<&'static str, EntryFn>,
}

impl Command {
    pub fn new(descriptor: CommandDescriptor, call: EntryFn) -> Self {
        Self {
            descriptor,
            call,
            contexts: BTreeMap::new(),
            callbacks: BTreeMap::new(),
        }
    }

    /// Implements a free-text entry point.
    pub fn on_context(mut self, name: &'static str, entry: EntryFn) -> Self {
        self.contexts.insert(name, entry);
        self
    }

    /// Implements a button entry point.
    pub fn on_callback(mut self, name: &'static str, entry: EntryFn) -> Self {
        self.callbacks.insert(name, entry);
        self
    }

    pub fn name(&self) -> &'static str {
        self.descriptor.name
    }

    pub fn call(&self) -> EntryFn {
        self.call
    }

    pub fn context(&self, name: &str) -> Option<EntryFn> {
        self.contexts.get(name).copied()
    }

    pub fn callback(&self, name: &str) -> Option<EntryFn> {
        self.callbacks.get(name).copied()
    }

    fn check_entry_points(&self) -> Result<()> {
        check_declared(
            self.name(),
            "context",
            self.descriptor.context_entry_points,
            self.contexts.keys().copied(),
        )?;
        check_declared(
            self.name(),
            "callback",
            self.descriptor.callback_entry_points,
            self.callbacks.keys().copied(),
        )
    }
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Command")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

fn check_declared(
    command: &str,
    kind: &str,
    declared: &[&'static str],
    implemented: impl Iterator<Item = &'static str>,
) -> Result<()> {
    let declared: BTreeSet<&str> = declared.iter().copied().collect();
    let implemented: BTreeSet<&str> = implemented.collect();

    if let Some(missing) = declared.difference(&implemented).next() {
        return Err(BotError::Registry(format!(
            "/{command} declares {kind} entry point '{missing}' but does not implement it"
        )));
    }
    if let Some(extra) = implemented.difference(&declared).next() {
        return Err(BotError::Registry(format!(
            "/{command} implements undeclared {kind} entry point '{extra}'"
        )));
    }
    Ok(())
}

/// All commands, in registration order.
#[derive(Debug, Default)]
pub struct CommandRegistry {
    commands: Vec<Command>,
    index: HashMap<&'static str, usize>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a command. Duplicate names and entry-point mismatches are errors.
    pub fn register(&mut self, command: Command) -> Result<()> {
        let name = command.name();
        if name.is_empty() || name.chars().any(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')) {
            return Err(BotError::Registry(format!("invalid command name '{name}'")));
        }
        if self.index.contains_key(name) {
            return Err(BotError::Registry(format!("/{name} is registered twice")));
        }
        command.check_entry_points()?;

        self.index.insert(name, self.commands.len());
        self.commands.push(command);
        Ok(())
    }

    pub fn resolve(&self, name: &str) -> Option<&Command> {
        self.index.get(name).map(|&i| &self.commands[i])
    }

    pub fn commands(&self) -> impl Iterator<Item = &Command> {
        self.commands.iter()
    }

    /// Menu commands: neither hidden nor developer-only.
    pub fn public_commands(&self) -> Vec<&CommandDescriptor> {
        self.commands
            .iter()
            .map(|c| &c.descriptor)
            .filter(|d| !d.developer_only && !d.hidden)
            .collect()
    }

    pub fn developer_commands(&self) -> Vec<&CommandDescriptor> {
        self.commands
            .iter()
            .map(|c| &c.descriptor)
            .filter(|d| d.developer_only)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

/// Who sent the update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Principal {
    User(User),
    /// A Telegram user without a linked account.
    Anonymous { telegram_id: i64 },
}

impl Principal {
    pub fn user(&self) -> Option<&User> {
        match self {
            Principal::User(user) => Some(user),
            Principal::Anonymous { .. } => None,
        }
    }

    pub fn is_developer(&self) -> bool {
        self.user().is_some_and(|u| u.developer)
    }
}

/// Shared services every handler can reach.
pub struct Context {
    pub store: Arc<dyn DataStore>,
    pub settings: DispatchSettings,
    pub links: Arc<LinkTokens>,
    pub registry: Arc<CommandRegistry>,
    pub started_at: DateTime<Utc>,
    /// Fixed "today" for reproducible runs; local date otherwise.
    pub today: Option<NaiveDate>,
}

impl Context {
    pub fn new(
        store: Arc<dyn DataStore>,
        settings: DispatchSettings,
        links: Arc<LinkTokens>,
        registry: Arc<CommandRegistry>,
    ) -> Self {
        Self {
            store,
            settings,
            links,
            registry,
            started_at: Utc::now(),
            today: None,
        }
    }

    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    pub fn today(&self) -> NaiveDate {
        self.today.unwrap_or_else(|| Local::now().date_naive())
    }
}

/// What a handler was invoked with.
#[derive(Debug, Clone, Copy)]
pub enum Input<'a> {
    Command { args: &'a [String] },
    Text(&'a str),
    Callback(CallbackPayload<'a>),
}

/// One handler invocation.
#[derive(Clone, Copy)]
pub struct Step<'a> {
    pub ctx: &'a Context,
    pub principal: &'a Principal,
    pub sender: &'a Sender,
    pub chat_id: i64,
    /// The stored session before this update.
    pub session: Option<&'a Session>,
    pub input: Input<'a>,
}

impl<'a> Step<'a> {
    /// The linked account, or [`BotError::NotLinked`].
    pub fn user(&self) -> Result<&'a User> {
        self.principal.user().ok_or(BotError::NotLinked)
    }

    /// Command arguments; empty for other inputs.
    pub fn args(&self) -> &'a [String] {
        match self.input {
            Input::Command { args } => args,
            _ => &[],
        }
    }

    /// The user's answer: typed text or the pressed button's data.
    pub fn reply_value(&self) -> &'a str {
        match self.input {
            Input::Command { args } => args.first().map(String::as_str).unwrap_or(""),
            Input::Text(text) => text.trim(),
            Input::Callback(payload) => payload.data,
        }
    }

    pub fn is_callback(&self) -> bool {
        matches!(self.input, Input::Callback(_))
    }
}
