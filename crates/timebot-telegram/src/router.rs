//! Callback-button routing.
//!
//! Button data has the shape `<command>[_<subaction>]:<data>`. The command
//! part selects a registered command, the subaction one of its callback
//! entry points. Prefixes in [`LEGACY_PREFIXES`] are never routed; they
//! fall through to whatever dialog the session is waiting on.

use std::sync::Arc;

use tracing::{debug, error};

use crate::registry::{Command, CommandRegistry, Input, Step};
use crate::reply::Transition;

/// Generic buttons answered by the active dialog rather than by a command.
pub const LEGACY_PREFIXES: &[&str] = &["confirm", "page"];

/// A parsed callback payload. Borrows from the raw button data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallbackPayload<'a> {
    pub raw: &'a str,
    /// Routing key: everything before the first `:`.
    pub prefix: &'a str,
    /// The prefix up to its first `_`.
    pub command: &'a str,
    pub subaction: Option<&'a str>,
    /// Everything after the first `:`; empty when there is no `:`.
    pub data: &'a str,
}

impl<'a> CallbackPayload<'a> {
    pub fn parse(raw: &'a str) -> Self {
        let (prefix, data) = raw.split_once(':').unwrap_or((raw, ""));
        let (command, subaction) = match prefix.split_once('_') {
            Some((command, sub)) => (command, Some(sub).filter(|s| !s.is_empty())),
            None => (prefix, None),
        };
        Self {
            raw,
            prefix,
            command,
            subaction,
            data,
        }
    }

    pub fn is_legacy(&self) -> bool {
        LEGACY_PREFIXES.contains(&self.prefix)
    }
}

/// Result of routing a button press.
#[derive(Debug)]
pub enum RouteOutcome {
    Handled(Transition),
    /// No route, a legacy prefix, or the handler failed.
    Unhandled,
}

impl RouteOutcome {
    pub fn is_handled(&self) -> bool {
        matches!(self, RouteOutcome::Handled(_))
    }
}

/// Maps callback prefixes onto command callback entry points.
#[derive(Debug, Clone)]
pub struct CallbackRouter {
    registry: Arc<CommandRegistry>,
}

impl CallbackRouter {
    pub fn new(registry: Arc<CommandRegistry>) -> Self {
        Self { registry }
    }

    /// The command a payload would be routed to, if any.
    pub fn target(&self, payload: &CallbackPayload<'_>) -> Option<&Command> {
        if payload.is_legacy() {
            return None;
        }
        let command = self.registry.resolve(payload.command)?;
        let sub = payload.subaction?;
        command.callback(sub).map(|_| command)
    }

    /// Runs the matching callback entry point. Never fails: handler errors
    /// are logged and reported as [`RouteOutcome::Unhandled`].
    pub async fn route(&self, step: Step<'_>) -> RouteOutcome {
        let Input::Callback(payload) = step.input else {
            return RouteOutcome::Unhandled;
        };
        if payload.is_legacy() {
            debug!(prefix = payload.prefix, "Legacy callback prefix, falling through");
            return RouteOutcome::Unhandled;
        }
        let Some(command) = self.registry.resolve(payload.command) else {
            debug!(prefix = payload.prefix, "No command for callback prefix");
            return RouteOutcome::Unhandled;
        };
        let Some(entry) = payload.subaction.and_then(|sub| command.callback(sub)) else {
            debug!(
                command = command.name(),
                prefix = payload.prefix,
                "Command has no matching callback entry point"
            );
            return RouteOutcome::Unhandled;
        };

        match entry(step).await {
            Ok(transition) => RouteOutcome::Handled(transition),
            Err(e) => {
                error!(
                    chat_id = step.chat_id,
                    callback = payload.raw,
                    error = %e,
                    "Callback handler failed"
                );
                RouteOutcome::Unhandled
            }
        }
    }
}
