//! Built-in chat commands and their dialogs.

pub mod add;
pub mod adduser;
pub mod cancel;
pub mod edit;
pub mod help;
pub mod projects;
pub mod rename;
pub mod report;
pub mod start;
pub mod stats;

use timebot_core::fuzzy;
use timebot_core::table::html_escape;
use timebot_models::{Project, User};
use tracing::debug;

use crate::error::Result;
use crate::registry::{CommandRegistry, Context, Input, Step};
use crate::reply::{Button, Keyboard, Reply, Transition};
use crate::session::Session;

/// Shown when a button belongs to a dialog that is no longer active.
pub const FINISHED_NOTICE: &str = "This dialog has already finished.";

/// Same text whether the entity is missing or out of the user's scope.
pub const ENTRY_NOT_FOUND: &str = "❌ Time entry not found.";
pub const PROJECT_NOT_FOUND: &str = "❌ Project not found.";

/// Builds the registry with every built-in command.
pub fn builtin_registry() -> Result<CommandRegistry> {
    let mut registry = CommandRegistry::new();
    registry.register(start::command())?;
    registry.register(help::command())?;
    registry.register(projects::command())?;
    registry.register(add::command())?;
    registry.register(edit::command())?;
    registry.register(report::command())?;
    registry.register(rename::command())?;
    registry.register(adduser::command())?;
    registry.register(cancel::command())?;
    registry.register(stats::command())?;
    Ok(registry)
}

/// "Link your account" message with a fresh one-time token.
pub fn link_prompt(ctx: &Context, telegram_id: i64, chat_id: i64) -> Result<Reply> {
    let token = ctx.links.issue(telegram_id, chat_id)?;
    let url = ctx.links.link_url(&token);
    let text = format!(
        "🔗 <b>Please link your account first.</b>\n\n\
         Open <a href=\"{}\">this link</a> while signed in to Timebot. \
         It is valid for {} seconds and works once.",
        html_escape(url.as_str()),
        ctx.links.ttl().as_secs()
    );
    Ok(Reply::new(text).with_keyboard(Keyboard::new().row(vec![Button::url("🔗 Link account", url)])))
}

/// Answer to a confirmation prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    Save,
    Cancel,
}

pub fn parse_confirmation(input: &str) -> Option<Confirmation> {
    match input.trim().to_lowercase().as_str() {
        "save" | "yes" | "y" => Some(Confirmation::Save),
        "cancel" | "no" | "n" => Some(Confirmation::Cancel),
        _ => None,
    }
}

/// Reads an answer to the confirmation prompt of `session`.
///
/// Buttons drawn by [`confirm_keyboard`] carry the prompt's token as
/// `<answer>.<token>`; a button from an earlier prompt answers nothing.
/// Typed replies and the generic `confirm:` buttons apply to the current
/// prompt.
pub fn confirmation(step: &Step<'_>, session: &Session) -> Option<Confirmation> {
    let Input::Callback(payload) = step.input else {
        return parse_confirmation(step.reply_value());
    };

    let (answer, token) = match payload.data.split_once('.') {
        Some((answer, token)) => (answer, Some(token)),
        None if payload.is_legacy() => (payload.data, None),
        None => {
            debug!(callback = payload.raw, "Confirmation button without a prompt token");
            return None;
        }
    };
    if token.is_some() && token != session.confirm_token.as_deref() {
        debug!(callback = payload.raw, "Confirmation button from an earlier prompt");
        return None;
    }
    parse_confirmation(answer)
}

/// Save/Cancel buttons for `<command>_confirm`, bound to the prompt
/// `session` is showing.
pub fn confirm_keyboard(command: &str, session: &Session) -> Keyboard {
    let token = session.confirm_token.as_deref().unwrap_or_default();
    Keyboard::new().row(vec![
        Button::callback("✅ Save", format!("{command}_confirm:save.{token}")),
        Button::callback("✖️ Cancel", format!("{command}_confirm:cancel.{token}")),
    ])
}

/// One button per project, sending `<prefix>:<slug>`.
pub fn project_keyboard(projects: &[Project], prefix: &str) -> Keyboard {
    Keyboard::column(
        projects
            .iter()
            .map(|p| Button::callback(p.name.clone(), format!("{prefix}:{}", p.slug))),
    )
}

/// Outcome of resolving a typed project reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectLookup {
    Found(Project),
    /// Near misses, nearest first. Nothing was chosen.
    Suggest(Vec<Project>),
    Missing,
}

/// Resolves `query` among the projects `user` can book on: exact slug,
/// then a single confident fuzzy match, else suggestions.
pub async fn lookup_project(ctx: &Context, user: &User, query: &str) -> Result<ProjectLookup> {
    if let Some(project) = ctx.store.find_project_for_user(user.id, query).await? {
        return Ok(ProjectLookup::Found(project));
    }

    let projects = ctx.store.list_available_projects(user.id).await?;
    let matched = fuzzy::find(query, &projects, |p| p.slug.as_str());
    if let Some(project) = matched.confident() {
        return Ok(ProjectLookup::Found(project.clone()));
    }
    let suggestions: Vec<Project> = matched.suggestions().cloned().collect();
    Ok(if suggestions.is_empty() {
        ProjectLookup::Missing
    } else {
        ProjectLookup::Suggest(suggestions)
    })
}

/// "Did you mean" reply with one button per suggestion.
pub fn suggestion_reply(query: &str, suggestions: &[Project], prefix: &str) -> Reply {
    let names: Vec<String> = suggestions
        .iter()
        .map(|p| format!("<code>{}</code>", html_escape(&p.slug)))
        .collect();
    Reply::new(format!(
        "🤔 No project <code>{}</code>. Did you mean: {}?",
        html_escape(query),
        names.join(", ")
    ))
    .with_keyboard(project_keyboard(suggestions, prefix))
}

/// Reply for a stale button, leaving everything as it is.
pub fn finished(step: &Step<'_>) -> Transition {
    if step.is_callback() {
        Transition::none().with_notice(FINISHED_NOTICE)
    } else {
        Transition::reply(Reply::new(FINISHED_NOTICE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use timebot_models::ProjectId;
    use timebot_persistence::DbStore;

    use crate::config::DispatchSettings;
    use crate::link::LinkTokens;
    use crate::registry::Principal;
    use crate::router::CallbackPayload;
    use crate::session::{RenameDialog, RenameStep};
    use crate::update::Sender;

    #[test]
    fn test_builtin_registry_is_consistent() {
        let registry = builtin_registry().unwrap();
        let public: Vec<_> = registry.public_commands().iter().map(|d| d.name).collect();
        assert_eq!(
            public,
            vec!["help", "projects", "add", "edit", "report", "rename", "adduser", "cancel"]
        );
        let dev: Vec<_> = registry.developer_commands().iter().map(|d| d.name).collect();
        assert_eq!(dev, vec!["stats"]);
        assert!(registry.resolve("start").is_some());
    }

    #[test]
    fn test_parse_confirmation() {
        assert_eq!(parse_confirmation(" Save "), Some(Confirmation::Save));
        assert_eq!(parse_confirmation("y"), Some(Confirmation::Save));
        assert_eq!(parse_confirmation("NO"), Some(Confirmation::Cancel));
        assert_eq!(parse_confirmation("maybe"), None);
    }

    #[test]
    fn test_confirm_keyboard_payloads() {
        let mut session = Session::new(RenameDialog {
            step: RenameStep::Confirm,
            entity_id: ProjectId::new(10),
            current_name: "Alpha".into(),
            new_name: Some("Beta".into()),
        });
        session.confirm_token = Some("abc123".into());
        assert_eq!(
            confirm_keyboard("rename", &session).callback_data(),
            vec!["rename_confirm:save.abc123", "rename_confirm:cancel.abc123"]
        );
    }

    #[test]
    fn test_confirmation_checks_prompt_token() {
        let ctx = Context::new(
            Arc::new(DbStore::in_memory()),
            DispatchSettings::default(),
            Arc::new(
                LinkTokens::new(
                    "0123456789abcdef0123456789abcdef",
                    Duration::from_secs(120),
                    DispatchSettings::default().link_base_url,
                )
                .unwrap(),
            ),
            Arc::new(builtin_registry().unwrap()),
        );
        let principal = Principal::Anonymous { telegram_id: 1 };
        let sender = Sender::new(1, "Alice");
        let mut session = Session::new(RenameDialog {
            step: RenameStep::Confirm,
            entity_id: ProjectId::new(10),
            current_name: "Alpha".into(),
            new_name: Some("Beta".into()),
        });
        session.confirm_token = Some("current".into());

        let answer = |input: Input<'static>| {
            let step = Step {
                ctx: &ctx,
                principal: &principal,
                sender: &sender,
                chat_id: 1,
                session: Some(&session),
                input,
            };
            confirmation(&step, &session)
        };
        let press = |raw: &'static str| answer(Input::Callback(CallbackPayload::parse(raw)));

        assert_eq!(press("rename_confirm:save.current"), Some(Confirmation::Save));
        assert_eq!(press("rename_confirm:cancel.current"), Some(Confirmation::Cancel));
        assert_eq!(press("rename_confirm:save.earlier"), None);
        assert_eq!(press("rename_confirm:save"), None);
        assert_eq!(press("confirm:save"), Some(Confirmation::Save));
        assert_eq!(press("confirm:save.earlier"), None);
        assert_eq!(answer(Input::Text("yes")), Some(Confirmation::Save));
    }
}
