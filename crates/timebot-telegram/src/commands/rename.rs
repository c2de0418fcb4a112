//! `/rename [project]`: rename a project the user manages.

use timebot_core::table::html_escape;
use timebot_core::validation::parse_project_name;
use timebot_models::{Project, User};
use timebot_persistence::UpdateOutcome;
use tracing::{info, warn};

use crate::error::Result;
use crate::registry::{entry, Command, CommandDescriptor, Step};
use crate::reply::{Reply, Transition};
use crate::session::{Dialog, RenameDialog, RenameStep, Session};

use super::{confirm_keyboard, confirmation, finished, project_keyboard, Confirmation, PROJECT_NOT_FOUND};

pub const DESCRIPTOR: CommandDescriptor = CommandDescriptor::new("rename", "Rename a project you manage")
    .contexts(&["name", "confirm"])
    .callbacks(&["project", "confirm"]);

const NAME: &str = DESCRIPTOR.name;

pub fn command() -> Command {
    Command::new(DESCRIPTOR, entry!(rename))
        .on_callback("project", entry!(choose_project))
        .on_context("name", entry!(input_name))
        .on_context("confirm", entry!(confirm))
        .on_callback("confirm", entry!(confirm))
}

async fn rename(step: Step<'_>) -> Result<Transition> {
    let user = step.user()?;

    if let Some(slug) = step.args().first() {
        return Ok(match step.ctx.store.find_managed_project(user.id, slug).await? {
            Some(project) => ask_name(&project, false),
            None => Transition::reply(Reply::new(PROJECT_NOT_FOUND)),
        });
    }

    let projects = step.ctx.store.list_managed_projects(user.id).await?;
    if projects.is_empty() {
        return Ok(Transition::reply(Reply::new(
            "📭 You don't manage any projects.",
        )));
    }
    Ok(Transition::reply(
        Reply::new("✏️ Which project do you want to rename?")
            .with_keyboard(project_keyboard(&projects, "rename_project")),
    ))
}

async fn choose_project(step: Step<'_>) -> Result<Transition> {
    let user: &User = step.user()?;
    match step
        .ctx
        .store
        .find_managed_project(user.id, step.reply_value())
        .await?
    {
        Some(project) => Ok(ask_name(&project, true)),
        None => Ok(Transition::reply(Reply::new(PROJECT_NOT_FOUND))),
    }
}

fn ask_name(project: &Project, edit_origin: bool) -> Transition {
    let session = Session::new(RenameDialog {
        step: RenameStep::InputName,
        entity_id: project.id,
        current_name: project.name.clone(),
        new_name: None,
    })
    .awaiting(NAME, "name");

    let mut reply = Reply::new(format!(
        "✏️ Send the new name for <b>{}</b>.",
        html_escape(&project.name)
    ));
    if edit_origin {
        reply = reply.editing();
    }
    Transition::save(session, reply)
}

fn dialog_at<'a>(step: &Step<'a>, expected: RenameStep) -> Option<(&'a Session, &'a RenameDialog)> {
    match step.session.map(|s| (s, &s.dialog)) {
        Some((session, Dialog::Rename(dialog))) if dialog.step == expected => Some((session, dialog)),
        _ => None,
    }
}

async fn input_name(step: Step<'_>) -> Result<Transition> {
    let Some((session, dialog)) = dialog_at(&step, RenameStep::InputName) else {
        return Ok(finished(&step));
    };

    let name = match parse_project_name(step.reply_value()) {
        Ok(name) => name,
        Err(e) => return Ok(Transition::reply(Reply::new(format!("❌ {e}")))),
    };
    if name == dialog.current_name {
        return Ok(Transition::reply(Reply::new(
            "That is already the project's name. Send a different one or /cancel.",
        )));
    }

    let text = format!(
        "Rename <b>{}</b> to <b>{}</b>?",
        html_escape(&dialog.current_name),
        html_escape(&name)
    );
    let next = RenameDialog {
        step: RenameStep::Confirm,
        new_name: Some(name),
        ..dialog.clone()
    };
    let next = session.advance(next).confirming().awaiting(NAME, "confirm");
    let keyboard = confirm_keyboard(NAME, &next);
    Ok(Transition::save(next, Reply::new(text).with_keyboard(keyboard)))
}

async fn confirm(step: Step<'_>) -> Result<Transition> {
    let user = step.user()?;
    let Some((session, dialog)) = dialog_at(&step, RenameStep::Confirm) else {
        return Ok(finished(&step));
    };
    let Some(new_name) = dialog.new_name.as_deref() else {
        return Ok(finished(&step));
    };

    match confirmation(&step, session) {
        Some(Confirmation::Cancel) => Ok(Transition::clear(
            Reply::new("✖️ Rename cancelled.").editing(),
        )
        .with_notice("Cancelled")),
        Some(Confirmation::Save) => {
            let outcome = step
                .ctx
                .store
                .rename_project(user.id, dialog.entity_id, &dialog.current_name, new_name)
                .await?;
            let reply = match outcome {
                UpdateOutcome::Applied(project) => {
                    info!(project_id = %project.id, slug = %project.slug, "Project renamed");
                    Reply::new(format!(
                        "✅ <code>{}</code> is now called <b>{}</b>.",
                        html_escape(&project.slug),
                        html_escape(&project.name)
                    ))
                }
                UpdateOutcome::Stale => {
                    warn!(project_id = %dialog.entity_id, "Rename rejected, name changed meanwhile");
                    Reply::new("⚠️ The project was renamed by someone else meanwhile. Nothing was saved.")
                }
                UpdateOutcome::Missing => Reply::new(PROJECT_NOT_FOUND),
            };
            Ok(Transition::clear(reply.editing()).with_notice("Saved"))
        }
        None if step.is_callback() => Ok(finished(&step)),
        None => Ok(Transition::reply(Reply::new("Reply <b>save</b> or <b>cancel</b>."))),
    }
}
