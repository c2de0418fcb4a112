//! `/adduser [project]`: add a member to a project the user manages.
//!
//! Project, then username, then role, then confirmation. Adding someone who
//! is already a member is reported, not treated as an error.

use timebot_core::table::html_escape;
use timebot_core::validation::parse_username;
use timebot_models::{Project, Role};
use timebot_persistence::MembershipOutcome;
use tracing::info;

use crate::error::Result;
use crate::registry::{entry, Command, CommandDescriptor, Step};
use crate::reply::{Button, Keyboard, Reply, Transition};
use crate::session::{AddUserDialog, AddUserStep, Dialog, Session};

use super::{confirm_keyboard, confirmation, finished, project_keyboard, Confirmation, PROJECT_NOT_FOUND};

pub const DESCRIPTOR: CommandDescriptor =
    CommandDescriptor::new("adduser", "Add a member to a project you manage")
        .contexts(&["username", "role", "confirm"])
        .callbacks(&["project", "role", "confirm"]);

const NAME: &str = DESCRIPTOR.name;

pub fn command() -> Command {
    Command::new(DESCRIPTOR, entry!(adduser))
        .on_callback("project", entry!(choose_project))
        .on_context("username", entry!(input_username))
        .on_context("role", entry!(select_role))
        .on_callback("role", entry!(select_role))
        .on_context("confirm", entry!(confirm))
        .on_callback("confirm", entry!(confirm))
}

async fn adduser(step: Step<'_>) -> Result<Transition> {
    let user = step.user()?;

    if let Some(slug) = step.args().first() {
        return Ok(match step.ctx.store.find_managed_project(user.id, slug).await? {
            Some(project) => ask_username(&project, false),
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
        Reply::new("👤 Add a member to which project?")
            .with_keyboard(project_keyboard(&projects, "adduser_project")),
    ))
}

async fn choose_project(step: Step<'_>) -> Result<Transition> {
    let user = step.user()?;
    match step
        .ctx
        .store
        .find_managed_project(user.id, step.reply_value())
        .await?
    {
        Some(project) => Ok(ask_username(&project, true)),
        None => Ok(Transition::reply(Reply::new(PROJECT_NOT_FOUND))),
    }
}

fn ask_username(project: &Project, edit_origin: bool) -> Transition {
    let session = Session::new(AddUserDialog {
        step: AddUserStep::InputUsername,
        project_id: project.id,
        project_slug: project.slug.clone(),
        username: None,
        member_id: None,
        role: None,
    })
    .awaiting(NAME, "username");

    let mut reply = Reply::new(format!(
        "👤 Send the username of the person to add to <code>{}</code>.",
        html_escape(&project.slug)
    ));
    if edit_origin {
        reply = reply.editing();
    }
    Transition::save(session, reply)
}

fn dialog_at<'a>(step: &Step<'a>, expected: AddUserStep) -> Option<(&'a Session, &'a AddUserDialog)> {
    match step.session.map(|s| (s, &s.dialog)) {
        Some((session, Dialog::AddUser(dialog))) if dialog.step == expected => Some((session, dialog)),
        _ => None,
    }
}

async fn input_username(step: Step<'_>) -> Result<Transition> {
    let Some((session, dialog)) = dialog_at(&step, AddUserStep::InputUsername) else {
        return Ok(finished(&step));
    };

    let username = match parse_username(step.reply_value()) {
        Ok(username) => username,
        Err(e) => return Ok(Transition::reply(Reply::new(format!("❌ {e}")))),
    };
    let Some(member) = step.ctx.store.find_user_by_username(&username).await? else {
        return Ok(Transition::reply(Reply::new(format!(
            "❌ No user <code>@{}</code>. Check the spelling and send it again.",
            html_escape(&username)
        ))));
    };

    let next = AddUserDialog {
        step: AddUserStep::SelectRole,
        username: Some(member.handle().to_string()),
        member_id: Some(member.id),
        ..dialog.clone()
    };
    let keyboard = Keyboard::new().row(
        Role::ASSIGNABLE
            .iter()
            .map(|r| Button::callback(r.as_str(), format!("{NAME}_role:{r}")))
            .collect(),
    );
    Ok(Transition::save(
        session.advance(next).awaiting(NAME, "role"),
        Reply::new(format!(
            "Which role should <b>{}</b> get?",
            html_escape(member.handle())
        ))
        .with_keyboard(keyboard),
    ))
}

async fn select_role(step: Step<'_>) -> Result<Transition> {
    let Some((session, dialog)) = dialog_at(&step, AddUserStep::SelectRole) else {
        return Ok(finished(&step));
    };

    let role = match step.reply_value().parse::<Role>() {
        Ok(role) if Role::ASSIGNABLE.contains(&role) => role,
        _ => {
            return Ok(Transition::reply(Reply::new(
                "Pick <b>member</b>, <b>manager</b> or <b>viewer</b>.",
            )))
        }
    };

    let who = dialog.username.clone().unwrap_or_default();
    let next = AddUserDialog {
        step: AddUserStep::Confirm,
        role: Some(role),
        ..dialog.clone()
    };
    let next = session.advance(next).confirming().awaiting(NAME, "confirm");
    let keyboard = confirm_keyboard(NAME, &next);
    Ok(Transition::save(
        next,
        Reply::new(format!(
            "Add <b>{}</b> to <code>{}</code> as <b>{}</b>?",
            html_escape(&who),
            html_escape(&dialog.project_slug),
            role
        ))
        .with_keyboard(keyboard)
        .editing(),
    ))
}

async fn confirm(step: Step<'_>) -> Result<Transition> {
    let user = step.user()?;
    let Some((session, dialog)) = dialog_at(&step, AddUserStep::Confirm) else {
        return Ok(finished(&step));
    };
    let (Some(member_id), Some(role)) = (dialog.member_id, dialog.role) else {
        return Ok(finished(&step));
    };
    let who = html_escape(dialog.username.as_deref().unwrap_or("user"));
    let slug = html_escape(&dialog.project_slug);

    match confirmation(&step, session) {
        Some(Confirmation::Cancel) => Ok(Transition::clear(
            Reply::new("✖️ Nobody was added.").editing(),
        )
        .with_notice("Cancelled")),
        Some(Confirmation::Save) => {
            let outcome = step
                .ctx
                .store
                .add_project_member(user.id, dialog.project_id, member_id, role)
                .await?;
            let reply = match outcome {
                MembershipOutcome::Added => {
                    info!(project = %dialog.project_slug, member_id = %member_id, role = %role, "Member added");
                    Reply::new(format!("✅ <b>{who}</b> joined <code>{slug}</code> as {role}."))
                }
                MembershipOutcome::AlreadyMember => {
                    Reply::new(format!("ℹ️ <b>{who}</b> is already a member of <code>{slug}</code>."))
                }
                MembershipOutcome::Missing => Reply::new(PROJECT_NOT_FOUND),
            };
            Ok(Transition::clear(reply.editing()).with_notice("Saved"))
        }
        None if step.is_callback() => Ok(finished(&step)),
        None => Ok(Transition::reply(Reply::new("Reply <b>save</b> or <b>cancel</b>."))),
    }
}
