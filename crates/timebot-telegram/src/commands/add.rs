//! `/add`: book time on a project.
//!
//! - `/add` shows a project keyboard.
//! - `/add <project>` asks for the hours.
//! - `/add <project> <hours> [description]` books immediately.
//!
//! Typed project names go through fuzzy matching. A lone near miss one edit
//! away is accepted; anything less certain is offered as suggestions and
//! nothing is booked.

use timebot_core::table::html_escape;
use timebot_core::validation::{hours_warning, parse_description, parse_hours};
use timebot_models::{NewTimeEntry, Project, TimeEntry, User};
use tracing::info;

use crate::error::Result;
use crate::registry::{entry, Command, CommandDescriptor, Step};
use crate::reply::{Reply, Transition};
use crate::session::{AddTimeDialog, Dialog, Session};

use super::{lookup_project, project_keyboard, suggestion_reply, ProjectLookup, PROJECT_NOT_FOUND};

pub const DESCRIPTOR: CommandDescriptor =
    CommandDescriptor::new("add", "Log time: /add <project> <hours> [description]")
        .contexts(&["hours"])
        .callbacks(&["project"]);

pub fn command() -> Command {
    Command::new(DESCRIPTOR, entry!(add))
        .on_callback("project", entry!(choose_project))
        .on_context("hours", entry!(enter_hours))
}

async fn add(step: Step<'_>) -> Result<Transition> {
    let user = step.user()?;
    let args = step.args();

    let Some(query) = args.first() else {
        let projects = step.ctx.store.list_available_projects(user.id).await?;
        if projects.is_empty() {
            return Ok(Transition::reply(Reply::new(
                "📭 You have no projects to log time on.",
            )));
        }
        return Ok(Transition::reply(
            Reply::new("⏱ Which project?").with_keyboard(project_keyboard(&projects, "add_project")),
        ));
    };

    let project = match lookup_project(step.ctx, user, query).await? {
        ProjectLookup::Found(project) => project,
        ProjectLookup::Suggest(suggestions) => {
            return Ok(Transition::reply(suggestion_reply(query, &suggestions, "add_project")))
        }
        ProjectLookup::Missing => return Ok(Transition::reply(Reply::new(PROJECT_NOT_FOUND))),
    };

    let Some(hours) = args.get(1) else {
        return Ok(ask_hours(&project, false));
    };

    let hours = match parse_hours(hours) {
        Ok(hours) => hours,
        Err(e) => return Ok(Transition::reply(Reply::new(format!("❌ {e}")))),
    };
    let description = match parse_description(&args[2..].join(" ")) {
        Ok(description) => description,
        Err(e) => return Ok(Transition::reply(Reply::new(format!("❌ {e}")))),
    };

    let created = book(&step, user, &project, hours, description).await?;
    Ok(Transition::reply(Reply::new(booked_text(&created))))
}

async fn choose_project(step: Step<'_>) -> Result<Transition> {
    let user = step.user()?;
    let slug = step.reply_value();
    match step.ctx.store.find_project_for_user(user.id, slug).await? {
        Some(project) => Ok(ask_hours(&project, true)),
        None => Ok(Transition::reply(Reply::new(PROJECT_NOT_FOUND)).with_notice("Project not available")),
    }
}

async fn enter_hours(step: Step<'_>) -> Result<Transition> {
    let user = step.user()?;
    let Some(Session {
        dialog: Dialog::AddTime(dialog),
        ..
    }) = step.session
    else {
        return Ok(super::finished(&step));
    };

    let input = step.reply_value();
    let (hours, rest) = input
        .split_once(char::is_whitespace)
        .map(|(h, rest)| (h, rest.trim()))
        .unwrap_or((input, ""));

    let hours = match parse_hours(hours) {
        Ok(hours) => hours,
        Err(e) => {
            return Ok(Transition::reply(Reply::new(format!(
                "❌ {e}\nSend the hours again, e.g. <code>2.5 code review</code>."
            ))))
        }
    };
    let description = match parse_description(rest) {
        Ok(description) => description,
        Err(e) => return Ok(Transition::reply(Reply::new(format!("❌ {e}")))),
    };

    let Some(project) = step
        .ctx
        .store
        .find_project_for_user(user.id, &dialog.project_slug)
        .await?
        .filter(|p| p.id == dialog.project_id)
    else {
        return Ok(Transition::clear(Reply::new(PROJECT_NOT_FOUND)));
    };

    let created = book(&step, user, &project, hours, description).await?;
    Ok(Transition::clear(Reply::new(booked_text(&created))))
}

fn ask_hours(project: &Project, edit_origin: bool) -> Transition {
    let session = Session::new(AddTimeDialog {
        project_id: project.id,
        project_slug: project.slug.clone(),
    })
    .awaiting(DESCRIPTOR.name, "hours");

    let mut reply = Reply::new(format!(
        "⏱ How many hours on <b>{}</b>?\n\
         Add a description after the hours if you like, e.g. <code>2.5 code review</code>.",
        html_escape(&project.name)
    ));
    if edit_origin {
        reply = reply.editing();
    }
    Transition::save(session, reply)
}

async fn book(
    step: &Step<'_>,
    user: &User,
    project: &Project,
    hours: timebot_models::Hours,
    description: Option<String>,
) -> Result<TimeEntry> {
    let entry = step
        .ctx
        .store
        .create_time_entry(NewTimeEntry {
            user_id: user.id,
            project_id: project.id,
            project_slug: project.slug.clone(),
            date: step.ctx.today(),
            hours,
            description,
        })
        .await?;
    info!(
        user_id = %user.id,
        project = %project.slug,
        entry_id = %entry.id,
        hours = %entry.hours,
        "Time entry created"
    );
    Ok(entry)
}

fn booked_text(entry: &TimeEntry) -> String {
    let mut text = format!(
        "✅ Logged <b>{}h</b> on <code>{}</code> for {} (entry #{}).",
        entry.hours,
        html_escape(&entry.project_slug),
        entry.date.format("%Y-%m-%d"),
        entry.id
    );
    if let Some(description) = &entry.description {
        text.push_str(&format!("\n📝 {}", html_escape(description)));
    }
    if let Some(warning) = hours_warning(entry.hours) {
        text.push_str(&format!("\n{warning}"));
    }
    text
}
