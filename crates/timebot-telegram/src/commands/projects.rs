//! `/projects`: where the user can book time.

use std::fmt::Write;

use timebot_core::table::html_escape;

use crate::error::Result;
use crate::registry::{entry, Command, CommandDescriptor, Step};
use crate::reply::{Reply, Transition};

pub const DESCRIPTOR: CommandDescriptor =
    CommandDescriptor::new("projects", "List your projects");

pub fn command() -> Command {
    Command::new(DESCRIPTOR, entry!(projects))
}

async fn projects(step: Step<'_>) -> Result<Transition> {
    let user = step.user()?;
    let projects = step.ctx.store.list_available_projects(user.id).await?;
    if projects.is_empty() {
        return Ok(Transition::reply(Reply::new(
            "📭 You are not a member of any project yet.",
        )));
    }

    let mut text = String::from("📁 <b>Your projects</b>\n");
    for project in &projects {
        let role = project
            .role_of(user.id)
            .map(|r| r.as_str())
            .unwrap_or("member");
        let _ = write!(
            text,
            "\n• <code>{}</code> {} <i>({})</i>",
            html_escape(&project.slug),
            html_escape(&project.name),
            role
        );
    }
    Ok(Transition::reply(Reply::new(text)))
}
