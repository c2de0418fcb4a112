//! `/help`: the command list.

use std::fmt::Write;

use crate::error::Result;
use crate::registry::{entry, Command, CommandDescriptor, Step};
use crate::reply::{Reply, Transition};

pub const DESCRIPTOR: CommandDescriptor =
    CommandDescriptor::new("help", "Show available commands").public();

pub fn command() -> Command {
    Command::new(DESCRIPTOR, entry!(help))
}

async fn help(step: Step<'_>) -> Result<Transition> {
    let registry = &step.ctx.registry;
    let mut text = String::from("<b>Timebot commands</b>\n\n");
    for cmd in registry.public_commands() {
        let _ = writeln!(text, "/{} - {}", cmd.name, cmd.description);
    }

    if step.principal.is_developer() {
        text.push_str("\n<b>Developer</b>\n");
        for cmd in registry.developer_commands() {
            let _ = writeln!(text, "/{} - {}", cmd.name, cmd.description);
        }
    }

    if step.principal.user().is_none() {
        text.push_str("\nLink your account with /start to use them.");
    }

    Ok(Transition::reply(Reply::new(text.trim_end())))
}
