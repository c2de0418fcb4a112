//! `/cancel`: abandon the active dialog.

use crate::error::Result;
use crate::registry::{entry, Command, CommandDescriptor, Step};
use crate::reply::{Reply, Transition};

pub const DESCRIPTOR: CommandDescriptor =
    CommandDescriptor::new("cancel", "Cancel the current dialog").public();

pub fn command() -> Command {
    Command::new(DESCRIPTOR, entry!(cancel))
}

async fn cancel(step: Step<'_>) -> Result<Transition> {
    match step.session {
        Some(session) => Ok(Transition::clear(Reply::new(format!(
            "✖️ Cancelled the {} dialog.",
            session.dialog.kind().replace('_', " ")
        )))),
        None => Ok(Transition::reply(Reply::new("Nothing to cancel."))),
    }
}
