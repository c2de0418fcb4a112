//! `/start`: greeting, or the link prompt for unknown senders.

use timebot_core::table::html_escape;

use crate::error::Result;
use crate::registry::{entry, Command, CommandDescriptor, Principal, Step};
use crate::reply::{Reply, Transition};

use super::link_prompt;

pub const DESCRIPTOR: CommandDescriptor =
    CommandDescriptor::new("start", "Start the bot").hidden().public();

pub fn command() -> Command {
    Command::new(DESCRIPTOR, entry!(start))
}

async fn start(step: Step<'_>) -> Result<Transition> {
    match step.principal {
        Principal::User(user) => Ok(Transition::reply(Reply::new(format!(
            "👋 Welcome back, <b>{}</b>!\n\nSend /help to see what I can do.",
            html_escape(&user.name)
        )))),
        Principal::Anonymous { telegram_id } => {
            let greeting = Reply::new(format!(
                "👋 Hi {}! I track the hours you spend on projects.",
                html_escape(&step.sender.first_name)
            ));
            Ok(Transition::reply(greeting).and_reply(link_prompt(
                step.ctx,
                *telegram_id,
                step.chat_id,
            )?))
        }
    }
}
