//! `/stats`: operator view of the running bot.

use chrono::Utc;

use crate::error::Result;
use crate::registry::{entry, Command, CommandDescriptor, Step};
use crate::reply::{Reply, Transition};

pub const DESCRIPTOR: CommandDescriptor =
    CommandDescriptor::new("stats", "Bot and store statistics").developer_only();

pub fn command() -> Command {
    Command::new(DESCRIPTOR, entry!(stats))
}

async fn stats(step: Step<'_>) -> Result<Transition> {
    let ctx = step.ctx;
    let store = ctx.store.stats().await?;
    let uptime = Utc::now() - ctx.started_at;

    let text = format!(
        "📈 <b>Timebot</b> v{}\n\n\
         Uptime: {}h {}m\n\
         Users: {} ({} linked)\n\
         Projects: {}\n\
         Time entries: {}\n\
         Commands: {} ({} public, {} developer)",
        env!("CARGO_PKG_VERSION"),
        uptime.num_hours(),
        uptime.num_minutes() % 60,
        store.users,
        store.linked_users,
        store.projects,
        store.time_entries,
        ctx.registry.len(),
        ctx.registry.public_commands().len(),
        ctx.registry.developer_commands().len(),
    );
    Ok(Transition::reply(Reply::new(text)))
}
