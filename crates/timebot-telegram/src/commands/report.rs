//! `/report [period]`: hours per project over a period.

use std::collections::BTreeMap;
use std::fmt::Write;

use timebot_core::period;
use timebot_core::table::html_escape;
use timebot_models::Hours;

use crate::error::Result;
use crate::registry::{entry, Command, CommandDescriptor, Step};
use crate::reply::{Reply, Transition};

pub const DESCRIPTOR: CommandDescriptor = CommandDescriptor::new(
    "report",
    "Hours per project: /report [week|month|last_week|YYYY-MM|...]",
);

pub fn command() -> Command {
    Command::new(DESCRIPTOR, entry!(report))
}

async fn report(step: Step<'_>) -> Result<Transition> {
    let user = step.user()?;
    let token = step.args().join(" ");

    let range = match period::parse(&token, step.ctx.today()) {
        Ok(range) => range,
        Err(e) => {
            return Ok(Transition::reply(Reply::new(format!(
                "❌ {}",
                html_escape(&e.to_string())
            ))))
        }
    };

    let entries = step.ctx.store.time_entries_between(user.id, range).await?;
    if entries.is_empty() {
        return Ok(Transition::reply(Reply::new(format!(
            "📊 No time logged for {range}."
        ))));
    }

    let mut per_project: BTreeMap<&str, Hours> = BTreeMap::new();
    for entry in &entries {
        let slot = per_project.entry(entry.project_slug.as_str()).or_default();
        *slot = *slot + entry.hours;
    }
    let total: Hours = entries.iter().map(|e| e.hours).sum();

    let width = per_project
        .keys()
        .map(|k| k.chars().count())
        .chain(std::iter::once("Total".len()))
        .max()
        .unwrap_or(5);
    let mut table = String::new();
    for (slug, hours) in &per_project {
        let _ = writeln!(table, "{:<width$}  {:>6}", slug, hours.to_string());
    }
    let _ = writeln!(table, "{}", "-".repeat(width + 8));
    let _ = write!(table, "{:<width$}  {:>6}", "Total", total.to_string());

    Ok(Transition::reply(Reply::new(format!(
        "📊 <b>Report</b> {range}\n<pre>{}</pre>",
        html_escape(&table)
    ))))
}
