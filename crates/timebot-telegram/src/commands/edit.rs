//! `/edit`: change one field of a time entry.
//!
//! ```text
//! SelectEntry --id--> SelectField --project--> InputProject -----+
//!                          |      --hours----> InputHours -------+--> Confirm --save--> commit
//!                          |      --description-> InputDescription+        \--cancel--> discard
//!                          +--cancel--> discard
//! ```
//!
//! Entry lookups are always scoped to what the user may edit, so an entry
//! that exists but belongs to someone else reads exactly like a missing one.
//! The commit is a compare-and-set on the entry version captured when the
//! entry was selected.

use timebot_core::pagination::{self, Page};
use timebot_core::table::{html_escape, render_entries};
use timebot_core::validation::{hours_warning, parse_description, parse_hours};
use timebot_models::{EditField, FieldValue, TimeEntry, TimeEntryId, User};
use timebot_persistence::UpdateOutcome;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::registry::{entry, Command, CommandDescriptor, Context, Input, Step};
use crate::reply::{Button, Keyboard, Reply, Transition};
use crate::session::{Dialog, EditDialog, EditStep, Session};

use super::{confirm_keyboard, confirmation, finished, Confirmation, ENTRY_NOT_FOUND, PROJECT_NOT_FOUND};

pub const DESCRIPTOR: CommandDescriptor = CommandDescriptor::new("edit", "Edit a time entry")
    .contexts(&["entry", "field", "project", "hours", "description", "confirm"])
    .callbacks(&["page", "field", "project", "confirm"]);

const NAME: &str = DESCRIPTOR.name;

pub fn command() -> Command {
    Command::new(DESCRIPTOR, entry!(edit))
        .on_context("entry", entry!(select_entry))
        .on_context("field", entry!(select_field))
        .on_context("project", entry!(input_project))
        .on_context("hours", entry!(input_hours))
        .on_context("description", entry!(input_description))
        .on_context("confirm", entry!(confirm))
        .on_callback("page", entry!(turn_page))
        .on_callback("field", entry!(select_field))
        .on_callback("project", entry!(input_project))
        .on_callback("confirm", entry!(confirm))
}

async fn edit(step: Step<'_>) -> Result<Transition> {
    let user = step.user()?;

    if let Some(raw) = step.args().first() {
        let Ok(id) = raw.parse::<TimeEntryId>() else {
            return Ok(Transition::reply(Reply::new(
                "❌ Entry IDs are numbers, e.g. <code>/edit 42</code>.",
            )));
        };
        if let Some(entry) = step.ctx.store.find_owned_time_entry(user.id, id).await? {
            return Ok(show_fields(Session::new(EditDialog::selected(entry.id, entry.version)), &entry));
        }
        let picker = entry_page(step.ctx, user, 1).await?;
        return Ok(match picker {
            Some((dialog, reply)) => Transition::save(
                Session::new(dialog).awaiting(NAME, "entry"),
                Reply::new(ENTRY_NOT_FOUND),
            )
            .and_reply(reply),
            None => Transition::reply(Reply::new(ENTRY_NOT_FOUND)),
        });
    }

    match entry_page(step.ctx, user, 1).await? {
        Some((dialog, reply)) => Ok(Transition::save(
            Session::new(dialog).awaiting(NAME, "entry"),
            reply,
        )),
        None => Ok(Transition::reply(Reply::new(
            "📭 You have no time entries yet. Log some with /add.",
        ))),
    }
}

/// The Edit payload of the stored session, if the dialog is at `expected`.
fn dialog_at<'a>(step: &Step<'a>, expected: EditStep) -> Option<(&'a Session, &'a EditDialog)> {
    match step.session {
        Some(session) => match &session.dialog {
            Dialog::Edit(dialog) if dialog.step == expected => Some((session, dialog)),
            _ => None,
        },
        None => None,
    }
}

async fn select_entry(step: Step<'_>) -> Result<Transition> {
    let user = step.user()?;
    let Some((session, dialog)) = dialog_at(&step, EditStep::SelectEntry) else {
        return Ok(finished(&step));
    };

    // Generic `page:<n>` buttons land here through the session.
    if let Input::Callback(payload) = step.input {
        return page_to(&step, user, session, dialog, payload.data).await;
    }

    let Ok(id) = step.reply_value().parse::<TimeEntryId>() else {
        return Ok(Transition::reply(Reply::new(
            "❌ Send the numeric ID of the entry, e.g. <code>42</code>.",
        )));
    };
    match step.ctx.store.find_owned_time_entry(user.id, id).await? {
        Some(entry) => {
            debug!(entry_id = %entry.id, "Edit entry selected");
            let next = session.advance(EditDialog::selected(entry.id, entry.version));
            Ok(show_fields(next, &entry))
        }
        None => Ok(Transition::reply(Reply::new(ENTRY_NOT_FOUND))),
    }
}

async fn turn_page(step: Step<'_>) -> Result<Transition> {
    let user = step.user()?;
    let Some((session, dialog)) = dialog_at(&step, EditStep::SelectEntry) else {
        return Ok(finished(&step));
    };
    page_to(&step, user, session, dialog, step.reply_value()).await
}

async fn page_to(
    step: &Step<'_>,
    user: &User,
    session: &Session,
    dialog: &EditDialog,
    raw: &str,
) -> Result<Transition> {
    let page = raw.trim().parse::<usize>().unwrap_or(0);
    // Validate against the page count shown to the user, not a fresh count.
    if !pagination::valid_page(page, dialog.total_pages) {
        debug!(page, total_pages = dialog.total_pages, "Rejected page outside rendered range");
        return Ok(Transition::none().with_notice("That page is not available."));
    }

    match entry_page(step.ctx, user, page).await? {
        Some((next, reply)) => Ok(Transition::save(
            session.advance(next).awaiting(NAME, "entry"),
            reply.editing(),
        )),
        None => Ok(Transition::clear(Reply::new("📭 You have no time entries left.").editing())),
    }
}

async fn select_field(step: Step<'_>) -> Result<Transition> {
    let user = step.user()?;
    let Some((session, dialog)) = dialog_at(&step, EditStep::SelectField) else {
        return Ok(finished(&step));
    };
    let Some(entry_id) = dialog.time_entry_id else {
        return Ok(Transition::clear(Reply::new(ENTRY_NOT_FOUND)));
    };

    let value = step.reply_value().to_lowercase();
    if value == "cancel" {
        return Ok(Transition::clear(Reply::new("✖️ Edit cancelled.").editing()).with_notice("Cancelled"));
    }
    let Ok(field) = value.parse::<EditField>() else {
        return Ok(Transition::reply(Reply::new(
            "Pick <b>project</b>, <b>hours</b>, <b>description</b> or <b>cancel</b>.",
        )));
    };

    let mut next = dialog.clone();
    next.field = Some(field);
    let (step_name, prompt, keyboard) = match field {
        EditField::Project => {
            let projects = step.ctx.store.list_available_projects(user.id).await?;
            (
                EditStep::InputProject,
                "📁 Pick the new project:".to_string(),
                super::project_keyboard(&projects, "edit_project"),
            )
        }
        EditField::Hours => (
            EditStep::InputHours,
            "⏱ Send the new hours, e.g. <code>7.5</code>.".to_string(),
            Keyboard::new(),
        ),
        EditField::Description => (
            EditStep::InputDescription,
            "📝 Send the new description, or <code>-</code> to clear it.".to_string(),
            Keyboard::new(),
        ),
    };
    next.step = step_name;

    debug!(entry_id = %entry_id, field = %field, "Edit field selected");
    Ok(Transition::save(
        session.advance(next).awaiting(NAME, field.as_str()),
        Reply::new(prompt).with_keyboard(keyboard).editing(),
    ))
}

async fn input_project(step: Step<'_>) -> Result<Transition> {
    let user = step.user()?;
    let Some((session, dialog)) = dialog_at(&step, EditStep::InputProject) else {
        return Ok(finished(&step));
    };

    let slug = step.reply_value();
    let Some(project) = step.ctx.store.find_project_for_user(user.id, slug).await? else {
        let projects = step.ctx.store.list_available_projects(user.id).await?;
        return Ok(Transition::reply(
            Reply::new(format!("{PROJECT_NOT_FOUND} Pick one of your projects:"))
                .with_keyboard(super::project_keyboard(&projects, "edit_project")),
        ));
    };

    stage(
        session,
        dialog,
        FieldValue::Project {
            id: project.id,
            slug: project.slug,
        },
        None,
    )
}

async fn input_hours(step: Step<'_>) -> Result<Transition> {
    let Some((session, dialog)) = dialog_at(&step, EditStep::InputHours) else {
        return Ok(finished(&step));
    };
    match parse_hours(step.reply_value()) {
        Ok(hours) => stage(session, dialog, FieldValue::Hours(hours), hours_warning(hours)),
        Err(e) => Ok(Transition::reply(Reply::new(format!(
            "❌ {e}\nSend the hours again, e.g. <code>7.5</code>."
        )))),
    }
}

async fn input_description(step: Step<'_>) -> Result<Transition> {
    let Some((session, dialog)) = dialog_at(&step, EditStep::InputDescription) else {
        return Ok(finished(&step));
    };
    match parse_description(step.reply_value()) {
        Ok(description) => stage(session, dialog, FieldValue::Description(description), None),
        Err(e) => Ok(Transition::reply(Reply::new(format!("❌ {e}")))),
    }
}

async fn confirm(step: Step<'_>) -> Result<Transition> {
    let user = step.user()?;
    let Some((session, dialog)) = dialog_at(&step, EditStep::Confirm) else {
        warn!(chat_id = step.chat_id, "Edit confirmation without a pending edit, ignoring");
        return Ok(finished(&step));
    };
    let (Some(entry_id), Some(value)) = (dialog.time_entry_id, dialog.pending.as_ref()) else {
        return Ok(Transition::clear(Reply::new(ENTRY_NOT_FOUND)));
    };

    match confirmation(&step, session) {
        Some(Confirmation::Cancel) => Ok(Transition::clear(
            Reply::new("✖️ Edit cancelled. Nothing was changed.").editing(),
        )
        .with_notice("Cancelled")),
        Some(Confirmation::Save) => {
            let outcome = step
                .ctx
                .store
                .update_time_entry_field(user.id, entry_id, dialog.entry_version, value)
                .await?;
            let reply = match outcome {
                UpdateOutcome::Applied(entry) => {
                    info!(entry_id = %entry.id, field = %value.field(), version = entry.version, "Time entry updated");
                    let mut text = format!(
                        "✅ Entry #{} updated: {} is now <b>{}</b>.",
                        entry.id,
                        value.field(),
                        html_escape(&value.describe())
                    );
                    if let FieldValue::Hours(hours) = value {
                        if let Some(warning) = hours_warning(*hours) {
                            text.push_str(&format!("\n{warning}"));
                        }
                    }
                    Reply::new(text)
                }
                UpdateOutcome::Stale => {
                    warn!(entry_id = %entry_id, "Edit rejected, entry changed since selection");
                    Reply::new(format!(
                        "⚠️ Entry #{entry_id} changed since you opened it. Nothing was saved; run /edit again."
                    ))
                }
                UpdateOutcome::Missing => Reply::new(ENTRY_NOT_FOUND),
            };
            Ok(Transition::clear(reply.editing()).with_notice("Saved"))
        }
        None if step.is_callback() => Ok(finished(&step)),
        None => Ok(Transition::reply(Reply::new(
            "Reply <b>save</b> or <b>cancel</b>.",
        ))),
    }
}

/// Stores `value` and asks for confirmation.
fn stage(
    session: &Session,
    dialog: &EditDialog,
    value: FieldValue,
    warning: Option<&str>,
) -> Result<Transition> {
    let entry_id = dialog.time_entry_id.map(|id| id.to_string()).unwrap_or_default();
    let mut text = format!(
        "Change <b>{}</b> of entry #{} to <b>{}</b>?",
        value.field(),
        entry_id,
        html_escape(&value.describe())
    );
    if let Some(warning) = warning {
        text.push_str(&format!("\n{warning}"));
    }

    let mut next = dialog.clone();
    next.step = EditStep::Confirm;
    next.pending = Some(value);
    let next = session.advance(next).confirming().awaiting(NAME, "confirm");
    let keyboard = confirm_keyboard(NAME, &next);
    Ok(Transition::save(next, Reply::new(text).with_keyboard(keyboard)))
}

fn show_fields(session: Session, entry: &TimeEntry) -> Transition {
    let text = format!(
        "✏️ <b>Entry #{}</b>\n<pre>{}</pre>\nWhat do you want to change?",
        entry.id,
        html_escape(&render_entries(std::slice::from_ref(entry)))
    );
    let keyboard = Keyboard::new()
        .row(
            EditField::ALL
                .iter()
                .map(|f| Button::callback(capitalize(f.as_str()), format!("{NAME}_field:{f}")))
                .collect(),
        )
        .row(vec![Button::callback("✖️ Cancel", format!("{NAME}_field:cancel"))]);

    Transition::save(
        session.awaiting(NAME, "field"),
        Reply::new(text).with_keyboard(keyboard),
    )
}

/// Renders `page` of the user's entries. The returned dialog carries the
/// page count that later page buttons are validated against.
async fn entry_page(ctx: &Context, user: &User, page: usize) -> Result<Option<(EditDialog, Reply)>> {
    let per_page = ctx.settings.page_size;
    let (mut entries, total) = ctx
        .store
        .list_time_entries(user.id, pagination::offset(page, per_page), per_page)
        .await?;
    let total_pages = pagination::total_pages(total, per_page);
    if total_pages == 0 {
        return Ok(None);
    }

    // Entries were removed since the buttons were drawn.
    let page = page.min(total_pages);
    if entries.is_empty() {
        entries = ctx
            .store
            .list_time_entries(user.id, pagination::offset(page, per_page), per_page)
            .await?
            .0;
    }

    let text = format!(
        "✏️ <b>Your time entries</b> (page {page}/{total_pages})\n<pre>{}</pre>\nSend the ID of the entry to edit.",
        html_escape(&render_entries(&entries))
    );

    let mut nav = Vec::new();
    if let Some(cursor) = Page::new(page, total, per_page) {
        if cursor.has_prev() {
            nav.push(Button::callback("◀️ Prev", format!("{NAME}_page:{}", page - 1)));
        }
        if cursor.has_next() {
            nav.push(Button::callback("Next ▶️", format!("{NAME}_page:{}", page + 1)));
        }
    }

    Ok(Some((
        EditDialog::selecting(page, total_pages),
        Reply::new(text).with_keyboard(Keyboard::new().row(nav)),
    )))
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
