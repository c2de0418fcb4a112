//! End-to-end conversations through the dispatcher with an in-memory store.

mod common;

use common::*;
use timebot_models::{Hours, ProjectId, Role};
use timebot_telegram::commands::{ENTRY_NOT_FOUND, FINISHED_NOTICE};
use timebot_telegram::dispatcher::{ACCESS_DENIED, EXPIRED_BUTTON, NOT_UNDERSTOOD};
use timebot_telegram::{DispatchOutcome, DispatchSettings, Dialog, Sender, Update};

#[tokio::test]
async fn test_edit_hours_happy_path() {
    let h = Harness::new().await;
    let before = h.entry(42).await;

    h.say(ALICE_TG, "/edit").await;
    assert!(h.client.last_text().contains("Your time entries"));
    assert!(h.client.last_text().contains("planning"));

    h.say(ALICE_TG, "42").await;
    assert!(h.client.buttons().contains(&"edit_field:hours".to_string()));

    h.press(ALICE_TG, "edit_field:hours").await;
    assert!(h.client.last_text().contains("new hours"));

    h.say(ALICE_TG, "10.5").await;
    assert!(h.client.last_text().contains("entry #42"));
    let save = h.client.last_button("edit_confirm:save.");

    assert_eq!(h.press(ALICE_TG, &save).await, DispatchOutcome::Processed);
    assert!(h.client.last_text().starts_with("✅ Entry #42 updated"));
    assert_eq!(h.client.notices().last(), Some(&Some("Saved".to_string())));

    let after = h.entry(42).await;
    assert_eq!(after.hours, Hours::from_tenths(105));
    assert_eq!(after.project_id, before.project_id);
    assert_eq!(after.description, before.description);
    assert_eq!(after.date, before.date);
    assert!(after.version > before.version);
    assert!(h.session(ALICE_TG).await.is_none());
}

#[tokio::test]
async fn test_typed_confirmation_saves() {
    let h = Harness::new().await;
    h.say(ALICE_TG, "/edit 42").await;
    h.press(ALICE_TG, "edit_field:description").await;
    h.say(ALICE_TG, "sprint planning").await;
    h.say(ALICE_TG, "yes").await;

    let after = h.entry(42).await;
    assert_eq!(after.description.as_deref(), Some("sprint planning"));
    assert_eq!(after.hours, Hours::from_whole(8));
}

#[tokio::test]
async fn test_unlinked_sender_gets_link_prompt() {
    let h = Harness::new().await;
    h.say(STRANGER_TG, "/add alpha 5").await;

    let text = h.client.last_text();
    assert!(text.contains("link your account"));
    assert!(text.contains("token="));
    assert_eq!(h.store.time_entry_count().await, 2);
    assert!(h.session(STRANGER_TG).await.is_none());
}

#[tokio::test]
async fn test_help_works_without_link() {
    let h = Harness::new().await;
    h.say(STRANGER_TG, "/help").await;
    let text = h.client.last_text();
    assert!(text.contains("/add"));
    assert!(text.contains("/start"));
    assert!(!text.contains("/stats"));
}

#[tokio::test]
async fn test_cancel_then_stale_save_is_ignored() {
    let h = Harness::new().await;
    h.say(ALICE_TG, "/edit 42").await;
    h.press(ALICE_TG, "edit_field:hours").await;
    h.say(ALICE_TG, "10.5").await;
    let save = h.client.last_button("edit_confirm:save.");

    h.say(ALICE_TG, "/cancel").await;
    assert_eq!(h.client.last_text(), "✖️ Cancelled the edit dialog.");
    assert!(h.session(ALICE_TG).await.is_none());

    h.client.clear();
    assert_eq!(h.press(ALICE_TG, &save).await, DispatchOutcome::Processed);
    assert_eq!(h.client.notices(), vec![Some(FINISHED_NOTICE.to_string())]);
    assert!(h.client.texts().is_empty());
    assert_eq!(h.entry(42).await.hours, Hours::from_whole(8));
}

#[tokio::test]
async fn test_second_save_press_does_nothing() {
    let h = Harness::new().await;
    h.say(ALICE_TG, "/edit 42").await;
    h.press(ALICE_TG, "edit_field:hours").await;
    h.say(ALICE_TG, "9").await;
    let save = h.client.last_button("edit_confirm:save.");
    h.press(ALICE_TG, &save).await;
    let version = h.entry(42).await.version;

    h.press(ALICE_TG, &save).await;
    assert_eq!(h.entry(42).await.version, version);
    assert_eq!(h.client.notices().last(), Some(&Some(FINISHED_NOTICE.to_string())));
}

#[tokio::test]
async fn test_save_button_from_earlier_prompt_is_ignored() {
    let h = Harness::new().await;
    h.say(ALICE_TG, "/edit 42").await;
    h.press(ALICE_TG, "edit_field:hours").await;
    h.say(ALICE_TG, "10").await;
    let old_save = h.client.last_button("edit_confirm:save.");

    h.say(ALICE_TG, "/edit 42").await;
    h.press(ALICE_TG, "edit_field:hours").await;
    h.say(ALICE_TG, "5").await;
    let new_save = h.client.last_button("edit_confirm:save.");
    assert_ne!(old_save, new_save);

    h.client.clear();
    assert_eq!(h.press(ALICE_TG, &old_save).await, DispatchOutcome::Processed);
    assert_eq!(h.client.notices(), vec![Some(FINISHED_NOTICE.to_string())]);
    assert_eq!(h.entry(42).await.hours, Hours::from_whole(8));
    assert!(h.session(ALICE_TG).await.is_some());

    // Bare buttons without a prompt token are not accepted either.
    h.press(ALICE_TG, "edit_confirm:save").await;
    assert_eq!(h.entry(42).await.hours, Hours::from_whole(8));

    h.press(ALICE_TG, &new_save).await;
    assert_eq!(h.entry(42).await.hours, Hours::from_whole(5));
    assert!(h.session(ALICE_TG).await.is_none());
}

#[tokio::test]
async fn test_generic_confirm_button_answers_current_prompt() {
    let h = Harness::new().await;
    h.say(ALICE_TG, "/edit 42").await;
    h.press(ALICE_TG, "edit_field:hours").await;
    h.say(ALICE_TG, "6").await;

    h.press(ALICE_TG, "confirm:save").await;
    assert_eq!(h.entry(42).await.hours, Hours::from_whole(6));
    assert!(h.session(ALICE_TG).await.is_none());
}

#[tokio::test]
async fn test_concurrent_change_reports_stale() {
    let h = Harness::new().await;
    h.say(ALICE_TG, "/edit 42").await;
    h.press(ALICE_TG, "edit_field:hours").await;
    h.say(ALICE_TG, "10").await;

    let mut changed = h.entry(42).await;
    changed.hours = Hours::from_whole(6);
    changed.version += 1;
    h.store.insert_time_entry(changed).await.unwrap();

    h.press(ALICE_TG, &h.client.last_button("edit_confirm:save.")).await;
    assert!(h.client.last_text().contains("changed since you opened it"));
    assert_eq!(h.entry(42).await.hours, Hours::from_whole(6));
    assert!(h.session(ALICE_TG).await.is_none());
}

#[tokio::test]
async fn test_foreign_entry_reads_as_missing() {
    let h = Harness::new().await;
    h.say(ALICE_TG, "/edit 43").await;
    assert!(h.client.texts().iter().any(|t| t == ENTRY_NOT_FOUND));

    h.say(ALICE_TG, "43").await;
    assert_eq!(h.client.last_text(), ENTRY_NOT_FOUND);
    assert_eq!(h.entry(43).await.version, 1);
}

#[tokio::test]
async fn test_fuzzy_project_suggestions() {
    let h = Harness::new().await;
    h.say(ALICE_TG, "/add alpah 5").await;

    let text = h.client.last_text();
    assert!(text.contains("Did you mean"));
    assert!(text.contains("<code>alpha</code>"));
    assert!(!text.contains("beta"));
    assert_eq!(h.client.buttons(), vec!["add_project:alpha".to_string()]);
    assert_eq!(h.store.time_entry_count().await, 2);
}

#[tokio::test]
async fn test_single_close_match_is_booked() {
    let h = Harness::new().await;
    h.say(ALICE_TG, "/add alpa 2 design review").await;

    let text = h.client.last_text();
    assert!(text.contains("Logged <b>2h</b> on <code>alpha</code>"));
    assert!(text.contains("2026-10-14"));
    assert!(text.contains("design review"));
    assert_eq!(h.store.time_entry_count().await, 3);
}

#[tokio::test]
async fn test_add_warns_but_books_long_day() {
    let h = Harness::new().await;
    h.say(ALICE_TG, "/add alpha 13").await;
    let text = h.client.last_text();
    assert!(text.contains("Logged <b>13h</b>"));
    assert_eq!(text.matches("⚠️").count(), 1);
    assert!(text.contains("\n⚠️ That is a long day"));
    assert_eq!(h.store.time_entry_count().await, 3);
}

#[tokio::test]
async fn test_edit_warns_once_for_long_day() {
    let h = Harness::new().await;
    h.say(ALICE_TG, "/edit 42").await;
    h.press(ALICE_TG, "edit_field:hours").await;
    h.say(ALICE_TG, "13").await;
    let prompt = h.client.last_text();
    assert_eq!(prompt.matches("⚠️").count(), 1);

    h.press(ALICE_TG, &h.client.last_button("edit_confirm:save.")).await;
    let done = h.client.last_text();
    assert!(done.starts_with("✅ Entry #42 updated"));
    assert_eq!(done.matches("⚠️").count(), 1);
    assert_eq!(h.entry(42).await.hours, Hours::from_whole(13));
}

#[tokio::test]
async fn test_add_interactive_flow() {
    let h = Harness::new().await;
    h.say(ALICE_TG, "/add").await;
    let buttons = h.client.buttons();
    assert!(buttons.contains(&"add_project:alpha".to_string()));
    assert!(buttons.contains(&"add_project:beta".to_string()));

    h.press(ALICE_TG, "add_project:beta").await;
    assert!(matches!(
        h.session(ALICE_TG).await.map(|s| s.dialog),
        Some(Dialog::AddTime(_))
    ));

    h.say(ALICE_TG, "1,5 standup").await;
    assert!(h.client.last_text().contains("Logged <b>1.5h</b> on <code>beta</code>"));
    assert_eq!(h.store.time_entry_count().await, 3);
    assert!(h.session(ALICE_TG).await.is_none());
}

#[tokio::test]
async fn test_invalid_hours_keep_the_dialog() {
    let h = Harness::new().await;
    h.say(ALICE_TG, "/add alpha").await;
    h.say(ALICE_TG, "lots").await;
    assert!(h.client.last_text().starts_with("❌"));
    assert!(h.session(ALICE_TG).await.is_some());

    h.say(ALICE_TG, "3").await;
    assert_eq!(h.store.time_entry_count().await, 3);
}

#[tokio::test]
async fn test_new_command_replaces_dialog() {
    let h = Harness::new().await;
    h.say(ALICE_TG, "/edit").await;
    assert!(matches!(
        h.session(ALICE_TG).await.map(|s| s.dialog),
        Some(Dialog::Edit(_))
    ));

    h.say(ALICE_TG, "/rename alpha").await;
    let session = h.session(ALICE_TG).await.unwrap();
    assert_eq!(session.dialog.kind(), "rename");

    h.say(ALICE_TG, "Alpha Prime").await;
    h.press(ALICE_TG, &h.client.last_button("rename_confirm:save.")).await;
    let project = h.store.project(ProjectId::new(10)).await.unwrap();
    assert_eq!(project.name, "Alpha Prime");
    assert_eq!(project.slug, "alpha");
    assert!(h.session(ALICE_TG).await.is_none());
}

#[tokio::test]
async fn test_stateless_command_clears_dialog() {
    let h = Harness::new().await;
    h.say(ALICE_TG, "/edit").await;
    h.say(ALICE_TG, "/projects").await;
    assert!(h.session(ALICE_TG).await.is_none());
}

#[tokio::test]
async fn test_rename_requires_management() {
    let h = Harness::new().await;
    h.say(ALICE_TG, "/rename beta").await;
    assert_eq!(h.client.last_text(), "❌ Project not found.");
    assert!(h.session(ALICE_TG).await.is_none());
}

#[tokio::test]
async fn test_adduser_dialog_is_idempotent() {
    let h = Harness::new().await;
    for _ in 0..2 {
        h.say(ALICE_TG, "/adduser alpha").await;
        h.say(ALICE_TG, "@bob").await;
        assert!(h.client.buttons().contains(&"adduser_role:member".to_string()));
        h.press(ALICE_TG, "adduser_role:member").await;
        h.press(ALICE_TG, &h.client.last_button("adduser_confirm:save.")).await;
    }

    let texts = h.client.texts();
    assert!(texts.iter().any(|t| t.contains("joined <code>alpha</code>")));
    assert!(h.client.last_text().contains("already a member"));
    let project = h.store.project(ProjectId::new(10)).await.unwrap();
    assert_eq!(project.role_of(BOB), Some(Role::Member));
    assert_eq!(project.members.len(), 2);
}

#[tokio::test]
async fn test_report_periods() {
    let h = Harness::new().await;
    h.say(ALICE_TG, "/report week").await;
    let text = h.client.last_text();
    assert!(text.contains("Report"));
    assert!(text.contains("alpha"));
    assert!(text.contains("Total"));

    h.say(ALICE_TG, "/report 2020-01").await;
    assert!(h.client.last_text().starts_with("❌"));

    h.say(ALICE_TG, "/report last_month").await;
    assert!(h.client.last_text().starts_with("📊 No time logged"));
}

#[tokio::test]
async fn test_developer_commands_are_gated() {
    let h = Harness::new().await;
    h.say(ALICE_TG, "/stats").await;
    assert_eq!(h.client.last_text(), ACCESS_DENIED);

    h.say(DEV_TG, "/stats").await;
    assert!(h.client.last_text().contains("Time entries: 2"));

    h.say(DEV_TG, "/help").await;
    assert!(h.client.last_text().contains("/stats"));
}

#[tokio::test]
async fn test_plain_text_without_dialog() {
    let h = Harness::new().await;
    h.say(ALICE_TG, "hello there").await;
    assert_eq!(h.client.last_text(), NOT_UNDERSTOOD);
}

#[tokio::test]
async fn test_unknown_command() {
    let h = Harness::new().await;
    h.say(ALICE_TG, "/frobnicate").await;
    assert!(h.client.last_text().contains("Unknown command /frobnicate"));
}

#[tokio::test]
async fn test_unroutable_button_expires() {
    let h = Harness::new().await;
    h.press(ALICE_TG, "bogus_thing:1").await;
    assert_eq!(h.client.notices(), vec![Some(EXPIRED_BUTTON.to_string())]);
}

#[tokio::test]
async fn test_legacy_page_buttons_use_the_session() {
    let h = Harness::with_settings(DispatchSettings {
        bot_id: "testbot".to_string(),
        page_size: 1,
        ..DispatchSettings::default()
    })
    .await;
    h.say(ALICE_TG, "/add alpha 1").await;
    h.say(ALICE_TG, "/edit").await;
    assert!(h.client.last_text().contains("page 1/2"));

    h.press(ALICE_TG, "page:7").await;
    assert_eq!(
        h.client.notices().last(),
        Some(&Some("That page is not available.".to_string()))
    );

    h.press(ALICE_TG, "edit_page:2").await;
    assert!(h.client.last_text().contains("page 2/2"));

    h.press(ALICE_TG, "page:1").await;
    assert!(h.client.last_text().contains("page 1/2"));
}

#[tokio::test]
async fn test_duplicate_update_is_dropped() {
    let h = Harness::new().await;
    let update = Update::text(ALICE_TG, Sender::new(ALICE_TG, "Alice"), "/add alpha 1")
        .with_update_id(9000);

    assert_eq!(h.dispatcher.dispatch(update.clone()).await, DispatchOutcome::Processed);
    assert_eq!(h.dispatcher.dispatch(update).await, DispatchOutcome::Duplicate);
    assert_eq!(h.store.time_entry_count().await, 3);
    assert_eq!(h.client.texts().len(), 1);
}

#[tokio::test]
async fn test_blocked_chat_does_not_fail_the_update() {
    let h = Harness::new().await;
    h.client.block(ALICE_TG);
    assert_eq!(h.say(ALICE_TG, "/add alpha 1").await, DispatchOutcome::Processed);
    assert_eq!(h.store.time_entry_count().await, 3);
    assert_eq!(h.dispatcher.active_keys(), 0);
}

#[tokio::test]
async fn test_sessions_are_per_chat_and_user() {
    let h = Harness::new().await;
    h.say(ALICE_TG, "/edit").await;
    h.say(BOB_TG, "43").await;
    assert_eq!(h.client.last_text(), NOT_UNDERSTOOD);
    assert!(h.session(ALICE_TG).await.is_some());
    assert!(h.session(BOB_TG).await.is_none());
}
