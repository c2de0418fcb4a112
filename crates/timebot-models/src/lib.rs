//! Core data models for Timebot.
//!
//! This crate provides the data types shared by the Timebot crates: the
//! accounts, projects and time entries owned by the external data store,
//! plus the editable-field vocabulary used by chat dialogs.

pub mod ids;
pub mod project;
pub mod time_entry;
pub mod user;

// Re-export main types
pub use ids::{ProjectId, TimeEntryId, UserId};
pub use project::{Membership, Project, Role};
pub use time_entry::{EditField, FieldValue, Hours, NewTimeEntry, TimeEntry};
pub use user::User;
