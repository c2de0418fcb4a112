//! Access to users, projects and time entries.
//!
//! [`DataStore`] is the boundary the bot talks to. Every lookup that could
//! reveal another user's records is scoped by the acting user inside the
//! query itself, and every mutation is a single write that checks the value
//! the caller last saw.
//!
//! [`DbStore`] keeps everything in memory and optionally mirrors it to a JSON
//! file after each write.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use timebot_core::DateRange;
use timebot_models::{
    FieldValue, NewTimeEntry, Project, ProjectId, Role, TimeEntry, TimeEntryId, User, UserId,
};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::atomic::{atomic_write_json, read_json_optional};
use crate::error::{PersistenceError, Result};

/// Outcome of a compare-and-set update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome<T> {
    /// The write happened; carries the new record.
    Applied(T),
    /// The record changed since the caller read it; nothing was written.
    Stale,
    /// The record is gone or out of the caller's scope.
    Missing,
}

/// Outcome of adding a project member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipOutcome {
    Added,
    AlreadyMember,
    /// Project or user not found within the caller's scope.
    Missing,
}

/// Record counts for operator diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub users: usize,
    pub linked_users: usize,
    pub projects: usize,
    pub time_entries: usize,
}

/// The external record store.
#[async_trait]
pub trait DataStore: Send + Sync {
    async fn find_user_by_telegram_id(&self, telegram_id: i64) -> Result<Option<User>>;

    /// Case-insensitive; a leading `@` is ignored.
    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>>;

    /// Binds a Telegram user to an account, unlinking any other account
    /// previously bound to the same Telegram user.
    async fn link_telegram(&self, user_id: UserId, telegram_id: i64) -> Result<User>;

    /// Projects the user may book time on, in creation order.
    async fn list_available_projects(&self, user_id: UserId) -> Result<Vec<Project>>;

    /// Projects the user may manage, in creation order.
    async fn list_managed_projects(&self, user_id: UserId) -> Result<Vec<Project>>;

    /// A bookable project by slug, scoped to the user's available projects.
    async fn find_project_for_user(&self, user_id: UserId, slug: &str) -> Result<Option<Project>>;

    /// A project by slug, scoped to the projects the user manages.
    async fn find_managed_project(&self, user_id: UserId, slug: &str) -> Result<Option<Project>>;

    /// An entry the user wrote or may edit as a project manager. Entries out
    /// of scope are indistinguishable from entries that do not exist.
    async fn find_owned_time_entry(
        &self,
        user_id: UserId,
        id: TimeEntryId,
    ) -> Result<Option<TimeEntry>>;

    async fn create_time_entry(&self, entry: NewTimeEntry) -> Result<TimeEntry>;

    /// Applies one field change if the entry is still in the user's scope and
    /// still at `expected_version`.
    async fn update_time_entry_field(
        &self,
        user_id: UserId,
        id: TimeEntryId,
        expected_version: u64,
        value: &FieldValue,
    ) -> Result<UpdateOutcome<TimeEntry>>;

    /// The user's own entries, newest first, plus the total count.
    async fn list_time_entries(
        &self,
        user_id: UserId,
        offset: usize,
        limit: usize,
    ) -> Result<(Vec<TimeEntry>, usize)>;

    /// The user's own entries dated within `range`, oldest first.
    async fn time_entries_between(&self, user_id: UserId, range: DateRange)
        -> Result<Vec<TimeEntry>>;

    /// Renames a managed project if its name is still `expected_name`.
    async fn rename_project(
        &self,
        user_id: UserId,
        project_id: ProjectId,
        expected_name: &str,
        new_name: &str,
    ) -> Result<UpdateOutcome<Project>>;

    /// Adds `member` to a project managed by `user_id`.
    async fn add_project_member(
        &self,
        user_id: UserId,
        project_id: ProjectId,
        member: UserId,
        role: Role,
    ) -> Result<MembershipOutcome>;

    async fn stats(&self) -> Result<StoreStats>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Db {
    #[serde(default)]
    users: Vec<User>,
    #[serde(default)]
    projects: Vec<Project>,
    #[serde(default)]
    time_entries: Vec<TimeEntry>,
}

impl Db {
    fn project(&self, id: ProjectId) -> Option<&Project> {
        self.projects.iter().find(|p| p.id == id)
    }

    fn can_edit(&self, user_id: UserId, entry: &TimeEntry) -> bool {
        entry.user_id == user_id
            || self
                .project(entry.project_id)
                .is_some_and(|p| p.is_managed_by(user_id))
    }

    fn next_entry_id(&self) -> TimeEntryId {
        let max = self.time_entries.iter().map(|e| e.id.get()).max().unwrap_or(0);
        TimeEntryId::new(max + 1)
    }
}

/// What a closure passed to [`DbStore::write`] did to its copy.
enum Change<T> {
    /// The copy was modified and must be persisted.
    Commit(T),
    Unchanged(T),
}

/// In-memory data store with optional JSON-file mirroring.
#[derive(Default)]
pub struct DbStore {
    db: RwLock<Db>,
    path: Option<PathBuf>,
}

impl DbStore {
    /// Creates an empty store that is never written to disk.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Opens a store backed by `path`, loading it if the file exists.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let db: Db = read_json_optional(&path)?.unwrap_or_default();
        info!(
            path = %path.display(),
            users = db.users.len(),
            projects = db.projects.len(),
            entries = db.time_entries.len(),
            "Loaded data store"
        );
        Ok(Self {
            db: RwLock::new(db),
            path: Some(path),
        })
    }

    fn flush(&self, db: &Db) -> Result<()> {
        if let Some(path) = &self.path {
            atomic_write_json(path, db)?;
        }
        Ok(())
    }

    /// Runs `change` against a copy of the data under the write lock.
    ///
    /// A committed copy becomes current only after it has been flushed, so a
    /// failed write leaves memory exactly as it was.
    async fn write<T>(&self, change: impl FnOnce(&mut Db) -> Result<Change<T>>) -> Result<T> {
        let mut db = self.db.write().await;
        let mut next = db.clone();
        match change(&mut next)? {
            Change::Commit(value) => {
                self.flush(&next)?;
                *db = next;
                Ok(value)
            }
            Change::Unchanged(value) => Ok(value),
        }
    }

    /// Inserts or replaces an account.
    pub async fn insert_user(&self, user: User) -> Result<()> {
        self.write(|db| {
            db.users.retain(|u| u.id != user.id);
            db.users.push(user);
            Ok(Change::Commit(()))
        })
        .await
    }

    /// Inserts or replaces a project.
    pub async fn insert_project(&self, project: Project) -> Result<()> {
        self.write(|db| {
            if db
                .projects
                .iter()
                .any(|p| p.id != project.id && p.slug.eq_ignore_ascii_case(&project.slug))
            {
                return Err(PersistenceError::InvalidData(format!(
                    "duplicate project slug: {}",
                    project.slug
                )));
            }
            match db.projects.iter().position(|p| p.id == project.id) {
                Some(index) => db.projects[index] = project,
                None => db.projects.push(project),
            }
            Ok(Change::Commit(()))
        })
        .await
    }

    /// Inserts or replaces a time entry with a fixed id.
    pub async fn insert_time_entry(&self, entry: TimeEntry) -> Result<()> {
        self.write(|db| {
            db.time_entries.retain(|e| e.id != entry.id);
            db.time_entries.push(entry);
            Ok(Change::Commit(()))
        })
        .await
    }

    /// Reads an entry without any scope check. For diagnostics and tests.
    pub async fn time_entry(&self, id: TimeEntryId) -> Option<TimeEntry> {
        let db = self.db.read().await;
        db.time_entries.iter().find(|e| e.id == id).cloned()
    }

    /// Reads a project without any scope check. For diagnostics and tests.
    pub async fn project(&self, id: ProjectId) -> Option<Project> {
        self.db.read().await.project(id).cloned()
    }

    pub async fn time_entry_count(&self) -> usize {
        self.db.read().await.time_entries.len()
    }
}

#[async_trait]
impl DataStore for DbStore {
    async fn find_user_by_telegram_id(&self, telegram_id: i64) -> Result<Option<User>> {
        let db = self.db.read().await;
        Ok(db
            .users
            .iter()
            .find(|u| u.telegram_id == Some(telegram_id))
            .cloned())
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let wanted = username.trim().trim_start_matches('@');
        let db = self.db.read().await;
        Ok(db
            .users
            .iter()
            .find(|u| {
                u.username
                    .as_deref()
                    .is_some_and(|name| name.eq_ignore_ascii_case(wanted))
            })
            .cloned())
    }

    async fn link_telegram(&self, user_id: UserId, telegram_id: i64) -> Result<User> {
        let linked = self
            .write(|db| {
                let mut linked = None;
                for user in db.users.iter_mut() {
                    if user.id == user_id {
                        user.telegram_id = Some(telegram_id);
                        linked = Some(user.clone());
                    } else if user.telegram_id == Some(telegram_id) {
                        user.telegram_id = None;
                    }
                }
                linked.map(Change::Commit).ok_or(PersistenceError::NotFound {
                    kind: "user",
                    id: user_id.to_string(),
                })
            })
            .await?;

        info!(user_id = %user_id, telegram_id, "Linked Telegram account");
        Ok(linked)
    }

    async fn list_available_projects(&self, user_id: UserId) -> Result<Vec<Project>> {
        let db = self.db.read().await;
        Ok(db
            .projects
            .iter()
            .filter(|p| p.accepts_time_from(user_id))
            .cloned()
            .collect())
    }

    async fn list_managed_projects(&self, user_id: UserId) -> Result<Vec<Project>> {
        let db = self.db.read().await;
        Ok(db
            .projects
            .iter()
            .filter(|p| !p.archived && p.is_managed_by(user_id))
            .cloned()
            .collect())
    }

    async fn find_project_for_user(&self, user_id: UserId, slug: &str) -> Result<Option<Project>> {
        let db = self.db.read().await;
        Ok(db
            .projects
            .iter()
            .find(|p| p.slug.eq_ignore_ascii_case(slug) && p.accepts_time_from(user_id))
            .cloned())
    }

    async fn find_managed_project(&self, user_id: UserId, slug: &str) -> Result<Option<Project>> {
        let db = self.db.read().await;
        Ok(db
            .projects
            .iter()
            .find(|p| p.slug.eq_ignore_ascii_case(slug) && !p.archived && p.is_managed_by(user_id))
            .cloned())
    }

    async fn find_owned_time_entry(
        &self,
        user_id: UserId,
        id: TimeEntryId,
    ) -> Result<Option<TimeEntry>> {
        let db = self.db.read().await;
        Ok(db
            .time_entries
            .iter()
            .find(|e| e.id == id && db.can_edit(user_id, e))
            .cloned())
    }

    async fn create_time_entry(&self, entry: NewTimeEntry) -> Result<TimeEntry> {
        let created = self
            .write(|db| {
                let allowed = db
                    .project(entry.project_id)
                    .is_some_and(|p| p.accepts_time_from(entry.user_id));
                if !allowed {
                    return Err(PersistenceError::NotFound {
                        kind: "project",
                        id: entry.project_id.to_string(),
                    });
                }

                let created = TimeEntry {
                    id: db.next_entry_id(),
                    user_id: entry.user_id,
                    project_id: entry.project_id,
                    project_slug: entry.project_slug,
                    date: entry.date,
                    hours: entry.hours,
                    description: entry.description,
                    version: 0,
                    created_at: Utc::now(),
                    updated_at: None,
                };
                db.time_entries.push(created.clone());
                Ok(Change::Commit(created))
            })
            .await?;

        debug!(entry_id = %created.id, user_id = %created.user_id, "Created time entry");
        Ok(created)
    }

    async fn update_time_entry_field(
        &self,
        user_id: UserId,
        id: TimeEntryId,
        expected_version: u64,
        value: &FieldValue,
    ) -> Result<UpdateOutcome<TimeEntry>> {
        self.write(|db| {
            let Some(index) = db
                .time_entries
                .iter()
                .position(|e| e.id == id && db.can_edit(user_id, e))
            else {
                return Ok(Change::Unchanged(UpdateOutcome::Missing));
            };

            if let FieldValue::Project { id: project_id, .. } = value {
                let owner = db.time_entries[index].user_id;
                if !db.project(*project_id).is_some_and(|p| p.accepts_time_from(owner)) {
                    return Ok(Change::Unchanged(UpdateOutcome::Missing));
                }
            }

            let entry = &mut db.time_entries[index];
            if entry.version != expected_version {
                debug!(entry_id = %id, expected_version, actual = entry.version, "Stale entry update");
                return Ok(Change::Unchanged(UpdateOutcome::Stale));
            }
            entry.apply(value);
            Ok(Change::Commit(UpdateOutcome::Applied(entry.clone())))
        })
        .await
    }

    async fn list_time_entries(
        &self,
        user_id: UserId,
        offset: usize,
        limit: usize,
    ) -> Result<(Vec<TimeEntry>, usize)> {
        let db = self.db.read().await;
        let mut own: Vec<&TimeEntry> = db
            .time_entries
            .iter()
            .filter(|e| e.user_id == user_id)
            .collect();
        own.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| b.id.cmp(&a.id)));

        let total = own.len();
        let page = own.into_iter().skip(offset).take(limit).cloned().collect();
        Ok((page, total))
    }

    async fn time_entries_between(
        &self,
        user_id: UserId,
        range: DateRange,
    ) -> Result<Vec<TimeEntry>> {
        let db = self.db.read().await;
        let mut entries: Vec<TimeEntry> = db
            .time_entries
            .iter()
            .filter(|e| e.user_id == user_id && range.contains(e.date))
            .cloned()
            .collect();
        entries.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.id.cmp(&b.id)));
        Ok(entries)
    }

    async fn rename_project(
        &self,
        user_id: UserId,
        project_id: ProjectId,
        expected_name: &str,
        new_name: &str,
    ) -> Result<UpdateOutcome<Project>> {
        let outcome = self
            .write(|db| {
                let Some(project) = db
                    .projects
                    .iter_mut()
                    .find(|p| p.id == project_id && p.is_managed_by(user_id))
                else {
                    return Ok(Change::Unchanged(UpdateOutcome::Missing));
                };

                if project.name != expected_name {
                    return Ok(Change::Unchanged(UpdateOutcome::Stale));
                }
                project.name = new_name.to_string();
                Ok(Change::Commit(UpdateOutcome::Applied(project.clone())))
            })
            .await?;

        if matches!(outcome, UpdateOutcome::Applied(_)) {
            info!(project_id = %project_id, name = %new_name, "Renamed project");
        }
        Ok(outcome)
    }

    async fn add_project_member(
        &self,
        user_id: UserId,
        project_id: ProjectId,
        member: UserId,
        role: Role,
    ) -> Result<MembershipOutcome> {
        let outcome = self
            .write(|db| {
                if !db.users.iter().any(|u| u.id == member) {
                    return Ok(Change::Unchanged(MembershipOutcome::Missing));
                }
                let Some(project) = db
                    .projects
                    .iter_mut()
                    .find(|p| p.id == project_id && p.is_managed_by(user_id))
                else {
                    return Ok(Change::Unchanged(MembershipOutcome::Missing));
                };

                if project.role_of(member).is_some() {
                    return Ok(Change::Unchanged(MembershipOutcome::AlreadyMember));
                }
                project.members.push(timebot_models::Membership { user_id: member, role });
                Ok(Change::Commit(MembershipOutcome::Added))
            })
            .await?;

        if outcome == MembershipOutcome::Added {
            info!(project_id = %project_id, member = %member, role = %role, "Added project member");
        }
        Ok(outcome)
    }

    async fn stats(&self) -> Result<StoreStats> {
        let db = self.db.read().await;
        Ok(StoreStats {
            users: db.users.len(),
            linked_users: db.users.iter().filter(|u| u.telegram_id.is_some()).count(),
            projects: db.projects.len(),
            time_entries: db.time_entries.len(),
        })
    }
}
