//! Project types for Timebot.
//!
//! Projects group time entries and carry the membership list that scopes
//! which users may book time on them and who may manage them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::ids::{ProjectId, UserId};

/// Role of a user within a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Created the project; full control.
    Owner,
    /// May rename the project, add members and edit anyone's entries.
    Manager,
    /// May book time.
    #[default]
    Member,
    /// Read-only access.
    Viewer,
}

impl Role {
    /// Roles that can be granted through `/adduser`.
    pub const ASSIGNABLE: [Role; 3] = [Role::Member, Role::Manager, Role::Viewer];

    /// Returns the wire name of the role.
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Owner => "owner",
            Role::Manager => "manager",
            Role::Member => "member",
            Role::Viewer => "viewer",
        }
    }

    /// Whether this role may manage the project.
    pub fn can_manage(self) -> bool {
        matches!(self, Role::Owner | Role::Manager)
    }

    /// Whether this role may book time.
    pub fn can_track(self) -> bool {
        !matches!(self, Role::Viewer)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "owner" => Ok(Role::Owner),
            "manager" => Ok(Role::Manager),
            "member" => Ok(Role::Member),
            "viewer" => Ok(Role::Viewer),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

/// A user's membership in a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    /// The member.
    pub user_id: UserId,
    /// The member's role.
    pub role: Role,
}

/// A project that time can be booked on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    /// Unique identifier.
    pub id: ProjectId,

    /// Short unique handle used in commands and callback payloads.
    pub slug: String,

    /// Human-readable name.
    pub name: String,

    /// Users with access to the project.
    #[serde(default)]
    pub members: Vec<Membership>,

    /// Archived projects accept no new time.
    #[serde(default)]
    pub archived: bool,

    /// When the project was created.
    pub created_at: DateTime<Utc>,
}

impl Project {
    /// Creates a new project owned by `owner`.
    pub fn new(
        id: impl Into<ProjectId>,
        slug: impl Into<String>,
        name: impl Into<String>,
        owner: UserId,
    ) -> Self {
        Self {
            id: id.into(),
            slug: slug.into(),
            name: name.into(),
            members: vec![Membership {
                user_id: owner,
                role: Role::Owner,
            }],
            archived: false,
            created_at: Utc::now(),
        }
    }

    /// Adds a member with the given role (builder style).
    pub fn with_member(mut self, user_id: UserId, role: Role) -> Self {
        self.members.push(Membership { user_id, role });
        self
    }

    /// Returns the role of `user_id`, if they are a member.
    pub fn role_of(&self, user_id: UserId) -> Option<Role> {
        self.members
            .iter()
            .find(|m| m.user_id == user_id)
            .map(|m| m.role)
    }

    /// Whether `user_id` may manage this project.
    pub fn is_managed_by(&self, user_id: UserId) -> bool {
        self.role_of(user_id).is_some_and(Role::can_manage)
    }

    /// Whether `user_id` may book time on this project.
    pub fn accepts_time_from(&self, user_id: UserId) -> bool {
        !self.archived && self.role_of(user_id).is_some_and(Role::can_track)
    }
}
