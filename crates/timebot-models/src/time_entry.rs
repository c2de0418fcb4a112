//! Time entries and the values that can be edited on them.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::Add;
use std::str::FromStr;

use crate::ids::{ProjectId, TimeEntryId, UserId};

/// A duration in hours, stored in tenths of an hour.
///
/// `Hours::from_tenths(105)` is 10.5 hours. The smallest reportable
/// increment is one tenth.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Hours(u32);

impl Hours {
    /// Zero hours.
    pub const ZERO: Hours = Hours(0);

    /// Largest value accepted for a single entry (one calendar day).
    pub const MAX_ENTRY: Hours = Hours(240);

    /// Creates a value from tenths of an hour.
    pub const fn from_tenths(tenths: u32) -> Self {
        Self(tenths)
    }

    /// Creates a value from whole hours.
    pub const fn from_whole(hours: u32) -> Self {
        Self(hours * 10)
    }

    /// Returns the value in tenths of an hour.
    pub const fn tenths(self) -> u32 {
        self.0
    }

    /// Returns the value as a float, for display math only.
    pub fn as_f64(self) -> f64 {
        f64::from(self.0) / 10.0
    }
}

impl fmt::Display for Hours {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / 10;
        let frac = self.0 % 10;
        if frac == 0 {
            write!(f, "{}", whole)
        } else {
            write!(f, "{}.{}", whole, frac)
        }
    }
}

impl Add for Hours {
    type Output = Hours;

    fn add(self, rhs: Hours) -> Hours {
        Hours(self.0.saturating_add(rhs.0))
    }
}

impl Sum for Hours {
    fn sum<I: Iterator<Item = Hours>>(iter: I) -> Hours {
        iter.fold(Hours::ZERO, Add::add)
    }
}

/// A booked amount of time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeEntry {
    /// Unique identifier.
    pub id: TimeEntryId,

    /// Author of the entry.
    pub user_id: UserId,

    /// Project the time was booked on.
    pub project_id: ProjectId,

    /// Slug of the project at write time (for display).
    pub project_slug: String,

    /// Day the work happened.
    pub date: NaiveDate,

    /// Duration.
    pub hours: Hours,

    /// Optional free-text description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Incremented on every update; used for compare-and-set edits.
    #[serde(default)]
    pub version: u64,

    /// When the entry was created.
    pub created_at: DateTime<Utc>,

    /// When the entry was last changed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl TimeEntry {
    /// Applies a field change, bumping the version.
    pub fn apply(&mut self, value: &FieldValue) {
        match value {
            FieldValue::Project { id, slug } => {
                self.project_id = *id;
                self.project_slug = slug.clone();
            }
            FieldValue::Hours(hours) => self.hours = *hours,
            FieldValue::Description(description) => self.description = description.clone(),
        }
        self.version += 1;
        self.updated_at = Some(Utc::now());
    }
}

/// Input for creating a time entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTimeEntry {
    /// Author.
    pub user_id: UserId,
    /// Project id.
    pub project_id: ProjectId,
    /// Project slug (for display).
    pub project_slug: String,
    /// Day the work happened.
    pub date: NaiveDate,
    /// Duration.
    pub hours: Hours,
    /// Optional description.
    pub description: Option<String>,
}

/// Fields of a time entry that can be edited from chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditField {
    Project,
    Hours,
    Description,
}

impl EditField {
    /// All editable fields in menu order.
    pub const ALL: [EditField; 3] = [EditField::Project, EditField::Hours, EditField::Description];

    /// Returns the wire name of the field.
    pub fn as_str(self) -> &'static str {
        match self {
            EditField::Project => "project",
            EditField::Hours => "hours",
            EditField::Description => "description",
        }
    }
}

impl fmt::Display for EditField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EditField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "project" => Ok(EditField::Project),
            "hours" => Ok(EditField::Hours),
            "description" => Ok(EditField::Description),
            other => Err(format!("unknown field: {}", other)),
        }
    }
}

/// A staged value for one editable field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "field", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Project { id: ProjectId, slug: String },
    Hours(Hours),
    /// `None` clears the description.
    Description(Option<String>),
}

impl FieldValue {
    /// The field this value belongs to.
    pub fn field(&self) -> EditField {
        match self {
            FieldValue::Project { .. } => EditField::Project,
            FieldValue::Hours(_) => EditField::Hours,
            FieldValue::Description(_) => EditField::Description,
        }
    }

    /// Short human rendering of the staged value.
    pub fn describe(&self) -> String {
        match self {
            FieldValue::Project { slug, .. } => slug.clone(),
            FieldValue::Hours(hours) => format!("{}h", hours),
            FieldValue::Description(Some(text)) => text.clone(),
            FieldValue::Description(None) => "(none)".to_string(),
        }
    }
}
