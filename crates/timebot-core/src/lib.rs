//! Pure logic shared by the Timebot crates.
//!
//! Nothing in this crate performs I/O except [`config::ensure_all_dirs`].
//! Validation failures are returned as typed errors whose `Display` text is
//! meant to be shown to the chat user directly.

pub mod config;
pub mod error;
pub mod fuzzy;
pub mod pagination;
pub mod period;
pub mod table;
pub mod validation;

pub use error::{DescriptionError, HoursError, NameError, PeriodError};
pub use fuzzy::{FuzzyMatch, Suggestion};
pub use pagination::Page;
pub use period::DateRange;
