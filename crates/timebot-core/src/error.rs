//! Validation error types.
//!
//! The `Display` text of every variant is shown to the chat user as-is.

use thiserror::Error;

/// Failure to accept an hours token.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HoursError {
    /// Token is not a decimal number.
    #[error("\"{0}\" is not a number of hours. Use a decimal like 7.5 or 7,5.")]
    Invalid(String),

    /// Number parsed, but outside (0, 24].
    #[error("Hours must be more than 0 and at most 24 (smallest step is 0.1).")]
    OutOfRange,
}

/// Failure to accept a description.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DescriptionError {
    #[error("Description is too long ({len} characters, maximum is {max}).")]
    TooLong { len: usize, max: usize },
}

/// Failure to accept a name or handle typed into a dialog.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NameError {
    #[error("Name cannot be empty.")]
    Empty,

    #[error("Name is too long ({len} characters, maximum is {max}).")]
    TooLong { len: usize, max: usize },

    #[error("\"{0}\" is not a valid username (3-32 letters, digits or underscores).")]
    InvalidUsername(String),
}

/// Failure to resolve a period expression.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PeriodError {
    /// The token matches none of the recognized forms.
    #[error("Unknown period \"{0}\". Use day, week, month, last_day, last_week, last_month, YYYY-MM, YYYY-MM-DD, YYYY-MM-DD..YYYY-MM-DD or YYYY-MM..YYYY-MM.")]
    Format(String),

    /// The token is well-formed but describes an unusable range.
    #[error("Invalid period: {0}")]
    Invalid(String),
}

impl PeriodError {
    /// Whether this is a range violation rather than a format problem.
    pub fn is_invalid_period(&self) -> bool {
        matches!(self, PeriodError::Invalid(_))
    }
}
