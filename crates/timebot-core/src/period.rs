//! Period expressions for reports.
//!
//! Recognized forms, tried in order:
//!
//! ```text
//! day | week | month | last_day | last_week | last_month
//! YYYY-MM                    whole calendar month
//! YYYY-MM-DD                 single day
//! YYYY-MM-DD..YYYY-MM-DD     explicit day range
//! YYYY-MM..YYYY-MM           explicit month range
//! (empty)                    same as `week`
//! ```
//!
//! Weeks start on Monday. Every range is inclusive on both ends.

use std::fmt;
use std::sync::OnceLock;

use chrono::{Datelike, Days, Months, NaiveDate};
use regex::Regex;

use crate::error::PeriodError;

/// Longest accepted span, in days between start and end.
pub const MAX_SPAN_DAYS: i64 = 365;

/// How far back a period may start.
pub const MAX_AGE_MONTHS: u32 = 24;

/// An inclusive range of calendar days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// A range covering a single day.
    pub fn day(date: NaiveDate) -> Self {
        Self::new(date, date)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Number of calendar days covered.
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{} .. {}", self.start, self.end)
        }
    }
}

fn month_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^([0-9]{4})-([0-9]{2})$").expect("valid month regex"))
}

fn date_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^([0-9]{4})-([0-9]{2})-([0-9]{2})$").expect("valid date regex"))
}

/// Parses a period token relative to `today`.
pub fn parse(token: &str, today: NaiveDate) -> Result<DateRange, PeriodError> {
    let token = token.trim().to_lowercase();
    let token = if token.is_empty() { "week" } else { token.as_str() };

    let range = match keyword(token, today)? {
        Some(range) => range,
        None => explicit(token)?,
    };

    validate(range, today)?;
    Ok(range)
}

fn keyword(token: &str, today: NaiveDate) -> Result<Option<DateRange>, PeriodError> {
    let range = match token {
        "day" | "today" => DateRange::day(today),
        "last_day" | "yesterday" => DateRange::day(shift_days(today, -1)?),
        "week" => week_of(today)?,
        "last_week" => week_of(shift_days(today, -7)?)?,
        "month" => month_of(today.year(), today.month())?,
        "last_month" => {
            let prev = today
                .with_day(1)
                .and_then(|first| first.pred_opt())
                .ok_or_else(|| PeriodError::Invalid("date out of range".to_string()))?;
            month_of(prev.year(), prev.month())?
        }
        _ => return Ok(None),
    };
    Ok(Some(range))
}

fn explicit(token: &str) -> Result<DateRange, PeriodError> {
    if let Some(month) = single_month(token)? {
        return Ok(month);
    }
    if let Some(date) = single_date(token)? {
        return Ok(DateRange::day(date));
    }

    if let Some((from, to)) = token.split_once("..") {
        let (from, to) = (from.trim(), to.trim());

        if let (Some(start), Some(end)) = (single_date(from)?, single_date(to)?) {
            return Ok(DateRange::new(start, end));
        }
        if let (Some(start), Some(end)) = (single_month(from)?, single_month(to)?) {
            return Ok(DateRange::new(start.start, end.end));
        }
    }

    Err(PeriodError::Format(token.to_string()))
}

/// `YYYY-MM` as a whole month. `Ok(None)` if the shape does not match.
fn single_month(token: &str) -> Result<Option<DateRange>, PeriodError> {
    let Some(caps) = month_pattern().captures(token) else {
        return Ok(None);
    };
    let year: i32 = number(&caps[1])?;
    let month: u32 = number(&caps[2])?;
    month_of(year, month).map(Some)
}

/// `YYYY-MM-DD`. `Ok(None)` if the shape does not match.
fn single_date(token: &str) -> Result<Option<NaiveDate>, PeriodError> {
    let Some(caps) = date_pattern().captures(token) else {
        return Ok(None);
    };
    let year: i32 = number(&caps[1])?;
    let month: u32 = number(&caps[2])?;
    let day: u32 = number(&caps[3])?;

    if !(1..=12).contains(&month) {
        return Err(PeriodError::Invalid(format!("month {} does not exist", month)));
    }
    NaiveDate::from_ymd_opt(year, month, day)
        .map(Some)
        .ok_or_else(|| PeriodError::Invalid(format!("{} is not a calendar date", token)))
}

fn number<T: std::str::FromStr>(digits: &str) -> Result<T, PeriodError> {
    digits
        .parse()
        .map_err(|_| PeriodError::Format(digits.to_string()))
}

fn month_of(year: i32, month: u32) -> Result<DateRange, PeriodError> {
    if !(1..=12).contains(&month) {
        return Err(PeriodError::Invalid(format!("month {} does not exist", month)));
    }
    let start = NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or_else(|| PeriodError::Invalid(format!("year {} is out of range", year)))?;
    let end = start
        .checked_add_months(Months::new(1))
        .and_then(|next| next.pred_opt())
        .ok_or_else(|| PeriodError::Invalid(format!("year {} is out of range", year)))?;
    Ok(DateRange::new(start, end))
}

fn week_of(date: NaiveDate) -> Result<DateRange, PeriodError> {
    let monday = shift_days(date, -i64::from(date.weekday().num_days_from_monday()))?;
    Ok(DateRange::new(monday, shift_days(monday, 6)?))
}

fn shift_days(date: NaiveDate, delta: i64) -> Result<NaiveDate, PeriodError> {
    let shifted = if delta >= 0 {
        date.checked_add_days(Days::new(delta.unsigned_abs()))
    } else {
        date.checked_sub_days(Days::new(delta.unsigned_abs()))
    };
    shifted.ok_or_else(|| PeriodError::Invalid("date out of range".to_string()))
}

fn validate(range: DateRange, today: NaiveDate) -> Result<(), PeriodError> {
    if range.start > range.end {
        return Err(PeriodError::Invalid(format!(
            "start {} is after end {}",
            range.start, range.end
        )));
    }

    let span = (range.end - range.start).num_days();
    if span > MAX_SPAN_DAYS {
        return Err(PeriodError::Invalid(format!(
            "the range spans {} days, the maximum is {}",
            span, MAX_SPAN_DAYS
        )));
    }

    let oldest = today
        .checked_sub_months(Months::new(MAX_AGE_MONTHS))
        .unwrap_or(NaiveDate::MIN);
    if range.start < oldest {
        return Err(PeriodError::Invalid(format!(
            "{} is more than 2 years ago",
            range.start
        )));
    }

    Ok(())
}
