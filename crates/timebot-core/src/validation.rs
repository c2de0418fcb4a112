//! Input validation for chat-entered values.
//!
//! Every function here is pure; callers turn the error's `Display` into a
//! re-prompt and leave the conversation state untouched.

use std::sync::OnceLock;

use regex::Regex;
use timebot_models::Hours;

use crate::error::{DescriptionError, HoursError, NameError};

/// Maximum description length in characters.
pub const MAX_DESCRIPTION_LEN: usize = 1000;

/// Maximum project name length in characters.
pub const MAX_PROJECT_NAME_LEN: usize = 100;

/// Entries above this get a "long day" note.
pub const LONG_ENTRY_WARNING: Hours = Hours::from_whole(12);

/// Entries below this get a "very short" note.
pub const SHORT_ENTRY_WARNING: Hours = Hours::from_tenths(5);

fn hours_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(-)?([0-9]{1,4})(?:[.,]([0-9]+))?$").expect("valid hours regex"))
}

fn username_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^@?([A-Za-z0-9_]{3,32})$").expect("valid username regex"))
}

/// Parses an hours token such as `7.5`, `7,5` or `8`.
///
/// The value is rounded to the nearest tenth. Anything that is not `> 0`
/// and `<= 24` after rounding yields [`HoursError::OutOfRange`]; tokens that
/// are not numbers at all yield [`HoursError::Invalid`].
pub fn parse_hours(token: &str) -> Result<Hours, HoursError> {
    let token = token.trim();
    let caps = hours_pattern()
        .captures(token)
        .ok_or_else(|| HoursError::Invalid(token.to_string()))?;

    if caps.get(1).is_some() {
        return Err(HoursError::OutOfRange);
    }

    let whole: u32 = caps[2]
        .parse()
        .map_err(|_| HoursError::Invalid(token.to_string()))?;
    let frac = caps.get(3).map(|m| m.as_str()).unwrap_or("");
    let mut digits = frac.bytes().map(|b| u32::from(b - b'0'));
    let tenth = digits.next().unwrap_or(0);
    let round_up = digits.next().is_some_and(|d| d >= 5);
    let frac_nonzero = frac.bytes().any(|b| b != b'0');

    if whole > 24 || (whole == 24 && frac_nonzero) {
        return Err(HoursError::OutOfRange);
    }

    let tenths = whole * 10 + tenth + u32::from(round_up);
    if tenths == 0 || tenths > Hours::MAX_ENTRY.tenths() {
        return Err(HoursError::OutOfRange);
    }

    Ok(Hours::from_tenths(tenths))
}

/// Returns an advisory note for unusual entry sizes. Never blocks.
pub fn hours_warning(hours: Hours) -> Option<&'static str> {
    if hours > LONG_ENTRY_WARNING {
        Some("⚠️ That is a long day, double-check the hours.")
    } else if hours < SHORT_ENTRY_WARNING {
        Some("⚠️ That is a very short entry, double-check the hours.")
    } else {
        None
    }
}

/// Normalizes a description.
///
/// Empty input and the literal `-` mean "no description".
pub fn parse_description(text: &str) -> Result<Option<String>, DescriptionError> {
    let text = text.trim();
    if text.is_empty() || text == "-" {
        return Ok(None);
    }

    let len = text.chars().count();
    if len > MAX_DESCRIPTION_LEN {
        return Err(DescriptionError::TooLong {
            len,
            max: MAX_DESCRIPTION_LEN,
        });
    }

    Ok(Some(text.to_string()))
}

/// Validates a new project name.
pub fn parse_project_name(text: &str) -> Result<String, NameError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(NameError::Empty);
    }

    let len = text.chars().count();
    if len > MAX_PROJECT_NAME_LEN {
        return Err(NameError::TooLong {
            len,
            max: MAX_PROJECT_NAME_LEN,
        });
    }

    Ok(text.to_string())
}

/// Validates a username, stripping an optional leading `@`.
pub fn parse_username(text: &str) -> Result<String, NameError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(NameError::Empty);
    }

    username_pattern()
        .captures(text)
        .map(|caps| caps[1].to_string())
        .ok_or_else(|| NameError::InvalidUsername(text.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_hours_separators() {
        assert_eq!(parse_hours("7,5"), Ok(Hours::from_tenths(75)));
        assert_eq!(parse_hours("7.5"), Ok(Hours::from_tenths(75)));
        assert_eq!(parse_hours(" 8 "), Ok(Hours::from_whole(8)));
        assert_eq!(parse_hours("10.5"), Ok(Hours::from_tenths(105)));
    }

    #[test]
    fn test_parse_hours_rounds_to_tenths() {
        assert_eq!(parse_hours("1.25"), Ok(Hours::from_tenths(13)));
        assert_eq!(parse_hours("1.24"), Ok(Hours::from_tenths(12)));
        assert_eq!(parse_hours("0.05"), Ok(Hours::from_tenths(1)));
    }

    #[test]
    fn test_parse_hours_range() {
        assert_eq!(parse_hours("0"), Err(HoursError::OutOfRange));
        assert_eq!(parse_hours("0.04"), Err(HoursError::OutOfRange));
        assert_eq!(parse_hours("-1"), Err(HoursError::OutOfRange));
        assert_eq!(parse_hours("24.1"), Err(HoursError::OutOfRange));
        assert_eq!(parse_hours("25"), Err(HoursError::OutOfRange));
        assert_eq!(parse_hours("24"), Ok(Hours::MAX_ENTRY));
        assert_eq!(parse_hours("24.0"), Ok(Hours::MAX_ENTRY));
    }

    #[test]
    fn test_parse_hours_garbage_is_distinct_from_range() {
        assert!(matches!(parse_hours("abc"), Err(HoursError::Invalid(_))));
        assert!(matches!(parse_hours("1e1"), Err(HoursError::Invalid(_))));
        assert!(matches!(parse_hours("7.5h"), Err(HoursError::Invalid(_))));
        assert!(matches!(parse_hours(""), Err(HoursError::Invalid(_))));
    }

    #[test]
    fn test_parse_hours_rejects_non_ascii_digits() {
        assert!(matches!(parse_hours("1.\u{0663}"), Err(HoursError::Invalid(_))));
        assert!(matches!(parse_hours("0.\u{FF11}"), Err(HoursError::Invalid(_))));
        assert!(matches!(parse_hours("\u{0663}"), Err(HoursError::Invalid(_))));
        assert!(matches!(parse_hours("\u{FF18},5"), Err(HoursError::Invalid(_))));
    }

    #[test]
    fn test_hours_warning() {
        assert!(hours_warning(Hours::from_whole(13)).is_some());
        assert!(hours_warning(Hours::from_tenths(3)).is_some());
        assert!(hours_warning(Hours::from_whole(8)).is_none());
        assert!(hours_warning(Hours::from_whole(12)).is_none());
    }

    #[test]
    fn test_parse_description() {
        assert_eq!(parse_description("  "), Ok(None));
        assert_eq!(parse_description("-"), Ok(None));
        assert_eq!(parse_description(" fixed bug "), Ok(Some("fixed bug".to_string())));

        let long = "x".repeat(MAX_DESCRIPTION_LEN + 1);
        assert_eq!(
            parse_description(&long),
            Err(DescriptionError::TooLong { len: 1001, max: 1000 })
        );
        let max = "é".repeat(MAX_DESCRIPTION_LEN);
        assert!(parse_description(&max).is_ok());
    }

    #[test]
    fn test_parse_username() {
        assert_eq!(parse_username("@grace_h"), Ok("grace_h".to_string()));
        assert_eq!(parse_username("ada"), Ok("ada".to_string()));
        assert!(matches!(parse_username("a b"), Err(NameError::InvalidUsername(_))));
        assert_eq!(parse_username(""), Err(NameError::Empty));
    }

    #[test]
    fn test_parse_project_name() {
        assert_eq!(parse_project_name("  Alpha 2 "), Ok("Alpha 2".to_string()));
        assert_eq!(parse_project_name(""), Err(NameError::Empty));
        assert!(matches!(
            parse_project_name(&"n".repeat(101)),
            Err(NameError::TooLong { .. })
        ));
    }

    proptest! {
        #[test]
        fn prop_comma_and_dot_agree(whole in 0u32..30, frac in 0u32..100) {
            let dot = parse_hours(&format!("{}.{:02}", whole, frac));
            let comma = parse_hours(&format!("{},{:02}", whole, frac));
            prop_assert_eq!(dot, comma);
        }

        #[test]
        fn prop_accepted_values_are_in_range(whole in 0u32..30, frac in 0u32..10) {
            if let Ok(hours) = parse_hours(&format!("{}.{}", whole, frac)) {
                prop_assert!(hours > Hours::ZERO);
                prop_assert!(hours <= Hours::MAX_ENTRY);
            }
        }
    }
}
