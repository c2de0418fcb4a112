//! Text formatting for chat replies.

use timebot_models::TimeEntry;

/// Visible width of the description column, marker included.
pub const DESCRIPTION_WIDTH: usize = 30;

const ELLIPSIS: char = '…';

const HEADERS: [&str; 5] = ["ID", "Date", "Project", "Hours", "Description"];

/// Escape text for Telegram's HTML parse mode.
pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Shortens `text` to at most `max` characters, ending in `…` when cut.
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max.saturating_sub(1)).collect();
    out.push(ELLIPSIS);
    out
}

/// Renders entries as a fixed-width table.
///
/// The result is plain text; wrap it in `<pre>` after [`html_escape`] when
/// sending with HTML parse mode.
pub fn render_entries(entries: &[TimeEntry]) -> String {
    let rows: Vec<[String; 5]> = entries
        .iter()
        .map(|e| {
            [
                e.id.to_string(),
                e.date.format("%Y-%m-%d").to_string(),
                e.project_slug.clone(),
                e.hours.to_string(),
                truncate(e.description.as_deref().unwrap_or(""), DESCRIPTION_WIDTH),
            ]
        })
        .collect();

    let mut widths = HEADERS.map(|h| h.chars().count());
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row.iter()) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut lines = Vec::with_capacity(rows.len() + 2);
    lines.push(format_row(&HEADERS.map(String::from), &widths));
    lines.push(
        widths
            .iter()
            .map(|w| "-".repeat(*w))
            .collect::<Vec<_>>()
            .join("-+-"),
    );
    for row in &rows {
        lines.push(format_row(row, &widths));
    }

    lines.join("\n")
}

fn format_row(cells: &[String; 5], widths: &[usize; 5]) -> String {
    let mut out = Vec::with_capacity(5);
    for (i, (cell, width)) in cells.iter().zip(widths.iter()).enumerate() {
        let pad = width.saturating_sub(cell.chars().count());
        // hours column is right-aligned
        if i == 3 {
            out.push(format!("{}{}", " ".repeat(pad), cell));
        } else {
            out.push(format!("{}{}", cell, " ".repeat(pad)));
        }
    }
    out.join(" | ").trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};
    use timebot_models::{Hours, ProjectId, TimeEntryId, UserId};

    fn entry(id: u64, slug: &str, tenths: u32, description: Option<&str>) -> TimeEntry {
        TimeEntry {
            id: TimeEntryId::new(id),
            user_id: UserId::new(1),
            project_id: ProjectId::new(1),
            project_slug: slug.to_string(),
            date: NaiveDate::from_ymd_opt(2026, 10, 1).unwrap(),
            hours: Hours::from_tenths(tenths),
            description: description.map(String::from),
            version: 0,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    #[test]
    fn test_html_escape() {
        assert_eq!(html_escape("a<b> & c"), "a&lt;b&gt; &amp; c");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 30), "short");
        let long = "a".repeat(40);
        let cut = truncate(&long, 30);
        assert_eq!(cut.chars().count(), 30);
        assert!(cut.ends_with('…'));
        assert_eq!(truncate(&"b".repeat(30), 30), "b".repeat(30));
    }

    #[test]
    fn test_render_entries() {
        let long = "x".repeat(50);
        let table = render_entries(&[
            entry(7, "alpha", 30, Some("setup")),
            entry(42, "beta-project", 105, Some(&long)),
        ]);
        let lines: Vec<&str> = table.lines().collect();

        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("ID | Date       | Project"));
        assert!(lines[2].starts_with("7  | 2026-10-01 | alpha        |     3 | setup"));
        assert!(lines[3].contains("10.5"));
        assert!(lines[3].ends_with(&format!("{}…", "x".repeat(29))));
    }

    #[test]
    fn test_render_empty() {
        let table = render_entries(&[]);
        assert_eq!(table.lines().count(), 2);
    }
}
