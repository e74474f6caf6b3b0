//! Utility functions and helpers.

pub mod http;

/// Remove control characters that spreadsheet formats reject
/// (U+0000–U+001F and U+007F–U+009F).
pub fn sanitize(text: &str) -> String {
    text.chars()
        .filter(|&c| !matches!(c, '\u{0000}'..='\u{001F}' | '\u{007F}'..='\u{009F}'))
        .collect()
}

/// Drop a leading `Label:` prefix.
///
/// Splits on the first colon; text without a colon is returned trimmed.
pub fn strip_label(text: &str) -> &str {
    text.split_once(':').map_or(text, |(_, rest)| rest).trim()
}

/// Join the lines of a multi-line value with ", ".
pub fn join_lines(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Collapse runs of whitespace inside each line and drop blank lines.
pub fn normalize_lines(text: &str) -> String {
    text.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_removes_control_ranges() {
        let raw = "A\u{0000}B\u{0009}C\u{001F}D\u{007F}E\u{0085}F\u{009F}G\u{00A0}";
        assert_eq!(sanitize(raw), "ABCDEFG\u{00A0}");
    }

    #[test]
    fn test_sanitize_keeps_plain_text() {
        assert_eq!(sanitize("Houston South, TX"), "Houston South, TX");
    }

    #[test]
    fn test_strip_label() {
        assert_eq!(strip_label("Report ID: 0626600"), "0626600");
        assert_eq!(strip_label("Scope:Complete"), "Complete");
        assert_eq!(strip_label("CLOSED"), "CLOSED");
        assert_eq!(strip_label("Time: 10:30"), "10:30");
        assert_eq!(strip_label("Site Address:\nSuite: 5"), "Suite: 5");
    }

    #[test]
    fn test_join_lines() {
        assert_eq!(
            join_lines("Site Address:\n123 Main St\n\nHouston, TX 77001"),
            "Site Address:, 123 Main St, Houston, TX 77001"
        );
    }

    #[test]
    fn test_normalize_lines() {
        assert_eq!(normalize_lines("  a   b \n\n   c\n"), "a b\nc");
    }
}
