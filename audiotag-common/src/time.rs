//! Timestamp and date-string utilities shared by the metadata adapters.

use chrono::{DateTime, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Convert milliseconds to duration
pub fn millis_to_duration(millis: u64) -> std::time::Duration {
    std::time::Duration::from_millis(millis)
}

/// Extract a 4-digit year from a release-date string.
///
/// Accepts `"2024"`, `"2024-05"`, `"2024-05-17"` and any ISO-8601-prefixed
/// variant; returns `None` for anything that doesn't start with 4 ASCII
/// digits (spec.md §8 boundary behaviour: unparseable dates yield `year =
/// null`, never an error).
pub fn year_from_date_str(s: &str) -> Option<u32> {
    let prefix = s.get(0..4)?;
    if prefix.len() == 4 && prefix.chars().all(|c| c.is_ascii_digit()) {
        prefix.parse().ok()
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_boundary_dates() {
        assert_eq!(year_from_date_str("2024"), Some(2024));
        assert_eq!(year_from_date_str("2024-05"), Some(2024));
        assert_eq!(year_from_date_str("2024-05-17"), Some(2024));
        assert_eq!(year_from_date_str("20"), None);
        assert_eq!(year_from_date_str("abcd"), None);
        assert_eq!(year_from_date_str(""), None);
    }
}
