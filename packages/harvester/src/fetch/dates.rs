//! Free-text date parsing into normalized UTC timestamps.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};

/// Datetime formats tried after the RFC parsers.
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%B %d, %Y %H:%M",
];

/// Date-only formats; midnight UTC is assumed.
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%d %B %Y",
    "%d %b %Y",
    "%B %d, %Y",
    "%b %d, %Y",
    "%m/%d/%Y",
    "%d.%m.%Y",
];

/// Parse a free-text date into a UTC timestamp.
///
/// Tries RFC 3339 and RFC 2822 first (feed timestamps), then a list of
/// common site formats. Ordinal suffixes ("June 3rd, 2024") are
/// stripped before matching. Returns `None` rather than guessing.
pub fn parse_date(text: &str) -> Option<DateTime<Utc>> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }

    let cleaned = strip_ordinals(trimmed);

    for format in DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(&cleaned, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }

    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(&cleaned, format) {
            let naive = date.and_hms_opt(0, 0, 0)?;
            return Some(Utc.from_utc_datetime(&naive));
        }
    }

    None
}

/// "3rd" -> "3", "21st" -> "21".
fn strip_ordinals(text: &str) -> String {
    let re = regex::Regex::new(r"\b(\d{1,2})(st|nd|rd|th)\b").unwrap();
    re.replace_all(text, "$1").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    #[test]
    fn test_rfc3339() {
        let dt = parse_date("2025-01-06T10:30:00Z").unwrap();
        assert_eq!(dt.year(), 2025);
        assert_eq!(dt.day(), 6);
    }

    #[test]
    fn test_rfc2822() {
        let dt = parse_date("Mon, 06 Jan 2025 10:00:00 +0200").unwrap();
        assert_eq!(dt.year(), 2025);
    }

    #[test]
    fn test_common_site_formats() {
        assert!(parse_date("2025-01-06").is_some());
        assert!(parse_date("January 6, 2025").is_some());
        assert!(parse_date("6 Jan 2025").is_some());
        assert!(parse_date("01/06/2025").is_some());
    }

    #[test]
    fn test_ordinal_suffixes() {
        let dt = parse_date("June 3rd, 2024").unwrap();
        assert_eq!(dt.month(), 6);
        assert_eq!(dt.day(), 3);
    }

    #[test]
    fn test_unparseable() {
        assert!(parse_date("").is_none());
        assert!(parse_date("yesterday-ish").is_none());
    }
}
