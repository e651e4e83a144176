//! Infrastructure layer
//!
//! SQLite implementations of the document store and temporal graph traits.

pub mod document;
pub mod knowledge;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::error::{Error, Result};

/// Format a timestamp for storage
///
/// Fixed-width nanosecond RFC 3339 so stored values sort as text and
/// round-trip exactly.
pub(crate) fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Parse a stored RFC 3339 timestamp
pub(crate) fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Other(format!("Invalid timestamp '{}': {}", value, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_round_trip() {
        let at = Utc::now();
        assert_eq!(parse_timestamp(&format_timestamp(at)).unwrap(), at);
    }

    #[test]
    fn test_formatted_timestamps_sort_as_text() {
        let earlier: DateTime<Utc> = "2024-03-01T09:00:00Z".parse().unwrap();
        let later: DateTime<Utc> = "2024-03-01T09:00:00.5Z".parse().unwrap();
        assert!(format_timestamp(earlier) < format_timestamp(later));
    }

    #[test]
    fn test_parse_invalid_timestamp() {
        assert!(parse_timestamp("yesterday").is_err());
    }
}
