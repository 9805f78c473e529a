//! Timestamp parsing shared by ingestion and serving.

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::errors::{Result, UcastError};

/// Parses an ISO-8601 timestamp, tolerating the common naive variants.
/// Naive timestamps are taken as UTC.
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Ok(ts.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(naive.and_utc());
        }
    }
    Err(UcastError::validation(format!(
        "Unparseable timestamp: {value}"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn test_accepted_formats() {
        assert_eq!(
            parse_timestamp("2024-03-06T08:30:00Z").unwrap().hour(),
            8
        );
        // Offset timestamps normalize to UTC.
        assert_eq!(
            parse_timestamp("2024-03-06T08:30:00+05:30").unwrap().hour(),
            3
        );
        assert!(parse_timestamp("2024-03-06T08:30:00").is_ok());
        assert!(parse_timestamp("2024-03-06 08:30:00").is_ok());
    }

    #[test]
    fn test_rejected_formats() {
        assert!(parse_timestamp("yesterday").is_err());
        assert!(parse_timestamp("06/03/2024").is_err());
        assert!(parse_timestamp("").is_err());
    }
}
