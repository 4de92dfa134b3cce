//! Wire timestamps.
//!
//! Every `DateTime` attribute is stored and serialized as an RFC 3339 string
//! in UTC with second precision (`2024-05-07T10:00:00Z`). A single fixed
//! format keeps lexicographic order equal to chronological order, which the
//! store relies on when sorting by a timestamp attribute.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::Error;

/// UTC timestamp used for all date attributes.
pub type Timestamp = DateTime<Utc>;

/// Current time truncated to whole seconds.
#[must_use]
pub fn now() -> Timestamp {
    let now = Utc::now();
    DateTime::from_timestamp(now.timestamp(), 0).unwrap_or(now)
}

/// Formats a timestamp in the canonical wire format.
#[must_use]
pub fn format_timestamp(ts: &Timestamp) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Parses any RFC 3339 timestamp and normalises it to UTC.
pub fn parse_timestamp(s: &str) -> Result<Timestamp, Error> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::InvalidTimestamp(format!("{s}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_uses_zulu_and_whole_seconds() {
        let ts = parse_timestamp("2024-05-07T12:30:15+02:00").unwrap();
        assert_eq!(format_timestamp(&ts), "2024-05-07T10:30:15Z");
    }

    #[test]
    fn now_has_no_subsecond_component() {
        assert_eq!(now().timestamp_subsec_nanos(), 0);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(parse_timestamp("yesterday").is_err());
    }
}
