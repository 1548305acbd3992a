//! Timestamp formatting for scan reports, registration events and notifications

use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::warn;

/// `January 15, 2024 at 10:30:45 AM UTC`
const LONG_FORMAT: &str = "%B %-d, %Y at %I:%M:%S %p UTC";
/// `1/15/2024`
const SHORT_DATE_FORMAT: &str = "%-m/%-d/%Y";
/// `01/15/2024, 10:30:45`
const NOTIFICATION_FORMAT: &str = "%m/%d/%Y, %H:%M:%S";

/// Parse an RFC 3339 timestamp or the reputation service's
/// `YYYY-MM-DD HH:MM:SS` form (interpreted as UTC)
pub fn parse_timestamp(input: &str) -> Option<DateTime<Utc>> {
    let input = input.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(input) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(input, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

pub fn format_long(timestamp: DateTime<Utc>) -> String {
    timestamp.format(LONG_FORMAT).to_string()
}

/// Format a scan date for display.
///
/// Unparseable input is replaced by the current time.
pub fn format_scan_date(input: &str) -> String {
    match parse_timestamp(input) {
        Some(timestamp) => format_long(timestamp),
        None => {
            warn!("Unparseable scan date {:?}, substituting current time", input);
            format_long(Utc::now())
        }
    }
}

/// Format a registration event date as a short US date
pub fn format_event_date(input: &str) -> Option<String> {
    parse_timestamp(input).map(|timestamp| timestamp.format(SHORT_DATE_FORMAT).to_string())
}

pub fn format_notification_time(timestamp: DateTime<Utc>) -> String {
    timestamp.format(NOTIFICATION_FORMAT).to_string()
}
