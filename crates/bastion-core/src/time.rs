//! Timestamp helpers.
//!
//! Every instant persisted by bastion is written through [`format_ts`], which
//! produces fixed-width RFC 3339 in UTC with whole seconds
//! (`2026-03-01T02:00:00Z`). Fixed width keeps SQL string comparisons
//! (`start_at <= ?1`) equivalent to chronological comparisons.

use chrono::{DateTime, Datelike, NaiveDateTime, SecondsFormat, Utc};

/// Naive layouts accepted in addition to RFC 3339. Interpreted as UTC.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Render `dt` in the canonical storage format.
pub fn format_ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Current instant in the canonical storage format.
pub fn now_ts() -> String {
    format_ts(Utc::now())
}

/// Parse a caller-supplied timestamp.
///
/// Accepts RFC 3339 with any offset (normalised to UTC) or one of the naive
/// layouts in [`NAIVE_FORMATS`]. Sub-second precision is dropped so the value
/// round-trips through [`format_ts`] unchanged. Returns `None` for blank or
/// unparseable input, and for instants whose UTC year is outside 0000..=9999
/// (those no longer render at fixed width).
pub fn parse_ts(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let parsed = DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NAIVE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
                .map(|naive| naive.and_utc())
        })?;

    if !(0..=9999).contains(&parsed.year()) {
        return None;
    }
    DateTime::from_timestamp(parsed.timestamp(), 0)
}
