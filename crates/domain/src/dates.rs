//! Timestamp canonicalization
//!
//! Publish dates arrive in whatever shape a source emits. At write time they
//! are rewritten to one canonical UTC form when recognizable and kept
//! verbatim otherwise. This is best effort, never a validation gate.

use regex::Regex;
use std::sync::LazyLock;
use time::format_description::FormatItem;
use time::format_description::well_known::{Rfc2822, Rfc3339};
use time::macros::format_description;
use time::{OffsetDateTime, UtcOffset};

static CANONICAL_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}").expect("Valid regex"));

const CANONICAL: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]Z");
const CANONICAL_PRECISE: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:6]Z");

/// `2026-02-11T02:07:30Z`
pub fn canonical(dt: OffsetDateTime) -> String {
    dt.to_offset(UtcOffset::UTC)
        .format(CANONICAL)
        .unwrap_or_default()
}

/// Fixed-width microsecond form, used for bookkeeping columns that are
/// compared as strings (`fetched_at >= ?`)
pub fn canonical_precise(dt: OffsetDateTime) -> String {
    dt.to_offset(UtcOffset::UTC)
        .format(CANONICAL_PRECISE)
        .unwrap_or_default()
}

/// Whether a string already starts like a canonical timestamp
pub fn is_canonical(value: &str) -> bool {
    CANONICAL_PREFIX.is_match(value)
}

/// Normalize a source publish date.
///
/// Missing or blank dates become `fallback` (the fetch time). Canonical
/// strings pass through, RFC 822/2822 dates are converted, anything else is
/// returned unchanged.
pub fn normalize_pub_date(raw: Option<&str>, fallback: OffsetDateTime) -> String {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return canonical(fallback);
    };

    if is_canonical(raw) {
        return raw.to_string();
    }

    match OffsetDateTime::parse(raw, &Rfc2822) {
        Ok(dt) => canonical(dt),
        Err(_) => raw.to_string(),
    }
}

/// Parse a timestamp written by this crate (or any RFC 3339 string)
pub fn parse_timestamp(value: &str) -> Option<OffsetDateTime> {
    OffsetDateTime::parse(value.trim(), &Rfc3339).ok()
}
