//! Timezone normalization for resolved expression values.
//!
//! After a string value is fully resolved, if it matches an ISO-8601-like
//! date-time pattern with no zone indicator, and a user timezone is known, the
//! wall-clock is reinterpreted as local to that zone and re-emitted with a numeric
//! UTC offset. Zone detection only looks at the characters after index 19
//! — the fixed width of `YYYY-MM-DDTHH:MM:SS` — so dashes in the date portion never
//! get mistaken for a negative offset.

use chrono::{NaiveDateTime, TimeZone};
use chrono_tz::Tz;

/// Length of the naive `YYYY-MM-DDTHH:MM:SS` prefix, in bytes (ASCII-only, so bytes
/// and chars agree here).
const NAIVE_PREFIX_LEN: usize = 19;
const NAIVE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Attempts to timezone-normalize `value` against the named IANA zone.
///
/// Returns:
/// - `Ok(Some(normalized))` when `value` matched the naive (zone-less) ISO-8601
///   pattern and was successfully reinterpreted in `timezone_name`.
/// - `Ok(None)` when `value` does not match the pattern at all, or already carries
///   a zone indicator (`Z` or `±HH:MM`) — left unchanged by the caller.
/// - `Err(timezone_name)` when the pattern matched but `timezone_name` is not a
///   recognized IANA zone.
pub fn normalize_timezone(value: &str, timezone_name: &str) -> Result<Option<String>, String> {
    if value.len() < NAIVE_PREFIX_LEN {
        return Ok(None);
    }
    let (prefix, suffix) = value.split_at(NAIVE_PREFIX_LEN);
    let Ok(naive) = NaiveDateTime::parse_from_str(prefix, NAIVE_FORMAT) else {
        return Ok(None);
    };
    if !suffix.is_empty() {
        // Already has a zone indicator ("Z" or "+HH:MM"/"-HH:MM") - leave unchanged.
        return Ok(None);
    }

    let zone: Tz = timezone_name.parse().map_err(|_| timezone_name.to_string())?;
    let localized = zone
        .from_local_datetime(&naive)
        .single()
        .ok_or_else(|| timezone_name.to_string())?;
    Ok(Some(localized.format("%Y-%m-%dT%H:%M:%S%:z").to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn naive_datetime_gets_offset_applied() {
        let normalized = normalize_timezone("2025-08-18T10:00:00", "Europe/Sofia").expect("parses");
        assert_eq!(normalized, Some("2025-08-18T10:00:00+03:00".to_string()));
    }

    #[test]
    fn zulu_suffix_is_left_unchanged() {
        let normalized = normalize_timezone("2025-08-18T10:00:00Z", "Europe/Sofia").expect("parses");
        assert_eq!(normalized, None);
    }

    #[test]
    fn explicit_offset_is_left_unchanged() {
        let normalized = normalize_timezone("2025-08-18T10:00:00+02:00", "Europe/Sofia").expect("parses");
        assert_eq!(normalized, None);
    }

    #[test]
    fn non_datetime_strings_are_ignored() {
        let normalized = normalize_timezone("not a date, just text", "Europe/Sofia").expect("parses");
        assert_eq!(normalized, None);
    }

    #[test]
    fn unknown_timezone_is_an_error_only_when_pattern_matches() {
        assert!(normalize_timezone("2025-08-18T10:00:00", "Not/AZone").is_err());
        // No match at all: unknown zone name never gets a chance to fail.
        assert_eq!(normalize_timezone("hello", "Not/AZone"), Ok(None));
    }

    #[test]
    fn dashes_in_date_portion_do_not_get_mistaken_for_an_offset() {
        // The date portion itself contains dashes; make sure prefix-length slicing,
        // not dash-counting, is what decides whether a zone indicator is present.
        let normalized = normalize_timezone("2025-08-18T10:00:00", "Europe/Sofia").expect("parses");
        assert!(normalized.is_some());
    }
}
