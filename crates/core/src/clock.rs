//! # Clock & ID Utilities
//!
//! Thin wrappers around `chrono`/`uuid` so the rest of the codebase never
//! calls `Utc::now()` or `Uuid::new_v4()` directly — keeping "what time is
//! it" and "give me an opaque id" in one place makes it possible to fake
//! both in tests later without touching call sites.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use uuid::Uuid;

/// Current UTC instant.
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Formats an instant as ISO-8601 with a literal `Z` suffix, the wire
/// format used throughout the REST and WebSocket surfaces.
pub fn to_iso8601(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Formats an instant exactly the way `chrono`'s serde implementation does.
/// Datetimes land in the document store as these strings (the typed structs
/// serialize through serde), so values embedded in raw filter/update
/// documents must use the identical representation to compare and parse
/// consistently.
pub fn to_store_format(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(chrono::SecondsFormat::AutoSi, true)
}

/// Renders an instant in the display timezone configured for the
/// deployment (`DISPLAY_TIMEZONE`, defaulting to `Asia/Seoul`), for
/// human-facing surfaces that should not show raw UTC.
pub fn to_display_timezone(at: DateTime<Utc>, tz: &Tz) -> DateTime<Tz> {
    at.with_timezone(tz)
}

/// Parses a timezone name (e.g. `"Asia/Seoul"`), falling back to UTC for an
/// unrecognized name rather than failing configuration load outright.
pub fn parse_timezone(name: &str) -> Tz {
    name.parse().unwrap_or(chrono_tz::UTC)
}

/// A new opaque identifier, used for sub-document ids (comments, refresh
/// tokens) where a full `Uuid` column type isn't warranted.
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iso8601_formatting_has_z_suffix() {
        let at = DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert!(to_iso8601(at).ends_with('Z'));
    }

    #[test]
    fn unknown_timezone_falls_back_to_utc() {
        assert_eq!(parse_timezone("Not/A/Zone"), chrono_tz::UTC);
    }

    #[test]
    fn new_id_is_unique() {
        assert_ne!(new_id(), new_id());
    }
}
