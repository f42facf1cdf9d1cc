//! Per-user timezone resolution.

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use tracing::warn;

use crate::error::{EngineError, EngineResult};

/// Parse an IANA timezone name.
pub fn parse_timezone(name: &str) -> EngineResult<Tz> {
    name.trim()
        .parse::<Tz>()
        .map_err(|_| EngineError::TimezoneResolution(name.to_string()))
}

/// Resolve a user's timezone, falling back to `default` when it is unset or unknown.
pub fn resolve_user_timezone(user_id: &str, configured: Option<&str>, default: Tz) -> Tz {
    match configured.filter(|s| !s.trim().is_empty()) {
        None => default,
        Some(name) => parse_timezone(name).unwrap_or_else(|e| {
            warn!(user_id, error = %e, fallback = %default, "Falling back to default timezone");
            default
        }),
    }
}

/// The calendar date at `now` in `tz`.
pub fn local_today(now: DateTime<Utc>, tz: Tz) -> NaiveDate {
    now.with_timezone(&tz).date_naive()
}
