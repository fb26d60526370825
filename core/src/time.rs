//! Time related utils.

use crate::{Error, Result};
use chrono::format::{DelayedFormat, StrftimeItems};
use chrono::Utc;

/// DateTime is the alias for `chrono::DateTime<Utc>`.
pub type DateTime = chrono::DateTime<Utc>;

/// Create datetime of now.
pub fn now() -> DateTime {
    Utc::now()
}

/// Format time into http date: `Sun, 06 Nov 1994 08:49:37 GMT`
///
/// ## Note
///
/// HTTP date is slightly different from RFC2822.
///
/// - Timezone is fixed to GMT.
/// - Day must be 2 digit.
pub fn format_http_date(t: DateTime) -> String {
    t.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Format time into RFC3339 without sub-seconds: `2022-03-13T07:20:04Z`
///
/// This is the form Azure expects in SAS `st` and `se` fields.
pub fn format_rfc3339(t: DateTime) -> String {
    let f: DelayedFormat<StrftimeItems> = t.format("%Y-%m-%dT%H:%M:%SZ");
    f.to_string()
}

/// Parse time from RFC3339.
///
/// All of them are valid time:
///
/// - `2022-03-13T07:20:04Z`
/// - `2022-03-01T08:12:34+00:00`
/// - `2022-03-01T08:12:34.123456789+00:00`
pub fn parse_rfc3339(s: &str) -> Result<DateTime> {
    chrono::DateTime::parse_from_rfc3339(s)
        .map(|v| v.with_timezone(&Utc))
        .map_err(|e| Error::unexpected(format!("parse '{s}' into rfc3339 failed")).with_source(e))
}

/// Parse time from unix seconds, as returned by Azure identity endpoints.
pub fn parse_unix_seconds(s: &str) -> Result<DateTime> {
    let secs: i64 = s
        .trim()
        .parse()
        .map_err(|e| Error::unexpected(format!("parse '{s}' into unix seconds failed")).with_source(e))?;

    chrono::DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| Error::unexpected(format!("unix seconds '{s}' out of range")))
}
