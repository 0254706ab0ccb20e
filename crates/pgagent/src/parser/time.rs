//! Timestamp resolution for prefix, syslog and epoch time captures.
//!
//! Nothing here returns an error: text that cannot be resolved yields
//! `None`, which callers treat as "do not filter by time".

use std::str::FromStr;

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use once_cell::sync::Lazy;
use regex::Regex;

const POSTGRES_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";
const SYSLOG_TIME_FORMAT: &str = "%Y %b %d %H:%M:%S";

static NUMERIC_OFFSET: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([+-]?)(\d{1,2})(?::?(\d{2}))?$").expect("valid offset regex"));

/// Resolve a `%t`/`%m` capture such as `2018-03-11 20:00:02.123 UTC`.
///
/// With a configured zone the trailing zone token is ignored and the
/// wall-clock time is read in that zone. Without one the token decides:
/// empty or `UTC` means UTC, a numeric token is an hour offset, anything
/// else is looked up in the zone database.
pub fn resolve(text: &str, tz: Option<Tz>) -> Option<DateTime<Utc>> {
    let (local, zone) = split_zone(text.trim());
    let naive = NaiveDateTime::parse_from_str(local, POSTGRES_TIME_FORMAT).ok()?;

    if let Some(tz) = tz {
        return in_zone(&tz, &naive);
    }

    match zone {
        "" | "UTC" | "Z" => Some(Utc.from_utc_datetime(&naive)),
        _ => {
            if let Some(offset) = numeric_offset(zone) {
                return offset
                    .from_local_datetime(&naive)
                    .single()
                    .map(|dt| dt.with_timezone(&Utc));
            }
            let named = Tz::from_str(zone).ok()?;
            in_zone(&named, &naive)
        }
    }
}

/// Resolve a syslog `Mon  d hh:mm:ss` capture. Syslog omits the year, so
/// the caller supplies it.
pub fn resolve_syslog(text: &str, year: i32, tz: Option<Tz>) -> Option<DateTime<Utc>> {
    let collapsed = format!("{} {}", year, text)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    let naive = NaiveDateTime::parse_from_str(&collapsed, SYSLOG_TIME_FORMAT).ok()?;
    match tz {
        Some(tz) => in_zone(&tz, &naive),
        None => Some(Utc.from_utc_datetime(&naive)),
    }
}

/// Resolve a `%n` capture (seconds since the epoch with fraction).
pub fn resolve_unix(text: &str) -> Option<DateTime<Utc>> {
    let (secs, frac) = text.trim().split_once('.').unwrap_or((text.trim(), ""));
    let secs: i64 = secs.parse().ok()?;
    let nanos = if frac.is_empty() {
        0
    } else {
        let digits: String = frac.chars().take(9).collect();
        let scale = 10u32.pow(9 - digits.len() as u32);
        digits.parse::<u32>().ok()? * scale
    };
    DateTime::from_timestamp(secs, nanos)
}

fn split_zone(text: &str) -> (&str, &str) {
    let mut parts = text.splitn(3, ' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(date), Some(time), Some(zone)) => (&text[..date.len() + 1 + time.len()], zone.trim()),
        _ => (text, ""),
    }
}

fn numeric_offset(zone: &str) -> Option<FixedOffset> {
    let caps = NUMERIC_OFFSET.captures(zone)?;
    let hours: i32 = caps.get(2)?.as_str().parse().ok()?;
    let minutes: i32 = caps.get(3).map_or(Ok(0), |m| m.as_str().parse()).ok()?;
    let mut secs = hours * 3600 + minutes * 60;
    if caps.get(1).map_or("", |m| m.as_str()) == "-" {
        secs = -secs;
    }
    FixedOffset::east_opt(secs)
}

fn in_zone(tz: &Tz, naive: &NaiveDateTime) -> Option<DateTime<Utc>> {
    tz.from_local_datetime(naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}
