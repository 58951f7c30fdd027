//! Timestamp resolution.
//!
//! Exports spell time in a dozen ways. Each category declares an ordered
//! list of [`TimestampFormat`]s; the first one that parses wins and every
//! result is normalized to UTC.

use chrono::{
  DateTime, FixedOffset, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc,
};
use chrono_tz::Tz;
use serde_json::Value;

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TimestampFormat {
  /// Seconds since the epoch, integral or fractional, number or string.
  UnixSeconds,
  /// Milliseconds since the epoch.
  UnixMillis,
  /// RFC 3339 and close relatives. Values without an offset are UTC.
  Iso8601,
  /// A strftime pattern that includes `%z`.
  Offset(&'static str),
  /// A strftime pattern where one whitespace-separated `%Z` token names the
  /// zone: `UTC`, a US abbreviation like `PDT`, or an IANA name.
  ZoneName(&'static str),
  /// Wall-clock time in a fixed zone.
  Zoned(&'static str, Tz),
  /// Wall-clock time in the deployment's zone.
  Local(&'static str),
  /// A date without time, pinned to noon in the deployment's zone.
  LocalNoon(&'static str),
}

/// Resolve a JSON value (number or string) against `formats` in order.
pub fn resolve(value: &Value, formats: &[TimestampFormat], local: Tz) -> Result<DateTime<Utc>> {
  match value {
    Value::String(s) => resolve_str(s, formats, local),
    Value::Number(n) => formats
      .iter()
      .find_map(|format| match format {
        TimestampFormat::UnixSeconds => n.as_f64().and_then(from_seconds),
        TimestampFormat::UnixMillis => n.as_i64().and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        _ => None,
      })
      .ok_or_else(|| Error::Timestamp(n.to_string())),
    other => Err(Error::Timestamp(other.to_string())),
  }
}

/// Resolve a string against `formats` in order.
pub fn resolve_str(value: &str, formats: &[TimestampFormat], local: Tz) -> Result<DateTime<Utc>> {
  let value = value.trim();
  formats
    .iter()
    .find_map(|format| parse_one(value, *format, local))
    .ok_or_else(|| Error::Timestamp(value.to_owned()))
}

fn parse_one(value: &str, format: TimestampFormat, local: Tz) -> Option<DateTime<Utc>> {
  match format {
    TimestampFormat::UnixSeconds => value.parse::<f64>().ok().and_then(from_seconds),
    TimestampFormat::UnixMillis => {
      value.parse::<i64>().ok().and_then(|ms| Utc.timestamp_millis_opt(ms).single())
    }
    TimestampFormat::Iso8601 => parse_iso(value),
    TimestampFormat::Offset(pattern) => DateTime::parse_from_str(value, pattern)
      .ok()
      .map(|dt| dt.with_timezone(&Utc)),
    TimestampFormat::ZoneName(pattern) => parse_zone_name(value, pattern),
    TimestampFormat::Zoned(pattern, tz) => parse_naive(value, pattern).and_then(|n| localize(&tz, n)),
    TimestampFormat::Local(pattern) => parse_naive(value, pattern).and_then(|n| localize(&local, n)),
    TimestampFormat::LocalNoon(pattern) => NaiveDate::parse_from_str(value, pattern)
      .ok()
      .and_then(|d| localize(&local, d.and_time(noon()))),
  }
}

fn from_seconds(secs: f64) -> Option<DateTime<Utc>> {
  if !secs.is_finite() {
    return None;
  }
  let whole = secs.floor();
  let nanos = ((secs - whole) * 1e9).round().min(999_999_999.0) as u32;
  Utc.timestamp_opt(whole as i64, nanos).single()
}

fn noon() -> NaiveTime { NaiveTime::from_hms_opt(12, 0, 0).unwrap_or(NaiveTime::MIN) }

const ISO_NAIVE: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];
const ISO_OFFSET: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%d %H:%M:%S%.f%z"];

fn parse_iso(value: &str) -> Option<DateTime<Utc>> {
  if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
    return Some(dt.with_timezone(&Utc));
  }
  if let Some(dt) = ISO_OFFSET
    .iter()
    .find_map(|p| DateTime::parse_from_str(value, p).ok())
  {
    return Some(dt.with_timezone(&Utc));
  }
  if let Some(naive) = ISO_NAIVE
    .iter()
    .find_map(|p| NaiveDateTime::parse_from_str(value, p).ok())
  {
    return Some(naive.and_utc());
  }
  NaiveDate::parse_from_str(value, "%Y-%m-%d")
    .ok()
    .map(|d| d.and_time(NaiveTime::MIN).and_utc())
}

/// Date-time, falling back to a date at midnight.
fn parse_naive(value: &str, pattern: &str) -> Option<NaiveDateTime> {
  NaiveDateTime::parse_from_str(value, pattern)
    .ok()
    .or_else(|| {
      NaiveDate::parse_from_str(value, pattern)
        .ok()
        .map(|d| d.and_time(NaiveTime::MIN))
    })
    .or_else(|| DateTime::parse_from_rfc3339(value).ok().map(|dt| dt.naive_local()))
}

fn localize<Z: TimeZone>(zone: &Z, naive: NaiveDateTime) -> Option<DateTime<Utc>> {
  match zone.from_local_datetime(&naive) {
    LocalResult::Single(dt) => Some(dt.with_timezone(&Utc)),
    // Repeated hour at a DST transition: take the earlier instant.
    LocalResult::Ambiguous(early, _) => Some(early.with_timezone(&Utc)),
    // Skipped hour: interpret as if the clocks had not moved yet.
    LocalResult::None => zone
      .from_local_datetime(&(naive - chrono::Duration::hours(1)))
      .earliest()
      .map(|dt| dt.with_timezone(&Utc) + chrono::Duration::hours(1)),
  }
}

// ── Named zones ──────────────────────────────────────────────────────────

enum Zone {
  Fixed(FixedOffset),
  Named(Tz),
}

fn zone_from_token(token: &str) -> Option<Zone> {
  let hours = match token.to_ascii_uppercase().as_str() {
    "UTC" | "GMT" | "Z" => 0,
    "EST" => -5,
    "EDT" => -4,
    "CST" => -6,
    "CDT" => -5,
    "MST" => -7,
    "MDT" => -6,
    "PST" => -8,
    "PDT" => -7,
    _ => return token.parse::<Tz>().ok().map(Zone::Named),
  };
  FixedOffset::east_opt(hours * 3600).map(Zone::Fixed)
}

fn parse_zone_name(value: &str, pattern: &str) -> Option<DateTime<Utc>> {
  let pattern_tokens: Vec<&str> = pattern.split_whitespace().collect();
  let value_tokens: Vec<&str> = value.split_whitespace().collect();
  let slot = pattern_tokens.iter().position(|t| *t == "%Z")?;
  if pattern_tokens.len() != value_tokens.len() {
    return None;
  }

  let zone = zone_from_token(value_tokens[slot])?;
  let without = |tokens: &[&str]| {
    tokens
      .iter()
      .enumerate()
      .filter(|(i, _)| *i != slot)
      .map(|(_, t)| *t)
      .collect::<Vec<_>>()
      .join(" ")
  };
  let naive = parse_naive(&without(&value_tokens), &without(&pattern_tokens))?;

  match zone {
    Zone::Fixed(offset) => localize(&offset, naive),
    Zone::Named(tz) => localize(&tz, naive),
  }
}

/// Parse an IANA zone name such as `America/Chicago`.
pub fn parse_time_zone(name: &str) -> Result<Tz> {
  name.parse::<Tz>().map_err(|_| Error::TimeZone(name.to_owned()))
}
