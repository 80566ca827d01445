//! Schedule string parsing
//!
//! Accepted forms:
//! - `now`
//! - RFC 3339 timestamps: `2025-11-20T15:00:00+08:00`
//! - Naive local times: `2025-11-20 15:00` or `2025-11-20 15:00:30`, read in a
//!   caller-supplied fixed offset (UTC for [`parse_schedule`])
//! - Relative durations: `30m`, `2h`, `1d`, `in 1h 30m`
//! - Random windows: `random:10m-2h`

use chrono::{DateTime, Duration, FixedOffset, NaiveDateTime, Offset, TimeZone, Utc};
use rand::Rng;

use crate::error::{PromocastError, Result};

const MIN_RANDOM_SECONDS: i64 = 30;
const MAX_RANDOM_SECONDS: i64 = 30 * 24 * 3600;

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M", "%Y-%m-%d %H:%M:%S"];

/// Parse `input` relative to `now`, reading naive times as UTC
pub fn parse_schedule(input: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    parse_schedule_in(input, now, Utc.fix())
}

/// Parse `input` relative to `now`, reading naive times in `offset`
pub fn parse_schedule_in(
    input: &str,
    now: DateTime<Utc>,
    offset: FixedOffset,
) -> Result<DateTime<Utc>> {
    let input = input.trim();
    if input.is_empty() {
        return Err(invalid("Schedule string cannot be empty"));
    }

    if input.eq_ignore_ascii_case("now") {
        return Ok(now);
    }

    if let Some(range) = input.strip_prefix("random:") {
        return parse_random(range, now);
    }

    if let Ok(at) = DateTime::parse_from_rfc3339(input) {
        return Ok(at.with_timezone(&Utc));
    }

    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(input, format) {
            return offset
                .from_local_datetime(&naive)
                .single()
                .map(|at| at.with_timezone(&Utc))
                .ok_or_else(|| invalid(format!("Ambiguous local time: {}", input)));
        }
    }

    let relative = input.strip_prefix("in ").unwrap_or(input);
    if let Ok(duration) = parse_duration(relative) {
        return offset_from(now, duration);
    }

    Err(invalid(format!("Could not parse schedule string: {}", input)))
}

fn parse_duration(input: &str) -> Result<Duration> {
    let std_duration = humantime::parse_duration(input.trim())
        .map_err(|e| invalid(format!("Could not parse duration '{}': {}", input, e)))?;
    let seconds = i64::try_from(std_duration.as_secs())
        .map_err(|_| invalid("Duration out of range"))?;
    Duration::try_seconds(seconds).ok_or_else(|| invalid("Duration out of range"))
}

/// `MIN-MAX`, e.g. `10m-2h`: a uniformly random time in that window after `now`
fn parse_random(range: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let (min, max) = range
        .split_once('-')
        .ok_or_else(|| invalid("Random format must be random:MIN-MAX"))?;
    let min = parse_duration(min)?.num_seconds();
    let max = parse_duration(max)?.num_seconds();

    if min < MIN_RANDOM_SECONDS {
        return Err(invalid(format!(
            "Minimum random interval must be at least {} seconds",
            MIN_RANDOM_SECONDS
        )));
    }
    if max > MAX_RANDOM_SECONDS {
        return Err(invalid(format!(
            "Maximum random interval must be at most {} days",
            MAX_RANDOM_SECONDS / (24 * 3600)
        )));
    }
    if min >= max {
        return Err(invalid("Minimum must be less than maximum"));
    }

    let seconds = rand::thread_rng().gen_range(min..=max);
    offset_from(now, Duration::seconds(seconds))
}

fn offset_from(now: DateTime<Utc>, duration: Duration) -> Result<DateTime<Utc>> {
    now.checked_add_signed(duration)
        .ok_or_else(|| invalid("Schedule time out of range"))
}

fn invalid(message: impl Into<String>) -> PromocastError {
    PromocastError::InvalidInput(message.into())
}
