//! Time and money arithmetic.
//!
//! Pure functions turning record timestamps into elapsed seconds, display
//! strings, and money owed. Nothing here is rounded except the `format_*`
//! functions.

use chrono::{DateTime, TimeZone, Utc};
use thiserror::Error;

use crate::types::Rate;

/// Display format for record timestamps.
pub const TIMESTAMP_DISPLAY_FORMAT: &str = "%H:%M:%S %d.%m.%y";

const SECONDS_PER_HOUR: f64 = 3600.0;

/// A record interval whose end precedes its start.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("interval end {end} precedes start {start}")]
pub struct InvalidInterval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Whole seconds between `start` and `end`, rounded down.
pub fn elapsed_seconds(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<i64, InvalidInterval> {
    if end < start {
        return Err(InvalidInterval { start, end });
    }
    // Non-negative, so truncation equals floor.
    Ok((end - start).num_seconds())
}

/// Formats seconds as `"{h} ч. {m} м. {s} с."`, dropping zero hours/minutes.
pub fn format_duration(seconds: i64) -> String {
    let seconds = seconds.max(0);
    let hours = seconds / 3600;
    let minutes = seconds % 3600 / 60;
    let seconds = seconds % 60;

    let mut result = String::new();
    if hours > 0 {
        result.push_str(&format!("{hours} ч. "));
    }
    if minutes > 0 {
        result.push_str(&format!("{minutes} м. "));
    }
    result.push_str(&format!("{seconds} с."));
    result
}

/// Money owed for `seconds` of work at an hourly `rate`.
#[allow(clippy::cast_precision_loss)]
pub fn money(seconds: i64, rate: Rate) -> f64 {
    seconds as f64 / SECONDS_PER_HOUR * rate.value()
}

/// Formats a money amount with two decimals.
pub fn format_money(value: f64) -> String {
    format!("{value:.2} руб.")
}

/// Formats a timestamp for display in the given time zone.
pub fn format_timestamp<Tz: TimeZone>(timestamp: DateTime<Utc>, tz: &Tz) -> String
where
    Tz::Offset: std::fmt::Display,
{
    timestamp
        .with_timezone(tz)
        .format(TIMESTAMP_DISPLAY_FORMAT)
        .to_string()
}

/// Human-readable project status.
pub const fn format_status(active: bool) -> &'static str {
    if active { "Активен" } else { "Завершён" }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap()
    }

    fn rate(value: f64) -> Rate {
        Rate::new(value).unwrap()
    }

    #[test]
    fn elapsed_is_zero_for_empty_interval() {
        assert_eq!(elapsed_seconds(t0(), t0()), Ok(0));
    }

    #[test]
    fn elapsed_floors_fractional_seconds() {
        let end = t0() + Duration::milliseconds(125_999);
        assert_eq!(elapsed_seconds(t0(), end), Ok(125));
    }

    #[test]
    fn elapsed_rejects_reversed_interval() {
        let end = t0() - Duration::seconds(1);
        let err = elapsed_seconds(t0(), end).unwrap_err();
        assert_eq!(err.start, t0());
        assert_eq!(err.end, end);
    }

    #[test]
    fn format_duration_omits_zero_units() {
        assert_eq!(format_duration(0), "0 с.");
        assert_eq!(format_duration(59), "59 с.");
        assert_eq!(format_duration(125), "2 м. 5 с.");
        assert_eq!(format_duration(3600), "1 ч. 0 с.");
        assert_eq!(format_duration(3725), "1 ч. 2 м. 5 с.");
        assert_eq!(format_duration(90_000), "25 ч. 0 с.");
    }

    #[test]
    fn format_duration_reconstructs_input() {
        for input in [0, 1, 61, 3599, 3600, 3661, 86_399, 123_456] {
            let printed = format_duration(input);
            let mut total = 0;
            for (value, unit) in printed
                .split(". ")
                .map(|part| part.trim_end_matches('.'))
                .filter_map(|part| part.split_once(' '))
            {
                let value: i64 = value.parse().unwrap();
                total += match unit {
                    "ч" => value * 3600,
                    "м" => value * 60,
                    "с" => value,
                    other => panic!("unexpected unit {other}"),
                };
            }
            assert_eq!(total, input, "{printed}");
        }
    }

    #[test]
    fn money_matches_reference_scenario() {
        let value = money(125, rate(500.0));
        assert!((value - 17.361_111).abs() < 1e-5);
        assert_eq!(format_money(value), "17.36 руб.");
    }

    #[test]
    fn money_is_linear() {
        let base = money(1234, rate(75.5));
        assert!((money(2468, rate(75.5)) - 2.0 * base).abs() < 1e-9);
        assert!((money(1234, rate(151.0)) - 2.0 * base).abs() < 1e-9);
    }

    #[test]
    fn money_with_zero_rate_is_zero() {
        assert!(money(3600, Rate::ZERO).abs() < f64::EPSILON);
        assert_eq!(format_money(0.0), "0.00 руб.");
    }

    #[test]
    fn format_timestamp_uses_display_layout() {
        let ts = Utc.with_ymd_and_hms(2025, 3, 10, 9, 5, 7).unwrap();
        assert_eq!(format_timestamp(ts, &Utc), "09:05:07 10.03.25");
    }

    #[test]
    fn format_status_labels() {
        assert_eq!(format_status(true), "Активен");
        assert_eq!(format_status(false), "Завершён");
    }
}
