//! Period arithmetic: converting period specs into steps and advancing boundaries

use std::fmt;
use std::str::FromStr;

use chrono::{Duration, Local, Months, TimeZone};

use crate::error::CronError;
use crate::time::Timestamp;

/// Period used when the count or unit is missing
pub const DEFAULT_PERIOD_COUNT: i64 = 1;
pub const DEFAULT_PERIOD_UNIT: PeriodUnit = PeriodUnit::Seconds;

/// Unit tokens accepted in a ticker spec
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeriodUnit {
    Millis,
    Seconds,
    Minutes,
    Hours,
    Days,
    Weeks,
    Months,
    Years,
}

impl PeriodUnit {
    pub fn token(self) -> &'static str {
        match self {
            PeriodUnit::Millis => "ms",
            PeriodUnit::Seconds => "s",
            PeriodUnit::Minutes => "m",
            PeriodUnit::Hours => "h",
            PeriodUnit::Days => "d",
            PeriodUnit::Weeks => "w",
            PeriodUnit::Months => "M",
            PeriodUnit::Years => "y",
        }
    }

    /// Milliseconds per unit, `None` for calendar units
    pub fn multiplier_ms(self) -> Option<u64> {
        match self {
            PeriodUnit::Millis => Some(1),
            PeriodUnit::Seconds => Some(1_000),
            PeriodUnit::Minutes => Some(60_000),
            PeriodUnit::Hours => Some(3_600_000),
            PeriodUnit::Days => Some(86_400_000),
            PeriodUnit::Weeks => Some(604_800_000),
            PeriodUnit::Months | PeriodUnit::Years => None,
        }
    }

    pub fn is_calendar(self) -> bool {
        self.multiplier_ms().is_none()
    }
}

impl FromStr for PeriodUnit {
    type Err = ();

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        match token {
            "ms" => Ok(PeriodUnit::Millis),
            "s" => Ok(PeriodUnit::Seconds),
            "m" => Ok(PeriodUnit::Minutes),
            "h" => Ok(PeriodUnit::Hours),
            "d" => Ok(PeriodUnit::Days),
            "w" => Ok(PeriodUnit::Weeks),
            "M" => Ok(PeriodUnit::Months),
            "y" => Ok(PeriodUnit::Years),
            _ => Err(()),
        }
    }
}

impl fmt::Display for PeriodUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// Calendar step whose length depends on the date it starts from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalendarUnit {
    Month,
    Year,
}

/// How far a ticker advances per boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Fixed duration in milliseconds
    Fixed(u64),
    /// One calendar month or year per boundary
    Calendar(CalendarUnit),
}

impl Step {
    pub fn fixed_ms(self) -> Option<u64> {
        match self {
            Step::Fixed(ms) => Some(ms),
            Step::Calendar(_) => None,
        }
    }
}

/// Convert a period spec into a step.
///
/// A missing or non-positive count, or a missing or empty unit, resets the pair to one second.
/// Calendar units always step by exactly one month/year; the count is not applied to them.
pub fn to_step_duration(
    period_count: Option<i64>,
    period_unit: Option<&str>,
) -> Result<Step, CronError> {
    let (count, token) = match (period_count, period_unit) {
        (Some(count), Some(token)) if count > 0 && !token.is_empty() => (count, token),
        _ => (DEFAULT_PERIOD_COUNT, DEFAULT_PERIOD_UNIT.token()),
    };

    let invalid = || CronError::InvalidPeriod { count, unit: token.to_string() };
    let unit: PeriodUnit = token.parse().map_err(|_| invalid())?;

    match unit {
        PeriodUnit::Months => Ok(Step::Calendar(CalendarUnit::Month)),
        PeriodUnit::Years => Ok(Step::Calendar(CalendarUnit::Year)),
        fixed => {
            let multiplier = fixed.multiplier_ms().ok_or_else(invalid)?;
            let step = (count as u64).checked_mul(multiplier).ok_or_else(invalid)?;
            Ok(Step::Fixed(step))
        }
    }
}

/// Validate a ticker's period against the heartbeat interval.
///
/// Fixed steps must be strictly longer than the heartbeat, otherwise boundaries could fall
/// between two heartbeats unseen.
pub fn validate_period(
    id: &str,
    period_count: Option<i64>,
    period_unit: Option<&str>,
    heartbeat_interval_ms: u64,
) -> Result<Step, CronError> {
    let step = to_step_duration(period_count, period_unit)?;

    if let Step::Fixed(step_ms) = step {
        if step_ms <= heartbeat_interval_ms {
            return Err(CronError::TickerTooFast {
                id: id.to_string(),
                step_ms,
                heartbeat_ms: heartbeat_interval_ms,
            });
        }
    }

    Ok(step)
}

/// Compute the boundary that follows `from`
pub fn next_emit_time(step: Step, from: Timestamp) -> Result<Timestamp, CronError> {
    match step {
        Step::Fixed(step_ms) => i64::try_from(step_ms)
            .ok()
            .and_then(|step_ms| from.checked_add(step_ms))
            .ok_or(CronError::TimestampOutOfRange { timestamp: from }),
        Step::Calendar(CalendarUnit::Month) => add_local_months(from, 1),
        Step::Calendar(CalendarUnit::Year) => add_local_months(from, 12),
    }
}

/// Add calendar months in the host's local time zone, clamping to the end of shorter months
fn add_local_months(from: Timestamp, months: u32) -> Result<Timestamp, CronError> {
    let out_of_range = || CronError::TimestampOutOfRange { timestamp: from };

    let local = Local.timestamp_millis_opt(from).single().ok_or_else(out_of_range)?;
    let shifted =
        local.naive_local().checked_add_months(Months::new(months)).ok_or_else(out_of_range)?;

    // Local times inside a DST gap do not exist; move past the gap.
    let resolved = match Local.from_local_datetime(&shifted).earliest() {
        Some(resolved) => resolved,
        None => {
            let past_gap =
                shifted.checked_add_signed(Duration::hours(1)).ok_or_else(out_of_range)?;
            Local.from_local_datetime(&past_gap).earliest().ok_or_else(out_of_range)?
        }
    };

    Ok(resolved.timestamp_millis())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};
    use proptest::prelude::*;

    fn local_ms(year: i32, month: u32, day: u32) -> Timestamp {
        Local.with_ymd_and_hms(year, month, day, 12, 0, 0).single().unwrap().timestamp_millis()
    }

    fn local_date(ms: Timestamp) -> (i32, u32, u32, u32) {
        let dt = Local.timestamp_millis_opt(ms).single().unwrap();
        (dt.year(), dt.month(), dt.day(), dt.hour())
    }

    #[test]
    fn test_fixed_units() {
        assert_eq!(to_step_duration(Some(250), Some("ms")).unwrap(), Step::Fixed(250));
        assert_eq!(to_step_duration(Some(2), Some("s")).unwrap(), Step::Fixed(2_000));
        assert_eq!(to_step_duration(Some(3), Some("m")).unwrap(), Step::Fixed(180_000));
        assert_eq!(to_step_duration(Some(1), Some("h")).unwrap(), Step::Fixed(3_600_000));
        assert_eq!(to_step_duration(Some(2), Some("d")).unwrap(), Step::Fixed(172_800_000));
        assert_eq!(to_step_duration(Some(1), Some("w")).unwrap(), Step::Fixed(604_800_000));
    }

    #[test]
    fn test_calendar_units_ignore_count() {
        assert_eq!(
            to_step_duration(Some(1), Some("M")).unwrap(),
            Step::Calendar(CalendarUnit::Month)
        );
        assert_eq!(
            to_step_duration(Some(5), Some("y")).unwrap(),
            Step::Calendar(CalendarUnit::Year)
        );
    }

    #[test]
    fn test_missing_or_invalid_parts_default_to_one_second() {
        assert_eq!(to_step_duration(None, None).unwrap(), Step::Fixed(1_000));
        assert_eq!(to_step_duration(Some(5), None).unwrap(), Step::Fixed(1_000));
        assert_eq!(to_step_duration(None, Some("h")).unwrap(), Step::Fixed(1_000));
        assert_eq!(to_step_duration(Some(0), Some("h")).unwrap(), Step::Fixed(1_000));
        assert_eq!(to_step_duration(Some(-3), Some("d")).unwrap(), Step::Fixed(1_000));
        assert_eq!(to_step_duration(Some(4), Some("")).unwrap(), Step::Fixed(1_000));
    }

    #[test]
    fn test_unrecognized_unit_is_rejected() {
        match to_step_duration(Some(2), Some("Q")) {
            Err(CronError::InvalidPeriod { count, unit }) => {
                assert_eq!(count, 2);
                assert_eq!(unit, "Q");
            }
            other => panic!("Expected InvalidPeriod, got {other:?}"),
        }
    }

    #[test]
    fn test_overflowing_count_is_rejected() {
        assert!(matches!(
            to_step_duration(Some(i64::MAX), Some("w")),
            Err(CronError::InvalidPeriod { .. })
        ));
    }

    #[test]
    fn test_validate_period_rejects_fast_tickers() {
        match validate_period("fast", Some(1), Some("ms"), 1_000) {
            Err(CronError::TickerTooFast { id, step_ms, heartbeat_ms }) => {
                assert_eq!(id, "fast");
                assert_eq!(step_ms, 1);
                assert_eq!(heartbeat_ms, 1_000);
            }
            other => panic!("Expected TickerTooFast, got {other:?}"),
        }

        // Equal to the heartbeat is still too fast
        assert!(validate_period("equal", Some(1), Some("s"), 1_000).is_err());
        assert_eq!(
            validate_period("ok", Some(1001), Some("ms"), 1_000).unwrap(),
            Step::Fixed(1001)
        );
        assert!(validate_period("monthly", Some(1), Some("M"), 1_000).is_ok());
    }

    #[test]
    fn test_next_emit_time_fixed() {
        assert_eq!(next_emit_time(Step::Fixed(2_000), 10_000).unwrap(), 12_000);
        assert!(matches!(
            next_emit_time(Step::Fixed(10), i64::MAX - 5),
            Err(CronError::TimestampOutOfRange { .. })
        ));
    }

    const MONTH: Step = Step::Calendar(CalendarUnit::Month);
    const YEAR: Step = Step::Calendar(CalendarUnit::Year);

    #[test]
    fn test_month_step_clamps_to_end_of_february() {
        let next = next_emit_time(MONTH, local_ms(2024, 1, 31)).unwrap();
        assert_eq!(local_date(next), (2024, 2, 29, 12));

        let next = next_emit_time(MONTH, local_ms(2023, 1, 31)).unwrap();
        assert_eq!(local_date(next), (2023, 2, 28, 12));
    }

    #[test]
    fn test_month_step_is_not_thirty_days() {
        let start = local_ms(2023, 7, 15);
        let next = next_emit_time(MONTH, start).unwrap();
        assert_eq!(local_date(next), (2023, 8, 15, 12));
        assert_ne!(next - start, 30 * 86_400_000);
    }

    #[test]
    fn test_year_step_from_leap_day() {
        let next = next_emit_time(YEAR, local_ms(2024, 2, 29)).unwrap();
        assert_eq!(local_date(next), (2025, 2, 28, 12));

        let next = next_emit_time(YEAR, local_ms(2023, 6, 1)).unwrap();
        assert_eq!(local_date(next), (2024, 6, 1, 12));
    }

    #[test]
    fn test_unit_tokens_round_trip() {
        for token in ["ms", "s", "m", "h", "d", "w", "M", "y"] {
            let unit: PeriodUnit = token.parse().unwrap();
            assert_eq!(unit.to_string(), token);
        }
        assert!("S".parse::<PeriodUnit>().is_err());
    }

    proptest! {
        #[test]
        fn prop_fixed_step_is_count_times_unit(count in 1i64..10_000, unit_index in 0usize..6) {
            let units = ["ms", "s", "m", "h", "d", "w"];
            let unit: PeriodUnit = units[unit_index].parse().unwrap();
            let step = to_step_duration(Some(count), Some(units[unit_index])).unwrap();
            prop_assert_eq!(step, Step::Fixed(count as u64 * unit.multiplier_ms().unwrap()));
        }

        #[test]
        fn prop_next_emit_time_is_monotonic(
            from in 0i64..4_102_444_800_000,
            calendar in any::<bool>(),
            step_ms in 1u64..1_000_000_000,
        ) {
            let step = if calendar { MONTH } else { Step::Fixed(step_ms) };
            let next = next_emit_time(step, from).unwrap();
            prop_assert!(next > from);
        }
    }
}
