//! Five-field cron expressions for backup schedules.
//!
//! Supports `*`, `*/n`, `a`, `a-b`, `a-b/n` and comma lists of those in each of
//! minute, hour, day-of-month, month and day-of-week (0 and 7 are Sunday).
//! Names (`MON`, `JAN`) and the `L`/`W`/`#` extensions are rejected.

use std::fmt;

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

/// How far ahead [`CronExpr::next_after`] searches before giving up.
const SEARCH_YEARS: i32 = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronParseError(String);

impl fmt::Display for CronParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for CronParseError {}

/// Allowed values of one field, as a bitset over `min..=max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FieldSet {
    bits: u64,
    /// False when the field was a bare `*`; matters for the day-of-month /
    /// day-of-week OR rule.
    restricted: bool,
}

impl FieldSet {
    fn contains(&self, value: u32) -> bool {
        self.bits & (1u64 << value) != 0
    }
}

#[derive(Debug, Clone, Copy)]
struct FieldSpec {
    name: &'static str,
    min: u32,
    max: u32,
}

const MINUTE: FieldSpec = FieldSpec { name: "minute", min: 0, max: 59 };
const HOUR: FieldSpec = FieldSpec { name: "hour", min: 0, max: 23 };
const DAY_OF_MONTH: FieldSpec = FieldSpec { name: "day of month", min: 1, max: 31 };
const MONTH: FieldSpec = FieldSpec { name: "month", min: 1, max: 12 };
const DAY_OF_WEEK: FieldSpec = FieldSpec { name: "day of week", min: 0, max: 7 };

fn parse_number(spec: &FieldSpec, raw: &str) -> Result<u32, CronParseError> {
    let value: u32 = raw
        .parse()
        .map_err(|_| CronParseError(format!("invalid {} value '{raw}'", spec.name)))?;
    if value < spec.min || value > spec.max {
        return Err(CronParseError(format!(
            "{} value {value} outside {}-{}",
            spec.name, spec.min, spec.max
        )));
    }
    Ok(value)
}

fn parse_field(spec: &FieldSpec, raw: &str) -> Result<FieldSet, CronParseError> {
    let mut bits = 0u64;
    // Vixie cron: a field starting with "*" (including "*/2") is unrestricted
    let restricted = !raw.starts_with('*');

    for part in raw.split(',') {
        if part.is_empty() {
            return Err(CronParseError(format!("empty entry in {} field", spec.name)));
        }

        let (range, step) = match part.split_once('/') {
            Some((range, step)) => {
                let step: u32 = step.parse().map_err(|_| {
                    CronParseError(format!("invalid step '{step}' in {} field", spec.name))
                })?;
                if step == 0 {
                    return Err(CronParseError(format!("step of 0 in {} field", spec.name)));
                }
                (range, step)
            }
            None => (part, 1),
        };

        let (start, end) = if range == "*" {
            (spec.min, spec.max)
        } else if let Some((a, b)) = range.split_once('-') {
            let (a, b) = (parse_number(spec, a)?, parse_number(spec, b)?);
            if a > b {
                return Err(CronParseError(format!(
                    "range {a}-{b} is reversed in {} field",
                    spec.name
                )));
            }
            (a, b)
        } else {
            let value = parse_number(spec, range)?;
            // "5/15" means "from 5 to the end, every 15"
            if step > 1 { (value, spec.max) } else { (value, value) }
        };

        let mut value = start;
        while value <= end {
            bits |= 1u64 << value;
            value += step;
        }
    }

    Ok(FieldSet { bits, restricted })
}

/// A parsed cron expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronExpr {
    minutes: FieldSet,
    hours: FieldSet,
    days_of_month: FieldSet,
    months: FieldSet,
    days_of_week: FieldSet,
}

impl CronExpr {
    /// Parse `minute hour day-of-month month day-of-week`.
    pub fn parse(expression: &str) -> Result<Self, CronParseError> {
        let fields: Vec<&str> = expression.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(CronParseError(format!(
                "expected 5 fields, found {}",
                fields.len()
            )));
        }

        let mut days_of_week = parse_field(&DAY_OF_WEEK, fields[4])?;
        // 7 is an alias for Sunday
        if days_of_week.contains(7) {
            days_of_week.bits |= 1;
        }

        Ok(Self {
            minutes: parse_field(&MINUTE, fields[0])?,
            hours: parse_field(&HOUR, fields[1])?,
            days_of_month: parse_field(&DAY_OF_MONTH, fields[2])?,
            months: parse_field(&MONTH, fields[3])?,
            days_of_week,
        })
    }

    fn day_matches(&self, date: NaiveDate) -> bool {
        let dom = self.days_of_month.contains(date.day());
        let dow = self
            .days_of_week
            .contains(date.weekday().num_days_from_sunday());

        // Classic cron: when both day fields are restricted, either may match
        if self.days_of_month.restricted && self.days_of_week.restricted {
            dom || dow
        } else {
            dom && dow
        }
    }

    /// First matching minute strictly after `after`, or `None` if nothing
    /// matches within the search horizon (e.g. `0 0 30 2 *`).
    pub fn next_after(&self, after: NaiveDateTime) -> Option<NaiveDateTime> {
        let start = after.with_second(0)?.with_nanosecond(0)? + Duration::minutes(1);
        let limit = start.date().with_year(start.year() + SEARCH_YEARS)?;

        let midnight = NaiveTime::from_hms_opt(0, 0, 0)?;
        let mut date = start.date();
        let mut first_day = true;

        while date <= limit {
            if !self.months.contains(date.month()) {
                // jump to the first day of next month
                let (y, m) = if date.month() == 12 {
                    (date.year() + 1, 1)
                } else {
                    (date.year(), date.month() + 1)
                };
                date = NaiveDate::from_ymd_opt(y, m, 1)?;
                first_day = false;
                continue;
            }

            if self.day_matches(date) {
                let from = if first_day { start.time() } else { midnight };
                if let Some(time) = self.first_time_from(from) {
                    return Some(date.and_time(time));
                }
            }

            date = date.succ_opt()?;
            first_day = false;
        }

        None
    }

    fn first_time_from(&self, from: NaiveTime) -> Option<NaiveTime> {
        for hour in from.hour()..24 {
            if !self.hours.contains(hour) {
                continue;
            }
            let first_minute = if hour == from.hour() { from.minute() } else { 0 };
            for minute in first_minute..60 {
                if self.minutes.contains(minute) {
                    return NaiveTime::from_hms_opt(hour, minute, 0);
                }
            }
        }
        None
    }
}

/// Next run for `expression`, falling back to 24 hours after `now` when the
/// expression never fires within the search horizon.
pub fn estimate_next_run(expr: &CronExpr, now: NaiveDateTime) -> NaiveDateTime {
    expr.next_after(now)
        .unwrap_or_else(|| now + Duration::hours(24))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    #[test]
    fn accepts_common_expressions() {
        for expr in [
            "* * * * *",
            "0 2 * * *",
            "*/15 * * * *",
            "30 1 * * 1-5",
            "0 0 1,15 * *",
            "0 3 * * 7",
            "5/10 8-18/2 * 1-12 0",
        ] {
            assert!(CronExpr::parse(expr).is_ok(), "{expr} should parse");
        }
    }

    #[test]
    fn rejects_malformed_expressions() {
        for expr in [
            "",
            "* * * *",
            "* * * * * *",
            "60 * * * *",
            "* 24 * * *",
            "* * 0 * *",
            "* * * 13 *",
            "* * * * 8",
            "*/0 * * * *",
            "5-1 * * * *",
            "0 2 * * MON",
            "1,,2 * * * *",
        ] {
            assert!(CronExpr::parse(expr).is_err(), "{expr:?} should be rejected");
        }
    }

    #[test]
    fn daily_backup_runs_tonight_or_tomorrow() {
        let expr = CronExpr::parse("0 2 * * *").unwrap();
        assert_eq!(
            expr.next_after(at(2024, 3, 5, 1, 30)),
            Some(at(2024, 3, 5, 2, 0))
        );
        assert_eq!(
            expr.next_after(at(2024, 3, 5, 2, 0)),
            Some(at(2024, 3, 6, 2, 0))
        );
    }

    #[test]
    fn steps_within_the_hour() {
        let expr = CronExpr::parse("*/15 * * * *").unwrap();
        assert_eq!(
            expr.next_after(at(2024, 3, 5, 10, 16)),
            Some(at(2024, 3, 5, 10, 30))
        );
        assert_eq!(
            expr.next_after(at(2024, 3, 5, 23, 50)),
            Some(at(2024, 3, 6, 0, 0))
        );
    }

    #[test]
    fn weekdays_only() {
        // 2024-03-08 is a Friday
        let expr = CronExpr::parse("30 1 * * 1-5").unwrap();
        assert_eq!(
            expr.next_after(at(2024, 3, 8, 12, 0)),
            Some(at(2024, 3, 11, 1, 30))
        );
    }

    #[test]
    fn seven_means_sunday() {
        let expr = CronExpr::parse("0 3 * * 7").unwrap();
        // 2024-03-10 is a Sunday
        assert_eq!(
            expr.next_after(at(2024, 3, 5, 0, 0)),
            Some(at(2024, 3, 10, 3, 0))
        );
    }

    #[test]
    fn restricted_day_fields_are_ored() {
        // the 1st of the month OR any Monday
        let expr = CronExpr::parse("0 0 1 * 1").unwrap();
        // 2024-03-02 is a Saturday; next Monday is the 4th, before April 1st
        assert_eq!(
            expr.next_after(at(2024, 3, 2, 0, 0)),
            Some(at(2024, 3, 4, 0, 0))
        );
    }

    #[test]
    fn stepped_wildcard_days_are_anded() {
        // odd days of the month that are also Mondays
        let expr = CronExpr::parse("0 0 */2 * 1").unwrap();
        // 2024-03-04 is an even Monday, 2024-03-11 the first odd one
        assert_eq!(
            expr.next_after(at(2024, 3, 2, 0, 0)),
            Some(at(2024, 3, 11, 0, 0))
        );
    }

    #[test]
    fn skips_to_matching_month_and_leap_day() {
        let expr = CronExpr::parse("0 0 29 2 *").unwrap();
        assert_eq!(
            expr.next_after(at(2024, 3, 1, 0, 0)),
            Some(at(2028, 2, 29, 0, 0))
        );
    }

    #[test]
    fn impossible_dates_fall_back_to_a_day_later() {
        let expr = CronExpr::parse("0 0 31 2 *").unwrap();
        let now = at(2024, 3, 5, 10, 0);
        assert_eq!(expr.next_after(now), None);
        assert_eq!(estimate_next_run(&expr, now), at(2024, 3, 6, 10, 0));
    }
}
