//! CF time-axis decoding and calendar arithmetic.
//!
//! CMIP6 models store time as `<unit> since <epoch>` offsets in a variety of
//! calendars. Dates in the standard calendars decode straight to
//! [`NaiveDateTime`]; dates in the others stay as [`CalendarDate`] until the
//! normalizer converts them.

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use std::fmt;
use thiserror::Error;

/// Format used when a timestamp is rendered and re-parsed as text
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const SECONDS_PER_DAY: i64 = 86_400;

/// Days preceding each month in a 365-day year
const CUMULATIVE_DAYS: [i64; 12] = [0, 31, 59, 90, 120, 151, 181, 212, 243, 273, 304, 334];

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TimeError {
    #[error("Invalid time units: {0}")]
    InvalidUnits(String),

    #[error("Unsupported calendar: {0}")]
    UnsupportedCalendar(String),

    #[error("Date {0} does not exist in the {1} calendar")]
    NonexistentDate(String, String),

    #[error("Could not parse timestamp '{0}' as %Y-%m-%d %H:%M:%S")]
    UnparseableTimestamp(String),
}

/// CF calendars found across the ensemble
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Calendar {
    Standard,
    ProlepticGregorian,
    NoLeap,
    AllLeap,
    Day360,
    Julian,
}

impl Calendar {
    /// Parse the value of a CF `calendar` attribute
    pub fn from_cf(name: &str) -> Result<Self, TimeError> {
        match name.trim().to_lowercase().as_str() {
            "standard" | "gregorian" => Ok(Calendar::Standard),
            "proleptic_gregorian" => Ok(Calendar::ProlepticGregorian),
            "noleap" | "365_day" => Ok(Calendar::NoLeap),
            "all_leap" | "366_day" => Ok(Calendar::AllLeap),
            "360_day" => Ok(Calendar::Day360),
            "julian" => Ok(Calendar::Julian),
            other => Err(TimeError::UnsupportedCalendar(other.to_string())),
        }
    }

    /// Calendars whose dates map one-to-one onto `NaiveDateTime`
    pub fn is_standard(self) -> bool {
        matches!(self, Calendar::Standard | Calendar::ProlepticGregorian)
    }

    pub fn name(self) -> &'static str {
        match self {
            Calendar::Standard => "standard",
            Calendar::ProlepticGregorian => "proleptic_gregorian",
            Calendar::NoLeap => "noleap",
            Calendar::AllLeap => "all_leap",
            Calendar::Day360 => "360_day",
            Calendar::Julian => "julian",
        }
    }

    pub fn is_leap_year(self, year: i32) -> bool {
        match self {
            Calendar::Standard | Calendar::ProlepticGregorian => is_leap_year(year),
            Calendar::NoLeap | Calendar::Day360 => false,
            Calendar::AllLeap => true,
            Calendar::Julian => year.rem_euclid(4) == 0,
        }
    }

    /// Number of days in `month`, or `None` for an invalid month
    pub fn days_in_month(self, year: i32, month: u32) -> Option<u32> {
        if !(1..=12).contains(&month) {
            return None;
        }
        if self == Calendar::Day360 {
            return Some(30);
        }
        Some(match month {
            1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
            4 | 6 | 9 | 11 => 30,
            _ => {
                if self.is_leap_year(year) {
                    29
                } else {
                    28
                }
            }
        })
    }

    fn mean_year_length(self) -> f64 {
        match self {
            Calendar::Standard | Calendar::ProlepticGregorian => 365.2425,
            Calendar::NoLeap => 365.0,
            Calendar::AllLeap => 366.0,
            Calendar::Day360 => 360.0,
            Calendar::Julian => 365.25,
        }
    }

    /// Days from 0000-01-01 to the start of `year`
    fn days_before_year(self, year: i32) -> i64 {
        let y = year as i64;
        match self {
            Calendar::Standard | Calendar::ProlepticGregorian => {
                y * 365 + (y + 3).div_euclid(4) - (y + 99).div_euclid(100) + (y + 399).div_euclid(400)
            }
            Calendar::NoLeap => y * 365,
            Calendar::AllLeap => y * 366,
            Calendar::Day360 => y * 360,
            Calendar::Julian => y * 365 + (y + 3).div_euclid(4),
        }
    }

    fn days_before_month(self, year: i32, month: u32) -> i64 {
        if self == Calendar::Day360 {
            return (month as i64 - 1) * 30;
        }
        let leap_day = if month > 2 && self.is_leap_year(year) { 1 } else { 0 };
        CUMULATIVE_DAYS[(month - 1) as usize] + leap_day
    }

    /// Day number of a date counted from 0000-01-01 in this calendar
    fn day_number(self, year: i32, month: u32, day: u32) -> i64 {
        self.days_before_year(year) + self.days_before_month(year, month) + day as i64 - 1
    }

    /// Inverse of [`Calendar::day_number`]
    fn date_from_day_number(self, number: i64) -> (i32, u32, u32) {
        let mut year = (number as f64 / self.mean_year_length()).floor() as i32;
        while self.days_before_year(year) > number {
            year -= 1;
        }
        while self.days_before_year(year + 1) <= number {
            year += 1;
        }

        let day_of_year = number - self.days_before_year(year);
        let month = (1..=12u32)
            .rev()
            .find(|&m| self.days_before_month(year, m) <= day_of_year)
            .unwrap_or(1);
        let day = (day_of_year - self.days_before_month(year, month)) as u32 + 1;
        (year, month, day)
    }
}

impl fmt::Display for Calendar {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A date in an arbitrary CF calendar
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct CalendarDate {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
}

impl fmt::Display for CalendarDate {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            self.year, self.month, self.day, self.hour, self.minute, self.second
        )
    }
}

impl CalendarDate {
    pub fn new(year: i32, month: u32, day: u32) -> Self {
        Self {
            year,
            month,
            day,
            hour: 0,
            minute: 0,
            second: 0,
        }
    }

    pub fn with_time(self, hour: u32, minute: u32, second: u32) -> Self {
        Self {
            hour,
            minute,
            second,
            ..self
        }
    }

    pub fn is_valid_in(&self, calendar: Calendar) -> bool {
        let day_ok = calendar
            .days_in_month(self.year, self.month)
            .map_or(false, |days| (1..=days).contains(&self.day));
        day_ok && self.hour < 24 && self.minute < 60 && self.second < 60
    }

    /// Interpret the date in the proleptic Gregorian calendar
    pub fn to_datetime(&self) -> Result<NaiveDateTime, TimeError> {
        NaiveDate::from_ymd_opt(self.year, self.month, self.day)
            .and_then(|date| date.and_hms_opt(self.hour, self.minute, self.second))
            .ok_or_else(|| TimeError::NonexistentDate(self.to_string(), "standard".to_string()))
    }

    fn seconds_since_origin(&self, calendar: Calendar) -> Result<i64, TimeError> {
        if !self.is_valid_in(calendar) {
            return Err(TimeError::NonexistentDate(
                self.to_string(),
                calendar.name().to_string(),
            ));
        }
        let days = calendar.day_number(self.year, self.month, self.day);
        Ok(days * SECONDS_PER_DAY
            + self.hour as i64 * 3600
            + self.minute as i64 * 60
            + self.second as i64)
    }

    fn from_seconds_since_origin(calendar: Calendar, seconds: i64) -> Self {
        let days = seconds.div_euclid(SECONDS_PER_DAY);
        let time_of_day = seconds.rem_euclid(SECONDS_PER_DAY);
        let (year, month, day) = calendar.date_from_day_number(days);
        Self::new(year, month, day).with_time(
            (time_of_day / 3600) as u32,
            ((time_of_day % 3600) / 60) as u32,
            (time_of_day % 60) as u32,
        )
    }
}

/// One entry of a field's time axis
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TimeValue {
    /// A standard-calendar datetime
    Datetime(NaiveDateTime),
    /// A date in a non-standard calendar, not yet converted
    Calendar(CalendarDate, Calendar),
}

impl TimeValue {
    pub fn is_native(&self) -> bool {
        matches!(self, TimeValue::Datetime(_))
    }

    /// Convert to a standard datetime, failing for dates Gregorian does not have
    pub fn to_datetime(&self) -> Result<NaiveDateTime, TimeError> {
        match self {
            TimeValue::Datetime(dt) => Ok(*dt),
            TimeValue::Calendar(date, calendar) => date.to_datetime().map_err(|_| {
                TimeError::NonexistentDate(date.to_string(), format!("standard (from {calendar})"))
            }),
        }
    }

    /// Two-character month field of the timestamp.
    ///
    /// Native datetimes are formatted directly. Calendar dates go through the
    /// text path: rendered, parsed back with [`TIMESTAMP_FORMAT`] and
    /// re-rendered, which fails for dates with no Gregorian counterpart.
    pub fn month(&self) -> Result<u32, TimeError> {
        let text = match self {
            TimeValue::Datetime(dt) => dt.format(TIMESTAMP_FORMAT).to_string(),
            TimeValue::Calendar(date, _) => {
                let raw = date.to_string();
                NaiveDateTime::parse_from_str(&raw, TIMESTAMP_FORMAT)
                    .map_err(|_| TimeError::UnparseableTimestamp(raw.clone()))?
                    .format(TIMESTAMP_FORMAT)
                    .to_string()
            }
        };
        month_field(&text)
    }

    pub fn year(&self) -> i32 {
        match self {
            TimeValue::Datetime(dt) => dt.year(),
            TimeValue::Calendar(date, _) => date.year,
        }
    }

    /// `YYYY-MM-DD` label used for table rows
    pub fn label(&self) -> String {
        match self {
            TimeValue::Datetime(dt) => dt.format("%Y-%m-%d").to_string(),
            TimeValue::Calendar(date, _) => {
                format!("{:04}-{:02}-{:02}", date.year, date.month, date.day)
            }
        }
    }
}

fn month_field(text: &str) -> Result<u32, TimeError> {
    text.get(5..7)
        .and_then(|field| field.parse::<u32>().ok())
        .filter(|month| (1..=12).contains(month))
        .ok_or_else(|| TimeError::UnparseableTimestamp(text.to_string()))
}

/// Parsed `<unit> since <epoch>` attribute
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeUnits {
    pub seconds_per_unit: f64,
    pub epoch: CalendarDate,
}

/// Parse CF time units such as `days since 1850-01-01` or
/// `hours since 1800-1-1 00:00:00`
pub fn parse_time_units(units: &str) -> Result<TimeUnits, TimeError> {
    let invalid = || TimeError::InvalidUnits(units.to_string());
    let tokens: Vec<&str> = units.split_whitespace().collect();
    if tokens.len() < 3 || !tokens[1].eq_ignore_ascii_case("since") {
        return Err(invalid());
    }

    let seconds_per_unit = match tokens[0].to_lowercase().as_str() {
        "days" | "day" | "d" => 86_400.0,
        "hours" | "hour" | "hrs" | "hr" | "h" => 3_600.0,
        "minutes" | "minute" | "mins" | "min" => 60.0,
        "seconds" | "second" | "secs" | "sec" | "s" => 1.0,
        _ => return Err(invalid()),
    };

    let (date_part, inline_clock) = match tokens[2].split_once('T') {
        Some((date, clock)) => (date, Some(clock)),
        None => (tokens[2], None),
    };
    let (year, month, day) = parse_date_fields(date_part).ok_or_else(invalid)?;
    let clock = inline_clock.or_else(|| tokens.get(3).copied());
    let (hour, minute, second) = match clock {
        Some(text) => parse_clock_fields(text).ok_or_else(invalid)?,
        None => (0, 0, 0),
    };

    Ok(TimeUnits {
        seconds_per_unit,
        epoch: CalendarDate::new(year, month, day).with_time(hour, minute, second),
    })
}

fn parse_date_fields(text: &str) -> Option<(i32, u32, u32)> {
    let mut parts = text.split('-');
    let year = parts.next()?.parse().ok()?;
    let month = parts.next()?.parse().ok()?;
    let day = parts.next().map_or(Some(1), |d| d.parse().ok())?;
    Some((year, month, day))
}

fn parse_clock_fields(text: &str) -> Option<(u32, u32, u32)> {
    let text = text.trim_end_matches('Z');
    let mut parts = text.split(':');
    let hour = parts.next()?.parse().ok()?;
    let minute = parts.next().map_or(Some(0), |m| m.parse().ok())?;
    let second = parts
        .next()
        .map_or(Some(0.0), |s| s.parse::<f64>().ok())?
        .floor() as u32;
    Some((hour, minute, second))
}

/// Decode numeric offsets into time values.
///
/// Standard calendars yield [`TimeValue::Datetime`]; all others yield
/// [`TimeValue::Calendar`].
pub fn decode_time_axis(
    offsets: &[f64],
    units: &str,
    calendar: Calendar,
) -> Result<Vec<TimeValue>, TimeError> {
    let units = parse_time_units(units)?;
    let epoch = units.epoch.seconds_since_origin(calendar)?;

    offsets
        .iter()
        .map(|&offset| {
            if !offset.is_finite() {
                return Err(TimeError::InvalidUnits(format!(
                    "non-finite time offset {offset}"
                )));
            }
            let seconds = epoch + (offset * units.seconds_per_unit).round() as i64;
            let date = CalendarDate::from_seconds_since_origin(calendar, seconds);
            if calendar.is_standard() {
                Ok(TimeValue::Datetime(date.to_datetime()?))
            } else {
                Ok(TimeValue::Calendar(date, calendar))
            }
        })
        .collect()
}

/// Parse `YYYY-MM-DD`, `YYYY-MM-DD HH:MM:SS` or `YYYY-MM-DDTHH:MM:SS`
pub fn parse_datetime(text: &str) -> Result<NaiveDateTime, TimeError> {
    let err = || TimeError::UnparseableTimestamp(text.to_string());
    let (date_part, clock) = match text.split_once(['T', ' ']) {
        Some((date, clock)) => (date, Some(clock)),
        None => (text, None),
    };
    let (year, month, day) = parse_date_fields(date_part).ok_or_else(err)?;
    let (hour, minute, second) = match clock {
        Some(clock) => parse_clock_fields(clock).ok_or_else(err)?,
        None => (0, 0, 0),
    };
    CalendarDate::new(year, month, day)
        .with_time(hour, minute, second)
        .to_datetime()
        .map_err(|_| err())
}

/// Check if a year is a leap year
pub fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || (year % 400 == 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    fn calendar_date(value: &TimeValue) -> CalendarDate {
        match value {
            TimeValue::Calendar(date, _) => *date,
            TimeValue::Datetime(dt) => panic!("expected calendar date, got {dt}"),
        }
    }

    #[test]
    fn test_leap_year() {
        assert!(is_leap_year(2000));
        assert!(!is_leap_year(1900));
        assert!(is_leap_year(2004));
        assert!(!is_leap_year(2001));
    }

    #[test]
    fn test_calendar_names() {
        assert_eq!(Calendar::from_cf("gregorian").unwrap(), Calendar::Standard);
        assert_eq!(Calendar::from_cf("365_day").unwrap(), Calendar::NoLeap);
        assert_eq!(Calendar::from_cf(" 360_DAY ").unwrap(), Calendar::Day360);
        assert!(matches!(
            Calendar::from_cf("martian"),
            Err(TimeError::UnsupportedCalendar(_))
        ));
    }

    #[test]
    fn test_parse_time_units_variants() {
        let units = parse_time_units("days since 1800-1-1 00:00:00").unwrap();
        assert_eq!(units.seconds_per_unit, 86_400.0);
        assert_eq!(units.epoch, CalendarDate::new(1800, 1, 1));

        let units = parse_time_units("hours since 1850-01-16T12:00:00Z").unwrap();
        assert_eq!(units.seconds_per_unit, 3_600.0);
        assert_eq!(units.epoch, CalendarDate::new(1850, 1, 16).with_time(12, 0, 0));

        assert!(parse_time_units("days after 1850-01-01").is_err());
        assert!(parse_time_units("fortnights since 1850-01-01").is_err());
    }

    #[test]
    fn test_decode_standard_calendar() {
        let values =
            decode_time_axis(&[0.0, 1.5, 59.0], "days since 1900-01-01", Calendar::Standard)
                .unwrap();
        let first = values[0].to_datetime().unwrap();
        assert_eq!(first.date(), NaiveDate::from_ymd_opt(1900, 1, 1).unwrap());
        let second = values[1].to_datetime().unwrap();
        assert_eq!(second.hour(), 12);
        // 1900 is not a Gregorian leap year
        assert_eq!(
            values[2].to_datetime().unwrap().date(),
            NaiveDate::from_ymd_opt(1900, 3, 1).unwrap()
        );
        assert!(values.iter().all(TimeValue::is_native));
    }

    #[test]
    fn test_decode_julian_calendar_keeps_feb_29_1900() {
        let values = decode_time_axis(&[59.0], "days since 1900-01-01", Calendar::Julian).unwrap();
        assert_eq!(calendar_date(&values[0]), CalendarDate::new(1900, 2, 29));
    }

    #[test]
    fn test_decode_noleap_calendar() {
        let values =
            decode_time_axis(&[59.0, 365.0, 730.5], "days since 1850-01-01", Calendar::NoLeap)
                .unwrap();
        assert_eq!(calendar_date(&values[0]), CalendarDate::new(1850, 3, 1));
        assert_eq!(calendar_date(&values[1]), CalendarDate::new(1851, 1, 1));
        assert_eq!(
            calendar_date(&values[2]),
            CalendarDate::new(1852, 1, 1).with_time(12, 0, 0)
        );
    }

    #[test]
    fn test_decode_360_day_calendar() {
        let values =
            decode_time_axis(&[30.0, 59.0, 360.0], "days since 1850-01-01", Calendar::Day360)
                .unwrap();
        assert_eq!(calendar_date(&values[0]), CalendarDate::new(1850, 2, 1));
        assert_eq!(calendar_date(&values[1]), CalendarDate::new(1850, 2, 30));
        assert_eq!(calendar_date(&values[2]), CalendarDate::new(1851, 1, 1));
    }

    #[test]
    fn test_day_number_round_trip_across_calendars() {
        let calendars = [
            Calendar::Standard,
            Calendar::NoLeap,
            Calendar::AllLeap,
            Calendar::Day360,
            Calendar::Julian,
        ];
        for calendar in calendars {
            for (year, month, day) in [(1850, 1, 1), (1900, 2, 28), (2000, 12, 30), (2100, 6, 15)] {
                let number = calendar.day_number(year, month, day);
                assert_eq!(
                    calendar.date_from_day_number(number),
                    (year, month, day),
                    "{calendar}: {year}-{month}-{day}"
                );
            }
        }
    }

    #[test]
    fn test_month_native_and_fallback() {
        let native = TimeValue::Datetime(
            NaiveDate::from_ymd_opt(1999, 12, 16)
                .unwrap()
                .and_hms_opt(12, 0, 0)
                .unwrap(),
        );
        assert_eq!(native.month().unwrap(), 12);

        let noleap = TimeValue::Calendar(CalendarDate::new(1850, 2, 15), Calendar::NoLeap);
        assert_eq!(noleap.month().unwrap(), 2);
    }

    #[test]
    fn test_month_fallback_fails_for_nonexistent_gregorian_date() {
        let feb_30 = TimeValue::Calendar(CalendarDate::new(1850, 2, 30), Calendar::Day360);
        assert!(matches!(
            feb_30.month(),
            Err(TimeError::UnparseableTimestamp(_))
        ));
        assert!(matches!(
            feb_30.to_datetime(),
            Err(TimeError::NonexistentDate(_, _))
        ));
    }

    #[test]
    fn test_parse_datetime_formats() {
        let a = parse_datetime("2050-02-16T12:00:00").unwrap();
        let b = parse_datetime("2050-02-16 12:00:00").unwrap();
        assert_eq!(a, b);
        let c = parse_datetime("1851-01-01").unwrap();
        assert_eq!(c.hour(), 0);
        assert!(parse_datetime("not a date").is_err());
    }

    #[test]
    fn test_labels() {
        let date = TimeValue::Calendar(CalendarDate::new(1850, 1, 16), Calendar::NoLeap);
        assert_eq!(date.label(), "1850-01-16");
        assert_eq!(date.year(), 1850);
    }
}
