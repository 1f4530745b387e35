//! Conversion between human-readable dates/durations and seconds since the origin.
//!
//! Every instant in the engine is a number of seconds elapsed since
//! 1900-01-01 00:00 under the configured calendar. Dates are written as
//! `year 2010 month 01 day 15 at 06:00` and durations as
//! `0030 day(s) 12 hour(s) 00 minute(s)`.

use chrono::{Datelike, NaiveDate, NaiveDateTime, TimeDelta, Timelike};

use crate::error::{SimError, SimResult};
use crate::units::{ONE_DAY, ONE_HOUR, ONE_MINUTE};

pub const ORIGIN_YEAR: i32 = 1900;

const NOLEAP_MONTH_EDGES: [i64; 13] = [0, 31, 59, 90, 120, 151, 181, 212, 243, 273, 304, 334, 365];

/// Calendar used to convert dates to seconds. Never affects step arithmetic.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Calendar {
    /// Interannual proleptic Gregorian calendar.
    #[default]
    Gregorian,
    /// 365-day years without leap days.
    NoLeap,
    /// Climatological 360-day years of twelve 30-day months.
    Climatological,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CalendarDate {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
}

impl Calendar {
    pub fn from_name(name: &str) -> SimResult<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "gregorian" | "standard" | "interannual" => Ok(Self::Gregorian),
            "noleap" | "no_leap" | "365_day" => Ok(Self::NoLeap),
            "360_day" | "climato" | "climatology" | "climatological" => Ok(Self::Climatological),
            other => Err(SimError::invalid(
                "app.time.calendar",
                other,
                "expected gregorian, noleap or 360_day",
            )),
        }
    }

    pub fn parse_date(&self, text: &str) -> SimResult<f64> {
        let date = CalendarDate::parse(text)?;
        self.to_seconds(&date)
    }

    pub fn format_date(&self, seconds: f64) -> String {
        match self.to_date(seconds) {
            Ok(date) => date.to_string(),
            Err(_) => format!("{seconds} seconds since origin"),
        }
    }

    pub fn to_seconds(&self, date: &CalendarDate) -> SimResult<f64> {
        let invalid = || SimError::invalid("date", date, "no such date in calendar");
        if date.hour > 23 || date.minute > 59 || date.month == 0 || date.month > 12 {
            return Err(invalid());
        }
        let time_of_day = i64::from(date.hour) * ONE_HOUR + i64::from(date.minute) * ONE_MINUTE;
        let years = i64::from(date.year - ORIGIN_YEAR);
        let month = date.month as usize;
        let day = i64::from(date.day);
        let days = match self {
            Self::Gregorian => {
                let when = NaiveDate::from_ymd_opt(date.year, date.month, date.day)
                    .and_then(|day| day.and_hms_opt(date.hour, date.minute, 0))
                    .ok_or_else(invalid)?;
                return Ok((when - origin()).num_seconds() as f64);
            }
            Self::NoLeap => {
                let month_length = NOLEAP_MONTH_EDGES[month] - NOLEAP_MONTH_EDGES[month - 1];
                if day < 1 || day > month_length {
                    return Err(invalid());
                }
                years * 365 + NOLEAP_MONTH_EDGES[month - 1] + day - 1
            }
            Self::Climatological => {
                if !(1..=30).contains(&day) {
                    return Err(invalid());
                }
                years * 360 + (month as i64 - 1) * 30 + day - 1
            }
        };
        Ok((days * ONE_DAY + time_of_day) as f64)
    }

    pub fn to_date(&self, seconds: f64) -> SimResult<CalendarDate> {
        let whole = seconds.floor() as i64;
        match self {
            Self::Gregorian => {
                let delta = TimeDelta::try_seconds(whole).ok_or_else(|| {
                    SimError::invalid("time", seconds, "outside the representable date range")
                })?;
                let when = origin().checked_add_signed(delta).ok_or_else(|| {
                    SimError::invalid("time", seconds, "outside the representable date range")
                })?;
                Ok(CalendarDate {
                    year: when.year(),
                    month: when.month(),
                    day: when.day(),
                    hour: when.hour(),
                    minute: when.minute(),
                })
            }
            Self::NoLeap | Self::Climatological => {
                let year_length = if *self == Self::NoLeap { 365 } else { 360 };
                let days = whole.div_euclid(ONE_DAY);
                let time_of_day = whole.rem_euclid(ONE_DAY);
                let year = ORIGIN_YEAR as i64 + days.div_euclid(year_length);
                let day_of_year = days.rem_euclid(year_length);
                let (month, day) = if *self == Self::NoLeap {
                    let month = NOLEAP_MONTH_EDGES
                        .iter()
                        .position(|&edge| day_of_year < edge)
                        .unwrap_or(12);
                    (month as u32, day_of_year - NOLEAP_MONTH_EDGES[month - 1] + 1)
                } else {
                    ((day_of_year / 30 + 1) as u32, day_of_year % 30 + 1)
                };
                Ok(CalendarDate {
                    year: year as i32,
                    month,
                    day: day as u32,
                    hour: (time_of_day / ONE_HOUR) as u32,
                    minute: ((time_of_day % ONE_HOUR) / ONE_MINUTE) as u32,
                })
            }
        }
    }
}

fn origin() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(ORIGIN_YEAR, 1, 1)
        .and_then(|day| day.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}

impl CalendarDate {
    /// Parse `year YYYY month MM day DD [at HH:MM]`.
    pub fn parse(text: &str) -> SimResult<Self> {
        let invalid = |reason: &str| SimError::invalid("date", text, reason.to_string());
        let mut tokens = text.split_whitespace();
        let mut field = |name: &str| -> SimResult<i64> {
            match (tokens.next(), tokens.next()) {
                (Some(label), Some(value)) if label.eq_ignore_ascii_case(name) => value
                    .parse::<i64>()
                    .map_err(|_| invalid(&format!("{name} is not a number"))),
                _ => Err(invalid(&format!("expected `{name} <number>`"))),
            }
        };
        let year = field("year")?;
        let month = field("month")?;
        let day = field("day")?;
        let (hour, minute) = match (tokens.next(), tokens.next()) {
            (None, _) => (0, 0),
            (Some(at), Some(clock)) if at.eq_ignore_ascii_case("at") => {
                let (hour, minute) = clock
                    .split_once(':')
                    .ok_or_else(|| invalid("expected HH:MM after `at`"))?;
                let hour = hour
                    .parse::<u32>()
                    .map_err(|_| invalid("hour is not a number"))?;
                let minute = minute
                    .parse::<u32>()
                    .map_err(|_| invalid("minute is not a number"))?;
                (hour, minute)
            }
            _ => return Err(invalid("expected `at HH:MM`")),
        };
        if !(1..=12).contains(&month) || !(1..=31).contains(&day) {
            return Err(invalid("month or day out of range"));
        }
        Ok(Self {
            year: year as i32,
            month: month as u32,
            day: day as u32,
            hour,
            minute,
        })
    }
}

impl std::fmt::Display for CalendarDate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "year {} month {:02} day {:02} at {:02}:{:02}",
            self.year, self.month, self.day, self.hour, self.minute
        )
    }
}

/// Parse `D day(s) H hour(s) M minute(s)` into seconds. Missing parts count as zero.
pub fn parse_duration(text: &str) -> SimResult<f64> {
    let invalid = |reason: &str| SimError::invalid("duration", text, reason.to_string());
    let tokens: Vec<&str> = text.split_whitespace().collect();
    if tokens.is_empty() || tokens.len() % 2 != 0 {
        return Err(invalid("expected `<number> <unit>` pairs"));
    }
    let mut seconds = 0i64;
    for pair in tokens.chunks(2) {
        let amount = pair[0]
            .parse::<i64>()
            .map_err(|_| invalid("amount is not an integer"))?;
        let unit = pair[1].to_ascii_lowercase();
        let scale = if unit.starts_with("day") {
            ONE_DAY
        } else if unit.starts_with("hour") {
            ONE_HOUR
        } else if unit.starts_with("minute") {
            ONE_MINUTE
        } else {
            return Err(invalid("unit must be day(s), hour(s) or minute(s)"));
        };
        seconds = amount
            .checked_mul(scale)
            .and_then(|part| seconds.checked_add(part))
            .ok_or_else(|| invalid("duration overflows"))?;
    }
    Ok(seconds as f64)
}

pub fn format_duration(seconds: f64) -> String {
    let total = seconds.abs().round() as i64;
    let days = total / ONE_DAY;
    let hours = (total % ONE_DAY) / ONE_HOUR;
    let minutes = (total % ONE_HOUR) / ONE_MINUTE;
    format!("{days:04} day(s) {hours:02} hour(s) {minutes:02} minute(s)")
}
