//! Wall-clock arithmetic for the weekly meeting slot.
//!
//! Rooms meet once a week on a named weekday. Times carry minute granularity
//! and no date: adding an interval that crosses midnight wraps the clock
//! (`23:30 + 1h = 00:30`) rather than rolling the day over. No timezone
//! normalization happens anywhere in this module.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDateTime, Timelike};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

const MINUTES_PER_HOUR: u16 = 60;
const MINUTES_PER_DAY: u16 = 24 * MINUTES_PER_HOUR;

/// Day of the week, indexed Sunday = 0 to match the week the room board uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Weekday {
    Sunday,
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
}

impl Weekday {
    pub const ALL: [Weekday; 7] = [
        Weekday::Sunday,
        Weekday::Monday,
        Weekday::Tuesday,
        Weekday::Wednesday,
        Weekday::Thursday,
        Weekday::Friday,
        Weekday::Saturday,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Weekday::Sunday => "Sunday",
            Weekday::Monday => "Monday",
            Weekday::Tuesday => "Tuesday",
            Weekday::Wednesday => "Wednesday",
            Weekday::Thursday => "Thursday",
            Weekday::Friday => "Friday",
            Weekday::Saturday => "Saturday",
        }
    }

    /// Position in the week, Sunday = 0.
    pub fn index(self) -> u8 {
        self as u8
    }

    pub fn next(self) -> Weekday {
        Weekday::ALL[(self.index() as usize + 1) % 7]
    }

    pub fn of(now: &NaiveDateTime) -> Weekday {
        Weekday::from(now.weekday())
    }
}

impl From<chrono::Weekday> for Weekday {
    fn from(day: chrono::Weekday) -> Self {
        Weekday::ALL[day.num_days_from_sunday() as usize]
    }
}

impl fmt::Display for Weekday {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseTimeError(pub String);

impl fmt::Display for ParseTimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for ParseTimeError {}

impl FromStr for Weekday {
    type Err = ParseTimeError;

    /// Accepts full English day names, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Weekday::ALL
            .into_iter()
            .find(|day| day.name().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| ParseTimeError(format!("'{}' is not a weekday name", s)))
    }
}

/// A wall-clock time with minute granularity, `00:00` through `23:59`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClockTime {
    minutes: u16,
}

impl ClockTime {
    pub fn new(hour: u16, minute: u16) -> Option<Self> {
        if hour < 24 && minute < MINUTES_PER_HOUR {
            Some(Self {
                minutes: hour * MINUTES_PER_HOUR + minute,
            })
        } else {
            None
        }
    }

    pub fn from_minutes(minutes: u16) -> Self {
        Self {
            minutes: minutes % MINUTES_PER_DAY,
        }
    }

    /// Minutes since midnight.
    pub fn minutes(self) -> u16 {
        self.minutes
    }

    pub fn hour(self) -> u16 {
        self.minutes / MINUTES_PER_HOUR
    }

    pub fn minute(self) -> u16 {
        self.minutes % MINUTES_PER_HOUR
    }

    /// Truncates seconds.
    pub fn of(now: &NaiveDateTime) -> ClockTime {
        Self::from_minutes((now.hour() * 60 + now.minute()) as u16)
    }

    /// `self + hours`, wrapping past midnight onto the same clock face.
    pub fn add_hours(self, hours: u8) -> ClockTime {
        let added = u32::from(self.minutes) + u32::from(hours) * u32::from(MINUTES_PER_HOUR);
        Self::from_minutes((added % u32::from(MINUTES_PER_DAY)) as u16)
    }

    /// Forward distance from `self` to `end`, wrapping through midnight when
    /// `end` is earlier on the clock.
    pub fn minutes_until(self, end: ClockTime) -> u16 {
        (end.minutes + MINUTES_PER_DAY - self.minutes) % MINUTES_PER_DAY
    }
}

impl fmt::Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour(), self.minute())
    }
}

impl FromStr for ClockTime {
    type Err = ParseTimeError;

    /// Parses `HH:MM`, also tolerating a trailing `:SS` which is discarded.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseTimeError(format!("'{}' is not a valid HH:MM time", s));
        let digits = |p: &&str| p.bytes().all(|b| b.is_ascii_digit());
        let mut parts = s.trim().split(':');
        let hour: u16 = parts
            .next()
            .filter(|p| !p.is_empty() && p.len() <= 2)
            .filter(digits)
            .and_then(|p| p.parse().ok())
            .ok_or_else(invalid)?;
        let minute: u16 = parts
            .next()
            .filter(|p| p.len() == 2)
            .filter(digits)
            .and_then(|p| p.parse().ok())
            .ok_or_else(invalid)?;
        if let Some(seconds) = parts.next() {
            let valid = seconds.len() == 2
                && digits(&seconds)
                && seconds.parse::<u16>().map(|s| s < 60).unwrap_or(false);
            if !valid {
                return Err(invalid());
            }
        }
        if parts.next().is_some() {
            return Err(invalid());
        }
        ClockTime::new(hour, minute).ok_or_else(invalid)
    }
}

/// Whether `now` falls inside the slot `[start, end]` on its own weekday.
///
/// A wrapped slot (end before start) only covers `now >= start`; the
/// post-midnight tail belongs to the following day.
pub fn within_slot(start: ClockTime, end: ClockTime, now: ClockTime) -> bool {
    if start <= end {
        start <= now && now <= end
    } else {
        now >= start
    }
}

macro_rules! string_serde {
    ($ty:ty) => {
        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                raw.parse().map_err(serde::de::Error::custom)
            }
        }

        impl ToSql for $ty {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.to_string()))
            }
        }

        impl FromSql for $ty {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse()
                    .map_err(|e: ParseTimeError| FromSqlError::Other(Box::new(e)))
            }
        }
    };
}

string_serde!(Weekday);
string_serde!(ClockTime);
