//! Shift windows and the injectable clock.
//!
//! A timeslot maps to a half-open interval of local wall-clock time:
//! `day` is `[08:00, 20:00)` of its date and `night` is `[20:00, 08:00 next day)`.
//! All comparisons happen in the site's local time, which the [`Clock`] supplies
//! as a fixed UTC offset.

use crate::{
    entities::Timeslot,
    errors::{Error, Result},
};
use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Utc};
use std::{
    str::FromStr,
    sync::{Mutex, PoisonError},
};

const DAY_START_HOUR: i64 = 8;
const NIGHT_START_HOUR: i64 = 20;
const SECONDS_PER_HOUR: i32 = 3600;

/// Source of the current local time.
pub trait Clock: Send + Sync {
    /// Current instant in the site's local time zone.
    fn now(&self) -> DateTime<FixedOffset>;

    /// Current calendar day in the site's local time zone.
    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }

    /// Current local wall-clock time without zone.
    fn local_now(&self) -> NaiveDateTime {
        self.now().naive_local()
    }
}

/// Wall clock at a fixed UTC offset.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    offset: FixedOffset,
}

impl SystemClock {
    /// Creates a clock for the given whole-hour offset from UTC.
    pub fn with_offset_hours(hours: i32) -> Result<Self> {
        let offset = hours
            .checked_mul(SECONDS_PER_HOUR)
            .and_then(FixedOffset::east_opt)
            .ok_or_else(|| Error::Config {
                message: format!("invalid UTC offset: {hours} hours"),
            })?;
        Ok(Self { offset })
    }

    /// The offset this clock reports in.
    #[must_use]
    pub const fn offset(&self) -> FixedOffset {
        self.offset
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<FixedOffset> {
        Utc::now().with_timezone(&self.offset)
    }
}

/// Clock frozen at a chosen instant; used by tests and replays.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<FixedOffset>>,
}

impl FixedClock {
    /// Freezes the clock at `now`.
    #[must_use]
    pub const fn new(now: DateTime<FixedOffset>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Freezes the clock at a local wall-clock time in the given zone.
    #[must_use]
    pub fn at_local(local: NaiveDateTime, offset: FixedOffset) -> Self {
        Self::new(DateTime::from_naive_utc_and_offset(local - offset, offset))
    }

    /// Moves the clock to a new local wall-clock time, keeping its zone.
    pub fn set_local(&self, local: NaiveDateTime) {
        let mut guard = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        let offset = *guard.offset();
        *guard = DateTime::from_naive_utc_and_offset(local - offset, offset);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<FixedOffset> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Where an instant falls relative to a shift window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShiftPhase {
    /// The shift has not started yet
    Upcoming,
    /// The instant is inside the window
    Active,
    /// The window is over
    Ended,
}

impl Timeslot {
    /// Returns the stored token for this timeslot.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Day => "day",
            Self::Night => "night",
        }
    }

    /// Human-readable label including the window hours.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Day => "Day shift (08:00-20:00)",
            Self::Night => "Night shift (20:00-08:00)",
        }
    }

    /// Half-open local window `[start, end)` of this shift on `date`.
    #[must_use]
    pub fn window(self, date: NaiveDate) -> (NaiveDateTime, NaiveDateTime) {
        let midnight = date.and_time(NaiveTime::MIN);
        let (start_hour, end_hour) = match self {
            Self::Day => (DAY_START_HOUR, NIGHT_START_HOUR),
            Self::Night => (NIGHT_START_HOUR, DAY_START_HOUR + 24),
        };
        (
            midnight + TimeDelta::hours(start_hour),
            midnight + TimeDelta::hours(end_hour),
        )
    }

    /// Local instant at which this shift on `date` ends.
    #[must_use]
    pub fn shift_end(self, date: NaiveDate) -> NaiveDateTime {
        self.window(date).1
    }

    /// Classifies `now` against this shift on `date`.
    #[must_use]
    pub fn phase_at(self, date: NaiveDate, now: NaiveDateTime) -> ShiftPhase {
        let (start, end) = self.window(date);
        if now < start {
            ShiftPhase::Upcoming
        } else if now < end {
            ShiftPhase::Active
        } else {
            ShiftPhase::Ended
        }
    }

    /// Whether the shift on `date` is over at `now`.
    #[must_use]
    pub fn has_ended(self, date: NaiveDate, now: NaiveDateTime) -> bool {
        now >= self.shift_end(date)
    }
}

impl FromStr for Timeslot {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "day" => Ok(Self::Day),
            "night" => Ok(Self::Night),
            other => Err(Error::invalid(format!(
                "timeslot must be \"day\" or \"night\", got {other:?}"
            ))),
        }
    }
}

/// Parses a `YYYY-MM-DD` calendar date.
pub fn parse_date(input: &str) -> Result<NaiveDate> {
    let trimmed = input.trim();
    if trimmed.len() != 10 {
        return Err(Error::invalid(format!(
            "date must be YYYY-MM-DD, got {input:?}"
        )));
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .map_err(|e| Error::invalid(format!("date must be YYYY-MM-DD, got {input:?}: {e}")))
}

/// Inclusive range of days covering one calendar month.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonthRange {
    /// First day of the month
    pub first: NaiveDate,
    /// Last day of the month
    pub last: NaiveDate,
}

impl MonthRange {
    /// Range of the month containing `date`.
    pub fn containing(date: NaiveDate) -> Result<Self> {
        let first = date.with_day(1).ok_or_else(|| Error::invalid("invalid month"))?;
        let next_month = if first.month() == 12 {
            NaiveDate::from_ymd_opt(first.year() + 1, 1, 1)
        } else {
            NaiveDate::from_ymd_opt(first.year(), first.month() + 1, 1)
        };
        let last = next_month
            .and_then(|d| d.pred_opt())
            .ok_or_else(|| Error::invalid("month out of range"))?;
        Ok(Self { first, last })
    }

    /// Formats the month as `YYYY-MM`.
    #[must_use]
    pub fn label(&self) -> String {
        self.first.format("%Y-%m").to_string()
    }
}

/// Parses a `YYYY-MM` month.
pub fn parse_month(input: &str) -> Result<MonthRange> {
    let trimmed = input.trim();
    if trimmed.len() != 7 {
        return Err(Error::invalid(format!("month must be YYYY-MM, got {input:?}")));
    }
    let first = NaiveDate::parse_from_str(&format!("{trimmed}-01"), "%Y-%m-%d")
        .map_err(|e| Error::invalid(format!("month must be YYYY-MM, got {input:?}: {e}")))?;
    MonthRange::containing(first)
}
