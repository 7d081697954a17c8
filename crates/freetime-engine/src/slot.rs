//! Core time types shared by every pipeline stage.

use chrono::{DateTime, Datelike, Days, Duration, NaiveDate, NaiveTime, Utc, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::dst::{self, DstPolicy};
use crate::error::ConfigError;

/// A half-open interval `[start, end)` with `start < end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct TimeSlot {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TimeSlot {
    /// Returns `None` for zero-length or inverted intervals.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Option<Self> {
        (start < end).then_some(Self { start, end })
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &TimeSlot) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains(&self, other: &TimeSlot) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// The part of `self` inside `bounds`, if any.
    pub fn clip(&self, bounds: &TimeSlot) -> Option<TimeSlot> {
        TimeSlot::new(self.start.max(bounds.start), self.end.min(bounds.end))
    }
}

/// One busy calendar entry, or one occurrence of a recurring entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusyEvent {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub summary: String,
    pub is_all_day: bool,
    pub is_recurring_instance: bool,
    /// Always `false` for events produced by the feed parser; hand-built events marked
    /// transparent are ignored by the merger.
    pub is_transparent: bool,
}

impl BusyEvent {
    /// The event as a slot, or `None` when it has no positive length.
    pub fn slot(&self) -> Option<TimeSlot> {
        TimeSlot::new(self.start, self.end)
    }
}

/// The fixed horizon `[start, end)` over which availability is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SearchRange {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl SearchRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, ConfigError> {
        if start >= end {
            return Err(ConfigError::InvalidRange {
                start: start.to_rfc3339(),
                end: end.to_rfc3339(),
            });
        }
        Ok(Self { start, end })
    }

    /// `days` whole calendar days in `tz`, starting at the beginning of `first_day`.
    pub fn starting_on(first_day: NaiveDate, days: u32, tz: Tz) -> Result<Self, ConfigError> {
        let last_exclusive = first_day
            .checked_add_days(Days::new(u64::from(days)))
            .ok_or_else(|| ConfigError::InvalidRange {
                start: first_day.to_string(),
                end: format!("{first_day} + {days} days"),
            })?;
        let start = day_boundary(tz, first_day)?;
        let end = day_boundary(tz, last_exclusive)?;
        Self::new(start, end)
    }

    /// Monday-to-Sunday (or whichever `week_start`) of the calendar week after `today`.
    pub fn next_week(today: NaiveDate, week_start: Weekday, tz: Tz) -> Result<Self, ConfigError> {
        let back = (7 + today.weekday().num_days_from_monday() - week_start.num_days_from_monday()) % 7;
        let next_week = today
            .checked_sub_days(Days::new(u64::from(back)))
            .and_then(|this_week| this_week.checked_add_days(Days::new(7)))
            .ok_or_else(|| ConfigError::InvalidRange {
                start: today.to_string(),
                end: today.to_string(),
            })?;
        Self::starting_on(next_week, 7, tz)
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn as_slot(&self) -> TimeSlot {
        TimeSlot {
            start: self.start,
            end: self.end,
        }
    }

    /// `end > range.start && start < range.end`
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        end > self.start && start < self.end
    }

    /// Every calendar date in `tz` that the range touches, in order.
    pub fn days(&self, tz: Tz) -> impl Iterator<Item = NaiveDate> {
        let first = self.start.with_timezone(&tz).date_naive();
        // The end is exclusive: a range ending exactly at midnight does not touch that day.
        let last = (self.end - Duration::nanoseconds(1))
            .with_timezone(&tz)
            .date_naive();
        first.iter_days().take_while(move |d| *d <= last)
    }
}

/// The daily time-of-day window applied to every calendar day in the range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkingWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
    /// The window runs to the start of the next day (`24:00`); `end` is ignored.
    pub ends_at_midnight: bool,
    pub time_zone: Tz,
    pub dst_policy: DstPolicy,
}

impl WorkingWindow {
    pub fn new(start: NaiveTime, end: NaiveTime, time_zone: Tz) -> Self {
        Self {
            start,
            end,
            ends_at_midnight: false,
            time_zone,
            dst_policy: DstPolicy::default(),
        }
    }

    /// Parse `HH:MM` bounds. The end may also be `24:00`, meaning the end of the day;
    /// an end of `00:00` is the start of the same day and leaves no window.
    pub fn parse(start: &str, end: &str, time_zone: Tz) -> Result<Self, ConfigError> {
        if is_end_of_day(end) {
            return Ok(Self {
                ends_at_midnight: true,
                ..Self::new(parse_time_of_day(start)?, NaiveTime::MIN, time_zone)
            });
        }
        Ok(Self::new(
            parse_time_of_day(start)?,
            parse_time_of_day(end)?,
            time_zone,
        ))
    }

    /// The `[dayStart, dayEnd)` slot for one calendar day.
    ///
    /// `None` when the window is degenerate (end not after start) or when a bound falls
    /// in a DST gap that the policy skips.
    pub fn on(&self, day: NaiveDate) -> Option<TimeSlot> {
        let start = dst::resolve_local(self.time_zone, day.and_time(self.start), self.dst_policy)?;
        let end = if self.ends_at_midnight {
            dst::start_of_day(self.time_zone, day.succ_opt()?)?
        } else {
            dst::resolve_local(self.time_zone, day.and_time(self.end), self.dst_policy)?
        };
        TimeSlot::new(start.with_timezone(&Utc), end.with_timezone(&Utc))
    }
}

/// Parse a `HH:MM` (or `HH:MM:SS`) time of day.
pub fn parse_time_of_day(value: &str) -> Result<NaiveTime, ConfigError> {
    let trimmed = value.trim();
    NaiveTime::parse_from_str(trimmed, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M:%S"))
        .map_err(|_| ConfigError::InvalidTimeOfDay(value.to_string()))
}

fn is_end_of_day(value: &str) -> bool {
    matches!(value.trim(), "24:00" | "24:00:00")
}

fn day_boundary(tz: Tz, date: NaiveDate) -> Result<DateTime<Utc>, ConfigError> {
    dst::start_of_day(tz, date)
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| ConfigError::InvalidRange {
            start: date.to_string(),
            end: date.to_string(),
        })
}
