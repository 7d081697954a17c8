//! DST transition policies for wall-clock times.
//!
//! Working-window boundaries, floating event times and all-day dates are all expressed
//! as local wall-clock times that must be pinned to an instant in the configured zone.

use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// Policy for local times that fall inside a DST gap (e.g. 02:30 during spring forward).
///
/// Ambiguous times (the repeated hour in autumn) always resolve to the earlier instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DstPolicy {
    /// Drop the time entirely.
    Skip,
    /// Keep the pre-transition UTC offset, which lands the instant after the gap
    /// (02:30 becomes 03:30 on a one-hour spring-forward).
    #[default]
    ShiftForward,
}

/// Pin a local wall-clock time in `tz` to an instant.
///
/// Returns `None` only when the time does not exist and the policy is [`DstPolicy::Skip`].
pub fn resolve_local(tz: Tz, local: NaiveDateTime, policy: DstPolicy) -> Option<DateTime<Tz>> {
    match tz.from_local_datetime(&local) {
        LocalResult::Single(dt) => Some(dt),
        LocalResult::Ambiguous(earliest, _) => Some(earliest),
        LocalResult::None => match policy {
            DstPolicy::Skip => None,
            DstPolicy::ShiftForward => {
                // Gaps are at most a few hours; the offset just before one is the offset
                // the clock still showed when it reached this wall time.
                let before = local - Duration::hours(3);
                let offset = tz.offset_from_local_datetime(&before).earliest()?;
                let utc = local - Duration::seconds(i64::from(offset_seconds(&offset)));
                Some(tz.from_utc_datetime(&utc))
            }
        },
    }
}

/// First instant of `date` in `tz`.
///
/// Midnight itself can fall in a gap in a handful of zones, so this always shifts
/// forward rather than dropping the day.
pub fn start_of_day(tz: Tz, date: NaiveDate) -> Option<DateTime<Tz>> {
    resolve_local(tz, date.and_time(NaiveTime::MIN), DstPolicy::ShiftForward)
}

fn offset_seconds(offset: &<Tz as TimeZone>::Offset) -> i32 {
    use chrono::Offset;
    offset.fix().local_minus_utc()
}
