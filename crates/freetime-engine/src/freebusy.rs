//! Compute free time slots from merged busy intervals.
//!
//! For each calendar day in the search range, the working window is walked with a cursor:
//! every gap before a busy interval becomes a free slot, the cursor jumps past the busy
//! interval, and the remainder up to the end of the window is the last free slot.

use chrono::Duration;
use tracing::debug;

use crate::slot::{SearchRange, TimeSlot, WorkingWindow};

/// Derive one source's free slots.
///
/// `busy` must be sorted and non-overlapping (the output of [`crate::merge::merge_slots`]).
/// Each day's window is clipped to `range`; days whose window is empty are skipped.
/// Gaps shorter than `min_duration` are discarded.
pub fn derive_free_slots(
    busy: &[TimeSlot],
    range: &SearchRange,
    window: &WorkingWindow,
    min_duration: Duration,
) -> Vec<TimeSlot> {
    let mut free_slots = Vec::new();
    let bounds = range.as_slot();

    for day in range.days(window.time_zone) {
        let Some(day_window) = window.on(day).and_then(|w| w.clip(&bounds)) else {
            debug!(%day, "no working window on this day");
            continue;
        };
        free_slots.extend(free_in_window(busy, &day_window, min_duration));
    }

    free_slots
}

/// Free slots inside one `[dayStart, dayEnd)` window.
pub fn free_in_window(busy: &[TimeSlot], day: &TimeSlot, min_duration: Duration) -> Vec<TimeSlot> {
    let mut free_slots = Vec::new();
    let mut emit = |slot: Option<TimeSlot>| {
        if let Some(slot) = slot.filter(|s| s.duration() >= min_duration) {
            free_slots.push(slot);
        }
    };

    // Busy intervals are sorted by start and disjoint, so their ends are sorted too.
    let first = busy.partition_point(|slot| slot.end() <= day.start());
    let mut cursor = day.start();

    for slot in busy[first..].iter().take_while(|slot| slot.start() < day.end()) {
        let Some(clipped) = slot.clip(day) else {
            continue;
        };
        if cursor < clipped.start() {
            emit(TimeSlot::new(cursor, clipped.start()));
        }
        cursor = cursor.max(clipped.end());
    }

    // Trailing free slot after the last busy period.
    if cursor < day.end() {
        emit(TimeSlot::new(cursor, day.end()));
    }

    free_slots
}
