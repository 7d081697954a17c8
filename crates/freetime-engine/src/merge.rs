//! Collapse busy intervals into a minimal sorted set.
//!
//! Sorts by start, then folds left to right: an interval starting at or within
//! `tolerance` of the current block's end extends it, anything later opens a new block.
//! Back-to-back meetings separated by a few seconds become one blocked span.

use chrono::Duration;

use crate::slot::{BusyEvent, TimeSlot};

/// Gap, in seconds, at or below which two busy intervals count as touching.
pub const DEFAULT_MERGE_TOLERANCE_SECS: i64 = 60;

/// Merge overlapping or touching slots.
///
/// Returns a sorted, non-overlapping list no longer than the input; every gap between
/// consecutive output slots is strictly greater than `tolerance`.
pub fn merge_slots<I>(slots: I, tolerance: Duration) -> Vec<TimeSlot>
where
    I: IntoIterator<Item = TimeSlot>,
{
    let mut intervals: Vec<TimeSlot> = slots.into_iter().collect();

    // Sort by start time (then by end time for stability).
    intervals.sort_by_key(|slot| (slot.start(), slot.end()));

    let mut merged: Vec<TimeSlot> = Vec::with_capacity(intervals.len());
    for slot in intervals {
        if let Some(last) = merged.last_mut() {
            if slot.start() <= last.end() + tolerance {
                if slot.end() > last.end() {
                    if let Some(extended) = TimeSlot::new(last.start(), slot.end()) {
                        *last = extended;
                    }
                }
                continue;
            }
        }
        merged.push(slot);
    }

    merged
}

/// Merge the blocking events of one source.
///
/// Transparent and zero-length events are ignored.
pub fn merge_busy(events: &[BusyEvent], tolerance: Duration) -> Vec<TimeSlot> {
    merge_slots(
        events
            .iter()
            .filter(|event| !event.is_transparent)
            .filter_map(BusyEvent::slot),
        tolerance,
    )
}
