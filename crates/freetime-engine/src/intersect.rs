//! Intersect free-slot lists across calendar sources.
//!
//! Two sorted, disjoint lists are intersected with a two-pointer scan that advances
//! whichever slot ends first, so each slot is visited once. N lists fold pairwise and
//! stop as soon as the running intersection is empty.

use crate::slot::TimeSlot;

/// Intervals free in both `a` and `b`.
///
/// Both inputs must be sorted ascending and non-overlapping; so is the output.
pub fn intersect(a: &[TimeSlot], b: &[TimeSlot]) -> Vec<TimeSlot> {
    let mut common = Vec::new();
    let (mut i, mut j) = (0, 0);

    while i < a.len() && j < b.len() {
        let (x, y) = (&a[i], &b[j]);
        if let Some(overlap) = x.clip(y) {
            common.push(overlap);
        }
        // Advance whichever ends first; on a tie both are exhausted.
        match x.end().cmp(&y.end()) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                i += 1;
                j += 1;
            }
        }
    }

    common
}

/// Fold any number of free-slot lists into their common intersection.
///
/// Zero lists yield an empty result. Later lists are never read once the running
/// intersection is empty.
pub fn intersect_all<I>(lists: I) -> Vec<TimeSlot>
where
    I: IntoIterator<Item = Vec<TimeSlot>>,
{
    let mut lists = lists.into_iter();
    let Some(mut common) = lists.next() else {
        return Vec::new();
    };
    for list in lists {
        if common.is_empty() {
            break;
        }
        common = intersect(&common, &list);
    }
    common
}
