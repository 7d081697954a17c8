//! Feed parsing and busy-event extraction.
//!
//! Turns a raw iCalendar payload into the [`BusyEvent`]s that overlap a [`SearchRange`].
//! A payload that is not a calendar document fails as a whole with [`ParseError`]; a
//! single bad entry is recorded in [`ParsedFeed::skipped`] and the rest still parse.

use std::collections::HashMap;
use std::io::BufReader;

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use ical::parser::ical::component::IcalEvent;
use ical::IcalParser;
use tracing::{debug, warn};

use crate::dst;
use crate::entry::{CalendarEntry, EntryTime, Span, TimeContext};
use crate::error::{EntryError, ParseError};
use crate::expander::{self, Exclusions};
use crate::slot::{BusyEvent, SearchRange};

/// An entry that could not be processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedEntry {
    /// `SUMMARY` (or `UID`) when one could be read.
    pub label: String,
    pub error: EntryError,
}

/// Result of parsing one feed: busy events plus entries that were skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedFeed {
    /// Unsorted; ordering is the merger's job.
    pub events: Vec<BusyEvent>,
    pub skipped: Vec<SkippedEntry>,
}

/// Parse `payload` and extract busy events overlapping `range`.
///
/// Transparent and cancelled entries are dropped. All-day entries cover whole days in
/// the context zone. Recurring entries are expanded lazily within the range only.
///
/// # Errors
/// Returns `ParseError` if the payload holds no calendar or its structure is malformed.
pub fn parse_feed(
    payload: &str,
    range: &SearchRange,
    ctx: &TimeContext,
) -> Result<ParsedFeed, ParseError> {
    let raw_events = read_events(payload)?;
    debug!(entries = raw_events.len(), "parsed calendar document");

    let mut entries = Vec::with_capacity(raw_events.len());
    let mut feed = ParsedFeed::default();
    for raw in &raw_events {
        match CalendarEntry::from_properties(&raw.properties, ctx) {
            Ok(entry) => entries.push(entry),
            Err(error) => skip(&mut feed, label_of(raw), error),
        }
    }

    let overrides = collect_overrides(&entries);

    for entry in &entries {
        if !entry.is_blocking() {
            debug!(summary = %entry.summary, "skipping non-blocking entry");
            continue;
        }
        let result = if entry.is_recurring() && entry.recurrence_id.is_none() {
            let overridden = entry
                .uid
                .as_ref()
                .and_then(|uid| overrides.get(uid))
                .cloned()
                .unwrap_or_default();
            recurring_events(entry, range, &overridden, ctx)
        } else {
            single_event(entry, range, ctx).map(|event| event.into_iter().collect())
        };
        match result {
            Ok(events) => feed.events.extend(events),
            Err(error) => skip(&mut feed, entry.summary.clone(), error),
        }
    }

    debug!(
        busy = feed.events.len(),
        skipped = feed.skipped.len(),
        "extracted busy events"
    );
    Ok(feed)
}

fn read_events(payload: &str) -> Result<Vec<IcalEvent>, ParseError> {
    let parser = IcalParser::new(BufReader::new(payload.as_bytes()));
    let mut events = Vec::new();
    let mut calendars = 0usize;
    for calendar in parser {
        let calendar = calendar.map_err(|e| ParseError::Malformed(e.to_string()))?;
        calendars += 1;
        events.extend(calendar.events);
    }
    if calendars == 0 {
        return Err(ParseError::NotACalendar);
    }
    Ok(events)
}

/// `RECURRENCE-ID` instances per `UID`: these replace the master's occurrence.
fn collect_overrides(entries: &[CalendarEntry]) -> HashMap<String, Exclusions> {
    let mut overrides: HashMap<String, Exclusions> = HashMap::new();
    for entry in entries {
        if let (Some(uid), Some(recurrence_id)) = (&entry.uid, &entry.recurrence_id) {
            overrides.entry(uid.clone()).or_default().insert(recurrence_id);
        }
    }
    overrides
}

fn single_event(
    entry: &CalendarEntry,
    range: &SearchRange,
    ctx: &TimeContext,
) -> Result<Option<BusyEvent>, EntryError> {
    let span = entry.span(ctx)?;
    let start = match entry.start {
        EntryTime::Date(date) => dst::start_of_day(ctx.zone, date),
        EntryTime::DateTime(dt) => Some(dt),
    }
    .ok_or_else(|| EntryError::InvalidValue {
        property: "DTSTART".to_string(),
        value: format!("{:?}", entry.start),
    })?;
    Ok(occurrence(entry, start, span, range, ctx, entry.recurrence_id.is_some()))
}

fn recurring_events(
    entry: &CalendarEntry,
    range: &SearchRange,
    overridden: &Exclusions,
    ctx: &TimeContext,
) -> Result<Vec<BusyEvent>, EntryError> {
    let span = entry.span(ctx)?;
    let starts = expander::expand_entry(
        entry,
        range.start(),
        range.end(),
        span.max_length(),
        overridden,
        ctx,
    )?;
    debug!(summary = %entry.summary, occurrences = starts.len(), "expanded recurring entry");
    Ok(starts
        .into_iter()
        .filter_map(|start| occurrence(entry, start, span, range, ctx, true))
        .collect())
}

/// One occurrence as a busy event, if it has positive length and overlaps the range.
fn occurrence(
    entry: &CalendarEntry,
    start: DateTime<Tz>,
    span: Span,
    range: &SearchRange,
    ctx: &TimeContext,
    is_recurring_instance: bool,
) -> Option<BusyEvent> {
    let (start, end) = match span {
        Span::Days(days) => {
            // Blocks through the end of the last covered day, which is the start of the
            // following day; using the exclusive end date itself would block one extra day.
            let first_day = start.with_timezone(&ctx.zone).date_naive();
            let start = dst::start_of_day(ctx.zone, first_day)?;
            let end = dst::start_of_day(ctx.zone, first_day + Duration::days(days))?;
            (start.with_timezone(&Utc), end.with_timezone(&Utc))
        }
        Span::Exact(length) => {
            let start = start.with_timezone(&Utc);
            (start, start + length)
        }
    };

    if end <= start || !range.overlaps(start, end) {
        return None;
    }
    Some(BusyEvent {
        start,
        end,
        summary: entry.summary.clone(),
        is_all_day: entry.is_all_day(),
        is_recurring_instance,
        is_transparent: false,
    })
}

fn label_of(raw: &IcalEvent) -> String {
    ["SUMMARY", "UID"]
        .iter()
        .find_map(|name| {
            raw.properties
                .iter()
                .find(|p| p.name.eq_ignore_ascii_case(name))
                .and_then(|p| p.value.clone())
        })
        .unwrap_or_else(|| "N/A".to_string())
}

fn skip(feed: &mut ParsedFeed, label: String, error: EntryError) {
    warn!(entry = %label, error = %error, "skipping calendar entry");
    feed.skipped.push(SkippedEntry { label, error });
}
