//! Tests for feed parsing and busy-event extraction.

use chrono::{DateTime, TimeZone, Utc};
use freetime_engine::entry::TimeContext;
use freetime_engine::error::{EntryError, ParseError};
use freetime_engine::feed::parse_feed;
use freetime_engine::slot::SearchRange;

// ── Helpers ─────────────────────────────────────────────────────────────────

/// Wrap VEVENT bodies (one property per line) in a VCALENDAR with CRLF endings.
fn calendar(events: &[&str]) -> String {
    let mut ics = String::from("BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:-//freetime//tests//EN\r\n");
    for body in events {
        ics.push_str("BEGIN:VEVENT\r\n");
        for line in body.lines().map(str::trim).filter(|l| !l.is_empty()) {
            ics.push_str(line);
            ics.push_str("\r\n");
        }
        ics.push_str("END:VEVENT\r\n");
    }
    ics.push_str("END:VCALENDAR\r\n");
    ics
}

fn at(month: u32, day: u32, hour: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, month, day, hour, min, 0).unwrap()
}

/// Two weeks: Monday 2026-03-16 00:00 to Monday 2026-03-30 00:00 (UTC).
fn two_weeks() -> SearchRange {
    SearchRange::new(at(3, 16, 0, 0), at(3, 30, 0, 0)).unwrap()
}

fn ctx() -> TimeContext {
    TimeContext::default()
}

// ── Singular entries ────────────────────────────────────────────────────────

#[test]
fn timed_event_inside_range_becomes_one_busy_event() {
    let ics = calendar(&["
        UID:review-1
        SUMMARY:Design review
        DTSTART:20260317T140000Z
        DTEND:20260317T150000Z
    "]);

    let feed = parse_feed(&ics, &two_weeks(), &ctx()).unwrap();

    assert_eq!(feed.events.len(), 1);
    let event = &feed.events[0];
    assert_eq!(event.start, at(3, 17, 14, 0));
    assert_eq!(event.end, at(3, 17, 15, 0));
    assert_eq!(event.summary, "Design review");
    assert!(!event.is_all_day);
    assert!(!event.is_recurring_instance);
    assert!(feed.skipped.is_empty());
}

#[test]
fn events_outside_range_are_dropped() {
    let ics = calendar(&[
        "
        SUMMARY:Before
        DTSTART:20260310T090000Z
        DTEND:20260310T100000Z
        ",
        "
        SUMMARY:After
        DTSTART:20260401T090000Z
        DTEND:20260401T100000Z
        ",
        "
        SUMMARY:Ends exactly at range start
        DTSTART:20260315T230000Z
        DTEND:20260316T000000Z
        ",
    ]);

    let feed = parse_feed(&ics, &two_weeks(), &ctx()).unwrap();

    assert!(feed.events.is_empty(), "got {:?}", feed.events);
}

#[test]
fn event_straddling_range_start_is_kept_whole() {
    let ics = calendar(&["
        SUMMARY:Overnight
        DTSTART:20260315T220000Z
        DTEND:20260316T020000Z
    "]);

    let feed = parse_feed(&ics, &two_weeks(), &ctx()).unwrap();

    assert_eq!(feed.events.len(), 1);
    assert_eq!(feed.events[0].start, at(3, 15, 22, 0));
}

#[test]
fn transparent_and_cancelled_entries_do_not_block() {
    let ics = calendar(&[
        "
        SUMMARY:Reminder
        DTSTART:20260317T090000Z
        DTEND:20260317T100000Z
        TRANSP:TRANSPARENT
        ",
        "
        SUMMARY:Called off
        DTSTART:20260318T090000Z
        DTEND:20260318T100000Z
        STATUS:CANCELLED
        ",
        "
        SUMMARY:Real meeting
        DTSTART:20260319T090000Z
        DTEND:20260319T100000Z
        TRANSP:OPAQUE
        ",
    ]);

    let feed = parse_feed(&ics, &two_weeks(), &ctx()).unwrap();

    assert_eq!(feed.events.len(), 1);
    assert_eq!(feed.events[0].summary, "Real meeting");
    assert!(feed.events.iter().all(|e| !e.is_transparent));
}

#[test]
fn duration_stands_in_for_missing_dtend() {
    let ics = calendar(&["
        SUMMARY:Call
        DTSTART:20260317T090000Z
        DURATION:PT45M
    "]);

    let feed = parse_feed(&ics, &two_weeks(), &ctx()).unwrap();

    assert_eq!(feed.events[0].end, at(3, 17, 9, 45));
}

#[test]
fn tzid_times_are_converted_to_utc() {
    // New York is on EDT (UTC-4) after 2026-03-08.
    let ics = calendar(&["
        SUMMARY:East coast sync
        DTSTART;TZID=America/New_York:20260317T100000
        DTEND;TZID=America/New_York:20260317T110000
    "]);

    let feed = parse_feed(&ics, &two_weeks(), &ctx()).unwrap();

    assert_eq!(feed.events[0].start, at(3, 17, 14, 0));
    assert_eq!(feed.events[0].end, at(3, 17, 15, 0));
}

#[test]
fn escaped_summary_is_unescaped() {
    let ics = calendar(&[r"
        SUMMARY:Lunch\, then planning
        DTSTART:20260317T120000Z
        DTEND:20260317T130000Z
    "]);

    let feed = parse_feed(&ics, &two_weeks(), &ctx()).unwrap();

    assert_eq!(feed.events[0].summary, "Lunch, then planning");
}

// ── All-day entries ─────────────────────────────────────────────────────────

#[test]
fn all_day_event_covers_exactly_its_day() {
    let ics = calendar(&["
        SUMMARY:Offsite
        DTSTART;VALUE=DATE:20260317
        DTEND;VALUE=DATE:20260318
    "]);

    let feed = parse_feed(&ics, &two_weeks(), &ctx()).unwrap();

    assert_eq!(feed.events.len(), 1);
    let event = &feed.events[0];
    assert!(event.is_all_day);
    assert_eq!(event.start, at(3, 17, 0, 0));
    // Ends with Mar 17, not with the exclusive DTEND day.
    assert_eq!(event.end, at(3, 18, 0, 0));
}

#[test]
fn multi_day_all_day_event_covers_every_listed_day() {
    let ics = calendar(&["
        SUMMARY:Conference
        DTSTART;VALUE=DATE:20260317
        DTEND;VALUE=DATE:20260320
    "]);

    let feed = parse_feed(&ics, &two_weeks(), &ctx()).unwrap();

    assert_eq!(feed.events[0].start, at(3, 17, 0, 0));
    assert_eq!(feed.events[0].end, at(3, 20, 0, 0));
}

#[test]
fn all_day_without_dtend_is_one_day() {
    let ics = calendar(&["
        SUMMARY:Holiday
        DTSTART;VALUE=DATE:20260320
    "]);

    let feed = parse_feed(&ics, &two_weeks(), &ctx()).unwrap();

    assert_eq!(feed.events[0].end, at(3, 21, 0, 0));
}

#[test]
fn all_day_dates_follow_the_context_zone() {
    let ics = calendar(&["
        SUMMARY:Offsite
        DTSTART;VALUE=DATE:20260317
        DTEND;VALUE=DATE:20260318
    "]);
    let berlin = TimeContext {
        zone: chrono_tz::Europe::Berlin,
        ..TimeContext::default()
    };

    let feed = parse_feed(&ics, &two_weeks(), &berlin).unwrap();

    // CET is UTC+1 in March before the switch on the 29th.
    assert_eq!(feed.events[0].start, at(3, 16, 23, 0));
    assert_eq!(feed.events[0].end, at(3, 17, 23, 0));
}

// ── Recurring entries ───────────────────────────────────────────────────────

#[test]
fn weekly_event_over_two_weeks_yields_two_instances() {
    let ics = calendar(&["
        UID:weekly-1
        SUMMARY:Team sync
        DTSTART:20260302T100000Z
        DTEND:20260302T110000Z
        RRULE:FREQ=WEEKLY
    "]);

    let feed = parse_feed(&ics, &two_weeks(), &ctx()).unwrap();

    assert_eq!(feed.events.len(), 2);
    let mut starts: Vec<_> = feed.events.iter().map(|e| e.start).collect();
    starts.sort();
    assert_eq!(starts, vec![at(3, 16, 10, 0), at(3, 23, 10, 0)]);
    assert!(feed.events.iter().all(|e| e.is_recurring_instance));
    assert!(feed
        .events
        .iter()
        .all(|e| e.end - e.start == chrono::Duration::hours(1)));
}

#[test]
fn open_ended_daily_rule_from_long_ago_is_bounded() {
    let ics = calendar(&["
        SUMMARY:Daily standup
        DTSTART:20200101T090000Z
        DTEND:20200101T091500Z
        RRULE:FREQ=DAILY
    "]);

    let feed = parse_feed(&ics, &two_weeks(), &ctx()).unwrap();

    assert_eq!(feed.events.len(), 14);
}

#[test]
fn hourly_rule_started_years_before_the_range_still_fills_it() {
    // Over 100k hourly instants lie between DTSTART and the range.
    let ics = calendar(&["
        SUMMARY:Heartbeat
        DTSTART:20140101T000000Z
        DTEND:20140101T003000Z
        RRULE:FREQ=HOURLY
    "]);
    let one_day = SearchRange::new(at(3, 16, 0, 0), at(3, 17, 0, 0)).unwrap();

    let feed = parse_feed(&ics, &one_day, &ctx()).unwrap();

    assert_eq!(feed.events.len(), 24);
    let mut starts: Vec<_> = feed.events.iter().map(|e| e.start).collect();
    starts.sort();
    assert_eq!(starts.first(), Some(&at(3, 16, 0, 0)));
    assert_eq!(starts.last(), Some(&at(3, 16, 23, 0)));
}

#[test]
fn minutely_rule_from_decades_ago_is_not_starved() {
    let ics = calendar(&["
        SUMMARY:Poll
        DTSTART:19900101T000000Z
        DTEND:19900101T000500Z
        RRULE:FREQ=MINUTELY;INTERVAL=15
    "]);
    let one_hour = SearchRange::new(at(3, 16, 9, 0), at(3, 16, 10, 0)).unwrap();

    let feed = parse_feed(&ics, &one_hour, &ctx()).unwrap();

    let mut starts: Vec<_> = feed.events.iter().map(|e| e.start).collect();
    starts.sort();
    assert_eq!(
        starts,
        vec![at(3, 16, 9, 0), at(3, 16, 9, 15), at(3, 16, 9, 30), at(3, 16, 9, 45)]
    );
}

#[test]
fn biweekly_rule_keeps_its_phase_across_years() {
    // 2010-01-04 is a Monday; the series falls on the weeks of Mar 9 and Mar 23, 2026.
    let ics = calendar(&["
        SUMMARY:Retro
        DTSTART:20100104T100000Z
        DTEND:20100104T110000Z
        RRULE:FREQ=WEEKLY;INTERVAL=2;BYDAY=MO,WE
    "]);

    let feed = parse_feed(&ics, &two_weeks(), &ctx()).unwrap();

    let mut starts: Vec<_> = feed.events.iter().map(|e| e.start).collect();
    starts.sort();
    assert_eq!(starts, vec![at(3, 23, 10, 0), at(3, 25, 10, 0)]);
}

#[test]
fn count_limits_occurrences() {
    let ics = calendar(&["
        SUMMARY:Onboarding
        DTSTART:20260316T130000Z
        DTEND:20260316T140000Z
        RRULE:FREQ=DAILY;COUNT=3
    "]);

    let feed = parse_feed(&ics, &two_weeks(), &ctx()).unwrap();

    assert_eq!(feed.events.len(), 3);
}

#[test]
fn rule_ending_before_range_yields_nothing() {
    let ics = calendar(&["
        SUMMARY:Old series
        DTSTART:20260101T090000Z
        DTEND:20260101T100000Z
        RRULE:FREQ=WEEKLY;UNTIL=20260301T000000Z
    "]);

    let feed = parse_feed(&ics, &two_weeks(), &ctx()).unwrap();

    assert!(feed.events.is_empty());
    assert!(feed.skipped.is_empty(), "zero occurrences is not an error");
}

#[test]
fn exdate_removes_an_occurrence() {
    let ics = calendar(&["
        SUMMARY:Team sync
        DTSTART:20260302T100000Z
        DTEND:20260302T110000Z
        RRULE:FREQ=WEEKLY
        EXDATE:20260316T100000Z
    "]);

    let feed = parse_feed(&ics, &two_weeks(), &ctx()).unwrap();

    assert_eq!(feed.events.len(), 1);
    assert_eq!(feed.events[0].start, at(3, 23, 10, 0));
}

#[test]
fn rdate_adds_an_occurrence() {
    let ics = calendar(&["
        SUMMARY:Team sync
        DTSTART:20260302T100000Z
        DTEND:20260302T110000Z
        RRULE:FREQ=WEEKLY;COUNT=3
        RDATE:20260325T150000Z
    "]);

    let feed = parse_feed(&ics, &two_weeks(), &ctx()).unwrap();

    // Mar 2, 9 fall before the range; Mar 16 is the third counted instance.
    let mut starts: Vec<_> = feed.events.iter().map(|e| e.start).collect();
    starts.sort();
    assert_eq!(starts, vec![at(3, 16, 10, 0), at(3, 25, 15, 0)]);
}

#[test]
fn detached_override_replaces_the_master_occurrence() {
    let ics = calendar(&[
        "
        UID:sync@example.com
        SUMMARY:Team sync
        DTSTART:20260302T100000Z
        DTEND:20260302T110000Z
        RRULE:FREQ=WEEKLY
        ",
        "
        UID:sync@example.com
        RECURRENCE-ID:20260316T100000Z
        SUMMARY:Team sync (moved)
        DTSTART:20260316T160000Z
        DTEND:20260316T170000Z
        ",
    ]);

    let feed = parse_feed(&ics, &two_weeks(), &ctx()).unwrap();

    let mut starts: Vec<_> = feed.events.iter().map(|e| e.start).collect();
    starts.sort();
    assert_eq!(starts, vec![at(3, 16, 16, 0), at(3, 23, 10, 0)]);
}

#[test]
fn recurring_all_day_instances_each_cover_one_day() {
    let ics = calendar(&["
        SUMMARY:Focus day
        DTSTART;VALUE=DATE:20260317
        DTEND;VALUE=DATE:20260318
        RRULE:FREQ=WEEKLY
    "]);

    let feed = parse_feed(&ics, &two_weeks(), &ctx()).unwrap();

    let mut events = feed.events.clone();
    events.sort_by_key(|e| e.start);
    assert_eq!(events.len(), 2);
    assert_eq!((events[0].start, events[0].end), (at(3, 17, 0, 0), at(3, 18, 0, 0)));
    assert_eq!((events[1].start, events[1].end), (at(3, 24, 0, 0), at(3, 25, 0, 0)));
    assert!(events.iter().all(|e| e.is_all_day && e.is_recurring_instance));
}

// ── Failures ────────────────────────────────────────────────────────────────

#[test]
fn corrupt_rule_skips_only_that_entry() {
    let ics = calendar(&[
        "
        SUMMARY:Broken series
        DTSTART:20260316T090000Z
        DTEND:20260316T100000Z
        RRULE:FREQ=FORTNIGHTLY;BYDAY=XX
        ",
        "
        SUMMARY:Fine
        DTSTART:20260317T090000Z
        DTEND:20260317T100000Z
        ",
    ]);

    let feed = parse_feed(&ics, &two_weeks(), &ctx()).unwrap();

    assert_eq!(feed.events.len(), 1);
    assert_eq!(feed.events[0].summary, "Fine");
    assert_eq!(feed.skipped.len(), 1);
    assert_eq!(feed.skipped[0].label, "Broken series");
    assert!(matches!(feed.skipped[0].error, EntryError::InvalidRule(_)));
}

#[test]
fn unreadable_dates_skip_only_that_entry() {
    let ics = calendar(&[
        "
        SUMMARY:Garbled
        DTSTART:next tuesday
        ",
        "
        SUMMARY:No start
        DTEND:20260317T100000Z
        ",
        "
        SUMMARY:Fine
        DTSTART:20260317T090000Z
        DTEND:20260317T100000Z
        ",
    ]);

    let feed = parse_feed(&ics, &two_weeks(), &ctx()).unwrap();

    assert_eq!(feed.events.len(), 1);
    assert_eq!(feed.skipped.len(), 2);
    assert!(feed
        .skipped
        .iter()
        .any(|s| s.error == EntryError::MissingStart));
}

#[test]
fn inverted_entry_is_skipped() {
    let ics = calendar(&["
        SUMMARY:Backwards
        DTSTART:20260317T100000Z
        DTEND:20260317T090000Z
    "]);

    let feed = parse_feed(&ics, &two_weeks(), &ctx()).unwrap();

    assert!(feed.events.is_empty());
    assert_eq!(feed.skipped[0].error, EntryError::InvertedRange);
}

#[test]
fn empty_payload_is_not_a_calendar() {
    assert_eq!(
        parse_feed("", &two_weeks(), &ctx()),
        Err(ParseError::NotACalendar)
    );
}

#[test]
fn html_error_page_is_a_top_level_failure() {
    let page = "<html><body>404 Not Found</body></html>";
    assert!(parse_feed(page, &two_weeks(), &ctx()).is_err());
}

#[test]
fn calendar_without_events_is_empty_not_an_error() {
    let feed = parse_feed(&calendar(&[]), &two_weeks(), &ctx()).unwrap();
    assert!(feed.events.is_empty());
    assert!(feed.skipped.is_empty());
}
