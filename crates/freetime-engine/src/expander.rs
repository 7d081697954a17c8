//! RRULE expansion -- turns a recurring entry into concrete occurrence starts.
//!
//! Wraps the `rrule` crate (v0.13) and `chrono-tz`. Expansion is lazy and bounded by the
//! search range, so open-ended rules (no COUNT, no UNTIL) never iterate past the horizon.

use std::collections::HashSet;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use rrule::RRuleSet;
use tracing::warn;

use crate::dst::{self, DstPolicy};
use crate::entry::{parse_time_value, CalendarEntry, EntryTime, TimeContext};
use crate::error::EntryError;

/// Hard cap on occurrences scanned per rule inside the search window.
pub const MAX_SCANNED_OCCURRENCES: usize = 100_000;

/// Hard cap on instants walked before the search window is reached.
///
/// Fixed-period rules are rebased close to the window first, so only rules whose period
/// varies (monthly, yearly) or that carry COUNT ever walk far.
pub const MAX_SKIPPED_OCCURRENCES: usize = 1_000_000;

/// Instants (and, for date-valued exclusions, whole days) removed from a recurrence set.
#[derive(Debug, Clone, Default)]
pub struct Exclusions {
    instants: HashSet<DateTime<Utc>>,
    dates: HashSet<NaiveDate>,
}

impl Exclusions {
    pub fn insert(&mut self, time: &EntryTime) {
        match time {
            EntryTime::Date(date) => {
                self.dates.insert(*date);
            }
            EntryTime::DateTime(dt) => {
                self.instants.insert(dt.with_timezone(&Utc));
            }
        }
    }

    fn excludes(&self, start: &DateTime<Tz>) -> bool {
        self.instants.contains(&start.with_timezone(&Utc))
            || self.dates.contains(&start.date_naive())
    }
}

/// Lazily walk the occurrences of `rule_set` that start after `earliest` and before `end`.
///
/// Stops at the first occurrence at or past `end`, at `until` (inclusive), after
/// [`MAX_SCANNED_OCCURRENCES`] occurrences inside the window, or after
/// [`MAX_SKIPPED_OCCURRENCES`] instants before it.
pub fn occurrences<'a>(
    rule_set: &'a RRuleSet,
    zone: Tz,
    until: Option<DateTime<Utc>>,
    earliest: DateTime<Utc>,
    end: DateTime<Utc>,
) -> impl Iterator<Item = DateTime<Tz>> + 'a {
    let mut skipped = 0usize;
    rule_set
        .into_iter()
        .map(move |dt| dt.with_timezone(&zone))
        .skip_while(move |start| {
            skipped += 1;
            start.with_timezone(&Utc) <= earliest && skipped <= MAX_SKIPPED_OCCURRENCES
        })
        .take_while(move |start| start.with_timezone(&Utc) > earliest)
        .take(MAX_SCANNED_OCCURRENCES)
        .take_while(move |start| {
            let utc = start.with_timezone(&Utc);
            utc < end && until.is_none_or(|limit| utc <= limit)
        })
}

/// Expand a recurring entry into the starts of every occurrence that could overlap
/// `[range_start, range_end)` given occurrences last at most `lookback`.
///
/// Includes RDATE additions, removes EXDATE and `overridden` instants, and returns
/// starts sorted and deduplicated. Starts are expressed in the entry's own zone (the
/// context zone for all-day entries).
///
/// # Errors
/// Returns `EntryError::InvalidRule` if the RRULE cannot be parsed or validated.
pub fn expand_entry(
    entry: &CalendarEntry,
    range_start: DateTime<Utc>,
    range_end: DateTime<Utc>,
    lookback: Duration,
    overridden: &Exclusions,
    ctx: &TimeContext,
) -> Result<Vec<DateTime<Tz>>, EntryError> {
    let (dtstart, zone) = match entry.start {
        EntryTime::Date(date) => {
            let midnight = dst::start_of_day(ctx.zone, date).ok_or_else(|| {
                EntryError::InvalidRule(format!("cannot place {date} in {}", ctx.zone.name()))
            })?;
            (midnight, ctx.zone)
        }
        EntryTime::DateTime(dt) => (dt, dt.timezone()),
    };

    let mut exclusions = overridden.clone();
    for exdate in &entry.exdates {
        exclusions.insert(exdate);
    }

    let earliest = range_start - lookback;
    let in_window = |start: &DateTime<Tz>| start.with_timezone(&Utc) > earliest;

    let mut starts: Vec<DateTime<Tz>> = Vec::new();

    if let Some(rule) = entry.rrule.as_deref() {
        let (rule_text, until) = split_until(rule, zone, ctx)?;
        let first = rebase_start(&rule_text, dtstart, zone, earliest);
        let rule_set = build_rule_set(&rule_text, &first, zone)?;

        let mut scanned = 0usize;
        for start in occurrences(&rule_set, zone, until, earliest, range_end) {
            scanned += 1;
            if !exclusions.excludes(&start) {
                starts.push(start);
            }
        }
        if scanned == MAX_SCANNED_OCCURRENCES {
            warn!(
                summary = %entry.summary,
                rule,
                "recurrence scan limit reached before the end of the search range"
            );
        }
    }

    // DTSTART is always the first instance, whether or not the rule pattern matches it.
    let extra = entry.rdates.iter().map(|rdate| match rdate {
        EntryTime::Date(date) => dst::start_of_day(ctx.zone, *date),
        EntryTime::DateTime(dt) => Some(dt.with_timezone(&zone)),
    });
    for start in std::iter::once(dtstart).chain(extra.flatten()) {
        let utc = start.with_timezone(&Utc);
        if in_window(&start) && utc < range_end && !exclusions.excludes(&start) {
            starts.push(start);
        }
    }

    starts.sort();
    starts.dedup();
    Ok(starts)
}

/// Move `dtstart` forward by whole recurrence periods to just before `earliest`.
///
/// Only rules with a fixed period (secondly through weekly) are moved, and never rules
/// with COUNT, since the count runs from the real DTSTART. The series itself is
/// unchanged: a shift by whole periods keeps the rule's phase and every BY* default
/// taken from DTSTART. The real DTSTART is still added as an instance by the caller.
fn rebase_start(rule: &str, dtstart: DateTime<Tz>, zone: Tz, earliest: DateTime<Utc>) -> DateTime<Tz> {
    let Some(period) = fixed_period(rule) else {
        return dtstart;
    };
    let start = dtstart.naive_local();
    // A day of slack keeps occurrences just past `earliest` in reach across offset changes.
    let Some(target) = earliest
        .with_timezone(&zone)
        .naive_local()
        .checked_sub_signed(Duration::days(1))
    else {
        return dtstart;
    };
    let elapsed = target.signed_duration_since(start).num_seconds();
    let periods = elapsed / period;
    if periods <= 0 {
        return dtstart;
    }

    // A shifted start inside a DST gap would move the wall-clock phase; step back instead.
    (0..3)
        .filter_map(|back| Duration::try_seconds((periods - back) * period))
        .filter_map(|shift| start.checked_add_signed(shift))
        .find_map(|local| dst::resolve_local(zone, local, DstPolicy::Skip))
        .filter(|rebased| rebased > &dtstart)
        .unwrap_or(dtstart)
}

/// Length of one recurrence period in seconds, for rules whose period never varies.
fn fixed_period(rule: &str) -> Option<i64> {
    let mut unit: Option<i64> = None;
    let mut interval = 1i64;
    for part in rule.split(';') {
        let (key, value) = part.split_once('=')?;
        match key.trim().to_ascii_uppercase().as_str() {
            "COUNT" => return None,
            "INTERVAL" => interval = value.trim().parse().ok().filter(|n: &i64| *n > 0)?,
            "FREQ" => {
                unit = Some(match value.trim().to_ascii_uppercase().as_str() {
                    "SECONDLY" => 1,
                    "MINUTELY" => 60,
                    "HOURLY" => 3_600,
                    "DAILY" => 86_400,
                    "WEEKLY" => 604_800,
                    _ => return None,
                });
            }
            _ => {}
        }
    }
    unit?.checked_mul(interval)
}

/// Build the `rrule` crate's textual form: a DTSTART line with TZID plus the RRULE.
fn build_rule_set(rule: &str, dtstart: &DateTime<Tz>, zone: Tz) -> Result<RRuleSet, EntryError> {
    if rule.is_empty() {
        return Err(EntryError::InvalidRule("empty RRULE string".to_string()));
    }
    let text = format!(
        "DTSTART;TZID={}:{}\nRRULE:{}",
        zone.name(),
        dtstart.format("%Y%m%dT%H%M%S"),
        rule
    );
    text.parse::<RRuleSet>()
        .map_err(|e| EntryError::InvalidRule(format!("{}", e)))
}

/// Remove `UNTIL` from the rule and resolve it to an inclusive UTC bound.
///
/// Feeds mix UTC, floating and date-valued UNTIL freely regardless of DTSTART's zone;
/// enforcing the bound here keeps the `rrule` crate's stricter UNTIL/DTSTART zone
/// pairing rules out of the way.
fn split_until(
    rule: &str,
    zone: Tz,
    ctx: &TimeContext,
) -> Result<(String, Option<DateTime<Utc>>), EntryError> {
    let mut until = None;
    let mut kept = Vec::new();
    for part in rule.split(';').map(str::trim).filter(|p| !p.is_empty()) {
        match part.split_once('=') {
            Some((key, value)) if key.eq_ignore_ascii_case("UNTIL") => {
                let local = TimeContext { zone, ..*ctx };
                let parsed = parse_time_value("UNTIL", value, None, false, &local)
                    .map_err(|e| EntryError::InvalidRule(e.to_string()))?;
                until = match parsed {
                    // A date UNTIL includes occurrences starting any time that day.
                    EntryTime::Date(date) => dst::start_of_day(zone, date + Duration::days(1))
                        .map(|next| next.with_timezone(&Utc) - Duration::seconds(1)),
                    EntryTime::DateTime(dt) => Some(dt.with_timezone(&Utc)),
                };
            }
            _ => kept.push(part),
        }
    }
    Ok((kept.join(";"), until))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn weekly_entry(rule: &str) -> CalendarEntry {
        CalendarEntry {
            uid: Some("standup".to_string()),
            summary: "Standup".to_string(),
            start: EntryTime::DateTime(Tz::UTC.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap()),
            end: crate::entry::EntryEnd::After(Duration::hours(1)),
            transparent: false,
            cancelled: false,
            rrule: Some(rule.to_string()),
            rdates: Vec::new(),
            exdates: Vec::new(),
            recurrence_id: None,
        }
    }

    fn utc(m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, m, d, 0, 0, 0).unwrap()
    }

    #[test]
    fn open_ended_rule_is_bounded_by_range() {
        let entry = weekly_entry("FREQ=WEEKLY");
        let starts = expand_entry(
            &entry,
            utc(3, 16),
            utc(3, 30),
            Duration::hours(1),
            &Exclusions::default(),
            &TimeContext::default(),
        )
        .unwrap();
        assert_eq!(starts.len(), 2);
    }

    #[test]
    fn until_is_inclusive_and_stripped_from_rule() {
        let entry = weekly_entry("FREQ=WEEKLY;UNTIL=20260316T100000Z");
        let starts = expand_entry(
            &entry,
            utc(3, 1),
            utc(4, 1),
            Duration::hours(1),
            &Exclusions::default(),
            &TimeContext::default(),
        )
        .unwrap();
        // Mar 2, 9, 16.
        assert_eq!(starts.len(), 3);
    }

    #[test]
    fn garbage_rule_is_an_entry_error() {
        let entry = weekly_entry("FREQ=SOMETIMES");
        let result = expand_entry(
            &entry,
            utc(3, 1),
            utc(4, 1),
            Duration::hours(1),
            &Exclusions::default(),
            &TimeContext::default(),
        );
        assert!(matches!(result, Err(EntryError::InvalidRule(_))));
    }

    #[test]
    fn rebase_moves_by_whole_periods_to_just_before_the_window() {
        let dtstart = Tz::UTC.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap();
        let rebased = rebase_start("FREQ=WEEKLY", dtstart, Tz::UTC, utc(6, 1));
        // Monday 2026-05-25 10:00 is the last Monday before the window's day of slack.
        assert_eq!(rebased, Tz::UTC.with_ymd_and_hms(2026, 5, 25, 10, 0, 0).unwrap());
    }

    #[test]
    fn rebase_leaves_counted_and_monthly_rules_alone() {
        let dtstart = Tz::UTC.with_ymd_and_hms(2020, 1, 6, 10, 0, 0).unwrap();
        assert_eq!(rebase_start("FREQ=DAILY;COUNT=400", dtstart, Tz::UTC, utc(3, 1)), dtstart);
        assert_eq!(rebase_start("FREQ=MONTHLY", dtstart, Tz::UTC, utc(3, 1)), dtstart);
    }

    #[test]
    fn rebase_never_moves_backwards() {
        let dtstart = Tz::UTC.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap();
        assert_eq!(rebase_start("FREQ=HOURLY", dtstart, Tz::UTC, utc(3, 2)), dtstart);
    }

    #[test]
    fn secondly_rule_from_years_ago_reaches_the_window() {
        let mut entry = weekly_entry("FREQ=SECONDLY;INTERVAL=30");
        entry.start = EntryTime::DateTime(Tz::UTC.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap());
        let start = utc(3, 16);
        let starts = expand_entry(
            &entry,
            start,
            start + Duration::minutes(5),
            Duration::seconds(10),
            &Exclusions::default(),
            &TimeContext::default(),
        )
        .unwrap();
        assert_eq!(starts.len(), 10);
        assert_eq!(starts[0].with_timezone(&Utc), start);
    }
}
