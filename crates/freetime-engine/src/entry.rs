//! Strongly-typed calendar entries.
//!
//! Raw `VEVENT` property lists from the feed are mapped here, once, into a closed
//! [`CalendarEntry`] so later stages never look properties up by name.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use chrono_tz::Tz;
use ical::property::Property;
use tracing::warn;

use crate::dst::{self, DstPolicy};
use crate::error::EntryError;

/// How floating times and all-day dates are pinned to instants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeContext {
    pub zone: Tz,
    pub dst_policy: DstPolicy,
}

impl Default for TimeContext {
    fn default() -> Self {
        Self {
            zone: Tz::UTC,
            dst_policy: DstPolicy::default(),
        }
    }
}

/// A `DATE` or `DATE-TIME` property value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryTime {
    Date(NaiveDate),
    DateTime(DateTime<Tz>),
}

impl EntryTime {
    /// The instant this value denotes; dates start at local midnight.
    pub fn instant(&self, ctx: &TimeContext) -> Option<DateTime<Utc>> {
        match self {
            EntryTime::Date(date) => dst::start_of_day(ctx.zone, *date).map(|dt| dt.with_timezone(&Utc)),
            EntryTime::DateTime(dt) => Some(dt.with_timezone(&Utc)),
        }
    }

    /// The calendar date in the context zone.
    pub fn date(&self, ctx: &TimeContext) -> NaiveDate {
        match self {
            EntryTime::Date(date) => *date,
            EntryTime::DateTime(dt) => dt.with_timezone(&ctx.zone).date_naive(),
        }
    }
}

/// How an entry's end is expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryEnd {
    At(EntryTime),
    After(Duration),
    Unspecified,
}

/// The length of every occurrence of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Span {
    /// All-day: covers this many whole calendar days.
    Days(i64),
    /// Timed: exact length.
    Exact(Duration),
}

impl Span {
    /// Upper bound on the wall-clock length, for widening search windows.
    pub fn max_length(&self) -> Duration {
        match self {
            // A day can be 25 hours long across a DST change.
            Span::Days(days) => Duration::hours(25 * days),
            Span::Exact(length) => *length,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarEntry {
    pub uid: Option<String>,
    pub summary: String,
    pub start: EntryTime,
    pub end: EntryEnd,
    pub transparent: bool,
    pub cancelled: bool,
    pub rrule: Option<String>,
    pub rdates: Vec<EntryTime>,
    pub exdates: Vec<EntryTime>,
    pub recurrence_id: Option<EntryTime>,
}

impl CalendarEntry {
    pub fn from_properties(properties: &[Property], ctx: &TimeContext) -> Result<Self, EntryError> {
        let mut uid = None;
        let mut summary = None;
        let mut start = None;
        let mut end = EntryEnd::Unspecified;
        let mut duration = None;
        let mut transparent = false;
        let mut cancelled = false;
        let mut rrule = None;
        let mut rdates = Vec::new();
        let mut exdates = Vec::new();
        let mut recurrence_id = None;

        for property in properties {
            let Some(value) = property.value.as_deref() else {
                continue;
            };
            match property.name.to_ascii_uppercase().as_str() {
                "UID" => uid = Some(value.trim().to_string()),
                "SUMMARY" => summary = Some(unescape_text(value)),
                "DTSTART" => start = Some(parse_time(property, value, ctx)?),
                "DTEND" => end = EntryEnd::At(parse_time(property, value, ctx)?),
                "DURATION" => {
                    duration = Some(parse_duration(value).ok_or_else(|| invalid("DURATION", value))?)
                }
                "TRANSP" => transparent = value.trim().eq_ignore_ascii_case("TRANSPARENT"),
                "STATUS" => cancelled = value.trim().eq_ignore_ascii_case("CANCELLED"),
                "RRULE" => rrule = Some(value.trim().to_string()),
                "RDATE" => rdates.extend(parse_time_list(property, value, ctx)?),
                "EXDATE" => exdates.extend(parse_time_list(property, value, ctx)?),
                "RECURRENCE-ID" => recurrence_id = Some(parse_time(property, value, ctx)?),
                _ => {}
            }
        }

        if let (EntryEnd::Unspecified, Some(duration)) = (end, duration) {
            end = EntryEnd::After(duration);
        }

        Ok(Self {
            uid,
            summary: summary.unwrap_or_else(|| "No Summary".to_string()),
            start: start.ok_or(EntryError::MissingStart)?,
            end,
            transparent,
            cancelled,
            rrule,
            rdates,
            exdates,
            recurrence_id,
        })
    }

    pub fn is_all_day(&self) -> bool {
        matches!(self.start, EntryTime::Date(_))
    }

    /// Entries that never block time.
    pub fn is_blocking(&self) -> bool {
        !self.transparent && !self.cancelled
    }

    pub fn is_recurring(&self) -> bool {
        self.rrule.is_some() || !self.rdates.is_empty()
    }

    /// Length of each occurrence.
    ///
    /// All-day entries store an exclusive end date (the day after the last covered day);
    /// the span counts only the days actually covered.
    pub fn span(&self, ctx: &TimeContext) -> Result<Span, EntryError> {
        match (self.start, self.end) {
            (EntryTime::Date(start), EntryEnd::At(end)) => {
                let days = match end {
                    EntryTime::Date(end) => (end - start).num_days(),
                    // A timed end on an all-day entry still blocks the whole of its day.
                    EntryTime::DateTime(_) => (end.date(ctx) - start).num_days() + 1,
                };
                if days < 0 {
                    return Err(EntryError::InvertedRange);
                }
                Ok(Span::Days(days.max(1)))
            }
            (EntryTime::Date(_), EntryEnd::After(duration)) => {
                if duration < Duration::zero() {
                    return Err(EntryError::InvertedRange);
                }
                let seconds = duration.num_seconds();
                let days = (seconds + 86_399) / 86_400;
                Ok(Span::Days(days.max(1)))
            }
            (EntryTime::Date(_), EntryEnd::Unspecified) => Ok(Span::Days(1)),
            (EntryTime::DateTime(start), EntryEnd::At(end)) => {
                let end = end
                    .instant(ctx)
                    .ok_or_else(|| invalid("DTEND", &format!("{end:?}")))?;
                let length = end - start.with_timezone(&Utc);
                if length < Duration::zero() {
                    return Err(EntryError::InvertedRange);
                }
                Ok(Span::Exact(length))
            }
            (EntryTime::DateTime(_), EntryEnd::After(duration)) => {
                if duration < Duration::zero() {
                    return Err(EntryError::InvertedRange);
                }
                Ok(Span::Exact(duration))
            }
            (EntryTime::DateTime(_), EntryEnd::Unspecified) => Ok(Span::Exact(Duration::zero())),
        }
    }
}

/// Parse one `DATE` / `DATE-TIME` property value, honouring `VALUE` and `TZID`.
pub fn parse_time(property: &Property, value: &str, ctx: &TimeContext) -> Result<EntryTime, EntryError> {
    let tzid = param(property, "TZID");
    let date_only = param(property, "VALUE").is_some_and(|v| v.eq_ignore_ascii_case("DATE"));
    parse_time_value(&property.name, value, tzid, date_only, ctx)
}

fn parse_time_list(property: &Property, value: &str, ctx: &TimeContext) -> Result<Vec<EntryTime>, EntryError> {
    // RDATE;VALUE=PERIOD is not a list of start times; such entries contribute nothing.
    if param(property, "VALUE").is_some_and(|v| v.eq_ignore_ascii_case("PERIOD")) {
        warn!(property = %property.name, "ignoring PERIOD-valued recurrence dates");
        return Ok(Vec::new());
    }
    value
        .split(',')
        .filter(|part| !part.trim().is_empty())
        .map(|part| parse_time(property, part, ctx))
        .collect()
}

/// Parse `20260317`, `20260317T100000Z` or `20260317T100000` (in `tzid` or the context zone).
pub fn parse_time_value(
    property: &str,
    value: &str,
    tzid: Option<&str>,
    date_only: bool,
    ctx: &TimeContext,
) -> Result<EntryTime, EntryError> {
    let value = value.trim();
    if date_only || value.len() == 8 {
        return NaiveDate::parse_from_str(value, "%Y%m%d")
            .map(EntryTime::Date)
            .map_err(|_| invalid(property, value));
    }

    if let Some(utc) = value.strip_suffix('Z') {
        let naive = NaiveDateTime::parse_from_str(utc, "%Y%m%dT%H%M%S")
            .map_err(|_| invalid(property, value))?;
        return Ok(EntryTime::DateTime(naive.and_utc().with_timezone(&Tz::UTC)));
    }

    let naive =
        NaiveDateTime::parse_from_str(value, "%Y%m%dT%H%M%S").map_err(|_| invalid(property, value))?;
    let zone = tzid.map_or(ctx.zone, |id| lookup_zone(id, ctx.zone));
    dst::resolve_local(zone, naive, ctx.dst_policy)
        .map(EntryTime::DateTime)
        .ok_or_else(|| invalid(property, value))
}

/// Resolve a `TZID` through the IANA database, falling back to `fallback`.
pub fn lookup_zone(tzid: &str, fallback: Tz) -> Tz {
    let name = tzid.trim().trim_matches('"').trim_start_matches('/');
    match name.parse::<Tz>() {
        Ok(tz) => tz,
        Err(_) => {
            warn!(tzid = %name, fallback = %fallback.name(), "unknown TZID, using configured zone");
            fallback
        }
    }
}

/// Parse an RFC 5545 duration such as `PT1H30M`, `P1D` or `-P1W`.
pub fn parse_duration(value: &str) -> Option<Duration> {
    let value = value.trim();
    let (negative, rest) = match value.as_bytes().first()? {
        b'-' => (true, &value[1..]),
        b'+' => (false, &value[1..]),
        _ => (false, value),
    };
    let rest = rest.strip_prefix('P')?;

    let mut total = Duration::zero();
    let mut number = String::new();
    let mut in_time = false;
    let mut saw_component = false;
    for ch in rest.chars() {
        match ch {
            '0'..='9' => number.push(ch),
            'T' if number.is_empty() => in_time = true,
            unit => {
                let n: i64 = number.parse().ok()?;
                number.clear();
                saw_component = true;
                total += match (unit, in_time) {
                    ('W', false) => Duration::weeks(n),
                    ('D', false) => Duration::days(n),
                    ('H', true) => Duration::hours(n),
                    ('M', true) => Duration::minutes(n),
                    ('S', true) => Duration::seconds(n),
                    _ => return None,
                };
            }
        }
    }
    if !number.is_empty() || !saw_component {
        return None;
    }
    Some(if negative { -total } else { total })
}

/// Undo RFC 5545 TEXT escaping.
pub fn unescape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') | Some('N') => out.push('\n'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

fn param<'a>(property: &'a Property, name: &str) -> Option<&'a str> {
    property
        .params
        .as_ref()?
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .and_then(|(_, values)| values.first())
        .map(String::as_str)
}

fn invalid(property: &str, value: &str) -> EntryError {
    EntryError::InvalidValue {
        property: property.to_string(),
        value: value.to_string(),
    }
}
