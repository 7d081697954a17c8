//! Common availability across N calendar sources.
//!
//! Every source is fetched concurrently, each under its own timeout, and run through
//! parse → merge → derive independently. Sources that cannot be fetched or parsed are
//! excluded from the intersection rather than treated as fully busy; only when no source
//! is usable does the run fail, with [`AvailabilityError::AllSourcesUnusable`].
//!
//! Once every per-source result is in, the free-slot lists are folded in input order,
//! so the outcome never depends on which fetch finished first.

use chrono::{DateTime, NaiveTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::AvailabilityQuery;
use crate::error::{AvailabilityError, FetchError, Result, SourceError, SourceFailure};
use crate::feed::{self, SkippedEntry};
use crate::fetch::FeedFetcher;
use crate::freebusy;
use crate::intersect;
use crate::merge;
use crate::slot::TimeSlot;

/// Per-source pipeline output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceAvailability {
    /// Merged busy intervals.
    pub busy: Vec<TimeSlot>,
    /// Free intervals inside the working window.
    pub free: Vec<TimeSlot>,
    /// Entries the parser could not use.
    pub skipped: Vec<SkippedEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceOutcome {
    Usable(SourceAvailability),
    Unusable(SourceError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceReport {
    pub identifier: String,
    pub outcome: SourceOutcome,
}

impl SourceReport {
    pub fn is_usable(&self) -> bool {
        matches!(self.outcome, SourceOutcome::Usable(_))
    }
}

/// Common free slots plus how each source fared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommonAvailability {
    /// Sorted, non-overlapping, each at least the minimum slot length.
    pub slots: Vec<TimeSlot>,
    /// One report per requested source, in request order.
    pub sources: Vec<SourceReport>,
}

impl CommonAvailability {
    /// Render the slots as `{date, start, end}` triples in the query's zone.
    pub fn windows(&self, query: &AvailabilityQuery) -> Vec<FreeWindow> {
        let tz = query.window.time_zone;
        self.slots
            .iter()
            .map(|slot| FreeWindow::new(slot.start(), slot.end(), tz))
            .collect()
    }
}

/// One common free window as handed to the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreeWindow {
    /// `YYYY-MM-DD`
    pub date: String,
    /// `HH:MM`
    pub start: String,
    /// `HH:MM`
    pub end: String,
}

impl FreeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>, tz: chrono_tz::Tz) -> Self {
        let start = start.with_timezone(&tz);
        let end = end.with_timezone(&tz);
        let end = if end.date_naive() > start.date_naive() && end.time() == NaiveTime::MIN {
            "24:00".to_string()
        } else {
            end.format("%H:%M").to_string()
        };
        Self {
            date: start.format("%Y-%m-%d").to_string(),
            start: start.format("%H:%M").to_string(),
            end,
        }
    }
}

/// The structured payload for a whole-run failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub error: String,
}

impl From<&AvailabilityError> for ErrorPayload {
    fn from(err: &AvailabilityError) -> Self {
        Self {
            error: err.to_string(),
        }
    }
}

/// Run the full pipeline for one already-fetched payload.
///
/// # Errors
/// Returns `SourceError::Parse` when the payload is not a calendar document.
pub fn source_availability(
    payload: &str,
    query: &AvailabilityQuery,
) -> std::result::Result<SourceAvailability, SourceError> {
    let parsed = feed::parse_feed(payload, &query.range, &query.time_context())?;
    let busy = merge::merge_busy(&parsed.events, query.merge_tolerance);
    let free = freebusy::derive_free_slots(&busy, &query.range, &query.window, query.min_slot);
    Ok(SourceAvailability {
        busy,
        free,
        skipped: parsed.skipped,
    })
}

/// Fold already-computed per-source results into the common availability.
///
/// # Errors
/// Returns `AvailabilityError::AllSourcesUnusable` when at least one source was given
/// and none was usable.
pub fn combine(sources: Vec<SourceReport>, query: &AvailabilityQuery) -> Result<CommonAvailability> {
    if !sources.is_empty() && !sources.iter().any(SourceReport::is_usable) {
        let failures = sources
            .into_iter()
            .filter_map(|report| match report.outcome {
                SourceOutcome::Unusable(error) => Some(SourceFailure {
                    identifier: report.identifier,
                    error,
                }),
                SourceOutcome::Usable(_) => None,
            })
            .collect();
        return Err(AvailabilityError::AllSourcesUnusable { failures });
    }

    let usable = sources.iter().filter_map(|report| match &report.outcome {
        SourceOutcome::Usable(availability) => Some(availability.free.clone()),
        SourceOutcome::Unusable(_) => None,
    });
    let slots = intersect::intersect_all(usable)
        .into_iter()
        .filter(|slot| slot.duration() >= query.min_slot)
        .collect();

    Ok(CommonAvailability { slots, sources })
}

/// Fetch every source concurrently and compute their common free time.
///
/// Zero sources yield an empty, successful result.
///
/// # Errors
/// - `AvailabilityError::TooManySources` if more than `query.max_sources` are given.
/// - `AvailabilityError::AllSourcesUnusable` if every source failed to fetch or parse.
pub async fn find_common_availability<F>(
    fetcher: &F,
    identifiers: &[String],
    query: &AvailabilityQuery,
) -> Result<CommonAvailability>
where
    F: FeedFetcher + ?Sized,
{
    if identifiers.len() > query.max_sources {
        return Err(AvailabilityError::TooManySources {
            given: identifiers.len(),
            max: query.max_sources,
        });
    }

    let reports = join_all(
        identifiers
            .iter()
            .map(|identifier| run_source(fetcher, identifier, query)),
    )
    .await;

    let usable = reports.iter().filter(|r| r.is_usable()).count();
    let result = combine(reports, query);
    match &result {
        Ok(common) => info!(
            sources = identifiers.len(),
            usable,
            common_slots = common.slots.len(),
            "computed common availability"
        ),
        Err(err) => warn!(error = %err, "no calendar source was usable"),
    }
    result
}

async fn run_source<F>(fetcher: &F, identifier: &str, query: &AvailabilityQuery) -> SourceReport
where
    F: FeedFetcher + ?Sized,
{
    let fetched = match tokio::time::timeout(query.fetch_timeout, fetcher.fetch(identifier)).await {
        Ok(fetched) => fetched,
        Err(_) => Err(FetchError::Timeout {
            seconds: query.fetch_timeout.as_secs(),
        }),
    };

    let outcome = fetched
        .map_err(SourceError::from)
        .and_then(|payload| source_availability(&payload, query));

    let outcome = match outcome {
        Ok(availability) => {
            info!(
                source = %identifier,
                busy = availability.busy.len(),
                free = availability.free.len(),
                skipped = availability.skipped.len(),
                "calendar source processed"
            );
            SourceOutcome::Usable(availability)
        }
        Err(error) => {
            warn!(source = %identifier, error = %error, "excluding calendar source");
            SourceOutcome::Unusable(error)
        }
    };

    SourceReport {
        identifier: identifier.to_string(),
        outcome,
    }
}
