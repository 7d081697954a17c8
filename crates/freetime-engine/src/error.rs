//! Error types for freetime-engine operations.
//!
//! Each pipeline stage owns its own error enum so failures never unwind past the stage
//! that produced them: a bad entry is an [`EntryError`] recorded next to the entries that
//! did parse, a bad document or fetch is a [`SourceError`] recorded against one source,
//! and only [`AvailabilityError`] reaches the caller as a whole-run failure.

use thiserror::Error;

/// Failure to obtain a raw payload for one calendar source.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("Invalid source identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Request failed: {0}")]
    Request(String),

    #[error("Unexpected HTTP status {status}")]
    Status { status: u16 },

    #[error("Fetch timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("Calendar payload is empty")]
    EmptyPayload,
}

/// The payload is not a well-formed calendar document at all.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Payload contains no VCALENDAR component")]
    NotACalendar,

    #[error("Malformed calendar document: {0}")]
    Malformed(String),
}

/// One calendar entry could not be turned into busy intervals.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EntryError {
    #[error("Entry has no DTSTART")]
    MissingStart,

    #[error("Invalid {property} value: {value}")]
    InvalidValue { property: String, value: String },

    #[error("Invalid recurrence rule: {0}")]
    InvalidRule(String),

    #[error("Entry ends before it starts")]
    InvertedRange,
}

/// Why a single source was excluded from the intersection.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// A source identifier paired with the reason it was unusable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFailure {
    pub identifier: String,
    pub error: SourceError,
}

/// Whole-run failures surfaced to the caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AvailabilityError {
    #[error("No calendar could be read: {}", describe_failures(.failures))]
    AllSourcesUnusable { failures: Vec<SourceFailure> },

    #[error("Too many calendar sources: {given} given, at most {max} allowed")]
    TooManySources { given: usize, max: usize },
}

/// Invalid engine configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid time of day: {0} (expected HH:MM)")]
    InvalidTimeOfDay(String),

    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    #[error("Invalid search range: start {start} is not before end {end}")]
    InvalidRange { start: String, end: String },

    #[error("Invalid duration: {field} = {value} is out of range")]
    InvalidDuration { field: String, value: i64 },

    #[error("Invalid configuration file: {0}")]
    Format(String),
}

fn describe_failures(failures: &[SourceFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{} ({})", f.identifier, f.error))
        .collect::<Vec<_>>()
        .join("; ")
}

pub type Result<T> = std::result::Result<T, AvailabilityError>;
