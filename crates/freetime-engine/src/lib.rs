//! # freetime-engine
//!
//! Find the time windows when several independent calendars are all free.
//!
//! Each calendar feed (iCalendar text, usually fetched over HTTP) is parsed into busy
//! intervals, merged, and turned into free intervals bounded by a daily working window.
//! The free intervals of every readable calendar are then intersected into one
//! common-availability list. Calendars that cannot be fetched or parsed are left out
//! of the intersection instead of failing the whole run.
//!
//! ## Modules
//!
//! - [`feed`] — iCalendar payload → busy events within the search range
//! - [`entry`] — typed calendar entries mapped from raw feed properties
//! - [`expander`] — lazy, range-bounded RRULE expansion
//! - [`merge`] — busy intervals → minimal sorted set
//! - [`freebusy`] — merged busy intervals → free slots per working day
//! - [`intersect`] — free-slot lists → common free slots
//! - [`availability`] — concurrent fetch + per-source pipeline + aggregation
//! - [`fetch`] / [`cache`] — payload transport and its optional TTL cache
//! - [`config`] — engine configuration and validated queries
//! - [`slot`] — `TimeSlot`, `BusyEvent`, `SearchRange`, `WorkingWindow`
//! - [`dst`] — resolving wall-clock times across DST transitions
//! - [`error`] — error types

pub mod availability;
pub mod cache;
pub mod config;
pub mod dst;
pub mod entry;
pub mod error;
pub mod expander;
pub mod feed;
pub mod fetch;
pub mod freebusy;
pub mod intersect;
pub mod merge;
pub mod slot;

pub use availability::{
    combine, find_common_availability, source_availability, CommonAvailability, ErrorPayload,
    FreeWindow, SourceAvailability, SourceOutcome, SourceReport,
};
pub use cache::CachedFetcher;
pub use config::{AvailabilityQuery, EngineConfig};
pub use error::{AvailabilityError, ConfigError, EntryError, FetchError, ParseError, SourceError};
pub use feed::{parse_feed, ParsedFeed};
pub use fetch::{FeedFetcher, HttpFeedFetcher};
pub use freebusy::derive_free_slots;
pub use intersect::{intersect, intersect_all};
pub use merge::{merge_busy, merge_slots};
pub use slot::{BusyEvent, SearchRange, TimeSlot, WorkingWindow};
