//! Engine configuration.
//!
//! [`EngineConfig`] is the serializable, all-defaults form read from TOML or built by a
//! caller; [`EngineConfig::query`] validates it into the [`AvailabilityQuery`] the
//! orchestrator runs with.

use chrono::{Duration, NaiveDate};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::dst::DstPolicy;
use crate::entry::TimeContext;
use crate::error::ConfigError;
use crate::merge::DEFAULT_MERGE_TOLERANCE_SECS;
use crate::slot::{SearchRange, WorkingWindow};

pub const DEFAULT_WORKING_HOURS_START: &str = "09:00";
pub const DEFAULT_WORKING_HOURS_END: &str = "17:00";
pub const DEFAULT_MIN_SLOT_MINUTES: i64 = 30;
pub const DEFAULT_HORIZON_DAYS: u32 = 7;
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 15;
pub const DEFAULT_MAX_SOURCES: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkingHours {
    pub start: String,
    pub end: String,
}

impl Default for WorkingHours {
    fn default() -> Self {
        Self {
            start: DEFAULT_WORKING_HOURS_START.to_string(),
            end: DEFAULT_WORKING_HOURS_END.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub working_hours: WorkingHours,
    /// IANA zone for calendar days, the working window, floating times and all-day dates.
    pub time_zone: String,
    pub horizon_days: u32,
    pub min_slot_minutes: i64,
    pub merge_tolerance_seconds: i64,
    pub fetch_timeout_seconds: u64,
    pub max_sources: usize,
    pub dst_policy: DstPolicy,
    /// Payload cache TTL; `0` disables caching.
    pub cache_ttl_seconds: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            working_hours: WorkingHours::default(),
            time_zone: "UTC".to_string(),
            horizon_days: DEFAULT_HORIZON_DAYS,
            min_slot_minutes: DEFAULT_MIN_SLOT_MINUTES,
            merge_tolerance_seconds: DEFAULT_MERGE_TOLERANCE_SECS,
            fetch_timeout_seconds: DEFAULT_FETCH_TIMEOUT_SECS,
            max_sources: DEFAULT_MAX_SOURCES,
            dst_policy: DstPolicy::default(),
            cache_ttl_seconds: 0,
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::Format(e.to_string()))
    }

    pub fn zone(&self) -> Result<Tz, ConfigError> {
        self.time_zone
            .parse::<Tz>()
            .map_err(|_| ConfigError::InvalidTimezone(self.time_zone.clone()))
    }

    pub fn working_window(&self) -> Result<WorkingWindow, ConfigError> {
        let mut window =
            WorkingWindow::parse(&self.working_hours.start, &self.working_hours.end, self.zone()?)?;
        window.dst_policy = self.dst_policy;
        Ok(window)
    }

    /// Validate into a query whose range starts at the beginning of `today`.
    pub fn query(&self, today: NaiveDate) -> Result<AvailabilityQuery, ConfigError> {
        let range = SearchRange::starting_on(today, self.horizon_days, self.zone()?)?;
        self.query_for(range)
    }

    /// Validate into a query over an explicit range.
    pub fn query_for(&self, range: SearchRange) -> Result<AvailabilityQuery, ConfigError> {
        Ok(AvailabilityQuery {
            range,
            window: self.working_window()?,
            min_slot: bounded(
                "min_slot_minutes",
                self.min_slot_minutes,
                Duration::try_minutes,
            )?,
            merge_tolerance: bounded(
                "merge_tolerance_seconds",
                self.merge_tolerance_seconds,
                Duration::try_seconds,
            )?,
            fetch_timeout: std::time::Duration::from_secs(self.fetch_timeout_seconds),
            max_sources: self.max_sources,
        })
    }
}

/// Negative values clamp to zero; values chrono cannot represent are rejected.
fn bounded(
    field: &str,
    value: i64,
    to_duration: fn(i64) -> Option<Duration>,
) -> Result<Duration, ConfigError> {
    to_duration(value.max(0)).ok_or_else(|| ConfigError::InvalidDuration {
        field: field.to_string(),
        value,
    })
}

/// Everything one availability run needs; read-only and shared across source tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AvailabilityQuery {
    pub range: SearchRange,
    pub window: WorkingWindow,
    pub min_slot: Duration,
    pub merge_tolerance: Duration,
    pub fetch_timeout: std::time::Duration,
    pub max_sources: usize,
}

impl AvailabilityQuery {
    /// A query with default tolerances for the given range and window.
    pub fn new(range: SearchRange, window: WorkingWindow) -> Self {
        Self {
            range,
            window,
            min_slot: Duration::minutes(DEFAULT_MIN_SLOT_MINUTES),
            merge_tolerance: Duration::seconds(DEFAULT_MERGE_TOLERANCE_SECS),
            fetch_timeout: std::time::Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
            max_sources: DEFAULT_MAX_SOURCES,
        }
    }

    pub fn time_context(&self) -> TimeContext {
        TimeContext {
            zone: self.window.time_zone,
            dst_policy: self.window.dst_policy,
        }
    }
}
