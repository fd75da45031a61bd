//! Query windows for event listings.
//!
//! Birthdays are naive local dates, but the calendar API wants instants.
//! `WindowMode::Compat` stamps the naive timestamp with a UTC designator
//! without converting it, which is how the windows of previously created
//! calendars were computed. `WindowMode::Utc` interprets the timestamp in
//! the system timezone first.

use chrono::{DateTime, Duration, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowMode {
    #[default]
    Compat,
    Utc,
}

impl std::str::FromStr for WindowMode {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "compat" => Ok(Self::Compat),
            "utc" => Ok(Self::Utc),
            other => Err(AppError::config(format!(
                "unknown window mode '{}' (expected compat or utc)",
                other
            ))),
        }
    }
}

pub fn to_utc(naive: NaiveDateTime, mode: WindowMode) -> DateTime<Utc> {
    match mode {
        WindowMode::Compat => naive.and_utc(),
        // Nonexistent local times (DST gaps) have no mapping; label them instead
        WindowMode::Utc => Local
            .from_local_datetime(&naive)
            .earliest()
            .map(|local| local.with_timezone(&Utc))
            .unwrap_or_else(|| naive.and_utc()),
    }
}

/// `[date 00:00, date 23:59]`.
pub fn day_window(date: NaiveDate, mode: WindowMode) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = date.and_time(chrono::NaiveTime::MIN);
    let end = start + Duration::hours(23) + Duration::minutes(59);
    (to_utc(start, mode), to_utc(end, mode))
}

pub fn range_window(start: NaiveDateTime, end: NaiveDateTime, mode: WindowMode) -> (DateTime<Utc>, DateTime<Utc>) {
    (to_utc(start, mode), to_utc(end, mode))
}

/// `YYYY-MM-DDTHH:MM:SSZ`, the form sent as `timeMin` / `timeMax`.
pub fn format_instant(instant: DateTime<Utc>) -> String {
    instant.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}
