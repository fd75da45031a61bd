// Birthday synchronization
// Idempotent insertion of birthday events and prefix-based bulk removal

use std::ops::RangeInclusive;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use log::{debug, info, warn};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::calendar::window::{day_window, range_window};
use crate::calendar::{fetch_all_calendars, fetch_all_events, CalendarService, EventQuery, WindowMode};
use crate::error::{AppError, AppResult};
use crate::models::calendar::find_by_name;
use crate::models::{anniversary_in, BirthdayRecord, CalendarEntry, CalendarEvent, LeapDayPolicy, NewEvent, SyncReport};

pub mod in_flight;
pub mod title;

pub use in_flight::{InFlightKey, InFlightLocks};
pub use title::{ordinal_suffix, title_for};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOptions {
    pub window_mode: WindowMode,
    pub leap_day: LeapDayPolicy,
    /// Records processed at once by `sync_all`; 1 is sequential.
    pub concurrency: usize,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            window_mode: WindowMode::default(),
            leap_day: LeapDayPolicy::default(),
            concurrency: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddOutcome {
    Inserted(CalendarEvent),
    AlreadyPresent,
    /// Feb 29 birthday in a common year under `LeapDayPolicy::Skip`.
    LeapDaySkipped,
}

impl AddOutcome {
    fn tally(&self, report: &mut SyncReport) {
        match self {
            Self::Inserted(_) => report.inserted += 1,
            Self::AlreadyPresent => report.already_present += 1,
            Self::LeapDaySkipped => report.leap_day_skipped += 1,
        }
    }
}

/// Naive bounds of a bulk removal, converted per the session's window mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteRange {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl DeleteRange {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> AppResult<Self> {
        if start >= end {
            return Err(AppError::config(format!(
                "removal range start {} is not before end {}",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    pub fn from_dates(start: NaiveDate, end: NaiveDate) -> AppResult<Self> {
        Self::new(start.and_time(chrono::NaiveTime::MIN), end.and_time(chrono::NaiveTime::MIN))
    }
}

impl Default for DeleteRange {
    /// 2015-01-01T00:00:00 through 2053-01-01T00:00:00.
    fn default() -> Self {
        let midnight = |year| {
            NaiveDate::from_ymd_opt(year, 1, 1)
                .unwrap_or_default()
                .and_time(chrono::NaiveTime::MIN)
        };
        Self {
            start: midnight(2015),
            end: midnight(2053),
        }
    }
}

/// One event a sync would target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedEvent {
    pub date: NaiveDate,
    pub title: String,
}

/// Events a sync of `year` would target, without touching the service.
/// Records skipped by the leap-day policy are left out.
pub fn plan_year(records: &[BirthdayRecord], year: i32, policy: LeapDayPolicy) -> AppResult<Vec<PlannedEvent>> {
    let mut planned = Vec::with_capacity(records.len());
    for record in records {
        if let Some(date) = anniversary_in(record.birth_date, year, policy)? {
            planned.push(PlannedEvent {
                date,
                title: title_for(&record.display_name(), record.birth_date, year),
            });
        }
    }
    Ok(planned)
}

/// A session bound to one calendar of the remote service.
#[derive(Clone)]
pub struct BirthdaySynchronizer {
    service: Arc<dyn CalendarService>,
    calendar: CalendarEntry,
    records: Arc<Vec<BirthdayRecord>>,
    options: SyncOptions,
    in_flight: InFlightLocks,
}

impl BirthdaySynchronizer {
    /// Resolves `calendar_name` to its id. No other remote call is made when
    /// the name has no match.
    pub async fn connect(
        service: Arc<dyn CalendarService>,
        calendar_name: &str,
        options: SyncOptions,
    ) -> AppResult<Self> {
        let calendars = fetch_all_calendars(service.as_ref()).await?;
        let calendar = find_by_name(&calendars, calendar_name)
            .cloned()
            .ok_or_else(|| AppError::CalendarNotFound(calendar_name.to_string()))?;

        info!("Using calendar '{}' ({})", calendar.display_name, calendar.id);
        Ok(Self {
            service,
            calendar,
            records: Arc::new(Vec::new()),
            options,
            in_flight: InFlightLocks::new(),
        })
    }

    pub fn calendar(&self) -> &CalendarEntry {
        &self.calendar
    }

    pub fn set_records(&mut self, records: Vec<BirthdayRecord>) {
        self.records = Arc::new(records);
    }

    /// True when an event titled exactly `title` starts within `date`'s day window.
    pub async fn event_exists(&self, date: NaiveDate, title: &str) -> AppResult<bool> {
        let (time_min, time_max) = day_window(date, self.options.window_mode);
        let query = EventQuery::between(time_min, time_max);
        let events = fetch_all_events(self.service.as_ref(), &self.calendar.id, &query).await?;
        Ok(events.iter().any(|event| event.summary == title))
    }

    /// Inserts an all-day event unless one with the same title already
    /// exists that day. `None` means nothing was written.
    pub async fn add_event(&self, date: NaiveDate, title: &str) -> AppResult<Option<CalendarEvent>> {
        let _guard = self
            .in_flight
            .acquire(InFlightKey::new(&self.calendar.id, date, title))
            .await;

        if self.event_exists(date, title).await? {
            debug!("'{}' already on {}, skipping", title, date);
            return Ok(None);
        }

        let created = self
            .service
            .insert_event(&self.calendar.id, &NewEvent::all_day(date, title))
            .await?;
        info!("Added '{}' on {}", title, date);
        Ok(Some(created))
    }

    pub async fn add_birthday(&self, name: &str, birth_date: NaiveDate, target_year: i32) -> AppResult<AddOutcome> {
        let Some(date) = anniversary_in(birth_date, target_year, self.options.leap_day)? else {
            info!("Skipping {}'s leap-day birthday in {}", name, target_year);
            return Ok(AddOutcome::LeapDaySkipped);
        };

        let title = title_for(name, birth_date, target_year);
        Ok(match self.add_event(date, &title).await? {
            Some(event) => AddOutcome::Inserted(event),
            None => AddOutcome::AlreadyPresent,
        })
    }

    /// Adds every loaded record's birthday for `target_year`. The first
    /// error aborts the run.
    pub async fn sync_all(&self, target_year: i32) -> AppResult<SyncReport> {
        if self.options.concurrency <= 1 {
            let mut report = SyncReport::default();
            for record in self.records.iter() {
                self.add_birthday(&record.display_name(), record.birth_date, target_year)
                    .await?
                    .tally(&mut report);
            }
            return Ok(report);
        }
        self.sync_all_concurrent(target_year).await
    }

    async fn sync_all_concurrent(&self, target_year: i32) -> AppResult<SyncReport> {
        let semaphore = Arc::new(Semaphore::new(self.options.concurrency));
        let mut tasks = JoinSet::new();

        for record in self.records.iter().cloned() {
            let semaphore = Arc::clone(&semaphore);
            let session = self.clone();
            tasks.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| AppError::Worker(e.to_string()))?;
                session
                    .add_birthday(&record.display_name(), record.birth_date, target_year)
                    .await
            });
        }

        let mut report = SyncReport::default();
        while let Some(joined) = tasks.join_next().await {
            match Self::join_outcome(joined) {
                Ok(outcome) => outcome.tally(&mut report),
                Err(e) => {
                    tasks.abort_all();
                    return Err(e);
                }
            }
        }
        Ok(report)
    }

    fn join_outcome(joined: Result<AppResult<AddOutcome>, tokio::task::JoinError>) -> AppResult<AddOutcome> {
        match joined {
            Ok(outcome) => outcome,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => Err(AppError::Worker(e.to_string())),
        }
    }

    /// `sync_all` for each year in order, with the counts summed.
    pub async fn sync_years(&self, years: RangeInclusive<i32>) -> AppResult<SyncReport> {
        let mut total = SyncReport::default();
        for year in years {
            let report = self.sync_all(year).await?;
            debug!("Year {}: {:?}", year, report);
            total.merge(&report);
        }
        Ok(total)
    }

    /// Deletes every event in `range` whose title starts with `name_prefix`.
    /// Events deleted by someone else meanwhile count as `already_gone`.
    pub async fn remove_matching(&self, name_prefix: &str, range: &DeleteRange) -> AppResult<SyncReport> {
        let (time_min, time_max) = range_window(range.start, range.end, self.options.window_mode);
        let query = EventQuery::between(time_min, time_max).matching(name_prefix);
        let events = fetch_all_events(self.service.as_ref(), &self.calendar.id, &query).await?;

        let mut report = SyncReport::default();
        // The service's q search is fuzzy; only exact prefixes go
        for event in events.iter().filter(|e| e.summary.starts_with(name_prefix)) {
            match self.service.delete_event(&self.calendar.id, &event.id).await {
                Ok(()) => {
                    info!("Deleted '{}' ({})", event.summary, event.id);
                    report.deleted += 1;
                }
                Err(e) if e.is_gone() => {
                    warn!("'{}' ({}) was already deleted", event.summary, event.id);
                    report.already_gone += 1;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(report)
    }
}
