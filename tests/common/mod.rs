// In-memory calendar service shared by the integration tests
#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use bdaycal::calendar::{CalendarService, EventQuery, Page};
use bdaycal::error::{AppError, AppResult};
use bdaycal::models::{CalendarEntry, CalendarEvent, EventStart, NewEvent};

#[derive(Debug, Clone)]
pub struct StoredEvent {
    pub calendar_id: String,
    pub event: CalendarEvent,
}

pub struct FakeCalendarService {
    calendars: Vec<CalendarEntry>,
    calendar_page_size: usize,
    event_page_size: usize,
    insert_delay: Duration,
    events: Mutex<Vec<StoredEvent>>,
    gone: Mutex<HashSet<String>>,
    insert_failure: Mutex<Option<u16>>,
    delete_failure: Mutex<Option<u16>>,
    next_id: AtomicUsize,
    pub calendar_list_calls: AtomicUsize,
    pub event_list_calls: AtomicUsize,
    pub insert_calls: AtomicUsize,
    pub delete_calls: AtomicUsize,
}

impl FakeCalendarService {
    pub fn new(calendars: Vec<CalendarEntry>) -> Self {
        Self {
            calendars,
            calendar_page_size: 100,
            event_page_size: 250,
            insert_delay: Duration::ZERO,
            events: Mutex::new(Vec::new()),
            gone: Mutex::new(HashSet::new()),
            insert_failure: Mutex::new(None),
            delete_failure: Mutex::new(None),
            next_id: AtomicUsize::new(1),
            calendar_list_calls: AtomicUsize::new(0),
            event_list_calls: AtomicUsize::new(0),
            insert_calls: AtomicUsize::new(0),
            delete_calls: AtomicUsize::new(0),
        }
    }

    /// A single calendar named "Birthdays" with id "bday-cal".
    pub fn birthdays() -> Self {
        Self::new(vec![CalendarEntry::new("bday-cal", "Birthdays")])
    }

    pub fn with_calendar_page_size(mut self, size: usize) -> Self {
        self.calendar_page_size = size;
        self
    }

    pub fn with_event_page_size(mut self, size: usize) -> Self {
        self.event_page_size = size;
        self
    }

    /// Widens the exists-then-insert race window.
    pub fn with_insert_delay(mut self, delay: Duration) -> Self {
        self.insert_delay = delay;
        self
    }

    pub fn seed(&self, calendar_id: &str, title: &str, date: NaiveDate) -> String {
        let id = format!("seed-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.events.lock().unwrap().push(StoredEvent {
            calendar_id: calendar_id.to_string(),
            event: CalendarEvent {
                id: id.clone(),
                summary: title.to_string(),
                start: Some(EventStart::AllDay(date)),
            },
        });
        id
    }

    /// Deleting `event_id` answers 404 while it stays listed.
    pub fn mark_gone(&self, event_id: &str) {
        self.gone.lock().unwrap().insert(event_id.to_string());
    }

    pub fn fail_inserts_with(&self, status: u16) {
        *self.insert_failure.lock().unwrap() = Some(status);
    }

    pub fn fail_deletes_with(&self, status: u16) {
        *self.delete_failure.lock().unwrap() = Some(status);
    }

    pub fn events(&self) -> Vec<StoredEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn titles_on(&self, date: NaiveDate) -> Vec<String> {
        self.events()
            .into_iter()
            .filter(|stored| stored.event.start_date() == Some(date))
            .map(|stored| stored.event.summary)
            .collect()
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

fn start_instant(event: &CalendarEvent) -> Option<DateTime<Utc>> {
    match event.start? {
        EventStart::AllDay(date) => Some(date.and_hms_opt(0, 0, 0)?.and_utc()),
        EventStart::At(at) => Some(at),
    }
}

fn paginate<T: Clone>(items: &[T], page_size: usize, page_token: Option<&str>) -> AppResult<Page<T>> {
    let offset = match page_token {
        Some(token) => token
            .parse::<usize>()
            .map_err(|_| AppError::remote("list", Some(400), format!("bad page token {}", token)))?,
        None => 0,
    };
    let end = (offset + page_size).min(items.len());
    let next_page_token = (end < items.len()).then(|| end.to_string());
    Ok(Page {
        items: items[offset.min(end)..end].to_vec(),
        next_page_token,
    })
}

#[async_trait]
impl CalendarService for FakeCalendarService {
    async fn list_calendars(&self, page_token: Option<&str>) -> AppResult<Page<CalendarEntry>> {
        self.calendar_list_calls.fetch_add(1, Ordering::SeqCst);
        paginate(&self.calendars, self.calendar_page_size, page_token)
    }

    async fn list_events(
        &self,
        calendar_id: &str,
        query: &EventQuery,
        page_token: Option<&str>,
    ) -> AppResult<Page<CalendarEvent>> {
        self.event_list_calls.fetch_add(1, Ordering::SeqCst);

        let needle = query.text.as_ref().map(|t| t.to_lowercase());
        let mut matching: Vec<CalendarEvent> = self
            .events
            .lock()
            .unwrap()
            .iter()
            .filter(|stored| stored.calendar_id == calendar_id)
            .filter(|stored| {
                start_instant(&stored.event)
                    .map(|at| at >= query.time_min && at <= query.time_max)
                    .unwrap_or(false)
            })
            // Free-text search is case-insensitive substring matching
            .filter(|stored| match &needle {
                Some(needle) => stored.event.summary.to_lowercase().contains(needle.as_str()),
                None => true,
            })
            .map(|stored| stored.event.clone())
            .collect();
        matching.sort_by_key(start_instant);

        paginate(&matching, self.event_page_size, page_token)
    }

    async fn insert_event(&self, calendar_id: &str, event: &NewEvent) -> AppResult<CalendarEvent> {
        self.insert_calls.fetch_add(1, Ordering::SeqCst);
        let failure = *self.insert_failure.lock().unwrap();
        if let Some(status) = failure {
            return Err(AppError::remote("insert event", Some(status), "insert refused"));
        }
        if !self.insert_delay.is_zero() {
            tokio::time::sleep(self.insert_delay).await;
        }

        let created = CalendarEvent {
            id: format!("evt-{}", self.next_id.fetch_add(1, Ordering::SeqCst)),
            summary: event.summary.clone(),
            start: Some(EventStart::AllDay(event.start_date)),
        };
        self.events.lock().unwrap().push(StoredEvent {
            calendar_id: calendar_id.to_string(),
            event: created.clone(),
        });
        Ok(created)
    }

    async fn delete_event(&self, calendar_id: &str, event_id: &str) -> AppResult<()> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        let failure = *self.delete_failure.lock().unwrap();
        if let Some(status) = failure {
            return Err(AppError::remote("delete event", Some(status), "delete refused"));
        }
        if self.gone.lock().unwrap().contains(event_id) {
            return Err(AppError::remote("delete event", Some(404), "Not Found"));
        }

        let mut events = self.events.lock().unwrap();
        let before = events.len();
        events.retain(|stored| !(stored.calendar_id == calendar_id && stored.event.id == event_id));
        if events.len() == before {
            return Err(AppError::remote("delete event", Some(410), "Resource has been deleted"));
        }
        Ok(())
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}
