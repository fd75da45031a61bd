// Calendar integration module
// Remote calendar capability set, its Google implementation and credentials

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::debug;

use crate::error::{AppError, AppResult};
use crate::models::{CalendarEntry, CalendarEvent, NewEvent};

pub mod credentials;
pub mod google;
pub mod window;

pub use credentials::{CredentialProvider, OAuthCredentialProvider, StaticTokenProvider};
pub use google::GoogleCalendarClient;
pub use window::WindowMode;

/// One page of a cursor-paginated listing.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_page_token: Option<String>,
}

/// Filters for an event listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventQuery {
    pub time_min: DateTime<Utc>,
    pub time_max: DateTime<Utc>,
    /// Free-text search, matched by the service against any event field.
    pub text: Option<String>,
    /// Expand recurring events into single instances.
    pub single_events: bool,
    pub order_by_start: bool,
}

impl EventQuery {
    pub fn between(time_min: DateTime<Utc>, time_max: DateTime<Utc>) -> Self {
        Self {
            time_min,
            time_max,
            text: None,
            single_events: true,
            order_by_start: true,
        }
    }

    pub fn matching(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }
}

#[async_trait]
pub trait CalendarService: Send + Sync {
    async fn list_calendars(&self, page_token: Option<&str>) -> AppResult<Page<CalendarEntry>>;

    async fn list_events(
        &self,
        calendar_id: &str,
        query: &EventQuery,
        page_token: Option<&str>,
    ) -> AppResult<Page<CalendarEvent>>;

    async fn insert_event(&self, calendar_id: &str, event: &NewEvent) -> AppResult<CalendarEvent>;

    async fn delete_event(&self, calendar_id: &str, event_id: &str) -> AppResult<()>;
}

/// Page tokens handed out so far in one listing. A token seen twice means
/// the service is cycling and the listing would never end.
#[derive(Debug, Default)]
struct SeenTokens(HashSet<String>);

impl SeenTokens {
    fn advance(&mut self, operation: &str, next: Option<String>) -> AppResult<Option<String>> {
        match next {
            Some(token) if !self.0.insert(token.clone()) => Err(AppError::remote(
                operation,
                Some(200),
                format!("page token '{}' was already visited", token),
            )),
            next => Ok(next),
        }
    }
}

/// Every calendar visible to the credential, across all pages.
pub async fn fetch_all_calendars(service: &dyn CalendarService) -> AppResult<Vec<CalendarEntry>> {
    let mut calendars = Vec::new();
    let mut page_token: Option<String> = None;
    let mut seen = SeenTokens::default();

    loop {
        let page = service.list_calendars(page_token.as_deref()).await?;
        calendars.extend(page.items);
        page_token = seen.advance("list calendars", page.next_page_token)?;
        if page_token.is_none() {
            break;
        }
    }

    debug!("Fetched {} calendars", calendars.len());
    Ok(calendars)
}

/// Every event matching `query`, across all pages.
pub async fn fetch_all_events(
    service: &dyn CalendarService,
    calendar_id: &str,
    query: &EventQuery,
) -> AppResult<Vec<CalendarEvent>> {
    let mut events = Vec::new();
    let mut page_token: Option<String> = None;
    let mut seen = SeenTokens::default();

    loop {
        let page = service.list_events(calendar_id, query, page_token.as_deref()).await?;
        events.extend(page.items);
        page_token = seen.advance("list events", page.next_page_token)?;
        if page_token.is_none() {
            break;
        }
    }

    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seen_tokens_reject_any_revisit() {
        let mut seen = SeenTokens::default();
        assert_eq!(seen.advance("list events", Some("A".to_string())).unwrap(), Some("A".to_string()));
        assert_eq!(seen.advance("list events", Some("B".to_string())).unwrap(), Some("B".to_string()));
        assert!(seen.advance("list events", Some("A".to_string())).is_err());
    }

    #[test]
    fn test_seen_tokens_end_of_listing() {
        let mut seen = SeenTokens::default();
        assert_eq!(seen.advance("list calendars", None).unwrap(), None);
    }
}
