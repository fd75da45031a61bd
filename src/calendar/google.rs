// Google Calendar integration
// REST v3 client behind the CalendarService trait

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use log::{debug, info, trace, warn};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

use super::window::format_instant;
use super::{CalendarService, CredentialProvider, EventQuery, Page};
use crate::error::{AppError, AppResult};
use crate::http_config::HttpConfig;
use crate::models::{CalendarEntry, CalendarEvent, EventStart, NewEvent, Reminder};
use crate::utils::retry::{retry_with_exponential_backoff, RetryConfig};

pub const DEFAULT_BASE_URL: &str = "https://www.googleapis.com/calendar/v3/";

/// Largest page the events endpoint hands out.
const MAX_RESULTS: &str = "250";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CalendarListResponse {
    #[serde(default)]
    items: Vec<GoogleCalendarListEntry>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GoogleCalendarListEntry {
    id: String,
    #[serde(default)]
    summary: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventsResponse {
    #[serde(default)]
    items: Vec<GoogleCalendarEvent>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GoogleCalendarEvent {
    id: Option<String>,
    summary: Option<String>,
    start: Option<GoogleEventTime>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleEventTime {
    date: Option<NaiveDate>,
    date_time: Option<DateTime<FixedOffset>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InsertEventBody<'a> {
    id: &'a str,
    summary: &'a str,
    description: &'a str,
    start: AllDayTime,
    end: AllDayTime,
    reminders: RemindersBody<'a>,
}

#[derive(Debug, Serialize)]
struct AllDayTime {
    date: NaiveDate,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RemindersBody<'a> {
    use_default: bool,
    overrides: &'a [Reminder],
}

#[derive(Debug, Deserialize)]
struct GoogleErrorResponse {
    error: GoogleErrorDetail,
}

#[derive(Debug, Deserialize)]
struct GoogleErrorDetail {
    message: String,
    #[serde(default)]
    errors: Vec<GoogleErrorItem>,
}

#[derive(Debug, Deserialize)]
struct GoogleErrorItem {
    reason: Option<String>,
}

/// Reasons Google attaches to a 403 when a quota, not a permission, is the problem.
const RATE_LIMIT_REASONS: [&str; 2] = ["rateLimitExceeded", "userRateLimitExceeded"];

impl GoogleErrorDetail {
    fn is_rate_limit(&self) -> bool {
        self.errors
            .iter()
            .filter_map(|item| item.reason.as_deref())
            .any(|reason| RATE_LIMIT_REASONS.contains(&reason))
    }
}

impl GoogleCalendarEvent {
    /// `None` when the service sent an event without an id.
    fn into_event(self) -> Option<CalendarEvent> {
        let start = self.start.and_then(|time| match (time.date, time.date_time) {
            (Some(date), _) => Some(EventStart::AllDay(date)),
            (None, Some(at)) => Some(EventStart::At(at.with_timezone(&Utc))),
            (None, None) => None,
        });
        Some(CalendarEvent {
            id: self.id?,
            summary: self.summary.unwrap_or_default(),
            start,
        })
    }
}

impl<'a> InsertEventBody<'a> {
    fn new(id: &'a str, event: &'a NewEvent) -> Self {
        Self {
            id,
            summary: &event.summary,
            description: &event.description,
            start: AllDayTime { date: event.start_date },
            end: AllDayTime { date: event.end_date },
            reminders: RemindersBody {
                use_default: event.reminders.use_default,
                overrides: &event.reminders.overrides,
            },
        }
    }
}

fn event_query_params(query: &EventQuery, page_token: Option<&str>) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("timeMin", format_instant(query.time_min)),
        ("timeMax", format_instant(query.time_max)),
        ("maxResults", MAX_RESULTS.to_string()),
    ];
    if let Some(text) = &query.text {
        params.push(("q", text.clone()));
    }
    if query.single_events {
        params.push(("singleEvents", "true".to_string()));
        // Google only accepts startTime ordering on expanded instances
        if query.order_by_start {
            params.push(("orderBy", "startTime".to_string()));
        }
    }
    if let Some(token) = page_token {
        params.push(("pageToken", token.to_string()));
    }
    params
}

/// Client-chosen event id. Google accepts 5-1024 characters of base32hex
/// (`0-9a-v`); a simple uuid is 32 lowercase hex digits.
fn new_event_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Maps a non-success response onto `AppError`, preferring Google's own
/// error message over the raw body.
async fn check_status(operation: &str, response: Response) -> AppResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let (message, rate_limited) = match serde_json::from_str::<GoogleErrorResponse>(&body) {
        Ok(parsed) => {
            let rate_limited = parsed.error.is_rate_limit();
            (parsed.error.message, rate_limited)
        }
        Err(_) if body.trim().is_empty() => (status.canonical_reason().unwrap_or("request failed").to_string(), false),
        Err(_) => (body, false),
    };

    if status == StatusCode::UNAUTHORIZED {
        return Err(AppError::auth(format!("{} rejected the access token: {}", operation, message)));
    }
    if rate_limited {
        return Err(AppError::RateLimited {
            operation: operation.to_string(),
            status: status.as_u16(),
            message,
        });
    }
    Err(AppError::remote(operation, Some(status.as_u16()), message))
}

async fn read_json<T: DeserializeOwned>(operation: &str, response: Response) -> AppResult<T> {
    let status = response.status().as_u16();
    let body = response.text().await?;
    serde_json::from_str(&body).map_err(|e| {
        AppError::remote(operation, Some(status), format!("malformed response body: {}", e))
    })
}

pub struct GoogleCalendarClient {
    http: Client,
    base_url: Url,
    credentials: Arc<dyn CredentialProvider>,
    retry: RetryConfig,
}

impl GoogleCalendarClient {
    pub fn new(credentials: Arc<dyn CredentialProvider>, config: &HttpConfig) -> AppResult<Self> {
        Self::with_base_url(credentials, config, DEFAULT_BASE_URL)
    }

    /// Client against another API root, e.g. a local test server.
    pub fn with_base_url(
        credentials: Arc<dyn CredentialProvider>,
        config: &HttpConfig,
        base_url: &str,
    ) -> AppResult<Self> {
        let mut base_url = Url::parse(base_url)
            .map_err(|e| AppError::config(format!("invalid calendar API URL '{}': {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(AppError::config(format!("calendar API URL '{}' cannot be a base", base_url)));
        }
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self {
            http: config.build_client()?,
            base_url,
            credentials,
            retry: config.to_retry_config(),
        })
    }

    /// `base_url` extended by `segments`, each percent-encoded as one path segment.
    fn endpoint(&self, segments: &[&str]) -> AppResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| AppError::config(format!("calendar API URL '{}' cannot be a base", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn request(&self, method: Method, url: Url) -> AppResult<RequestBuilder> {
        let token = self.credentials.access_token().await?;
        Ok(self.http.request(method, url).bearer_auth(token))
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        operation: &str,
        url: &Url,
        params: &[(&'static str, String)],
    ) -> AppResult<T> {
        trace!("GET {} {:?}", url, params);
        let response = self.request(Method::GET, url.clone()).await?.query(params).send().await?;
        let response = check_status(operation, response).await?;
        read_json(operation, response).await
    }
}

#[async_trait]
impl CalendarService for GoogleCalendarClient {
    async fn list_calendars(&self, page_token: Option<&str>) -> AppResult<Page<CalendarEntry>> {
        let url = self.endpoint(&["users", "me", "calendarList"])?;
        let params: Vec<(&'static str, String)> = page_token
            .map(|token| vec![("pageToken", token.to_string())])
            .unwrap_or_default();

        let response: CalendarListResponse = retry_with_exponential_backoff(&self.retry, "list calendars", || {
            self.get_json("list calendars", &url, &params)
        })
        .await?;

        Ok(Page {
            items: response
                .items
                .into_iter()
                .map(|item| CalendarEntry::new(item.id, item.summary))
                .collect(),
            next_page_token: response.next_page_token,
        })
    }

    async fn list_events(
        &self,
        calendar_id: &str,
        query: &EventQuery,
        page_token: Option<&str>,
    ) -> AppResult<Page<CalendarEvent>> {
        let url = self.endpoint(&["calendars", calendar_id, "events"])?;
        let params = event_query_params(query, page_token);

        let response: EventsResponse = retry_with_exponential_backoff(&self.retry, "list events", || {
            self.get_json("list events", &url, &params)
        })
        .await?;

        debug!(
            "Listed {} events in {} between {} and {}",
            response.items.len(),
            calendar_id,
            query.time_min,
            query.time_max
        );
        let items = response
            .items
            .into_iter()
            .filter_map(|item| {
                let summary = item.summary.clone();
                let event = item.into_event();
                if event.is_none() {
                    warn!("Ignoring event without id in {} ({:?})", calendar_id, summary);
                }
                event
            })
            .collect();
        Ok(Page {
            items,
            next_page_token: response.next_page_token,
        })
    }

    /// Every attempt posts the same client-chosen id. A 409 on a retry means
    /// an earlier attempt was stored even though its response was lost.
    async fn insert_event(&self, calendar_id: &str, event: &NewEvent) -> AppResult<CalendarEvent> {
        let url = self.endpoint(&["calendars", calendar_id, "events"])?;
        let event_id = new_event_id();
        let body = InsertEventBody::new(&event_id, event);
        let attempts = AtomicU32::new(0);
        let (url, body, attempts) = (&url, &body, &attempts);

        let created: Option<GoogleCalendarEvent> =
            retry_with_exponential_backoff(&self.retry, "insert event", move || async move {
                let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                let response = self.request(Method::POST, url.clone()).await?.json(body).send().await?;
                if attempt > 1 && response.status() == StatusCode::CONFLICT {
                    return Ok(None);
                }
                let response = check_status("insert event", response).await?;
                read_json::<GoogleCalendarEvent>("insert event", response).await.map(Some)
            })
            .await?;

        let created = match created {
            Some(created) => created
                .into_event()
                .ok_or_else(|| AppError::remote("insert event", Some(200), "created event has no id"))?,
            None => {
                info!(
                    "'{}' on {} was stored by an earlier attempt as {}",
                    event.summary, event.start_date, event_id
                );
                CalendarEvent {
                    id: event_id,
                    summary: event.summary.clone(),
                    start: Some(EventStart::AllDay(event.start_date)),
                }
            }
        };
        debug!("Inserted '{}' on {} as {}", event.summary, event.start_date, created.id);
        Ok(created)
    }

    async fn delete_event(&self, calendar_id: &str, event_id: &str) -> AppResult<()> {
        let url = self.endpoint(&["calendars", calendar_id, "events", event_id])?;
        let url = &url;

        retry_with_exponential_backoff(&self.retry, "delete event", move || async move {
            let response = self.request(Method::DELETE, url.clone()).await?.send().await?;
            check_status("delete event", response).await?;
            Ok(())
        })
        .await?;

        debug!("Deleted event {} from {}", event_id, calendar_id);
        Ok(())
    }
}
