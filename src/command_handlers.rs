//! Command handlers module
//!
//! One handler per CLI command. Handlers take the calendar service as an
//! argument so they run unchanged against the Google client or a fake.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use chrono::NaiveDate;
use log::{info, warn};

use crate::calendar::{
    fetch_all_calendars, CalendarService, CredentialProvider, GoogleCalendarClient, OAuthCredentialProvider,
    StaticTokenProvider,
};
use crate::config::AppConfig;
use crate::error::{AppError, AppResult};
use crate::http_config::HttpConfig;
use crate::models::{CalendarEntry, SyncReport};
use crate::store::BirthdayStore;
use crate::sync::{plan_year, BirthdaySynchronizer, DeleteRange, PlannedEvent};
use crate::utils::logging;

/// Flags of the `sync` command; each one overrides its config key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncRequest {
    pub from: Option<i32>,
    pub to: Option<i32>,
    pub file: Option<PathBuf>,
    pub calendar: Option<String>,
}

impl SyncRequest {
    /// `config` with the flags applied, validated.
    pub fn resolve(&self, config: &AppConfig) -> AppResult<AppConfig> {
        let mut resolved = config.clone();
        if let Some(from) = self.from {
            resolved.first_year = from;
        }
        if let Some(to) = self.to {
            resolved.last_year = to;
        }
        if let Some(file) = &self.file {
            resolved.birthdays_file = file.clone();
        }
        if let Some(calendar) = &self.calendar {
            resolved.calendar_name = calendar.clone();
        }
        resolved.validate()?;
        Ok(resolved)
    }
}

/// Planned events of one year, for `--dry-run`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YearPlan {
    pub year: i32,
    pub events: Vec<PlannedEvent>,
}

pub struct CommandHandlers {
    config: AppConfig,
}

impl CommandHandlers {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn http_config(&self) -> HttpConfig {
        HttpConfig::calendar_api().with_retry(&self.config.retry.to_retry_config())
    }

    /// `BDAYCAL_ACCESS_TOKEN` when set, otherwise the stored OAuth token.
    pub fn credential_provider(&self) -> Arc<dyn CredentialProvider> {
        match StaticTokenProvider::from_env() {
            Some(provider) => {
                logging::log_auth_event("Using access token from environment", "");
                Arc::new(provider)
            }
            None => Arc::new(OAuthCredentialProvider::new(
                self.config.client_secret_path(),
                self.config.token_path(),
            )),
        }
    }

    pub fn calendar_service(&self) -> AppResult<Arc<dyn CalendarService>> {
        let client = GoogleCalendarClient::new(self.credential_provider(), &self.http_config())?;
        Ok(Arc::new(client))
    }

    /// Imports the birthday file and adds every birthday for each year of
    /// the resolved range.
    pub async fn run_sync(&self, service: Arc<dyn CalendarService>, request: &SyncRequest) -> AppResult<SyncReport> {
        let config = request.resolve(&self.config)?;
        let started = Instant::now();

        let mut store = BirthdayStore::new();
        store.import(&config.birthdays_file)?;
        if store.is_empty() {
            warn!("{} lists no birthdays", config.birthdays_file.display());
        }

        let mut session = BirthdaySynchronizer::connect(service, &config.calendar_name, config.sync_options()).await?;
        session.set_records(store.records().to_vec());

        info!(
            "Syncing {} birthdays for {}..={}",
            store.len(),
            config.first_year,
            config.last_year
        );
        let report = session.sync_years(config.first_year..=config.last_year).await?;

        logging::log_sync_summary(&session.calendar().display_name, &report, started.elapsed().as_millis() as u64);
        Ok(report)
    }

    /// What `run_sync` would insert at most, computed without any remote call.
    pub fn plan_sync(&self, request: &SyncRequest) -> AppResult<Vec<YearPlan>> {
        let config = request.resolve(&self.config)?;

        let mut store = BirthdayStore::new();
        store.import(&config.birthdays_file)?;

        (config.first_year..=config.last_year)
            .map(|year| {
                plan_year(store.records(), year, config.leap_day).map(|events| YearPlan { year, events })
            })
            .collect()
    }

    /// Deletes every event whose title starts with `prefix` between
    /// `start` and `end` (dates, midnight). Missing bounds use the defaults.
    pub async fn run_remove(
        &self,
        service: Arc<dyn CalendarService>,
        prefix: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> AppResult<SyncReport> {
        if prefix.trim().is_empty() {
            return Err(AppError::config("refusing to remove events with an empty prefix"));
        }

        let defaults = DeleteRange::default();
        let range = DeleteRange::new(
            start.map(|d| d.and_time(chrono::NaiveTime::MIN)).unwrap_or(defaults.start),
            end.map(|d| d.and_time(chrono::NaiveTime::MIN)).unwrap_or(defaults.end),
        )?;

        let started = Instant::now();
        let session =
            BirthdaySynchronizer::connect(service, &self.config.calendar_name, self.config.sync_options()).await?;
        let report = session.remove_matching(prefix, &range).await?;

        logging::log_sync_summary(&session.calendar().display_name, &report, started.elapsed().as_millis() as u64);
        Ok(report)
    }

    pub async fn list_calendars(&self, service: Arc<dyn CalendarService>) -> AppResult<Vec<CalendarEntry>> {
        fetch_all_calendars(service.as_ref()).await
    }
}
