//! Configuration file module
//!
//! Optional TOML file under the user's config directory. Every key has a
//! default, so a missing default file is not an error. Command-line flags
//! are applied on top by the command handlers.

use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::calendar::WindowMode;
use crate::error::{AppError, AppResult};
use crate::models::LeapDayPolicy;
use crate::sync::SyncOptions;
use crate::utils::retry::RetryConfig;

pub const APP_DIR: &str = "bday-calendar";
pub const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub calendar_name: String,
    pub birthdays_file: PathBuf,
    pub first_year: i32,
    pub last_year: i32,
    pub window_mode: WindowMode,
    pub leap_day: LeapDayPolicy,
    pub concurrency: usize,
    pub client_secret_file: Option<PathBuf>,
    pub token_file: Option<PathBuf>,
    pub retry: RetrySettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            calendar_name: "Birthdays".to_string(),
            birthdays_file: PathBuf::from("birthdays.csv"),
            first_year: 2016,
            last_year: 2050,
            window_mode: WindowMode::default(),
            leap_day: LeapDayPolicy::default(),
            concurrency: 1,
            client_secret_file: None,
            token_file: None,
            retry: RetrySettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
        }
    }
}

impl RetrySettings {
    pub fn to_retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            ..RetryConfig::default()
        }
    }
}

/// `<config dir>/bday-calendar`, or the working directory when the platform
/// reports no config directory.
pub fn app_dir() -> PathBuf {
    dirs::config_dir()
        .map(|dir| dir.join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from("."))
}

pub fn default_path() -> PathBuf {
    app_dir().join(CONFIG_FILE)
}

impl AppConfig {
    /// Reads `path`, or the default location when `None`. Only an explicitly
    /// named file has to exist.
    pub fn load(path: Option<&Path>) -> AppResult<Self> {
        let (path, explicit) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => (default_path(), false),
        };

        if !path.exists() {
            if explicit {
                return Err(AppError::config(format!("config file {} does not exist", path.display())));
            }
            debug!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(&path)?;
        let config: Self = toml::from_str(&contents)
            .map_err(|e| AppError::config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_toml(contents: &str) -> AppResult<Self> {
        let config: Self = toml::from_str(contents).map_err(|e| AppError::config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.calendar_name.trim().is_empty() {
            return Err(AppError::config("calendar_name must not be empty"));
        }
        if self.first_year > self.last_year {
            return Err(AppError::config(format!(
                "first_year {} is after last_year {}",
                self.first_year, self.last_year
            )));
        }
        if self.concurrency == 0 {
            return Err(AppError::config("concurrency must be at least 1"));
        }
        if self.retry.max_attempts == 0 {
            return Err(AppError::config("retry.max_attempts must be at least 1"));
        }
        Ok(())
    }

    pub fn client_secret_path(&self) -> PathBuf {
        self.client_secret_file
            .clone()
            .unwrap_or_else(|| app_dir().join("client_secret.json"))
    }

    pub fn token_path(&self) -> PathBuf {
        self.token_file
            .clone()
            .unwrap_or_else(|| app_dir().join("token.json"))
    }

    pub fn sync_options(&self) -> SyncOptions {
        SyncOptions {
            window_mode: self.window_mode,
            leap_day: self.leap_day,
            concurrency: self.concurrency,
        }
    }
}
