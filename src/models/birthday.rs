use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BirthdayRecord {
    pub last_name: String,
    pub first_name: String,
    pub birth_date: NaiveDate,
}

impl BirthdayRecord {
    pub fn new(last_name: impl Into<String>, first_name: impl Into<String>, birth_date: NaiveDate) -> Self {
        Self {
            last_name: last_name.into(),
            first_name: first_name.into(),
            birth_date,
        }
    }

    /// "{first} {last}", the name used in event titles.
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// What to do with a Feb 29 birthday in a year that has no Feb 29.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeapDayPolicy {
    #[default]
    Feb28,
    Mar1,
    Skip,
    Error,
}

impl std::str::FromStr for LeapDayPolicy {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "feb28" => Ok(Self::Feb28),
            "mar1" => Ok(Self::Mar1),
            "skip" => Ok(Self::Skip),
            "error" => Ok(Self::Error),
            other => Err(AppError::config(format!(
                "unknown leap-day policy '{}' (expected feb28, mar1, skip or error)",
                other
            ))),
        }
    }
}

/// The date on which `birth_date` falls in `year`. `Ok(None)` means the
/// policy says to skip this year.
pub fn anniversary_in(birth_date: NaiveDate, year: i32, policy: LeapDayPolicy) -> AppResult<Option<NaiveDate>> {
    let (month, day) = (birth_date.month(), birth_date.day());
    if let Some(date) = NaiveDate::from_ymd_opt(year, month, day) {
        return Ok(Some(date));
    }

    let shifted = match (month, day, policy) {
        (2, 29, LeapDayPolicy::Feb28) => NaiveDate::from_ymd_opt(year, 2, 28),
        (2, 29, LeapDayPolicy::Mar1) => NaiveDate::from_ymd_opt(year, 3, 1),
        (2, 29, LeapDayPolicy::Skip) => return Ok(None),
        _ => None,
    };

    shifted
        .map(Some)
        .ok_or(AppError::DateConstruction { year, month, day })
}
