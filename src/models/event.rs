use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Minutes before the event at which birthday reminders fire.
pub const REMINDER_LEAD_MINUTES: u32 = 24 * 60;

/// An event as listed or returned by the calendar service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub id: String,
    pub summary: String,
    pub start: Option<EventStart>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventStart {
    AllDay(NaiveDate),
    At(DateTime<Utc>),
}

impl CalendarEvent {
    pub fn start_date(&self) -> Option<NaiveDate> {
        match self.start? {
            EventStart::AllDay(date) => Some(date),
            EventStart::At(at) => Some(at.date_naive()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReminderMethod {
    Email,
    Popup,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reminder {
    pub method: ReminderMethod,
    pub minutes: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reminders {
    pub use_default: bool,
    pub overrides: Vec<Reminder>,
}

impl Reminders {
    /// Email and popup, both a day ahead, calendar defaults off.
    pub fn day_before() -> Self {
        Self {
            use_default: false,
            overrides: vec![
                Reminder { method: ReminderMethod::Email, minutes: REMINDER_LEAD_MINUTES },
                Reminder { method: ReminderMethod::Popup, minutes: REMINDER_LEAD_MINUTES },
            ],
        }
    }
}

/// Insert payload for a new event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEvent {
    pub summary: String,
    pub description: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub reminders: Reminders,
}

impl NewEvent {
    /// One-day all-day event titled `title`. The end date is exclusive.
    pub fn all_day(date: NaiveDate, title: &str) -> Self {
        Self {
            summary: title.to_string(),
            description: title.to_string(),
            start_date: date,
            end_date: date.succ_opt().unwrap_or(date),
            reminders: Reminders::day_before(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_all_day_event_shape() {
        let date = NaiveDate::from_ymd_opt(2025, 4, 1).unwrap();
        let event = NewEvent::all_day(date, "Ada Lovelace's 35th Birthday!");

        assert_eq!(event.summary, "Ada Lovelace's 35th Birthday!");
        assert_eq!(event.description, event.summary);
        assert_eq!(event.start_date, date);
        assert_eq!(event.end_date, NaiveDate::from_ymd_opt(2025, 4, 2).unwrap());
        assert!(!event.reminders.use_default);
        assert_eq!(
            event.reminders.overrides,
            vec![
                Reminder { method: ReminderMethod::Email, minutes: 1440 },
                Reminder { method: ReminderMethod::Popup, minutes: 1440 },
            ]
        );
    }

    #[test]
    fn test_all_day_event_at_year_end() {
        let date = NaiveDate::from_ymd_opt(2030, 12, 31).unwrap();
        let event = NewEvent::all_day(date, "x");
        assert_eq!(event.end_date, NaiveDate::from_ymd_opt(2031, 1, 1).unwrap());
    }

    #[test]
    fn test_start_date() {
        let mut event = CalendarEvent {
            id: "e1".to_string(),
            summary: "s".to_string(),
            start: Some(EventStart::AllDay(NaiveDate::from_ymd_opt(2025, 4, 1).unwrap())),
        };
        assert_eq!(event.start_date(), NaiveDate::from_ymd_opt(2025, 4, 1));

        event.start = Some(EventStart::At(Utc.with_ymd_and_hms(2025, 4, 2, 9, 30, 0).unwrap()));
        assert_eq!(event.start_date(), NaiveDate::from_ymd_opt(2025, 4, 2));

        event.start = None;
        assert_eq!(event.start_date(), None);
    }
}
