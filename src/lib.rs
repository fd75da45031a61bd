// bday-calendar library
// Birthday events on a Google calendar: import, idempotent sync, bulk removal

pub mod calendar;
pub mod command_handlers;
pub mod config;
pub mod error;
pub mod http_config;
pub mod models;
pub mod store;
pub mod sync;
pub mod utils;

// Re-export commonly used types
pub use calendar::{CalendarService, EventQuery, GoogleCalendarClient, Page, WindowMode};
pub use config::AppConfig;
pub use error::{AppError, AppResult};
pub use models::{BirthdayRecord, CalendarEntry, CalendarEvent, LeapDayPolicy, NewEvent, SyncReport};
pub use store::BirthdayStore;
pub use sync::{AddOutcome, BirthdaySynchronizer, DeleteRange, SyncOptions};
