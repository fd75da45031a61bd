pub mod birthday;
pub mod calendar;
pub mod event;
pub mod sync;

pub use birthday::{anniversary_in, BirthdayRecord, LeapDayPolicy};
pub use calendar::CalendarEntry;
pub use event::{CalendarEvent, EventStart, NewEvent, Reminder, ReminderMethod, Reminders};
pub use sync::SyncReport;
