use serde::{Deserialize, Serialize};

/// A calendar visible to the authenticated account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarEntry {
    pub id: String,
    pub display_name: String,
}

impl CalendarEntry {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
        }
    }
}

/// First calendar whose display name is exactly `name`.
pub fn find_by_name<'a>(calendars: &'a [CalendarEntry], name: &str) -> Option<&'a CalendarEntry> {
    calendars.iter().find(|c| c.display_name == name)
}
