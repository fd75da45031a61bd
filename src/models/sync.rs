use serde::{Deserialize, Serialize};

/// Counters for one synchronization or removal run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub inserted: usize,
    pub already_present: usize,
    pub leap_day_skipped: usize,
    pub deleted: usize,
    pub already_gone: usize,
}

impl SyncReport {
    pub fn merge(&mut self, other: &SyncReport) {
        self.inserted += other.inserted;
        self.already_present += other.already_present;
        self.leap_day_skipped += other.leap_day_skipped;
        self.deleted += other.deleted;
        self.already_gone += other.already_gone;
    }

    /// True when the run touched no remote state.
    pub fn is_noop(&self) -> bool {
        self.inserted == 0 && self.deleted == 0
    }
}
