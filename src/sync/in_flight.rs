//! Process-local serialization of exists-then-insert sequences.
//!
//! The calendar service has no conditional insert, so two workers checking
//! the same (calendar, date, title) can both see "absent" and both insert.
//! Holding an [`InFlightGuard`] for the key across the check and the insert
//! closes that window within this process.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InFlightKey {
    pub calendar_id: String,
    pub date: NaiveDate,
    pub title: String,
}

impl InFlightKey {
    pub fn new(calendar_id: &str, date: NaiveDate, title: &str) -> Self {
        Self {
            calendar_id: calendar_id.to_string(),
            date,
            title: title.to_string(),
        }
    }
}

type LockMap = HashMap<InFlightKey, Arc<AsyncMutex<()>>>;

#[derive(Debug, Clone, Default)]
pub struct InFlightLocks {
    locks: Arc<Mutex<LockMap>>,
}

impl InFlightLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until no other holder of `key` remains.
    pub async fn acquire(&self, key: InFlightKey) -> InFlightGuard {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            locks.entry(key.clone()).or_default().clone()
        };
        let guard = lock.lock_owned().await;
        InFlightGuard {
            key,
            locks: Arc::clone(&self.locks),
            _guard: guard,
        }
    }

    /// Number of keys currently held or awaited.
    pub fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct InFlightGuard {
    key: InFlightKey,
    locks: Arc<Mutex<LockMap>>,
    _guard: OwnedMutexGuard<()>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        // Map entry plus our own guard; anything more is a waiter
        let idle = locks
            .get(&self.key)
            .map(|lock| Arc::strong_count(lock) <= 2)
            .unwrap_or(false);
        if idle {
            locks.remove(&self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn key(title: &str) -> InFlightKey {
        InFlightKey::new("cal", NaiveDate::from_ymd_opt(2025, 4, 1).unwrap(), title)
    }

    #[tokio::test]
    async fn test_entries_released_after_drop() {
        let locks = InFlightLocks::new();
        {
            let _a = locks.acquire(key("a")).await;
            let _b = locks.acquire(key("b")).await;
            assert_eq!(locks.len(), 2);
        }
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_same_key_is_exclusive() {
        let locks = InFlightLocks::new();
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let (locks, active, peak) = (locks.clone(), active.clone(), peak.clone());
            handles.push(tokio::spawn(async move {
                let _guard = locks.acquire(key("same")).await;
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(2)).await;
                active.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(peak.load(Ordering::SeqCst), 1);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_distinct_keys_do_not_block() {
        let locks = InFlightLocks::new();
        let _held = locks.acquire(key("a")).await;
        let other = tokio::time::timeout(Duration::from_millis(100), locks.acquire(key("b"))).await;
        assert!(other.is_ok());
    }
}
