//! Per-log mutual exclusion for mutating jobs.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::OwnedMutexGuard;

use super::models::LogReference;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LogLockKey {
    pub server_url: String,
    pub log_uid: String,
}

impl LogLockKey {
    pub fn for_log(log: &LogReference) -> Self {
        Self {
            server_url: log.server_url.clone().unwrap_or_default(),
            log_uid: log.log_uid.clone(),
        }
    }
}

type LockTable = HashMap<LogLockKey, Arc<tokio::sync::Mutex<()>>>;

/// Async locks keyed by `(server_url, log_uid)`. Entries are created on
/// demand and removed once nobody holds or waits for them.
#[derive(Clone, Default)]
pub struct LogLocks {
    table: Arc<Mutex<LockTable>>,
}

/// Held for the duration of a mutating job.
pub struct LogGuard {
    key: LogLockKey,
    guard: Option<OwnedMutexGuard<()>>,
    table: Arc<Mutex<LockTable>>,
}

impl LogLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, key: LogLockKey) -> LogGuard {
        let mutex = {
            let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
            table.entry(key.clone()).or_default().clone()
        };

        let guard = mutex.lock_owned().await;
        LogGuard {
            key,
            guard: Some(guard),
            table: self.table.clone(),
        }
    }

    /// Number of logs with a held or awaited lock.
    pub fn len(&self) -> usize {
        self.table.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for LogGuard {
    fn drop(&mut self) {
        drop(self.guard.take());

        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        let unused = table
            .get(&self.key)
            .is_some_and(|mutex| Arc::strong_count(mutex) == 1);
        if unused {
            table.remove(&self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    fn key(log: &str) -> LogLockKey {
        LogLockKey {
            server_url: "https://witsml.example".into(),
            log_uid: log.into(),
        }
    }

    #[tokio::test]
    async fn test_same_log_is_serialized() {
        let locks = LogLocks::new();
        let first = locks.lock(key("log-1")).await;

        let second = timeout(Duration::from_millis(50), locks.lock(key("log-1"))).await;
        assert!(second.is_err(), "second lock must wait for the first");

        drop(first);
        let second = timeout(Duration::from_millis(50), locks.lock(key("log-1"))).await;
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn test_different_logs_do_not_block() {
        let locks = LogLocks::new();
        let _a = locks.lock(key("log-1")).await;
        let b = timeout(Duration::from_millis(50), locks.lock(key("log-2"))).await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn test_entries_are_pruned() {
        let locks = LogLocks::new();
        {
            let _guard = locks.lock(key("log-1")).await;
            assert_eq!(locks.len(), 1);
        }
        assert!(locks.is_empty());
    }
}
