//! Keyed mutual exclusion
//!
//! One mutex per key (patient id, reward id), created on first use and
//! dropped once no caller holds or waits on it. Lock order across the
//! engine: patient, then reward, then the db connection.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Default)]
pub struct KeyedLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KeyedLocks {
    fn handle(&self, key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(key.to_string()).or_default())
    }

    /// Run `f` while holding the lock for `key`
    pub fn with<T>(&self, key: &str, f: impl FnOnce() -> T) -> T {
        let lock = self.handle(key);
        let value = {
            let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
            f()
        };
        self.release(key, lock);
        value
    }

    /// Drop the caller's handle and evict the entry if nobody else has one.
    /// Handles are only cloned under the map lock, so a count of one here
    /// means no thread is holding or waiting on `key`.
    fn release(&self, key: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        drop(lock);
        if locks.get(key).is_some_and(|l| Arc::strong_count(l) == 1) {
            locks.remove(key);
        }
    }

    /// Number of keys currently held or waited on
    pub fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
