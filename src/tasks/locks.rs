//! Per-key mutual exclusion for jobs.
//!
//! A lock table keyed by identity (query, username, region) serializes jobs
//! targeting the same key while leaving cross-key parallelism untouched.
//! Idle entries are swept on every acquire, so the table stays bounded by
//! the number of keys currently in flight.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Lock table indexed by identity key.
#[derive(Debug, Default)]
pub struct KeyedLocks {
    inner: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

/// Holds one key's lock until dropped.
#[derive(Debug)]
pub struct KeyGuard {
    _guard: OwnedMutexGuard<()>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for `key` without waiting. `None` means an identical
    /// job already holds it and the caller should coalesce.
    pub fn try_acquire(&self, key: &str) -> Option<KeyGuard> {
        let slot = {
            let mut table = self.inner.lock().expect("lock table poisoned");
            // Sweep idle entries: only the table holds those Arcs.
            table.retain(|_, lock| Arc::strong_count(lock) > 1);
            Arc::clone(
                table
                    .entry(key.to_string())
                    .or_insert_with(|| Arc::new(AsyncMutex::new(()))),
            )
        };

        slot.try_lock_owned().ok().map(|guard| KeyGuard { _guard: guard })
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.inner.lock().expect("lock table poisoned").len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_key_is_rejected_while_held() {
        let locks = KeyedLocks::new();
        let guard = locks.try_acquire("user:rustlang");
        assert!(guard.is_some());
        assert!(locks.try_acquire("user:rustlang").is_none());
    }

    #[test]
    fn different_keys_are_independent() {
        let locks = KeyedLocks::new();
        let _a = locks.try_acquire("user:rustlang").unwrap();
        assert!(locks.try_acquire("user:ferris").is_some());
    }

    #[test]
    fn key_is_reusable_after_release() {
        let locks = KeyedLocks::new();
        drop(locks.try_acquire("tweets:rust").unwrap());
        assert!(locks.try_acquire("tweets:rust").is_some());
    }

    #[test]
    fn idle_entries_are_swept() {
        let locks = KeyedLocks::new();
        for i in 0..100 {
            drop(locks.try_acquire(&format!("tweets:q{i}")));
        }
        // Next acquire sweeps everything idle before inserting its own key.
        let _guard = locks.try_acquire("tweets:final").unwrap();
        assert_eq!(locks.len(), 1);
    }
}
