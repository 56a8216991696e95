//! Dynamic Mutex Pool
//!
//! A lock per key that only exists while somebody holds or waits for it.
//!
//! # How It Works
//!
//! 1. `lock(key)` finds or creates the entry for `key` and bumps its
//!    reference count. This happens under the lock of the map shard owning
//!    `key`, so creation and removal of one entry never race.
//!
//! 2. The shard lock is released, then the caller blocks on the per-key
//!    mutex. Waiting on one key therefore never holds up any other key.
//!
//! 3. Dropping the returned guard unlocks the per-key mutex, then retakes
//!    the shard lock, decrements the count and removes the entry once the
//!    count reaches zero.

use std::sync::Arc;

use dashmap::mapref::entry::Entry as MapEntry;
use dashmap::DashMap;
use parking_lot::lock_api::ArcMutexGuard;
use parking_lot::{Mutex, RawMutex};
use tracing::trace;

struct Entry {
    refs: usize,
    mutex: Arc<Mutex<()>>,
}

/// Reference-counted lock-per-key.
#[derive(Default)]
pub struct MutexPool {
    entries: DashMap<String, Entry>,
}

/// Holds the lock for one key; unlocks (and possibly frees the entry) on drop.
#[must_use = "the key is unlocked as soon as the guard is dropped"]
pub struct KeyGuard<'a> {
    pool: &'a MutexPool,
    key: String,
    guard: Option<ArcMutexGuard<RawMutex, ()>>,
}

impl MutexPool {
    /// An empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until `key` is exclusively held by the caller.
    pub fn lock(&self, key: &str) -> KeyGuard<'_> {
        let mutex = {
            let mut entry = self.entries.entry(key.to_owned()).or_insert_with(|| Entry {
                refs: 0,
                mutex: Arc::new(Mutex::new(())),
            });
            entry.refs += 1;
            Arc::clone(&entry.mutex)
        };
        trace!(key, "waiting for vertex lock");
        let guard = mutex.lock_arc();
        KeyGuard {
            pool: self,
            key: key.to_owned(),
            guard: Some(guard),
        }
    }

    fn release(&self, key: &str) {
        if let MapEntry::Occupied(mut occupied) = self.entries.entry(key.to_owned()) {
            let entry = occupied.get_mut();
            entry.refs -= 1;
            if entry.refs == 0 {
                occupied.remove();
            }
        }
    }

    /// Number of keys currently locked or waited for.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no key is held or awaited.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.pool.release(&self.key);
    }
}
