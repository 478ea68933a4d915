//! Per-offering mutual exclusion.
//!
//! `KeyedMutex` serializes mutations that target the same
//! `(catalog_id, offering_id)` pair while letting different offerings
//! proceed in parallel. It only coordinates callers sharing one registry
//! instance; writers in other processes are fenced by the revision
//! precondition instead.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex as StdMutex, PoisonError, Weak};

use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

/// Map size above which idle entries are purged on acquisition.
const CLEANUP_THRESHOLD: usize = 128;

/// Lock identity shared by every version of one offering.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LockKey {
    catalog_id: String,
    offering_id: String,
}

impl LockKey {
    pub fn new(catalog_id: impl Into<String>, offering_id: impl Into<String>) -> Self {
        Self {
            catalog_id: catalog_id.into(),
            offering_id: offering_id.into(),
        }
    }

    pub fn catalog_id(&self) -> &str {
        &self.catalog_id
    }

    pub fn offering_id(&self) -> &str {
        &self.offering_id
    }
}

impl fmt::Display for LockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.catalog_id, self.offering_id)
    }
}

/// Registry of lazily created per-key async locks.
///
/// Entries are held as `Weak` references: a key's lock lives exactly as
/// long as some guard or waiter holds it, so the map does not grow with
/// every offering ever touched.
#[derive(Default)]
pub struct KeyedMutex {
    locks: StdMutex<HashMap<LockKey, Weak<Mutex<()>>>>,
}

impl KeyedMutex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until no other holder of `key` exists, then hold it until the
    /// returned guard is dropped.
    pub async fn lock(&self, key: &LockKey) -> KeyedGuard {
        let mutex = self.entry(key);
        let guard = mutex.lock_owned().await;
        debug!(lock_key = %key, "Acquired offering lock");
        KeyedGuard {
            key: key.clone(),
            _guard: guard,
        }
    }

    /// Acquire `key` only if nobody holds it right now.
    pub fn try_lock(&self, key: &LockKey) -> Option<KeyedGuard> {
        let mutex = self.entry(key);
        let guard = mutex.try_lock_owned().ok()?;
        Some(KeyedGuard {
            key: key.clone(),
            _guard: guard,
        })
    }

    /// Whether `key` is currently held by anyone.
    pub fn is_locked(&self, key: &LockKey) -> bool {
        self.registry()
            .get(key)
            .and_then(Weak::upgrade)
            .is_some_and(|mutex| mutex.try_lock().is_err())
    }

    /// Number of keys with a live lock.
    pub fn len(&self) -> usize {
        self.registry()
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys currently held by a guard.
    pub fn held_keys(&self) -> Vec<LockKey> {
        self.registry()
            .iter()
            .filter_map(|(key, weak)| {
                let mutex = weak.upgrade()?;
                let held = mutex.try_lock().is_err();
                held.then(|| key.clone())
            })
            .collect()
    }

    fn entry(&self, key: &LockKey) -> Arc<Mutex<()>> {
        let mut map = self.registry();

        let mutex = match map.get(key).and_then(Weak::upgrade) {
            Some(existing) => existing,
            None => {
                let created = Arc::new(Mutex::new(()));
                map.insert(key.clone(), Arc::downgrade(&created));
                created
            }
        };

        if map.len() > CLEANUP_THRESHOLD {
            map.retain(|_, weak| weak.strong_count() > 0);
        }

        mutex
    }

    fn registry(&self) -> std::sync::MutexGuard<'_, HashMap<LockKey, Weak<Mutex<()>>>> {
        // The map holds no invariants a panicking holder could break.
        self.locks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Holds a key's lock; releasing happens on drop, on every exit path.
pub struct KeyedGuard {
    key: LockKey,
    _guard: OwnedMutexGuard<()>,
}

impl KeyedGuard {
    pub fn key(&self) -> &LockKey {
        &self.key
    }
}

impl Drop for KeyedGuard {
    fn drop(&mut self) {
        debug!(lock_key = %self.key, "Released offering lock");
    }
}
