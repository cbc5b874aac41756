//! Cache Entry Module
//!
//! Defines a single table entry with its sliding TTL metadata and the
//! callbacks fired right before it is removed.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};

use crate::cache::listener::{ExpiryListener, SharedExpiryListener};

/// Access metadata updated together on every keep-alive.
#[derive(Debug, Clone, Copy)]
struct AccessState {
    accessed_at: Instant,
    access_count: u64,
}

// == Cache Entry ==
/// One cached key/value pair.
///
/// A zero `lifespan` means the entry never expires on its own. Otherwise the
/// entry is due once `lifespan` has elapsed since the last access.
pub struct CacheEntry<K, V> {
    key: K,
    value: V,
    lifespan: Duration,
    created_at: Instant,
    access: RwLock<AccessState>,
    on_expiry: Mutex<Vec<SharedExpiryListener<K>>>,
    /// Set once a delete has claimed this entry.
    retired: AtomicBool,
}

impl<K, V> CacheEntry<K, V> {
    // == Constructor ==
    /// Creates a new entry; `accessed_at` starts out equal to `created_at`.
    pub fn new(key: K, value: V, lifespan: Duration) -> Self {
        let now = Instant::now();
        Self {
            key,
            value,
            lifespan,
            created_at: now,
            access: RwLock::new(AccessState {
                accessed_at: now,
                access_count: 0,
            }),
            on_expiry: Mutex::new(Vec::new()),
            retired: AtomicBool::new(false),
        }
    }

    // == Keep Alive ==
    /// Records an access: bumps the access count and restarts the lifespan window.
    pub fn keep_alive(&self) {
        let mut access = self.access.write();
        access.access_count += 1;
        access.accessed_at = Instant::now();
    }

    pub fn key(&self) -> &K {
        &self.key
    }

    pub fn value(&self) -> &V {
        &self.value
    }

    pub fn lifespan(&self) -> Duration {
        self.lifespan
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Time of the most recent access (creation time if never accessed).
    pub fn accessed_at(&self) -> Instant {
        self.access.read().accessed_at
    }

    pub fn access_count(&self) -> u64 {
        self.access.read().access_count
    }

    /// Returns `(accessed_at, access_count)` read under a single lock.
    pub fn access_snapshot(&self) -> (Instant, u64) {
        let access = self.access.read();
        (access.accessed_at, access.access_count)
    }

    /// Whether the entry is exempt from the expiration sweep.
    pub fn is_permanent(&self) -> bool {
        self.lifespan.is_zero()
    }

    // == Remaining ==
    /// Lifetime left as of `now`.
    ///
    /// # Returns
    /// - `None` for permanent entries
    /// - `Some(Duration::ZERO)` once the entry is due
    /// - `Some(remaining)` otherwise
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        if self.is_permanent() {
            return None;
        }
        let idle = now.saturating_duration_since(self.accessed_at());
        Some(self.lifespan.saturating_sub(idle))
    }

    /// Whether the sliding deadline has passed as of `now`.
    pub fn is_expired(&self, now: Instant) -> bool {
        self.remaining(now).is_some_and(|left| left.is_zero())
    }

    // == Expiry Callbacks ==
    /// Replaces every expiry callback with `listener`.
    pub fn set_expiry_callback<L>(&self, listener: L)
    where
        L: ExpiryListener<K> + 'static,
    {
        self.remove_expiry_callbacks();
        self.add_expiry_callback(listener);
    }

    /// Appends an expiry callback.
    pub fn add_expiry_callback<L>(&self, listener: L)
    where
        L: ExpiryListener<K> + 'static,
    {
        self.on_expiry.lock().push(Arc::new(listener));
    }

    pub fn remove_expiry_callbacks(&self) {
        self.on_expiry.lock().clear();
    }

    /// Fires the expiry callbacks in registration order.
    ///
    /// The list is cloned first so a callback may register further callbacks
    /// on this entry without deadlocking.
    pub(crate) fn notify_expiry(&self) {
        let listeners = self.on_expiry.lock().clone();
        for listener in listeners {
            listener.on_expiry(&self.key);
        }
    }

    // == Retirement ==
    /// Claims the entry for removal. Returns `false` if it was already claimed.
    pub(crate) fn retire(&self) -> bool {
        !self.retired.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn is_retired(&self) -> bool {
        self.retired.load(Ordering::Acquire)
    }

    /// Splits an owned entry into key, value and lifespan.
    pub fn into_parts(self) -> (K, V, Duration) {
        (self.key, self.value, self.lifespan)
    }
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for CacheEntry<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (accessed_at, access_count) = self.access_snapshot();
        f.debug_struct("CacheEntry")
            .field("key", &self.key)
            .field("value", &self.value)
            .field("lifespan", &self.lifespan)
            .field("created_at", &self.created_at)
            .field("accessed_at", &accessed_at)
            .field("access_count", &access_count)
            .finish()
    }
}
