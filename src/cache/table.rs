//! Cache Table Module
//!
//! A named table of entries with sliding per-entry TTLs, table-wide
//! added/deleted callbacks, an optional read-miss loader and an adaptive
//! expiration sweep.
//!
//! # Expiration
//! The table never polls. After a structural change that may shorten the
//! nearest deadline it reconciles: removes every due entry and arms a single
//! one-shot timer for the shortest remaining lifetime. When that timer fires
//! the table reconciles again. A table holding only permanent entries has no
//! timer at all.
//!
//! # Locking
//! The table lock guards the entry map, the loader, the listener lists and the
//! timer state. It is never held while a callback or a delete runs, so
//! callbacks may call back into the same table.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace};

use crate::cache::listener::{
    DataLoader, EntryListener, SharedEntryListener, SharedLoader,
};
use crate::cache::stats::StatsRecorder;
use crate::cache::{CacheEntry, TableStats};
use crate::error::{CacheError, Result};
use crate::tasks::spawn_sweep_timer;

// == Bounds ==
/// Requirements on table keys.
pub trait TableKey: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static {}

impl<T> TableKey for T where T: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static {}

/// Requirements on table values.
pub trait TableValue: Send + Sync + 'static {}

impl<T> TableValue for T where T: Send + Sync + 'static {}

/// Why an entry is leaving the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Removal {
    Deleted,
    Expired,
}

/// State guarded by the table lock.
struct TableState<K, V> {
    entries: HashMap<K, Arc<CacheEntry<K, V>>>,
    loader: Option<SharedLoader<K, V>>,
    on_added: Vec<SharedEntryListener<K, V>>,
    on_deleted: Vec<SharedEntryListener<K, V>>,
    /// Duration the live timer was armed for; `None` when no timer is armed.
    pending_sweep: Option<Duration>,
    /// When the live timer fires.
    sweep_deadline: Option<Instant>,
    timer: Option<JoinHandle<()>>,
}

struct TableInner<K, V> {
    name: String,
    runtime: Handle,
    state: RwLock<TableState<K, V>>,
    /// Held for the duration of one sweep pass.
    sweeping: Mutex<()>,
    /// Set when a reconcile was requested; cleared by the pass that serves it.
    sweep_requested: AtomicBool,
    stats: StatsRecorder,
}

// == Cache Table ==
/// Thread-safe table of expiring entries. Cloning yields another handle to
/// the same table.
pub struct CacheTable<K, V> {
    inner: Arc<TableInner<K, V>>,
}

impl<K, V> Clone for CacheTable<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K: TableKey, V: TableValue> CacheTable<K, V> {
    // == Constructors ==
    /// Creates an empty table whose sweep timers run on the current Tokio runtime.
    ///
    /// # Panics
    /// Panics if called outside a Tokio runtime; use [`CacheTable::with_runtime`]
    /// to pass a handle explicitly.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_runtime(name, Handle::current())
    }

    /// Creates an empty table whose sweep timers run on `runtime`.
    pub fn with_runtime(name: impl Into<String>, runtime: Handle) -> Self {
        let name = name.into();
        info!("Created cache table '{}'", name);
        Self {
            inner: Arc::new(TableInner {
                name,
                runtime,
                state: RwLock::new(TableState {
                    entries: HashMap::new(),
                    loader: None,
                    on_added: Vec::new(),
                    on_deleted: Vec::new(),
                    pending_sweep: None,
                    sweep_deadline: None,
                    timer: None,
                }),
                sweeping: Mutex::new(()),
                sweep_requested: AtomicBool::new(false),
                stats: StatsRecorder::default(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    // == Add ==
    /// Stores `value` under `key`, replacing any existing entry.
    ///
    /// A zero `lifespan` stores a permanent entry. Added callbacks run after
    /// the insert. The sweep is reconciled only when this entry may expire
    /// before the currently armed timer.
    pub fn add(&self, key: K, value: V, lifespan: Duration) -> Arc<CacheEntry<K, V>> {
        let entry = Arc::new(CacheEntry::new(key, value, lifespan));
        TableInner::insert(&self.inner, Arc::clone(&entry), false);
        entry
    }

    // == Add If Absent ==
    /// Stores `value` only if `key` is not present. Never calls the loader.
    ///
    /// Returns whether an insertion happened.
    pub fn add_if_absent(&self, key: K, lifespan: Duration, value: V) -> bool {
        let entry = Arc::new(CacheEntry::new(key, value, lifespan));
        TableInner::insert(&self.inner, entry, true)
    }

    // == Get ==
    /// Looks up `key`, refreshing its lifespan window on a hit.
    ///
    /// On a miss the loader, if any, is asked for the entry.
    pub fn get(&self, key: &K) -> Result<Arc<CacheEntry<K, V>>> {
        self.get_with(key, &[])
    }

    /// Like [`CacheTable::get`], passing `args` through to the loader on a miss.
    ///
    /// # Errors
    /// - `NotFound` if the key is absent and no loader is configured
    /// - `NotFoundOrLoadable` if the loader declined to produce the key
    pub fn get_with(&self, key: &K, args: &[&dyn Any]) -> Result<Arc<CacheEntry<K, V>>> {
        let (found, loader) = {
            let state = self.inner.state.read();
            (state.entries.get(key).cloned(), state.loader.clone())
        };

        if let Some(entry) = found {
            entry.keep_alive();
            self.inner.stats.record_hit();
            trace!("Table '{}': hit for key {:?}", self.inner.name, key);
            return Ok(entry);
        }
        self.inner.stats.record_miss();

        let Some(loader) = loader else {
            return Err(CacheError::NotFound(self.inner.name.clone()));
        };

        match loader.load(key, args) {
            Some(loaded) => {
                self.inner.stats.record_load();
                debug!("Table '{}': loaded key {:?}", self.inner.name, key);
                let (_, value, lifespan) = loaded.into_parts();
                Ok(self.add(key.clone(), value, lifespan))
            }
            None => Err(CacheError::NotFoundOrLoadable(self.inner.name.clone())),
        }
    }

    // == Exists ==
    /// Membership check; never loads and never touches access metadata.
    pub fn exists(&self, key: &K) -> bool {
        self.inner.state.read().entries.contains_key(key)
    }

    // == Delete ==
    /// Removes `key`, firing the table's deleted callbacks and then the
    /// entry's expiry callbacks before the mapping goes away.
    pub fn delete(&self, key: &K) -> Result<Arc<CacheEntry<K, V>>> {
        self.inner.remove(key, Removal::Deleted)
    }

    // == Flush ==
    /// Drops every entry without firing callbacks and cancels the sweep timer.
    pub fn flush(&self) {
        let flushed = {
            let mut state = self.inner.state.write();
            state.pending_sweep = None;
            state.sweep_deadline = None;
            if let Some(timer) = state.timer.take() {
                timer.abort();
            }
            std::mem::take(&mut state.entries)
        };
        info!(
            "Flushed cache table '{}' ({} entries dropped)",
            self.inner.name,
            flushed.len()
        );
    }

    // == Iteration ==
    pub fn count(&self) -> usize {
        self.inner.state.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Visits a point-in-time snapshot of the table.
    ///
    /// The visitor runs without the table lock held; changes made after the
    /// snapshot was taken are not reflected.
    pub fn for_each<F>(&self, mut visitor: F)
    where
        F: FnMut(&K, &Arc<CacheEntry<K, V>>),
    {
        let snapshot: Vec<Arc<CacheEntry<K, V>>> =
            self.inner.state.read().entries.values().cloned().collect();

        for entry in &snapshot {
            visitor(entry.key(), entry);
        }
    }

    // == Most Accessed ==
    /// Returns up to `limit` entries ordered by descending access count.
    ///
    /// Entries removed between ranking and lookup are skipped, so fewer than
    /// `limit` entries may come back.
    pub fn most_accessed(&self, limit: usize) -> Vec<Arc<CacheEntry<K, V>>> {
        let mut ranked: Vec<(K, u64)> = self
            .inner
            .state
            .read()
            .entries
            .iter()
            .map(|(key, entry)| (key.clone(), entry.access_count()))
            .collect();
        ranked.sort_unstable_by(|a, b| b.1.cmp(&a.1));

        let state = self.inner.state.read();
        ranked
            .into_iter()
            .take(limit)
            .filter_map(|(key, _)| state.entries.get(&key).cloned())
            .collect()
    }

    // == Loader ==
    /// Sets the loader consulted on read misses.
    pub fn set_data_loader<L>(&self, loader: L)
    where
        L: DataLoader<K, V> + 'static,
    {
        self.inner.state.write().loader = Some(Arc::new(loader));
    }

    pub fn clear_data_loader(&self) {
        self.inner.state.write().loader = None;
    }

    // == Added Callbacks ==
    /// Replaces every added callback with `listener`.
    pub fn set_added_callback<L>(&self, listener: L)
    where
        L: EntryListener<K, V> + 'static,
    {
        self.remove_added_callbacks();
        self.add_added_callback(listener);
    }

    /// Appends a callback fired after every insertion.
    pub fn add_added_callback<L>(&self, listener: L)
    where
        L: EntryListener<K, V> + 'static,
    {
        self.inner.state.write().on_added.push(Arc::new(listener));
    }

    pub fn remove_added_callbacks(&self) {
        self.inner.state.write().on_added.clear();
    }

    // == Deleted Callbacks ==
    /// Replaces every deleted callback with `listener`.
    pub fn set_deleted_callback<L>(&self, listener: L)
    where
        L: EntryListener<K, V> + 'static,
    {
        self.remove_deleted_callbacks();
        self.add_deleted_callback(listener);
    }

    /// Appends a callback fired before every removal, including sweeps.
    pub fn add_deleted_callback<L>(&self, listener: L)
    where
        L: EntryListener<K, V> + 'static,
    {
        self.inner.state.write().on_deleted.push(Arc::new(listener));
    }

    pub fn remove_deleted_callbacks(&self) {
        self.inner.state.write().on_deleted.clear();
    }

    // == Introspection ==
    /// Duration the sweep timer is currently armed for, if any.
    pub fn pending_sweep(&self) -> Option<Duration> {
        self.inner.state.read().pending_sweep
    }

    /// Returns current table statistics.
    pub fn stats(&self) -> TableStats {
        self.inner.stats.snapshot(self.count())
    }
}

impl<K: TableKey, V: TableValue> TableInner<K, V> {
    /// Inserts `entry`, fires the added callbacks and reconciles if needed.
    ///
    /// With `only_if_absent` the presence check and the insert happen under
    /// one exclusive lock. Returns whether the entry was stored.
    ///
    /// The new lifespan is compared with the time the armed timer has left,
    /// not with the duration it was armed for.
    fn insert(this: &Arc<Self>, entry: Arc<CacheEntry<K, V>>, only_if_absent: bool) -> bool {
        let (timer_left, listeners) = {
            let mut state = this.state.write();
            if only_if_absent && state.entries.contains_key(entry.key()) {
                return false;
            }
            state.entries.insert(entry.key().clone(), Arc::clone(&entry));
            let left = state
                .sweep_deadline
                .map(|deadline| deadline.saturating_duration_since(Instant::now()));
            (left, state.on_added.clone())
        };

        debug!(
            "Table '{}': added key {:?} with lifespan {:?}",
            this.name,
            entry.key(),
            entry.lifespan()
        );

        for listener in &listeners {
            listener.on_entry(&entry);
        }

        let lifespan = entry.lifespan();
        if !lifespan.is_zero() && timer_left.map_or(true, |left| lifespan < left) {
            Self::reconcile(this);
        }
        true
    }

    /// Claims and removes `key`, firing callbacks outside the table lock.
    ///
    /// Only one caller can claim an entry, so callbacks fire exactly once even
    /// when deletes and the sweep race on the same key.
    fn remove(&self, key: &K, cause: Removal) -> Result<Arc<CacheEntry<K, V>>> {
        let (entry, listeners) = {
            let state = self.state.write();
            match state.entries.get(key) {
                Some(entry) if entry.retire() => (Arc::clone(entry), state.on_deleted.clone()),
                _ => return Err(CacheError::NotFound(self.name.clone())),
            }
        };

        for listener in &listeners {
            listener.on_entry(&entry);
        }
        entry.notify_expiry();

        {
            let mut state = self.state.write();
            // An overwrite may have replaced the entry while callbacks ran
            if state
                .entries
                .get(key)
                .is_some_and(|current| Arc::ptr_eq(current, &entry))
            {
                state.entries.remove(key);
            }
        }

        match cause {
            Removal::Deleted => self.stats.record_deletion(),
            Removal::Expired => self.stats.record_expiration(),
        }
        debug!(
            "Table '{}': removed key {:?} ({:?}, accessed {} times)",
            self.name,
            key,
            cause,
            entry.access_count()
        );
        Ok(entry)
    }

    // == Reconcile ==
    /// Runs the expiration sweep, coalescing concurrent requests.
    ///
    /// At most one pass runs at a time. A request that arrives while a pass
    /// is running, including one made from a callback inside that pass,
    /// makes the running caller do one more pass instead of blocking.
    fn reconcile(this: &Arc<Self>) {
        this.sweep_requested.store(true, Ordering::SeqCst);
        while this.sweep_requested.load(Ordering::SeqCst) {
            let Some(_sweeping) = this.sweeping.try_lock() else {
                return;
            };
            this.sweep_requested.store(false, Ordering::SeqCst);
            Self::sweep(this);
        }
    }

    /// One pass: cancel the timer, remove due entries, re-arm for the
    /// shortest remaining lifetime.
    ///
    /// Due entries are removed with the table lock released, then the table
    /// is scanned again, so entries added by callbacks in the meantime are
    /// accounted for. The timer is armed from the scan that found nothing due.
    fn sweep(this: &Arc<Self>) {
        loop {
            let now = Instant::now();
            let mut due = Vec::new();
            let mut next: Option<Duration> = None;

            let mut state = this.state.write();
            if let Some(timer) = state.timer.take() {
                timer.abort();
            }
            match state.pending_sweep {
                Some(armed) => trace!("Table '{}': sweeping (timer was {:?})", this.name, armed),
                None => trace!("Table '{}': sweeping (no timer armed)", this.name),
            }

            for (key, entry) in &state.entries {
                if entry.is_retired() {
                    continue;
                }
                match entry.remaining(now) {
                    None => {}
                    Some(left) if left.is_zero() => due.push(key.clone()),
                    Some(left) => next = Some(next.map_or(left, |shortest| shortest.min(left))),
                }
            }

            if due.is_empty() {
                state.pending_sweep = next;
                state.sweep_deadline = next.map(|delay| now + delay);
                if let Some(delay) = next {
                    state.timer = Some(spawn_sweep_timer(
                        &this.runtime,
                        Arc::downgrade(this),
                        delay,
                        Self::reconcile,
                    ));
                    debug!("Table '{}': sweep timer armed for {:?}", this.name, delay);
                }
                return;
            }
            drop(state);

            debug!("Table '{}': removing {} expired entries", this.name, due.len());
            // remove() takes the table lock itself
            for key in due {
                if let Err(err) = this.remove(&key, Removal::Expired) {
                    debug!(
                        "Table '{}': expired key {:?} already gone: {}",
                        this.name, key, err
                    );
                }
            }
        }
    }
}

impl<K, V> Drop for TableInner<K, V> {
    fn drop(&mut self) {
        if let Some(timer) = self.state.get_mut().timer.take() {
            timer.abort();
        }
    }
}

impl<K, V> fmt::Debug for CacheTable<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.read();
        f.debug_struct("CacheTable")
            .field("name", &self.inner.name)
            .field("entries", &state.entries.len())
            .field("pending_sweep", &state.pending_sweep)
            .finish()
    }
}
