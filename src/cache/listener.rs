//! Listener Module
//!
//! Callback capabilities a table and its entries invoke: table-wide
//! added/deleted listeners, per-entry expiry listeners, and the read-miss
//! loader. Each trait is implemented for matching closures.

use std::any::Any;
use std::sync::Arc;

use crate::cache::CacheEntry;

// == Entry Listener ==
/// Table-wide callback fired with the entry that was added or is being deleted.
pub trait EntryListener<K, V>: Send + Sync {
    fn on_entry(&self, entry: &Arc<CacheEntry<K, V>>);
}

impl<K, V, F> EntryListener<K, V> for F
where
    F: Fn(&Arc<CacheEntry<K, V>>) + Send + Sync,
{
    fn on_entry(&self, entry: &Arc<CacheEntry<K, V>>) {
        self(entry)
    }
}

// == Expiry Listener ==
/// Per-entry callback fired with the key right before the entry is removed.
pub trait ExpiryListener<K>: Send + Sync {
    fn on_expiry(&self, key: &K);
}

impl<K, F> ExpiryListener<K> for F
where
    F: Fn(&K) + Send + Sync,
{
    fn on_expiry(&self, key: &K) {
        self(key)
    }
}

// == Data Loader ==
/// Produces an entry for a key that missed the table.
///
/// `args` are the extra arguments the caller passed to
/// [`CacheTable::get_with`](crate::cache::CacheTable::get_with); loaders
/// downcast the ones they understand. Returning `None` reports the key as
/// not loadable.
pub trait DataLoader<K, V>: Send + Sync {
    fn load(&self, key: &K, args: &[&dyn Any]) -> Option<CacheEntry<K, V>>;
}

impl<K, V, F> DataLoader<K, V> for F
where
    F: Fn(&K, &[&dyn Any]) -> Option<CacheEntry<K, V>> + Send + Sync,
{
    fn load(&self, key: &K, args: &[&dyn Any]) -> Option<CacheEntry<K, V>> {
        self(key, args)
    }
}

pub(crate) type SharedEntryListener<K, V> = Arc<dyn EntryListener<K, V>>;
pub(crate) type SharedExpiryListener<K> = Arc<dyn ExpiryListener<K>>;
pub(crate) type SharedLoader<K, V> = Arc<dyn DataLoader<K, V>>;
