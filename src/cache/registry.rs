//! Table Registry Module
//!
//! Get-or-create directory of named tables.

use std::collections::HashMap;

use parking_lot::Mutex;
use tokio::runtime::Handle;

use crate::cache::table::{TableKey, TableValue};
use crate::cache::CacheTable;

// == Registry ==
/// Maps table names to tables, creating each table on first request.
///
/// Tables live as long as the registry. Share the registry itself (for
/// example behind an `Arc`) wherever tables are looked up.
pub struct Registry<K, V> {
    runtime: Handle,
    tables: Mutex<HashMap<String, CacheTable<K, V>>>,
}

impl<K: TableKey, V: TableValue> Registry<K, V> {
    /// Creates an empty registry whose tables run on the current Tokio runtime.
    ///
    /// # Panics
    /// Panics if called outside a Tokio runtime.
    pub fn new() -> Self {
        Self::with_runtime(Handle::current())
    }

    /// Creates an empty registry whose tables run on `runtime`.
    pub fn with_runtime(runtime: Handle) -> Self {
        Self {
            runtime,
            tables: Mutex::new(HashMap::new()),
        }
    }

    // == Table ==
    /// Returns the table called `name`, creating it if needed.
    ///
    /// Concurrent callers asking for the same name always get the same table.
    pub fn table(&self, name: &str) -> CacheTable<K, V> {
        let mut tables = self.tables.lock();
        tables
            .entry(name.to_string())
            .or_insert_with(|| CacheTable::with_runtime(name, self.runtime.clone()))
            .clone()
    }

    /// Returns the table called `name` without creating it.
    pub fn get(&self, name: &str) -> Option<CacheTable<K, V>> {
        self.tables.lock().get(name).cloned()
    }

    /// Names of every table created so far, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.lock().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.tables.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.lock().is_empty()
    }
}

impl<K: TableKey, V: TableValue> Default for Registry<K, V> {
    fn default() -> Self {
        Self::new()
    }
}
