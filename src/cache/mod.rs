//! Cache Module
//!
//! Provides named tables of expiring entries plus a byte-budgeted LRU store.

mod byteview;
mod entry;
mod listener;
mod lru;
mod registry;
mod stats;
mod table;


// Re-export public types
pub use byteview::ByteView;
pub use entry::CacheEntry;
pub use listener::{DataLoader, EntryListener, ExpiryListener};
pub use lru::{ByteLru, ByteSize, LruStore};
pub use registry::Registry;
pub use stats::TableStats;
pub use table::{CacheTable, TableKey, TableValue};
