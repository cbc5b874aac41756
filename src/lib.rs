//! Sweep Cache - An in-process key-value cache with expiring entries
//!
//! Provides named tables whose entries carry sliding time-to-live deadlines,
//! removed by an adaptive sweep that sleeps until the next deadline instead
//! of polling.

pub mod cache;
pub mod config;
pub mod error;
mod tasks;

pub use cache::{CacheEntry, CacheTable, Registry};
pub use config::Config;
pub use error::{CacheError, Result};
