//! Configuration Module
//!
//! Handles loading the demo and collaborator settings from environment variables.

use std::env;
use std::time::Duration;

/// Runtime configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Name of the table the demo works against
    pub table_name: String,
    /// Lifespan in milliseconds given to expiring demo entries
    pub default_lifespan_ms: u64,
    /// How long the demo waits for the sweep, in milliseconds
    pub demo_wait_ms: u64,
    /// Byte budget of the LRU store (0 = unbounded)
    pub lru_max_bytes: usize,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_TABLE` - Demo table name (default: "default")
    /// - `DEFAULT_LIFESPAN_MS` - Lifespan of expiring entries (default: 3000)
    /// - `DEMO_WAIT_MS` - Time to wait for expiry (default: 5000)
    /// - `LRU_MAX_BYTES` - LRU byte budget (default: 1 MiB)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            table_name: env::var("CACHE_TABLE")
                .ok()
                .filter(|v| !v.is_empty())
                .unwrap_or(defaults.table_name),
            default_lifespan_ms: env::var("DEFAULT_LIFESPAN_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.default_lifespan_ms),
            demo_wait_ms: env::var("DEMO_WAIT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.demo_wait_ms),
            lru_max_bytes: env::var("LRU_MAX_BYTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.lru_max_bytes),
        }
    }

    /// Lifespan of expiring demo entries.
    pub fn default_lifespan(&self) -> Duration {
        Duration::from_millis(self.default_lifespan_ms)
    }

    /// Time the demo waits for the sweep.
    pub fn demo_wait(&self) -> Duration {
        Duration::from_millis(self.demo_wait_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            table_name: "default".to_string(),
            default_lifespan_ms: 3000,
            demo_wait_ms: 5000,
            lru_max_bytes: 1024 * 1024,
        }
    }
}
