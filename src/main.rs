//! Sweep Cache - demo walkthrough
//!
//! Exercises a table's callbacks, loader and expiration sweep, then prints the
//! table statistics as JSON.

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sweep_cache::cache::{ByteView, LruStore};
use sweep_cache::{CacheEntry, Config, Registry};

type Entry = Arc<CacheEntry<String, String>>;

/// Runs the demo.
///
/// # Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Register added/deleted callbacks on the demo table
/// 4. Add, read and delete a permanent entry
/// 5. Add an expiring entry with an expiry callback and wait for the sweep
/// 6. Resolve a miss through the loader
/// 7. Print table statistics
#[tokio::main]
async fn main() -> Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sweep_cache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    info!(
        "Configuration loaded: table={}, lifespan={}ms, wait={}ms, lru_max_bytes={}",
        config.table_name, config.default_lifespan_ms, config.demo_wait_ms, config.lru_max_bytes
    );

    let registry: Registry<String, String> = Registry::new();
    let table = registry.table(&config.table_name);

    table.set_added_callback(|entry: &Entry| {
        info!("Added callback 1: {} = {}", entry.key(), entry.value());
    });
    table.add_added_callback(|entry: &Entry| {
        info!("Added callback 2: {} = {}", entry.key(), entry.value());
    });
    table.set_deleted_callback(|entry: &Entry| {
        info!(
            "Deleting: {} (accessed {} times)",
            entry.key(),
            entry.access_count()
        );
    });

    let key = "someKey".to_string();
    table.add(key.clone(), "This is a test!".to_string(), Duration::ZERO);
    match table.get(&key) {
        Ok(entry) => info!("Found value in cache: {}", entry.value()),
        Err(err) => warn!("Error retrieving value from cache: {}", err),
    }
    table.delete(&key).context("demo entry vanished before delete")?;

    table.remove_added_callbacks();
    let expiring = table.add(
        "anotherKey".to_string(),
        "This is another test".to_string(),
        config.default_lifespan(),
    );
    expiring.set_expiry_callback(|key: &String| {
        info!("About to expire: {}", key);
    });
    info!(
        "Waiting {:?} for '{}' to expire (sweep armed for {:?})",
        config.demo_wait(),
        expiring.key(),
        table.pending_sweep()
    );
    tokio::time::sleep(config.demo_wait()).await;
    info!("'anotherKey' still cached: {}", table.exists(expiring.key()));

    table.set_data_loader(|key: &String, _args: &[&dyn Any]| {
        Some(CacheEntry::new(
            key.clone(),
            format!("loaded value for {key}"),
            Duration::ZERO,
        ))
    });
    let loaded = table
        .get(&"lazyKey".to_string())
        .context("loader should produce every key")?;
    info!("Loaded on miss: {}", loaded.value());

    let lru = LruStore::new(config.lru_max_bytes);
    lru.add("payload", ByteView::from(loaded.value().as_str()));
    info!("LRU store holds {} entries ({} bytes)", lru.len(), lru.used_bytes());

    let stats = serde_json::to_string_pretty(&table.stats()).context("serializing stats")?;
    println!("{stats}");

    table.flush();
    Ok(())
}
