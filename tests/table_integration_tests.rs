//! Integration Tests for Cache Tables
//!
//! Exercises expiration timing, callback ordering and concurrent access
//! through the public API.

use std::any::Any;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use sweep_cache::cache::CacheTable;
use sweep_cache::{CacheEntry, CacheError, Registry};
use tokio::time::sleep;
use tokio_test::{assert_err, assert_ok};

type Entry = Arc<CacheEntry<String, String>>;

// == Helper Functions ==

fn create_test_table() -> CacheTable<String, String> {
    Registry::new().table("integration")
}

fn key(name: &str) -> String {
    name.to_string()
}

// == Expiration Tests ==

#[tokio::test]
async fn test_expiring_and_permanent_entries() {
    let table = create_test_table();

    table.add(key("k"), key("v"), Duration::from_millis(100));
    sleep(Duration::from_millis(150)).await;
    assert!(!table.exists(&key("k")), "expired entry should be swept");

    table.add(key("k2"), key("v"), Duration::ZERO);
    sleep(Duration::from_millis(150)).await;
    assert!(table.exists(&key("k2")), "permanent entry should survive");
}

#[tokio::test]
async fn test_permanent_entries_never_swept() {
    let table = create_test_table();
    table.add(key("permanent"), key("v"), Duration::ZERO);
    table.add(key("short"), key("v"), Duration::from_millis(50));

    sleep(Duration::from_millis(300)).await;

    assert!(table.exists(&key("permanent")));
    assert!(!table.exists(&key("short")));
    assert_eq!(table.pending_sweep(), None);
}

#[tokio::test]
async fn test_access_slides_deadline() {
    let table = create_test_table();
    table.add(key("sliding"), key("v"), Duration::from_millis(400));

    sleep(Duration::from_millis(200)).await;
    assert_ok!(table.get(&key("sliding")));

    // 450ms after insert: past the unrefreshed deadline, within the slid one
    sleep(Duration::from_millis(250)).await;
    assert!(table.exists(&key("sliding")));

    // Untouched since 200ms, so due at 600ms
    sleep(Duration::from_millis(350)).await;
    assert!(!table.exists(&key("sliding")));
}

#[tokio::test]
async fn test_exists_does_not_extend_lifespan() {
    let table = create_test_table();
    table.add(key("k"), key("v"), Duration::from_millis(150));

    for _ in 0..4 {
        sleep(Duration::from_millis(50)).await;
        let _ = table.exists(&key("k"));
    }
    sleep(Duration::from_millis(100)).await;

    assert!(!table.exists(&key("k")));
}

#[tokio::test]
async fn test_staggered_lifespans_expire_in_order() {
    let table = create_test_table();
    table.add(key("slow"), key("v"), Duration::from_millis(400));
    table.add(key("fast"), key("v"), Duration::from_millis(100));
    table.add(key("medium"), key("v"), Duration::from_millis(250));

    sleep(Duration::from_millis(175)).await;
    assert!(!table.exists(&key("fast")));
    assert!(table.exists(&key("medium")));
    assert!(table.exists(&key("slow")));

    sleep(Duration::from_millis(150)).await;
    assert!(!table.exists(&key("medium")));
    assert!(table.exists(&key("slow")));

    sleep(Duration::from_millis(175)).await;
    assert!(table.is_empty());
    assert_eq!(table.pending_sweep(), None);
    assert_eq!(table.stats().expirations, 3);
}

#[tokio::test]
async fn test_sweep_fires_callbacks() {
    let table = create_test_table();
    let events = Arc::new(Mutex::new(Vec::new()));

    let log = events.clone();
    table.add_deleted_callback(move |entry: &Entry| {
        log.lock().unwrap().push(format!("deleted {}", entry.key()));
    });

    let entry = table.add(key("k"), key("v"), Duration::from_millis(50));
    let log = events.clone();
    entry.add_expiry_callback(move |key: &String| {
        log.lock().unwrap().push(format!("expiring {key}"));
    });

    sleep(Duration::from_millis(150)).await;

    assert_eq!(
        *events.lock().unwrap(),
        vec!["deleted k".to_string(), "expiring k".to_string()]
    );
}

#[tokio::test]
async fn test_flush_cancels_timer_and_rearms() {
    let table = create_test_table();
    let deleted = Arc::new(AtomicUsize::new(0));
    let counter = deleted.clone();
    table.add_deleted_callback(move |_: &Entry| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    table.add(key("a"), key("v"), Duration::from_millis(100));
    table.add(key("b"), key("v"), Duration::ZERO);
    assert!(table.pending_sweep().is_some());

    table.flush();
    assert_eq!(table.count(), 0);
    assert_eq!(table.pending_sweep(), None);

    sleep(Duration::from_millis(150)).await;
    assert_eq!(deleted.load(Ordering::SeqCst), 0, "flush fires no callbacks");

    table.add(key("c"), key("v"), Duration::from_millis(100));
    let armed = table.pending_sweep().unwrap();
    assert!(armed <= Duration::from_millis(100));

    sleep(Duration::from_millis(200)).await;
    assert!(!table.exists(&key("c")));
    assert_eq!(deleted.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_callback_readding_during_sweep() {
    let table = create_test_table();
    let inner = table.clone();
    table.add_deleted_callback(move |entry: &Entry| {
        // Re-insert once with a short lifespan from inside the sweep
        if entry.key() == "phoenix" {
            inner.add(key("ash"), key("v"), Duration::from_millis(50));
        }
    });

    table.add(key("phoenix"), key("v"), Duration::from_millis(50));
    sleep(Duration::from_millis(100)).await;
    assert!(!table.exists(&key("phoenix")));

    sleep(Duration::from_millis(150)).await;
    assert!(!table.exists(&key("ash")));
    assert_eq!(table.pending_sweep(), None);
}

// == Delete Tests ==

#[tokio::test]
async fn test_delete_callback_order() {
    let table = create_test_table();
    let events = Arc::new(Mutex::new(Vec::new()));

    let log = events.clone();
    table.add_deleted_callback(move |_: &Entry| log.lock().unwrap().push("table"));
    let entry = table.add(key("k"), key("v"), Duration::ZERO);
    let log = events.clone();
    let probe = table.clone();
    entry.add_expiry_callback(move |key: &String| {
        // Still visible while callbacks run
        assert!(probe.exists(key));
        log.lock().unwrap().push("entry");
    });

    let removed = assert_ok!(table.delete(&key("k")));
    assert_eq!(removed.value(), "v");
    assert_eq!(*events.lock().unwrap(), vec!["table", "entry"]);
    assert!(!table.exists(&key("k")));

    let err = assert_err!(table.delete(&key("k")));
    assert_eq!(err, CacheError::NotFound("integration".into()));
    assert_eq!(events.lock().unwrap().len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_delete_fires_once() {
    let table = create_test_table();
    let fired = Arc::new(AtomicUsize::new(0));
    let counter = fired.clone();
    table.add_deleted_callback(move |_: &Entry| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    table.add(key("contested"), key("v"), Duration::ZERO);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let table = table.clone();
            thread::spawn(move || table.delete(&key("contested")).is_ok())
        })
        .collect();
    let winners = handles
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .filter(|won| *won)
        .count();

    assert_eq!(winners, 1);
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

// == Add If Absent Tests ==

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_add_if_absent_single_winner() {
    let table = create_test_table();

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let table = table.clone();
            thread::spawn(move || table.add_if_absent(key("race"), Duration::ZERO, format!("writer {i}")))
        })
        .collect();
    let results: Vec<bool> = handles
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .collect();

    assert_eq!(results.iter().filter(|won| **won).count(), 1);
    assert_eq!(table.count(), 1);

    let winner = results.iter().position(|won| *won).unwrap();
    let stored = assert_ok!(table.get(&key("race")));
    assert_eq!(stored.value(), &format!("writer {winner}"));
}

#[tokio::test]
async fn test_add_if_absent_skips_loader() {
    let table = create_test_table();
    let loads = Arc::new(AtomicUsize::new(0));
    let counter = loads.clone();
    table.set_data_loader(move |key: &String, _: &[&dyn Any]| {
        counter.fetch_add(1, Ordering::SeqCst);
        Some(CacheEntry::new(key.clone(), "loaded".to_string(), Duration::ZERO))
    });

    assert!(table.add_if_absent(key("k"), Duration::ZERO, key("direct")));
    assert!(!table.add_if_absent(key("k"), Duration::ZERO, key("again")));
    assert_eq!(loads.load(Ordering::SeqCst), 0);
}

// == Loader Tests ==

#[tokio::test]
async fn test_loader_entry_expires() {
    let table = create_test_table();
    table.set_data_loader(|key: &String, _: &[&dyn Any]| {
        Some(CacheEntry::new(key.clone(), "loaded".to_string(), Duration::from_millis(50)))
    });

    let entry = assert_ok!(table.get(&key("lazy")));
    assert_eq!(entry.value(), "loaded");
    assert!(table.exists(&key("lazy")));
    assert_eq!(table.stats().loads, 1);

    sleep(Duration::from_millis(150)).await;
    assert!(!table.exists(&key("lazy")));
}

#[tokio::test]
async fn test_loader_declines() {
    let table = create_test_table();
    table.set_data_loader(|_: &String, _: &[&dyn Any]| None);

    let err = assert_err!(table.get(&key("nope")));
    assert_eq!(err, CacheError::NotFoundOrLoadable("integration".into()));
}

// == Ranking Tests ==

#[tokio::test]
async fn test_most_accessed_top_two() {
    let table = create_test_table();
    for (name, hits) in [("A", 5), ("B", 1), ("C", 3)] {
        table.add(key(name), key("v"), Duration::ZERO);
        for _ in 0..hits {
            assert_ok!(table.get(&key(name)));
        }
    }

    let top: Vec<String> = table
        .most_accessed(2)
        .iter()
        .map(|entry| entry.key().clone())
        .collect();
    assert_eq!(top, vec![key("A"), key("C")]);
}

// == Registry Tests ==

#[tokio::test]
async fn test_registry_shares_tables() {
    let registry: Registry<String, String> = Registry::new();
    let first = registry.table("shared");
    first.add(key("k"), key("v"), Duration::from_secs(60));

    let second = registry.table("shared");
    assert!(second.exists(&key("k")));
    assert_eq!(second.pending_sweep(), first.pending_sweep());
    assert!(registry.table("other").is_empty());
    assert_eq!(registry.names(), vec!["other".to_string(), "shared".to_string()]);
}
