//! Expiration Timer Task
//!
//! One-shot timer that wakes a table's expiration sweep once the shortest
//! pending lifespan has run out.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::trace;

/// Spawns a one-shot timer that calls `fire` with the table after `delay`.
///
/// The task holds only a `Weak` reference, so it never keeps a dropped table
/// alive; if the table is gone when the timer fires, nothing happens. The
/// returned handle is the cancellation mechanism: the owning table aborts it
/// when it re-arms, flushes or is dropped.
///
/// # Arguments
/// * `runtime` - Runtime the timer task is spawned on
/// * `table` - Weak reference back to the owning table
/// * `delay` - Time until the sweep should run
/// * `fire` - Sweep entry point invoked with the upgraded table
pub(crate) fn spawn_sweep_timer<T>(
    runtime: &Handle,
    table: Weak<T>,
    delay: Duration,
    fire: fn(&Arc<T>),
) -> JoinHandle<()>
where
    T: Send + Sync + 'static,
{
    runtime.spawn(async move {
        tokio::time::sleep(delay).await;

        match table.upgrade() {
            Some(table) => fire(&table),
            None => trace!("Sweep timer fired after its table was dropped"),
        }
    })
}
