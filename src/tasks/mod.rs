//! Background Tasks Module
//!
//! Contains the tasks tables schedule on the Tokio runtime.
//!
//! # Tasks
//! - Sweep timer: wakes a table's expiration sweep when its shortest pending
//!   lifespan runs out

mod sweep;

pub(crate) use sweep::spawn_sweep_timer;
