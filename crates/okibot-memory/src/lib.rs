//! # okibot-memory
//!
//! Persistent state for okibot: the seen-sender ledger and session snapshots.

pub mod seen;
pub mod snapshot;

pub use seen::SeenSenders;
pub use snapshot::{SnapshotManager, SnapshotRecord, StartupRestore};
