//! Point-in-time execution snapshots with lineage and rollback.
//!
//! Snapshots wrap the checkpoint shape with a parent pointer so the history
//! of a feature's execution can be walked, diffed, and rolled back to.
//! Snapshots are created manually, automatically every N completions, or
//! immediately before risky operations.

pub mod manager;
pub mod types;

pub use manager::SnapshotManager;
pub use types::{Snapshot, SnapshotDiff, SnapshotMetrics, SnapshotTrigger, WorkInProgress};
