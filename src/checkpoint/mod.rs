//! Durable execution checkpoints.
//!
//! A checkpoint is the canonical record of run progress for one feature:
//! which workstreams completed, which failed, and where the loop stopped.
//! The orchestrator persists it before and after every executor invocation
//! so a run can be resumed from exactly where it was interrupted.

pub mod state;
pub mod store;

pub use state::{CHECKPOINT_VERSION, Checkpoint, CheckpointStatus};
pub use store::{CheckpointStore, FileCheckpointStore};
