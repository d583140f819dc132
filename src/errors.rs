//! Typed error hierarchy for the sdp core.
//!
//! Three top-level enums cover the three subsystems:
//! - `ScheduleError`: dependency-graph construction and lookup failures
//! - `ExecutionError`: orchestrator run/resume failures
//! - `DurabilityError`: checkpoint, snapshot, and log persistence failures

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors raised while building or validating the dependency graph.
///
/// All schedule errors are surfaced before any workstream executes.
#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("Circular dependency detected. Involved workstreams: {involved:?}")]
    CircularDependency { involved: Vec<String> },

    #[error("Workstream {workstream} depends on unknown workstream {dependency}")]
    MissingDependency {
        workstream: String,
        dependency: String,
    },

    #[error("Duplicate workstream id: {id}")]
    DuplicateWorkstream { id: String },

    #[error("No workstreams found for feature {feature}")]
    FeatureNotFound { feature: String },
}

/// Errors raised by the orchestrator execution loop.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("Workstream {workstream} failed after {attempts} attempts: {message}")]
    RetriesExhausted {
        workstream: String,
        attempts: u32,
        message: String,
    },

    #[error("Workstream {workstream} failed with a fatal error: {message}")]
    Fatal { workstream: String, message: String },

    #[error("Circuit breaker is open until {open_until}")]
    CircuitOpen { open_until: DateTime<Utc> },

    #[error("Run cancelled at workstream {workstream}")]
    Cancelled { workstream: String },

    #[error(transparent)]
    Schedule(#[from] ScheduleError),

    #[error(transparent)]
    Durability(#[from] DurabilityError),
}

/// Errors raised by the durable stores (checkpoints, snapshots, event and
/// decision logs).
#[derive(Debug, Error)]
pub enum DurabilityError {
    #[error("Failed to write checkpoint at {path}: {source}")]
    CheckpointWrite {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Checkpoint {id} is corrupt: {reason}")]
    CheckpointCorrupt { id: String, reason: String },

    #[error("Checkpoint {id} not found")]
    CheckpointNotFound { id: String },

    #[error("Snapshot {id} not found")]
    SnapshotNotFound { id: String },

    #[error("Failed to append to event log at {path}: {source}")]
    EventLogWrite {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Hash chain broken at line {line}: expected {expected}, observed {observed}")]
    HashChainBroken {
        line: usize,
        expected: String,
        observed: String,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
