//! Checkpoint document and status transitions.

use crate::breaker::BreakerSnapshot;
use anyhow::{Result, bail};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// On-disk schema version.
pub const CHECKPOINT_VERSION: u32 = 1;

/// Execution status of a feature run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointStatus {
    /// Run has not started
    #[default]
    Pending,
    /// Run is underway
    InProgress,
    /// All workstreams finished successfully
    Completed,
    /// A workstream exhausted its retries or failed fatally
    Failed,
}

impl CheckpointStatus {
    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Durable record of execution progress for one feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Schema version
    pub version: u32,
    /// Feature this checkpoint belongs to
    pub feature_id: String,
    /// Current run status
    pub status: CheckpointStatus,
    /// Workstreams completed so far, in completion order
    #[serde(default)]
    pub completed: Vec<String>,
    /// Workstreams that failed
    #[serde(default)]
    pub failed: Vec<String>,
    /// Workstream currently being executed, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_workstream: Option<String>,
    /// When the checkpoint was first created
    pub created_at: DateTime<Utc>,
    /// When the checkpoint was last persisted
    pub updated_at: DateTime<Utc>,
    /// Circuit-breaker state mirrored at last save
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub circuit_breaker: Option<BreakerSnapshot>,
}

impl Checkpoint {
    /// Create a fresh pending checkpoint.
    pub fn new(feature_id: &str) -> Self {
        let now = Utc::now();
        Self {
            version: CHECKPOINT_VERSION,
            feature_id: feature_id.to_string(),
            status: CheckpointStatus::Pending,
            completed: Vec::new(),
            failed: Vec::new(),
            current_workstream: None,
            created_at: now,
            updated_at: now,
            circuit_breaker: None,
        }
    }

    /// Mark a workstream as the one currently executing.
    pub fn begin_workstream(&mut self, ws_id: &str) {
        self.status = CheckpointStatus::InProgress;
        self.current_workstream = Some(ws_id.to_string());
        self.touch();
    }

    /// Record a workstream completion, in order.
    ///
    /// Clears the current-workstream marker when it points at the finished
    /// workstream, keeping completed and current disjoint.
    pub fn complete_workstream(&mut self, ws_id: &str) {
        if !self.completed.iter().any(|id| id == ws_id) {
            self.completed.push(ws_id.to_string());
        }
        if self.current_workstream.as_deref() == Some(ws_id) {
            self.current_workstream = None;
        }
        self.touch();
    }

    /// Mark the whole run completed. Terminal states carry no current
    /// workstream.
    pub fn mark_completed(&mut self) {
        self.status = CheckpointStatus::Completed;
        self.current_workstream = None;
        self.touch();
    }

    /// Mark the run failed at the given workstream.
    pub fn mark_failed(&mut self, ws_id: &str) {
        if !self.failed.iter().any(|id| id == ws_id) {
            self.failed.push(ws_id.to_string());
        }
        self.status = CheckpointStatus::Failed;
        self.current_workstream = None;
        self.touch();
    }

    /// Check whether a workstream is already recorded as completed.
    pub fn is_completed(&self, ws_id: &str) -> bool {
        self.completed.iter().any(|id| id == ws_id)
    }

    /// Validate the document's internal invariants.
    ///
    /// Used by the store to distinguish a structurally valid JSON file from
    /// a semantically corrupt checkpoint.
    pub fn validate(&self) -> Result<()> {
        if self.version == 0 || self.version > CHECKPOINT_VERSION {
            bail!("unsupported checkpoint version {}", self.version);
        }
        if self.feature_id.trim().is_empty() {
            bail!("checkpoint has an empty feature_id");
        }
        if let Some(current) = &self.current_workstream {
            if self.status.is_terminal() {
                bail!("terminal checkpoint still has current workstream {current}");
            }
            if self.is_completed(current) {
                bail!("current workstream {current} is already completed");
            }
        }
        Ok(())
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
