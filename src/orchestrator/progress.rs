//! Progress updates emitted during a run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Well-defined points a run passes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    Started,
    Loading,
    BuildingGraph,
    ExecutionOrder,
    Executing,
    Retrying,
    Completed,
    Failed,
    Resuming,
    AlreadyCompleted,
}

/// One progress update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    /// When the update was emitted
    pub timestamp: DateTime<Utc>,
    /// Human-readable message
    pub message: String,
    /// Workstream the update refers to, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workstream_id: Option<String>,
    /// Status tag
    pub status: ProgressStatus,
}

impl ProgressUpdate {
    /// Create an update stamped with the current time.
    pub fn new(status: ProgressStatus, message: &str) -> Self {
        Self {
            timestamp: Utc::now(),
            message: message.to_string(),
            workstream_id: None,
            status,
        }
    }

    /// Attach the workstream this update refers to.
    pub fn for_workstream(mut self, ws_id: &str) -> Self {
        self.workstream_id = Some(ws_id.to_string());
        self
    }
}

/// Callback the orchestrator emits updates through.
pub type ProgressHook = Arc<dyn Fn(ProgressUpdate) + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_tags_serialize_snake_case() {
        assert_eq!(
            serde_json::to_value(ProgressStatus::BuildingGraph).unwrap(),
            "building_graph"
        );
        assert_eq!(
            serde_json::to_value(ProgressStatus::AlreadyCompleted).unwrap(),
            "already_completed"
        );
        assert_eq!(
            serde_json::to_value(ProgressStatus::ExecutionOrder).unwrap(),
            "execution_order"
        );
    }

    #[test]
    fn test_update_builder() {
        let update = ProgressUpdate::new(ProgressStatus::Executing, "running").for_workstream("A");
        assert_eq!(update.workstream_id.as_deref(), Some("A"));
        assert_eq!(update.status, ProgressStatus::Executing);
    }
}
