//! Snapshot document types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What caused a snapshot to be taken.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum SnapshotTrigger {
    /// Explicitly requested by an operator or agent
    Manual,
    /// Taken by the completion counter
    Auto,
    /// Taken before a risky operation, carrying the operation name
    PreRisk(String),
}

impl From<SnapshotTrigger> for String {
    fn from(trigger: SnapshotTrigger) -> Self {
        match trigger {
            SnapshotTrigger::Manual => "manual".to_string(),
            SnapshotTrigger::Auto => "auto".to_string(),
            SnapshotTrigger::PreRisk(op) => format!("pre_risk:{op}"),
        }
    }
}

impl TryFrom<String> for SnapshotTrigger {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "manual" => Ok(Self::Manual),
            "auto" => Ok(Self::Auto),
            other => other
                .strip_prefix("pre_risk:")
                .map(|op| Self::PreRisk(op.to_string()))
                .ok_or_else(|| format!("unknown snapshot trigger: {other}")),
        }
    }
}

/// Work underway when the snapshot was taken.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkInProgress {
    /// Workstream being executed
    pub workstream_id: String,
    /// Free-form stage label (e.g., "implementing", "reviewing")
    pub stage: String,
    /// When work on the workstream started
    pub started_at: DateTime<Utc>,
    /// Paths of partial artifacts produced so far
    #[serde(default)]
    pub partial_artifacts: Vec<String>,
}

/// Quality metrics captured alongside the snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SnapshotMetrics {
    /// Wall-clock duration of the run so far, in seconds
    pub duration_seconds: f64,
    /// Test coverage fraction in [0, 1]
    pub coverage: f64,
    /// Tests passing at snapshot time
    pub tests_passed: u32,
    /// Total tests at snapshot time
    pub tests_total: u32,
}

/// A point-in-time copy of execution state for one feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Unique snapshot id
    pub id: String,
    /// Feature the snapshot belongs to
    pub feature_id: String,
    /// When the snapshot was taken
    pub timestamp: DateTime<Utc>,
    /// Workstreams completed at snapshot time
    pub completed: Vec<String>,
    /// Workstreams still pending at snapshot time
    pub pending: Vec<String>,
    /// Work underway, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub work_in_progress: Option<WorkInProgress>,
    /// Captured metrics
    #[serde(default)]
    pub metrics: SnapshotMetrics,
    /// Prior snapshot of the same feature, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    /// What caused this snapshot
    pub trigger: SnapshotTrigger,
}

/// Set differences between two snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SnapshotDiff {
    pub added_completed: Vec<String>,
    pub removed_completed: Vec<String>,
    pub added_pending: Vec<String>,
    pub removed_pending: Vec<String>,
}

impl SnapshotDiff {
    /// Check whether the two snapshots were identical.
    pub fn is_empty(&self) -> bool {
        self.added_completed.is_empty()
            && self.removed_completed.is_empty()
            && self.added_pending.is_empty()
            && self.removed_pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trigger_string_round_trip() {
        for trigger in [
            SnapshotTrigger::Manual,
            SnapshotTrigger::Auto,
            SnapshotTrigger::PreRisk("rollback".to_string()),
        ] {
            let s: String = trigger.clone().into();
            let parsed = SnapshotTrigger::try_from(s).unwrap();
            assert_eq!(parsed, trigger);
        }
    }

    #[test]
    fn test_pre_risk_trigger_serializes_with_operation() {
        let s: String = SnapshotTrigger::PreRisk("schema_migration".to_string()).into();
        assert_eq!(s, "pre_risk:schema_migration");
    }

    #[test]
    fn test_unknown_trigger_rejected() {
        assert!(SnapshotTrigger::try_from("weird".to_string()).is_err());
    }

    #[test]
    fn test_snapshot_json_shape() {
        let snap = Snapshot {
            id: "snap-1".to_string(),
            feature_id: "AUTH".to_string(),
            timestamp: Utc::now(),
            completed: vec!["A".to_string()],
            pending: vec!["B".to_string()],
            work_in_progress: None,
            metrics: SnapshotMetrics::default(),
            parent_id: None,
            trigger: SnapshotTrigger::Auto,
        };

        let value: serde_json::Value = serde_json::to_value(&snap).unwrap();
        assert_eq!(value["trigger"], "auto");
        assert!(value.get("work_in_progress").is_none());
        assert!(value.get("parent_id").is_none());
    }
}
