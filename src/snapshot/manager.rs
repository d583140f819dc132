//! Snapshot creation, listing, diffing, and rollback.

use super::types::{Snapshot, SnapshotDiff, SnapshotMetrics, SnapshotTrigger, WorkInProgress};
use crate::checkpoint::{Checkpoint, CheckpointStatus, CheckpointStore};
use crate::errors::DurabilityError;
use anyhow::Context;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use uuid::Uuid;

/// Manages the snapshot directory for all features.
pub struct SnapshotManager {
    dir: PathBuf,
    auto_interval: u64,
    /// Completions per feature since the last automatic snapshot.
    completions: RwLock<HashMap<String, u64>>,
}

impl SnapshotManager {
    /// Create a manager rooted at `dir`, creating the directory if needed.
    pub fn new(dir: impl Into<PathBuf>, auto_interval: u64) -> Result<Self, DurabilityError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create snapshot directory: {}", dir.display()))
            .map_err(DurabilityError::Other)?;
        Ok(Self {
            dir,
            auto_interval: auto_interval.max(1),
            completions: RwLock::new(HashMap::new()),
        })
    }

    fn snapshot_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    /// Create a snapshot in memory. The parent is the latest persisted
    /// snapshot of the same feature.
    pub fn create(
        &self,
        feature_id: &str,
        completed: Vec<String>,
        pending: Vec<String>,
        work_in_progress: Option<WorkInProgress>,
        metrics: SnapshotMetrics,
        trigger: SnapshotTrigger,
    ) -> Result<Snapshot, DurabilityError> {
        let parent_id = self
            .list(feature_id)?
            .last()
            .map(|snap| snap.id.clone());

        Ok(Snapshot {
            id: Uuid::new_v4().to_string(),
            feature_id: feature_id.to_string(),
            timestamp: Utc::now(),
            completed,
            pending,
            work_in_progress,
            metrics,
            parent_id,
            trigger,
        })
    }

    /// Persist a snapshot as one JSON file under the snapshot directory.
    pub fn save(&self, snapshot: &Snapshot) -> Result<(), DurabilityError> {
        let path = self.snapshot_path(&snapshot.id);
        let json = serde_json::to_string_pretty(snapshot)
            .context("Failed to serialize snapshot")
            .map_err(DurabilityError::Other)?;

        let write = || -> std::io::Result<()> {
            let mut file = fs::File::create(&path)?;
            file.write_all(json.as_bytes())?;
            file.sync_all()
        };
        write()
            .with_context(|| format!("Failed to write snapshot: {}", path.display()))
            .map_err(DurabilityError::Other)?;

        tracing::debug!(
            snapshot = %snapshot.id,
            feature = %snapshot.feature_id,
            trigger = ?snapshot.trigger,
            "snapshot saved"
        );
        Ok(())
    }

    /// Load one snapshot by id.
    pub fn load(&self, id: &str) -> Result<Snapshot, DurabilityError> {
        let path = self.snapshot_path(id);
        if !path.exists() {
            return Err(DurabilityError::SnapshotNotFound { id: id.to_string() });
        }
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read snapshot: {}", path.display()))
            .map_err(DurabilityError::Other)?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse snapshot: {}", path.display()))
            .map_err(DurabilityError::Other)
    }

    /// All snapshots for a feature, oldest first.
    ///
    /// Unparsable files are skipped with a warning so one bad snapshot
    /// cannot hide the rest of the history.
    pub fn list(&self, feature_id: &str) -> Result<Vec<Snapshot>, DurabilityError> {
        let mut snapshots = Vec::new();
        let entries = fs::read_dir(&self.dir)
            .with_context(|| format!("Failed to read snapshot directory: {}", self.dir.display()))
            .map_err(DurabilityError::Other)?;

        for entry in entries.filter_map(|e| e.ok()) {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let content = match fs::read_to_string(&path) {
                Ok(c) => c,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unreadable snapshot");
                    continue;
                }
            };
            match serde_json::from_str::<Snapshot>(&content) {
                Ok(snap) if snap.feature_id == feature_id => snapshots.push(snap),
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unparsable snapshot");
                }
            }
        }

        snapshots.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
        Ok(snapshots)
    }

    /// Set differences from snapshot `a` to snapshot `b`.
    pub fn diff(&self, a: &str, b: &str) -> Result<SnapshotDiff, DurabilityError> {
        let from = self.load(a)?;
        let to = self.load(b)?;

        fn difference(left: &[String], right: &[String]) -> Vec<String> {
            let right: HashSet<&str> = right.iter().map(String::as_str).collect();
            let mut out: Vec<String> = left
                .iter()
                .filter(|id| !right.contains(id.as_str()))
                .cloned()
                .collect();
            out.sort();
            out
        }

        Ok(SnapshotDiff {
            added_completed: difference(&to.completed, &from.completed),
            removed_completed: difference(&from.completed, &to.completed),
            added_pending: difference(&to.pending, &from.pending),
            removed_pending: difference(&from.pending, &to.pending),
        })
    }

    /// Atomically replace the feature's current checkpoint with the
    /// snapshot's completed/pending sets. Prior snapshots are never deleted.
    pub fn rollback<S: CheckpointStore>(
        &self,
        id: &str,
        store: &S,
    ) -> Result<Checkpoint, DurabilityError> {
        let snapshot = self.load(id)?;

        let mut checkpoint = match store.load(&snapshot.feature_id) {
            Ok(existing) => existing,
            Err(DurabilityError::CheckpointNotFound { .. }) => Checkpoint::new(&snapshot.feature_id),
            Err(other) => return Err(other),
        };

        checkpoint.completed = snapshot.completed.clone();
        checkpoint.failed.clear();
        checkpoint.current_workstream = None;
        checkpoint.status = if snapshot.pending.is_empty() {
            CheckpointStatus::Completed
        } else {
            CheckpointStatus::InProgress
        };
        checkpoint.updated_at = Utc::now();

        store.save(&checkpoint)?;
        tracing::info!(
            snapshot = id,
            feature = %snapshot.feature_id,
            "rolled back to snapshot"
        );
        Ok(checkpoint)
    }

    /// Count a workstream completion; every `auto_interval` completions an
    /// automatic snapshot is created and persisted.
    ///
    /// Returns the snapshot when one was taken.
    pub fn record_completion(
        &self,
        checkpoint: &Checkpoint,
        pending: &[String],
    ) -> Result<Option<Snapshot>, DurabilityError> {
        let count = {
            let mut completions = self.completions.write().expect("completions lock poisoned");
            let count = completions
                .entry(checkpoint.feature_id.clone())
                .or_insert(0);
            *count += 1;
            *count
        };

        if count % self.auto_interval != 0 {
            return Ok(None);
        }

        let snapshot = self.create(
            &checkpoint.feature_id,
            checkpoint.completed.clone(),
            pending.to_vec(),
            None,
            SnapshotMetrics::default(),
            SnapshotTrigger::Auto,
        )?;
        self.save(&snapshot)?;
        Ok(Some(snapshot))
    }

    /// Create and immediately persist a snapshot before a risky operation.
    pub fn create_pre_risk_snapshot(
        &self,
        feature_id: &str,
        operation: &str,
        completed: Vec<String>,
        pending: Vec<String>,
        work_in_progress: Option<WorkInProgress>,
    ) -> Result<Snapshot, DurabilityError> {
        let snapshot = self.create(
            feature_id,
            completed,
            pending,
            work_in_progress,
            SnapshotMetrics::default(),
            SnapshotTrigger::PreRisk(operation.to_string()),
        )?;
        self.save(&snapshot)?;
        Ok(snapshot)
    }

    /// Snapshot directory path.
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::FileCheckpointStore;
    use tempfile::tempdir;

    fn manager(dir: &Path, interval: u64) -> SnapshotManager {
        SnapshotManager::new(dir.join("snapshots"), interval).unwrap()
    }

    fn saved(
        mgr: &SnapshotManager,
        feature: &str,
        completed: &[&str],
        pending: &[&str],
        trigger: SnapshotTrigger,
    ) -> Snapshot {
        let snap = mgr
            .create(
                feature,
                completed.iter().map(|s| s.to_string()).collect(),
                pending.iter().map(|s| s.to_string()).collect(),
                None,
                SnapshotMetrics::default(),
                trigger,
            )
            .unwrap();
        mgr.save(&snap).unwrap();
        snap
    }

    #[test]
    fn test_create_links_parent_lineage() {
        let dir = tempdir().unwrap();
        let mgr = manager(dir.path(), 5);

        let first = saved(&mgr, "AUTH", &["A"], &["B"], SnapshotTrigger::Manual);
        assert!(first.parent_id.is_none());

        let second = saved(&mgr, "AUTH", &["A", "B"], &[], SnapshotTrigger::Manual);
        assert_eq!(second.parent_id.as_deref(), Some(first.id.as_str()));
    }

    #[test]
    fn test_lineage_is_per_feature() {
        let dir = tempdir().unwrap();
        let mgr = manager(dir.path(), 5);

        saved(&mgr, "AUTH", &["A"], &[], SnapshotTrigger::Manual);
        let other = saved(&mgr, "BILL", &["X"], &[], SnapshotTrigger::Manual);
        assert!(other.parent_id.is_none());
    }

    #[test]
    fn test_list_filters_and_sorts() {
        let dir = tempdir().unwrap();
        let mgr = manager(dir.path(), 5);

        let first = saved(&mgr, "AUTH", &[], &["A"], SnapshotTrigger::Manual);
        let second = saved(&mgr, "AUTH", &["A"], &[], SnapshotTrigger::Manual);
        saved(&mgr, "BILL", &[], &[], SnapshotTrigger::Manual);

        let listed = mgr.list("AUTH").unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, first.id);
        assert_eq!(listed[1].id, second.id);
    }

    #[test]
    fn test_diff_reports_set_differences() {
        let dir = tempdir().unwrap();
        let mgr = manager(dir.path(), 5);

        let a = saved(&mgr, "AUTH", &["A"], &["B", "C"], SnapshotTrigger::Manual);
        let b = saved(&mgr, "AUTH", &["A", "B"], &["C"], SnapshotTrigger::Manual);

        let diff = mgr.diff(&a.id, &b.id).unwrap();
        assert_eq!(diff.added_completed, vec!["B"]);
        assert!(diff.removed_completed.is_empty());
        assert!(diff.added_pending.is_empty());
        assert_eq!(diff.removed_pending, vec!["B"]);
    }

    #[test]
    fn test_diff_identical_snapshots_is_empty() {
        let dir = tempdir().unwrap();
        let mgr = manager(dir.path(), 5);
        let a = saved(&mgr, "AUTH", &["A"], &["B"], SnapshotTrigger::Manual);
        let b = saved(&mgr, "AUTH", &["A"], &["B"], SnapshotTrigger::Manual);
        assert!(mgr.diff(&a.id, &b.id).unwrap().is_empty());
    }

    #[test]
    fn test_rollback_replaces_checkpoint_and_keeps_snapshots() {
        let dir = tempdir().unwrap();
        let mgr = manager(dir.path(), 5);
        let store = FileCheckpointStore::new(dir.path().join("checkpoints")).unwrap();

        let mut cp = Checkpoint::new("AUTH");
        cp.complete_workstream("A");
        cp.complete_workstream("B");
        cp.mark_completed();
        store.save(&cp).unwrap();

        let snap = saved(&mgr, "AUTH", &["A"], &["B"], SnapshotTrigger::Manual);
        let rolled = mgr.rollback(&snap.id, &store).unwrap();

        assert_eq!(rolled.completed, vec!["A"]);
        assert_eq!(rolled.status, CheckpointStatus::InProgress);
        assert!(rolled.failed.is_empty());

        // Rollback never deletes snapshot history
        assert_eq!(mgr.list("AUTH").unwrap().len(), 1);
        // And the store now holds the rolled-back state
        assert_eq!(store.load("AUTH").unwrap().completed, vec!["A"]);
    }

    #[test]
    fn test_rollback_to_fully_completed_snapshot() {
        let dir = tempdir().unwrap();
        let mgr = manager(dir.path(), 5);
        let store = FileCheckpointStore::new(dir.path().join("checkpoints")).unwrap();

        let snap = saved(&mgr, "AUTH", &["A", "B"], &[], SnapshotTrigger::Manual);
        let rolled = mgr.rollback(&snap.id, &store).unwrap();
        assert_eq!(rolled.status, CheckpointStatus::Completed);
    }

    #[test]
    fn test_rollback_unknown_snapshot() {
        let dir = tempdir().unwrap();
        let mgr = manager(dir.path(), 5);
        let store = FileCheckpointStore::new(dir.path().join("checkpoints")).unwrap();
        assert!(matches!(
            mgr.rollback("missing", &store),
            Err(DurabilityError::SnapshotNotFound { .. })
        ));
    }

    #[test]
    fn test_auto_snapshot_every_interval() {
        let dir = tempdir().unwrap();
        let mgr = manager(dir.path(), 3);

        let mut cp = Checkpoint::new("AUTH");
        let mut auto_snaps = 0;
        for i in 0..7 {
            cp.complete_workstream(&format!("WS-{i}"));
            if mgr.record_completion(&cp, &[]).unwrap().is_some() {
                auto_snaps += 1;
            }
        }

        // Completions 3 and 6 trigger snapshots
        assert_eq!(auto_snaps, 2);
        let listed = mgr.list("AUTH").unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed.iter().all(|s| s.trigger == SnapshotTrigger::Auto));
    }

    #[test]
    fn test_pre_risk_snapshot_persists_immediately() {
        let dir = tempdir().unwrap();
        let mgr = manager(dir.path(), 5);

        let snap = mgr
            .create_pre_risk_snapshot("AUTH", "rollback", vec!["A".into()], vec!["B".into()], None)
            .unwrap();

        assert_eq!(
            snap.trigger,
            SnapshotTrigger::PreRisk("rollback".to_string())
        );
        let loaded = mgr.load(&snap.id).unwrap();
        assert_eq!(loaded, snap);
    }
}
