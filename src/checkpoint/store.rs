//! Atomic, crash-safe checkpoint persistence.
//!
//! `Save` writes to a temp file in the target directory, fsyncs, copies the
//! previous committed file to `<feature>.bak`, then renames over the target.
//! Readers never observe a partial file. `Load` falls back to the `.bak`
//! sibling when the current file is corrupt.

use super::state::Checkpoint;
use crate::errors::DurabilityError;
use anyhow::Context;
use dashmap::DashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Persistence contract for checkpoints.
///
/// `resume` is `load` today; it stays a distinct operation so lease
/// acquisition can be added without changing callers.
pub trait CheckpointStore: Send + Sync {
    /// Durably persist a checkpoint. Atomic: a reader sees either the old
    /// or the new committed state, never a partial write.
    fn save(&self, checkpoint: &Checkpoint) -> Result<(), DurabilityError>;

    /// Load the latest committed checkpoint for a feature.
    fn load(&self, feature_id: &str) -> Result<Checkpoint, DurabilityError>;

    /// Load a checkpoint for resumption.
    fn resume(&self, feature_id: &str) -> Result<Checkpoint, DurabilityError>;
}

/// File-backed checkpoint store, one JSON document per feature.
pub struct FileCheckpointStore {
    dir: PathBuf,
    /// Per-feature write serialization. Multi-process writers are out of
    /// scope; within the process, last writer wins on rename.
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl FileCheckpointStore {
    /// Create a store rooted at `dir`, creating the directory if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, DurabilityError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| DurabilityError::CheckpointWrite {
            path: dir.clone(),
            source,
        })?;
        Ok(Self {
            dir,
            locks: DashMap::new(),
        })
    }

    /// Path of the committed checkpoint for a feature.
    pub fn checkpoint_path(&self, feature_id: &str) -> PathBuf {
        self.dir.join(format!("{feature_id}.json"))
    }

    fn backup_path(&self, feature_id: &str) -> PathBuf {
        self.dir.join(format!("{feature_id}.bak"))
    }

    fn feature_lock(&self, feature_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(feature_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn parse_and_validate(content: &str, id: &str) -> Result<Checkpoint, DurabilityError> {
        let checkpoint: Checkpoint =
            serde_json::from_str(content).map_err(|e| DurabilityError::CheckpointCorrupt {
                id: id.to_string(),
                reason: e.to_string(),
            })?;
        checkpoint
            .validate()
            .map_err(|e| DurabilityError::CheckpointCorrupt {
                id: id.to_string(),
                reason: e.to_string(),
            })?;
        Ok(checkpoint)
    }

    #[cfg(unix)]
    fn restrict_permissions(path: &Path) -> std::io::Result<()> {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))
    }

    #[cfg(not(unix))]
    fn restrict_permissions(_path: &Path) -> std::io::Result<()> {
        Ok(())
    }
}

impl CheckpointStore for FileCheckpointStore {
    fn save(&self, checkpoint: &Checkpoint) -> Result<(), DurabilityError> {
        let lock = self.feature_lock(&checkpoint.feature_id);
        let _guard = lock.lock().expect("checkpoint lock poisoned");

        let target = self.checkpoint_path(&checkpoint.feature_id);
        let tmp = self.dir.join(format!("{}.json.tmp", checkpoint.feature_id));

        let write = |path: &Path| -> std::io::Result<()> {
            let json = serde_json::to_string_pretty(checkpoint)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
            let mut file = fs::File::create(path)?;
            file.write_all(json.as_bytes())?;
            file.sync_all()?;
            Self::restrict_permissions(path)?;
            Ok(())
        };

        write(&tmp).map_err(|source| DurabilityError::CheckpointWrite {
            path: tmp.clone(),
            source,
        })?;

        // Keep the previous committed state as the corruption fallback.
        if target.exists() {
            if let Err(e) = fs::copy(&target, self.backup_path(&checkpoint.feature_id)) {
                tracing::warn!(
                    feature = %checkpoint.feature_id,
                    error = %e,
                    "failed to refresh checkpoint backup"
                );
            }
        }

        fs::rename(&tmp, &target).map_err(|source| DurabilityError::CheckpointWrite {
            path: target.clone(),
            source,
        })?;

        tracing::debug!(
            feature = %checkpoint.feature_id,
            status = ?checkpoint.status,
            completed = checkpoint.completed.len(),
            "checkpoint saved"
        );
        Ok(())
    }

    fn load(&self, feature_id: &str) -> Result<Checkpoint, DurabilityError> {
        let target = self.checkpoint_path(feature_id);
        if !target.exists() {
            return Err(DurabilityError::CheckpointNotFound {
                id: feature_id.to_string(),
            });
        }

        let content = fs::read_to_string(&target)
            .with_context(|| format!("Failed to read checkpoint: {}", target.display()))
            .map_err(DurabilityError::Other)?;

        match Self::parse_and_validate(&content, feature_id) {
            Ok(checkpoint) => Ok(checkpoint),
            Err(corrupt) => {
                let backup = self.backup_path(feature_id);
                if !backup.exists() {
                    return Err(corrupt);
                }
                tracing::warn!(
                    feature = feature_id,
                    "checkpoint corrupt, promoting backup"
                );
                let backup_content = fs::read_to_string(&backup)
                    .with_context(|| format!("Failed to read backup: {}", backup.display()))
                    .map_err(DurabilityError::Other)?;
                let checkpoint = Self::parse_and_validate(&backup_content, feature_id)?;

                // Promote the backup to the committed file.
                fs::copy(&backup, &target).map_err(|source| {
                    DurabilityError::CheckpointWrite {
                        path: target.clone(),
                        source,
                    }
                })?;
                Ok(checkpoint)
            }
        }
    }

    fn resume(&self, feature_id: &str) -> Result<Checkpoint, DurabilityError> {
        self.load(feature_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::state::CheckpointStatus;
    use tempfile::tempdir;

    fn store(dir: &Path) -> FileCheckpointStore {
        FileCheckpointStore::new(dir.join("checkpoints")).unwrap()
    }

    #[test]
    fn test_save_then_load_round_trips() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());

        let mut cp = Checkpoint::new("AUTH");
        cp.begin_workstream("A");
        cp.complete_workstream("A");
        store.save(&cp).unwrap();

        let loaded = store.load("AUTH").unwrap();
        assert_eq!(loaded, cp);
    }

    #[test]
    fn test_load_missing_returns_not_found() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());
        assert!(matches!(
            store.load("GHOST"),
            Err(DurabilityError::CheckpointNotFound { .. })
        ));
    }

    #[test]
    fn test_save_leaves_no_temp_file() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());
        store.save(&Checkpoint::new("AUTH")).unwrap();

        let tmp = store.dir.join("AUTH.json.tmp");
        assert!(!tmp.exists());
        assert!(store.checkpoint_path("AUTH").exists());
    }

    #[test]
    fn test_saved_file_parses_and_validates() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());
        let mut cp = Checkpoint::new("AUTH");
        cp.begin_workstream("A");
        store.save(&cp).unwrap();

        let content = fs::read_to_string(store.checkpoint_path("AUTH")).unwrap();
        let parsed: Checkpoint = serde_json::from_str(&content).unwrap();
        assert!(parsed.validate().is_ok());
    }

    #[test]
    fn test_corrupt_checkpoint_without_backup_is_reported() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());
        fs::write(store.checkpoint_path("AUTH"), "{ not json").unwrap();

        assert!(matches!(
            store.load("AUTH"),
            Err(DurabilityError::CheckpointCorrupt { .. })
        ));
    }

    #[test]
    fn test_corrupt_checkpoint_promotes_backup() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());

        let mut cp = Checkpoint::new("AUTH");
        cp.complete_workstream("A");
        store.save(&cp).unwrap();
        // Second save pushes the first committed state into the backup.
        cp.complete_workstream("B");
        store.save(&cp).unwrap();

        fs::write(store.checkpoint_path("AUTH"), "garbage").unwrap();

        let recovered = store.load("AUTH").unwrap();
        assert_eq!(recovered.completed, vec!["A"]);

        // The promoted backup is now the committed file.
        let committed = store.load("AUTH").unwrap();
        assert_eq!(committed.completed, vec!["A"]);
    }

    #[test]
    fn test_last_writer_wins() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());

        let mut first = Checkpoint::new("AUTH");
        first.complete_workstream("A");
        let mut second = first.clone();
        second.complete_workstream("B");

        store.save(&first).unwrap();
        store.save(&second).unwrap();

        assert_eq!(store.load("AUTH").unwrap().completed, vec!["A", "B"]);
    }

    #[test]
    fn test_resume_equals_load() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());
        let mut cp = Checkpoint::new("AUTH");
        cp.begin_workstream("A");
        cp.status = CheckpointStatus::InProgress;
        store.save(&cp).unwrap();

        assert_eq!(store.resume("AUTH").unwrap(), store.load("AUTH").unwrap());
    }

    #[cfg(unix)]
    #[test]
    fn test_checkpoint_file_permissions_are_0600() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempdir().unwrap();
        let store = store(dir.path());
        store.save(&Checkpoint::new("AUTH")).unwrap();

        let mode = fs::metadata(store.checkpoint_path("AUTH"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
