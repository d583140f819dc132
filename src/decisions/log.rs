//! Size-rotated JSONL decision store.

use super::metrics::MetricsRecorder;
use crate::errors::DurabilityError;
use anyhow::Context;
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// One decision made during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    /// When the decision was made; filled in by the log when omitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    /// Decision type (e.g., "architecture", "scope", "tradeoff")
    pub decision_type: String,
    /// Feature the decision belongs to
    pub feature_id: String,
    /// Workstream the decision belongs to, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workstream_id: Option<String>,
    /// The question that was answered
    pub question: String,
    /// The decision taken
    pub decision: String,
    /// Why
    pub rationale: String,
    /// Alternatives considered
    #[serde(default)]
    pub alternatives: Vec<String>,
    /// Observed or expected outcome
    #[serde(default)]
    pub outcome: String,
    /// Who decided (human or agent id)
    pub decided_by: String,
    /// Free-form tags
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Append-only decision log with 10 MiB default rotation.
pub struct DecisionLog {
    path: PathBuf,
    rotation_bytes: u64,
    metrics: Arc<MetricsRecorder>,
    /// Serializes rotation-check + append + fsync.
    write_lock: Mutex<()>,
}

impl DecisionLog {
    /// Open a log at `path`, creating parent directories as needed.
    pub fn open(path: impl Into<PathBuf>, rotation_bytes: u64) -> Result<Self, DurabilityError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create decision log directory: {}", parent.display()))
                .map_err(DurabilityError::Other)?;
            Self::directory_permissions(parent);
        }
        Ok(Self {
            path,
            rotation_bytes,
            metrics: Arc::new(MetricsRecorder::new()),
            write_lock: Mutex::new(()),
        })
    }

    /// Log file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The recorder backing this log's SLIs.
    pub fn metrics(&self) -> Arc<MetricsRecorder> {
        Arc::clone(&self.metrics)
    }

    #[cfg(unix)]
    fn directory_permissions(dir: &Path) {
        use std::os::unix::fs::PermissionsExt;
        let _ = fs::set_permissions(dir, fs::Permissions::from_mode(0o755));
    }

    #[cfg(not(unix))]
    fn directory_permissions(_dir: &Path) {}

    #[cfg(unix)]
    fn file_permissions(path: &Path) {
        use std::os::unix::fs::PermissionsExt;
        let _ = fs::set_permissions(path, fs::Permissions::from_mode(0o644));
    }

    #[cfg(not(unix))]
    fn file_permissions(_path: &Path) {}

    /// Append one decision. The record is durable before this returns.
    pub fn log(&self, record: DecisionRecord) -> Result<(), DurabilityError> {
        self.log_batch(vec![record])
    }

    /// Append a batch of decisions contiguously: one lock acquisition, one
    /// fsync, order preserved. An empty batch writes nothing but still
    /// opens and fsyncs the file so the call is observable.
    pub fn log_batch(&self, records: Vec<DecisionRecord>) -> Result<(), DurabilityError> {
        let start = Instant::now();
        let result = self.log_batch_inner(records);
        self.metrics
            .record("decision_log_append", start.elapsed(), result.is_ok());
        result
    }

    fn log_batch_inner(&self, records: Vec<DecisionRecord>) -> Result<(), DurabilityError> {
        let _guard = self.write_lock.lock().expect("decision log mutex poisoned");

        self.rotate_if_needed();

        let mut lines = String::new();
        for mut record in records {
            if record.timestamp.is_none() {
                record.timestamp = Some(Utc::now());
            }
            let line = serde_json::to_string(&record)
                .context("Failed to serialize decision record")
                .map_err(DurabilityError::Other)?;
            lines.push_str(&line);
            lines.push('\n');
        }

        let write = || -> std::io::Result<()> {
            let is_new = !self.path.exists();
            let mut file = fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)?;
            file.write_all(lines.as_bytes())?;
            file.sync_all()?;
            if is_new {
                Self::file_permissions(&self.path);
            }
            Ok(())
        };
        write()
            .with_context(|| format!("Failed to append to decision log: {}", self.path.display()))
            .map_err(DurabilityError::Other)?;

        Ok(())
    }

    /// Rotate the current file when it has reached the threshold.
    ///
    /// Rotation failure must never block the append: it degrades to a
    /// warning and writing continues into the oversized file.
    fn rotate_if_needed(&self) {
        let size = match fs::metadata(&self.path) {
            Ok(meta) => meta.len(),
            Err(_) => return,
        };
        if size < self.rotation_bytes {
            return;
        }

        let suffix = Local::now().format("%Y%m%d-%H%M%S");
        let rotated = self.path.with_file_name(format!(
            "{}.{suffix}",
            self.path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "decisions.jsonl".to_string())
        ));

        match fs::rename(&self.path, &rotated) {
            Ok(()) => {
                tracing::info!(
                    from = %self.path.display(),
                    to = %rotated.display(),
                    bytes = size,
                    "rotated decision log"
                );
            }
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "decision log rotation failed, continuing with current file"
                );
            }
        }
    }

    /// Read every record in the current file.
    ///
    /// A truncated trailing record (torn write from a crash) ends the read;
    /// everything before it is returned.
    pub fn load_all(&self) -> Result<Vec<DecisionRecord>, DurabilityError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let start = Instant::now();
        let file = fs::File::open(&self.path)
            .with_context(|| format!("Failed to open decision log: {}", self.path.display()))
            .map_err(DurabilityError::Other)?;

        let mut records = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line
                .context("Failed to read decision log line")
                .map_err(DurabilityError::Other)?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<DecisionRecord>(&line) {
                Ok(record) => records.push(record),
                Err(e) => {
                    tracing::warn!(
                        path = %self.path.display(),
                        error = %e,
                        "stopping decision log read at unparsable record"
                    );
                    break;
                }
            }
        }

        self.metrics
            .record("decision_log_load", start.elapsed(), true);
        Ok(records)
    }
}
