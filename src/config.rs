//! Core configuration for the sdp pipeline.
//!
//! `CoreConfig` carries every tunable recognized by the core along with the
//! durable-store locations. It can be constructed with defaults, adjusted via
//! `with_*` builders, or loaded from `.sdp/config.toml`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default decision-log rotation threshold: 10 MiB.
pub const DEFAULT_ROTATION_BYTES: u64 = 10 * 1024 * 1024;

/// Tunables and store locations for the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Executor retry budget per workstream.
    pub max_retries: u32,
    /// Wait between retries, in seconds.
    pub retry_delay_seconds: u64,
    /// Consecutive failures required to open the circuit breaker.
    pub circuit_breaker_threshold: u32,
    /// Initial open duration for the circuit breaker, in seconds.
    pub circuit_breaker_base_backoff_seconds: u64,
    /// LOC-limit rule threshold.
    pub loc_limit: usize,
    /// Cyclomatic-complexity threshold.
    pub complexity_threshold: u32,
    /// File-watcher debounce interval, in milliseconds.
    pub watcher_debounce_ms: u64,
    /// Decision-log rotation threshold, in bytes.
    pub decision_log_rotation_bytes: u64,
    /// Completions between automatic snapshots.
    pub snapshot_auto_interval: u64,
    /// Event log path, relative to the project directory.
    pub event_log_path: PathBuf,
    /// Decision log path, relative to the project directory.
    pub decision_log_path: PathBuf,
    /// Checkpoint directory, relative to the project directory.
    pub checkpoint_dir: PathBuf,
    /// Snapshot directory, relative to the project directory.
    pub snapshot_dir: PathBuf,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            retry_delay_seconds: 2,
            circuit_breaker_threshold: 5,
            circuit_breaker_base_backoff_seconds: 30,
            loc_limit: 200,
            complexity_threshold: 10,
            watcher_debounce_ms: 100,
            decision_log_rotation_bytes: DEFAULT_ROTATION_BYTES,
            snapshot_auto_interval: 5,
            event_log_path: PathBuf::from(".sdp/log/events.jsonl"),
            decision_log_path: PathBuf::from("docs/decisions/decisions.jsonl"),
            checkpoint_dir: PathBuf::from(".sdp/checkpoints"),
            snapshot_dir: PathBuf::from(".sdp/snapshots"),
        }
    }
}

impl CoreConfig {
    /// Load configuration from a TOML file, falling back to defaults for
    /// missing fields.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Load from `.sdp/config.toml` under the project directory, or return
    /// defaults when the file does not exist.
    pub fn load_or_default(project_dir: &Path) -> Result<Self> {
        let path = project_dir.join(".sdp").join("config.toml");
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Set the retry budget.
    pub fn with_max_retries(mut self, max: u32) -> Self {
        self.max_retries = max;
        self
    }

    /// Set the delay between retries.
    pub fn with_retry_delay_seconds(mut self, seconds: u64) -> Self {
        self.retry_delay_seconds = seconds;
        self
    }

    /// Set the circuit-breaker failure threshold.
    pub fn with_circuit_breaker_threshold(mut self, threshold: u32) -> Self {
        self.circuit_breaker_threshold = threshold;
        self
    }

    /// Set the circuit-breaker base backoff.
    pub fn with_circuit_breaker_base_backoff_seconds(mut self, seconds: u64) -> Self {
        self.circuit_breaker_base_backoff_seconds = seconds;
        self
    }

    /// Set the LOC-limit rule threshold.
    pub fn with_loc_limit(mut self, limit: usize) -> Self {
        self.loc_limit = limit;
        self
    }

    /// Set the watcher debounce interval.
    pub fn with_watcher_debounce_ms(mut self, ms: u64) -> Self {
        self.watcher_debounce_ms = ms;
        self
    }

    /// Set the decision-log rotation threshold.
    pub fn with_decision_log_rotation_bytes(mut self, bytes: u64) -> Self {
        self.decision_log_rotation_bytes = bytes;
        self
    }

    /// Set the auto-snapshot interval.
    pub fn with_snapshot_auto_interval(mut self, interval: u64) -> Self {
        self.snapshot_auto_interval = interval;
        self
    }

    /// Resolve the event log path against a project directory.
    pub fn event_log_in(&self, project_dir: &Path) -> PathBuf {
        project_dir.join(&self.event_log_path)
    }

    /// Resolve the decision log path against a project directory.
    pub fn decision_log_in(&self, project_dir: &Path) -> PathBuf {
        project_dir.join(&self.decision_log_path)
    }

    /// Resolve the checkpoint directory against a project directory.
    pub fn checkpoint_dir_in(&self, project_dir: &Path) -> PathBuf {
        project_dir.join(&self.checkpoint_dir)
    }

    /// Resolve the snapshot directory against a project directory.
    pub fn snapshot_dir_in(&self, project_dir: &Path) -> PathBuf {
        project_dir.join(&self.snapshot_dir)
    }
}
