//! Feature coordinator: the orchestrator with a progress channel.

use super::executor::{ErrorClassifier, Executor};
use super::progress::{ProgressStatus, ProgressUpdate};
use super::runner::Orchestrator;
use crate::checkpoint::{Checkpoint, CheckpointStore};
use crate::config::CoreConfig;
use crate::errors::ExecutionError;
use crate::snapshot::SnapshotManager;
use crate::workstream::{self, Workstream};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tokio_util::sync::CancellationToken;

/// Wraps the orchestrator with per-workstream progress reporting.
///
/// Every update carries a timestamp, a message, an optional workstream id,
/// and one of the well-defined status tags. Updates flow through an
/// unbounded channel so the consumer (a UI, a log shipper) never blocks
/// the run.
pub struct FeatureCoordinator {
    orchestrator: Orchestrator,
    tx: UnboundedSender<ProgressUpdate>,
}

impl FeatureCoordinator {
    /// Create a coordinator and the receiving end of its progress channel.
    pub fn new(
        executor: Arc<dyn Executor>,
        store: Arc<dyn CheckpointStore>,
        config: CoreConfig,
    ) -> (Self, UnboundedReceiver<ProgressUpdate>) {
        let (tx, rx) = unbounded_channel();

        let hook_tx = tx.clone();
        let orchestrator = Orchestrator::new(executor, store, config).with_progress_hook(
            Arc::new(move |update| {
                let _ = hook_tx.send(update);
            }),
        );

        (Self { orchestrator, tx }, rx)
    }

    /// Attach a snapshot manager to the underlying orchestrator.
    pub fn with_snapshot_manager(mut self, snapshots: Arc<SnapshotManager>) -> Self {
        self.orchestrator = self.orchestrator.with_snapshot_manager(snapshots);
        self
    }

    /// Replace the transient-vs-fatal classifier.
    pub fn with_classifier(mut self, classifier: ErrorClassifier) -> Self {
        self.orchestrator = self.orchestrator.with_classifier(classifier);
        self
    }

    fn emit(&self, status: ProgressStatus, message: &str) {
        let _ = self.tx.send(ProgressUpdate::new(status, message));
    }

    /// Run a feature over preloaded descriptors.
    pub async fn run(
        &self,
        feature_id: &str,
        workstreams: &[Workstream],
        cancel: CancellationToken,
    ) -> Result<Checkpoint, ExecutionError> {
        self.emit(
            ProgressStatus::Started,
            &format!("starting feature {feature_id}"),
        );
        self.finish(feature_id, self.orchestrator.run(feature_id, workstreams, cancel).await)
    }

    /// Load descriptors for the feature from a directory, then run it.
    pub async fn run_from_dir(
        &self,
        feature_id: &str,
        descriptor_dir: &Path,
        cancel: CancellationToken,
    ) -> Result<Checkpoint, ExecutionError> {
        self.emit(
            ProgressStatus::Started,
            &format!("starting feature {feature_id}"),
        );
        self.emit(
            ProgressStatus::Loading,
            &format!("loading workstreams from {}", descriptor_dir.display()),
        );

        let workstreams = workstream::load_feature_workstreams(descriptor_dir, feature_id)
            .map_err(|e| ExecutionError::Durability(crate::errors::DurabilityError::Other(e)))?;

        self.finish(
            feature_id,
            self.orchestrator.run(feature_id, &workstreams, cancel).await,
        )
    }

    /// Resume a feature from its checkpoint.
    pub async fn resume(
        &self,
        feature_id: &str,
        workstreams: &[Workstream],
        cancel: CancellationToken,
    ) -> Result<Checkpoint, ExecutionError> {
        self.finish(
            feature_id,
            self.orchestrator
                .resume(feature_id, workstreams, cancel)
                .await,
        )
    }

    /// Emit a terminal update for failures the run loop itself could not
    /// attribute to a workstream (schedule and durability errors).
    fn finish(
        &self,
        feature_id: &str,
        result: Result<Checkpoint, ExecutionError>,
    ) -> Result<Checkpoint, ExecutionError> {
        if let Err(error) = &result {
            match error {
                ExecutionError::RetriesExhausted { .. } | ExecutionError::Fatal { .. } => {
                    // The run loop already emitted a failed update with the
                    // workstream id attached.
                }
                other => {
                    self.emit(
                        ProgressStatus::Failed,
                        &format!("feature {feature_id} failed: {other}"),
                    );
                }
            }
        }
        result
    }
}
