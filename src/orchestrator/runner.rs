//! The feature execution loop.

use super::executor::{ErrorClass, ErrorClassifier, Executor, default_classifier};
use super::progress::{ProgressHook, ProgressStatus, ProgressUpdate};
use crate::breaker::CircuitBreaker;
use crate::checkpoint::{Checkpoint, CheckpointStatus, CheckpointStore};
use crate::config::CoreConfig;
use crate::dag::DependencyGraph;
use crate::errors::{ExecutionError, ScheduleError};
use crate::snapshot::SnapshotManager;
use crate::workstream::Workstream;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Drives one feature's workstreams in dependency order.
///
/// Composes the dependency graph, the checkpoint store, the circuit
/// breaker, and the executor. Every state change is persisted before and
/// after the executor runs, so `resume` can pick up from any interruption.
pub struct Orchestrator {
    executor: Arc<dyn Executor>,
    store: Arc<dyn CheckpointStore>,
    breaker: CircuitBreaker,
    config: CoreConfig,
    classifier: ErrorClassifier,
    snapshots: Option<Arc<SnapshotManager>>,
    progress: Option<ProgressHook>,
}

impl Orchestrator {
    /// Create an orchestrator with the default error classifier.
    pub fn new(
        executor: Arc<dyn Executor>,
        store: Arc<dyn CheckpointStore>,
        config: CoreConfig,
    ) -> Self {
        let breaker = CircuitBreaker::new(
            config.circuit_breaker_threshold,
            Duration::from_secs(config.circuit_breaker_base_backoff_seconds),
        );
        Self {
            executor,
            store,
            breaker,
            config,
            classifier: default_classifier(),
            snapshots: None,
            progress: None,
        }
    }

    /// Replace the transient-vs-fatal classifier.
    pub fn with_classifier(mut self, classifier: ErrorClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Attach a snapshot manager; completions are counted toward automatic
    /// snapshots.
    pub fn with_snapshot_manager(mut self, snapshots: Arc<SnapshotManager>) -> Self {
        self.snapshots = Some(snapshots);
        self
    }

    /// Attach a progress hook.
    pub fn with_progress_hook(mut self, hook: ProgressHook) -> Self {
        self.progress = Some(hook);
        self
    }

    /// The breaker protecting the executor.
    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    fn emit(&self, update: ProgressUpdate) {
        if let Some(hook) = &self.progress {
            hook(update);
        }
    }

    /// Persist the checkpoint with the current breaker state mirrored in.
    fn save(&self, checkpoint: &mut Checkpoint) -> Result<(), ExecutionError> {
        checkpoint.circuit_breaker = Some(self.breaker.snapshot());
        self.store.save(checkpoint)?;
        Ok(())
    }

    fn build_order(&self, workstreams: &[Workstream]) -> Result<Vec<String>, ExecutionError> {
        self.emit(ProgressUpdate::new(
            ProgressStatus::BuildingGraph,
            "building dependency graph",
        ));
        let graph = DependencyGraph::build(workstreams)?;
        let order = graph.topological_order()?;
        self.emit(ProgressUpdate::new(
            ProgressStatus::ExecutionOrder,
            &format!("execution order: {}", order.join(" -> ")),
        ));
        Ok(order)
    }

    /// Execute all workstreams of a feature from a clean slate.
    ///
    /// Schedule errors surface before any executor call and before any
    /// checkpoint is written.
    pub async fn run(
        &self,
        feature_id: &str,
        workstreams: &[Workstream],
        cancel: CancellationToken,
    ) -> Result<Checkpoint, ExecutionError> {
        if workstreams.is_empty() {
            return Err(ScheduleError::FeatureNotFound {
                feature: feature_id.to_string(),
            }
            .into());
        }

        let order = self.build_order(workstreams)?;
        let mut checkpoint = Checkpoint::new(feature_id);

        self.execute_remaining(&mut checkpoint, &order, &order, &cancel)
            .await?;

        checkpoint.mark_completed();
        self.save(&mut checkpoint)?;
        self.emit(ProgressUpdate::new(
            ProgressStatus::Completed,
            &format!(
                "feature {feature_id} completed: {} workstream(s)",
                checkpoint.completed.len()
            ),
        ));
        Ok(checkpoint)
    }

    /// Resume a feature from its persisted checkpoint.
    ///
    /// A completed checkpoint returns immediately with no executor calls.
    /// Otherwise the topological order is rebuilt from the current
    /// descriptors and the loop continues over the unfinished remainder.
    pub async fn resume(
        &self,
        feature_id: &str,
        workstreams: &[Workstream],
        cancel: CancellationToken,
    ) -> Result<Checkpoint, ExecutionError> {
        let mut checkpoint = self.store.resume(feature_id)?;

        if checkpoint.status == CheckpointStatus::Completed {
            self.emit(ProgressUpdate::new(
                ProgressStatus::AlreadyCompleted,
                &format!("feature {feature_id} is already completed"),
            ));
            return Ok(checkpoint);
        }

        if workstreams.is_empty() {
            return Err(ScheduleError::FeatureNotFound {
                feature: feature_id.to_string(),
            }
            .into());
        }

        self.emit(ProgressUpdate::new(
            ProgressStatus::Resuming,
            &format!("resuming feature {feature_id}"),
        ));

        let order = self.build_order(workstreams)?;

        // Start at the interrupted workstream when one is recorded, then
        // drop everything already completed.
        let remaining: Vec<String> = match checkpoint.current_workstream.clone() {
            Some(current) if order.contains(&current) => order
                .iter()
                .skip_while(|id| **id != current)
                .filter(|id| !checkpoint.is_completed(id))
                .cloned()
                .collect(),
            _ => order
                .iter()
                .filter(|id| !checkpoint.is_completed(id))
                .cloned()
                .collect(),
        };

        self.execute_remaining(&mut checkpoint, &remaining, &order, &cancel)
            .await?;

        checkpoint.mark_completed();
        self.save(&mut checkpoint)?;
        self.emit(ProgressUpdate::new(
            ProgressStatus::Completed,
            &format!(
                "feature {feature_id} completed: {} workstream(s)",
                checkpoint.completed.len()
            ),
        ));
        Ok(checkpoint)
    }

    async fn execute_remaining(
        &self,
        checkpoint: &mut Checkpoint,
        remaining: &[String],
        full_order: &[String],
        cancel: &CancellationToken,
    ) -> Result<(), ExecutionError> {
        for ws_id in remaining {
            checkpoint.begin_workstream(ws_id);
            self.save(checkpoint)?;

            if cancel.is_cancelled() {
                return Err(ExecutionError::Cancelled {
                    workstream: ws_id.clone(),
                });
            }

            self.emit(
                ProgressUpdate::new(ProgressStatus::Executing, &format!("executing {ws_id}"))
                    .for_workstream(ws_id),
            );

            self.drive_workstream(checkpoint, ws_id, cancel).await?;

            checkpoint.complete_workstream(ws_id);
            self.save(checkpoint)?;
            self.emit(
                ProgressUpdate::new(ProgressStatus::Completed, &format!("{ws_id} completed"))
                    .for_workstream(ws_id),
            );

            if let Some(snapshots) = &self.snapshots {
                let pending: Vec<String> = full_order
                    .iter()
                    .filter(|id| !checkpoint.is_completed(id))
                    .cloned()
                    .collect();
                if let Err(e) = snapshots.record_completion(checkpoint, &pending) {
                    tracing::warn!(error = %e, "automatic snapshot failed");
                }
            }
        }
        Ok(())
    }

    /// Run one workstream through the breaker with the retry budget.
    async fn drive_workstream(
        &self,
        checkpoint: &mut Checkpoint,
        ws_id: &str,
        cancel: &CancellationToken,
    ) -> Result<(), ExecutionError> {
        let max_attempts = self.config.max_retries + 1;
        let retry_delay = Duration::from_secs(self.config.retry_delay_seconds);
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            if let Err(open) = self.breaker.try_acquire() {
                // The run is interrupted, not failed: the checkpoint keeps
                // status in_progress so resume can continue after backoff.
                self.save(checkpoint)?;
                return Err(open);
            }

            let result = tokio::select! {
                _ = cancel.cancelled() => {
                    // The in-flight call has been signalled (dropped); the
                    // checkpoint save completes before the loop aborts.
                    self.save(checkpoint)?;
                    return Err(ExecutionError::Cancelled { workstream: ws_id.to_string() });
                }
                result = self.executor.execute(ws_id) => result,
            };

            match result {
                Ok(()) => {
                    self.breaker.record_success();
                    return Ok(());
                }
                Err(error) => {
                    self.breaker.record_failure();
                    tracing::warn!(
                        workstream = ws_id,
                        attempt,
                        error = %error,
                        "workstream execution failed"
                    );

                    if (self.classifier)(&error) == ErrorClass::Fatal {
                        checkpoint.mark_failed(ws_id);
                        self.save(checkpoint)?;
                        self.emit(
                            ProgressUpdate::new(
                                ProgressStatus::Failed,
                                &format!("{ws_id} failed fatally: {error}"),
                            )
                            .for_workstream(ws_id),
                        );
                        return Err(ExecutionError::Fatal {
                            workstream: ws_id.to_string(),
                            message: error.to_string(),
                        });
                    }

                    if attempt >= max_attempts {
                        checkpoint.mark_failed(ws_id);
                        self.save(checkpoint)?;
                        self.emit(
                            ProgressUpdate::new(
                                ProgressStatus::Failed,
                                &format!("{ws_id} failed after {attempt} attempt(s): {error}"),
                            )
                            .for_workstream(ws_id),
                        );
                        return Err(ExecutionError::RetriesExhausted {
                            workstream: ws_id.to_string(),
                            attempts: attempt,
                            message: error.to_string(),
                        });
                    }

                    self.emit(
                        ProgressUpdate::new(
                            ProgressStatus::Retrying,
                            &format!("retrying {ws_id} (attempt {} of {max_attempts})", attempt + 1),
                        )
                        .for_workstream(ws_id),
                    );

                    tokio::select! {
                        _ = cancel.cancelled() => {
                            self.save(checkpoint)?;
                            return Err(ExecutionError::Cancelled { workstream: ws_id.to_string() });
                        }
                        _ = tokio::time::sleep(retry_delay) => {}
                    }
                }
            }
        }
    }
}
