//! Next-step recommendations derived from execution state.
//!
//! Consumers (a CLI, a dashboard) ask the advisor what to do next for a
//! feature; the answer is a structured recommendation with a confidence
//! and a stable contract version, so callers can evolve independently.

use crate::breaker::BreakerState;
use crate::checkpoint::{Checkpoint, CheckpointStatus};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Recommendation contract version.
pub const CONTRACT_VERSION: &str = "1.0";

/// What kind of action a recommendation proposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationCategory {
    Execution,
    Recovery,
    Planning,
    Information,
    Setup,
}

/// An alternative to the primary recommendation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alternative {
    pub command: String,
    pub reason: String,
}

/// A next-step recommendation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    /// Command the caller should surface
    pub command: String,
    /// Why this is the next step
    pub reason: String,
    /// Confidence in [0, 1]
    pub confidence: f64,
    /// Action category
    pub category: RecommendationCategory,
    /// Contract version for consumers
    pub contract_version: String,
    /// Other reasonable next steps
    #[serde(default)]
    pub alternatives: Vec<Alternative>,
    /// Free-form metadata
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl Recommendation {
    fn new(
        command: &str,
        reason: &str,
        confidence: f64,
        category: RecommendationCategory,
    ) -> Self {
        Self {
            command: command.to_string(),
            reason: reason.to_string(),
            confidence: confidence.clamp(0.0, 1.0),
            category,
            contract_version: CONTRACT_VERSION.to_string(),
            alternatives: Vec::new(),
            metadata: HashMap::new(),
        }
    }

    fn with_alternative(mut self, command: &str, reason: &str) -> Self {
        self.alternatives.push(Alternative {
            command: command.to_string(),
            reason: reason.to_string(),
        });
        self
    }

    fn with_metadata(mut self, key: &str, value: &str) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }
}

/// Produces next-step recommendations from checkpoint and breaker state.
pub struct NextStepAdvisor;

impl NextStepAdvisor {
    /// Recommend the next step for a feature.
    ///
    /// `checkpoint` is the latest persisted state, if any; `breaker` the
    /// current breaker state when a run is live.
    pub fn recommend(
        feature_id: &str,
        checkpoint: Option<&Checkpoint>,
        breaker: Option<BreakerState>,
    ) -> Recommendation {
        if let Some(BreakerState::Open) = breaker {
            return Recommendation::new(
                &format!("status {feature_id}"),
                "circuit breaker is open; wait for the backoff to expire before resuming",
                0.8,
                RecommendationCategory::Recovery,
            )
            .with_alternative(
                &format!("resume {feature_id}"),
                "retry once the breaker admits a probe",
            )
            .with_metadata("breaker_state", "open");
        }

        let Some(checkpoint) = checkpoint else {
            return Recommendation::new(
                &format!("plan {feature_id}"),
                "no execution state found for this feature",
                0.9,
                RecommendationCategory::Setup,
            )
            .with_alternative(&format!("run {feature_id}"), "run directly if workstreams exist");
        };

        match checkpoint.status {
            CheckpointStatus::Pending => Recommendation::new(
                &format!("run {feature_id}"),
                "feature is planned but has not started",
                0.9,
                RecommendationCategory::Execution,
            ),
            CheckpointStatus::InProgress => Recommendation::new(
                &format!("resume {feature_id}"),
                &format!(
                    "{} workstream(s) completed; execution can continue",
                    checkpoint.completed.len()
                ),
                0.85,
                RecommendationCategory::Execution,
            )
            .with_metadata(
                "current_workstream",
                checkpoint.current_workstream.as_deref().unwrap_or(""),
            ),
            CheckpointStatus::Failed => {
                let failed = checkpoint.failed.join(", ");
                Recommendation::new(
                    &format!("resume {feature_id}"),
                    &format!("run failed at: {failed}; resume retries the unfinished remainder"),
                    0.7,
                    RecommendationCategory::Recovery,
                )
                .with_alternative(
                    &format!("rollback {feature_id}"),
                    "roll back to the last good snapshot instead",
                )
                .with_metadata("failed_workstreams", &failed)
            }
            CheckpointStatus::Completed => Recommendation::new(
                &format!("status {feature_id}"),
                "feature is complete",
                0.9,
                RecommendationCategory::Information,
            )
            .with_alternative("plan", "plan the next feature"),
        }
    }
}
