//! Append-only decision log with size rotation.
//!
//! Decisions made by humans or agents during a run are durable JSONL
//! records under `docs/decisions/`. Appends are concurrent-safe, batches
//! are contiguous, and every operation feeds the metrics recorder.

pub mod log;
pub mod metrics;

pub use log::{DecisionLog, DecisionRecord};
pub use metrics::{MetricsRecorder, OpMetrics};
