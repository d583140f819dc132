//! Feature orchestration.
//!
//! This module owns the execution path for one feature: build the
//! dependency graph, drive workstreams in topological order through the
//! executor with retry and circuit-breaker protection, and persist a
//! checkpoint at every step so the run can be resumed.
//!
//! ## Persistence ownership
//!
//! | Layer             | What it persists                                   |
//! |-------------------|----------------------------------------------------|
//! | `checkpoint/`     | Run progress: completed workstreams, current, status|
//! | `snapshot/`       | Point-in-time copies with lineage and rollback     |
//! | `events/`         | Hash-chained coordination record (append-only)     |
//! | `decisions/`      | Human/agent decisions (append-only, rotated)       |
//!
//! The checkpoint is the canonical source of truth for resumption; the
//! other layers are observation and audit surfaces and do not drive
//! control flow.

pub mod coordinator;
pub mod executor;
pub mod progress;
pub mod runner;

pub use coordinator::FeatureCoordinator;
pub use executor::{ErrorClass, ErrorClassifier, Executor, FatalError, default_classifier};
pub use progress::{ProgressStatus, ProgressUpdate};
pub use runner::Orchestrator;
