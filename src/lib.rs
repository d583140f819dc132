pub mod advisor;
pub mod breaker;
pub mod bus;
pub mod checkpoint;
pub mod config;
pub mod dag;
pub mod decisions;
pub mod errors;
pub mod events;
pub mod logging;
pub mod orchestrator;
pub mod snapshot;
pub mod verify;
pub mod watcher;
pub mod workstream;

pub use breaker::{BreakerState, CircuitBreaker};
pub use checkpoint::{Checkpoint, CheckpointStatus, CheckpointStore, FileCheckpointStore};
pub use config::CoreConfig;
pub use errors::{DurabilityError, ExecutionError, ScheduleError};
pub use orchestrator::{Executor, FeatureCoordinator, Orchestrator, ProgressStatus, ProgressUpdate};
pub use workstream::{Workstream, WorkstreamStatus};
