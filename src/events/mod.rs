//! Coordination event log and role tracking.
//!
//! Every agent/role transition and verification outcome is appended to a
//! hash-chained JSONL file, giving a tamper-evident, totally ordered record
//! of how a run unfolded. The role switcher sits on top of the same event
//! vocabulary.

pub mod log;
pub mod roles;
pub mod types;

pub use log::{EventLog, EventStats};
pub use roles::{Role, RoleCapabilities, RoleSwitcher, TaskSpec};
pub use types::{CoordinationEvent, EventDraft, EventType};
