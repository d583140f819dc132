//! Debounced filesystem observation and the quality pipeline on top of it.
//!
//! The watcher wraps the OS event source with include/exclude glob
//! filtering (exclude wins) and per-path debouncing. The quality watcher
//! composes it with a pluggable checker and keeps per-file violations.

pub mod debounced;
pub mod quality;

pub use debounced::{FileWatcher, WatcherConfig};
pub use quality::{CheckFinding, QualityChecker, QualityWatcher, SourceChecker, Violation};
